/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use humanize_rs::bytes::Bytes;
use yaml_rust::{Yaml, yaml};

use g3_metric::LabelSet;

/// Config keys match case-insensitively, with `-` and `_` interchangeable.
pub(crate) fn normalize_key(key: &str) -> String {
    key.to_lowercase().replace('-', "_")
}

/// Call `f` on each entry of a config block, the key is given as written.
pub(crate) fn foreach_kv<F>(map: &yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    map.iter().try_for_each(|(k, v)| {
        let Yaml::String(key) = k else {
            return Err(anyhow!("config key {k:?} is not a string"));
        };
        f(key, v).context(format!("invalid value for {key}"))
    })
}

/// A `read`/`write` section is a single task block or a list of them.
pub(crate) fn foreach_map<F>(v: &Yaml, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&yaml::Hash) -> anyhow::Result<()>,
{
    let blocks = match v {
        Yaml::Hash(map) => return f(map),
        Yaml::Array(seq) => seq,
        _ => return Err(anyhow!("a task section should be a map or a list of maps")),
    };
    for (i, v) in blocks.iter().enumerate() {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("task block #{i} is not a map"));
        };
        f(map).context(format!("invalid task block #{i}"))?;
    }
    Ok(())
}

pub(crate) fn get_required_str<'a>(map: &'a yaml::Hash, k: &str) -> anyhow::Result<&'a str> {
    map.iter()
        .find_map(|(key, v)| match key {
            Yaml::String(key) if normalize_key(key) == k => Some(v),
            _ => None,
        })
        .ok_or_else(|| anyhow!("missing key {k}"))?
        .as_str()
        .ok_or_else(|| anyhow!("value of key {k} should be a string"))
}

/// Text of a scalar node, numbers included.
fn scalar(v: &Yaml) -> Option<Cow<'_, str>> {
    match v {
        Yaml::String(s) | Yaml::Real(s) => Some(Cow::Borrowed(s)),
        Yaml::Integer(i) => Some(Cow::Owned(i.to_string())),
        _ => None,
    }
}

fn parse_scalar<T>(v: &Yaml, what: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let s = scalar(v).ok_or_else(|| anyhow!("{what} value should be a scalar"))?;
    s.trim()
        .parse()
        .map_err(|e| anyhow!("invalid {what} value {s}: {e}"))
}

pub(crate) fn as_string(v: &Yaml) -> anyhow::Result<String> {
    scalar(v)
        .map(Cow::into_owned)
        .ok_or_else(|| anyhow!("string value should be a scalar"))
}

pub(crate) fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    if let Yaml::Boolean(b) = v {
        return Ok(*b);
    }
    let s = scalar(v).ok_or_else(|| anyhow!("bool value should be a scalar"))?;
    match s.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(anyhow!("invalid bool value {s}")),
    }
}

pub(crate) fn as_u32(v: &Yaml) -> anyhow::Result<u32> {
    parse_scalar(v, "u32")
}

pub(crate) fn as_f64(v: &Yaml) -> anyhow::Result<f64> {
    parse_scalar(v, "f64")
}

/// Byte size: plain bytes, or with a unit like `64KiB`.
pub(crate) fn as_size(v: &Yaml) -> anyhow::Result<usize> {
    if let Yaml::Integer(i) = v {
        return usize::try_from(*i).map_err(|_| anyhow!("size should not be negative"));
    }
    let s = scalar(v).ok_or_else(|| anyhow!("size value should be a scalar"))?;
    let bytes = s
        .parse::<Bytes>()
        .map_err(|e| anyhow!("invalid size {s}: {e}"))?;
    Ok(bytes.size())
}

/// Duration: plain seconds, or with units like `1m30s`.
pub(crate) fn as_duration(v: &Yaml) -> anyhow::Result<Duration> {
    let s = scalar(v).ok_or_else(|| anyhow!("duration value should be a scalar"))?;
    match f64::from_str(&s) {
        Ok(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|e| anyhow!("invalid duration {s}: {e}")),
        Err(_) => humanize_rs::duration::parse(&s)
            .map_err(|e| anyhow!("invalid duration {s}: {e}")),
    }
}

pub(crate) fn as_label_set(v: &Yaml) -> anyhow::Result<LabelSet> {
    let Yaml::Hash(map) = v else {
        return Err(anyhow!("labels should be a map"));
    };
    let mut labels = LabelSet::with_capacity(map.len());
    foreach_kv(map, |k, v| {
        labels
            .add(k, as_string(v)?)
            .map_err(|e| anyhow!("invalid label {k}: {e}"))
    })?;
    Ok(labels)
}

/// A list of scalars, a single scalar counts as a list of one.
pub(crate) fn as_string_list(v: &Yaml) -> anyhow::Result<Vec<String>> {
    let Yaml::Array(seq) = v else {
        return Ok(vec![as_string(v)?]);
    };
    seq.iter()
        .enumerate()
        .map(|(i, v)| as_string(v).context(format!("invalid list item #{i}")))
        .collect()
}
