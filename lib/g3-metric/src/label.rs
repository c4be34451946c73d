/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;

use ahash::RandomState;
use indexmap::IndexMap;

use crate::{MetricError, check_label_name};

/// Labels unique by name, kept in insertion order.
///
/// Equality ignores the insertion order, marshaling follows it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    inner: IndexMap<String, String, RandomState>,
}

impl LabelSet {
    pub fn new() -> Self {
        LabelSet::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        LabelSet {
            inner: IndexMap::with_capacity_and_hasher(n, RandomState::default()),
        }
    }

    /// Build from name value pairs, failing on the first duplicate name.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, MetricError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = LabelSet::new();
        for (k, v) in pairs {
            set.add(k, v)?;
        }
        Ok(set)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(|v| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Add a new label, the name must not be present yet.
    pub fn add<K, V>(&mut self, name: K, value: V) -> Result<(), MetricError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        check_label_name(&name)?;
        if self.inner.contains_key(&name) {
            return Err(MetricError::DuplicateLabel(name));
        }
        self.inner.insert(name, value.into());
        Ok(())
    }

    /// Insert or replace a label. An empty value removes the label.
    ///
    /// A replaced label keeps its position.
    pub fn set<K, V>(&mut self, name: K, value: V) -> Result<(), MetricError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        check_label_name(&name)?;
        let value = value.into();
        if value.is_empty() {
            self.inner.shift_remove(&name);
        } else {
            self.inner.insert(name, value);
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.inner.shift_remove(name)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Merge all labels of `other`, failing without any change if a name
    /// is present in both sets.
    pub fn merge(&mut self, other: &LabelSet) -> Result<(), MetricError> {
        if let Some(name) = other.inner.keys().find(|k| self.inner.contains_key(*k)) {
            return Err(MetricError::DuplicateLabel(name.clone()));
        }
        self.inner.reserve(other.len());
        for (k, v) in &other.inner {
            self.inner.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    /// Add the labels of `other` whose names are absent here.
    pub fn merge_missing(&mut self, other: &LabelSet) {
        for (k, v) in &other.inner {
            if !self.inner.contains_key(k) {
                self.inner.insert(k.clone(), v.clone());
            }
        }
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &str) -> bool,
    {
        self.inner.retain(|k, v| keep(k, v));
    }

    pub(crate) fn sorted(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self.iter().collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    /// Append `{name="value",...}` in insertion order.
    pub fn marshal(&self, buf: &mut String) {
        marshal_pairs(buf, self.iter());
    }

    pub fn marshal_to_string(&self) -> String {
        let mut s = String::with_capacity(2 + self.len() * 16);
        self.marshal(&mut s);
        s
    }
}

impl fmt::Debug for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.iter()).finish()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.marshal_to_string())
    }
}

pub(crate) fn marshal_pairs<'a, I>(buf: &mut String, pairs: I)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    buf.push('{');
    for (i, (name, value)) in pairs.into_iter().enumerate() {
        if i != 0 {
            buf.push(',');
        }
        buf.push_str(name);
        buf.push_str("=\"");
        escape_value(buf, value);
        buf.push('"');
    }
    buf.push('}');
}

/// Backslash escape `\`, `"`, newline, carriage return and tab.
pub fn escape_value(buf: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '"' => buf.push_str("\\\""),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            _ => buf.push(c),
        }
    }
}

/// Parse a leading `{name="value",...}` group, return the set and the rest.
pub(crate) fn unmarshal_pairs(s: &str) -> Result<(LabelSet, &str), MetricError> {
    let Some(mut left) = s.strip_prefix('{') else {
        return Err(MetricError::InvalidArgument("label set does not start with '{'"));
    };
    let mut set = LabelSet::new();
    if let Some(rest) = left.strip_prefix('}') {
        return Ok((set, rest));
    }
    loop {
        let Some((name, rest)) = left.split_once("=\"") else {
            return Err(MetricError::InvalidArgument("label has no value"));
        };
        let mut value = String::new();
        let mut chars = rest.char_indices();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    end = Some(i + 1);
                    break;
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, c)) => value.push(c),
                    None => break,
                },
                _ => value.push(c),
            }
        }
        let Some(end) = end else {
            return Err(MetricError::InvalidArgument("unterminated label value"));
        };
        set.add(name, value)?;
        left = &rest[end..];
        if let Some(rest) = left.strip_prefix(',') {
            left = rest;
        } else if let Some(rest) = left.strip_prefix('}') {
            return Ok((set, rest));
        } else {
            return Err(MetricError::InvalidArgument("unterminated label set"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_duplicate() {
        let mut set = LabelSet::new();
        set.add("host", "a").unwrap();
        assert_eq!(
            set.add("host", "b"),
            Err(MetricError::DuplicateLabel("host".to_string()))
        );
        assert_eq!(set.get("host"), Some("a"));
        assert!(set.add("bad-name", "x").is_err());
    }

    #[test]
    fn set_and_remove() {
        let mut set = LabelSet::from_pairs([("a", "1"), ("b", "2"), ("c", "3")]).unwrap();
        set.set("a", "9").unwrap();
        assert_eq!(set.marshal_to_string(), r#"{a="9",b="2",c="3"}"#);
        set.set("b", "").unwrap();
        assert_eq!(set.marshal_to_string(), r#"{a="9",c="3"}"#);
        assert_eq!(set.remove("c").as_deref(), Some("3"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn order_independent_equality() {
        let a = LabelSet::from_pairs([("x", "1"), ("y", "2")]).unwrap();
        let b = LabelSet::from_pairs([("y", "2"), ("x", "1")]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.marshal_to_string(), b.marshal_to_string());

        let c = LabelSet::from_pairs([("y", "2"), ("x", "3")]).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn merge() {
        let mut a = LabelSet::from_pairs([("x", "1")]).unwrap();
        let b = LabelSet::from_pairs([("y", "2"), ("x", "3")]).unwrap();
        assert!(a.merge(&b).is_err());
        assert_eq!(a.len(), 1);

        a.merge_missing(&b);
        assert_eq!(a.get("x"), Some("1"));
        assert_eq!(a.get("y"), Some("2"));
    }

    #[test]
    fn marshal_escape() {
        let set = LabelSet::from_pairs([("q", "a\"b"), ("nl", "1\n2"), ("bs", "c:\\")]).unwrap();
        assert_eq!(
            set.marshal_to_string(),
            r#"{q="a\"b",nl="1\n2",bs="c:\\"}"#
        );
        assert_eq!(LabelSet::new().marshal_to_string(), "{}");
    }

    #[test]
    fn unmarshal() {
        let set = LabelSet::from_pairs([("q", "a\"b"), ("nl", "1\n2"), ("e", "")]).unwrap();
        let s = format!("{set} tail");
        let (parsed, rest) = unmarshal_pairs(&s).unwrap();
        assert_eq!(parsed, set);
        assert_eq!(rest, " tail");

        let (parsed, rest) = unmarshal_pairs("{}{").unwrap();
        assert!(parsed.is_empty());
        assert_eq!(rest, "{");

        assert!(unmarshal_pairs("a=\"b\"}").is_err());
        assert!(unmarshal_pairs("{a=\"b").is_err());
        assert!(unmarshal_pairs("{a=\"b\"").is_err());
    }
}
