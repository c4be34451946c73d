/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::label::unmarshal_pairs;
use crate::{LabelSet, Metric, MetricError, MetricFamily, check_metric_name};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Failure,
    Warning,
    Okay,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::Failure => "FAILURE",
            Severity::Warning => "WARNING",
            Severity::Okay => "OKAY",
        }
    }
}

impl FromStr for Severity {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FAILURE" | "failure" => Ok(Severity::Failure),
            "WARNING" | "warning" => Ok(Severity::Warning),
            "OKAY" | "okay" => Ok(Severity::Okay),
            _ => Err(MetricError::InvalidArgument("unknown severity")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub name: String,
    pub severity: Severity,
    pub time: DateTime<Utc>,
    pub labels: LabelSet,
    /// Free form context, kept apart from the identifying labels.
    pub annotations: LabelSet,
}

impl Notification {
    pub fn new<S: Into<String>>(
        name: S,
        severity: Severity,
        time: DateTime<Utc>,
    ) -> Result<Self, MetricError> {
        let name = name.into();
        check_metric_name(&name)?;
        Ok(Notification {
            name,
            severity,
            time,
            labels: LabelSet::default(),
            annotations: LabelSet::default(),
        })
    }

    /// Notification about one metric, carrying its labels.
    ///
    /// The metric time is used if present, or the current time otherwise.
    pub fn from_metric(severity: Severity, family: &MetricFamily, metric: &Metric) -> Self {
        Notification {
            name: family.name().to_string(),
            severity,
            time: metric.time.unwrap_or_else(Utc::now),
            labels: metric.labels.clone(),
            annotations: LabelSet::default(),
        }
    }

    /// Clear everything, leaving an unnamed `Failure` at the epoch.
    pub fn reset(&mut self) {
        self.name.clear();
        self.severity = Severity::Failure;
        self.time = DateTime::from_timestamp_nanos(0);
        self.labels.clear();
        self.annotations.clear();
    }

    /// Append `<name>{labels}{annotations} <SEVERITY> <secs.millis>\n`.
    pub fn marshal(&self, buf: &mut String) {
        buf.push_str(&self.name);
        self.labels.marshal(buf);
        self.annotations.marshal(buf);
        buf.push(' ');
        buf.push_str(self.severity.as_str());
        buf.push(' ');
        let millis = self.time.timestamp_millis();
        let _ = write!(
            buf,
            "{}.{:03}",
            millis.div_euclid(1000),
            millis.rem_euclid(1000)
        );
        buf.push('\n');
    }

    pub fn marshal_to_string(&self) -> String {
        let mut s = String::with_capacity(64);
        self.marshal(&mut s);
        s
    }

    /// Parse the text form written by [`Notification::marshal`].
    pub fn unmarshal(s: &str) -> Result<Self, MetricError> {
        let s = s.strip_suffix('\n').unwrap_or(s);
        let Some(p) = s.find('{') else {
            return Err(MetricError::InvalidArgument("no label set"));
        };
        let name = &s[..p];
        check_metric_name(name)?;

        let (labels, left) = unmarshal_pairs(&s[p..])?;
        let (annotations, left) = unmarshal_pairs(left)?;

        let Some(left) = left.strip_prefix(' ') else {
            return Err(MetricError::InvalidArgument("no severity"));
        };
        let Some((severity, time)) = left.split_once(' ') else {
            return Err(MetricError::InvalidArgument("no timestamp"));
        };
        let severity = Severity::from_str(severity)?;
        let time = parse_time(time)?;

        Ok(Notification {
            name: name.to_string(),
            severity,
            time,
            labels,
            annotations,
        })
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, MetricError> {
    let (secs, millis) = match s.split_once('.') {
        Some((secs, frac)) => {
            let frac = frac.get(..3).unwrap_or(frac);
            let mut millis = u32::from_str(frac)
                .map_err(|_| MetricError::InvalidArgument("invalid timestamp"))?;
            for _ in frac.len()..3 {
                millis *= 10;
            }
            (secs, millis)
        }
        None => (s, 0),
    };
    let secs =
        i64::from_str(secs).map_err(|_| MetricError::InvalidArgument("invalid timestamp"))?;
    DateTime::from_timestamp(secs, millis * 1_000_000)
        .ok_or(MetricError::InvalidArgument("timestamp out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricType, Value};

    fn sample() -> Notification {
        let time = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let mut n = Notification::new("disk_full", Severity::Warning, time).unwrap();
        n.labels.add("mount", "/var").unwrap();
        n.annotations.add("summary", "95% \"used\"").unwrap();
        n
    }

    #[test]
    fn marshal() {
        let n = sample();
        assert_eq!(
            n.marshal_to_string(),
            "disk_full{mount=\"/var\"}{summary=\"95% \\\"used\\\"\"} WARNING 1700000000.123\n"
        );

        let mut n = n;
        n.severity = Severity::Okay;
        n.labels.clear();
        n.annotations.clear();
        assert_eq!(n.marshal_to_string(), "disk_full{}{} OKAY 1700000000.123\n");
    }

    #[test]
    fn unmarshal() {
        let n = sample();
        let parsed = Notification::unmarshal(&n.marshal_to_string()).unwrap();
        assert_eq!(parsed, n);

        assert!(Notification::unmarshal("x{}{} BAD 1.0").is_err());
        assert!(Notification::unmarshal("x{}{}").is_err());
        assert!(Notification::unmarshal("{}{} OKAY 1.0").is_err());
    }

    #[test]
    fn clone_and_reset() {
        let n = sample();
        let mut c = n.clone();
        assert_eq!(c, n);
        c.reset();
        assert!(c.name.is_empty());
        assert!(c.labels.is_empty() && c.annotations.is_empty());
        assert_eq!(c.severity, Severity::Failure);
        assert_eq!(n.labels.get("mount"), Some("/var"));
    }

    #[test]
    fn from_metric() {
        let mut fam = MetricFamily::new("temp", MetricType::Gauge).unwrap();
        fam.append(Value::gauge(90.0), None, &[("sensor", "cpu")])
            .unwrap();
        let n = Notification::from_metric(Severity::Failure, &fam, &fam.metrics()[0]);
        assert_eq!(n.name, "temp");
        assert_eq!(n.labels.get("sensor"), Some("cpu"));
    }
}
