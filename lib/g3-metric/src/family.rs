/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{LabelSet, MetricError, MetricType, SeriesKey, Value, check_metric_name};

#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    pub labels: LabelSet,
    /// Stamped at dispatch if not set by the producer.
    pub time: Option<DateTime<Utc>>,
    /// Stamped at dispatch with the read task interval if not set.
    pub interval: Option<Duration>,
    value: Value,
}

impl Metric {
    pub fn new(value: Value) -> Self {
        Metric {
            labels: LabelSet::default(),
            time: None,
            interval: None,
            value,
        }
    }

    pub fn with_labels(value: Value, labels: LabelSet) -> Self {
        Metric {
            labels,
            time: None,
            interval: None,
            value,
        }
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replace the value, which must keep the type of the current one.
    pub fn set_value(&mut self, value: Value) -> Result<(), MetricError> {
        let expected = self.value.metric_type();
        let found = value.metric_type();
        if expected != found {
            return Err(MetricError::TypeMismatch { expected, found });
        }
        self.value = value;
        Ok(())
    }

    pub fn series_key(&self, family_name: &str) -> SeriesKey {
        SeriesKey::new(family_name, &self.labels)
    }
}

/// A named group of metrics sharing one declared type.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricFamily {
    name: String,
    help: Option<String>,
    unit: Option<String>,
    metric_type: MetricType,
    metrics: Vec<Metric>,
}

impl MetricFamily {
    pub fn new<S: Into<String>>(name: S, metric_type: MetricType) -> Result<Self, MetricError> {
        let name = name.into();
        check_metric_name(&name)?;
        Ok(MetricFamily {
            name,
            help: None,
            unit: None,
            metric_type,
            metrics: Vec::new(),
        })
    }

    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    #[inline]
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    #[inline]
    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    #[inline]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Values stay type checked, see [`Metric::set_value`].
    #[inline]
    pub fn metrics_mut(&mut self) -> &mut [Metric] {
        &mut self.metrics
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    fn check_type(&self, value: &Value) -> Result<(), MetricError> {
        let found = value.metric_type();
        if found != self.metric_type {
            return Err(MetricError::TypeMismatch {
                expected: self.metric_type,
                found,
            });
        }
        Ok(())
    }

    /// Append a value with a copy of `labels` plus `extra` pairs.
    ///
    /// An extra pair whose name is already present fails the whole append,
    /// the family is left unchanged on any error.
    pub fn append(
        &mut self,
        value: Value,
        labels: Option<&LabelSet>,
        extra: &[(&str, &str)],
    ) -> Result<(), MetricError> {
        self.check_type(&value)?;

        let mut metric_labels = match labels {
            Some(l) => {
                let mut set = LabelSet::with_capacity(l.len() + extra.len());
                set.merge(l)?;
                set
            }
            None => LabelSet::with_capacity(extra.len()),
        };
        for (k, v) in extra {
            metric_labels.add(*k, *v)?;
        }

        self.metrics.push(Metric::with_labels(value, metric_labels));
        Ok(())
    }

    pub fn append_metric(&mut self, metric: Metric) -> Result<(), MetricError> {
        self.check_type(&metric.value)?;
        self.metrics.push(metric);
        Ok(())
    }

    /// Drop all metrics but keep the family description.
    pub fn reset(&mut self) {
        self.metrics.clear();
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Metric) -> bool,
    {
        self.metrics.retain(keep);
    }

    /// Copy of the family description without any metric.
    pub fn clone_empty(&self) -> Self {
        MetricFamily {
            name: self.name.clone(),
            help: self.help.clone(),
            unit: self.unit.clone(),
            metric_type: self.metric_type,
            metrics: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateSet;

    #[test]
    fn new_family() {
        assert!(MetricFamily::new("", MetricType::Gauge).is_err());
        let fam = MetricFamily::new("memory_used", MetricType::Gauge)
            .unwrap()
            .with_help("used memory")
            .with_unit("bytes");
        assert_eq!(fam.help(), Some("used memory"));
        assert_eq!(fam.unit(), Some("bytes"));
        assert!(fam.is_empty());
    }

    #[test]
    fn append_type_mismatch() {
        let mut fam = MetricFamily::new("requests", MetricType::Counter).unwrap();
        fam.append(Value::counter(1), None, &[]).unwrap();

        for v in [
            Value::gauge(1.0),
            Value::StateSet(StateSet::new()),
            Value::Info(LabelSet::new()),
        ] {
            let e = fam.append(v, None, &[]).unwrap_err();
            assert!(matches!(
                e,
                MetricError::TypeMismatch {
                    expected: MetricType::Counter,
                    ..
                }
            ));
        }
        assert_eq!(fam.len(), 1);
    }

    #[test]
    fn set_value_type_checked() {
        let mut fam = MetricFamily::new("requests", MetricType::Counter).unwrap();
        fam.append(Value::counter(1), None, &[]).unwrap();

        let m = &mut fam.metrics_mut()[0];
        m.set_value(Value::counter(2)).unwrap();
        let e = m.set_value(Value::gauge(2.0)).unwrap_err();
        assert_eq!(
            e,
            MetricError::TypeMismatch {
                expected: MetricType::Counter,
                found: MetricType::Gauge,
            }
        );
        assert_eq!(fam.metrics()[0].value(), &Value::counter(2));
    }

    #[test]
    fn append_extra_labels() {
        let mut fam = MetricFamily::new("cpu", MetricType::Gauge).unwrap();
        let base = LabelSet::from_pairs([("cpu", "0")]).unwrap();
        fam.append(Value::gauge(1.0), Some(&base), &[("state", "idle")])
            .unwrap();
        let m = &fam.metrics()[0];
        assert_eq!(m.labels.marshal_to_string(), r#"{cpu="0",state="idle"}"#);

        let e = fam
            .append(Value::gauge(2.0), Some(&base), &[("cpu", "1")])
            .unwrap_err();
        assert_eq!(e, MetricError::DuplicateLabel("cpu".to_string()));
        let e = fam
            .append(Value::gauge(2.0), None, &[("a", "1"), ("a", "2")])
            .unwrap_err();
        assert_eq!(e, MetricError::DuplicateLabel("a".to_string()));
        assert_eq!(fam.len(), 1);
    }

    #[test]
    fn reset_and_clone() {
        let mut fam = MetricFamily::new("x", MetricType::Gauge).unwrap();
        fam.append(Value::gauge(1.0), None, &[]).unwrap();
        let empty = fam.clone_empty();
        assert!(empty.is_empty());
        assert_eq!(empty.name(), "x");
        fam.reset();
        assert!(fam.is_empty());
    }
}
