/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;

use crate::{LabelSet, MetricError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    Unknown,
    Gauge,
    Counter,
    StateSet,
    Info,
    Summary,
    Histogram,
    GaugeHistogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Unknown => "unknown",
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::StateSet => "stateset",
            MetricType::Info => "info",
            MetricType::Summary => "summary",
            MetricType::Histogram => "histogram",
            MetricType::GaugeHistogram => "gaugehistogram",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnknownValue {
    Float64(f64),
    Int64(i64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GaugeValue {
    Float64(f64),
    Int64(i64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CounterValue {
    UInt64(u64),
    Float64(f64),
}

macro_rules! impl_scalar_display {
    ($t:ty, $($v:ident => $buf:ident),+) => {
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$v(n) => f.write_str($buf::Buffer::new().format(*n)),)+
                }
            }
        }
    };
}

impl_scalar_display!(UnknownValue, Float64 => ryu, Int64 => itoa);
impl_scalar_display!(GaugeValue, Float64 => ryu, Int64 => itoa);
impl_scalar_display!(CounterValue, UInt64 => itoa, Float64 => ryu);

impl UnknownValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            UnknownValue::Float64(f) => *f,
            UnknownValue::Int64(i) => *i as f64,
        }
    }
}

impl GaugeValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            GaugeValue::Float64(f) => *f,
            GaugeValue::Int64(i) => *i as f64,
        }
    }
}

impl CounterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            CounterValue::UInt64(u) => *u as f64,
            CounterValue::Float64(f) => *f,
        }
    }
}

/// Ordered states with unique names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateSet {
    states: Vec<(String, bool)>,
}

impl StateSet {
    pub fn new() -> Self {
        StateSet::default()
    }

    pub fn add<S: Into<String>>(&mut self, name: S, enabled: bool) -> Result<(), MetricError> {
        let name = name.into();
        if name.is_empty() {
            return Err(MetricError::InvalidArgument("empty state name"));
        }
        if self.states.iter().any(|(n, _)| *n == name) {
            return Err(MetricError::DuplicateLabel(name));
        }
        self.states.push((name, enabled));
        Ok(())
    }

    /// Enable or disable an existing state.
    pub fn set(&mut self, name: &str, enabled: bool) -> Result<(), MetricError> {
        match self.states.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => {
                *v = enabled;
                Ok(())
            }
            None => Err(MetricError::InvalidArgument("no such state")),
        }
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.states.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.states.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SummaryQuantile {
    pub quantile: f64,
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    quantiles: Vec<SummaryQuantile>,
}

impl Summary {
    pub fn new(count: u64, sum: f64) -> Self {
        Summary {
            count,
            sum,
            quantiles: Vec::new(),
        }
    }

    /// Quantiles must lie in `[0, 1]` and be added in ascending order.
    pub fn add_quantile(&mut self, quantile: f64, value: f64) -> Result<(), MetricError> {
        if !(0.0..=1.0).contains(&quantile) {
            return Err(MetricError::InvalidArgument("quantile out of range"));
        }
        if let Some(last) = self.quantiles.last()
            && last.quantile >= quantile
        {
            return Err(MetricError::InvalidArgument("quantiles not ascending"));
        }
        self.quantiles.push(SummaryQuantile { quantile, value });
        Ok(())
    }

    pub fn quantiles(&self) -> &[SummaryQuantile] {
        &self.quantiles
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistogramBucket {
    pub upper_bound: f64,
    /// Cumulative count of observations `<= upper_bound`.
    pub count: u64,
}

/// Cumulative buckets ascending by bound, the last one is always `+Inf`.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    pub sum: f64,
    buckets: Vec<HistogramBucket>,
}

impl Histogram {
    /// Empty histogram with the given bounds, `+Inf` is appended if absent.
    pub fn with_bounds(bounds: &[f64]) -> Result<Self, MetricError> {
        let mut buckets: Vec<HistogramBucket> = Vec::with_capacity(bounds.len() + 1);
        for b in bounds {
            if b.is_nan() {
                return Err(MetricError::InvalidArgument("NaN bucket bound"));
            }
            if let Some(last) = buckets.last()
                && last.upper_bound >= *b
            {
                return Err(MetricError::InvalidArgument("bucket bounds not ascending"));
            }
            buckets.push(HistogramBucket {
                upper_bound: *b,
                count: 0,
            });
        }
        if buckets.last().map(|b| b.upper_bound) != Some(f64::INFINITY) {
            buckets.push(HistogramBucket {
                upper_bound: f64::INFINITY,
                count: 0,
            });
        }
        Ok(Histogram { sum: 0.0, buckets })
    }

    /// Take already accumulated buckets, as read from some external source.
    pub fn from_buckets(sum: f64, buckets: Vec<HistogramBucket>) -> Result<Self, MetricError> {
        let Some(last) = buckets.last() else {
            return Err(MetricError::InvalidArgument("no histogram buckets"));
        };
        if last.upper_bound != f64::INFINITY {
            return Err(MetricError::InvalidArgument("last bucket is not +Inf"));
        }
        for w in buckets.windows(2) {
            if w[0].upper_bound.is_nan() || w[0].upper_bound >= w[1].upper_bound {
                return Err(MetricError::InvalidArgument("bucket bounds not ascending"));
            }
            if w[0].count > w[1].count {
                return Err(MetricError::InvalidArgument("bucket counts not cumulative"));
            }
        }
        Ok(Histogram { sum, buckets })
    }

    /// A NaN observation is only counted in the +Inf bucket and leaves the sum alone.
    pub fn observe(&mut self, v: f64) {
        if v.is_nan() {
            if let Some(last) = self.buckets.last_mut() {
                last.count += 1;
            }
            return;
        }
        self.sum += v;
        for b in self.buckets.iter_mut().rev() {
            if v > b.upper_bound {
                break;
            }
            b.count += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.buckets.last().map(|b| b.count).unwrap_or(0)
    }

    pub fn buckets(&self) -> &[HistogramBucket] {
        &self.buckets
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Unknown(UnknownValue),
    Gauge(GaugeValue),
    Counter(CounterValue),
    StateSet(StateSet),
    Info(LabelSet),
    Summary(Box<Summary>),
    Histogram(Box<Histogram>),
    GaugeHistogram(Box<Histogram>),
}

impl Value {
    pub fn metric_type(&self) -> MetricType {
        match self {
            Value::Unknown(_) => MetricType::Unknown,
            Value::Gauge(_) => MetricType::Gauge,
            Value::Counter(_) => MetricType::Counter,
            Value::StateSet(_) => MetricType::StateSet,
            Value::Info(_) => MetricType::Info,
            Value::Summary(_) => MetricType::Summary,
            Value::Histogram(_) => MetricType::Histogram,
            Value::GaugeHistogram(_) => MetricType::GaugeHistogram,
        }
    }

    pub fn gauge(v: f64) -> Self {
        Value::Gauge(GaugeValue::Float64(v))
    }

    pub fn gauge_i64(v: i64) -> Self {
        Value::Gauge(GaugeValue::Int64(v))
    }

    pub fn counter(v: u64) -> Self {
        Value::Counter(CounterValue::UInt64(v))
    }

    pub fn counter_f64(v: f64) -> Self {
        Value::Counter(CounterValue::Float64(v))
    }
}
