/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod error;
pub use error::{MetricError, RateError};

mod label;
pub use label::{LabelSet, escape_value};

mod value;
pub use value::{
    CounterValue, GaugeValue, Histogram, HistogramBucket, MetricType, StateSet, Summary,
    SummaryQuantile, UnknownValue, Value,
};

mod family;
pub use family::{Metric, MetricFamily};

mod notification;
pub use notification::{Notification, Severity};

mod identity;
pub use identity::SeriesKey;

mod rate;
pub use rate::{CounterCache, CounterWidth, RateState};

mod name;
pub use name::{check_label_name, check_metric_name};
