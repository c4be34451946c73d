/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;

use g3_metric::{MetricFamily, Notification};

use crate::dispatch::WriteError;

mod influxdb;
mod json;
mod openmetrics;

pub use influxdb::InfluxdbFormat;
pub use json::JsonFormat;
pub use openmetrics::OpenMetricsFormat;

/// Serialize metric families and notifications for one kind of sink.
pub trait MetricFormat: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn serialize_family(&self, family: &MetricFamily, buf: &mut Vec<u8>)
    -> Result<(), WriteError>;

    /// Default to the line based text form.
    fn serialize_notification(
        &self,
        notification: &Notification,
        buf: &mut Vec<u8>,
    ) -> Result<(), WriteError> {
        buf.extend_from_slice(notification.marshal_to_string().as_bytes());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatKind {
    #[default]
    Json,
    OpenMetrics,
    Influxdb,
}

impl FormatKind {
    pub fn build(&self) -> Arc<dyn MetricFormat> {
        match self {
            FormatKind::Json => Arc::new(JsonFormat),
            FormatKind::OpenMetrics => Arc::new(OpenMetricsFormat),
            FormatKind::Influxdb => Arc::new(InfluxdbFormat),
        }
    }
}

impl FromStr for FormatKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(FormatKind::Json),
            "openmetrics" | "open_metrics" | "prometheus" => Ok(FormatKind::OpenMetrics),
            "influxdb" | "influx" => Ok(FormatKind::Influxdb),
            _ => Err(anyhow!("unsupported format {s}")),
        }
    }
}

fn write_f64(buf: &mut Vec<u8>, v: f64) {
    if v.is_nan() {
        buf.extend_from_slice(b"NaN");
    } else if v.is_infinite() {
        if v > 0.0 {
            buf.extend_from_slice(b"+Inf");
        } else {
            buf.extend_from_slice(b"-Inf");
        }
    } else {
        let mut b = ryu::Buffer::new();
        buf.extend_from_slice(b.format_finite(v).as_bytes());
    }
}

fn write_int<I: itoa::Integer>(buf: &mut Vec<u8>, v: I) {
    let mut b = itoa::Buffer::new();
    buf.extend_from_slice(b.format(v).as_bytes());
}
