/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::Write;

use g3_metric::{CounterValue, GaugeValue, LabelSet, Metric, MetricFamily, Value};

use super::{MetricFormat, write_f64, write_int};
use crate::dispatch::WriteError;

/// InfluxDB line protocol, timestamps in nanoseconds.
pub struct InfluxdbFormat;

fn write_escaped(buf: &mut Vec<u8>, s: &str, escape_equal: bool) {
    for c in s.chars() {
        match c {
            ',' | ' ' => {
                buf.push(b'\\');
                buf.push(c as u8);
            }
            '=' if escape_equal => buf.extend_from_slice(b"\\="),
            '\n' => buf.extend_from_slice(b"\\n"),
            _ => {
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

fn write_tags(buf: &mut Vec<u8>, labels: &LabelSet) {
    for (k, v) in labels.iter() {
        if v.is_empty() {
            continue;
        }
        buf.push(b',');
        write_escaped(buf, k, true);
        buf.push(b'=');
        write_escaped(buf, v, true);
    }
}

fn checked_f64(v: f64) -> Result<f64, WriteError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(WriteError::Serialization(format!(
            "non-finite value {v} is not supported by line protocol"
        )))
    }
}

enum Field {
    Float(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

struct LineWriter<'a> {
    buf: &'a mut Vec<u8>,
    field_count: usize,
}

impl LineWriter<'_> {
    fn field(&mut self, key: &str, value: Field) -> Result<(), WriteError> {
        self.buf.push(if self.field_count == 0 { b' ' } else { b',' });
        self.field_count += 1;
        write_escaped(self.buf, key, true);
        self.buf.push(b'=');
        match value {
            Field::Float(f) => write_f64(self.buf, checked_f64(f)?),
            Field::Int(i) => {
                write_int(self.buf, i);
                self.buf.push(b'i');
            }
            Field::UInt(u) => {
                write_int(self.buf, u);
                self.buf.push(b'u');
            }
            Field::Bool(b) => self
                .buf
                .extend_from_slice(if b { b"true" } else { b"false" }),
        }
        Ok(())
    }
}

fn serialize_metric(
    family: &MetricFamily,
    metric: &Metric,
    buf: &mut Vec<u8>,
) -> Result<(), WriteError> {
    write_escaped(buf, family.name(), false);
    write_tags(buf, &metric.labels);
    if let Value::Info(info) = metric.value() {
        write_tags(buf, info);
    }

    let mut w = LineWriter {
        buf: &mut *buf,
        field_count: 0,
    };
    match metric.value() {
        Value::Unknown(v) => w.field("value", Field::Float(v.as_f64()))?,
        Value::Gauge(GaugeValue::Float64(f)) => w.field("value", Field::Float(*f))?,
        Value::Gauge(GaugeValue::Int64(i)) => w.field("value", Field::Int(*i))?,
        Value::Counter(CounterValue::Float64(f)) => w.field("value", Field::Float(*f))?,
        Value::Counter(CounterValue::UInt64(u)) => w.field("value", Field::UInt(*u))?,
        Value::StateSet(set) => {
            for (state, enabled) in set.iter() {
                w.field(state, Field::Bool(enabled))?;
            }
        }
        Value::Info(_) => w.field("value", Field::Int(1))?,
        Value::Summary(s) => {
            w.field("count", Field::UInt(s.count))?;
            w.field("sum", Field::Float(s.sum))?;
            for q in s.quantiles() {
                let key = format!("quantile_{}", q.quantile);
                w.field(&key, Field::Float(q.value))?;
            }
        }
        Value::Histogram(h) | Value::GaugeHistogram(h) => {
            w.field("count", Field::UInt(h.count()))?;
            w.field("sum", Field::Float(h.sum))?;
            for b in h.buckets() {
                let key = if b.upper_bound.is_infinite() {
                    "le_+Inf".to_string()
                } else {
                    format!("le_{}", b.upper_bound)
                };
                w.field(&key, Field::UInt(b.count))?;
            }
        }
    }
    if w.field_count == 0 {
        return Err(WriteError::Serialization(format!(
            "no field to write for metric family {}",
            family.name()
        )));
    }

    if let Some(ns) = metric.time.and_then(|t| t.timestamp_nanos_opt()) {
        let _ = write!(buf, " {ns}");
    }
    buf.push(b'\n');
    Ok(())
}

impl MetricFormat for InfluxdbFormat {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn serialize_family(
        &self,
        family: &MetricFamily,
        buf: &mut Vec<u8>,
    ) -> Result<(), WriteError> {
        for metric in family.metrics() {
            serialize_metric(family, metric, buf)?;
        }
        Ok(())
    }
}
