/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::borrow::Cow;

use g3_metric::{LabelSet, Metric, MetricFamily, Value};

use super::{MetricFormat, write_f64, write_int};
use crate::dispatch::WriteError;

/// OpenMetrics text exposition, timestamps in milliseconds.
pub struct OpenMetricsFormat;

fn f64_label_value(v: f64) -> String {
    let mut buf = Vec::with_capacity(24);
    write_f64(&mut buf, v);
    String::from_utf8(buf).unwrap_or_default()
}

/// Label names may not contain ':' or '.' which metric names allow.
fn state_label_name(name: &str) -> Cow<'_, str> {
    if name.contains([':', '.']) {
        Cow::Owned(name.replace([':', '.'], "_"))
    } else {
        Cow::Borrowed(name)
    }
}

fn write_escaped(buf: &mut Vec<u8>, v: &str) {
    let mut s = String::with_capacity(v.len());
    g3_metric::escape_value(&mut s, v);
    buf.extend_from_slice(s.as_bytes());
}

fn write_labels(buf: &mut Vec<u8>, labels: &LabelSet, extra: &[(&str, &str)]) {
    if labels.is_empty() && extra.is_empty() {
        return;
    }
    buf.push(b'{');
    let mut first = true;
    for (name, value) in labels.iter().chain(extra.iter().copied()) {
        if !first {
            buf.push(b',');
        }
        first = false;
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b"=\"");
        write_escaped(buf, value);
        buf.push(b'"');
    }
    buf.push(b'}');
}

struct SampleWriter<'a> {
    buf: &'a mut Vec<u8>,
    name: &'a str,
    metric: &'a Metric,
}

impl SampleWriter<'_> {
    fn start(&mut self, suffix: &str, extra: &[(&str, &str)]) {
        self.buf.extend_from_slice(self.name.as_bytes());
        self.buf.extend_from_slice(suffix.as_bytes());
        write_labels(self.buf, &self.metric.labels, extra);
        self.buf.push(b' ');
    }

    fn finish(&mut self) {
        if let Some(time) = self.metric.time {
            self.buf.push(b' ');
            write_int(self.buf, time.timestamp_millis());
        }
        self.buf.push(b'\n');
    }

    fn f64(&mut self, suffix: &str, extra: &[(&str, &str)], v: f64) {
        self.start(suffix, extra);
        write_f64(self.buf, v);
        self.finish();
    }

    fn u64(&mut self, suffix: &str, extra: &[(&str, &str)], v: u64) {
        self.start(suffix, extra);
        write_int(self.buf, v);
        self.finish();
    }

    fn i64(&mut self, suffix: &str, extra: &[(&str, &str)], v: i64) {
        self.start(suffix, extra);
        write_int(self.buf, v);
        self.finish();
    }
}

fn write_help(buf: &mut Vec<u8>, help: &str) {
    for c in help.chars() {
        match c {
            '\\' => buf.extend_from_slice(b"\\\\"),
            '\n' => buf.extend_from_slice(b"\\n"),
            _ => {
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

impl MetricFormat for OpenMetricsFormat {
    fn content_type(&self) -> &'static str {
        "application/openmetrics-text; version=1.0.0; charset=utf-8"
    }

    fn serialize_family(
        &self,
        family: &MetricFamily,
        buf: &mut Vec<u8>,
    ) -> Result<(), WriteError> {
        let name = family.name();
        let type_name = family.metric_type().as_str();
        buf.extend_from_slice(b"# TYPE ");
        buf.extend_from_slice(name.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(type_name.as_bytes());
        buf.push(b'\n');
        if let Some(unit) = family.unit() {
            buf.extend_from_slice(b"# UNIT ");
            buf.extend_from_slice(name.as_bytes());
            buf.push(b' ');
            buf.extend_from_slice(unit.as_bytes());
            buf.push(b'\n');
        }
        if let Some(help) = family.help() {
            buf.extend_from_slice(b"# HELP ");
            buf.extend_from_slice(name.as_bytes());
            buf.push(b' ');
            write_help(buf, help);
            buf.push(b'\n');
        }

        let counter_suffix = if name.ends_with("_total") { "" } else { "_total" };

        for metric in family.metrics() {
            let mut w = SampleWriter {
                buf: &mut *buf,
                name,
                metric,
            };
            match metric.value() {
                Value::Unknown(v) => w.f64("", &[], v.as_f64()),
                Value::Gauge(g3_metric::GaugeValue::Int64(i)) => w.i64("", &[], *i),
                Value::Gauge(g3_metric::GaugeValue::Float64(f)) => w.f64("", &[], *f),
                Value::Counter(g3_metric::CounterValue::UInt64(u)) => {
                    w.u64(counter_suffix, &[], *u)
                }
                Value::Counter(g3_metric::CounterValue::Float64(f)) => {
                    w.f64(counter_suffix, &[], *f)
                }
                Value::StateSet(set) => {
                    let label = state_label_name(name);
                    for (state, enabled) in set.iter() {
                        w.u64("", &[(label.as_ref(), state)], enabled as u64);
                    }
                }
                Value::Info(info) => {
                    let extra: Vec<(&str, &str)> = info.iter().collect();
                    w.u64("_info", &extra, 1);
                }
                Value::Summary(summary) => {
                    for q in summary.quantiles() {
                        let quantile = f64_label_value(q.quantile);
                        w.f64("", &[("quantile", &quantile)], q.value);
                    }
                    w.u64("_count", &[], summary.count);
                    w.f64("_sum", &[], summary.sum);
                }
                Value::Histogram(h) | Value::GaugeHistogram(h) => {
                    for bucket in h.buckets() {
                        let le = f64_label_value(bucket.upper_bound);
                        w.u64("_bucket", &[("le", &le)], bucket.count);
                    }
                    if matches!(metric.value(), Value::GaugeHistogram(_)) {
                        w.u64("_gcount", &[], h.count());
                        w.f64("_gsum", &[], h.sum);
                    } else {
                        w.u64("_count", &[], h.count());
                        w.f64("_sum", &[], h.sum);
                    }
                }
            }
        }
        Ok(())
    }
}
