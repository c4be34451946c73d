/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use serde_json::{Map, Number, Value as JsonValue, json};

use g3_metric::{CounterValue, GaugeValue, LabelSet, MetricFamily, Notification, Value};

use super::MetricFormat;
use crate::dispatch::WriteError;

/// One JSON object per family or notification, newline separated.
pub struct JsonFormat;

fn json_f64(v: f64) -> JsonValue {
    match Number::from_f64(v) {
        Some(n) => JsonValue::Number(n),
        None if v.is_nan() => JsonValue::String("NaN".to_string()),
        None if v > 0.0 => JsonValue::String("+Inf".to_string()),
        None => JsonValue::String("-Inf".to_string()),
    }
}

fn json_labels(labels: &LabelSet) -> JsonValue {
    let map: Map<String, JsonValue> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), JsonValue::String(v.to_string())))
        .collect();
    JsonValue::Object(map)
}

fn json_value(value: &Value) -> JsonValue {
    match value {
        Value::Unknown(v) => json_f64(v.as_f64()),
        Value::Gauge(GaugeValue::Int64(i)) => json!(i),
        Value::Gauge(GaugeValue::Float64(f)) => json_f64(*f),
        Value::Counter(CounterValue::UInt64(u)) => json!(u),
        Value::Counter(CounterValue::Float64(f)) => json_f64(*f),
        Value::StateSet(set) => {
            let map: Map<String, JsonValue> = set
                .iter()
                .map(|(k, v)| (k.to_string(), JsonValue::Bool(v)))
                .collect();
            JsonValue::Object(map)
        }
        Value::Info(info) => json_labels(info),
        Value::Summary(s) => {
            let quantiles: Vec<JsonValue> = s
                .quantiles()
                .iter()
                .map(|q| json!({"quantile": json_f64(q.quantile), "value": json_f64(q.value)}))
                .collect();
            json!({
                "count": s.count,
                "sum": json_f64(s.sum),
                "quantiles": quantiles,
            })
        }
        Value::Histogram(h) | Value::GaugeHistogram(h) => {
            let buckets: Vec<JsonValue> = h
                .buckets()
                .iter()
                .map(|b| json!({"le": json_f64(b.upper_bound), "count": b.count}))
                .collect();
            json!({
                "count": h.count(),
                "sum": json_f64(h.sum),
                "buckets": buckets,
            })
        }
    }
}

impl MetricFormat for JsonFormat {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn serialize_family(
        &self,
        family: &MetricFamily,
        buf: &mut Vec<u8>,
    ) -> Result<(), WriteError> {
        let metrics: Vec<JsonValue> = family
            .metrics()
            .iter()
            .map(|m| {
                let mut obj = Map::with_capacity(4);
                obj.insert("labels".to_string(), json_labels(&m.labels));
                if let Some(time) = m.time {
                    obj.insert("timestamp".to_string(), json!(time.timestamp_millis()));
                }
                if let Some(interval) = m.interval {
                    obj.insert("interval".to_string(), json_f64(interval.as_secs_f64()));
                }
                obj.insert("value".to_string(), json_value(m.value()));
                JsonValue::Object(obj)
            })
            .collect();

        let mut obj = Map::with_capacity(5);
        obj.insert("name".to_string(), json!(family.name()));
        obj.insert("type".to_string(), json!(family.metric_type().as_str()));
        if let Some(help) = family.help() {
            obj.insert("help".to_string(), json!(help));
        }
        if let Some(unit) = family.unit() {
            obj.insert("unit".to_string(), json!(unit));
        }
        obj.insert("metrics".to_string(), JsonValue::Array(metrics));

        serde_json::to_writer(&mut *buf, &obj)
            .map_err(|e| WriteError::Serialization(e.to_string()))?;
        buf.push(b'\n');
        Ok(())
    }

    fn serialize_notification(
        &self,
        notification: &Notification,
        buf: &mut Vec<u8>,
    ) -> Result<(), WriteError> {
        let obj = json!({
            "name": notification.name,
            "severity": notification.severity.as_str(),
            "timestamp": notification.time.timestamp_millis(),
            "labels": json_labels(&notification.labels),
            "annotations": json_labels(&notification.annotations),
        });
        serde_json::to_writer(&mut *buf, &obj)
            .map_err(|e| WriteError::Serialization(e.to_string()))?;
        buf.push(b'\n');
        Ok(())
    }
}
