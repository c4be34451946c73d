/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use g3_metric::{MetricError, MetricFamily, MetricType, Value};

use crate::config::ReadTaskConfig;
use crate::plugin::{ConfigHandler, Handler, PluginKey, ReadHandler, Registry};
use crate::schedule::ReadContext;
use crate::stats::{ReadStatsSnapshot, SinkStatsSnapshot, StatsIndex};

pub const PLUGIN_NAME: &str = "internal";

/// Accept `plugin: internal` read blocks.
pub struct InternalStatsConfig;

impl ConfigHandler for InternalStatsConfig {
    fn configure(&self, registry: &mut Registry, config: &ReadTaskConfig) -> anyhow::Result<()> {
        config.foreach_setting(|k, _| Err(anyhow!("invalid key {k}")))?;
        register(registry, &config.instance, config.interval)
    }
}

pub fn register(
    registry: &mut Registry,
    instance: &str,
    interval: Option<Duration>,
) -> anyhow::Result<()> {
    let handler = InternalStats::new(registry.stats().clone());
    registry.register(PLUGIN_NAME, instance, Handler::Read(Arc::new(handler)), interval)?;
    Ok(())
}

/// Report the read and write statistics of the daemon itself.
pub struct InternalStats {
    index: Arc<StatsIndex>,
}

impl InternalStats {
    pub fn new(index: Arc<StatsIndex>) -> Self {
        InternalStats { index }
    }
}

fn family<I>(
    name: &str,
    help: &str,
    metric_type: MetricType,
    rows: I,
) -> Result<MetricFamily, MetricError>
where
    I: IntoIterator<Item = (PluginKey, Value)>,
{
    let mut family = MetricFamily::new(name, metric_type)?.with_help(help);
    for (key, value) in rows {
        family.append(
            value,
            None,
            &[("plugin", key.plugin()), ("instance", key.instance())],
        )?;
    }
    Ok(family)
}

type ReadColumn = (&'static str, &'static str, MetricType, fn(&ReadStatsSnapshot) -> Value);
type WriteColumn = (&'static str, &'static str, fn(&SinkStatsSnapshot) -> u64);

const READ_COLUMNS: &[ReadColumn] = &[
    ("g3collectd_read_calls", "read invocations", MetricType::Counter, |s| {
        Value::counter(s.calls)
    }),
    ("g3collectd_read_failures", "failed read invocations", MetricType::Counter, |s| {
        Value::counter(s.failures)
    }),
    (
        "g3collectd_read_skipped",
        "read invocations skipped as the previous one was still running",
        MetricType::Counter,
        |s| Value::counter(s.skipped),
    ),
    (
        "g3collectd_read_elapsed_seconds",
        "time spent in read handlers",
        MetricType::Counter,
        |s| Value::counter_f64(s.elapsed.as_secs_f64()),
    ),
    (
        "g3collectd_read_interval_seconds",
        "effective read interval",
        MetricType::Gauge,
        |s| Value::gauge(s.effective_interval.as_secs_f64()),
    ),
];

const WRITE_COLUMNS: &[WriteColumn] = &[
    ("g3collectd_write_metrics", "metrics appended to the sink", |s| s.metrics),
    (
        "g3collectd_write_serialize_failures",
        "families the sink failed to serialize",
        |s| s.serialize_failures,
    ),
    ("g3collectd_write_flushes", "successful flushes", |s| s.flushes),
    ("g3collectd_write_flush_failures", "failed flushes", |s| s.flush_failures),
    ("g3collectd_write_sent_bytes", "bytes handed to the transport", |s| s.bytes_sent),
    ("g3collectd_write_dropped_bytes", "bytes dropped without being sent", |s| s.bytes_dropped),
    ("g3collectd_write_notifications", "notifications delivered", |s| s.notifications),
    (
        "g3collectd_write_notification_failures",
        "notifications failed",
        |s| s.notification_failures,
    ),
];

#[async_trait]
impl ReadHandler for InternalStats {
    async fn read(&self, _ctx: &ReadContext) -> anyhow::Result<Vec<MetricFamily>> {
        let read = self.index.read_snapshots();
        let write = self.index.write_snapshots();

        let mut families = Vec::with_capacity(READ_COLUMNS.len() + WRITE_COLUMNS.len());
        if !read.is_empty() {
            for (name, help, metric_type, f) in READ_COLUMNS {
                let rows = read.iter().map(|(k, s)| (k.clone(), f(s)));
                families.push(family(name, help, *metric_type, rows)?);
            }
        }
        if !write.is_empty() {
            for (name, help, f) in WRITE_COLUMNS {
                let rows = write.iter().map(|(k, s)| (k.clone(), Value::counter(f(s))));
                families.push(family(name, help, MetricType::Counter, rows)?);
            }
        }
        Ok(families)
    }
}
