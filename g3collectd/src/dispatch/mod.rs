/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ahash::AHashSet;
use anyhow::anyhow;
use chrono::Utc;
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use g3_metric::{LabelSet, MetricFamily, Notification};

use crate::plugin::{NotificationHandler, PluginKey};

mod buffer;

mod filter;
pub use filter::{LabelFilter, MetricFilter};

mod sink;
use sink::WriteSink;
pub use sink::{SinkNotifier, WriteTask};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("serialization failure: {0}")]
    Serialization(String),
    #[error("transport failure: {0:#}")]
    Transport(anyhow::Error),
    #[error("transport timed out")]
    Timeout,
    #[error("flush queue is full")]
    QueueFull,
    #[error("sink is closed")]
    Closed,
}

/// Sink local failures seen while dispatching one batch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub failures: Vec<(PluginKey, WriteError)>,
}

impl DispatchReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct DispatcherBuilder {
    global_labels: LabelSet,
    flush_workers: usize,
    flush_queue_size: usize,
    notification_timeout: Duration,
    sinks: Vec<(PluginKey, WriteTask, Duration)>,
    notifiers: Vec<(PluginKey, Arc<dyn NotificationHandler>)>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        DispatcherBuilder {
            global_labels: LabelSet::new(),
            flush_workers: 4,
            flush_queue_size: 1024,
            notification_timeout: Duration::from_secs(5),
            sinks: Vec::new(),
            notifiers: Vec::new(),
        }
    }
}

impl DispatcherBuilder {
    pub fn global_labels(mut self, labels: LabelSet) -> Self {
        self.global_labels = labels;
        self
    }

    pub fn flush_workers(mut self, workers: usize) -> Self {
        self.flush_workers = workers.max(1);
        self
    }

    pub fn flush_queue_size(mut self, size: usize) -> Self {
        self.flush_queue_size = size;
        self
    }

    pub fn notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    /// Add a write sink, the interval is the default max buffer age.
    pub fn add_sink(mut self, key: PluginKey, task: WriteTask, interval: Duration) -> Self {
        self.sinks.push((key, task, interval));
        self
    }

    pub fn add_notifier(mut self, key: PluginKey, handler: Arc<dyn NotificationHandler>) -> Self {
        self.notifiers.push((key, handler));
        self
    }

    /// Spawn the flusher of each sink, must be called inside a tokio runtime.
    pub fn build(self) -> Dispatcher {
        let workers = Arc::new(Semaphore::new(self.flush_workers));
        let mut sinks = Vec::with_capacity(self.sinks.len());
        let mut flushers = Vec::with_capacity(self.sinks.len());
        for (key, task, interval) in self.sinks {
            let (sink, handle) =
                WriteSink::spawn(key, task, interval, self.flush_queue_size, workers.clone());
            sinks.push(sink);
            flushers.push(handle);
        }
        Dispatcher {
            inner: Arc::new(DispatcherInner {
                global_labels: self.global_labels,
                sinks,
                notifiers: self.notifiers,
                notification_timeout: self.notification_timeout,
                flushers: Mutex::new(flushers),
            }),
        }
    }
}

struct DispatcherInner {
    global_labels: LabelSet,
    sinks: Vec<WriteSink>,
    notifiers: Vec<(PluginKey, Arc<dyn NotificationHandler>)>,
    notification_timeout: Duration,
    flushers: Mutex<Vec<JoinHandle<()>>>,
}

/// Fan batches out to every write sink and notifications to every notifier.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn sink_count(&self) -> usize {
        self.inner.sinks.len()
    }

    /// Hand a batch to each sink in registration order.
    ///
    /// Missing timestamps and intervals are stamped here. A failure of one
    /// sink is reported and never stops delivery to the following ones.
    pub fn dispatch(&self, batch: Vec<MetricFamily>, interval: Option<Duration>) -> DispatchReport {
        let now = Utc::now();
        let mut names = AHashSet::with_capacity(batch.len());
        let mut families = Vec::with_capacity(batch.len());
        for mut family in batch {
            if family.is_empty() {
                continue;
            }
            if !names.insert(family.name().to_string()) {
                warn!("duplicate metric family {} in one batch dropped", family.name());
                continue;
            }
            for m in family.metrics_mut() {
                if m.time.is_none() {
                    m.time = Some(now);
                }
                if m.interval.is_none() {
                    m.interval = interval;
                }
                m.labels.merge_missing(&self.inner.global_labels);
            }
            families.push(family);
        }

        let mut report = DispatchReport::default();
        for sink in &self.inner.sinks {
            for family in &families {
                let r = match sink.filter() {
                    Some(filter) => {
                        let mut family = family.clone();
                        if !filter.filter(&mut family) || family.is_empty() {
                            continue;
                        }
                        sink.append(&family)
                    }
                    None => sink.append(family),
                };
                if let Err(e) = r {
                    debug!("sink {}: failed to append {}: {e}", sink.key(), family.name());
                    report.failures.push((sink.key().clone(), e));
                }
            }
        }
        report
    }

    /// Deliver a notification to every notifier, each with a bounded time.
    pub async fn dispatch_notification(
        &self,
        notification: &Notification,
    ) -> Vec<(PluginKey, anyhow::Error)> {
        let mut notification = notification.clone();
        notification.labels.merge_missing(&self.inner.global_labels);

        let mut errors = Vec::new();
        for (key, handler) in &self.inner.notifiers {
            match tokio::time::timeout(
                self.inner.notification_timeout,
                handler.notify(&notification),
            )
            .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!("notifier {key}: failed to deliver {}: {e:?}", notification.name);
                    errors.push((key.clone(), e));
                }
                Err(_) => {
                    warn!("notifier {key}: timed out delivering {}", notification.name);
                    errors.push((key.clone(), anyhow!("timed out")));
                }
            }
        }
        errors
    }

    /// Flush the buffer of every sink and wait for the result.
    pub async fn flush_all(&self) -> Vec<(PluginKey, WriteError)> {
        let mut set = JoinSet::new();
        for i in 0..self.inner.sinks.len() {
            let inner = self.inner.clone();
            set.spawn(async move {
                let sink = &inner.sinks[i];
                sink.flush().await.map_err(|e| (sink.key().clone(), e))
            });
        }

        let mut errors = Vec::new();
        while let Some(r) = set.join_next().await {
            if let Ok(Err(e)) = r {
                errors.push(e);
            }
        }
        errors
    }

    /// Flush what is left and stop every flusher.
    pub async fn close(&self) {
        for sink in &self.inner.sinks {
            sink.quit().await;
        }
        let flushers = std::mem::take(&mut *self.inner.flushers.lock().unwrap());
        for handle in flushers {
            let _ = handle.await;
        }
    }
}
