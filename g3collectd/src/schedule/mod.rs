/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::GlobalConfig;
use crate::dispatch::Dispatcher;
use crate::plugin::{Category, FlushHandler, Handler, PluginKey, Registry, ShutdownHandler};
use crate::stats::StatsIndex;

mod read;
use read::{BackoffPolicy, ReadRuntime};
pub use read::ReadContext;

/// Categories dropped for a plugin whose init handler failed.
const DISABLED_ON_INIT_FAILURE: &[Category] = &[
    Category::Read,
    Category::Write,
    Category::Notification,
    Category::Flush,
];

/// Errors collected while tearing down, none of them stops the teardown.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub errors: Vec<(Category, PluginKey, anyhow::Error)>,
    /// Shutdown handlers which did not finish within their time budget.
    pub abandoned: Vec<PluginKey>,
}

impl ShutdownReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.abandoned.is_empty()
    }
}

pub struct Scheduler {
    registry: Registry,
    global: Arc<GlobalConfig>,
    initialized: bool,
}

impl Scheduler {
    pub fn new(registry: Registry, global: GlobalConfig) -> Self {
        Scheduler {
            registry,
            global: Arc::new(global),
            initialized: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run init handlers once, in registration order.
    ///
    /// A plugin whose init fails has its periodic and sink handlers removed,
    /// its shutdown handler is kept.
    pub async fn init(&mut self) -> Vec<(PluginKey, anyhow::Error)> {
        if self.initialized {
            return Vec::new();
        }
        self.initialized = true;

        let handlers: Vec<_> = self
            .registry
            .iter(Category::Init)
            .filter_map(|r| match &r.handler {
                Handler::Init(h) => Some((r.key.clone(), h.clone())),
                _ => None,
            })
            .collect();

        let mut errors = Vec::new();
        for (key, handler) in handlers {
            if let Err(e) = handler.init().await {
                warn!("init of {key} failed, all its tasks are disabled: {e:?}");
                errors.push((key, e));
            } else {
                debug!("init of {key} done");
            }
        }

        for (key, _) in &errors {
            for (k, e) in self
                .registry
                .unregister_plugin(key.plugin(), DISABLED_ON_INIT_FAILURE)
            {
                warn!("failed to release handler of {k}: {e:?}");
            }
        }
        errors
    }

    /// Start sinks and read tasks, running init first if not done yet.
    pub async fn start(mut self) -> RunningScheduler {
        self.init().await;

        let global = &self.global;
        let mut builder = Dispatcher::builder()
            .global_labels(global.labels.clone())
            .flush_workers(global.flush_workers)
            .flush_queue_size(global.flush_queue_length)
            .notification_timeout(global.notification_timeout);
        for r in self.registry.iter(Category::Write) {
            if let Handler::Write(task) = &r.handler {
                builder = builder.add_sink(r.key.clone(), task.clone(), r.interval);
            }
        }
        for r in self.registry.iter(Category::Notification) {
            if let Handler::Notification(h) = &r.handler {
                builder = builder.add_notifier(r.key.clone(), h.clone());
            }
        }
        let dispatcher = builder.build();

        let policy = BackoffPolicy {
            threshold: global.backoff_threshold,
            factor: global.backoff_factor,
            ceiling: global.max_read_interval,
        };
        let (quit_sender, quit_receiver) = watch::channel(false);
        let mut reads = Vec::new();
        for r in self.registry.iter(Category::Read) {
            let Handler::Read(handler) = &r.handler else {
                continue;
            };
            let ctx = ReadContext::new(r.key.clone(), r.interval, dispatcher.clone());
            let runtime = ReadRuntime::new(
                ctx,
                handler.clone(),
                r.read_stats.clone().unwrap_or_default(),
                policy,
                global.shutdown_grace,
                quit_receiver.clone(),
            );
            reads.push(tokio::spawn(runtime.into_running()));
        }
        info!(
            "scheduler started with {} read tasks and {} write tasks",
            reads.len(),
            dispatcher.sink_count()
        );

        RunningScheduler {
            registry: self.registry,
            global: self.global,
            dispatcher,
            quit_sender,
            reads,
        }
    }
}

pub struct RunningScheduler {
    registry: Registry,
    global: Arc<GlobalConfig>,
    dispatcher: Dispatcher,
    quit_sender: watch::Sender<bool>,
    reads: Vec<JoinHandle<()>>,
}

impl RunningScheduler {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> &Arc<StatsIndex> {
        self.registry.stats()
    }

    fn handlers<T, F>(&self, category: Category, f: F) -> Vec<(PluginKey, T)>
    where
        F: Fn(&Handler) -> Option<T>,
    {
        self.registry
            .iter(category)
            .filter_map(|r| f(&r.handler).map(|h| (r.key.clone(), h)))
            .collect()
    }

    /// Flush every sink, then call every flush handler.
    pub async fn flush(&self, timeout: Duration) -> Vec<(PluginKey, anyhow::Error)> {
        let mut errors = Vec::new();
        match tokio::time::timeout(timeout, self.dispatcher.flush_all()).await {
            Ok(failed) => {
                for (key, e) in failed {
                    warn!("sink {key}: flush failed: {e}");
                    errors.push((key, anyhow::Error::new(e)));
                }
            }
            Err(_) => warn!("flushing all sinks timed out after {timeout:?}"),
        }

        let handlers: Vec<(PluginKey, Arc<dyn FlushHandler>)> =
            self.handlers(Category::Flush, |h| match h {
                Handler::Flush(h) => Some(h.clone()),
                _ => None,
            });
        for (key, handler) in handlers {
            match tokio::time::timeout(timeout, handler.flush(timeout)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!("flush of {key} failed: {e:?}");
                    errors.push((key, e));
                }
                Err(_) => {
                    warn!("flush of {key} timed out");
                    errors.push((key, anyhow!("timed out")));
                }
            }
        }
        errors
    }

    /// Stop read tasks, flush, run shutdown handlers and release everything.
    pub async fn shutdown(mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        let _ = self.quit_sender.send(true);
        for handle in self.reads.drain(..) {
            // each read runtime bounds its own wait by the grace period
            let _ = handle.await;
        }
        debug!("all read tasks stopped");

        for (key, e) in self.flush(self.global.shutdown_timeout).await {
            report.errors.push((Category::Flush, key, e));
        }

        let handlers: Vec<(PluginKey, Arc<dyn ShutdownHandler>)> =
            self.handlers(Category::Shutdown, |h| match h {
                Handler::Shutdown(h) => Some(h.clone()),
                _ => None,
            });
        for (key, handler) in handlers.into_iter().rev() {
            let task = tokio::spawn(async move { handler.shutdown().await });
            match tokio::time::timeout(self.global.shutdown_timeout, task).await {
                Ok(Ok(Ok(_))) => debug!("shutdown of {key} done"),
                Ok(Ok(Err(e))) => {
                    warn!("shutdown of {key} failed: {e:?}");
                    report.errors.push((Category::Shutdown, key, e));
                }
                Ok(Err(e)) => {
                    warn!("shutdown of {key} panicked: {e}");
                    report
                        .errors
                        .push((Category::Shutdown, key, anyhow!("panicked: {e}")));
                }
                Err(_) => {
                    warn!(
                        "shutdown of {key} did not finish in {:?}, abandoned",
                        self.global.shutdown_timeout
                    );
                    report.errors.push((
                        Category::Shutdown,
                        key.clone(),
                        anyhow!("timed out"),
                    ));
                    report.abandoned.push(key);
                }
            }
        }

        if tokio::time::timeout(self.global.shutdown_timeout, self.dispatcher.close())
            .await
            .is_err()
        {
            warn!("closing sinks timed out");
        }

        for category in Category::ALL {
            for (key, e) in self.registry.unregister_all(category) {
                warn!("failed to release {category} handler of {key}: {e:?}");
                report.errors.push((category, key, e));
            }
        }
        info!("scheduler stopped");
        report
    }
}
