/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use g3_metric::{MetricFamily, Notification};

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::plugin::{PluginKey, ReadHandler};
use crate::stats::ReadStats;

/// What a read handler can reach while it runs.
pub struct ReadContext {
    key: PluginKey,
    interval: Duration,
    dispatcher: Dispatcher,
}

impl ReadContext {
    pub fn new(key: PluginKey, interval: Duration, dispatcher: Dispatcher) -> Self {
        ReadContext {
            key,
            interval,
            dispatcher,
        }
    }

    pub fn key(&self) -> &PluginKey {
        &self.key
    }

    /// The configured interval, not the backed off one.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Dispatch an extra batch besides the returned one.
    pub fn dispatch(&self, batch: Vec<MetricFamily>) -> DispatchReport {
        self.dispatcher.dispatch(batch, Some(self.interval))
    }

    pub async fn notify(&self, notification: &Notification) {
        let errors = self.dispatcher.dispatch_notification(notification).await;
        if !errors.is_empty() {
            debug!(
                "read {}: notification {} failed on {} notifiers",
                self.key,
                notification.name,
                errors.len()
            );
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BackoffPolicy {
    pub(crate) threshold: u32,
    pub(crate) factor: f64,
    pub(crate) ceiling: Duration,
}

impl BackoffPolicy {
    fn next(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.factor)
            .unwrap_or(self.ceiling)
            .min(self.ceiling)
            .max(current)
    }
}

type InvokeResult = (Duration, anyhow::Result<()>);

async fn wait_running(
    running: &mut Option<JoinHandle<InvokeResult>>,
) -> Result<InvokeResult, JoinError> {
    match running {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// Drive one read registration until quit.
pub(super) struct ReadRuntime {
    ctx: Arc<ReadContext>,
    handler: Arc<dyn ReadHandler>,
    stats: Arc<ReadStats>,
    policy: BackoffPolicy,
    grace: Duration,
    quit: watch::Receiver<bool>,

    effective_interval: Duration,
    consecutive_failures: u32,
    last_start: Instant,
    next_tick: Instant,
}

impl ReadRuntime {
    pub(super) fn new(
        ctx: ReadContext,
        handler: Arc<dyn ReadHandler>,
        stats: Arc<ReadStats>,
        policy: BackoffPolicy,
        grace: Duration,
        quit: watch::Receiver<bool>,
    ) -> Self {
        let now = Instant::now();
        let interval = ctx.interval;
        ReadRuntime {
            ctx: Arc::new(ctx),
            handler,
            stats,
            policy,
            grace,
            quit,
            effective_interval: interval,
            consecutive_failures: 0,
            last_start: now,
            next_tick: now,
        }
    }

    pub(super) async fn into_running(mut self) {
        // spread tasks sharing the same interval
        let jitter = self.ctx.interval.mul_f64(fastrand::f64());
        self.next_tick = Instant::now() + jitter;
        self.stats.set_effective_interval(self.effective_interval);

        let mut running: Option<JoinHandle<InvokeResult>> = None;
        loop {
            if *self.quit.borrow() {
                break;
            }

            tokio::select! {
                biased;

                r = self.quit.changed() => {
                    if r.is_err() {
                        break;
                    }
                }
                r = wait_running(&mut running), if running.is_some() => {
                    running = None;
                    self.handle_result(r);
                }
                _ = tokio::time::sleep_until(self.next_tick) => {
                    self.next_tick += self.effective_interval;
                    let now = Instant::now();
                    if self.next_tick < now {
                        self.next_tick = now + self.effective_interval;
                    }

                    if running.is_some() {
                        self.stats.add_skipped();
                        warn!(
                            "read {}: previous invocation is still running, this one is skipped",
                            self.ctx.key
                        );
                    } else {
                        self.last_start = now;
                        running = Some(self.spawn_invocation());
                    }
                }
            }
        }

        if let Some(handle) = running {
            match tokio::time::timeout(self.grace, handle).await {
                Ok(r) => self.handle_result(r),
                Err(_) => warn!(
                    "read {}: invocation still running after {:?}, abandoned",
                    self.ctx.key, self.grace
                ),
            }
        }
        debug!("read {}: quit", self.ctx.key);
    }

    fn spawn_invocation(&self) -> JoinHandle<InvokeResult> {
        let ctx = self.ctx.clone();
        let handler = self.handler.clone();
        let interval = self.effective_interval;
        tokio::spawn(async move {
            let start = Instant::now();
            let r = handler.read(&ctx).await;
            let elapsed = start.elapsed();
            match r {
                Ok(batch) => {
                    let report = ctx.dispatcher.dispatch(batch, Some(interval));
                    if !report.is_ok() {
                        debug!(
                            "read {}: {} sink failures while dispatching",
                            ctx.key,
                            report.failures.len()
                        );
                    }
                    (elapsed, Ok(()))
                }
                Err(e) => (elapsed, Err(e)),
            }
        })
    }

    fn set_effective_interval(&mut self, interval: Duration) {
        self.effective_interval = interval;
        self.stats.set_effective_interval(interval);
        self.next_tick = self.last_start + interval;
    }

    fn handle_result(&mut self, r: Result<InvokeResult, JoinError>) {
        let (elapsed, result) = match r {
            Ok(v) => v,
            Err(e) => (Duration::ZERO, Err(anyhow!("read handler panicked: {e}"))),
        };
        self.stats.add_call(elapsed, result.is_err());
        if elapsed > self.effective_interval {
            warn!(
                "read {}: took {elapsed:?}, longer than the interval {:?}",
                self.ctx.key, self.effective_interval
            );
        }

        match result {
            Ok(_) => {
                self.consecutive_failures = 0;
                if self.effective_interval != self.ctx.interval {
                    info!(
                        "read {}: succeeded again, interval reset to {:?}",
                        self.ctx.key, self.ctx.interval
                    );
                    self.set_effective_interval(self.ctx.interval);
                }
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!("read {}: failed: {e:?}", self.ctx.key);
                if self.consecutive_failures >= self.policy.threshold {
                    let next = self.policy.next(self.effective_interval);
                    if next != self.effective_interval {
                        info!(
                            "read {}: {} consecutive failures, interval backed off to {next:?}",
                            self.ctx.key, self.consecutive_failures
                        );
                        self.set_effective_interval(next);
                    }
                }
            }
        }
    }
}
