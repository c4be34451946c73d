/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::plugin::PluginKey;

#[derive(Default)]
pub struct ReadStats {
    calls: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
    elapsed_nanos: AtomicU64,
    effective_interval_millis: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStatsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub skipped: u64,
    pub elapsed: Duration,
    pub effective_interval: Duration,
}

impl ReadStats {
    pub(crate) fn add_call(&self, elapsed: Duration, failed: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn add_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_effective_interval(&self, interval: Duration) {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.effective_interval_millis
            .store(millis, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReadStatsSnapshot {
        ReadStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            elapsed: Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed)),
            effective_interval: Duration::from_millis(
                self.effective_interval_millis.load(Ordering::Relaxed),
            ),
        }
    }
}

#[derive(Default)]
pub struct SinkStats {
    metrics: AtomicU64,
    serialize_failures: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_dropped: AtomicU64,
    notifications: AtomicU64,
    notification_failures: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    pub metrics: u64,
    pub serialize_failures: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub bytes_sent: u64,
    pub bytes_dropped: u64,
    pub notifications: u64,
    pub notification_failures: u64,
}

impl SinkStats {
    pub(crate) fn add_metrics(&self, n: usize) {
        self.metrics.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_serialize_failure(&self) {
        self.serialize_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_flush(&self, bytes: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_dropped(&self, bytes: usize) {
        self.bytes_dropped.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_notification(&self, failed: bool) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.notification_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            metrics: self.metrics.load(Ordering::Relaxed),
            serialize_failures: self.serialize_failures.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_dropped: self.bytes_dropped.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
        }
    }
}

/// All stats objects created by a registry, in registration order.
#[derive(Default)]
pub struct StatsIndex {
    read: Mutex<Vec<(PluginKey, Arc<ReadStats>)>>,
    write: Mutex<Vec<(PluginKey, Arc<SinkStats>)>>,
}

impl StatsIndex {
    pub(crate) fn add_read(&self, key: PluginKey, stats: Arc<ReadStats>) {
        self.read.lock().unwrap().push((key, stats));
    }

    pub(crate) fn add_write(&self, key: PluginKey, stats: Arc<SinkStats>) {
        self.write.lock().unwrap().push((key, stats));
    }

    pub(crate) fn remove_read(&self, key: &PluginKey) {
        self.read.lock().unwrap().retain(|(k, _)| k != key);
    }

    pub(crate) fn remove_write(&self, key: &PluginKey) {
        self.write.lock().unwrap().retain(|(k, _)| k != key);
    }

    pub fn read_snapshots(&self) -> Vec<(PluginKey, ReadStatsSnapshot)> {
        let read = self.read.lock().unwrap();
        read.iter().map(|(k, s)| (k.clone(), s.snapshot())).collect()
    }

    pub fn write_snapshots(&self) -> Vec<(PluginKey, SinkStatsSnapshot)> {
        let write = self.write.lock().unwrap();
        write.iter().map(|(k, s)| (k.clone(), s.snapshot())).collect()
    }

    pub fn read_snapshot(&self, key: &PluginKey) -> Option<ReadStatsSnapshot> {
        let read = self.read.lock().unwrap();
        read.iter().find(|(k, _)| k == key).map(|(_, s)| s.snapshot())
    }

    pub fn write_snapshot(&self, key: &PluginKey) -> Option<SinkStatsSnapshot> {
        let write = self.write.lock().unwrap();
        write.iter().find(|(k, _)| k == key).map(|(_, s)| s.snapshot())
    }
}
