/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use g3_metric::{MetricFamily, MetricType, Value};

use g3collectd::config::GlobalConfig;
use g3collectd::dispatch::WriteTask;
use g3collectd::format::FormatKind;
use g3collectd::plugin::{
    FlushHandler, Handler, InitHandler, PluginKey, ReadHandler, Registry, ShutdownHandler,
};
use g3collectd::schedule::{ReadContext, Scheduler};
use g3collectd::transport::{PayloadMeta, Transport};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ok,
    Fail,
    Hang,
}

struct TestRead {
    calls: Arc<AtomicUsize>,
    mode: Mode,
    recovered: Arc<AtomicBool>,
}

impl TestRead {
    fn new(mode: Mode) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let read = TestRead {
            calls: calls.clone(),
            mode,
            recovered: Arc::new(AtomicBool::new(false)),
        };
        (read, calls)
    }
}

#[async_trait]
impl ReadHandler for TestRead {
    async fn read(&self, ctx: &ReadContext) -> anyhow::Result<Vec<MetricFamily>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Fail if !self.recovered.load(Ordering::SeqCst) => {
                Err(anyhow!("backend of {} is unreachable", ctx.key()))
            }
            Mode::Hang => std::future::pending().await,
            _ => {
                let mut family = MetricFamily::new("test_value", MetricType::Gauge)?;
                family.append(Value::gauge(1.0), None, &[("source", ctx.key().plugin())])?;
                Ok(vec![family])
            }
        }
    }
}

fn global(interval: Duration) -> GlobalConfig {
    GlobalConfig {
        interval,
        shutdown_timeout: Duration::from_secs(1),
        shutdown_grace: Duration::from_millis(100),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn interval_with_jitter() {
    let mut registry = Registry::new(Duration::from_secs(10));
    let (read, calls) = TestRead::new(Mode::Ok);
    registry
        .register("a", "", Handler::Read(Arc::new(read)), Some(Duration::from_secs(1)))
        .unwrap();

    let scheduler = Scheduler::new(registry, global(Duration::from_secs(10)))
        .start()
        .await;
    tokio::time::sleep(Duration::from_millis(5500)).await;
    let n = calls.load(Ordering::SeqCst);
    assert!((5..=6).contains(&n), "invoked {n} times");

    let report = scheduler.shutdown().await;
    assert!(report.is_ok());
}

#[tokio::test(start_paused = true)]
async fn default_interval() {
    let mut registry = Registry::new(Duration::from_secs(2));
    let (read, calls) = TestRead::new(Mode::Ok);
    registry
        .register("a", "", Handler::Read(Arc::new(read)), Some(Duration::ZERO))
        .unwrap();

    let scheduler = Scheduler::new(registry, global(Duration::from_secs(2)))
        .start()
        .await;
    tokio::time::sleep(Duration::from_millis(9000)).await;
    let n = calls.load(Ordering::SeqCst);
    assert!((4..=5).contains(&n), "invoked {n} times");
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn no_overlapping_invocation() {
    let mut registry = Registry::new(Duration::from_secs(10));
    let (read, calls) = TestRead::new(Mode::Hang);
    registry
        .register("hang", "", Handler::Read(Arc::new(read)), Some(Duration::from_secs(1)))
        .unwrap();

    let scheduler = Scheduler::new(registry, global(Duration::from_secs(10)))
        .start()
        .await;
    tokio::time::sleep(Duration::from_millis(5500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = scheduler
        .stats()
        .read_snapshot(&PluginKey::new("hang", ""))
        .unwrap();
    assert_eq!(stats.calls, 0);
    assert!(stats.skipped >= 4);

    // the in flight invocation is abandoned after the grace period
    scheduler.shutdown().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn backoff_and_recover() {
    let mut registry = Registry::new(Duration::from_secs(10));
    let (read, calls) = TestRead::new(Mode::Fail);
    let recovered = read.recovered.clone();
    registry
        .register("fail", "", Handler::Read(Arc::new(read)), Some(Duration::from_secs(1)))
        .unwrap();

    let mut config = global(Duration::from_secs(10));
    config.backoff_threshold = 1;
    config.backoff_factor = 2.0;
    config.max_read_interval = Duration::from_secs(4);
    let scheduler = Scheduler::new(registry, config).start().await;
    let key = PluginKey::new("fail", "");

    // invoked at j, j+2, j+6, j+10, j+14 and j+18 with j < 1
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let stats = scheduler.stats().read_snapshot(&key).unwrap();
    assert_eq!(stats.failures, 6);
    assert_eq!(stats.effective_interval, Duration::from_secs(4));

    recovered.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(5)).await;
    let stats = scheduler.stats().read_snapshot(&key).unwrap();
    assert_eq!(stats.failures, 6);
    assert!(stats.calls > 6);
    assert_eq!(stats.effective_interval, Duration::from_secs(1));

    scheduler.shutdown().await;
}

struct TestInit {
    fail: bool,
}

#[async_trait]
impl InitHandler for TestInit {
    async fn init(&self) -> anyhow::Result<()> {
        if self.fail {
            Err(anyhow!("no such device"))
        } else {
            Ok(())
        }
    }
}

struct TestShutdown {
    name: &'static str,
    delay: Duration,
    order: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl ShutdownHandler for TestShutdown {
    async fn shutdown(&self) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.order.lock().unwrap().push(self.name);
        Ok(())
    }
}

fn shutdown_handler(
    name: &'static str,
    delay: Duration,
    order: &Arc<Mutex<Vec<&'static str>>>,
) -> Handler {
    Handler::Shutdown(Arc::new(TestShutdown {
        name,
        delay,
        order: order.clone(),
    }))
}

#[tokio::test(start_paused = true)]
async fn init_failure_disables_plugin() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::new(Duration::from_secs(1));

    let (bad_read, bad_calls) = TestRead::new(Mode::Ok);
    registry
        .register("bad", "", Handler::Init(Arc::new(TestInit { fail: true })), None)
        .unwrap();
    registry
        .register("bad", "", Handler::Read(Arc::new(bad_read)), None)
        .unwrap();
    registry
        .register("bad", "", shutdown_handler("bad", Duration::ZERO, &order), None)
        .unwrap();

    let (good_read, good_calls) = TestRead::new(Mode::Ok);
    registry
        .register("good", "", Handler::Init(Arc::new(TestInit { fail: false })), None)
        .unwrap();
    registry
        .register("good", "", Handler::Read(Arc::new(good_read)), None)
        .unwrap();

    let mut scheduler = Scheduler::new(registry, global(Duration::from_secs(1)));
    let errors = scheduler.init().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, PluginKey::new("bad", ""));

    let scheduler = scheduler.start().await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(bad_calls.load(Ordering::SeqCst), 0);
    assert!(good_calls.load(Ordering::SeqCst) >= 2);

    let report = scheduler.shutdown().await;
    assert!(report.is_ok());
    assert_eq!(*order.lock().unwrap(), vec!["bad"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_in_reverse_order_with_budget() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::new(Duration::from_secs(10));
    registry
        .register("a", "", shutdown_handler("a", Duration::ZERO, &order), None)
        .unwrap();
    registry
        .register("slow", "", shutdown_handler("slow", Duration::from_secs(60), &order), None)
        .unwrap();
    registry
        .register("b", "", shutdown_handler("b", Duration::from_millis(200), &order), None)
        .unwrap();
    registry
        .register("c", "", shutdown_handler("c", Duration::ZERO, &order), None)
        .unwrap();

    let scheduler = Scheduler::new(registry, global(Duration::from_secs(10)))
        .start()
        .await;
    let report = scheduler.shutdown().await;

    assert_eq!(report.abandoned, vec![PluginKey::new("slow", "")]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(*order.lock().unwrap(), vec!["c", "b", "a"]);
}

#[derive(Clone, Default)]
struct MemoryTransport {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: &[u8], _meta: &PayloadMeta) -> anyhow::Result<()> {
        self.payloads.lock().unwrap().push(payload.to_vec());
        Ok(())
    }
}

struct TestFlush {
    flushed: Arc<AtomicUsize>,
}

#[async_trait]
impl FlushHandler for TestFlush {
    async fn flush(&self, _timeout: Duration) -> anyhow::Result<()> {
        self.flushed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn read_to_write_on_shutdown() {
    let transport = MemoryTransport::default();
    let flushed = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::new(Duration::from_secs(1));
    let (read, calls) = TestRead::new(Mode::Ok);
    registry
        .register("source", "", Handler::Read(Arc::new(read)), None)
        .unwrap();
    let task = WriteTask::new(FormatKind::Influxdb.build(), Arc::new(transport.clone()))
        .with_buffer_size(1_000_000);
    registry
        .register("write_memory", "", Handler::Write(task), Some(Duration::from_secs(3600)))
        .unwrap();
    registry
        .register(
            "write_memory",
            "",
            Handler::Flush(Arc::new(TestFlush {
                flushed: flushed.clone(),
            })),
            None,
        )
        .unwrap();

    let mut config = global(Duration::from_secs(1));
    config.labels.add("host", "node1").unwrap();
    let scheduler = Scheduler::new(registry, config).start().await;
    tokio::time::sleep(Duration::from_millis(3500)).await;
    let n = calls.load(Ordering::SeqCst);
    assert!(transport.payloads.lock().unwrap().is_empty());

    let report = scheduler.shutdown().await;
    assert!(report.is_ok());
    assert_eq!(flushed.load(Ordering::SeqCst), 1);

    let payloads = transport.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    let text = String::from_utf8(payloads[0].clone()).unwrap();
    assert_eq!(text.lines().count(), n);
    for line in text.lines() {
        assert!(line.starts_with("test_value,source=source,host=node1 value=1.0 "));
    }
}
