/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{Notify, Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use g3_metric::{MetricFamily, Notification};

use super::WriteError;
use super::buffer::SinkBuffer;
use super::filter::MetricFilter;
use crate::compress::Compression;
use crate::format::MetricFormat;
use crate::plugin::{NotificationHandler, PluginKey};
use crate::stats::SinkStats;
use crate::transport::{PayloadMeta, Transport};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to run one write sink.
#[derive(Clone)]
pub struct WriteTask {
    format: Arc<dyn MetricFormat>,
    transport: Arc<dyn Transport>,
    compression: Compression,
    buffer_size: usize,
    flush_timeout: Option<Duration>,
    transport_timeout: Duration,
    filter: Option<Arc<dyn MetricFilter>>,
    stats: Arc<SinkStats>,
}

impl WriteTask {
    pub fn new(format: Arc<dyn MetricFormat>, transport: Arc<dyn Transport>) -> Self {
        WriteTask {
            format,
            transport,
            compression: Compression::None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_timeout: None,
            transport_timeout: DEFAULT_TRANSPORT_TIMEOUT,
            filter: None,
            stats: Arc::new(SinkStats::default()),
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Max age of buffered data, the registration interval is used if not set.
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = Some(timeout);
        self
    }

    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn MetricFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn stats(&self) -> &Arc<SinkStats> {
        &self.stats
    }

    pub(crate) fn release(&self) -> anyhow::Result<()> {
        self.transport.release()
    }

    fn payload_meta(&self) -> PayloadMeta {
        PayloadMeta {
            content_type: self.format.content_type(),
            content_encoding: self.compression.content_encoding(),
        }
    }

    async fn send(&self, data: &[u8]) -> Result<usize, WriteError> {
        let payload = self
            .compression
            .compress(data)
            .map_err(|e| WriteError::Serialization(format!("compression failed: {e}")))?;
        let meta = self.payload_meta();
        match tokio::time::timeout(self.transport_timeout, self.transport.send(&payload, &meta))
            .await
        {
            Ok(Ok(())) => Ok(payload.len()),
            Ok(Err(e)) => Err(WriteError::Transport(e)),
            Err(_) => Err(WriteError::Timeout),
        }
    }
}

pub(super) enum FlushJob {
    Data(Vec<u8>),
    Sync(oneshot::Sender<()>),
    Quit,
}

struct SinkShared {
    key: PluginKey,
    task: WriteTask,
    flush_timeout: Duration,
    buffer: Mutex<SinkBuffer>,
    /// Wakes the flusher when the buffer turns non-empty.
    armed: Notify,
}

/// The dispatch side of a write sink.
pub(super) struct WriteSink {
    shared: Arc<SinkShared>,
    sender: mpsc::Sender<FlushJob>,
}

impl WriteSink {
    pub(super) fn spawn(
        key: PluginKey,
        task: WriteTask,
        interval: Duration,
        queue_size: usize,
        workers: Arc<Semaphore>,
    ) -> (Self, JoinHandle<()>) {
        let flush_timeout = task.flush_timeout.unwrap_or(interval);
        let buffer = SinkBuffer::new(task.buffer_size);
        let shared = Arc::new(SinkShared {
            key,
            task,
            flush_timeout,
            buffer: Mutex::new(buffer),
            armed: Notify::new(),
        });
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let flusher = SinkFlusher {
            shared: shared.clone(),
            receiver,
            workers,
        };
        let handle = tokio::spawn(flusher.into_running());
        (WriteSink { shared, sender }, handle)
    }

    pub(super) fn key(&self) -> &PluginKey {
        &self.shared.key
    }

    pub(super) fn filter(&self) -> Option<&Arc<dyn MetricFilter>> {
        self.shared.task.filter.as_ref()
    }

    /// Serialize the family into the buffer, handing full buffers to the flusher.
    pub(super) fn append(&self, family: &MetricFamily) -> Result<(), WriteError> {
        let task = &self.shared.task;
        let mut data = Vec::with_capacity(256);
        if let Err(e) = task.format.serialize_family(family, &mut data) {
            task.stats.add_serialize_failure();
            return Err(e);
        }
        task.stats.add_metrics(family.len());

        let mut ready = Vec::with_capacity(2);
        let arm = {
            let mut buffer = self.shared.buffer.lock().unwrap();
            if buffer.would_overflow(data.len()) {
                ready.push(buffer.take());
            }
            buffer.append(&data);
            if buffer.is_full() || buffer.is_expired(self.shared.flush_timeout) {
                ready.push(buffer.take());
            }
            // only the new data is in, so the buffer just turned non-empty
            !buffer.is_empty() && buffer.len() == data.len()
        };
        if arm {
            self.shared.armed.notify_one();
        }

        let mut result = Ok(());
        for data in ready {
            if let Err(e) = self.submit(data) {
                result = Err(e);
            }
        }
        result
    }

    fn submit(&self, data: Vec<u8>) -> Result<(), WriteError> {
        match self.sender.try_send(FlushJob::Data(data)) {
            Ok(_) => Ok(()),
            Err(mpsc::error::TrySendError::Full(FlushJob::Data(data))) => {
                self.shared.task.stats.add_dropped(data.len());
                warn!(
                    "sink {}: flush queue is full, {} bytes dropped",
                    self.shared.key,
                    data.len()
                );
                Err(WriteError::QueueFull)
            }
            Err(_) => Err(WriteError::Closed),
        }
    }

    /// Wait until everything appended so far has been flushed.
    pub(super) async fn flush(&self) -> Result<(), WriteError> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(FlushJob::Sync(done))
            .await
            .map_err(|_| WriteError::Closed)?;
        wait.await.map_err(|_| WriteError::Closed)
    }

    pub(super) async fn quit(&self) {
        let _ = self.sender.send(FlushJob::Quit).await;
    }
}

struct SinkFlusher {
    shared: Arc<SinkShared>,
    receiver: mpsc::Receiver<FlushJob>,
    workers: Arc<Semaphore>,
}

impl SinkFlusher {
    async fn into_running(mut self) {
        loop {
            let deadline = self
                .shared
                .buffer
                .lock()
                .unwrap()
                .deadline(self.shared.flush_timeout);
            let expire_at = deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                job = self.receiver.recv() => {
                    match job {
                        Some(FlushJob::Data(data)) => self.flush(data).await,
                        Some(FlushJob::Sync(done)) => {
                            self.flush_buffered().await;
                            let _ = done.send(());
                        }
                        Some(FlushJob::Quit) | None => {
                            self.flush_buffered().await;
                            break;
                        }
                    }
                }
                _ = self.shared.armed.notified() => {}
                _ = tokio::time::sleep_until(expire_at), if deadline.is_some() => {
                    let data = {
                        let mut buffer = self.shared.buffer.lock().unwrap();
                        if buffer.is_expired(self.shared.flush_timeout) {
                            Some(buffer.take())
                        } else {
                            None
                        }
                    };
                    if let Some(data) = data {
                        self.flush(data).await;
                    }
                }
            }
        }
        debug!("sink {}: flusher quit", self.shared.key);
    }

    async fn flush_buffered(&self) {
        let data = self.shared.buffer.lock().unwrap().take();
        self.flush(data).await;
    }

    async fn flush(&self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        let task = &self.shared.task;

        let Ok(_permit) = self.workers.acquire().await else {
            task.stats.add_dropped(data.len());
            return;
        };
        match task.send(&data).await {
            Ok(sent) => {
                task.stats.add_flush(sent);
                debug!("sink {}: flushed {sent} bytes", self.shared.key);
            }
            Err(e) => {
                task.stats.add_flush_failure();
                warn!("sink {}: flush failed: {e}", self.shared.key);
                self.restore(data);
            }
        }
    }

    fn restore(&self, data: Vec<u8>) {
        let r = self.shared.buffer.lock().unwrap().restore(data);
        if let Err(data) = r {
            self.shared.task.stats.add_dropped(data.len());
            warn!(
                "sink {}: buffer is full, {} bytes of unsent data dropped",
                self.shared.key,
                data.len()
            );
        }
    }
}

/// Deliver notifications of a write sink straight to its transport.
pub struct SinkNotifier {
    task: WriteTask,
}

impl SinkNotifier {
    pub fn new(task: &WriteTask) -> Self {
        SinkNotifier { task: task.clone() }
    }
}

#[async_trait]
impl NotificationHandler for SinkNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let mut data = Vec::with_capacity(256);
        let r = match self
            .task
            .format
            .serialize_notification(notification, &mut data)
        {
            Ok(_) => self.task.send(&data).await.map(|_| ()),
            Err(e) => Err(e),
        };
        self.task.stats.add_notification(r.is_err());
        r.map_err(anyhow::Error::new)
    }
}
