/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use tokio::time::Instant;

/// Serialized data accumulated by one sink between two flushes.
pub(super) struct SinkBuffer {
    data: Vec<u8>,
    max_size: usize,
    first_append: Option<Instant>,
}

impl SinkBuffer {
    pub(super) fn new(max_size: usize) -> Self {
        SinkBuffer {
            data: Vec::with_capacity(max_size.min(64 * 1024)),
            max_size: max_size.max(1),
            first_append: None,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.data.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// An empty buffer always accepts the next append, even an oversized one.
    pub(super) fn would_overflow(&self, add: usize) -> bool {
        !self.data.is_empty() && self.data.len() + add > self.max_size
    }

    pub(super) fn append(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.first_append.is_none() {
            self.first_append = Some(Instant::now());
        }
        self.data.extend_from_slice(data);
    }

    pub(super) fn is_full(&self) -> bool {
        self.data.len() >= self.max_size
    }

    pub(super) fn is_expired(&self, timeout: Duration) -> bool {
        self.first_append
            .map(|t| t.elapsed() >= timeout)
            .unwrap_or(false)
    }

    /// When the buffered data reaches the max age, none if empty.
    pub(super) fn deadline(&self, timeout: Duration) -> Option<Instant> {
        self.first_append.map(|t| t + timeout)
    }

    pub(super) fn take(&mut self) -> Vec<u8> {
        self.first_append = None;
        let cap = self.data.capacity();
        std::mem::replace(&mut self.data, Vec::with_capacity(cap.min(64 * 1024)))
    }

    /// Put unsent data back in front of what has been appended since.
    ///
    /// The data is handed back if the result would not fit in the buffer.
    pub(super) fn restore(&mut self, mut data: Vec<u8>) -> Result<(), Vec<u8>> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() + self.data.len() > self.max_size {
            return Err(data);
        }
        data.extend_from_slice(&self.data);
        self.data = data;
        self.first_append = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow() {
        let mut buf = SinkBuffer::new(8);
        assert!(!buf.would_overflow(100));
        buf.append(b"12345");
        assert!(!buf.is_full());
        assert!(buf.would_overflow(4));
        assert!(!buf.would_overflow(3));
        buf.append(b"678");
        assert!(buf.is_full());
        assert_eq!(buf.take(), b"12345678");
        assert!(buf.is_empty());
        assert!(!buf.is_expired(Duration::ZERO));
    }

    #[test]
    fn restore() {
        let mut buf = SinkBuffer::new(8);
        buf.append(b"cd");
        assert!(buf.restore(b"ab".to_vec()).is_ok());
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.take(), b"abcd");

        buf.append(b"123456");
        let back = buf.restore(b"789".to_vec()).unwrap_err();
        assert_eq!(back, b"789");
        assert_eq!(buf.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn expire() {
        let mut buf = SinkBuffer::new(1024);
        buf.append(b"x");
        assert!(!buf.is_expired(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(buf.is_expired(Duration::from_secs(1)));
        buf.take();
        assert!(!buf.is_expired(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline() {
        let mut buf = SinkBuffer::new(1024);
        assert!(buf.deadline(Duration::from_secs(2)).is_none());

        tokio::time::sleep(Duration::from_millis(10)).await;
        let start = Instant::now();
        buf.append(b"x");
        tokio::time::sleep(Duration::from_millis(500)).await;
        buf.append(b"y");
        assert_eq!(
            buf.deadline(Duration::from_secs(2)),
            Some(start + Duration::from_secs(2))
        );

        buf.take();
        assert!(buf.deadline(Duration::from_secs(2)).is_none());
    }
}
