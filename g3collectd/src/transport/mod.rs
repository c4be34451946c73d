/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use async_trait::async_trait;

mod console;
pub use console::ConsoleTransport;

mod discard;
pub use discard::DiscardTransport;

mod http;
pub use http::{HttpTransport, HttpTransportConfig};

/// Describe how a flushed payload is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadMeta {
    pub content_type: &'static str,
    pub content_encoding: Option<&'static str>,
}

/// Deliver one flushed payload to the backing system of a sink.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &[u8], meta: &PayloadMeta) -> anyhow::Result<()>;

    /// Called once when the owning sink is unregistered.
    fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportConfig {
    Http(HttpTransportConfig),
    Console,
    Discard,
}

impl TransportConfig {
    pub fn build(&self) -> Arc<dyn Transport> {
        match self {
            TransportConfig::Http(c) => Arc::new(HttpTransport::new(c.clone())),
            TransportConfig::Console => Arc::new(ConsoleTransport),
            TransportConfig::Discard => Arc::new(DiscardTransport),
        }
    }
}
