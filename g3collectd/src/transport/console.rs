/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{PayloadMeta, Transport};

pub struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, payload: &[u8], meta: &PayloadMeta) -> anyhow::Result<()> {
        let mut stdout = tokio::io::stdout();
        if meta.content_encoding.is_some() {
            // binary data is not printable
            let line = format!("<{} bytes of {}>\n", payload.len(), meta.content_type);
            stdout.write_all(line.as_bytes()).await?;
        } else {
            stdout.write_all(payload).await?;
            if !payload.ends_with(b"\n") {
                stdout.write_all(b"\n").await?;
            }
        }
        stdout.flush().await?;
        Ok(())
    }
}
