/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use log::info;
#[cfg(unix)]
use log::warn;

use crate::schedule::RunningScheduler;

#[cfg(unix)]
async fn do_flush(scheduler: &RunningScheduler, timeout: Duration) {
    info!("flushing all sinks");
    for (key, e) in scheduler.flush(timeout).await {
        warn!("flush of {key} failed: {e:?}");
    }
}

/// Serve signals until a quit signal is received.
///
/// SIGUSR1 flushes every sink, SIGHUP is ignored as there is no reload.
#[cfg(unix)]
pub async fn wait_quit(
    scheduler: &RunningScheduler,
    flush_timeout: Duration,
) -> anyhow::Result<()> {
    use anyhow::anyhow;
    use tokio::signal::unix::{SignalKind, signal};

    let mut int_sig = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("failed to create SIGINT listener: {e}"))?;
    let mut term_sig = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("failed to create SIGTERM listener: {e}"))?;
    let mut hup_sig = signal(SignalKind::hangup())
        .map_err(|e| anyhow!("failed to create SIGHUP listener: {e}"))?;
    let mut usr1_sig = signal(SignalKind::user_defined1())
        .map_err(|e| anyhow!("failed to create SIGUSR1 listener: {e}"))?;

    loop {
        tokio::select! {
            _ = int_sig.recv() => {
                info!("got quit signal");
                break;
            }
            _ = term_sig.recv() => {
                info!("got terminate signal");
                break;
            }
            _ = hup_sig.recv() => {
                info!("got reload signal, config reload is not supported");
            }
            _ = usr1_sig.recv() => {
                do_flush(scheduler, flush_timeout).await;
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_quit(
    scheduler: &RunningScheduler,
    flush_timeout: Duration,
) -> anyhow::Result<()> {
    let _ = (scheduler, flush_timeout);
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to listen for ctrl-c: {e}"))?;
    info!("got quit signal");
    Ok(())
}
