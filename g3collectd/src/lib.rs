/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::{Context, anyhow};

pub mod compress;
pub mod config;
pub mod dispatch;
pub mod format;
pub mod internal;
pub mod log;
pub mod opts;
pub mod plugin;
pub mod schedule;
pub mod signal;
pub mod stats;
pub mod transport;

use config::ProcessConfig;
use plugin::{Category, Handler, Registry};

/// Fill a registry from the loaded config.
///
/// `setup` may register extra config handlers before the read blocks are
/// offered to them.
pub fn build_registry<F>(config: &ProcessConfig, setup: F) -> anyhow::Result<Registry>
where
    F: FnOnce(&mut Registry) -> anyhow::Result<()>,
{
    let mut registry = Registry::new(config.global.interval);
    registry.register(
        internal::PLUGIN_NAME,
        "",
        Handler::Config(std::sync::Arc::new(internal::InternalStatsConfig)),
        None,
    )?;
    setup(&mut registry).context("failed to setup plugins")?;

    for write in &config.writes {
        write
            .register(&mut registry)
            .context(format!("failed to register write task {}", write.name()))?;
    }

    for read in &config.reads {
        let Some(handler) = registry.config_handler(&read.plugin) else {
            return Err(anyhow!("no plugin named {} found", read.plugin));
        };
        handler.configure(&mut registry, read).context(format!(
            "failed to configure read task {}/{}",
            read.plugin, read.instance
        ))?;
    }

    if config.global.collect_internal_stats
        && !registry.contains(Category::Read, internal::PLUGIN_NAME, "")
    {
        internal::register(&mut registry, "", None)?;
    }
    Ok(registry)
}
