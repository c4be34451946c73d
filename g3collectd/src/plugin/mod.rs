/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use g3_metric::{MetricFamily, Notification};

use crate::config::ReadTaskConfig;
use crate::dispatch::WriteTask;
use crate::schedule::ReadContext;

mod registry;
pub use registry::{RegisterError, Registry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Init,
    Config,
    Read,
    Write,
    Notification,
    Flush,
    Shutdown,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Init,
        Category::Config,
        Category::Read,
        Category::Write,
        Category::Notification,
        Category::Flush,
        Category::Shutdown,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Category::Init => "init",
            Category::Config => "config",
            Category::Read => "read",
            Category::Write => "write",
            Category::Notification => "notification",
            Category::Flush => "flush",
            Category::Shutdown => "shutdown",
        }
    }

    const fn need_interval(&self) -> bool {
        matches!(self, Category::Read | Category::Write)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugin name and instance name of a registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PluginKey {
    plugin: Arc<str>,
    instance: Arc<str>,
}

impl PluginKey {
    pub fn new(plugin: &str, instance: &str) -> Self {
        PluginKey {
            plugin: Arc::from(plugin),
            instance: Arc::from(instance),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance.is_empty() {
            f.write_str(&self.plugin)
        } else {
            write!(f, "{}/{}", self.plugin, self.instance)
        }
    }
}

#[async_trait]
pub trait InitHandler: Send + Sync {
    async fn init(&self) -> anyhow::Result<()>;

    fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Turn a read block of the config file into registrations.
pub trait ConfigHandler: Send + Sync {
    fn configure(&self, registry: &mut Registry, config: &ReadTaskConfig) -> anyhow::Result<()>;

    fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ReadHandler: Send + Sync {
    async fn read(&self, ctx: &ReadContext) -> anyhow::Result<Vec<MetricFamily>>;

    fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;

    fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait FlushHandler: Send + Sync {
    async fn flush(&self, timeout: Duration) -> anyhow::Result<()>;

    fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ShutdownHandler: Send + Sync {
    async fn shutdown(&self) -> anyhow::Result<()>;

    fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub enum Handler {
    Init(Arc<dyn InitHandler>),
    Config(Arc<dyn ConfigHandler>),
    Read(Arc<dyn ReadHandler>),
    Write(WriteTask),
    Notification(Arc<dyn NotificationHandler>),
    Flush(Arc<dyn FlushHandler>),
    Shutdown(Arc<dyn ShutdownHandler>),
}

impl Handler {
    pub fn category(&self) -> Category {
        match self {
            Handler::Init(_) => Category::Init,
            Handler::Config(_) => Category::Config,
            Handler::Read(_) => Category::Read,
            Handler::Write(_) => Category::Write,
            Handler::Notification(_) => Category::Notification,
            Handler::Flush(_) => Category::Flush,
            Handler::Shutdown(_) => Category::Shutdown,
        }
    }

    fn release(&self) -> anyhow::Result<()> {
        match self {
            Handler::Init(h) => h.release(),
            Handler::Config(h) => h.release(),
            Handler::Read(h) => h.release(),
            Handler::Write(t) => t.release(),
            Handler::Notification(h) => h.release(),
            Handler::Flush(h) => h.release(),
            Handler::Shutdown(h) => h.release(),
        }
    }
}
