/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, yaml};

use super::yaml as yaml_value;
use crate::compress::Compression;
use crate::dispatch::{LabelFilter, SinkNotifier, WriteTask};
use crate::format::FormatKind;
use crate::plugin::{Handler, Registry};
use crate::transport::{HttpTransportConfig, TransportConfig};

const CONFIG_KEY_WRITE_TYPE: &str = "type";
const CONFIG_KEY_WRITE_NAME: &str = "name";

#[derive(Clone, Debug, PartialEq)]
pub struct WriteTaskConfig {
    name: String,
    instance: Option<String>,
    format: FormatKind,
    compression: Compression,
    buffer_size: usize,
    flush_timeout: Option<Duration>,
    transport_timeout: Duration,
    notification: bool,
    filter: Option<LabelFilter>,
    transport: TransportConfig,
}

impl WriteTaskConfig {
    fn new(transport: TransportConfig) -> Self {
        WriteTaskConfig {
            name: String::new(),
            instance: None,
            format: FormatKind::default(),
            compression: Compression::None,
            buffer_size: 64 * 1024,
            flush_timeout: None,
            transport_timeout: Duration::from_secs(10),
            notification: false,
            filter: None,
            transport,
        }
    }

    pub(crate) fn parse(map: &yaml::Hash) -> anyhow::Result<Self> {
        let write_type = yaml_value::get_required_str(map, CONFIG_KEY_WRITE_TYPE)?;
        let transport = match yaml_value::normalize_key(write_type).as_str() {
            "http" => TransportConfig::Http(HttpTransportConfig::default()),
            "console" => TransportConfig::Console,
            "discard" => TransportConfig::Discard,
            _ => return Err(anyhow!("unsupported write type {write_type}")),
        };

        let mut config = WriteTaskConfig::new(transport);
        yaml_value::foreach_kv(map, |k, v| config.set(k, v))?;
        config
            .check()
            .context(format!("failed to load write task of type {write_type}"))?;
        Ok(config)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml_value::normalize_key(k).as_str() {
            CONFIG_KEY_WRITE_TYPE => Ok(()),
            CONFIG_KEY_WRITE_NAME => {
                self.name = yaml_value::as_string(v)?;
                Ok(())
            }
            "instance" => {
                self.instance = Some(yaml_value::as_string(v)?);
                Ok(())
            }
            "format" => {
                let s = yaml_value::as_string(v)?;
                self.format = FormatKind::from_str(&s)?;
                Ok(())
            }
            "compress" | "compression" => {
                let s = yaml_value::as_string(v)?;
                self.compression = Compression::from_str(&s)?;
                Ok(())
            }
            "buffer_size" => {
                self.buffer_size = yaml_value::as_size(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                Ok(())
            }
            "flush_timeout" | "flush_interval" => {
                self.flush_timeout = Some(yaml_value::as_duration(v)?);
                Ok(())
            }
            "transport_timeout" => {
                self.transport_timeout = yaml_value::as_duration(v)?;
                Ok(())
            }
            "notification" => {
                self.notification = yaml_value::as_bool(v)?;
                Ok(())
            }
            "filter" => {
                self.filter = Some(LabelFilter::parse(v)?);
                Ok(())
            }
            _ => match &mut self.transport {
                TransportConfig::Http(http) => http.set_by_yaml_kv(k, v),
                _ => Err(anyhow!("invalid key {k}")),
            },
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow!("name is not set"));
        }
        if self.buffer_size == 0 {
            return Err(anyhow!("buffer size should not be zero"));
        }
        if self.transport_timeout.is_zero() {
            return Err(anyhow!("transport timeout should not be zero"));
        }
        if let TransportConfig::Http(http) = &self.transport {
            http.check()?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin_name(&self) -> &'static str {
        match self.transport {
            TransportConfig::Http(_) => "write_http",
            TransportConfig::Console => "write_console",
            TransportConfig::Discard => "write_discard",
        }
    }

    fn instance(&self) -> &str {
        self.instance.as_deref().unwrap_or(&self.name)
    }

    pub fn build_task(&self) -> WriteTask {
        let mut task = WriteTask::new(self.format.build(), self.transport.build())
            .with_compression(self.compression)
            .with_buffer_size(self.buffer_size)
            .with_transport_timeout(self.transport_timeout);
        if let Some(filter) = &self.filter {
            task = task.with_filter(Arc::new(filter.clone()));
        }
        task
    }

    /// Register the sink, and its notifier if enabled.
    pub fn register(&self, registry: &mut Registry) -> anyhow::Result<()> {
        let task = self.build_task();
        let plugin = self.plugin_name();
        if self.notification {
            let notifier = SinkNotifier::new(&task);
            registry.register(
                plugin,
                self.instance(),
                Handler::Notification(Arc::new(notifier)),
                None,
            )?;
        }
        registry.register(plugin, self.instance(), Handler::Write(task), self.flush_timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Category;
    use yaml_rust::YamlLoader;

    fn parse(s: &str) -> anyhow::Result<WriteTaskConfig> {
        let doc = YamlLoader::load_from_str(s).unwrap();
        let Yaml::Hash(map) = &doc[0] else {
            panic!("not a map");
        };
        WriteTaskConfig::parse(map)
    }

    #[test]
    fn http() {
        let config = parse(
            "type: http\n\
             name: vm\n\
             url: http://127.0.0.1:8428/api/v1/import\n\
             format: openmetrics\n\
             compress: gzip\n\
             buffer-size: 1MiB\n\
             flush-interval: 5s\n\
             headers: {X-Scope: test}\n\
             filter: {include: cpu_}\n",
        )
        .unwrap();
        assert_eq!(config.name(), "vm");
        assert_eq!(config.plugin_name(), "write_http");
        assert_eq!(config.format, FormatKind::OpenMetrics);
        assert_eq!(config.compression, Compression::Gzip);
        assert_eq!(config.buffer_size, 1024 * 1024);
        assert_eq!(config.flush_timeout, Some(Duration::from_secs(5)));
        assert!(config.filter.is_some());
    }

    #[test]
    fn invalid() {
        assert!(parse("type: console\nurl: http://127.0.0.1/").is_err());
        assert!(parse("type: console").is_err());
        assert!(parse("type: http\nname: a").is_err());
        assert!(parse("type: kafka\nname: a").is_err());
        assert!(parse("type: discard\nname: a\nformat: xml").is_err());
    }

    #[test]
    fn register() {
        let config = parse("type: console\nname: out\nnotification: true").unwrap();
        let mut registry = Registry::new(Duration::from_secs(10));
        config.register(&mut registry).unwrap();
        assert!(registry.contains(Category::Write, "write_console", "out"));
        assert!(registry.contains(Category::Notification, "write_console", "out"));
        assert!(config.register(&mut registry).is_err());
    }
}
