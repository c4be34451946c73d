/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::Path;

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, YamlLoader};

pub(crate) mod yaml;

mod global;
pub use global::GlobalConfig;

mod read;
pub use read::ReadTaskConfig;

mod write;
pub use write::WriteTaskConfig;

#[derive(Clone, Debug, Default)]
pub struct ProcessConfig {
    pub global: GlobalConfig,
    pub reads: Vec<ReadTaskConfig>,
    pub writes: Vec<WriteTaskConfig>,
}

impl ProcessConfig {
    fn load_doc(&mut self, map: &yaml_rust::yaml::Hash) -> anyhow::Result<()> {
        yaml::foreach_kv(map, |k, v| match yaml::normalize_key(k).as_str() {
            "global" => self.global.parse(v),
            "read" => yaml::foreach_map(v, |map| {
                let read = ReadTaskConfig::parse(map).context("failed to load this read task")?;
                self.reads.push(read);
                Ok(())
            }),
            "write" => yaml::foreach_map(v, |map| {
                let write = WriteTaskConfig::parse(map).context("failed to load this write task")?;
                if self.writes.iter().any(|w| w.name() == write.name()) {
                    return Err(anyhow!("write task with name {} already exists", write.name()));
                }
                self.writes.push(write);
                Ok(())
            }),
            _ => Err(anyhow!("invalid key {k} in main conf")),
        })
    }
}

pub fn load(path: &Path) -> anyhow::Result<ProcessConfig> {
    let content = std::fs::read_to_string(path)
        .context(format!("failed to read config file {}", path.display()))?;
    load_from_str(&content).context(format!("failed to load config file {}", path.display()))
}

pub fn load_from_str(content: &str) -> anyhow::Result<ProcessConfig> {
    let docs = YamlLoader::load_from_str(content).map_err(|e| anyhow!("invalid yaml: {e}"))?;

    let mut config = ProcessConfig::default();
    // allow multiple docs, and treat them as the same
    for (i, doc) in docs.iter().enumerate() {
        match doc {
            Yaml::Hash(map) => config
                .load_doc(map)
                .context(format!("failed to load yaml doc #{i}"))?,
            _ => return Err(anyhow!("yaml doc root should be hash")),
        }
    }
    config.global.check().context("invalid global config")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn load_full() {
        let config = load_from_str(
            r#"
global:
  interval: 5s
  max-read-interval: 1h
  backoff-factor: 1.5
  labels:
    host: node1
  collect_internal_stats: true
read:
  - plugin: memory
  - plugin: cpu
    instance: all
    interval: 1s
    report_by_cpu: true
---
write:
  name: stdout
  type: console
  format: influxdb
"#,
        )
        .unwrap();
        assert_eq!(config.global.interval, Duration::from_secs(5));
        assert_eq!(config.global.max_read_interval, Duration::from_secs(3600));
        assert_eq!(config.global.backoff_factor, 1.5);
        assert_eq!(config.global.labels.get("host"), Some("node1"));
        assert!(config.global.collect_internal_stats);
        assert_eq!(config.reads.len(), 2);
        assert_eq!(config.reads[1].instance, "all");
        assert_eq!(config.reads[1].interval, Some(Duration::from_secs(1)));
        assert_eq!(config.reads[1].get("report_by_cpu"), Some(&Yaml::Boolean(true)));
        assert_eq!(config.writes.len(), 1);
        assert_eq!(config.writes[0].plugin_name(), "write_console");
    }

    #[test]
    fn load_invalid() {
        assert!(load_from_str("other: 1").is_err());
        assert!(load_from_str("- 1").is_err());
        assert!(load_from_str("global: {interval: 0}").is_err());
        assert!(load_from_str("global: {backoff_factor: 0.5}").is_err());
        assert!(load_from_str("read: [{instance: a}]").is_err());
        assert!(
            load_from_str(
                "write: [{name: a, type: discard}, {name: a, type: console}]"
            )
            .is_err()
        );
    }
}
