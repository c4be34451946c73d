/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use anyhow::anyhow;
use yaml_rust::Yaml;

use g3_metric::LabelSet;

use super::yaml;

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalConfig {
    /// Default interval of read tasks and default max age of sink buffers.
    pub interval: Duration,
    /// Ceiling of the backed off interval of a failing read task.
    pub max_read_interval: Duration,
    /// Consecutive failures of a read task before its interval is backed off.
    pub backoff_threshold: u32,
    pub backoff_factor: f64,
    pub flush_workers: usize,
    pub flush_queue_length: usize,
    /// Time budget of each shutdown handler.
    pub shutdown_timeout: Duration,
    /// Time given to in flight read invocations at shutdown.
    pub shutdown_grace: Duration,
    pub notification_timeout: Duration,
    pub labels: LabelSet,
    pub collect_internal_stats: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            interval: Duration::from_secs(10),
            max_read_interval: Duration::from_secs(86400),
            backoff_threshold: 1,
            backoff_factor: 2.0,
            flush_workers: 4,
            flush_queue_length: 1024,
            shutdown_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
            notification_timeout: Duration::from_secs(5),
            labels: LabelSet::new(),
            collect_internal_stats: false,
        }
    }
}

impl GlobalConfig {
    pub(crate) fn parse(&mut self, v: &Yaml) -> anyhow::Result<()> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("yaml value type for global config should be 'map'"));
        };
        yaml::foreach_kv(map, |k, v| self.set(k, v))
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml::normalize_key(k).as_str() {
            "interval" => {
                self.interval = yaml::as_duration(v)?;
                Ok(())
            }
            "max_read_interval" => {
                self.max_read_interval = yaml::as_duration(v)?;
                Ok(())
            }
            "backoff_threshold" => {
                self.backoff_threshold = yaml::as_u32(v)?;
                Ok(())
            }
            "backoff_factor" => {
                self.backoff_factor = yaml::as_f64(v)?;
                Ok(())
            }
            "flush_workers" => {
                self.flush_workers = yaml::as_u32(v)? as usize;
                Ok(())
            }
            "flush_queue_length" => {
                self.flush_queue_length = yaml::as_u32(v)? as usize;
                Ok(())
            }
            "shutdown_timeout" => {
                self.shutdown_timeout = yaml::as_duration(v)?;
                Ok(())
            }
            "shutdown_grace" => {
                self.shutdown_grace = yaml::as_duration(v)?;
                Ok(())
            }
            "notification_timeout" => {
                self.notification_timeout = yaml::as_duration(v)?;
                Ok(())
            }
            "labels" => {
                self.labels = yaml::as_label_set(v)?;
                Ok(())
            }
            "collect_internal_stats" => {
                self.collect_internal_stats = yaml::as_bool(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    pub(crate) fn check(&self) -> anyhow::Result<()> {
        if self.interval.is_zero() {
            return Err(anyhow!("interval should not be zero"));
        }
        if self.max_read_interval < self.interval {
            return Err(anyhow!("max read interval should not be less than interval"));
        }
        if self.backoff_threshold == 0 {
            return Err(anyhow!("backoff threshold should be at least 1"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(anyhow!("backoff factor should be a finite value >= 1.0"));
        }
        if self.flush_workers == 0 {
            return Err(anyhow!("flush workers should not be zero"));
        }
        if self.flush_queue_length == 0 {
            return Err(anyhow!("flush queue length should not be zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yaml_rust::YamlLoader;

    fn parse(s: &str) -> anyhow::Result<GlobalConfig> {
        let docs = YamlLoader::load_from_str(s).unwrap();
        let mut config = GlobalConfig::default();
        config.parse(&docs[0])?;
        config.check()?;
        Ok(config)
    }

    #[test]
    fn backoff() {
        let config = parse(
            "interval: 30s\n\
             max-read-interval: 1h\n\
             backoff_threshold: 3\n\
             backoff_factor: 1.5\n",
        )
        .unwrap();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.max_read_interval, Duration::from_secs(3600));
        assert_eq!(config.backoff_threshold, 3);
        assert_eq!(config.backoff_factor, 1.5);
        assert_eq!(config.flush_workers, 4);
    }

    #[test]
    fn invalid() {
        assert!(parse("interval: 0s\n").is_err());
        assert!(parse("interval: 1m\nmax_read_interval: 10s\n").is_err());
        assert!(parse("backoff_factor: 0.5\n").is_err());
        assert!(parse("flush_workers: 0\n").is_err());
        assert!(parse("no_such_key: 1\n").is_err());
    }
}
