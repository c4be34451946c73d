/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use anyhow::anyhow;
use yaml_rust::{Yaml, yaml};

use super::yaml as yaml_value;

const CONFIG_KEY_PLUGIN: &str = "plugin";

/// One read block, plugin specific keys are kept for the config handler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadTaskConfig {
    pub plugin: String,
    pub instance: String,
    pub interval: Option<Duration>,
    settings: yaml::Hash,
}

impl ReadTaskConfig {
    pub fn new<S: Into<String>>(plugin: S) -> Self {
        ReadTaskConfig {
            plugin: plugin.into(),
            ..Default::default()
        }
    }

    pub(crate) fn parse(map: &yaml::Hash) -> anyhow::Result<Self> {
        let plugin = yaml_value::get_required_str(map, CONFIG_KEY_PLUGIN)?;
        let mut config = ReadTaskConfig::new(plugin);
        yaml_value::foreach_kv(map, |k, v| config.set(k, v))?;
        Ok(config)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml_value::normalize_key(k).as_str() {
            CONFIG_KEY_PLUGIN => Ok(()),
            "instance" => {
                self.instance = yaml_value::as_string(v)?;
                Ok(())
            }
            "interval" => {
                let interval = yaml_value::as_duration(v)?;
                if interval.is_zero() {
                    return Err(anyhow!("interval should not be zero"));
                }
                self.interval = Some(interval);
                Ok(())
            }
            key => {
                self.settings
                    .insert(Yaml::String(key.to_string()), v.clone());
                Ok(())
            }
        }
    }

    /// Plugin specific value by normalized key.
    pub fn get(&self, key: &str) -> Option<&Yaml> {
        self.settings.get(&Yaml::String(key.to_string()))
    }

    pub fn foreach_setting<F>(&self, f: F) -> anyhow::Result<()>
    where
        F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
    {
        yaml_value::foreach_kv(&self.settings, f)
    }
}
