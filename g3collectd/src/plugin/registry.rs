/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use foldhash::fast::FixedState;
use log::debug;
use thiserror::Error;

use super::{Category, ConfigHandler, Handler, PluginKey};
use crate::stats::{ReadStats, StatsIndex};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("{category} handler of {key} is already registered")]
    AlreadyRegistered { category: Category, key: PluginKey },
    #[error("invalid plugin name {0:?}")]
    InvalidName(String),
}

pub(crate) struct Registration {
    pub(crate) key: PluginKey,
    pub(crate) handler: Handler,
    pub(crate) interval: Duration,
    pub(crate) read_stats: Option<Arc<ReadStats>>,
}

/// The task table of one daemon instance.
///
/// It is filled at startup and handed to the scheduler, which only reads it
/// until teardown.
pub struct Registry {
    default_interval: Duration,
    entries: Vec<Registration>,
    index: HashSet<(Category, PluginKey), FixedState>,
    stats: Arc<StatsIndex>,
}

impl Registry {
    pub fn new(default_interval: Duration) -> Self {
        Registry {
            default_interval,
            entries: Vec::new(),
            index: HashSet::with_hasher(FixedState::with_seed(0)),
            stats: Arc::new(StatsIndex::default()),
        }
    }

    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Add a handler for the (category, plugin, instance) triple.
    ///
    /// The interval only matters for read and write handlers, a missing or
    /// zero one means the default interval.
    pub fn register(
        &mut self,
        plugin: &str,
        instance: &str,
        handler: Handler,
        interval: Option<Duration>,
    ) -> Result<(), RegisterError> {
        if plugin.is_empty() {
            return Err(RegisterError::InvalidName(plugin.to_string()));
        }
        let category = handler.category();
        let key = PluginKey::new(plugin, instance);
        if self.index.contains(&(category, key.clone())) {
            return Err(RegisterError::AlreadyRegistered { category, key });
        }

        let interval = match interval {
            Some(d) if !d.is_zero() && category.need_interval() => d,
            _ if category.need_interval() => self.default_interval,
            _ => Duration::ZERO,
        };

        let read_stats = match &handler {
            Handler::Read(_) => {
                let stats = Arc::new(ReadStats::default());
                stats.set_effective_interval(interval);
                self.stats.add_read(key.clone(), stats.clone());
                Some(stats)
            }
            Handler::Write(task) => {
                self.stats.add_write(key.clone(), task.stats().clone());
                None
            }
            _ => None,
        };

        debug!("registered {category} handler of {key}");
        self.index.insert((category, key.clone()));
        self.entries.push(Registration {
            key,
            handler,
            interval,
            read_stats,
        });
        Ok(())
    }

    fn remove_where<F>(&mut self, mut matched: F) -> Vec<(PluginKey, anyhow::Error)>
    where
        F: FnMut(&Registration) -> bool,
    {
        let mut errors = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for r in self.entries.drain(..) {
            if !matched(&r) {
                kept.push(r);
                continue;
            }
            let category = r.handler.category();
            self.index.remove(&(category, r.key.clone()));
            match category {
                Category::Read => self.stats.remove_read(&r.key),
                Category::Write => self.stats.remove_write(&r.key),
                _ => {}
            }
            if let Err(e) = r.handler.release() {
                errors.push((r.key, e.context(format!("failed to release {category} handler"))));
            }
        }
        self.entries = kept;
        errors
    }

    /// Release and drop every handler of the category.
    ///
    /// All handlers are released even if some of them fail.
    pub fn unregister_all(&mut self, category: Category) -> Vec<(PluginKey, anyhow::Error)> {
        self.remove_where(|r| r.handler.category() == category)
    }

    /// Release and drop the handlers of a plugin in the given categories.
    pub fn unregister_plugin(
        &mut self,
        plugin: &str,
        categories: &[Category],
    ) -> Vec<(PluginKey, anyhow::Error)> {
        self.remove_where(|r| {
            r.key.plugin() == plugin && categories.contains(&r.handler.category())
        })
    }

    pub fn config_handler(&self, plugin: &str) -> Option<Arc<dyn ConfigHandler>> {
        self.entries.iter().find_map(|r| match &r.handler {
            Handler::Config(h) if r.key.plugin() == plugin => Some(h.clone()),
            _ => None,
        })
    }

    pub fn contains(&self, category: Category, plugin: &str, instance: &str) -> bool {
        self.index
            .contains(&(category, PluginKey::new(plugin, instance)))
    }

    pub fn count(&self, category: Category) -> usize {
        self.entries
            .iter()
            .filter(|r| r.handler.category() == category)
            .count()
    }

    pub fn stats(&self) -> &Arc<StatsIndex> {
        &self.stats
    }

    /// Registrations of the category in registration order.
    pub(crate) fn iter(&self, category: Category) -> impl Iterator<Item = &Registration> {
        self.entries
            .iter()
            .filter(move |r| r.handler.category() == category)
    }
}
