/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;
use yaml_rust::Yaml;

use g3_metric::{LabelSet, MetricFamily, check_label_name};

use crate::config::yaml;

/// Per sink match and relabel stage.
pub trait MetricFilter: Send + Sync {
    /// Edit the family in place, return false to drop it entirely.
    fn filter(&self, family: &mut MetricFamily) -> bool;
}

/// Select families by name prefix and edit labels of the selected ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    add_labels: LabelSet,
    drop_labels: Vec<String>,
}

impl LabelFilter {
    pub fn include<S: Into<String>>(mut self, prefix: S) -> Self {
        self.include.push(prefix.into());
        self
    }

    pub fn exclude<S: Into<String>>(mut self, prefix: S) -> Self {
        self.exclude.push(prefix.into());
        self
    }

    pub fn drop_label<S: Into<String>>(mut self, name: S) -> Self {
        self.drop_labels.push(name.into());
        self
    }

    pub fn add_labels(mut self, labels: LabelSet) -> Self {
        self.add_labels = labels;
        self
    }

    pub(crate) fn parse(v: &Yaml) -> anyhow::Result<Self> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("yaml value type for filter should be 'map'"));
        };
        let mut filter = LabelFilter::default();
        yaml::foreach_kv(map, |k, v| match yaml::normalize_key(k).as_str() {
            "include" => {
                filter.include = yaml::as_string_list(v)?;
                Ok(())
            }
            "exclude" => {
                filter.exclude = yaml::as_string_list(v)?;
                Ok(())
            }
            "add_labels" => {
                filter.add_labels = yaml::as_label_set(v)?;
                Ok(())
            }
            "drop_labels" => {
                let names = yaml::as_string_list(v)?;
                for name in &names {
                    check_label_name(name)?;
                }
                filter.drop_labels = names;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        })?;
        Ok(filter)
    }

    fn select(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| name.starts_with(p.as_str()))
        {
            return false;
        }
        !self.exclude.iter().any(|p| name.starts_with(p.as_str()))
    }
}

impl MetricFilter for LabelFilter {
    fn filter(&self, family: &mut MetricFamily) -> bool {
        if !self.select(family.name()) {
            return false;
        }
        if self.add_labels.is_empty() && self.drop_labels.is_empty() {
            return true;
        }
        for metric in family.metrics_mut() {
            for name in &self.drop_labels {
                metric.labels.remove(name);
            }
            for (k, v) in self.add_labels.iter() {
                // names are checked at parse time
                let _ = metric.labels.set(k, v);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use g3_metric::{MetricType, Value};
    use yaml_rust::YamlLoader;

    fn family(name: &str) -> MetricFamily {
        let mut f = MetricFamily::new(name, MetricType::Gauge).unwrap();
        f.append(Value::gauge(1.0), None, &[("host", "a"), ("dc", "x")])
            .unwrap();
        f
    }

    #[test]
    fn select() {
        let filter = LabelFilter::default().include("cpu_").exclude("cpu_idle");
        assert!(filter.filter(&mut family("cpu_user")));
        assert!(!filter.filter(&mut family("cpu_idle")));
        assert!(!filter.filter(&mut family("memory_used")));

        let filter = LabelFilter::default();
        assert!(filter.filter(&mut family("memory_used")));
    }

    #[test]
    fn relabel() {
        let mut add = LabelSet::new();
        add.add("env", "prod").unwrap();
        add.add("host", "b").unwrap();
        let filter = LabelFilter::default().add_labels(add).drop_label("dc");

        let mut f = family("load");
        assert!(filter.filter(&mut f));
        let labels = &f.metrics()[0].labels;
        assert_eq!(labels.get("host"), Some("b"));
        assert_eq!(labels.get("env"), Some("prod"));
        assert!(!labels.contains("dc"));
    }

    #[test]
    fn parse() {
        let doc = YamlLoader::load_from_str(
            "include: [cpu_, mem_]\nexclude: cpu_idle\nadd-labels: {env: prod}\ndrop_labels: dc",
        )
        .unwrap();
        let filter = LabelFilter::parse(&doc[0]).unwrap();
        assert_eq!(filter.include, vec!["cpu_", "mem_"]);
        assert_eq!(filter.exclude, vec!["cpu_idle"]);
        assert_eq!(filter.add_labels.get("env"), Some("prod"));
        assert_eq!(filter.drop_labels, vec!["dc"]);

        let doc = YamlLoader::load_from_str("drop_labels: 'bad-name'").unwrap();
        assert!(LabelFilter::parse(&doc[0]).is_err());
        let doc = YamlLoader::load_from_str("other: 1").unwrap();
        assert!(LabelFilter::parse(&doc[0]).is_err());
    }
}
