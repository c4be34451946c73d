/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;

use crate::label::marshal_pairs;
use crate::{LabelSet, Notification};

/// Canonical identity of a series: `name{a="1",b="2"}`.
///
/// Label pairs are sorted by name so sets with the same pairs map to the
/// same key whatever order they were built in. Values are escaped, so
/// neither `,` nor `"` inside a value can forge another pair. The label
/// group is omitted when there are no labels.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey(String);

impl SeriesKey {
    pub fn new(name: &str, labels: &LabelSet) -> Self {
        let mut s = String::with_capacity(name.len() + labels.len() * 16 + 2);
        s.push_str(name);
        if !labels.is_empty() {
            marshal_pairs(&mut s, labels.sorted());
        }
        SeriesKey(s)
    }

    pub fn for_notification(n: &Notification) -> Self {
        SeriesKey::new(&n.name, &n.labels)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SeriesKey").field(&self.0).finish()
    }
}
