/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use crate::MetricError;

/// Label names follow `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn check_label_name(name: &str) -> Result<(), MetricError> {
    let mut bytes = name.as_bytes().iter();
    match bytes.next() {
        Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {}
        _ => return Err(MetricError::InvalidName(name.to_string())),
    }
    if bytes.all(|c| c.is_ascii_alphanumeric() || *c == b'_') {
        Ok(())
    } else {
        Err(MetricError::InvalidName(name.to_string()))
    }
}

/// Metric family names follow `[a-zA-Z_:][a-zA-Z0-9_:.]*`.
pub fn check_metric_name(name: &str) -> Result<(), MetricError> {
    let mut bytes = name.as_bytes().iter();
    match bytes.next() {
        Some(c) if c.is_ascii_alphabetic() || *c == b'_' || *c == b':' => {}
        Some(_) => return Err(MetricError::InvalidName(name.to_string())),
        None => return Err(MetricError::InvalidArgument("empty metric name")),
    }
    if bytes.all(|c| c.is_ascii_alphanumeric() || matches!(*c, b'_' | b':' | b'.')) {
        Ok(())
    } else {
        Err(MetricError::InvalidName(name.to_string()))
    }
}
