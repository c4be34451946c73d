/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

use crate::MetricType;

/// Rejection of caller input by a data model operation.
///
/// Every variant belongs to the invalid argument class, the variants only
/// tell which part of the input was wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("duplicate label name {0}")]
    DuplicateLabel(String),
    #[error("metric type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: MetricType,
        found: MetricType,
    },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RateError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("timestamp is not newer than the last one")]
    NonMonotonicTime,
    #[error("not enough history to compute a value")]
    InsufficientHistory,
}
