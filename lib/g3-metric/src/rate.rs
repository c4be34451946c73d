/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use ahash::AHashMap;
use chrono::{DateTime, Utc};

use crate::{CounterValue, RateError, SeriesKey};

/// How a decreasing counter is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CounterWidth {
    /// Guess from the magnitude of the previous value: anything that fits
    /// in 32 bits wraps at 2^32 - 1, larger values wrap at 2^64 - 1.
    ///
    /// A small 64 bit counter that wrapped can not be told apart from a
    /// 32 bit one, declare the width explicitly when it is known.
    #[default]
    Auto,
    Bits32,
    Bits64,
}

impl CounterWidth {
    /// Difference between two readings, treating a decrease as a wrap.
    pub fn diff(self, old: u64, new: u64) -> u64 {
        if old <= new {
            return new - old;
        }
        let max = match self {
            CounterWidth::Bits32 => u32::MAX as u64,
            CounterWidth::Bits64 => u64::MAX,
            CounterWidth::Auto => {
                if old <= u32::MAX as u64 {
                    u32::MAX as u64
                } else {
                    u64::MAX
                }
            }
        };
        // a wrap at 2^32 can not start above it, fall back to 64 bit
        let max = if old > max { u64::MAX } else { max };
        (max - old).wrapping_add(new).wrapping_add(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CounterState {
    last_value: CounterValue,
    last_time: DateTime<Utc>,
}

/// State of one rate to counter conversion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateState {
    pub last_value: u64,
    pub last_time: DateTime<Utc>,
    pub residual: f64,
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Per series counter to rate and rate to counter conversion state.
///
/// Every error also resets the state of the series. The first call after a
/// reset only seeds the state and returns [`RateError::InsufficientHistory`].
#[derive(Default)]
pub struct CounterCache {
    to_rate: AHashMap<SeriesKey, CounterState>,
    to_counter: AHashMap<SeriesKey, RateState>,
}

impl CounterCache {
    pub fn new() -> Self {
        CounterCache::default()
    }

    pub fn counter_to_rate(
        &mut self,
        key: &SeriesKey,
        value: CounterValue,
        time: DateTime<Utc>,
    ) -> Result<f64, RateError> {
        self.counter_to_rate_with_width(key, value, time, CounterWidth::Auto)
    }

    pub fn counter_to_rate_with_width(
        &mut self,
        key: &SeriesKey,
        value: CounterValue,
        time: DateTime<Utc>,
        width: CounterWidth,
    ) -> Result<f64, RateError> {
        let Some(state) = self.to_rate.get_mut(key) else {
            self.to_rate.insert(
                key.clone(),
                CounterState {
                    last_value: value,
                    last_time: time,
                },
            );
            return Err(RateError::InsufficientHistory);
        };

        if time <= state.last_time {
            self.to_rate.remove(key);
            return Err(RateError::NonMonotonicTime);
        }

        let diff = match (state.last_value, value) {
            (CounterValue::UInt64(old), CounterValue::UInt64(new)) => width.diff(old, new) as f64,
            // float counters restart from zero instead of wrapping
            (CounterValue::Float64(old), CounterValue::Float64(new)) => {
                if new < old {
                    new
                } else {
                    new - old
                }
            }
            _ => {
                *state = CounterState {
                    last_value: value,
                    last_time: time,
                };
                return Err(RateError::InsufficientHistory);
            }
        };

        let rate = diff / seconds_between(state.last_time, time);
        state.last_value = value;
        state.last_time = time;
        Ok(rate)
    }

    pub fn rate_to_counter(
        &mut self,
        key: &SeriesKey,
        rate: f64,
        time: DateTime<Utc>,
    ) -> Result<u64, RateError> {
        if !rate.is_finite() || rate < 0.0 {
            self.to_counter.remove(key);
            return Err(RateError::InvalidArgument("rate is negative or not finite"));
        }

        let Some(state) = self.to_counter.get_mut(key) else {
            let last_value = rate.floor();
            self.to_counter.insert(
                key.clone(),
                RateState {
                    last_value: last_value as u64,
                    last_time: time,
                    residual: rate - last_value,
                },
            );
            return Err(RateError::InsufficientHistory);
        };

        if time <= state.last_time {
            self.to_counter.remove(key);
            return Err(RateError::NonMonotonicTime);
        }

        let delta = rate * seconds_between(state.last_time, time) + state.residual;
        let whole = delta.floor();
        state.last_value = state.last_value.wrapping_add(whole as u64);
        state.residual = delta - whole;
        state.last_time = time;
        Ok(state.last_value)
    }

    pub fn rate_state(&self, key: &SeriesKey) -> Option<&RateState> {
        self.to_counter.get(key)
    }

    /// Drop all state of one series.
    pub fn forget(&mut self, key: &SeriesKey) {
        self.to_rate.remove(key);
        self.to_counter.remove(key);
    }

    /// Drop the series that have not been updated since `time`.
    pub fn retain_newer_than(&mut self, time: DateTime<Utc>) {
        self.to_rate.retain(|_, s| s.last_time > time);
        self.to_counter.retain(|_, s| s.last_time > time);
    }

    pub fn len(&self) -> usize {
        self.to_rate.len() + self.to_counter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_rate.is_empty() && self.to_counter.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LabelSet;

    fn key(name: &str) -> SeriesKey {
        SeriesKey::new(name, &LabelSet::new())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn diff_wrap() {
        assert_eq!(CounterWidth::Auto.diff(100, 150), 50);
        assert_eq!(
            CounterWidth::Auto.diff(150, 90),
            (u32::MAX as u64 - 150) + 90 + 1
        );
        let big = u32::MAX as u64 + 10;
        assert_eq!(CounterWidth::Auto.diff(big, 5), (u64::MAX - big) + 5 + 1);
        assert_eq!(CounterWidth::Bits64.diff(150, 90), (u64::MAX - 150) + 90 + 1);
        assert_eq!(
            CounterWidth::Bits32.diff(u32::MAX as u64, 0),
            1,
        );
        assert_eq!(CounterWidth::Bits32.diff(big, 5), (u64::MAX - big) + 5 + 1);
    }

    #[test]
    fn first_call_insufficient() {
        let mut cache = CounterCache::new();
        let k = key("fresh");
        assert_eq!(
            cache.counter_to_rate(&k, CounterValue::UInt64(10), at(0)),
            Err(RateError::InsufficientHistory)
        );
        assert_eq!(
            cache.counter_to_rate(&k, CounterValue::UInt64(30), at(10)),
            Ok(2.0)
        );
    }

    #[test]
    fn counter_sequence_wrap() {
        let mut cache = CounterCache::new();
        let k = key("wrap");
        assert!(cache.counter_to_rate(&k, CounterValue::UInt64(100), at(0)).is_err());
        assert_eq!(
            cache.counter_to_rate(&k, CounterValue::UInt64(150), at(1)),
            Ok(50.0)
        );
        let expected = ((u32::MAX as u64 - 150) + 90 + 1) as f64;
        assert_eq!(
            cache.counter_to_rate(&k, CounterValue::UInt64(90), at(2)),
            Ok(expected)
        );
    }

    #[test]
    fn counter_non_monotonic() {
        let mut cache = CounterCache::new();
        let k = key("time");
        let _ = cache.counter_to_rate(&k, CounterValue::UInt64(1), at(5));
        assert_eq!(
            cache.counter_to_rate(&k, CounterValue::UInt64(2), at(5)),
            Err(RateError::NonMonotonicTime)
        );
        // state was reset, the next call seeds again
        assert_eq!(
            cache.counter_to_rate(&k, CounterValue::UInt64(3), at(6)),
            Err(RateError::InsufficientHistory)
        );
        assert_eq!(
            cache.counter_to_rate(&k, CounterValue::UInt64(7), at(8)),
            Ok(2.0)
        );
    }

    #[test]
    fn float_counter_restart() {
        let mut cache = CounterCache::new();
        let k = key("float");
        let _ = cache.counter_to_rate(&k, CounterValue::Float64(10.0), at(0));
        assert_eq!(
            cache.counter_to_rate(&k, CounterValue::Float64(4.0), at(2)),
            Ok(2.0)
        );
    }

    #[test]
    fn rate_to_counter_accumulate() {
        let mut cache = CounterCache::new();
        let k = key("acc");
        assert_eq!(
            cache.rate_to_counter(&k, 2.5, at(0)),
            Err(RateError::InsufficientHistory)
        );
        let s = cache.rate_state(&k).unwrap();
        assert_eq!(s.last_value, 2);
        assert_eq!(s.residual, 0.5);

        // 2.5 * 3 + 0.5 = 8.0
        assert_eq!(cache.rate_to_counter(&k, 2.5, at(3)), Ok(10));
        // 0.3 * 1 + 0.0
        assert_eq!(cache.rate_to_counter(&k, 0.3, at(4)), Ok(10));
        let s = cache.rate_state(&k).unwrap();
        assert!((s.residual - 0.3).abs() < 1e-9);
    }

    #[test]
    fn rate_to_counter_invalid() {
        let mut cache = CounterCache::new();
        let k = key("neg");
        let _ = cache.rate_to_counter(&k, 1.0, at(0));
        assert!(matches!(
            cache.rate_to_counter(&k, -1.0, at(1)),
            Err(RateError::InvalidArgument(_))
        ));
        assert!(cache.rate_state(&k).is_none());

        let _ = cache.rate_to_counter(&k, 1.0, at(2));
        assert_eq!(
            cache.rate_to_counter(&k, 1.0, at(1)),
            Err(RateError::NonMonotonicTime)
        );
        assert!(cache.rate_state(&k).is_none());
    }

    #[test]
    fn round_trip() {
        let mut cache = CounterCache::new();
        let rk = key("rt_rate");
        let ck = key("rt_counter");

        let rates = [4.0, 12.5, 0.25, 100.0, 7.75];
        let step = 4;
        let mut t = 0;
        let counter = match cache.rate_to_counter(&rk, rates[0], at(t)) {
            Err(RateError::InsufficientHistory) => cache.rate_state(&rk).unwrap().last_value,
            r => panic!("unexpected {r:?}"),
        };
        assert!(
            cache
                .counter_to_rate(&ck, CounterValue::UInt64(counter), at(t))
                .is_err()
        );

        for rate in rates {
            t += step;
            let counter = cache.rate_to_counter(&rk, rate, at(t)).unwrap();
            let back = cache
                .counter_to_rate(&ck, CounterValue::UInt64(counter), at(t))
                .unwrap();
            assert!((back - rate).abs() < 1e-9, "rate {rate} came back as {back}");
        }
    }

    #[test]
    fn expire() {
        let mut cache = CounterCache::new();
        let _ = cache.counter_to_rate(&key("old"), CounterValue::UInt64(1), at(0));
        let _ = cache.rate_to_counter(&key("new"), 1.0, at(10));
        assert_eq!(cache.len(), 2);
        cache.retain_newer_than(at(5));
        assert_eq!(cache.len(), 1);
        cache.forget(&key("new"));
        assert!(cache.is_empty());
    }
}
