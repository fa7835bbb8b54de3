// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Metric values that can be explicitly not computable.
//!
//! A missing denominator must never be reported as `0`, `1` or infinity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a metric has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unmeasurable {
    /// Fewer than two successful repetitions
    InsufficientRepetitions,
    /// Zero findings in the denominator
    ZeroFindings,
    /// No successful records contributed
    NoRecords,
}

impl fmt::Display for Unmeasurable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InsufficientRepetitions => "insufficient repetitions",
            Self::ZeroFindings => "zero findings",
            Self::NoRecords => "no records",
        };
        f.write_str(s)
    }
}

/// A derived metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Measure {
    /// A finite value
    Computed {
        /// The value
        value: f64,
    },
    /// No value could be derived
    NotComputable {
        /// Why
        reason: Unmeasurable,
    },
}

impl Measure {
    /// Wrap a computed value.
    pub fn computed(value: f64) -> Self {
        Self::Computed { value }
    }

    /// Mark as not computable.
    pub fn not_computable(reason: Unmeasurable) -> Self {
        Self::NotComputable { reason }
    }

    /// `numerator / denominator`, not computable when the denominator is zero.
    pub fn ratio(numerator: f64, denominator: f64, reason: Unmeasurable) -> Self {
        if denominator == 0.0 {
            Self::not_computable(reason)
        } else {
            Self::computed(numerator / denominator)
        }
    }

    /// Arithmetic mean, not computable for an empty slice.
    pub fn mean(values: &[f64], reason: Unmeasurable) -> Self {
        if values.is_empty() {
            Self::not_computable(reason)
        } else {
            Self::computed(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// The value, if computed.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Computed { value } => Some(*value),
            Self::NotComputable { .. } => None,
        }
    }

    /// Whether a value exists.
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_zero_denominator_is_not_computable() {
        let m = Measure::ratio(0.25, 0.0, Unmeasurable::ZeroFindings);
        assert_eq!(m, Measure::not_computable(Unmeasurable::ZeroFindings));
        assert_eq!(m.value(), None);
    }

    #[test]
    fn test_ratio_and_mean() {
        assert_eq!(Measure::ratio(1.0, 4.0, Unmeasurable::ZeroFindings).value(), Some(0.25));
        assert_eq!(Measure::mean(&[1.0, 2.0, 3.0], Unmeasurable::NoRecords).value(), Some(2.0));
        assert!(!Measure::mean(&[], Unmeasurable::NoRecords).is_computed());
    }

    #[test]
    fn test_serialization_shape() {
        let json = serde_json::to_value(Measure::computed(0.5)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "computed", "value": 0.5}));

        let json =
            serde_json::to_value(Measure::not_computable(Unmeasurable::InsufficientRepetitions))
                .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "not_computable", "reason": "insufficient_repetitions"})
        );
    }
}
