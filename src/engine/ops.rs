//! Operator semantics for rule evaluation
//!
//! Numeric comparisons are exact unless the rule declares an absolute
//! tolerance. `between` is inclusive of both bounds. Categorical values
//! support equality operators only; applying an ordered operator to a
//! non-numeric value is a validation error on the fact, not a violation.

use crate::error::{PolicyError, Result};
use crate::models::{ObservedValue, Operator, Threshold};

/// Apply `operator threshold` to an observed value. Returns `true` when the
/// fact complies with the rule.
pub fn complies(
    operator: Operator,
    observed: &ObservedValue,
    threshold: &Threshold,
    tolerance: Option<f64>,
) -> Result<bool> {
    match threshold {
        Threshold::Range([lo, hi]) => {
            // Store validation guarantees Range only pairs with Between.
            let value = require_number(observed)?;
            let tol = tolerance.unwrap_or(0.0);
            Ok(value >= lo - tol && value <= hi + tol)
        }
        Threshold::Number(rhs) => {
            let value = require_number(observed)?;
            Ok(compare_numeric(operator, value, *rhs, tolerance))
        }
        Threshold::Text(rhs) => match operator {
            Operator::Equals => Ok(text_eq(observed, rhs)),
            Operator::NotEquals => Ok(!text_eq(observed, rhs)),
            other => Err(PolicyError::validation(format!(
                "operator {} cannot apply to categorical threshold '{}'",
                other, rhs
            ))),
        },
    }
}

fn require_number(observed: &ObservedValue) -> Result<f64> {
    observed.as_number().ok_or_else(|| {
        PolicyError::validation(format!(
            "numeric comparison requires a numeric observed value, got '{}'",
            observed.describe()
        ))
    })
}

fn compare_numeric(operator: Operator, lhs: f64, rhs: f64, tolerance: Option<f64>) -> bool {
    let tol = tolerance.unwrap_or(0.0);
    match operator {
        Operator::Equals => (lhs - rhs).abs() <= tol,
        Operator::NotEquals => (lhs - rhs).abs() > tol,
        Operator::LessThan => lhs < rhs + tol,
        Operator::LessOrEqual => lhs <= rhs + tol,
        Operator::GreaterThan => lhs > rhs - tol,
        Operator::GreaterOrEqual => lhs >= rhs - tol,
        // Between with a single threshold is rejected at rule insertion
        Operator::Between => lhs == rhs,
    }
}

fn text_eq(observed: &ObservedValue, rhs: &str) -> bool {
    match observed {
        ObservedValue::Text(s) => s == rhs,
        ObservedValue::Flag(b) => rhs.eq_ignore_ascii_case(&b.to_string()),
        ObservedValue::Number(n) => n.to_string() == rhs,
    }
}
