//! Rule Evaluator
//!
//! Matches incoming facts against applicable stored rules and produces one
//! violation draft per violated rule. Evaluation is a pure function of the
//! store snapshot and the fact: it performs no writes and is safe to invoke
//! concurrently across independent facts.

pub mod ops;

use std::sync::Arc;

use crate::error::Result;
use crate::models::{Fact, StoredRule, ViolationDraft};
use crate::store::{PolicyStore, RuleFilter};

/// Outcome of evaluating a single fact
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Rules whose subject+field matched the fact
    pub rules_matched: usize,
    /// One draft per violated rule; empty means compliant or unmatched
    pub violations: Vec<ViolationDraft>,
}

impl Evaluation {
    /// A fact with no applicable rule is not an error; it just yields
    /// nothing to record.
    pub fn is_unmatched(&self) -> bool {
        self.rules_matched == 0
    }
}

/// Stateless evaluator over a shared policy store
#[derive(Clone)]
pub struct Evaluator {
    store: Arc<PolicyStore>,
}

impl Evaluator {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Evaluate one fact against every rule matching its subject
    /// (case-insensitive) and field.
    pub fn evaluate(&self, fact: &Fact) -> Result<Evaluation> {
        let filter = RuleFilter {
            subject: Some(fact.subject.clone()),
            field: Some(fact.field.clone()),
        };
        let rules = self.store.list(&filter)?;

        let mut violations = Vec::new();
        for rule in &rules {
            if !ops::complies(
                rule.spec.operator,
                &fact.value,
                &rule.spec.threshold,
                rule.spec.tolerance,
            )? {
                violations.push(draft_for(rule, fact));
            }
        }

        Ok(Evaluation {
            rules_matched: rules.len(),
            violations,
        })
    }
}

fn draft_for(rule: &StoredRule, fact: &Fact) -> ViolationDraft {
    ViolationDraft {
        rule_id: rule.id().to_string(),
        rule_version: rule.version,
        fact_type: fact.fact_type.clone(),
        subject: fact.subject.clone(),
        field: fact.field.clone(),
        observed: fact.value.clone(),
        expected: format!(
            "{} {} {}",
            rule.spec.field,
            rule.spec.operator,
            rule.spec.threshold.describe()
        ),
        severity: rule.severity(),
        evidence: rule.spec.evidence.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Evidence, Operator, RuleSpec, Severity, Threshold};

    fn store_with_fee_rule() -> Arc<PolicyStore> {
        let store = Arc::new(PolicyStore::new());
        store
            .put(RuleSpec {
                id: "R-FEE".to_string(),
                subject: "Institution A".to_string(),
                field: "fee_rate".to_string(),
                operator: Operator::LessOrEqual,
                threshold: Threshold::Number(0.02),
                tolerance: None,
                severity: None,
                evidence: Evidence::new("SideLetter_InstitutionA.pdf"),
                comments: None,
            })
            .unwrap();
        store
    }

    #[test]
    fn test_compliant_fact_yields_no_violations() {
        let evaluator = Evaluator::new(store_with_fee_rule());
        let fact = Fact::new("fee_post", "Institution A", "fee_rate", 0.015);

        let eval = evaluator.evaluate(&fact).unwrap();
        assert_eq!(eval.rules_matched, 1);
        assert!(eval.violations.is_empty());
    }

    #[test]
    fn test_boundary_value_is_compliant() {
        let evaluator = Evaluator::new(store_with_fee_rule());
        let fact = Fact::new("fee_post", "Institution A", "fee_rate", 0.02);

        let eval = evaluator.evaluate(&fact).unwrap();
        assert!(eval.violations.is_empty());
    }

    #[test]
    fn test_breach_yields_one_violation() {
        let evaluator = Evaluator::new(store_with_fee_rule());
        let fact = Fact::new("fee_post", "Institution A", "fee_rate", 0.025);

        let eval = evaluator.evaluate(&fact).unwrap();
        assert_eq!(eval.violations.len(), 1);

        let v = &eval.violations[0];
        assert_eq!(v.rule_id, "R-FEE");
        assert_eq!(v.rule_version, 1);
        assert_eq!(v.severity, Severity::High);
        assert_eq!(v.expected, "fee_rate less_or_equal 0.02");
    }

    #[test]
    fn test_subject_match_is_case_insensitive() {
        let evaluator = Evaluator::new(store_with_fee_rule());
        let fact = Fact::new("fee_post", "INSTITUTION a", "fee_rate", 0.03);

        let eval = evaluator.evaluate(&fact).unwrap();
        assert_eq!(eval.violations.len(), 1);
    }

    #[test]
    fn test_unmatched_fact_is_empty_not_error() {
        let evaluator = Evaluator::new(store_with_fee_rule());
        let fact = Fact::new("fee_post", "Foundation B", "fee_rate", 0.9);

        let eval = evaluator.evaluate(&fact).unwrap();
        assert!(eval.is_unmatched());
        assert!(eval.violations.is_empty());
    }

    #[test]
    fn test_multiple_rules_can_each_violate() {
        let store = store_with_fee_rule();
        store
            .put(RuleSpec {
                id: "R-FEE-BAND".to_string(),
                subject: "Institution A".to_string(),
                field: "fee_rate".to_string(),
                operator: Operator::Between,
                threshold: Threshold::Range([0.005, 0.02]),
                tolerance: None,
                severity: None,
                evidence: Evidence::new("Amendment_2.pdf"),
                comments: None,
            })
            .unwrap();
        let evaluator = Evaluator::new(store);

        let fact = Fact::new("fee_post", "Institution A", "fee_rate", 0.04);
        let eval = evaluator.evaluate(&fact).unwrap();
        assert_eq!(eval.rules_matched, 2);
        assert_eq!(eval.violations.len(), 2);
    }

    #[test]
    fn test_identical_reput_does_not_change_outcome() {
        let store = store_with_fee_rule();
        let evaluator = Evaluator::new(Arc::clone(&store));
        let fact = Fact::new("fee_post", "Institution A", "fee_rate", 0.025);

        let before = evaluator.evaluate(&fact).unwrap();
        store.put(store.get("R-FEE").unwrap().spec).unwrap();
        let after = evaluator.evaluate(&fact).unwrap();

        assert_eq!(before.violations.len(), after.violations.len());
        assert_eq!(store.get("R-FEE").unwrap().version, 2);
        // The draft now references the new latest version
        assert_eq!(after.violations[0].rule_version, 2);
    }
}
