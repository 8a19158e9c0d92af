//! Policy Store
//!
//! Holds versioned, immutable validation rules keyed by rule id. A `put`
//! for an existing id appends a new version; prior versions remain
//! readable. Reads reflect writes with full consistency once `put`
//! returns, which keeps evaluation deterministic against any snapshot.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{PolicyError, Result};
use crate::models::{RuleSpec, StoredRule};

/// Filter for rule listing. Empty filter matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleFilter {
    /// Case-insensitive subject match
    pub subject: Option<String>,
    /// Exact field match
    pub field: Option<String>,
}

impl RuleFilter {
    fn matches(&self, rule: &StoredRule) -> bool {
        if let Some(subject) = &self.subject {
            if !rule.spec.subject.eq_ignore_ascii_case(subject) {
                return false;
            }
        }
        if let Some(field) = &self.field {
            if rule.spec.field != *field {
                return false;
            }
        }
        true
    }
}

#[derive(Default)]
struct StoreInner {
    /// All versions per rule id, oldest first
    versions: HashMap<String, Vec<StoredRule>>,
    /// Rule ids in first-insertion order
    order: Vec<String>,
}

/// In-memory rule store. All mutation goes through `put`; stored rules are
/// never modified or removed.
#[derive(Default)]
pub struct PolicyStore {
    inner: RwLock<StoreInner>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule, assigning the next version for its id.
    ///
    /// Fails with a validation error if the spec is malformed; the store is
    /// untouched in that case.
    pub fn put(&self, spec: RuleSpec) -> Result<StoredRule> {
        spec.validate()?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| PolicyError::internal("policy store lock poisoned"))?;

        let versions = match inner.versions.get_mut(&spec.id) {
            Some(v) => v,
            None => {
                inner.order.push(spec.id.clone());
                inner.versions.entry(spec.id.clone()).or_default()
            }
        };

        let rule = StoredRule {
            version: versions.len() as u64 + 1,
            created_at: Utc::now(),
            spec,
        };
        versions.push(rule.clone());
        Ok(rule)
    }

    /// Latest version of a rule id.
    pub fn get(&self, id: &str) -> Result<StoredRule> {
        let inner = self
            .inner
            .read()
            .map_err(|_| PolicyError::internal("policy store lock poisoned"))?;
        inner
            .versions
            .get(id)
            .and_then(|v| v.last())
            .cloned()
            .ok_or_else(|| PolicyError::not_found(format!("rule '{}'", id)))
    }

    /// A specific version of a rule id.
    pub fn get_version(&self, id: &str, version: u64) -> Result<StoredRule> {
        let inner = self
            .inner
            .read()
            .map_err(|_| PolicyError::internal("policy store lock poisoned"))?;
        inner
            .versions
            .get(id)
            .and_then(|v| v.get(version.checked_sub(1)? as usize))
            .cloned()
            .ok_or_else(|| PolicyError::not_found(format!("rule '{}' version {}", id, version)))
    }

    /// Latest versions matching the filter, in first-insertion order.
    pub fn list(&self, filter: &RuleFilter) -> Result<Vec<StoredRule>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| PolicyError::internal("policy store lock poisoned"))?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.versions.get(id).and_then(|v| v.last()))
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    /// Number of distinct rule ids.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.order.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load every rule from a policy bundle. Fails on the first invalid
    /// rule, leaving rules inserted before it in place.
    pub fn load_bundle(&self, bundle: &PolicyBundle) -> Result<usize> {
        for spec in &bundle.rules {
            self.put(spec.clone())?;
        }
        Ok(bundle.rules.len())
    }
}

/// On-disk policy bundle: a set of rules produced by an upstream compiler,
/// serialized as YAML or JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl PolicyBundle {
    /// Read a bundle from a YAML or JSON file, chosen by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PolicyError::file_error(format!("{}: {}", path.display(), e)))?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(serde_yaml::from_str(&content)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Evidence, Operator, Threshold};

    fn rule(id: &str, subject: &str, field: &str) -> RuleSpec {
        RuleSpec {
            id: id.to_string(),
            subject: subject.to_string(),
            field: field.to_string(),
            operator: Operator::LessOrEqual,
            threshold: Threshold::Number(0.02),
            tolerance: None,
            severity: None,
            evidence: Evidence::new("contract.pdf"),
            comments: None,
        }
    }

    #[test]
    fn test_put_assigns_versions() {
        let store = PolicyStore::new();
        let v1 = store.put(rule("R-001", "Institution A", "fee_rate")).unwrap();
        let v2 = store.put(rule("R-001", "Institution A", "fee_rate")).unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_eq!(store.get("R-001").unwrap().version, 2);
        assert_eq!(store.get_version("R-001", 1).unwrap().version, 1);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let store = PolicyStore::new();
        assert!(matches!(store.get("R-404"), Err(PolicyError::NotFound(_))));
        assert!(matches!(
            store.get_version("R-404", 1),
            Err(PolicyError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_rule_never_inserted() {
        let store = PolicyStore::new();
        let mut bad = rule("R-001", "Institution A", "fee_rate");
        bad.operator = Operator::Between;
        assert!(store.put(bad).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let store = PolicyStore::new();
        store.put(rule("R-002", "Institution A", "fee_rate")).unwrap();
        store.put(rule("R-001", "Foundation B", "report_delay_days")).unwrap();
        store.put(rule("R-003", "Institution A", "sector")).unwrap();

        let all = store.list(&RuleFilter::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["R-002", "R-001", "R-003"]);
    }

    #[test]
    fn test_list_filters_by_subject_case_insensitive() {
        let store = PolicyStore::new();
        store.put(rule("R-001", "Institution A", "fee_rate")).unwrap();
        store.put(rule("R-002", "Foundation B", "fee_rate")).unwrap();

        let filter = RuleFilter {
            subject: Some("institution a".to_string()),
            field: None,
        };
        let matched = store.list(&filter).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id(), "R-001");
    }

    #[test]
    fn test_list_filters_by_field() {
        let store = PolicyStore::new();
        store.put(rule("R-001", "Institution A", "fee_rate")).unwrap();
        store.put(rule("R-002", "Institution A", "sector")).unwrap();

        let filter = RuleFilter {
            subject: None,
            field: Some("sector".to_string()),
        };
        let matched = store.list(&filter).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id(), "R-002");
    }

    #[test]
    fn test_list_returns_latest_version_only() {
        let store = PolicyStore::new();
        store.put(rule("R-001", "Institution A", "fee_rate")).unwrap();
        store.put(rule("R-001", "Institution A", "fee_rate")).unwrap();

        let all = store.list(&RuleFilter::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].version, 2);
    }

    #[test]
    fn test_bundle_yaml_roundtrip() {
        let bundle = PolicyBundle {
            policy_id: Some("policy_test".to_string()),
            generated_at: None,
            rules: vec![rule("R-001", "Institution A", "fee_rate")],
        };
        let yaml = serde_yaml::to_string(&bundle).unwrap();
        let parsed: PolicyBundle = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.rules[0].id, "R-001");
    }
}
