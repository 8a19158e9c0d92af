//! Violation Ledger
//!
//! Append-only record of violations with a mutable status field and a live
//! fan-out notification channel. The ledger is the single owner of shared
//! mutable violation state; all mutation goes through `record` and
//! `update_status`, and append order is the authoritative event order
//! delivered to subscribers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{PolicyError, Result};
use crate::models::{Violation, ViolationDraft, ViolationStatus};

/// Default per-subscriber event buffer. A subscriber that falls further
/// behind than this is lagged and disconnected rather than blocking the
/// ledger or other subscribers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Event published on every ledger mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    Created { violation: Violation },
    Updated { violation: Violation },
}

impl LedgerEvent {
    pub fn violation(&self) -> &Violation {
        match self {
            LedgerEvent::Created { violation } | LedgerEvent::Updated { violation } => violation,
        }
    }
}

/// Filter for snapshot queries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotFilter {
    pub status: Option<ViolationStatus>,
    /// Case-insensitive subject match
    pub subject: Option<String>,
}

impl SnapshotFilter {
    fn matches(&self, v: &Violation) -> bool {
        if let Some(status) = self.status {
            if v.status != status {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if !v.subject.eq_ignore_ascii_case(subject) {
                return false;
            }
        }
        true
    }
}

#[derive(Default)]
struct LedgerInner {
    /// Append-only, creation order
    log: Vec<Violation>,
    /// Violation id -> position in `log`
    index: HashMap<String, usize>,
}

/// The single owning component for violation state
pub struct ViolationLedger {
    inner: RwLock<LedgerInner>,
    events: broadcast::Sender<LedgerEvent>,
}

impl ViolationLedger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a ledger with a custom per-subscriber event buffer.
    pub fn with_capacity(channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            inner: RwLock::new(LedgerInner::default()),
            events,
        }
    }

    /// Record a violation draft: assigns identity and creation timestamp,
    /// sets status to open, appends, and publishes a created event.
    pub fn record(&self, draft: ViolationDraft) -> Result<Violation> {
        let id = format!("V-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let violation = Violation::from_draft(draft, id, Utc::now());

        {
            let mut inner = self
                .inner
                .write()
                .map_err(|_| PolicyError::internal("ledger lock poisoned"))?;
            let pos = inner.log.len();
            inner.index.insert(violation.id.clone(), pos);
            inner.log.push(violation.clone());
        }

        // No subscribers is fine; send only fails when none are attached.
        let _ = self.events.send(LedgerEvent::Created {
            violation: violation.clone(),
        });
        Ok(violation)
    }

    /// Advance a violation's status along the one-way progression and
    /// publish an updated event.
    pub fn update_status(&self, id: &str, status: ViolationStatus) -> Result<Violation> {
        let updated = {
            let mut inner = self
                .inner
                .write()
                .map_err(|_| PolicyError::internal("ledger lock poisoned"))?;
            let pos = *inner
                .index
                .get(id)
                .ok_or_else(|| PolicyError::not_found(format!("violation '{}'", id)))?;
            let violation = &mut inner.log[pos];

            if !violation.status.can_transition_to(status) {
                return Err(PolicyError::InvalidTransition {
                    from: violation.status,
                    to: status,
                });
            }
            violation.status = status;
            violation.updated_at = Utc::now();
            violation.clone()
        };

        let _ = self.events.send(LedgerEvent::Updated {
            violation: updated.clone(),
        });
        Ok(updated)
    }

    /// Look up a single violation by id.
    pub fn get(&self, id: &str) -> Result<Violation> {
        let inner = self
            .inner
            .read()
            .map_err(|_| PolicyError::internal("ledger lock poisoned"))?;
        inner
            .index
            .get(id)
            .map(|&pos| inner.log[pos].clone())
            .ok_or_else(|| PolicyError::not_found(format!("violation '{}'", id)))
    }

    /// Point-in-time view: the most recent `limit` violations matching the
    /// filter, newest first.
    pub fn snapshot(&self, limit: usize, filter: &SnapshotFilter) -> Result<Vec<Violation>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| PolicyError::internal("ledger lock poisoned"))?;
        Ok(inner
            .log
            .iter()
            .rev()
            .filter(|v| filter.matches(v))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Attach a live subscriber. Each receiver has its own cursor and
    /// bounded buffer; dropping it detaches with no effect on the ledger
    /// or other subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Violations currently in open status.
    pub fn open_count(&self) -> usize {
        self.inner
            .read()
            .map(|i| {
                i.log
                    .iter()
                    .filter(|v| v.status == ViolationStatus::Open)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Total recorded violations, all statuses.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ViolationLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Evidence, ObservedValue, Severity};

    fn draft(subject: &str) -> ViolationDraft {
        ViolationDraft {
            rule_id: "R-FEE".to_string(),
            rule_version: 1,
            fact_type: "fee_post".to_string(),
            subject: subject.to_string(),
            field: "fee_rate".to_string(),
            observed: ObservedValue::Number(0.025),
            expected: "fee_rate less_or_equal 0.02".to_string(),
            severity: Severity::High,
            evidence: Evidence::new("contract.pdf"),
        }
    }

    #[test]
    fn test_record_assigns_identity_and_open_status() {
        let ledger = ViolationLedger::new();
        let v = ledger.record(draft("Institution A")).unwrap();

        assert!(v.id.starts_with("V-"));
        assert_eq!(v.status, ViolationStatus::Open);
        assert_eq!(v.created_at, v.updated_at);
        assert_eq!(ledger.open_count(), 1);
    }

    #[test]
    fn test_update_by_id_reaches_the_right_entry() {
        let ledger = ViolationLedger::new();
        ledger.record(draft("Institution A")).unwrap();
        ledger.record(draft("Foundation B")).unwrap();
        let third = ledger.record(draft("Pension C")).unwrap();

        let updated = ledger
            .update_status(&third.id, ViolationStatus::Resolved)
            .unwrap();
        assert_eq!(updated.subject, "Pension C");

        // The other entries are untouched.
        assert_eq!(ledger.open_count(), 2);
        let all = ledger.snapshot(usize::MAX, &SnapshotFilter::default()).unwrap();
        assert!(all
            .iter()
            .filter(|v| v.id != third.id)
            .all(|v| v.status == ViolationStatus::Open));
    }

    #[test]
    fn test_update_status_unknown_id_is_not_found() {
        let ledger = ViolationLedger::new();
        let result = ledger.update_status("V-missing", ViolationStatus::Acknowledged);
        assert!(matches!(result, Err(PolicyError::NotFound(_))));
    }

    #[test]
    fn test_status_progression_is_one_way() {
        let ledger = ViolationLedger::new();
        let v = ledger.record(draft("Institution A")).unwrap();

        let v = ledger
            .update_status(&v.id, ViolationStatus::Acknowledged)
            .unwrap();
        assert_eq!(v.status, ViolationStatus::Acknowledged);

        let v = ledger
            .update_status(&v.id, ViolationStatus::Resolved)
            .unwrap();
        assert_eq!(v.status, ViolationStatus::Resolved);

        // Resolved is terminal, including resolved -> resolved
        let result = ledger.update_status(&v.id, ViolationStatus::Resolved);
        assert!(matches!(
            result,
            Err(PolicyError::InvalidTransition {
                from: ViolationStatus::Resolved,
                to: ViolationStatus::Resolved,
            })
        ));

        let result = ledger.update_status(&v.id, ViolationStatus::Acknowledged);
        assert!(matches!(result, Err(PolicyError::InvalidTransition { .. })));
    }

    #[test]
    fn test_snapshot_reverse_creation_order_with_limit() {
        let ledger = ViolationLedger::new();
        let first = ledger.record(draft("Institution A")).unwrap();
        let second = ledger.record(draft("Institution A")).unwrap();
        let third = ledger.record(draft("Foundation B")).unwrap();

        let all = ledger.snapshot(100, &SnapshotFilter::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|v| v.id.clone()).collect();
        assert_eq!(ids, vec![third.id.clone(), second.id.clone(), first.id]);

        let limited = ledger.snapshot(2, &SnapshotFilter::default()).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, third.id);
    }

    #[test]
    fn test_snapshot_filters() {
        let ledger = ViolationLedger::new();
        let a = ledger.record(draft("Institution A")).unwrap();
        ledger.record(draft("Foundation B")).unwrap();
        ledger
            .update_status(&a.id, ViolationStatus::Resolved)
            .unwrap();

        let filter = SnapshotFilter {
            status: Some(ViolationStatus::Open),
            subject: None,
        };
        let open = ledger.snapshot(100, &filter).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].subject, "Foundation B");

        let filter = SnapshotFilter {
            status: None,
            subject: Some("institution a".to_string()),
        };
        let by_subject = ledger.snapshot(100, &filter).unwrap();
        assert_eq!(by_subject.len(), 1);
        assert_eq!(by_subject[0].id, a.id);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_creation_order() {
        let ledger = ViolationLedger::new();
        let mut rx = ledger.subscribe();

        let first = ledger.record(draft("Institution A")).unwrap();
        let second = ledger.record(draft("Institution A")).unwrap();

        let ev1 = rx.recv().await.unwrap();
        let ev2 = rx.recv().await.unwrap();
        assert_eq!(ev1.violation().id, first.id);
        assert_eq!(ev2.violation().id, second.id);
        assert!(matches!(ev1, LedgerEvent::Created { .. }));
    }

    #[tokio::test]
    async fn test_two_subscribers_see_identical_event() {
        let ledger = ViolationLedger::new();
        let mut rx_a = ledger.subscribe();
        let mut rx_b = ledger.subscribe();

        let recorded = ledger.record(draft("Institution A")).unwrap();

        let ev_a = rx_a.recv().await.unwrap();
        let ev_b = rx_b.recv().await.unwrap();
        assert_eq!(ev_a.violation().id, recorded.id);
        assert_eq!(ev_b.violation().id, recorded.id);
        assert_eq!(ev_a.violation().created_at, ev_b.violation().created_at);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_affect_ledger() {
        let ledger = ViolationLedger::new();
        let rx = ledger.subscribe();
        drop(rx);

        assert!(ledger.record(draft("Institution A")).is_ok());
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let ledger = ViolationLedger::with_capacity(2);
        let mut rx = ledger.subscribe();

        for _ in 0..5 {
            ledger.record(draft("Institution A")).unwrap();
        }

        // Oldest events were dropped for this subscriber only
        let result = rx.recv().await;
        assert!(matches!(
            result,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(ledger.len(), 5);
    }

    #[tokio::test]
    async fn test_update_publishes_updated_event() {
        let ledger = ViolationLedger::new();
        let v = ledger.record(draft("Institution A")).unwrap();

        let mut rx = ledger.subscribe();
        ledger
            .update_status(&v.id, ViolationStatus::Acknowledged)
            .unwrap();

        let ev = rx.recv().await.unwrap();
        assert!(matches!(ev, LedgerEvent::Updated { .. }));
        assert_eq!(ev.violation().status, ViolationStatus::Acknowledged);
    }
}
