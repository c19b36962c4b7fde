// ── Conflict detection ──
//
// Compares an incoming change with the last change seen for the same
// record. Conflicts are detected and reported, never resolved here.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::model::{ChangeKind, Conflict, ConflictType, SyncEvent};

#[derive(Debug, Clone)]
pub struct ConflictDetector {
    race_window: Duration,
}

impl ConflictDetector {
    /// `race_window` bounds how close a delete and a prior write from
    /// another session must be to count as racing.
    pub fn new(race_window: Duration) -> Self {
        Self { race_window }
    }

    /// Decide whether `new` collides with `prior`.
    pub fn check(&self, new: &SyncEvent, prior: Option<&SyncEvent>) -> Option<Conflict> {
        let prior = prior?;
        if prior.table != new.table || prior.record_id != new.record_id || new.same_session(prior) {
            return None;
        }

        match (prior.operation, new.operation) {
            (ChangeKind::Delete, ChangeKind::Delete) => None,
            // Writing to a record someone already deleted.
            (ChangeKind::Delete, _) => {
                Some(conflict(new, prior, None, ConflictType::DeleteUpdateRace))
            }
            (_, ChangeKind::Delete) => self
                .within_race_window(new, prior)
                .then(|| conflict(new, prior, None, ConflictType::DeleteUpdateRace)),
            _ => Self::check_versions(new, prior),
        }
    }

    fn within_race_window(&self, new: &SyncEvent, prior: &SyncEvent) -> bool {
        let gap = (new.timestamp - prior.timestamp)
            .abs()
            .to_std()
            .unwrap_or(Duration::MAX);
        gap <= self.race_window
    }

    fn check_versions(new: &SyncEvent, prior: &SyncEvent) -> Option<Conflict> {
        let (Some(prior_version), Some(new_version)) = (prior.version, new.version) else {
            return None;
        };
        if prior_version < new_version {
            return None;
        }

        // Whole-record changes overlap everything.
        let field = match (prior.changed_fields(), new.changed_fields()) {
            (Some(ours), Some(theirs)) => Some(ours.intersection(&theirs).next()?.clone()),
            _ => None,
        };

        let kind = if prior_version == new_version {
            ConflictType::ConcurrentUpdate
        } else {
            ConflictType::StaleVersion
        };
        Some(conflict(new, prior, field, kind))
    }
}

fn conflict(
    new: &SyncEvent,
    prior: &SyncEvent,
    field: Option<String>,
    kind: ConflictType,
) -> Conflict {
    Conflict {
        id: Uuid::new_v4().to_string(),
        table: new.table,
        record_id: new.record_id.clone(),
        field,
        conflict_type: kind,
        timestamp: Utc::now(),
        event_id: new.id.clone(),
        prior_event_id: prior.id.clone(),
    }
}
