//! Visited-location ledger
//!
//! Append-only, insertion order is visiting order. Readers get a copy so an
//! append racing with a scan never disturbs the scan's view.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinate;

/// A location a user was observed at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitedLocation {
    pub user_id: Uuid,
    pub location: Coordinate,
    pub time_visited: DateTime<Utc>,
}

impl VisitedLocation {
    pub fn new(user_id: Uuid, location: Coordinate, time_visited: DateTime<Utc>) -> Self {
        Self {
            user_id,
            location,
            time_visited,
        }
    }
}

#[derive(Debug, Default)]
pub struct LocationLedger {
    entries: RwLock<Vec<VisitedLocation>>,
}

impl LocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, location: VisitedLocation) {
        self.entries.write().push(location);
    }

    pub fn last_location(&self) -> Option<VisitedLocation> {
        self.entries.read().last().cloned()
    }

    /// Snapshot of every entry in insertion order
    pub fn all(&self) -> Vec<VisitedLocation> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(user_id: Uuid, lat: f64) -> VisitedLocation {
        VisitedLocation::new(user_id, Coordinate::new(lat, 0.0), Utc::now())
    }

    #[test]
    fn test_empty_ledger_has_no_last_location() {
        let ledger = LocationLedger::new();
        assert!(ledger.last_location().is_none());
        assert!(ledger.all().is_empty());
    }

    #[test]
    fn test_keeps_insertion_order() {
        let user = Uuid::new_v4();
        let ledger = LocationLedger::new();
        for lat in [3.0, 1.0, 2.0] {
            ledger.append(visit(user, lat));
        }

        let lats: Vec<f64> = ledger.all().iter().map(|v| v.location.latitude).collect();
        assert_eq!(lats, vec![3.0, 1.0, 2.0]);
        assert_eq!(ledger.last_location().unwrap().location.latitude, 2.0);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_appends() {
        let user = Uuid::new_v4();
        let ledger = LocationLedger::new();
        ledger.append(visit(user, 1.0));

        let snapshot = ledger.all();
        ledger.append(visit(user, 2.0));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(ledger.len(), 2);
    }
}
