//! Bounded visit history, newest first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use town_core::Position;

use crate::TownId;

/// Number of visit records a town keeps.
pub const MAX_VISIT_HISTORY: usize = 50;

/// One batch of visitors arriving from another settlement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitRecord {
    pub timestamp: DateTime<Utc>,
    pub origin: TownId,
    pub count: u32,
    pub origin_position: Position,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisitHistory {
    records: VecDeque<VisitRecord>,
}

impl VisitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a record, dropping the oldest past [`MAX_VISIT_HISTORY`].
    pub fn record(&mut self, record: VisitRecord) {
        self.records.push_front(record);
        self.records.truncate(MAX_VISIT_HISTORY);
    }

    /// Rebuild from records already ordered newest first.
    pub fn from_newest_first(records: impl IntoIterator<Item = VisitRecord>) -> Self {
        let mut records: VecDeque<VisitRecord> = records.into_iter().collect();
        records.truncate(MAX_VISIT_HISTORY);
        Self { records }
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisitRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&VisitRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn keeps_newest_fifty() {
        let t0 = DateTime::<Utc>::from_timestamp_millis(0).unwrap();
        let mut h = VisitHistory::new();
        for i in 0..60u32 {
            h.record(VisitRecord {
                timestamp: t0 + Duration::minutes(i as i64),
                origin: TownId(i as u64),
                count: 1,
                origin_position: Position::default(),
            });
        }
        assert_eq!(h.len(), MAX_VISIT_HISTORY);
        assert_eq!(h.latest().unwrap().origin, TownId(59));
        let origins: Vec<u64> = h.iter().map(|r| r.origin.0).collect();
        let expected: Vec<u64> = (10..60).rev().collect();
        assert_eq!(origins, expected);
    }
}
