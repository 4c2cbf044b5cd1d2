use chrono::{DateTime, Utc};
use common::SpecType;
use db::{PrState, PullRequestRow, SnapshotRow};

/// Point-in-time totals for one spec type.
pub fn summarize(
    records: &[PullRequestRow],
    contributors: usize,
    spec_type: SpecType,
    taken_at: DateTime<Utc>,
) -> SnapshotRow {
    let mut snapshot = SnapshotRow {
        spec_type,
        taken_at,
        total: records.len() as i64,
        open: 0,
        merged: 0,
        closed: 0,
        contributors: contributors as i64,
    };
    for row in records {
        if row.merged_at.is_some() {
            snapshot.merged += 1;
        } else if row.closed_at.is_some() || row.state == PrState::Closed {
            snapshot.closed += 1;
        } else {
            snapshot.open += 1;
        }
    }
    snapshot
}
