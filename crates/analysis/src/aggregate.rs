//! Monthly bucket aggregation over stored pull request rows.
//!
//! All aggregators are pure and deterministic: the same input always yields
//! the same buckets in the same order, and empty input yields no buckets.
//! Months are UTC calendar months (see [`MonthKey`]).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use common::{Category, SpecType};
use db::PullRequestRow;
use serde::{Deserialize, Serialize};

use crate::month::MonthKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub month_year: String,
    pub category: Category,
    pub key: String,
    pub count: i64,
}

/// Activity series, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActivityType {
    Created,
    Merged,
    Closed,
    Open,
}

impl ActivityType {
    pub const ALL: [ActivityType; 4] = [
        ActivityType::Created,
        ActivityType::Merged,
        ActivityType::Closed,
        ActivityType::Open,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Created => "Created",
            ActivityType::Merged => "Merged",
            ActivityType::Closed => "Closed",
            ActivityType::Open => "Open",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelField {
    Refined,
    Custom,
    Raw,
}

impl LabelField {
    fn labels(self, row: &PullRequestRow) -> &[String] {
        match self {
            LabelField::Refined => &row.refined_labels,
            LabelField::Custom => &row.custom_labels,
            LabelField::Raw => &row.raw_labels,
        }
    }
}

impl std::str::FromStr for LabelField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "refined" => Ok(LabelField::Refined),
            "custom" => Ok(LabelField::Custom),
            "raw" => Ok(LabelField::Raw),
            other => Err(format!("unknown label field: {other}")),
        }
    }
}

/// How a bucket sequence is ordered within a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOrder {
    /// Fixed `Created, Merged, Closed, Open` order.
    Activity,
    /// Count descending, ties by key ascending.
    CountDesc,
}

impl BucketOrder {
    fn compare(self, a: &MonthlyBucket, b: &MonthlyBucket) -> Ordering {
        let by_month = b.month_year.cmp(&a.month_year);
        let within = match self {
            BucketOrder::Activity => activity_rank(&a.key)
                .cmp(&activity_rank(&b.key))
                .then_with(|| a.key.cmp(&b.key)),
            BucketOrder::CountDesc => b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)),
        };
        by_month.then(within)
    }

    pub fn sort(self, buckets: &mut [MonthlyBucket]) {
        buckets.sort_by(|a, b| self.compare(a, b));
    }
}

fn activity_rank(key: &str) -> usize {
    ActivityType::from_key(key).map_or(usize::MAX, |kind| kind as usize)
}

#[derive(Default, Clone, Copy)]
struct ActivityCounts {
    created: i64,
    merged: i64,
    closed: i64,
    open: i64,
}

impl ActivityCounts {
    fn get(&self, kind: ActivityType) -> i64 {
        match kind {
            ActivityType::Created => self.created,
            ActivityType::Merged => self.merged,
            ActivityType::Closed => self.closed,
            ActivityType::Open => self.open,
        }
    }
}

fn activity_buckets(
    months: BTreeMap<MonthKey, ActivityCounts>,
    category: Category,
) -> Vec<MonthlyBucket> {
    months
        .into_iter()
        .rev()
        .flat_map(|(month, counts)| {
            ActivityType::ALL.into_iter().map(move |kind| MonthlyBucket {
                month_year: month.to_string(),
                category,
                key: kind.as_str().to_string(),
                count: counts.get(kind),
            })
        })
        .collect()
}

/// Event-count activity: each record adds to `Created` in its creation month
/// and to `Merged` (or `Closed`, when never merged) in its resolution month.
/// `Open` is `max(0, created - merged - closed)` within each month and is not
/// carried across months.
pub fn aggregate_event_counts(records: &[PullRequestRow], spec_type: SpecType) -> Vec<MonthlyBucket> {
    let mut months: BTreeMap<MonthKey, ActivityCounts> = BTreeMap::new();
    for row in records {
        months.entry(MonthKey::of(row.created_at)).or_default().created += 1;
        if let Some(merged_at) = row.merged_at {
            months.entry(MonthKey::of(merged_at)).or_default().merged += 1;
        } else if let Some(closed_at) = row.closed_at {
            months.entry(MonthKey::of(closed_at)).or_default().closed += 1;
        }
    }
    for counts in months.values_mut() {
        counts.open = (counts.created - counts.merged - counts.closed).max(0);
    }
    activity_buckets(months, spec_type.category())
}

fn resolved_at(row: &PullRequestRow) -> Option<DateTime<Utc>> {
    match (row.merged_at, row.closed_at) {
        (Some(merged), Some(closed)) => Some(merged.min(closed)),
        (merged, closed) => merged.or(closed),
    }
}

/// Hybrid activity: per-month `Created`, `Merged` and `Closed` (closed
/// without merge) plus a cumulative `Open`, the number of records created by
/// the end of the month and not yet merged or closed at that point.
///
/// Months are the union of creation, merge and close months. Every month
/// rescans all records, so the cost is O(months × records).
pub fn aggregate_hybrid(records: &[PullRequestRow], spec_type: SpecType) -> Vec<MonthlyBucket> {
    let mut keys: BTreeSet<MonthKey> = BTreeSet::new();
    for row in records {
        keys.insert(MonthKey::of(row.created_at));
        if let Some(merged_at) = row.merged_at {
            keys.insert(MonthKey::of(merged_at));
        }
        if let Some(closed_at) = row.closed_at {
            keys.insert(MonthKey::of(closed_at));
        }
    }

    let mut months = BTreeMap::new();
    for month in keys {
        let next_start = month.next_start();
        let mut counts = ActivityCounts::default();
        for row in records {
            if month.contains(row.created_at) {
                counts.created += 1;
            }
            match (row.merged_at, row.closed_at) {
                (Some(merged_at), _) if month.contains(merged_at) => counts.merged += 1,
                (None, Some(closed_at)) if month.contains(closed_at) => counts.closed += 1,
                _ => {}
            }
            let still_open = resolved_at(row).map_or(true, |at| at >= next_start);
            if row.created_at < next_start && still_open {
                counts.open += 1;
            }
        }
        months.insert(month, counts);
    }
    activity_buckets(months, spec_type.category())
}

/// Per-month label histogram keyed by creation month. A record adds one to
/// every distinct label it carries; zero counts are never emitted.
pub fn aggregate_label_counts(
    records: &[PullRequestRow],
    field: LabelField,
    spec_type: SpecType,
) -> Vec<MonthlyBucket> {
    let mut counts: BTreeMap<(MonthKey, &str), i64> = BTreeMap::new();
    for row in records {
        let month = MonthKey::of(row.created_at);
        let mut seen = HashSet::new();
        for label in field.labels(row) {
            if seen.insert(label.as_str()) {
                *counts.entry((month, label.as_str())).or_default() += 1;
            }
        }
    }

    let category = spec_type.category();
    let mut buckets: Vec<MonthlyBucket> = counts
        .into_iter()
        .map(|((month, label), count)| MonthlyBucket {
            month_year: month.to_string(),
            category,
            key: label.to_string(),
            count,
        })
        .collect();
    BucketOrder::CountDesc.sort(&mut buckets);
    buckets
}

/// Sums per-spec bucket sequences into the `all` category, keyed by
/// `(month_year, key)`. Missing keys count as zero.
///
/// Hybrid inputs only have buckets for months with events, so a spec type
/// with no activity in a month adds nothing to that month's combined `Open`,
/// even when it still has a backlog.
pub fn aggregate_combined(inputs: &[&[MonthlyBucket]], order: BucketOrder) -> Vec<MonthlyBucket> {
    let mut totals: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    for bucket in inputs.iter().flat_map(|input| input.iter()) {
        *totals
            .entry((bucket.month_year.as_str(), bucket.key.as_str()))
            .or_default() += bucket.count;
    }

    let mut combined: Vec<MonthlyBucket> = totals
        .into_iter()
        .map(|((month_year, key), count)| MonthlyBucket {
            month_year: month_year.to_string(),
            category: Category::All,
            key: key.to_string(),
            count,
        })
        .collect();
    order.sort(&mut combined);
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use db::PrState;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn row(
        id: i64,
        created_at: DateTime<Utc>,
        merged_at: Option<DateTime<Utc>>,
        closed_at: Option<DateTime<Utc>>,
    ) -> PullRequestRow {
        PullRequestRow {
            id,
            number: id,
            spec_type: SpecType::Eip,
            repo_full_name: "ethereum/EIPs".into(),
            title: format!("PR {id}"),
            author: None,
            html_url: String::new(),
            state: PrState::derive(closed_at, merged_at),
            created_at,
            updated_at: None,
            closed_at,
            merged_at,
            raw_labels: vec![],
            refined_labels: vec![],
            custom_labels: vec![],
        }
    }

    fn counts(buckets: &[MonthlyBucket], month: &str) -> Vec<(String, i64)> {
        buckets
            .iter()
            .filter(|b| b.month_year == month)
            .map(|b| (b.key.clone(), b.count))
            .collect()
    }

    fn pairs(values: &[(&str, i64)]) -> Vec<(String, i64)> {
        values.iter().map(|(k, c)| (k.to_string(), *c)).collect()
    }

    fn sample() -> Vec<PullRequestRow> {
        vec![
            row(1, at(2024, 1, 5), None, None),
            row(2, at(2024, 1, 20), Some(at(2024, 2, 1)), Some(at(2024, 2, 1))),
            row(3, at(2024, 2, 10), None, Some(at(2024, 2, 15))),
        ]
    }

    #[test]
    fn hybrid_matches_worked_example() {
        let buckets = aggregate_hybrid(&sample(), SpecType::Eip);
        assert_eq!(
            counts(&buckets, "2024-01"),
            pairs(&[("Created", 2), ("Merged", 0), ("Closed", 0), ("Open", 2)])
        );
        assert_eq!(
            counts(&buckets, "2024-02"),
            pairs(&[("Created", 1), ("Merged", 1), ("Closed", 1), ("Open", 1)])
        );
        assert_eq!(buckets[0].month_year, "2024-02");
        assert!(buckets.iter().all(|b| b.category == Category::Eips));
    }

    #[test]
    fn hybrid_open_is_carried_into_months_without_creations() {
        let rows = vec![
            row(1, at(2024, 1, 5), None, None),
            row(2, at(2024, 1, 6), None, Some(at(2024, 3, 2))),
        ];
        let buckets = aggregate_hybrid(&rows, SpecType::Eip);
        assert_eq!(
            counts(&buckets, "2024-03"),
            pairs(&[("Created", 0), ("Merged", 0), ("Closed", 1), ("Open", 1)])
        );
        // February has no events, so it is not a bucket month.
        assert!(counts(&buckets, "2024-02").is_empty());
    }

    #[test]
    fn hybrid_open_drains_to_zero_once_everything_resolves() {
        let rows = vec![
            row(1, at(2024, 1, 3), None, Some(at(2024, 2, 10))),
            row(2, at(2024, 1, 9), Some(at(2024, 3, 4)), Some(at(2024, 3, 4))),
            row(3, at(2024, 1, 20), None, Some(at(2024, 3, 28))),
            row(4, at(2024, 2, 1), Some(at(2024, 4, 15)), None),
        ];
        let buckets = aggregate_hybrid(&rows, SpecType::Eip);
        let mut open: Vec<(String, i64)> = buckets
            .iter()
            .filter(|b| b.key == "Open")
            .map(|b| (b.month_year.clone(), b.count))
            .collect();
        open.reverse();
        assert_eq!(
            open,
            vec![
                ("2024-01".to_string(), 3),
                ("2024-02".to_string(), 3),
                ("2024-03".to_string(), 1),
                ("2024-04".to_string(), 0),
            ]
        );
        // No creations after February, so the backlog never grows again.
        assert!(open[1..].windows(2).all(|w| w[1].1 <= w[0].1));
        assert!(open.iter().all(|(_, count)| *count >= 0));
    }

    #[test]
    fn merge_takes_precedence_over_close() {
        let rows = vec![row(1, at(2024, 5, 1), Some(at(2024, 5, 9)), Some(at(2024, 5, 9)))];
        for buckets in [
            aggregate_hybrid(&rows, SpecType::Eip),
            aggregate_event_counts(&rows, SpecType::Eip),
        ] {
            let may = counts(&buckets, "2024-05");
            assert!(may.contains(&("Merged".to_string(), 1)));
            assert!(may.contains(&("Closed".to_string(), 0)));
        }
    }

    #[test]
    fn event_counts_open_is_per_month() {
        let buckets = aggregate_event_counts(&sample(), SpecType::Eip);
        assert_eq!(
            counts(&buckets, "2024-01"),
            pairs(&[("Created", 2), ("Merged", 0), ("Closed", 0), ("Open", 2)])
        );
        assert_eq!(
            counts(&buckets, "2024-02"),
            pairs(&[("Created", 1), ("Merged", 1), ("Closed", 1), ("Open", 0)])
        );
        assert_eq!(buckets.len(), 8);
    }

    #[test]
    fn aggregators_are_deterministic() {
        let rows = sample();
        assert_eq!(
            aggregate_event_counts(&rows, SpecType::Eip),
            aggregate_event_counts(&rows, SpecType::Eip)
        );
        assert_eq!(
            aggregate_hybrid(&rows, SpecType::Eip),
            aggregate_hybrid(&rows, SpecType::Eip)
        );
    }

    #[test]
    fn empty_input_yields_no_buckets() {
        assert!(aggregate_event_counts(&[], SpecType::Rip).is_empty());
        assert!(aggregate_hybrid(&[], SpecType::Rip).is_empty());
        assert!(aggregate_label_counts(&[], LabelField::Custom, SpecType::Rip).is_empty());
        assert!(aggregate_combined(&[], BucketOrder::Activity).is_empty());
    }

    #[test]
    fn label_counts_are_sparse_and_sorted() {
        let mut rows = sample();
        rows[0].custom_labels = vec!["Misc".into()];
        rows[1].custom_labels = vec!["Typo Fix".into(), "Update".into(), "Typo Fix".into()];
        rows[2].custom_labels = vec!["Update".into()];
        rows.push(row(4, at(2024, 2, 11), None, None));
        rows[3].custom_labels = vec!["Update".into()];

        let buckets = aggregate_label_counts(&rows, LabelField::Custom, SpecType::Erc);
        let keys: Vec<(&str, &str, i64)> = buckets
            .iter()
            .map(|b| (b.month_year.as_str(), b.key.as_str(), b.count))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-02", "Update", 2),
                ("2024-01", "Misc", 1),
                ("2024-01", "Typo Fix", 1),
                ("2024-01", "Update", 1),
            ]
        );
        assert!(buckets.iter().all(|b| b.category == Category::Ercs));
    }

    #[test]
    fn combined_sums_across_spec_types() {
        let eip = aggregate_hybrid(&sample(), SpecType::Eip);
        let erc = aggregate_hybrid(&[row(9, at(2024, 2, 3), None, None)], SpecType::Erc);
        let rip: Vec<MonthlyBucket> = Vec::new();

        let combined = aggregate_combined(&[&eip, &erc, &rip], BucketOrder::Activity);
        assert_eq!(
            counts(&combined, "2024-02"),
            pairs(&[("Created", 2), ("Merged", 1), ("Closed", 1), ("Open", 2)])
        );
        assert_eq!(
            counts(&combined, "2024-01"),
            pairs(&[("Created", 2), ("Merged", 0), ("Closed", 0), ("Open", 2)])
        );
        assert!(combined.iter().all(|b| b.category == Category::All));

        let swapped = aggregate_combined(&[&rip, &erc, &eip], BucketOrder::Activity);
        assert_eq!(combined, swapped);
    }

    #[test]
    fn bucket_serializes_with_lowercase_category() {
        let bucket = MonthlyBucket {
            month_year: "2024-01".into(),
            category: Category::All,
            key: "Open".into(),
            count: 3,
        };
        let value = serde_json::to_value(&bucket).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"month_year": "2024-01", "category": "all", "key": "Open", "count": 3})
        );
    }

    #[test]
    fn combined_label_order_is_count_desc() {
        let bucket = |key: &str, count| MonthlyBucket {
            month_year: "2024-04".into(),
            category: Category::Eips,
            key: key.into(),
            count,
        };
        let a = vec![bucket("Draft", 1), bucket("Final", 2)];
        let b = vec![bucket("Draft", 4)];
        let combined = aggregate_combined(&[&a, &b], BucketOrder::CountDesc);
        let keys: Vec<(&str, i64)> = combined.iter().map(|b| (b.key.as_str(), b.count)).collect();
        assert_eq!(keys, vec![("Draft", 5), ("Final", 2)]);
    }
}
