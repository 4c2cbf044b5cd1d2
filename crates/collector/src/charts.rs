//! Turns per-spec pull request rows into the stored chart documents.

use analysis::{
    aggregate_combined, aggregate_hybrid, aggregate_label_counts, BucketOrder, LabelField,
    MonthlyBucket,
};
use chrono::{DateTime, Utc};
use common::SpecType;
use db::{ChartKind, ChartRow, PullRequestRow};
use uuid::Uuid;

fn label_field(kind: ChartKind) -> Option<LabelField> {
    match kind {
        ChartKind::Activity => None,
        ChartKind::RefinedLabels => Some(LabelField::Refined),
        ChartKind::CustomLabels => Some(LabelField::Custom),
        ChartKind::RawLabels => Some(LabelField::Raw),
    }
}

/// Buckets for one chart kind: every spec type, followed by the combined
/// `all` category.
pub fn buckets_for_kind(
    kind: ChartKind,
    records: &[(SpecType, Vec<PullRequestRow>)],
) -> Vec<MonthlyBucket> {
    let (per_spec, order): (Vec<Vec<MonthlyBucket>>, BucketOrder) = match label_field(kind) {
        None => (
            records
                .iter()
                .map(|(spec, rows)| aggregate_hybrid(rows, *spec))
                .collect(),
            BucketOrder::Activity,
        ),
        Some(field) => (
            records
                .iter()
                .map(|(spec, rows)| aggregate_label_counts(rows, field, *spec))
                .collect(),
            BucketOrder::CountDesc,
        ),
    };
    let slices: Vec<&[MonthlyBucket]> = per_spec.iter().map(Vec::as_slice).collect();
    let combined = aggregate_combined(&slices, order);
    per_spec.into_iter().flatten().chain(combined).collect()
}

/// Chart rows with a fresh synthetic id. `rank` keeps the aggregator order
/// within each category.
pub fn to_chart_rows(
    kind: ChartKind,
    buckets: Vec<MonthlyBucket>,
    generated_at: DateTime<Utc>,
) -> Vec<ChartRow> {
    let mut rank_by_category = std::collections::HashMap::new();
    buckets
        .into_iter()
        .map(|bucket| {
            let rank = rank_by_category.entry(bucket.category).or_insert(0i32);
            let row = ChartRow {
                id: Uuid::new_v4(),
                rank: *rank,
                kind,
                category: bucket.category,
                month_year: bucket.month_year,
                key: bucket.key,
                count: bucket.count,
                generated_at,
            };
            *rank += 1;
            row
        })
        .collect()
}
