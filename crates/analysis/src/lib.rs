//! Label classification and monthly aggregation for specification pull
//! requests. Everything here is synchronous and free of I/O.

pub mod aggregate;
pub mod labels;
pub mod month;
pub mod snapshot;

pub use aggregate::{
    aggregate_combined, aggregate_event_counts, aggregate_hybrid, aggregate_label_counts,
    ActivityType, BucketOrder, LabelField, MonthlyBucket,
};
pub use labels::{classify, classify_custom, classify_refined, Classification};
pub use month::MonthKey;
pub use snapshot::summarize;
