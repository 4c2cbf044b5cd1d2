pub mod models;
pub mod payloads;
pub mod transform;

pub use models::{NormalizedContributor, NormalizedPullRequest};
pub use payloads::{ContributorPayload, LabelRef, PullPayload, UserRef};
pub use transform::{dedupe_by_id, normalize_contributor, normalize_pull, NormalizeError};
