use std::collections::HashSet;

use common::SpecType;
use tracing::debug;

use crate::models::{NormalizedContributor, NormalizedPullRequest};
use crate::payloads::{ContributorPayload, PullPayload};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("pull request #{number} has no created_at")]
    MissingCreatedAt { number: i64 },
}

pub fn normalize_pull(
    payload: &PullPayload,
    spec_type: SpecType,
    repo_full_name: &str,
) -> Result<NormalizedPullRequest, NormalizeError> {
    let created_at = payload.created_at.ok_or(NormalizeError::MissingCreatedAt {
        number: payload.number,
    })?;
    let mut seen = HashSet::new();
    let raw_labels = payload
        .labels
        .iter()
        .filter(|label| seen.insert(label.name.as_str()))
        .map(|label| label.name.clone())
        .collect();
    Ok(NormalizedPullRequest {
        id: payload.id,
        number: payload.number,
        spec_type,
        repo_full_name: repo_full_name.to_string(),
        title: payload.title.clone(),
        author: payload.user.as_ref().map(|user| user.login.clone()),
        html_url: payload.html_url.clone(),
        created_at,
        updated_at: payload.updated_at,
        closed_at: payload.closed_at,
        merged_at: payload.merged_at,
        raw_labels,
    })
}

pub fn normalize_contributor(
    payload: &ContributorPayload,
    spec_type: SpecType,
) -> NormalizedContributor {
    NormalizedContributor {
        spec_type,
        id: payload.id,
        login: payload.login.clone(),
        html_url: payload.html_url.clone(),
        avatar_url: payload.avatar_url.clone(),
        contributions: payload.contributions,
        account_type: payload.account_type.clone(),
    }
}

/// Keeps the first occurrence of every pull request id.
pub fn dedupe_by_id(pulls: Vec<NormalizedPullRequest>) -> Vec<NormalizedPullRequest> {
    let before = pulls.len();
    let mut seen = HashSet::new();
    let unique: Vec<_> = pulls.into_iter().filter(|pr| seen.insert(pr.id)).collect();
    if unique.len() != before {
        debug!(dropped = before - unique.len(), "removed duplicate pull requests");
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn payload(value: serde_json::Value) -> PullPayload {
        serde_json::from_value(value).unwrap()
    }

    fn pull_json(id: i64, created_at: Option<&str>) -> serde_json::Value {
        json!({
            "id": id,
            "number": id + 1000,
            "title": "Update EIP-1559: Fix typo",
            "state": "closed",
            "html_url": format!("https://github.com/ethereum/EIPs/pull/{}", id + 1000),
            "user": {"id": 7, "login": "alice"},
            "labels": [{"name": "c-update"}, {"name": "e-review"}, {"name": "c-update"}],
            "created_at": created_at,
            "updated_at": "2024-02-02T00:00:00Z",
            "closed_at": "2024-02-01T10:00:00Z",
            "merged_at": "2024-02-01T10:00:00Z"
        })
    }

    #[test]
    fn pull_normalization_keeps_timestamps_and_labels() {
        let raw = payload(pull_json(1, Some("2024-01-20T08:30:00Z")));
        let pr = normalize_pull(&raw, SpecType::Eip, "ethereum/EIPs").unwrap();
        assert_eq!(pr.number, 1001);
        assert_eq!(pr.author.as_deref(), Some("alice"));
        assert_eq!(pr.raw_labels, vec!["c-update".to_string(), "e-review".to_string()]);
        assert_eq!(
            pr.created_at,
            Utc.with_ymd_and_hms(2024, 1, 20, 8, 30, 0).unwrap()
        );
        assert_eq!(pr.merged_at, pr.closed_at);
        assert_eq!(pr.repo_full_name, "ethereum/EIPs");
    }

    #[test]
    fn missing_created_at_is_rejected() {
        let raw = payload(pull_json(2, None));
        let err = normalize_pull(&raw, SpecType::Eip, "ethereum/EIPs").unwrap_err();
        assert_eq!(err, NormalizeError::MissingCreatedAt { number: 1002 });
    }

    #[test]
    fn labels_and_user_are_optional() {
        let raw = payload(json!({
            "id": 3,
            "number": 3,
            "title": "Add RIP-7212",
            "state": "open",
            "html_url": "https://github.com/ethereum/RIPs/pull/3",
            "user": null,
            "created_at": "2024-03-01T00:00:00Z"
        }));
        let pr = normalize_pull(&raw, SpecType::Rip, "ethereum/RIPs").unwrap();
        assert!(pr.raw_labels.is_empty());
        assert!(pr.author.is_none());
        assert!(pr.closed_at.is_none());
    }

    #[test]
    fn contributor_type_defaults_to_user() {
        let raw: ContributorPayload = serde_json::from_value(json!({
            "id": 9,
            "login": "bob",
            "html_url": "https://github.com/bob",
            "avatar_url": null,
            "contributions": 12
        }))
        .unwrap();
        let contributor = normalize_contributor(&raw, SpecType::Erc);
        assert_eq!(contributor.account_type, "User");
        assert_eq!(contributor.contributions, 12);
        assert_eq!(contributor.spec_type, SpecType::Erc);
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let first = normalize_pull(
            &payload(pull_json(5, Some("2024-01-01T00:00:00Z"))),
            SpecType::Eip,
            "ethereum/EIPs",
        )
        .unwrap();
        let mut second = first.clone();
        second.title = "later page".into();
        let other = normalize_pull(
            &payload(pull_json(6, Some("2024-01-02T00:00:00Z"))),
            SpecType::Eip,
            "ethereum/EIPs",
        )
        .unwrap();

        let unique = dedupe_by_id(vec![first.clone(), second, other]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].title, first.title);
    }
}
