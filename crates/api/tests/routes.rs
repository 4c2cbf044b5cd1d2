use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use common::{Category, SpecType};
use db::{
    ChartKind, ChartRow, ContributorRow, MemoryDatabase, PrState, PullRequestRow, Repositories,
    SnapshotRow,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use api::{build_router, ApiState};

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn pr(id: i64, spec_type: SpecType, created_at: DateTime<Utc>, refined: &[&str]) -> PullRequestRow {
    PullRequestRow {
        id,
        number: id,
        spec_type,
        repo_full_name: "ethereum/EIPs".into(),
        title: format!("PR {id}"),
        author: Some("alice".into()),
        html_url: format!("https://github.com/ethereum/EIPs/pull/{id}"),
        state: PrState::Open,
        created_at,
        updated_at: None,
        closed_at: None,
        merged_at: None,
        raw_labels: vec![],
        refined_labels: refined.iter().map(|l| l.to_string()).collect(),
        custom_labels: vec![],
    }
}

async fn seeded() -> (Router, MemoryDatabase) {
    let db = MemoryDatabase::new();

    let mut merged = pr(1, SpecType::Eip, at(2024, 1, 10), &["Update"]);
    merged.state = PrState::Closed;
    merged.merged_at = Some(at(2024, 2, 5));
    merged.closed_at = Some(at(2024, 2, 5));
    let open = pr(2, SpecType::Eip, at(2024, 1, 20), &["Update", "Typo Fix"]);
    db.pull_requests()
        .replace_for_spec(SpecType::Eip, vec![merged, open])
        .await
        .unwrap();

    let mut closed = pr(3, SpecType::Erc, at(2024, 2, 3), &["Update"]);
    closed.state = PrState::Closed;
    closed.closed_at = Some(at(2024, 2, 10));
    db.pull_requests()
        .replace_for_spec(SpecType::Erc, vec![closed])
        .await
        .unwrap();

    let contributor = |id: i64, login: &str, contributions: i64| ContributorRow {
        spec_type: SpecType::Eip,
        id,
        login: login.into(),
        html_url: None,
        avatar_url: None,
        contributions,
        account_type: "User".into(),
    };
    db.contributors()
        .replace_for_spec(
            SpecType::Eip,
            vec![contributor(1, "bob", 4), contributor(2, "carol", 11)],
        )
        .await
        .unwrap();

    let state = Arc::new(ApiState {
        repositories: Arc::new(db.clone()),
        metrics_path: "/metrics",
    });
    (build_router(state), db)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let res = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn buckets(value: &Value) -> Vec<(String, String, i64)> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|b| {
            (
                b["month_year"].as_str().unwrap().to_string(),
                b["key"].as_str().unwrap().to_string(),
                b["count"].as_i64().unwrap(),
            )
        })
        .collect()
}

fn row(month: &str, key: &str, count: i64) -> (String, String, i64) {
    (month.to_string(), key.to_string(), count)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _) = seeded().await;
    let (status, body) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn pull_requests_are_filtered_by_spec_and_date() {
    let (app, _) = seeded().await;
    let (status, body) = get_json(app.clone(), "/pull-requests/eip").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(body[0]["spec_type"], "EIP");
    assert_eq!(body[1]["state"], "closed");

    let (_, body) = get_json(app, "/pull-requests/EIP?end=2024-01-10").await;
    let ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn invalid_inputs_are_bad_requests() {
    let (app, _) = seeded().await;
    for uri in [
        "/pull-requests/bip",
        "/pull-requests/eip?start=last-week",
        "/pull-requests/eip?start=2024-03-01&end=2024-02-01",
        "/stats/eip/activity?mode=weekly",
        "/stats/eip/labels?field=colour",
        "/charts/pie/all",
        "/charts/activity/bips",
    ] {
        let (status, body) = get_json(app.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn contributors_are_ordered_by_contributions() {
    let (app, _) = seeded().await;
    let (status, body) = get_json(app, "/contributors/eip?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    let logins: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["login"].as_str().unwrap())
        .collect();
    assert_eq!(logins, vec!["carol", "bob"]);
    assert_eq!(body[0]["type"], "User");
}

#[tokio::test]
async fn snapshot_is_not_found_until_stored() {
    let (app, db) = seeded().await;
    let (status, body) = get_json(app.clone(), "/snapshots/rip").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("RIP"));

    db.snapshots()
        .insert(SnapshotRow {
            spec_type: SpecType::Rip,
            taken_at: at(2024, 3, 1),
            total: 3,
            open: 1,
            merged: 1,
            closed: 1,
            contributors: 2,
        })
        .await
        .unwrap();
    let (status, body) = get_json(app, "/snapshots/rip").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["spec_type"], "RIP");
}

#[tokio::test]
async fn hybrid_activity_carries_open_backlog() {
    let (app, _) = seeded().await;
    let (status, body) = get_json(app, "/stats/eip/activity").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        buckets(&body),
        vec![
            row("2024-02", "Created", 0),
            row("2024-02", "Merged", 1),
            row("2024-02", "Closed", 0),
            row("2024-02", "Open", 1),
            row("2024-01", "Created", 2),
            row("2024-01", "Merged", 0),
            row("2024-01", "Closed", 0),
            row("2024-01", "Open", 2),
        ]
    );
    assert_eq!(body[0]["category"], "eips");
}

#[tokio::test]
async fn event_mode_does_not_carry_open() {
    let (app, _) = seeded().await;
    let (_, body) = get_json(app, "/stats/eip/activity?mode=event").await;
    let open: Vec<(String, String, i64)> = buckets(&body)
        .into_iter()
        .filter(|(_, key, _)| key == "Open")
        .collect();
    assert_eq!(
        open,
        vec![row("2024-02", "Open", 0), row("2024-01", "Open", 2)]
    );
}

#[tokio::test]
async fn all_scope_sums_every_spec_type() {
    let (app, _) = seeded().await;
    let (status, body) = get_json(app.clone(), "/stats/all/activity").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        buckets(&body)[..4],
        vec![
            row("2024-02", "Created", 1),
            row("2024-02", "Merged", 1),
            row("2024-02", "Closed", 1),
            row("2024-02", "Open", 1),
        ]
    );
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|b| b["category"] == "all"));

    let (_, body) = get_json(app, "/stats/all/labels?field=refined").await;
    assert_eq!(
        buckets(&body),
        vec![
            row("2024-02", "Update", 1),
            row("2024-01", "Update", 2),
            row("2024-01", "Typo Fix", 1),
        ]
    );
}

#[tokio::test]
async fn stats_respect_date_window() {
    let (app, _) = seeded().await;
    let (_, body) = get_json(app.clone(), "/stats/eip/activity?start=2024-01-15").await;
    assert_eq!(
        buckets(&body),
        vec![
            row("2024-01", "Created", 1),
            row("2024-01", "Merged", 0),
            row("2024-01", "Closed", 0),
            row("2024-01", "Open", 1),
        ]
    );

    let (_, body) = get_json(app, "/stats/eip/labels?start=2024-01-15T00:00:00Z").await;
    assert_eq!(
        buckets(&body),
        vec![row("2024-01", "Typo Fix", 1), row("2024-01", "Update", 1)]
    );
}

#[tokio::test]
async fn charts_are_served_in_rank_order() {
    let (app, db) = seeded().await;
    let chart = |rank: i32, kind: ChartKind, key: &str, count: i64| ChartRow {
        id: Uuid::new_v4(),
        rank,
        kind,
        category: Category::All,
        month_year: "2024-01".into(),
        key: key.into(),
        count,
        generated_at: at(2024, 3, 1),
    };
    db.charts()
        .replace_kind(
            ChartKind::Activity,
            vec![
                chart(1, ChartKind::Activity, "Merged", 0),
                chart(0, ChartKind::Activity, "Created", 2),
            ],
        )
        .await
        .unwrap();
    db.charts()
        .replace_kind(
            ChartKind::RefinedLabels,
            vec![chart(0, ChartKind::RefinedLabels, "Update", 2)],
        )
        .await
        .unwrap();

    let (status, body) = get_json(app.clone(), "/charts/activity/all").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["type"], "Created");
    assert_eq!(body[0]["monthYear"], "2024-01");
    assert_eq!(body[1]["type"], "Merged");

    let (_, body) = get_json(app.clone(), "/charts/refined-labels/all").await;
    assert_eq!(body[0]["label"], "Update");
    assert!(body[0].get("type").is_none());

    let (_, body) = get_json(app, "/charts/activity/eips").await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn metrics_expose_stored_counts() {
    let (app, _) = seeded().await;
    let res = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("db_pull_requests_total_by_spec{spec_type=\"EIP\"} 2"));
    assert!(text.contains("db_pull_requests_total_by_spec{spec_type=\"RIP\"} 0"));
}
