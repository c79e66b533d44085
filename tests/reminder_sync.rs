//! Reminder endpoints and reconciliation over HTTP.

use std::sync::Arc;

use healthcrm::client::{ApiClient, LogEvents};
use healthcrm::config::ClientConfig;
use healthcrm::models::reminder::{Relation, Reminder};
use healthcrm::models::session::{Credentials, Session};
use healthcrm::reminders::{HttpRemindersApi, ReminderReconciler, RemindersApi, SyncPhase};
use healthcrm::store::MemorySessionStore;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(server: &MockServer) -> HttpRemindersApi {
    let session = Session {
        credentials: Some(Credentials::new("acc", "ref")),
        tenant_id: Some("clinic-9".into()),
        ..Default::default()
    };
    let client = ApiClient::new(
        ClientConfig::new(server.uri()),
        Arc::new(MemorySessionStore::with_session(session)),
        Arc::new(LogEvents),
    )
    .unwrap();
    HttpRemindersApi::new(Arc::new(client))
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

fn wire(id: &str, title: &str, date: &str) -> Value {
    json!({
        "id": id,
        "relationId": "5",
        "relationType": "customer",
        "title": title,
        "note": null,
        "reminderDate": date,
        "reminderTime": "09:00",
        "isCompleted": false
    })
}

fn reminder(id: Option<&str>, title: &str, date: &str) -> Reminder {
    Reminder {
        id: id.map(str::to_string),
        title: title.into(),
        date: date.into(),
        time: "09:00".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_list_queries_by_relation_with_tenant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/reminders"))
        .and(query_param("relationId", "5"))
        .and(query_param("relationType", "customer"))
        .and(header("x-tenant-id", "clinic-9"))
        .respond_with(ok(json!({ "items": [wire("r1", "A", "2026-10-20")], "total": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let items = assert_ok!(api(&server).list(&Relation::customer("5")).await);

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id.as_deref(), Some("r1"));
    assert_eq!(items[0].date, "2026-10-20");
}

#[tokio::test]
async fn test_set_completed_patches_flag() {
    let server = MockServer::start().await;
    let mut done = wire("r1", "A", "2026-10-20");
    done["isCompleted"] = json!(true);
    Mock::given(method("PATCH"))
        .and(path("/v1/health/reminders/r1"))
        .and(body_json(json!({ "isCompleted": true })))
        .respond_with(ok(done))
        .expect(1)
        .mount(&server)
        .await;

    let updated = assert_ok!(api(&server).set_completed("r1", true).await);
    assert!(updated.is_completed);
}

#[tokio::test]
async fn test_sync_applies_delete_update_create_and_refetches() {
    let server = MockServer::start().await;

    // current state, served once; afterwards the converged list
    Mock::given(method("GET"))
        .and(path("/v1/health/reminders"))
        .respond_with(ok(json!([
            wire("r1", "A", "2026-10-20"),
            wire("r2", "B", "2026-10-21")
        ])))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/health/reminders"))
        .respond_with(ok(json!([
            wire("r1", "A2", "2026-10-22"),
            wire("r3", "C", "2026-10-25")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v1/health/reminders/r2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/health/reminders/r1"))
        .and(body_partial_json(json!({
            "title": "A2",
            "reminderDate": "2026-10-22",
            "relationId": "5",
            "relationType": "customer"
        })))
        .respond_with(ok(wire("r1", "A2", "2026-10-22")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/health/reminders"))
        .and(body_partial_json(json!({
            "title": "C",
            "reminderDate": "2026-10-25",
            "relationId": "5",
            "relationType": "customer"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": wire("r3", "C", "2026-10-25")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = ReminderReconciler::new(api(&server));
    let desired = vec![
        reminder(Some("r1"), "A2", "2026-10-22"),
        reminder(Some("temp-1"), "C", "2026-10-25"),
    ];
    let outcome = assert_ok!(reconciler.sync(&Relation::customer("5"), &desired).await);

    assert_eq!((outcome.deleted, outcome.updated, outcome.created), (1, 1, 1));
    let ids: Vec<_> = outcome.reminders.iter().filter_map(|r| r.id.as_deref()).collect();
    assert_eq!(ids, vec!["r1", "r3"]);

    // the created reminder never carries its temporary id to the server
    let requests = server.received_requests().await.unwrap();
    let create = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .expect("create request");
    let body: Value = serde_json::from_slice(&create.body).unwrap();
    assert!(body.get("id").is_none());

    // mutations run deletes, then updates, then creates
    let order: Vec<_> = requests
        .iter()
        .map(|r| r.method.as_str().to_string())
        .filter(|m| m != "GET")
        .collect();
    assert_eq!(order, vec!["DELETE", "PUT", "POST"]);
}

#[tokio::test]
async fn test_failed_create_reports_phase_and_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/reminders"))
        .respond_with(ok(json!([wire("r1", "A", "2026-10-20")])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/health/reminders/r1"))
        .respond_with(ok(wire("r1", "A", "2026-10-20")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/health/reminders"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "error": { "code": "VALIDATION_FAILED", "message": "title is required" }
        })))
        .mount(&server)
        .await;

    let reconciler = ReminderReconciler::new(api(&server));
    let desired = vec![
        reminder(Some("r1"), "A", "2026-10-20"),
        reminder(None, "", "2026-10-30"),
    ];
    let err = assert_err!(reconciler.sync(&Relation::customer("5"), &desired).await);

    assert_eq!(err.phase, SyncPhase::Create);
    assert_eq!(err.applied, 1);
    assert_eq!(err.source.normalized().message, "title is required");
}
