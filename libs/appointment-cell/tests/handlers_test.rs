use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::*;
use appointment_cell::models::*;
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::test_utils::{at, MockSupabaseResponses, TestConfig};

fn config_for(server: &MockServer) -> State<Arc<AppConfig>> {
    State(TestConfig::with_url(server.uri()).to_arc())
}

fn booking(start: &str, end: &str) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_id: 1,
        provider_id: 1,
        service_id: 1,
        start_datetime: at(start),
        end_datetime: at(end),
        room: Some("Room 2".to_string()),
        notes: None,
    }
}

async fn mount_reference(server: &MockServer, table: &str, key: &str, id: i64, found: bool) {
    let body = if found {
        MockSupabaseResponses::reference_row(key, id)
    } else {
        json!([])
    };

    Mock::given(method("GET"))
        .and(path(format!("/rest/v1/{}", table)))
        .and(query_param(key, format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_references(server: &MockServer) {
    mount_reference(server, "patients", "patient_id", 1, true).await;
    mount_reference(server, "providers", "provider_id", 1, true).await;
    mount_reference(server, "services", "service_id", 1, true).await;
}

async fn mount_overlapping(server: &MockServer, rows: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", "eq.1"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

fn expect_rejection(result: Result<Json<serde_json::Value>, AppError>) -> (String, serde_json::Map<String, serde_json::Value>) {
    match result {
        Err(AppError::Rejected { code, details, .. }) => (code, details),
        Err(other) => panic!("expected a rejection, got {:?}", other),
        Ok(Json(body)) => panic!("expected a rejection, got {}", body),
    }
}

#[tokio::test]
async fn test_create_appointment_success() {
    let server = MockServer::start().await;
    mount_references(&server).await;
    mount_overlapping(&server, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(10, 1, "2025-03-10 09:00", "2025-03-10 09:30", "scheduled")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let Json(body) = create_appointment(config_for(&server), Json(booking("2025-03-10 09:00", "2025-03-10 09:30")))
        .await
        .unwrap();

    assert_eq!(body["appointment_id"], 10);
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["start_datetime"], "2025-03-10T09:00:00");
}

#[tokio::test]
async fn test_create_appointment_overlap_rejected() {
    let server = MockServer::start().await;
    mount_references(&server).await;
    mount_overlapping(&server, json!([
        MockSupabaseResponses::appointment_response(7, 1, "2025-03-10 09:00", "2025-03-10 09:30", "scheduled")
    ])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let result = create_appointment(config_for(&server), Json(booking("2025-03-10 09:15", "2025-03-10 09:45"))).await;

    let (code, details) = expect_rejection(result);
    assert_eq!(code, "provider_conflict");
    assert_eq!(details["conflicting_appointment_id"], 7);
}

#[tokio::test]
async fn test_create_back_to_back_admitted() {
    let server = MockServer::start().await;
    mount_references(&server).await;
    // storage hands back the adjacent booking; it must not count as a conflict
    mount_overlapping(&server, json!([
        MockSupabaseResponses::appointment_response(7, 1, "2025-03-10 09:00", "2025-03-10 09:30", "scheduled")
    ])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(8, 1, "2025-03-10 09:30", "2025-03-10 10:00", "scheduled")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let result = create_appointment(config_for(&server), Json(booking("2025-03-10 09:30", "2025-03-10 10:00"))).await;
    assert_eq!(result.unwrap().0["appointment_id"], 8);
}

#[tokio::test]
async fn test_invalid_time_range_touches_no_storage() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let result = create_appointment(config_for(&server), Json(booking("2025-03-10 10:00", "2025-03-10 09:00"))).await;

    let (code, details) = expect_rejection(result);
    assert_eq!(code, "invalid_time_range");
    assert!(details.is_empty());
}

#[tokio::test]
async fn test_unknown_service_rejected() {
    let server = MockServer::start().await;
    mount_reference(&server, "patients", "patient_id", 1, true).await;
    mount_reference(&server, "providers", "provider_id", 1, true).await;
    mount_reference(&server, "services", "service_id", 1, false).await;

    let result = create_appointment(config_for(&server), Json(booking("2025-03-10 09:00", "2025-03-10 09:30"))).await;

    let (code, details) = expect_rejection(result);
    assert_eq!(code, "unknown_service");
    assert_eq!(details["service_id"], 1);
}

#[tokio::test]
async fn test_unknown_patient_checked_first() {
    let server = MockServer::start().await;
    mount_reference(&server, "patients", "patient_id", 1, false).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let result = create_appointment(config_for(&server), Json(booking("2025-03-10 09:00", "2025-03-10 09:30"))).await;

    let (code, _) = expect_rejection(result);
    assert_eq!(code, "unknown_patient");
}

#[tokio::test]
async fn test_lost_race_reported_as_provider_conflict() {
    let server = MockServer::start().await;
    mount_references(&server).await;

    // first check sees an empty calendar, the re-check sees the winner
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_overlapping(&server, json!([
        MockSupabaseResponses::appointment_response(31, 1, "2025-03-10 09:00", "2025-03-10 09:30", "scheduled")
    ])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("duplicate key value violates unique constraint \"uniq_provider_start\"", "23505")
        ))
        .expect(1)
        .mount(&server)
        .await;

    let result = create_appointment(config_for(&server), Json(booking("2025-03-10 09:00", "2025-03-10 09:30"))).await;

    let (code, details) = expect_rejection(result);
    assert_eq!(code, "provider_conflict");
    assert_eq!(details["conflicting_appointment_id"], 31);
}

#[tokio::test]
async fn test_patient_deleted_during_commit_is_unknown_patient() {
    let server = MockServer::start().await;

    // the patient exists for the first check and is gone for the re-check
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("patient_id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::reference_row("patient_id", 1)
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_reference(&server, "patients", "patient_id", 1, false).await;
    mount_reference(&server, "providers", "provider_id", 1, true).await;
    mount_reference(&server, "services", "service_id", 1, true).await;
    mount_overlapping(&server, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response(
                "insert or update on table \"appointments\" violates foreign key constraint",
                "23503",
            )
        ))
        .expect(1)
        .mount(&server)
        .await;

    let result = create_appointment(config_for(&server), Json(booking("2025-03-10 09:00", "2025-03-10 09:30"))).await;

    let (code, details) = expect_rejection(result);
    assert_eq!(code, "unknown_patient");
    assert_eq!(details["patient_id"], 1);
}

#[tokio::test]
async fn test_storage_failure_is_database_error() {
    let server = MockServer::start().await;
    mount_references(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(500).set_body_string("connection reset"))
        .mount(&server)
        .await;

    let result = create_appointment(config_for(&server), Json(booking("2025-03-10 09:00", "2025-03-10 09:30"))).await;
    assert!(matches!(result, Err(AppError::Database(_))));
}

#[tokio::test]
async fn test_update_excludes_the_appointment_itself() {
    let server = MockServer::start().await;
    mount_references(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_id", "eq.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(5, 1, "2025-03-10 09:00", "2025-03-10 09:30", "scheduled")
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_id", "neq.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut updated_row = MockSupabaseResponses::appointment_response(5, 1, "2025-03-10 09:00", "2025-03-10 09:30", "scheduled");
    updated_row["notes"] = json!("Bring previous x-rays");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_id", "eq.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([updated_row])))
        .expect(1)
        .mount(&server)
        .await;

    let request = UpdateAppointmentRequest {
        notes: Some("Bring previous x-rays".to_string()),
        ..Default::default()
    };

    let Json(body) = update_appointment(config_for(&server), Path(5), Json(request))
        .await
        .unwrap();

    assert_eq!(body["notes"], "Bring previous x-rays");
    assert_eq!(body["appointment_id"], 5);
}

#[tokio::test]
async fn test_update_missing_appointment_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_id", "eq.404"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = update_appointment(config_for(&server), Path(404), Json(UpdateAppointmentRequest::default())).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_get_appointment() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_id", "eq.12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(12, 2, "2025-03-11 14:00", "2025-03-11 14:45", "completed")
        ])))
        .mount(&server)
        .await;

    let Json(body) = get_appointment(config_for(&server), Path(12)).await.unwrap();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["provider_id"], 2);
}

#[tokio::test]
async fn test_list_appointments_uses_default_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(1, 1, "2025-03-10 09:00", "2025-03-10 09:30", "scheduled"),
            MockSupabaseResponses::appointment_response(2, 1, "2025-03-10 09:30", "2025-03-10 10:00", "cancelled")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let Json(body) = list_appointments(config_for(&server), Query(ListAppointmentsQuery::default()))
        .await
        .unwrap();

    assert_eq!(body.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_delete_appointment_cascades_to_payment() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/payments"))
        .and(query_param("appointment_id", "eq.9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "payment_id": 3 }])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_id", "eq.9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(9, 1, "2025-03-10 09:00", "2025-03-10 09:30", "scheduled")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let Json(body) = delete_appointment(config_for(&server), Path(9)).await.unwrap();
    assert_eq!(body, json!({ "status": "deleted" }));
}

#[tokio::test]
async fn test_delete_missing_appointment_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = delete_appointment(config_for(&server), Path(9)).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_validate_endpoint_reports_rejection_without_writing() {
    let server = MockServer::start().await;
    mount_references(&server).await;
    mount_overlapping(&server, json!([
        MockSupabaseResponses::appointment_response(4, 1, "2025-03-10 09:00", "2025-03-10 10:00", "scheduled")
    ])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let request = ValidateAppointmentRequest {
        appointment: booking("2025-03-10 09:00", "2025-03-10 09:15"),
        status: None,
        exclude_appointment_id: None,
    };

    let Json(body) = validate_appointment(config_for(&server), Json(request)).await.unwrap();

    assert_eq!(body["admissible"], false);
    assert_eq!(body["code"], "provider_conflict");
    assert_eq!(body["conflicting_appointment_id"], 4);
}

#[tokio::test]
async fn test_validate_endpoint_admits() {
    let server = MockServer::start().await;
    mount_references(&server).await;
    mount_overlapping(&server, json!([])).await;

    let request = ValidateAppointmentRequest {
        appointment: booking("2025-03-10 09:00", "2025-03-10 09:15"),
        status: None,
        exclude_appointment_id: Some(4),
    };

    let Json(body) = validate_appointment(config_for(&server), Json(request)).await.unwrap();

    assert_eq!(body["admissible"], true);
    assert_eq!(body["appointment"]["status"], "scheduled");
}
