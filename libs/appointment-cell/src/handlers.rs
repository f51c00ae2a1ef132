// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Map, Value};

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, CreateAppointmentRequest, ListAppointmentsQuery, RejectionReason,
    UpdateAppointmentRequest, ValidateAppointmentRequest,
};
use crate::services::booking::AppointmentService;

/// Reason-specific fields of a rejection (everything but the code).
fn rejection_details(reason: &RejectionReason) -> Map<String, Value> {
    match serde_json::to_value(reason) {
        Ok(Value::Object(mut fields)) => {
            fields.remove("code");
            fields
        }
        _ => Map::new(),
    }
}

pub fn map_appointment_error(err: AppointmentError) -> AppError {
    match err {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::Rejected(reason) => AppError::Rejected {
            code: reason.code().to_string(),
            message: reason.to_string(),
            details: rejection_details(&reason),
        },
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::ConcurrentModification { attempts } => AppError::Conflict(
            format!("Appointment could not be committed after {} attempts due to concurrent bookings", attempts)
        ),
        AppointmentError::StorageConflict(msg) => AppError::Conflict(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);

    let appointment = service.create_appointment(request)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);

    let appointments = service.list_appointments(query.skip, query.limit)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);

    let appointment = service.get_appointment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);

    let appointment = service.update_appointment(appointment_id, request)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);

    service.delete_appointment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "status": "deleted" })))
}

/// Dry run of the scheduling checks. A rejection is a normal answer here,
/// so it comes back as 200 with `admissible: false`.
#[axum::debug_handler]
pub async fn validate_appointment(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<ValidateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);

    let mut candidate = request.appointment.into_candidate();
    candidate.status = request.status;

    match service.check_appointment(&candidate, request.exclude_appointment_id).await {
        Ok(accepted) => Ok(Json(json!({
            "admissible": true,
            "appointment": accepted
        }))),
        Err(AppointmentError::Rejected(reason)) => {
            let mut body = rejection_details(&reason);
            body.insert("admissible".to_string(), json!(false));
            body.insert("code".to_string(), json!(reason.code()));
            body.insert("error".to_string(), json!(reason.to_string()));
            Ok(Json(Value::Object(body)))
        }
        Err(e) => Err(map_appointment_error(e)),
    }
}
