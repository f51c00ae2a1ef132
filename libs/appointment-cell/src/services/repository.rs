use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_database::{SupabaseClient, SupabaseError, Table};

use crate::models::{AcceptedAppointment, Appointment, AppointmentError, AppointmentStatus, ReferenceEntity};

/// Persistence for appointments and existence lookups for the rows they reference.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Scheduled appointments of `provider_id` whose interval intersects
    /// `[start, end)` or whose start equals `start`, excluding `exclude_id`.
    async fn find_overlapping(
        &self,
        provider_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_id: Option<i64>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn exists(&self, entity: ReferenceEntity, id: i64) -> Result<bool, AppointmentError>;

    async fn get(&self, appointment_id: i64) -> Result<Option<Appointment>, AppointmentError>;

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Appointment>, AppointmentError>;

    async fn insert(&self, appointment: &AcceptedAppointment) -> Result<Appointment, AppointmentError>;

    /// Returns `None` if the appointment does not exist.
    async fn update(
        &self,
        appointment_id: i64,
        appointment: &AcceptedAppointment,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Deletes the appointment and its payment. Returns `false` if absent.
    async fn delete(&self, appointment_id: i64) -> Result<bool, AppointmentError>;
}

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";

fn timestamp(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn map_storage_error(err: anyhow::Error) -> AppointmentError {
    match SupabaseError::find(&err) {
        Some(supabase_err)
            if supabase_err.is_constraint_violation() || supabase_err.is_foreign_key_violation() =>
        {
            AppointmentError::StorageConflict(supabase_err.message.clone())
        }
        _ => {
            error!("Appointment storage error: {}", err);
            AppointmentError::DatabaseError(err.to_string())
        }
    }
}

/// PostgREST-backed repository.
pub struct SupabaseAppointmentRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn overlap_query(
        provider_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_id: Option<i64>,
    ) -> String {
        let mut query_parts = vec![
            format!("provider_id=eq.{}", provider_id),
            format!("status=eq.{}", AppointmentStatus::Scheduled),
            format!(
                "or=(and(start_datetime.lt.{end},end_datetime.gt.{start}),start_datetime.eq.{start})",
                start = timestamp(start),
                end = timestamp(end),
            ),
        ];

        if let Some(exclude_id) = exclude_id {
            query_parts.push(format!("appointment_id=neq.{}", exclude_id));
        }

        format!("{}?{}&order=start_datetime.asc", APPOINTMENTS_PATH, query_parts.join("&"))
    }
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn find_overlapping(
        &self,
        provider_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_id: Option<i64>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Looking up scheduled appointments for provider {} between {} and {}",
               provider_id, start, end);

        let path = Self::overlap_query(provider_id, start, end, exclude_id);
        self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(map_storage_error)
    }

    async fn exists(&self, entity: ReferenceEntity, id: i64) -> Result<bool, AppointmentError> {
        let table = entity.table();
        let key = table.primary_key()
            .ok_or_else(|| AppointmentError::DatabaseError(format!("{} has no primary key", table)))?;

        let path = format!("{}?{}=eq.{}&select={}&limit=1", table.rest_path(), key, id, key);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(map_storage_error)?;

        Ok(!rows.is_empty())
    }

    async fn get(&self, appointment_id: i64) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("{}?appointment_id=eq.{}", APPOINTMENTS_PATH, appointment_id);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(map_storage_error)?;

        Ok(rows.into_iter().next())
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "{}?order=appointment_id.asc&offset={}&limit={}",
            APPOINTMENTS_PATH, skip, limit
        );
        self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(map_storage_error)
    }

    async fn insert(&self, appointment: &AcceptedAppointment) -> Result<Appointment, AppointmentError> {
        let rows: Vec<Appointment> = self.supabase.request_with_headers(
            Method::POST,
            APPOINTMENTS_PATH,
            Some(json!(appointment)),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(map_storage_error)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no appointment".to_string()))
    }

    async fn update(
        &self,
        appointment_id: i64,
        appointment: &AcceptedAppointment,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("{}?appointment_id=eq.{}", APPOINTMENTS_PATH, appointment_id);
        let rows: Vec<Appointment> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(json!(appointment)),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(map_storage_error)?;

        Ok(rows.into_iter().next())
    }

    async fn delete(&self, appointment_id: i64) -> Result<bool, AppointmentError> {
        self.supabase.delete_cascading(Table::Appointments, appointment_id)
            .await
            .map_err(map_storage_error)
    }
}
