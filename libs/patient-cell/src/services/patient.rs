use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, info};

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError, Table};

use crate::models::{CreatePatientRequest, Patient, PatientError, UpdatePatientRequest};

const PATIENTS_PATH: &str = "/rest/v1/patients";
const MAX_PAGE_LIMIT: i64 = 500;

fn map_storage_error(err: anyhow::Error) -> PatientError {
    match SupabaseError::find(&err) {
        Some(supabase_err) if supabase_err.is_constraint_violation() => PatientError::AlreadyExists,
        _ => {
            error!("Patient storage error: {}", err);
            PatientError::DatabaseError(err.to_string())
        }
    }
}

pub struct PatientService {
    supabase: SupabaseClient,
    default_page_limit: i64,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            default_page_limit: config.default_page_limit,
        }
    }

    pub async fn create_patient(&self, request: CreatePatientRequest) -> Result<Patient, PatientError> {
        request.validate()?;
        debug!("Creating patient {} {}", request.first_name, request.last_name);

        let rows: Vec<Patient> = self.supabase.request_with_headers(
            Method::POST,
            PATIENTS_PATH,
            Some(json!(request)),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(map_storage_error)?;

        let patient = rows.into_iter()
            .next()
            .ok_or_else(|| PatientError::DatabaseError("Insert returned no patient".to_string()))?;

        info!("Patient {} created", patient.patient_id);
        Ok(patient)
    }

    pub async fn list_patients(&self, skip: Option<i64>, limit: Option<i64>) -> Result<Vec<Patient>, PatientError> {
        let skip = skip.unwrap_or(0);
        let limit = limit.unwrap_or(self.default_page_limit);
        if skip < 0 || limit <= 0 {
            return Err(PatientError::ValidationError("skip must be >= 0 and limit > 0".to_string()));
        }

        let path = format!(
            "{}?order=patient_id.asc&offset={}&limit={}",
            PATIENTS_PATH, skip, limit.min(MAX_PAGE_LIMIT)
        );
        self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(map_storage_error)
    }

    pub async fn get_patient(&self, patient_id: i64) -> Result<Patient, PatientError> {
        debug!("Fetching patient {}", patient_id);

        let path = format!("{}?patient_id=eq.{}", PATIENTS_PATH, patient_id);
        let rows: Vec<Patient> = self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(map_storage_error)?;

        rows.into_iter().next().ok_or(PatientError::NotFound)
    }

    pub async fn update_patient(
        &self,
        patient_id: i64,
        request: UpdatePatientRequest,
    ) -> Result<Patient, PatientError> {
        request.validate()?;

        if request.is_empty() {
            return self.get_patient(patient_id).await;
        }

        debug!("Updating patient {}", patient_id);
        let path = format!("{}?patient_id=eq.{}", PATIENTS_PATH, patient_id);
        let rows: Vec<Patient> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(json!(request)),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(map_storage_error)?;

        rows.into_iter().next().ok_or(PatientError::NotFound)
    }

    /// Deletes the patient together with their appointments and payments.
    pub async fn delete_patient(&self, patient_id: i64) -> Result<(), PatientError> {
        let deleted = self.supabase.delete_cascading(Table::Patients, patient_id)
            .await
            .map_err(map_storage_error)?;

        if !deleted {
            return Err(PatientError::NotFound);
        }

        info!("Patient {} deleted", patient_id);
        Ok(())
    }
}
