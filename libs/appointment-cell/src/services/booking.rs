use std::sync::Arc;

use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    AcceptedAppointment, Appointment, AppointmentCandidate, AppointmentError, CreateAppointmentRequest,
    UpdateAppointmentRequest, MAX_PAGE_LIMIT, ROOM_MAX_LEN,
};
use crate::services::conflict::SchedulingValidator;
use crate::services::repository::{AppointmentRepository, SupabaseAppointmentRepository};

/// Validate-then-commit rounds before a storage conflict is reported as
/// a concurrent modification.
///
/// Each lost round re-validates, so a slot taken by another booking comes
/// back as `ProviderConflict` and a reference deleted mid-request as the
/// matching `Unknown*` reason. Only when every round loses to writes that
/// validation cannot see is there no winner to name; that case is a
/// 409 `ConcurrentModification` rather than a rejection.
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

pub struct AppointmentService {
    repository: Arc<dyn AppointmentRepository>,
    validator: SchedulingValidator,
    default_page_limit: i64,
}

impl AppointmentService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let mut service = Self::with_repository(Arc::new(SupabaseAppointmentRepository::new(supabase)));
        service.default_page_limit = config.default_page_limit;
        service
    }

    pub fn with_repository(repository: Arc<dyn AppointmentRepository>) -> Self {
        Self {
            validator: SchedulingValidator::new(repository.clone()),
            repository,
            default_page_limit: shared_config::DEFAULT_PAGE_LIMIT,
        }
    }

    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let candidate = request.into_candidate();

        let appointment = self.commit(&candidate, None).await?;
        info!("Appointment {} booked for provider {} at {}",
              appointment.appointment_id, appointment.provider_id, appointment.start_datetime);
        Ok(appointment)
    }

    pub async fn update_appointment(
        &self,
        appointment_id: i64,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id).await?;
        let candidate = request.apply_to(&existing);

        let appointment = self.commit(&candidate, Some(appointment_id)).await?;
        info!("Appointment {} updated (status {})", appointment_id, appointment.status);
        Ok(appointment)
    }

    /// Runs the scheduling checks without writing anything.
    pub async fn check_appointment(
        &self,
        candidate: &AppointmentCandidate,
        exclude_appointment_id: Option<i64>,
    ) -> Result<AcceptedAppointment, AppointmentError> {
        self.admit(candidate, exclude_appointment_id).await
    }

    pub async fn get_appointment(&self, appointment_id: i64) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment {}", appointment_id);
        self.repository.get(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn list_appointments(
        &self,
        skip: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let (skip, limit) = page_bounds(skip, limit, self.default_page_limit)?;
        self.repository.list(skip, limit).await
    }

    pub async fn delete_appointment(&self, appointment_id: i64) -> Result<(), AppointmentError> {
        if !self.repository.delete(appointment_id).await? {
            return Err(AppointmentError::NotFound);
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    /// Validates and writes `candidate`. A write that loses a race to a
    /// concurrent booking is re-validated, which turns it into a
    /// `ProviderConflict` naming the winner.
    async fn commit(
        &self,
        candidate: &AppointmentCandidate,
        exclude_appointment_id: Option<i64>,
    ) -> Result<Appointment, AppointmentError> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let accepted = self.admit(candidate, exclude_appointment_id).await?;

            let written = match exclude_appointment_id {
                None => self.repository.insert(&accepted).await,
                Some(appointment_id) => self.repository.update(appointment_id, &accepted)
                    .await
                    .and_then(|updated| updated.ok_or(AppointmentError::NotFound)),
            };

            match written {
                Err(AppointmentError::StorageConflict(constraint)) => {
                    warn!("Write for provider {} lost a race on attempt {} ({}), re-validating",
                          candidate.provider_id, attempt, constraint);
                }
                other => return other,
            }
        }

        Err(AppointmentError::ConcurrentModification { attempts: MAX_COMMIT_ATTEMPTS })
    }

    /// Scheduling checks first, then the field limits they do not cover.
    async fn admit(
        &self,
        candidate: &AppointmentCandidate,
        exclude_appointment_id: Option<i64>,
    ) -> Result<AcceptedAppointment, AppointmentError> {
        let accepted = self.validator.validate(candidate, exclude_appointment_id).await?;
        check_fields(candidate)?;
        Ok(accepted)
    }
}

fn check_fields(candidate: &AppointmentCandidate) -> Result<(), AppointmentError> {
    if let Some(room) = &candidate.room {
        if room.chars().count() > ROOM_MAX_LEN {
            return Err(AppointmentError::ValidationError(
                format!("room must be at most {} characters", ROOM_MAX_LEN)
            ));
        }
    }

    Ok(())
}

fn page_bounds(skip: Option<i64>, limit: Option<i64>, default_limit: i64) -> Result<(i64, i64), AppointmentError> {
    let skip = skip.unwrap_or(0);
    let limit = limit.unwrap_or(default_limit);

    if skip < 0 {
        return Err(AppointmentError::ValidationError("skip must not be negative".to_string()));
    }
    if limit <= 0 {
        return Err(AppointmentError::ValidationError("limit must be positive".to_string()));
    }

    Ok((skip, limit.min(MAX_PAGE_LIMIT)))
}
