use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::{
    AcceptedAppointment, Appointment, AppointmentCandidate, AppointmentError, RejectionReason, TimeRange,
};
use crate::services::repository::AppointmentRepository;

/// Decides whether a proposed or modified appointment may be committed.
///
/// Reads from the repository but never writes; two calls with the same
/// inputs against the same repository state give the same answer.
pub struct SchedulingValidator<R: ?Sized = dyn AppointmentRepository> {
    repository: Arc<R>,
}

impl<R: AppointmentRepository + ?Sized> SchedulingValidator<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Checks, in order: time sanity, that patient/provider/service exist,
    /// and that the provider has no colliding scheduled appointment.
    /// `exclude_appointment_id` is the appointment being updated, if any.
    pub async fn validate(
        &self,
        candidate: &AppointmentCandidate,
        exclude_appointment_id: Option<i64>,
    ) -> Result<AcceptedAppointment, AppointmentError> {
        let range = candidate.time_range();
        if !range.is_valid() {
            warn!("Rejecting appointment with end {} not after start {}",
                  range.end, range.start);
            return Err(RejectionReason::InvalidTimeRange.into());
        }

        for (entity, id) in candidate.references() {
            if !self.repository.exists(entity, id).await? {
                warn!("Rejecting appointment referencing unknown {} {}", entity, id);
                return Err(entity.unknown(id).into());
            }
        }

        let existing = self.repository.find_overlapping(
            candidate.provider_id,
            range.start,
            range.end,
            exclude_appointment_id,
        ).await?;

        if let Some(conflict) = first_conflict(&existing, candidate.provider_id, &range, exclude_appointment_id) {
            warn!("Provider {} already booked by appointment {} ({} - {})",
                  candidate.provider_id, conflict.appointment_id,
                  conflict.start_datetime, conflict.end_datetime);
            return Err(RejectionReason::ProviderConflict {
                conflicting_appointment_id: conflict.appointment_id,
            }.into());
        }

        debug!("Appointment for provider {} at {} admitted", candidate.provider_id, range.start);
        Ok(candidate.accept())
    }
}

/// The earliest scheduled appointment of `provider_id` that collides with
/// `range`, ignoring `exclude_appointment_id`. Ties on start break by id.
pub fn first_conflict<'a>(
    existing: &'a [Appointment],
    provider_id: i64,
    range: &TimeRange,
    exclude_appointment_id: Option<i64>,
) -> Option<&'a Appointment> {
    existing.iter()
        .filter(|appointment| Some(appointment.appointment_id) != exclude_appointment_id)
        .filter(|appointment| appointment.provider_id == provider_id)
        .filter(|appointment| appointment.status.occupies_calendar())
        .filter(|appointment| range.collides_with(&appointment.time_range()))
        .min_by_key(|appointment| (appointment.start_datetime, appointment.appointment_id))
}
