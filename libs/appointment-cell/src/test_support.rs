use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use shared_utils::test_utils::at;

use crate::models::{AcceptedAppointment, Appointment, AppointmentError, AppointmentStatus, ReferenceEntity};
use crate::services::repository::AppointmentRepository;

/// In-memory repository. `find_overlapping` deliberately returns every row
/// for the provider so that callers must do their own interval filtering.
#[derive(Default)]
pub struct InMemoryRepository {
    pub appointments: Mutex<Vec<Appointment>>,
    pub known: Mutex<HashSet<(ReferenceEntity, i64)>>,
    /// Inserts that should fail as lost races; each failure first commits
    /// the paired "winner" row.
    pub race_losses: Mutex<Vec<Appointment>>,
    /// A reference deleted by another request just before the next insert.
    pub vanishing_reference: Mutex<Option<(ReferenceEntity, i64)>>,
    pub overlap_queries: AtomicUsize,
}

impl InMemoryRepository {
    pub fn with_references(patients: &[i64], providers: &[i64], services: &[i64]) -> Self {
        let repo = Self::default();
        {
            let mut known = repo.known.lock().unwrap();
            known.extend(patients.iter().map(|id| (ReferenceEntity::Patient, *id)));
            known.extend(providers.iter().map(|id| (ReferenceEntity::Provider, *id)));
            known.extend(services.iter().map(|id| (ReferenceEntity::Service, *id)));
        }
        repo
    }

    pub fn fail_next_insert_with_missing(&self, entity: ReferenceEntity, id: i64) {
        *self.vanishing_reference.lock().unwrap() = Some((entity, id));
    }

    pub fn seed(&self, appointment: Appointment) {
        self.appointments.lock().unwrap().push(appointment);
    }

    pub fn snapshot(&self) -> Vec<Appointment> {
        self.appointments.lock().unwrap().clone()
    }

    fn next_id(appointments: &[Appointment]) -> i64 {
        appointments.iter().map(|a| a.appointment_id).max().unwrap_or(0) + 1
    }
}

pub fn appointment(id: i64, provider_id: i64, start: &str, end: &str, status: AppointmentStatus) -> Appointment {
    Appointment {
        appointment_id: id,
        patient_id: 1,
        provider_id,
        service_id: 1,
        room: None,
        start_datetime: at(start),
        end_datetime: at(end),
        status,
        notes: None,
        created_at: at("2025-01-01 00:00"),
    }
}

fn materialize(id: i64, accepted: &AcceptedAppointment, created_at: NaiveDateTime) -> Appointment {
    Appointment {
        appointment_id: id,
        patient_id: accepted.patient_id,
        provider_id: accepted.provider_id,
        service_id: accepted.service_id,
        room: accepted.room.clone(),
        start_datetime: accepted.start_datetime,
        end_datetime: accepted.end_datetime,
        status: accepted.status,
        notes: accepted.notes.clone(),
        created_at,
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryRepository {
    async fn find_overlapping(
        &self,
        provider_id: i64,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
        _exclude_id: Option<i64>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.overlap_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.appointments.lock().unwrap()
            .iter()
            .filter(|a| a.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn exists(&self, entity: ReferenceEntity, id: i64) -> Result<bool, AppointmentError> {
        Ok(self.known.lock().unwrap().contains(&(entity, id)))
    }

    async fn get(&self, appointment_id: i64) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.lock().unwrap()
            .iter()
            .find(|a| a.appointment_id == appointment_id)
            .cloned())
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.appointments.lock().unwrap()
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert(&self, accepted: &AcceptedAppointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.lock().unwrap();

        if let Some(reference) = self.vanishing_reference.lock().unwrap().take() {
            self.known.lock().unwrap().remove(&reference);
            return Err(AppointmentError::StorageConflict("foreign key constraint".to_string()));
        }

        if let Some(winner) = self.race_losses.lock().unwrap().pop() {
            appointments.push(winner);
            return Err(AppointmentError::StorageConflict("uniq_provider_start".to_string()));
        }

        let created = materialize(Self::next_id(&appointments), accepted, at("2025-01-02 00:00"));
        appointments.push(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        appointment_id: i64,
        accepted: &AcceptedAppointment,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut appointments = self.appointments.lock().unwrap();
        let Some(row) = appointments.iter_mut().find(|a| a.appointment_id == appointment_id) else {
            return Ok(None);
        };

        *row = materialize(appointment_id, accepted, row.created_at);
        Ok(Some(row.clone()))
    }

    async fn delete(&self, appointment_id: i64) -> Result<bool, AppointmentError> {
        let mut appointments = self.appointments.lock().unwrap();
        let before = appointments.len();
        appointments.retain(|a| a.appointment_id != appointment_id);
        Ok(appointments.len() != before)
    }
}
