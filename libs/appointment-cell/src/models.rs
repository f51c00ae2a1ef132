// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use chrono::NaiveDateTime;
use std::fmt;

use shared_database::Table;

pub const ROOM_MAX_LEN: usize = 50;
pub const MAX_PAGE_LIMIT: i64 = 500;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A persisted appointment row. Times are clinic-local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub appointment_id: i64,
    pub patient_id: i64,
    pub provider_id: i64,
    pub service_id: i64,
    pub room: Option<String>,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Appointment {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_datetime, self.end_datetime)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Whether an appointment in this status blocks the provider's calendar.
    pub fn occupies_calendar(&self) -> bool {
        match self {
            AppointmentStatus::Scheduled => true,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Overlap, or an identical start instant even when either range is empty.
    pub fn collides_with(&self, other: &TimeRange) -> bool {
        self.overlaps(other) || self.start == other.start
    }
}

/// Tables an appointment references by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceEntity {
    Patient,
    Provider,
    Service,
}

impl ReferenceEntity {
    pub fn table(&self) -> Table {
        match self {
            ReferenceEntity::Patient => Table::Patients,
            ReferenceEntity::Provider => Table::Providers,
            ReferenceEntity::Service => Table::Services,
        }
    }

    pub fn unknown(&self, id: i64) -> RejectionReason {
        match self {
            ReferenceEntity::Patient => RejectionReason::UnknownPatient { patient_id: id },
            ReferenceEntity::Provider => RejectionReason::UnknownProvider { provider_id: id },
            ReferenceEntity::Service => RejectionReason::UnknownService { service_id: id },
        }
    }
}

impl fmt::Display for ReferenceEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceEntity::Patient => write!(f, "patient"),
            ReferenceEntity::Provider => write!(f, "provider"),
            ReferenceEntity::Service => write!(f, "service"),
        }
    }
}

// ==============================================================================
// SCHEDULING MODELS
// ==============================================================================

/// A proposed appointment, before any scheduling rule has been checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentCandidate {
    pub patient_id: i64,
    pub provider_id: i64,
    pub service_id: i64,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub room: Option<String>,
    pub notes: Option<String>,
    /// `None` on create; defaults to `scheduled`.
    pub status: Option<AppointmentStatus>,
}

impl AppointmentCandidate {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_datetime, self.end_datetime)
    }

    /// References in the order they are checked.
    pub fn references(&self) -> [(ReferenceEntity, i64); 3] {
        [
            (ReferenceEntity::Patient, self.patient_id),
            (ReferenceEntity::Provider, self.provider_id),
            (ReferenceEntity::Service, self.service_id),
        ]
    }

    pub fn accept(&self) -> AcceptedAppointment {
        AcceptedAppointment {
            patient_id: self.patient_id,
            provider_id: self.provider_id,
            service_id: self.service_id,
            room: self.room.clone(),
            start_datetime: self.start_datetime,
            end_datetime: self.end_datetime,
            status: self.status.unwrap_or_default(),
            notes: self.notes.clone(),
        }
    }
}

/// An admitted appointment, ready to be written. Identifier and creation
/// time are assigned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedAppointment {
    pub patient_id: i64,
    pub provider_id: i64,
    pub service_id: i64,
    pub room: Option<String>,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: i64,
    pub provider_id: i64,
    pub service_id: i64,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub room: Option<String>,
    pub notes: Option<String>,
}

impl CreateAppointmentRequest {
    pub fn into_candidate(self) -> AppointmentCandidate {
        AppointmentCandidate {
            patient_id: self.patient_id,
            provider_id: self.provider_id,
            service_id: self.service_id,
            start_datetime: self.start_datetime,
            end_datetime: self.end_datetime,
            room: self.room,
            notes: self.notes,
            status: None,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub patient_id: Option<i64>,
    pub provider_id: Option<i64>,
    pub service_id: Option<i64>,
    pub start_datetime: Option<NaiveDateTime>,
    pub end_datetime: Option<NaiveDateTime>,
    pub room: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl UpdateAppointmentRequest {
    pub fn apply_to(self, existing: &Appointment) -> AppointmentCandidate {
        AppointmentCandidate {
            patient_id: self.patient_id.unwrap_or(existing.patient_id),
            provider_id: self.provider_id.unwrap_or(existing.provider_id),
            service_id: self.service_id.unwrap_or(existing.service_id),
            start_datetime: self.start_datetime.unwrap_or(existing.start_datetime),
            end_datetime: self.end_datetime.unwrap_or(existing.end_datetime),
            room: self.room.or_else(|| existing.room.clone()),
            notes: self.notes.or_else(|| existing.notes.clone()),
            status: Some(self.status.unwrap_or(existing.status)),
        }
    }
}

/// Dry-run scheduling check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateAppointmentRequest {
    #[serde(flatten)]
    pub appointment: CreateAppointmentRequest,
    pub status: Option<AppointmentStatus>,
    pub exclude_appointment_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListAppointmentsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

/// Why a scheduling request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("Appointment end time must be after its start time")]
    InvalidTimeRange,

    #[error("Patient {patient_id} not found")]
    UnknownPatient { patient_id: i64 },

    #[error("Provider {provider_id} not found")]
    UnknownProvider { provider_id: i64 },

    #[error("Service {service_id} not found")]
    UnknownService { service_id: i64 },

    #[error("Provider already has appointment {conflicting_appointment_id} at this time")]
    ProviderConflict { conflicting_appointment_id: i64 },
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::InvalidTimeRange => "invalid_time_range",
            RejectionReason::UnknownPatient { .. } => "unknown_patient",
            RejectionReason::UnknownProvider { .. } => "unknown_provider",
            RejectionReason::UnknownService { .. } => "unknown_service",
            RejectionReason::ProviderConflict { .. } => "provider_conflict",
        }
    }

    /// The missing reference, for the `Unknown*` family.
    pub fn entity(&self) -> Option<ReferenceEntity> {
        match self {
            RejectionReason::UnknownPatient { .. } => Some(ReferenceEntity::Patient),
            RejectionReason::UnknownProvider { .. } => Some(ReferenceEntity::Provider),
            RejectionReason::UnknownService { .. } => Some(ReferenceEntity::Service),
            RejectionReason::InvalidTimeRange | RejectionReason::ProviderConflict { .. } => None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error(transparent)]
    Rejected(#[from] RejectionReason),

    /// A write lost to a storage-level uniqueness, exclusion or foreign-key
    /// constraint. Re-validating turns it into a `RejectionReason`.
    #[error("Storage constraint rejected the write: {0}")]
    StorageConflict(String),

    #[error("Appointment could not be committed after {attempts} attempts due to concurrent bookings")]
    ConcurrentModification { attempts: u32 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
