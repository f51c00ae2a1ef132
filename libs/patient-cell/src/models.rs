use serde::{Deserialize, Serialize};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

pub const NAME_MAX_LEN: usize = 100;
pub const PHONE_MAX_LEN: usize = 20;
pub const EMAIL_MAX_LEN: usize = 150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<NaiveDate>,
    pub gender: Gender,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    #[default]
    Female,
    Other,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Gender,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl UpdatePatientRequest {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.dob.is_none()
            && self.gender.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.address.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPatientsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("A patient with this email or phone already exists")]
    AlreadyExists,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

fn check_name(field: &str, value: &str) -> Result<(), PatientError> {
    if value.trim().is_empty() {
        return Err(PatientError::ValidationError(format!("{} must not be empty", field)));
    }
    check_len(field, value, NAME_MAX_LEN)
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), PatientError> {
    if value.chars().count() > max {
        return Err(PatientError::ValidationError(format!("{} must be at most {} characters", field, max)));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), PatientError> {
    check_len("email", email, EMAIL_MAX_LEN)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(PatientError::ValidationError(format!("'{}' is not a valid email address", email))),
    }
}

impl CreatePatientRequest {
    pub fn validate(&self) -> Result<(), PatientError> {
        check_name("first_name", &self.first_name)?;
        check_name("last_name", &self.last_name)?;
        if let Some(phone) = &self.phone {
            check_len("phone", phone, PHONE_MAX_LEN)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        Ok(())
    }
}

impl UpdatePatientRequest {
    pub fn validate(&self) -> Result<(), PatientError> {
        if let Some(first_name) = &self.first_name {
            check_name("first_name", first_name)?;
        }
        if let Some(last_name) = &self.last_name {
            check_name("last_name", last_name)?;
        }
        if let Some(phone) = &self.phone {
            check_len("phone", phone, PHONE_MAX_LEN)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        Ok(())
    }
}
