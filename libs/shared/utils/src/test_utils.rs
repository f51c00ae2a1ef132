use std::sync::Arc;
use chrono::NaiveDateTime;
use serde_json::json;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Points the config at a mock PostgREST server.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            default_page_limit: shared_config::DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Parses `"2025-03-10 09:00"` style clinic-local timestamps.
pub fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
        .unwrap_or_else(|e| panic!("bad test timestamp {:?}: {}", value, e))
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn patient_response(patient_id: i64, first_name: &str, last_name: &str) -> serde_json::Value {
        json!({
            "patient_id": patient_id,
            "first_name": first_name,
            "last_name": last_name,
            "dob": "1990-01-01",
            "gender": "female",
            "phone": null,
            "email": format!("{}.{}@example.com", first_name.to_lowercase(), last_name.to_lowercase()),
            "address": null,
            "created_at": "2025-01-01T00:00:00"
        })
    }

    pub fn appointment_response(
        appointment_id: i64,
        provider_id: i64,
        start: &str,
        end: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "appointment_id": appointment_id,
            "patient_id": 1,
            "provider_id": provider_id,
            "service_id": 1,
            "room": null,
            "start_datetime": at(start),
            "end_datetime": at(end),
            "status": status,
            "notes": null,
            "created_at": "2025-01-01T00:00:00"
        })
    }

    /// A single-row lookup result for `exists` checks against reference tables.
    pub fn reference_row(key: &str, id: i64) -> serde_json::Value {
        json!([{ key: id }])
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "code": code,
            "details": null,
            "hint": null,
            "message": message
        })
    }
}
