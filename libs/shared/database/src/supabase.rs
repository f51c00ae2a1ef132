use std::future::Future;
use std::pin::Pin;

use anyhow::{anyhow, Result};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::cascade::Table;

/// Postgres SQLSTATE for a unique index violation.
pub const UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for an exclusion constraint violation.
pub const EXCLUSION_VIOLATION: &str = "23P01";
/// Postgres SQLSTATE for a write referencing a row that no longer exists.
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

/// A non-success response from the PostgREST gateway.
#[derive(Debug, Clone, thiserror::Error)]
#[error("API error ({status}): {message}")]
pub struct SupabaseError {
    pub status: u16,
    /// SQLSTATE or PostgREST error code, when the body carried one.
    pub code: Option<String>,
    pub message: String,
}

impl SupabaseError {
    pub fn from_response_body(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|value| value.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            status,
            code: field("code"),
            message: field("message").unwrap_or_else(|| body.to_string()),
        }
    }

    /// Whether a write lost to a uniqueness or exclusion constraint.
    pub fn is_constraint_violation(&self) -> bool {
        match self.code.as_deref() {
            Some(UNIQUE_VIOLATION) | Some(EXCLUSION_VIOLATION) => true,
            Some(_) => false,
            None => self.status == 409,
        }
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.code.as_deref() == Some(FOREIGN_KEY_VIOLATION)
    }

    /// Looks for a `SupabaseError` inside an `anyhow` chain.
    pub fn find(err: &anyhow::Error) -> Option<&SupabaseError> {
        err.downcast_ref::<SupabaseError>()
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.service_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key))?,
        );

        Ok(headers)
    }

    /// Headers asking PostgREST to echo written rows back.
    pub fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers()?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(SupabaseError::from_response_body(status.as_u16(), &error_text).into());
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Deletes every row of `table` whose `column` equals `id`, returning the deleted rows.
    pub async fn delete_where(&self, table: Table, column: &str, id: i64) -> Result<Vec<Value>> {
        let path = format!("{}?{}=eq.{}", table.rest_path(), column, id);
        self.request_with_headers(
            Method::DELETE,
            &path,
            None,
            Some(Self::representation_headers()),
        ).await
    }

    /// Deletes the row `id` of `table` after deleting all of its dependents
    /// per the cascade rules. Returns `false` if the row did not exist.
    pub fn delete_cascading<'a>(
        &'a self,
        table: Table,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let key = table.primary_key()
                .ok_or_else(|| anyhow!("Table {} has no single-column key to delete by", table))?;

            for rule in table.dependents() {
                if rule.child.has_dependents() {
                    let child_key = rule.child.primary_key()
                        .ok_or_else(|| anyhow!("Table {} has no single-column key to cascade through", rule.child))?;
                    let path = format!(
                        "{}?{}=eq.{}&select={}",
                        rule.child.rest_path(), rule.foreign_key, id, child_key
                    );
                    let rows: Vec<Value> = self.request(Method::GET, &path, None).await?;

                    for row in rows {
                        if let Some(child_id) = row.get(child_key).and_then(Value::as_i64) {
                            self.delete_cascading(rule.child, child_id).await?;
                        }
                    }
                } else {
                    let removed = self.delete_where(rule.child, rule.foreign_key, id).await?;
                    debug!("Cascaded delete of {} {} rows for {} {}", removed.len(), rule.child, table, id);
                }
            }

            let deleted = self.delete_where(table, key, id).await?;
            Ok(!deleted.is_empty())
        })
    }
}
