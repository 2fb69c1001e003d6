//! Creating or updating the REST API from the description payload.

use bytes::Bytes;
use reqwest::Method;
use serde_json::Value;

use crate::client::ResolvedClientContext;
use crate::config::UpdateSpec;
use crate::error::{ProvisionError, RemoteError};

/// The provisioned REST API.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionResult {
    pub id: String,
    pub name: Option<String>,
    /// Full service response.
    pub raw: Value,
}

/// Imports a new REST API or overwrites an existing one.
pub struct ApiProvisioner;

impl ApiProvisioner {
    /// Validate the update target without any I/O.
    ///
    /// Returns the id to update, or `None` in create mode.
    pub fn check(update: Option<&UpdateSpec>) -> Result<Option<&str>, ProvisionError> {
        let Some(update) = update else {
            return Ok(None);
        };
        let id = update.rest_api_id.trim();
        if id.is_empty() {
            return Err(ProvisionError::MissingTargetId);
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ProvisionError::InvalidTargetId(id.to_string()));
        }
        Ok(Some(id))
    }

    /// Import (`update` absent) or overwrite/merge (`update` present).
    ///
    /// Warnings always fail the call. A create allocates a new API every
    /// time it runs.
    pub async fn provision(
        ctx: &ResolvedClientContext,
        payload: Bytes,
        update: Option<&UpdateSpec>,
    ) -> Result<ProvisionResult, ProvisionError> {
        let bytes = payload.len();

        match (Self::check(update)?, update) {
            (Some(id), Some(update)) => {
                let query = format!("mode={}&failonwarnings=true", update.mode.as_str());
                let response = ctx
                    .apigateway(Method::PUT, &format!("/restapis/{}", id), Some(&query), payload)
                    .await?;
                let result = into_result(response.into_json())?;

                swagger_import_telemetry::log_api_updated!(
                    rest_api_id = %result.id,
                    mode = update.mode.as_str(),
                    bytes,
                    "rest api updated"
                );
                Ok(result)
            }
            _ => {
                let response = ctx
                    .apigateway(
                        Method::POST,
                        "/restapis",
                        Some("mode=import&failonwarnings=true"),
                        payload,
                    )
                    .await?;
                let result = into_result(response.into_json())?;

                swagger_import_telemetry::log_api_imported!(
                    rest_api_id = %result.id,
                    name = result.name.as_deref().unwrap_or(""),
                    bytes,
                    "rest api imported"
                );
                Ok(result)
            }
        }
    }
}

fn into_result(response: Result<Value, RemoteError>) -> Result<ProvisionResult, ProvisionError> {
    let raw = response.map_err(ProvisionError::RemoteRejected)?;

    if let Some(warnings) = warnings(&raw) {
        return Err(ProvisionError::RemoteRejected(RemoteError {
            status: 200,
            error_type: Some("ImportWarnings".to_string()),
            message: warnings.join("; "),
        }));
    }

    let Some(id) = raw.get("id").and_then(Value::as_str).map(str::to_string) else {
        return Err(ProvisionError::RemoteRejected(RemoteError {
            status: 200,
            error_type: Some("InvalidResponse".to_string()),
            message: "response has no REST API id".to_string(),
        }));
    };
    let name = raw.get("name").and_then(Value::as_str).map(str::to_string);

    Ok(ProvisionResult { id, name, raw })
}

/// Non-empty `warnings` list of a successful response.
fn warnings(raw: &Value) -> Option<Vec<String>> {
    let list = raw.get("warnings")?.as_array()?;
    if list.is_empty() {
        return None;
    }
    Some(
        list.iter()
            .map(|w| match w {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
    )
}
