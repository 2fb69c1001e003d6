//! Promoting a provisioned REST API to a stage.

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::client::ResolvedClientContext;
use crate::config::DeploymentSpec;
use crate::error::{DeploymentError, RemoteError};

/// A deployment created by [`StageDeployer`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRecord {
    pub id: String,
    pub rest_api_id: String,
    pub stage_name: String,
    pub raw: Value,
}

/// What the deploy step did.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// No deployment configured; no remote call was made.
    Skipped,
    Deployed(DeploymentRecord),
}

impl StageOutcome {
    pub fn is_deployed(&self) -> bool {
        matches!(self, StageOutcome::Deployed(_))
    }

    pub fn record(&self) -> Option<&DeploymentRecord> {
        match self {
            StageOutcome::Deployed(record) => Some(record),
            StageOutcome::Skipped => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDeploymentRequest<'a> {
    stage_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage_description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_cluster_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_cluster_size: Option<&'a str>,
}

impl<'a> From<&'a DeploymentSpec> for CreateDeploymentRequest<'a> {
    fn from(spec: &'a DeploymentSpec) -> Self {
        Self {
            stage_name: &spec.stage_name,
            stage_description: spec.stage_description.as_deref(),
            description: spec.description.as_deref(),
            cache_cluster_enabled: spec.cache_cluster_enabled,
            cache_cluster_size: spec.cache_cluster_size.as_deref(),
        }
    }
}

/// Creates stage deployments.
pub struct StageDeployer;

impl StageDeployer {
    /// Create a deployment for `spec`, or do nothing when it is absent.
    ///
    /// `spec` must be bound to a REST API id with [`DeploymentSpec::bound_to`].
    /// Each call adds a deployment record to the stage.
    pub async fn deploy(
        ctx: &ResolvedClientContext,
        spec: Option<&DeploymentSpec>,
    ) -> Result<StageOutcome, DeploymentError> {
        let Some(spec) = spec else {
            return Ok(StageOutcome::Skipped);
        };
        let rest_api_id = spec
            .rest_api_id()
            .ok_or(DeploymentError::MissingRestApiId)?;

        let body = serde_json::to_vec(&CreateDeploymentRequest::from(spec))?;

        let raw = ctx
            .apigateway(
                Method::POST,
                &format!("/restapis/{}/deployments", rest_api_id),
                None,
                Bytes::from(body),
            )
            .await?
            .into_json()
            .map_err(DeploymentError::RemoteRejected)?;

        let record = into_record(raw, rest_api_id, &spec.stage_name)?;

        swagger_import_telemetry::log_deployment_created!(
            rest_api_id = %rest_api_id,
            stage = %spec.stage_name,
            deployment_id = %record.id,
            "deployment created"
        );

        Ok(StageOutcome::Deployed(record))
    }
}

/// A success body without a deployment id is a rejection.
fn into_record(
    raw: Value,
    rest_api_id: &str,
    stage_name: &str,
) -> Result<DeploymentRecord, DeploymentError> {
    let id = match raw.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            return Err(DeploymentError::RemoteRejected(RemoteError {
                status: 200,
                error_type: Some("InvalidResponse".to_string()),
                message: "response has no deployment id".to_string(),
            }))
        }
    };

    Ok(DeploymentRecord {
        id,
        rest_api_id: rest_api_id.to_string(),
        stage_name: stage_name.to_string(),
        raw,
    })
}
