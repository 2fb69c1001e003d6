//! Credential resolution: from a [`CredentialSpec`] to a [`ResolvedClientContext`].
//!
//! The primary identity comes from the first configured source (profile, key
//! pair, credentials file) or from ambient discovery. When a role ARN is set,
//! that identity is only used to call STS `AssumeRole`, and the returned
//! temporary credentials sign everything else in the run.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use form_urlencoded::Serializer;
use reqwest::Method;
use serde::Deserialize;
use swagger_import_sigv4 as sigv4;

use crate::client::{self, ResolvedClientContext, SignedRequest};
use crate::config::{CredentialSpec, ServiceEndpoints};
use crate::error::{CredentialError, RemoteError};

const STS_VERSION: &str = "2011-06-15";
const DEFAULT_ROLE_DURATION_SECS: u32 = 3600;

/// Signing credentials, with their expiry when temporary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    signing: sigv4::Credentials,
    expires_at: Option<DateTime<Utc>>,
}

impl AwsCredentials {
    pub fn new(signing: sigv4::Credentials) -> Self {
        Self {
            signing,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn access_key_id(&self) -> &str {
        &self.signing.access_key_id
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_temporary(&self) -> bool {
        self.signing.session_token.is_some()
    }

    pub(crate) fn signing(&self) -> &sigv4::Credentials {
        &self.signing
    }
}

/// Which source supplied the identity that signs the run's requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    Profile(String),
    StaticKeys,
    CredentialsFile(PathBuf),
    Environment,
    /// Ambient `AWS_PROFILE` (or `default`) profile.
    AmbientProfile(String),
    /// Temporary credentials for `role_arn`, obtained with `via`.
    AssumedRole {
        role_arn: String,
        via: Box<IdentitySource>,
    },
}

impl IdentitySource {
    pub fn kind(&self) -> &'static str {
        match self {
            IdentitySource::Profile(_) => "profile",
            IdentitySource::StaticKeys => "static_keys",
            IdentitySource::CredentialsFile(_) => "credentials_file",
            IdentitySource::Environment => "environment",
            IdentitySource::AmbientProfile(_) => "ambient_profile",
            IdentitySource::AssumedRole { .. } => "assumed_role",
        }
    }
}

/// Snapshot of the process environment used for ambient discovery.
///
/// Captured once so concurrent runs (and tests) never read or mutate
/// process-wide state while resolving.
#[derive(Debug, Clone, Default)]
pub struct AmbientEnvironment {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub profile: Option<String>,
    pub shared_credentials_file: Option<PathBuf>,
}

impl AmbientEnvironment {
    /// Read `AWS_*` variables and locate the shared credentials file.
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            access_key_id: var("AWS_ACCESS_KEY_ID"),
            secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            session_token: var("AWS_SESSION_TOKEN"),
            profile: var("AWS_PROFILE"),
            shared_credentials_file: var("AWS_SHARED_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .or_else(|| dirs::home_dir().map(|home| home.join(".aws").join("credentials"))),
        }
    }

    /// No ambient credentials at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_shared_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.shared_credentials_file = Some(path.into());
        self
    }

    pub fn with_keys(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }
}

/// Resolves a [`CredentialSpec`] into a [`ResolvedClientContext`].
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    ambient: AmbientEnvironment,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialResolver {
    /// Resolver backed by the current process environment.
    pub fn new() -> Self {
        Self::with_ambient(AmbientEnvironment::from_process())
    }

    pub fn with_ambient(ambient: AmbientEnvironment) -> Self {
        Self { ambient }
    }

    /// Resolve credentials and build the run's client context.
    pub async fn resolve(
        &self,
        spec: &CredentialSpec,
        endpoints: &ServiceEndpoints,
    ) -> Result<ResolvedClientContext, CredentialError> {
        let (primary, source) = self.primary_identity(spec).await?;

        let (credentials, identity) = match spec.assume_role_arn.as_deref() {
            None => (primary, source),
            Some(role_arn) => {
                let temporary = assume_role(&primary, role_arn, spec, endpoints).await?;
                swagger_import_telemetry::log_role_assumed!(
                    role_arn = %role_arn,
                    via = source.kind(),
                    expires_at = ?temporary.expires_at(),
                    "assumed role"
                );
                (
                    temporary,
                    IdentitySource::AssumedRole {
                        role_arn: role_arn.to_string(),
                        via: Box::new(source),
                    },
                )
            }
        };

        swagger_import_telemetry::log_credentials_resolved!(
            source = identity.kind(),
            access_key_id = %credentials.access_key_id(),
            region = %spec.region,
            "credentials resolved"
        );

        Ok(ResolvedClientContext::new(
            credentials,
            identity,
            spec.region.clone(),
            endpoints.clone(),
        )?)
    }

    /// First match wins: profile, key pair, credentials file, ambient.
    async fn primary_identity(
        &self,
        spec: &CredentialSpec,
    ) -> Result<(AwsCredentials, IdentitySource), CredentialError> {
        if let Some(profile) = non_empty(&spec.profile) {
            let creds = self.profile_credentials(profile).await?;
            return Ok((creds, IdentitySource::Profile(profile.to_string())));
        }

        if let (Some(key), Some(secret)) = (
            non_empty(&spec.access_key_id),
            non_empty(&spec.secret_access_key),
        ) {
            let creds = AwsCredentials::new(sigv4::Credentials::new(key, secret));
            return Ok((creds, IdentitySource::StaticKeys));
        }

        if let Some(path) = &spec.credentials_file_path {
            let creds = credentials_file(path).await?;
            return Ok((creds, IdentitySource::CredentialsFile(path.clone())));
        }

        self.ambient_identity().await
    }

    async fn ambient_identity(&self) -> Result<(AwsCredentials, IdentitySource), CredentialError> {
        if let (Some(key), Some(secret)) = (
            non_empty(&self.ambient.access_key_id),
            non_empty(&self.ambient.secret_access_key),
        ) {
            let mut signing = sigv4::Credentials::new(key, secret);
            signing.session_token = self.ambient.session_token.clone();
            return Ok((AwsCredentials::new(signing), IdentitySource::Environment));
        }

        let profile = non_empty(&self.ambient.profile).unwrap_or("default");
        match self.profile_credentials(profile).await {
            Ok(creds) => Ok((creds, IdentitySource::AmbientProfile(profile.to_string()))),
            Err(CredentialError::ProfileNotFound { .. }) => Err(CredentialError::NoCredentials),
            Err(e) => Err(e),
        }
    }

    async fn profile_credentials(&self, profile: &str) -> Result<AwsCredentials, CredentialError> {
        let Some(path) = &self.ambient.shared_credentials_file else {
            return Err(CredentialError::ProfileNotFound {
                profile: profile.to_string(),
                path: PathBuf::from("~/.aws/credentials"),
            });
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialError::ProfileNotFound {
                    profile: profile.to_string(),
                    path: path.clone(),
                })
            }
            Err(e) => {
                return Err(CredentialError::Read {
                    path: path.clone(),
                    source: e,
                })
            }
        };

        parse_shared_credentials(&content, profile).ok_or_else(|| {
            CredentialError::ProfileNotFound {
                profile: profile.to_string(),
                path: path.clone(),
            }
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Look up `profile` in a shared credentials (INI) file.
///
/// Returns `None` if the section is missing or lacks a key pair.
fn parse_shared_credentials(content: &str, profile: &str) -> Option<AwsCredentials> {
    let mut in_section = false;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let section = section.trim();
            let name = section.strip_prefix("profile ").unwrap_or(section).trim();
            in_section = name == profile;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().to_string();
            match key.trim() {
                "aws_access_key_id" => access_key_id = Some(value),
                "aws_secret_access_key" => secret_access_key = Some(value),
                "aws_session_token" => session_token = Some(value),
                _ => {}
            }
        }
    }

    let mut signing = sigv4::Credentials::new(access_key_id?, secret_access_key?);
    signing.session_token = session_token;
    Some(AwsCredentials::new(signing))
}

/// JSON credentials file: `{"accessKeyId": .., "secretAccessKey": .., "sessionToken"?: ..}`.
/// A `region` key may be present and is ignored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsFile {
    #[serde(alias = "access_key_id")]
    access_key_id: String,
    #[serde(alias = "secret_access_key")]
    secret_access_key: String,
    #[serde(default, alias = "session_token")]
    session_token: Option<String>,
}

async fn credentials_file(path: &Path) -> Result<AwsCredentials, CredentialError> {
    let content = tokio::fs::read(path).await.map_err(|e| CredentialError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file: CredentialsFile =
        serde_json::from_slice(&content).map_err(|e| CredentialError::InvalidCredentialsFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut signing = sigv4::Credentials::new(file.access_key_id, file.secret_access_key);
    signing.session_token = file.session_token;
    Ok(AwsCredentials::new(signing))
}

// ---------------------------------------------------------------------------
// STS AssumeRole
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleEnvelope {
    assume_role_response: AssumeRoleResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    assume_role_result: AssumeRoleResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResult {
    credentials: StsCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    /// Epoch seconds in the JSON protocol; ISO 8601 is accepted too.
    expiration: serde_json::Value,
}

fn parse_expiration(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => Utc.timestamp_opt(n.as_f64()? as i64, 0).single(),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn assume_role_body(role_arn: &str, session_name: &str, duration_secs: u32) -> String {
    Serializer::new(String::new())
        .append_pair("Action", "AssumeRole")
        .append_pair("DurationSeconds", &duration_secs.to_string())
        .append_pair("RoleArn", role_arn)
        .append_pair("RoleSessionName", session_name)
        .append_pair("Version", STS_VERSION)
        .finish()
}

/// Exchange `primary` for temporary credentials scoped to `role_arn`.
///
/// The STS call uses a client built for it and signed with `primary`.
async fn assume_role(
    primary: &AwsCredentials,
    role_arn: &str,
    spec: &CredentialSpec,
    endpoints: &ServiceEndpoints,
) -> Result<AwsCredentials, CredentialError> {
    let session_name = spec
        .role_session_name
        .clone()
        .unwrap_or_else(|| format!("swagger-import-{}", uuid::Uuid::new_v4().simple()));
    let body = assume_role_body(
        role_arn,
        &session_name,
        spec.role_duration_secs.unwrap_or(DEFAULT_ROLE_DURATION_SECS),
    );

    let sts = client::http_client()?;
    let response = client::send_signed(
        &sts,
        primary.signing(),
        &spec.region,
        SignedRequest {
            service: "sts",
            method: Method::POST,
            base_url: &endpoints.sts_url(&spec.region),
            path: "/",
            query: None,
            content_type: "application/x-www-form-urlencoded; charset=utf-8",
            body: Bytes::from(body),
        },
    )
    .await?;

    let value = response
        .into_json()
        .map_err(CredentialError::AssumeRoleRejected)?;
    let envelope: AssumeRoleEnvelope = serde_json::from_value(value).map_err(|e| {
        CredentialError::AssumeRoleRejected(RemoteError {
            status: 200,
            error_type: Some("InvalidResponse".to_string()),
            message: format!("unexpected AssumeRole response: {}", e),
        })
    })?;

    let sts_creds = envelope.assume_role_response.assume_role_result.credentials;
    let signing = sigv4::Credentials::new(sts_creds.access_key_id, sts_creds.secret_access_key)
        .with_session_token(sts_creds.session_token);
    let mut credentials = AwsCredentials::new(signing);
    if let Some(expires_at) = parse_expiration(&sts_creds.expiration) {
        credentials = credentials.with_expiry(expires_at);
    }
    Ok(credentials)
}
