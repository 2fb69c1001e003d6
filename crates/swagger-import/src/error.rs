use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::StateKind;
use crate::provision::ProvisionResult;
use crate::secrets::SecretsError;

/// A rejection returned by an AWS service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP status of the response.
    pub status: u16,
    /// AWS error code (`BadRequestException`, `AccessDenied`, ...), when reported.
    pub error_type: Option<String>,
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_type {
            Some(error_type) => write!(f, "{} ({}): {}", error_type, self.status, self.message),
            None => write!(f, "HTTP {}: {}", self.status, self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// The request never produced a service response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint URL '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors in the task file or in a target's settings, detected before any I/O
/// against AWS.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("target '{target}': missing required field '{field}'")]
    MissingField { target: String, field: &'static str },

    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    #[error("no targets defined in {}", .0.display())]
    NoTargets(PathBuf),

    #[error("target '{target}': {source}")]
    Secret {
        target: String,
        #[source]
        source: SecretsError,
    },

    #[error("target '{target}': invalid swagger source: {source}")]
    Description {
        target: String,
        #[source]
        source: DescriptionLoadError,
    },
}

/// Errors while turning a credential spec into signing credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no AWS credentials found (profile, access key pair, credentials file or environment)")]
    NoCredentials,

    #[error("profile '{profile}' not found in {}", .path.display())]
    ProfileNotFound { profile: String, path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid credentials file {}: {message}", .path.display())]
    InvalidCredentialsFile { path: PathBuf, message: String },

    #[error("role assumption rejected: {0}")]
    AssumeRoleRejected(RemoteError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors while loading the API description payload.
#[derive(Debug, Error)]
pub enum DescriptionLoadError {
    #[error("description file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("description source must be a file path or an object, got {0}")]
    InvalidSourceType(&'static str),

    #[error("failed to serialize inline description: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors while importing or updating the REST API.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("update requested without a rest_api_id")]
    MissingTargetId,

    #[error("invalid rest_api_id '{0}': expected an alphanumeric API Gateway id")]
    InvalidTargetId(String),

    #[error("API Gateway rejected the description: {0}")]
    RemoteRejected(RemoteError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors while creating a stage deployment.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("deployment has no rest_api_id bound")]
    MissingRestApiId,

    #[error("API Gateway rejected the deployment: {0}")]
    RemoteRejected(RemoteError),

    #[error("failed to encode deployment request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Pipeline step at which a target failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Configuration,
    Credentials,
    Description,
    Provision,
    Deploy,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configuration => "configuration",
            Stage::Credentials => "credentials",
            Stage::Description => "description",
            Stage::Provision => "provision",
            Stage::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The cause of a pipeline failure, tagged by the step that produced it.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Description(#[from] DescriptionLoadError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Deploy(#[from] DeploymentError),
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Configuration(_) => Stage::Configuration,
            StageError::Credentials(_) => Stage::Credentials,
            StageError::Description(_) => Stage::Description,
            StageError::Provision(_) => Stage::Provision,
            StageError::Deploy(_) => Stage::Deploy,
        }
    }
}

/// Terminal failure of one target's pipeline.
#[derive(Debug, Error)]
#[error("target '{}' failed at {} stage: {}", .target, .error.stage(), .error)]
pub struct PipelineError {
    pub target: String,
    #[source]
    pub error: StageError,
    /// Set when the API was provisioned before the failure. The remote
    /// change is left in place.
    pub provisioned: Option<ProvisionResult>,
    /// States visited before the failure, in order.
    pub states: Vec<StateKind>,
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        self.error.stage()
    }

    /// True when the API was provisioned but a later step failed.
    pub fn is_partial(&self) -> bool {
        self.provisioned.is_some()
    }
}
