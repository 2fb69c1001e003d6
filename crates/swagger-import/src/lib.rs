//! Swagger import deployment pipeline.
//!
//! Imports an API description into AWS API Gateway (or updates an existing
//! REST API in place) and optionally deploys it to a stage, once per named
//! target. The `swagger-import` binary drives it from a task file.

pub mod client;
pub mod config;
pub mod credentials;
pub mod deploy;
pub mod description;
pub mod error;
pub mod pipeline;
pub mod provision;
pub mod runner;
pub mod secrets;

pub use client::ResolvedClientContext;
pub use config::{
    CredentialSpec, DeploymentSpec, ServiceEndpoints, TargetConfiguration, TaskConfig, UpdateMode,
    UpdateSpec,
};
pub use credentials::{AmbientEnvironment, AwsCredentials, CredentialResolver, IdentitySource};
pub use deploy::{DeploymentRecord, StageDeployer, StageOutcome};
pub use description::{DescriptionLoader, DescriptionSource};
pub use error::{
    ConfigError, CredentialError, DeploymentError, DescriptionLoadError, PipelineError,
    ProvisionError, RemoteError, Stage, StageError, TransportError,
};
pub use pipeline::{DeploymentPipeline, PipelineReport, StateKind};
pub use provision::{ApiProvisioner, ProvisionResult};
pub use runner::{run_targets, run_targets_with, RunMode, RunSummary};
