//! The per-target deployment pipeline.
//!
//! ```text
//! Start -> CredentialsResolved -> DescriptionLoaded -> Provisioned
//!       -> Deployed | SkippedDeployment -> Done
//! ```
//!
//! Any step may move to `Failed`, which is terminal. A pipeline is consumed by
//! [`DeploymentPipeline::run`] and cannot be resumed.

use std::fmt;

use bytes::Bytes;
use tracing::Instrument;

use crate::client::ResolvedClientContext;
use crate::config::TargetConfiguration;
use crate::credentials::CredentialResolver;
use crate::deploy::{StageDeployer, StageOutcome};
use crate::description::DescriptionLoader;
use crate::error::{PipelineError, StageError};
use crate::provision::{ApiProvisioner, ProvisionResult};

/// Pipeline states without their data, as recorded in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Start,
    CredentialsResolved,
    DescriptionLoaded,
    Provisioned,
    Deployed,
    SkippedDeployment,
    Done,
    Failed,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::Start => "start",
            StateKind::CredentialsResolved => "credentials_resolved",
            StateKind::DescriptionLoaded => "description_loaded",
            StateKind::Provisioned => "provisioned",
            StateKind::Deployed => "deployed",
            StateKind::SkippedDeployment => "skipped_deployment",
            StateKind::Done => "done",
            StateKind::Failed => "failed",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful outcome of one target's pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub target: String,
    pub provision: ProvisionResult,
    pub deployment: StageOutcome,
    /// States visited, `Start` through `Done`.
    pub states: Vec<StateKind>,
}

impl PipelineReport {
    /// Whether a stage deployment was performed.
    pub fn deployed(&self) -> bool {
        self.deployment.is_deployed()
    }
}

enum PipelineState {
    Start,
    CredentialsResolved {
        ctx: ResolvedClientContext,
    },
    DescriptionLoaded {
        ctx: ResolvedClientContext,
        payload: Bytes,
    },
    Provisioned {
        ctx: ResolvedClientContext,
        provision: ProvisionResult,
    },
    Deployed {
        provision: ProvisionResult,
        deployment: StageOutcome,
    },
    SkippedDeployment {
        provision: ProvisionResult,
    },
    Done {
        provision: ProvisionResult,
        deployment: StageOutcome,
    },
    Failed {
        error: StageError,
        provisioned: Option<ProvisionResult>,
    },
}

impl PipelineState {
    fn kind(&self) -> StateKind {
        match self {
            PipelineState::Start => StateKind::Start,
            PipelineState::CredentialsResolved { .. } => StateKind::CredentialsResolved,
            PipelineState::DescriptionLoaded { .. } => StateKind::DescriptionLoaded,
            PipelineState::Provisioned { .. } => StateKind::Provisioned,
            PipelineState::Deployed { .. } => StateKind::Deployed,
            PipelineState::SkippedDeployment { .. } => StateKind::SkippedDeployment,
            PipelineState::Done { .. } => StateKind::Done,
            PipelineState::Failed { .. } => StateKind::Failed,
        }
    }

    fn failed(error: impl Into<StageError>, provisioned: Option<ProvisionResult>) -> Self {
        PipelineState::Failed {
            error: error.into(),
            provisioned,
        }
    }
}

/// Runs one [`TargetConfiguration`] through credentials, description,
/// provisioning and deployment.
pub struct DeploymentPipeline {
    target: TargetConfiguration,
    resolver: CredentialResolver,
}

impl DeploymentPipeline {
    /// Pipeline using credentials discovered from the process environment.
    pub fn new(target: TargetConfiguration) -> Self {
        Self::with_resolver(target, CredentialResolver::new())
    }

    pub fn with_resolver(target: TargetConfiguration, resolver: CredentialResolver) -> Self {
        Self { target, resolver }
    }

    /// Drive the pipeline to `Done` or `Failed`.
    pub async fn run(self) -> Result<PipelineReport, PipelineError> {
        let span = tracing::info_span!("pipeline", target = %self.target.name);
        self.drive().instrument(span).await
    }

    async fn drive(self) -> Result<PipelineReport, PipelineError> {
        swagger_import_telemetry::log_pipeline_started!(
            source = %self.target.description_source.describe(),
            update = self.target.update.is_some(),
            deployment = self.target.deployment.is_some(),
            "pipeline started"
        );

        let mut states = Vec::new();
        let mut state = PipelineState::Start;
        loop {
            states.push(state.kind());
            state = match state {
                PipelineState::Done {
                    provision,
                    deployment,
                } => {
                    swagger_import_telemetry::log_pipeline_completed!(
                        rest_api_id = %provision.id,
                        deployed = deployment.is_deployed(),
                        "pipeline completed"
                    );
                    return Ok(PipelineReport {
                        target: self.target.name,
                        provision,
                        deployment,
                        states,
                    });
                }
                PipelineState::Failed { error, provisioned } => {
                    swagger_import_telemetry::log_pipeline_failed!(
                        stage = error.stage().as_str(),
                        error = %error,
                        provisioned = provisioned.as_ref().map(|p| p.id.as_str()),
                        "pipeline failed"
                    );
                    return Err(PipelineError {
                        target: self.target.name,
                        error,
                        provisioned,
                        states,
                    });
                }
                other => self.advance(other).await,
            };
        }
    }

    /// Run the step leaving `state`.
    async fn advance(&self, state: PipelineState) -> PipelineState {
        let target = &self.target;
        match state {
            PipelineState::Start => {
                // An unusable update id fails here, before any remote call.
                if let Err(e) = ApiProvisioner::check(target.update.as_ref()) {
                    return PipelineState::failed(e, None);
                }
                match self
                    .resolver
                    .resolve(&target.credentials, &target.endpoints)
                    .await
                {
                    Ok(ctx) => PipelineState::CredentialsResolved { ctx },
                    Err(e) => PipelineState::failed(e, None),
                }
            }
            PipelineState::CredentialsResolved { ctx } => {
                match DescriptionLoader::load(&target.description_source).await {
                    Ok(payload) => {
                        swagger_import_telemetry::log_description_loaded!(
                            source = %target.description_source.describe(),
                            bytes = payload.len(),
                            "description loaded"
                        );
                        PipelineState::DescriptionLoaded { ctx, payload }
                    }
                    Err(e) => PipelineState::failed(e, None),
                }
            }
            PipelineState::DescriptionLoaded { ctx, payload } => {
                match ApiProvisioner::provision(&ctx, payload, target.update.as_ref()).await {
                    Ok(provision) => PipelineState::Provisioned { ctx, provision },
                    Err(e) => PipelineState::failed(e, None),
                }
            }
            PipelineState::Provisioned { ctx, provision } => match &target.deployment {
                None => {
                    swagger_import_telemetry::log_deployment_skipped!(
                        rest_api_id = %provision.id,
                        "no deployment configured"
                    );
                    PipelineState::SkippedDeployment { provision }
                }
                Some(spec) => {
                    let bound = spec.bound_to(&provision.id);
                    match StageDeployer::deploy(&ctx, Some(&bound)).await {
                        Ok(deployment) => PipelineState::Deployed {
                            provision,
                            deployment,
                        },
                        Err(e) => PipelineState::failed(e, Some(provision)),
                    }
                }
            },
            PipelineState::Deployed {
                provision,
                deployment,
            } => PipelineState::Done {
                provision,
                deployment,
            },
            PipelineState::SkippedDeployment { provision } => PipelineState::Done {
                provision,
                deployment: StageOutcome::Skipped,
            },
            terminal @ (PipelineState::Done { .. } | PipelineState::Failed { .. }) => terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CredentialSpec, ServiceEndpoints, UpdateMode, UpdateSpec};
    use crate::credentials::AmbientEnvironment;
    use crate::description::DescriptionSource;
    use crate::error::{CredentialError, ProvisionError, Stage};
    use std::path::PathBuf;

    fn target(update: Option<UpdateSpec>) -> TargetConfiguration {
        TargetConfiguration {
            name: "default".to_string(),
            credentials: CredentialSpec::default(),
            endpoints: ServiceEndpoints {
                apigateway: Some("http://127.0.0.1:1".to_string()),
                sts: Some("http://127.0.0.1:1".to_string()),
            },
            update,
            deployment: None,
            description_source: DescriptionSource::File(PathBuf::from("api.json")),
        }
    }

    fn no_credentials() -> CredentialResolver {
        CredentialResolver::with_ambient(AmbientEnvironment::empty())
    }

    #[tokio::test]
    async fn test_empty_update_id_fails_before_credentials() {
        let update = UpdateSpec {
            rest_api_id: String::new(),
            mode: UpdateMode::Overwrite,
        };
        let err = DeploymentPipeline::with_resolver(target(Some(update)), no_credentials())
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Provision);
        assert!(matches!(
            err.error,
            StageError::Provision(ProvisionError::MissingTargetId)
        ));
        assert_eq!(err.states, vec![StateKind::Start, StateKind::Failed]);
        assert!(!err.is_partial());
    }

    #[tokio::test]
    async fn test_unresolvable_credentials_fail_at_credentials_stage() {
        let err = DeploymentPipeline::with_resolver(target(None), no_credentials())
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Credentials);
        assert!(matches!(
            err.error,
            StageError::Credentials(CredentialError::NoCredentials)
        ));
        assert_eq!(err.target, "default");
    }

    #[tokio::test]
    async fn test_missing_description_fails_at_description_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = target(None);
        config.credentials.access_key_id = Some("AKID".to_string());
        config.credentials.secret_access_key = Some("secret".to_string());
        config.description_source = DescriptionSource::File(dir.path().join("missing.json"));

        let err = DeploymentPipeline::with_resolver(config, no_credentials())
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Description);
        assert_eq!(
            err.states,
            vec![
                StateKind::Start,
                StateKind::CredentialsResolved,
                StateKind::Failed
            ]
        );
    }

    #[test]
    fn test_state_kind_names() {
        assert_eq!(StateKind::SkippedDeployment.to_string(), "skipped_deployment");
        assert_eq!(StateKind::CredentialsResolved.as_str(), "credentials_resolved");
    }
}
