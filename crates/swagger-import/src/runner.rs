//! Driving several targets, one fresh pipeline each.

use futures_util::future::join_all;

use crate::config::{TargetConfiguration, TaskConfig};
use crate::credentials::{AmbientEnvironment, CredentialResolver};
use crate::description::DescriptionLoader;
use crate::error::{PipelineError, StageError};
use crate::pipeline::{DeploymentPipeline, PipelineReport};
use crate::provision::ApiProvisioner;

/// How to schedule multiple targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// One target after another, in input order.
    #[default]
    Sequential,
    /// All targets at once on the current task.
    Concurrent,
}

pub type TargetResult = Result<PipelineReport, PipelineError>;

/// Run every target with credentials discovered from the process environment.
pub async fn run_targets(targets: Vec<TargetConfiguration>, mode: RunMode) -> Vec<TargetResult> {
    run_targets_with(targets, mode, AmbientEnvironment::from_process()).await
}

/// Run every target against an explicit ambient environment.
///
/// Results are in input order. A failed target never stops the others.
pub async fn run_targets_with(
    targets: Vec<TargetConfiguration>,
    mode: RunMode,
    ambient: AmbientEnvironment,
) -> Vec<TargetResult> {
    let pipelines = targets.into_iter().map(|target| {
        DeploymentPipeline::with_resolver(target, CredentialResolver::with_ambient(ambient.clone()))
    });

    match mode {
        RunMode::Sequential => {
            let mut results = Vec::new();
            for pipeline in pipelines {
                results.push(pipeline.run().await);
            }
            results
        }
        RunMode::Concurrent => join_all(pipelines.map(DeploymentPipeline::run)).await,
    }
}

/// Every check a run makes before contacting AWS.
///
/// Returns the payload size.
pub async fn check_target(target: &TargetConfiguration) -> Result<usize, StageError> {
    ApiProvisioner::check(target.update.as_ref())?;
    let payload = DescriptionLoader::load(&target.description_source).await?;
    Ok(payload.len())
}

/// [`check_target`] for a named target of `task`. Resolution failures
/// (unknown name, unresolvable secret reference) are configuration-stage
/// errors.
pub async fn check_task_target(task: &TaskConfig, name: &str) -> Result<usize, StageError> {
    let target = task.target(name)?;
    check_target(&target).await
}

/// Counts over a batch of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub deployed: usize,
    pub failed: usize,
    /// Failures that left a provisioned API behind.
    pub partial: usize,
}

impl RunSummary {
    pub fn from_results(results: &[TargetResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            match result {
                Ok(report) => {
                    summary.succeeded += 1;
                    if report.deployed() {
                        summary.deployed += 1;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    if e.is_partial() {
                        summary.partial += 1;
                    }
                }
            }
            summary
        })
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// One line per target for the operator.
pub fn describe_result(result: &TargetResult) -> String {
    match result {
        Ok(report) => match report.deployment.record() {
            Some(record) => format!(
                "{}: ok, rest api {} deployed to stage '{}' (deployment {})",
                report.target, report.provision.id, record.stage_name, record.id
            ),
            None => format!(
                "{}: ok, rest api {} (no deployment)",
                report.target, report.provision.id
            ),
        },
        Err(e) => match &e.provisioned {
            Some(provisioned) => format!("{} (rest api {} was provisioned)", e, provisioned.id),
            None => e.to_string(),
        },
    }
}
