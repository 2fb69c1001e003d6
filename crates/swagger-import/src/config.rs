//! Task file (`swagger-import.yaml`) parsing and per-target resolution.
//!
//! A task file declares shared `options` and named `targets`. Each target is
//! resolved into an immutable [`TargetConfiguration`]: target options override
//! task options field by field, secret references are resolved, and the
//! swagger source is turned into a [`DescriptionSource`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;

use crate::description::DescriptionSource;
use crate::error::ConfigError;
use crate::secrets::{resolve_optional, resolve_value};

/// Region used when neither the task nor the target sets one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default task file name.
pub const DEFAULT_TASK_FILE: &str = "swagger-import.yaml";

/// Fully-resolved settings for one target.
#[derive(Debug, Clone)]
pub struct TargetConfiguration {
    pub name: String,
    pub credentials: CredentialSpec,
    pub endpoints: ServiceEndpoints,
    /// Present: update an existing API. Absent: import a new one.
    pub update: Option<UpdateSpec>,
    /// Present: create a deployment after provisioning.
    pub deployment: Option<DeploymentSpec>,
    pub description_source: DescriptionSource,
}

/// Where the identity used to sign requests comes from.
///
/// First match wins: `profile`, then the key pair, then `credentials_file_path`,
/// then ambient discovery. `assume_role_arn` is layered on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSpec {
    pub profile: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub credentials_file_path: Option<PathBuf>,
    pub assume_role_arn: Option<String>,
    pub role_session_name: Option<String>,
    pub role_duration_secs: Option<u32>,
    pub region: String,
}

impl Default for CredentialSpec {
    fn default() -> Self {
        Self {
            profile: None,
            access_key_id: None,
            secret_access_key: None,
            credentials_file_path: None,
            assume_role_arn: None,
            role_session_name: None,
            role_duration_secs: None,
            region: DEFAULT_REGION.to_string(),
        }
    }
}

/// Service endpoint overrides (VPC endpoints, LocalStack, tests).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceEndpoints {
    #[serde(default, alias = "apiGateway", alias = "api_gateway")]
    pub apigateway: Option<String>,
    #[serde(default)]
    pub sts: Option<String>,
}

impl ServiceEndpoints {
    /// Base URL for API Gateway calls.
    pub fn apigateway_url(&self, region: &str) -> String {
        match &self.apigateway {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://apigateway.{}.amazonaws.com", region),
        }
    }

    /// Base URL for STS calls.
    pub fn sts_url(&self, region: &str) -> String {
        match &self.sts {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://sts.{}.amazonaws.com", region),
        }
    }

    fn or(self, base: &ServiceEndpoints) -> ServiceEndpoints {
        ServiceEndpoints {
            apigateway: self.apigateway.or_else(|| base.apigateway.clone()),
            sts: self.sts.or_else(|| base.sts.clone()),
        }
    }
}

/// How an existing API is updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Replace the API definition with the payload.
    #[default]
    Overwrite,
    /// Merge the payload into the existing definition.
    Merge,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Overwrite => "overwrite",
            UpdateMode::Merge => "merge",
        }
    }
}

/// Update an existing REST API in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSpec {
    /// May be empty here; the provisioning pre-flight rejects it.
    pub rest_api_id: String,
    pub mode: UpdateMode,
}

/// Stage deployment settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSpec {
    pub stage_name: String,
    pub cache_cluster_enabled: Option<bool>,
    pub cache_cluster_size: Option<String>,
    pub description: Option<String>,
    pub stage_description: Option<String>,
    rest_api_id: Option<String>,
}

impl DeploymentSpec {
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            cache_cluster_enabled: None,
            cache_cluster_size: None,
            description: None,
            stage_description: None,
            rest_api_id: None,
        }
    }

    pub fn with_cache_cluster(mut self, enabled: bool, size: Option<&str>) -> Self {
        self.cache_cluster_enabled = Some(enabled);
        self.cache_cluster_size = size.map(str::to_string);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_stage_description(mut self, description: impl Into<String>) -> Self {
        self.stage_description = Some(description.into());
        self
    }

    /// Copy of this spec targeting `rest_api_id`. Any previously bound id is
    /// replaced.
    pub fn bound_to(&self, rest_api_id: &str) -> Self {
        Self {
            rest_api_id: Some(rest_api_id.to_string()),
            ..self.clone()
        }
    }

    /// The id bound by [`DeploymentSpec::bound_to`]; never read from a task file.
    pub fn rest_api_id(&self) -> Option<&str> {
        self.rest_api_id.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Task file
// ---------------------------------------------------------------------------

/// `options` block, at task or target level.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawOptions {
    profile: Option<String>,
    #[serde(alias = "accessKeyId")]
    access_key_id: Option<String>,
    #[serde(alias = "secretAccessKey")]
    secret_access_key: Option<String>,
    #[serde(alias = "credentialsJSON", alias = "credentials_file_path")]
    credentials_file: Option<String>,
    #[serde(alias = "assumeRoleArn", alias = "role_arn")]
    assume_role_arn: Option<String>,
    #[serde(alias = "roleSessionName")]
    role_session_name: Option<String>,
    #[serde(alias = "roleDurationSecs")]
    role_duration_secs: Option<u32>,
    region: Option<String>,
    #[serde(default)]
    endpoints: ServiceEndpoints,
}

impl RawOptions {
    /// Field-by-field override: values set here win over `base`.
    fn merged_over(self, base: &RawOptions) -> RawOptions {
        RawOptions {
            profile: self.profile.or_else(|| base.profile.clone()),
            access_key_id: self.access_key_id.or_else(|| base.access_key_id.clone()),
            secret_access_key: self
                .secret_access_key
                .or_else(|| base.secret_access_key.clone()),
            credentials_file: self
                .credentials_file
                .or_else(|| base.credentials_file.clone()),
            assume_role_arn: self.assume_role_arn.or_else(|| base.assume_role_arn.clone()),
            role_session_name: self
                .role_session_name
                .or_else(|| base.role_session_name.clone()),
            role_duration_secs: self.role_duration_secs.or(base.role_duration_secs),
            region: self.region.or_else(|| base.region.clone()),
            endpoints: self.endpoints.or(&base.endpoints),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawTarget {
    #[serde(default)]
    options: RawOptions,
    update: Option<RawUpdate>,
    deployment: Option<RawDeployment>,
    #[serde(alias = "swagger_config", alias = "swaggerConfig")]
    swagger: Option<YamlValue>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawUpdate {
    #[serde(default, alias = "restApiId", deserialize_with = "scalar_string")]
    rest_api_id: Option<String>,
    #[serde(default)]
    mode: UpdateMode,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDeployment {
    #[serde(alias = "stageName")]
    stage_name: Option<String>,
    #[serde(alias = "cacheClusterEnabled")]
    cache_cluster_enabled: Option<bool>,
    #[serde(alias = "cacheClusterSize")]
    cache_cluster_size: Option<String>,
    description: Option<String>,
    #[serde(alias = "stageDescription")]
    stage_description: Option<String>,
}

/// Accept an unquoted number or boolean where a string is expected
/// (`rest_api_id: 1234567890`).
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<YamlValue>::deserialize(deserializer)? {
        None | Some(YamlValue::Null) => Ok(None),
        Some(YamlValue::String(s)) => Ok(Some(s)),
        Some(YamlValue::Number(n)) => Ok(Some(n.to_string())),
        Some(YamlValue::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string, got {}",
            yaml_kind(&other)
        ))),
    }
}

fn yaml_kind(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a boolean",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a sequence",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}

/// Convert an inline YAML document to JSON.
///
/// YAML allows any value as a mapping key; swagger documents routinely write
/// response codes unquoted (`200:`). Scalar keys become their string form;
/// sequence, mapping and tagged keys are rejected.
fn yaml_to_json(value: YamlValue) -> Result<JsonValue, String> {
    Ok(match value {
        YamlValue::Null => JsonValue::Null,
        YamlValue::Bool(b) => JsonValue::Bool(b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::from(i)
            } else if let Some(u) = n.as_u64() {
                JsonValue::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(JsonValue::Number)
                    .ok_or_else(|| format!("number {} has no JSON representation", n))?
            }
        }
        YamlValue::String(s) => JsonValue::String(s),
        YamlValue::Sequence(items) => JsonValue::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<_, _>>()?,
        ),
        YamlValue::Mapping(mapping) => {
            let mut object = serde_json::Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = match key {
                    YamlValue::String(s) => s,
                    YamlValue::Number(n) => n.to_string(),
                    YamlValue::Bool(b) => b.to_string(),
                    YamlValue::Null => "null".to_string(),
                    other => return Err(format!("mapping keys must be scalars, got {}", yaml_kind(&other))),
                };
                object.insert(key, yaml_to_json(value)?);
            }
            JsonValue::Object(object)
        }
        YamlValue::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

#[derive(Debug, Deserialize)]
struct TaskFile {
    #[serde(default)]
    options: RawOptions,
    #[serde(default)]
    targets: serde_yaml::Mapping,
}

/// A parsed task file. Targets are resolved on demand.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    path: PathBuf,
    options: RawOptions,
    targets: Vec<(String, RawTarget)>,
}

impl TaskConfig {
    /// Load a task file (YAML or JSON).
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse task file content. `path` anchors relative file references.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let file: TaskFile = serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))?;

        let mut targets = Vec::with_capacity(file.targets.len());
        for (key, value) in file.targets {
            let name = match key {
                serde_yaml::Value::String(name) => name,
                other => {
                    return Err(parse_error(format!(
                        "target names must be strings, got {:?}",
                        other
                    )))
                }
            };
            let target: RawTarget = serde_yaml::from_value(value)
                .map_err(|e| parse_error(format!("target '{}': {}", name, e)))?;
            targets.push((name, target));
        }

        if targets.is_empty() {
            return Err(ConfigError::NoTargets(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            options: file.options,
            targets,
        })
    }

    /// Target names in file order.
    pub fn target_names(&self) -> Vec<&str> {
        self.targets.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Resolve the selected targets, or every target when `selection` is empty.
    pub fn targets(&self, selection: &[String]) -> Result<Vec<TargetConfiguration>, ConfigError> {
        if selection.is_empty() {
            return self
                .targets
                .iter()
                .map(|(name, raw)| self.resolve(name, raw))
                .collect();
        }

        selection.iter().map(|name| self.target(name)).collect()
    }

    /// Resolve one target by name.
    pub fn target(&self, name: &str) -> Result<TargetConfiguration, ConfigError> {
        let (name, raw) = self
            .targets
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))?;
        self.resolve(name, raw)
    }

    fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    fn resolve(&self, name: &str, raw: &RawTarget) -> Result<TargetConfiguration, ConfigError> {
        let secret = |value: Option<&String>| {
            resolve_optional(value.map(String::as_str)).map_err(|source| ConfigError::Secret {
                target: name.to_string(),
                source,
            })
        };

        let options = raw.options.clone().merged_over(&self.options);

        let credentials = CredentialSpec {
            profile: secret(options.profile.as_ref())?,
            access_key_id: secret(options.access_key_id.as_ref())?,
            secret_access_key: secret(options.secret_access_key.as_ref())?,
            credentials_file_path: secret(options.credentials_file.as_ref())?
                .map(|p| self.base_dir().join(p)),
            assume_role_arn: secret(options.assume_role_arn.as_ref())?,
            role_session_name: secret(options.role_session_name.as_ref())?,
            role_duration_secs: options.role_duration_secs,
            region: secret(options.region.as_ref())?.unwrap_or_else(|| DEFAULT_REGION.to_string()),
        };

        let update = match &raw.update {
            None => None,
            Some(update) => Some(UpdateSpec {
                rest_api_id: secret(update.rest_api_id.as_ref())?.unwrap_or_default(),
                mode: update.mode,
            }),
        };

        let deployment = match &raw.deployment {
            None => None,
            Some(deployment) => {
                let stage_name =
                    secret(deployment.stage_name.as_ref())?.ok_or_else(|| {
                        ConfigError::MissingField {
                            target: name.to_string(),
                            field: "deployment.stage_name",
                        }
                    })?;
                Some(DeploymentSpec {
                    stage_name,
                    cache_cluster_enabled: deployment.cache_cluster_enabled,
                    cache_cluster_size: secret(deployment.cache_cluster_size.as_ref())?,
                    description: secret(deployment.description.as_ref())?,
                    stage_description: secret(deployment.stage_description.as_ref())?,
                    rest_api_id: None,
                })
            }
        };

        let swagger = raw.swagger.clone().ok_or_else(|| ConfigError::MissingField {
            target: name.to_string(),
            field: "swagger",
        })?;
        let swagger = yaml_to_json(swagger).map_err(|message| ConfigError::Parse {
            path: self.path.clone(),
            message: format!("target '{}': swagger: {}", name, message),
        })?;
        let description_source =
            DescriptionSource::from_value(swagger, self.base_dir()).map_err(|source| {
                ConfigError::Description {
                    target: name.to_string(),
                    source,
                }
            })?;

        Ok(TargetConfiguration {
            name: name.to_string(),
            credentials,
            endpoints: options.endpoints,
            update,
            deployment,
            description_source,
        })
    }
}
