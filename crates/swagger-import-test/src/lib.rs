//! Test harness for swagger-import.
//!
//! [`MockAws`] stands in for both STS and API Gateway on one local
//! `wiremock` server, and [`Scratch`] holds the on-disk fixtures a target
//! needs (description files, credential files).

#[cfg(test)]
mod scenarios;

use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;
use thiserror::Error;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use swagger_import::{
    AmbientEnvironment, CredentialResolver, CredentialSpec, DescriptionSource, ServiceEndpoints,
    TargetConfiguration,
};

/// Access key id of the static credentials in [`MockAws::target`].
pub const STATIC_ACCESS_KEY_ID: &str = "AKIDSTATICEXAMPLE";

/// Errors from harness operations.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fake STS + API Gateway.
pub struct MockAws {
    server: MockServer,
}

impl MockAws {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Endpoints sending both services to this server.
    pub fn endpoints(&self) -> ServiceEndpoints {
        ServiceEndpoints {
            apigateway: Some(self.uri()),
            sts: Some(self.uri()),
        }
    }

    /// A target with static credentials, no update and no deployment.
    pub fn target(&self, name: &str, source: DescriptionSource) -> TargetConfiguration {
        TargetConfiguration {
            name: name.to_string(),
            credentials: CredentialSpec {
                access_key_id: Some(STATIC_ACCESS_KEY_ID.to_string()),
                secret_access_key: Some("static-secret".to_string()),
                ..CredentialSpec::default()
            },
            endpoints: self.endpoints(),
            update: None,
            deployment: None,
            description_source: source,
        }
    }

    // -- API Gateway ---------------------------------------------------------

    /// `ImportRestApi` succeeds with `id`.
    pub async fn mock_import(&self, id: &str, name: &str) {
        Mock::given(method("POST"))
            .and(path("/restapis"))
            .and(query_param("mode", "import"))
            .and(query_param("failonwarnings", "true"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": id,
                "name": name,
                "createdDate": 1_704_067_200,
                "warnings": []
            })))
            .mount(&self.server)
            .await;
    }

    /// `ImportRestApi` answers 2xx but lists warnings.
    pub async fn mock_import_with_warnings(&self, id: &str, warnings: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/restapis"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": id,
                "warnings": warnings
            })))
            .mount(&self.server)
            .await;
    }

    /// `PutRestApi` on `id` succeeds for the given mode.
    pub async fn mock_put(&self, id: &str, mode: &str) {
        Mock::given(method("PUT"))
            .and(path(format!("/restapis/{}", id)))
            .and(query_param("mode", mode))
            .and(query_param("failonwarnings", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "name": "updated",
                "warnings": []
            })))
            .mount(&self.server)
            .await;
    }

    /// `CreateDeployment` on `rest_api_id` succeeds with `deployment_id`.
    pub async fn mock_deployment(&self, rest_api_id: &str, deployment_id: &str) {
        self.mock_deployment_body(
            rest_api_id,
            json!({
                "id": deployment_id,
                "createdDate": 1_704_067_200
            }),
        )
        .await;
    }

    /// CreateDeployment answers 201 with `body`.
    pub async fn mock_deployment_body(&self, rest_api_id: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/restapis/{}/deployments", rest_api_id)))
            .respond_with(ResponseTemplate::new(201).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// `verb path` fails with an API Gateway REST-JSON error.
    pub async fn mock_rejection(&self, verb: &str, route: &str, status: u16, error_type: &str, message: &str) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(status)
                    .insert_header("x-amzn-ErrorType", format!("{}:http://internal.amazon.com/coral/com.amazonaws.backplane.controlplane/", error_type))
                    .set_body_json(json!({ "message": message })),
            )
            .mount(&self.server)
            .await;
    }

    // -- STS ---------------------------------------------------------------

    /// `AssumeRole` returns temporary credentials.
    pub async fn mock_assume_role(&self, access_key_id: &str, session_token: &str) {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("Action=AssumeRole"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AssumeRoleResponse": {
                    "AssumeRoleResult": {
                        "AssumedRoleUser": {
                            "Arn": "arn:aws:sts::123456789012:assumed-role/deployer/swagger-import",
                            "AssumedRoleId": "AROA3XFRBF535PLBIFPI4:swagger-import"
                        },
                        "Credentials": {
                            "AccessKeyId": access_key_id,
                            "SecretAccessKey": "temporary-secret",
                            "SessionToken": session_token,
                            "Expiration": 1_704_070_800.0
                        }
                    },
                    "ResponseMetadata": { "RequestId": "c6104cbe-af31-11e0-8154-cbc7ccf896c7" }
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// `AssumeRole` is denied.
    pub async fn mock_assume_role_denied(&self) {
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "Error": {
                    "Code": "AccessDenied",
                    "Message": "User is not authorized to perform: sts:AssumeRole",
                    "Type": "Sender"
                },
                "RequestId": "c6104cbe-af31-11e0-8154-cbc7ccf896c7"
            })))
            .mount(&self.server)
            .await;
    }

    // -- Inspection ----------------------------------------------------------

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests matching `verb` and exact `route`.
    pub async fn requests_to(&self, verb: &str, route: &str) -> Vec<Request> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method.as_str() == verb && r.url.path() == route)
            .collect()
    }
}

/// Access key id from a SigV4 `authorization` header.
pub fn signing_key_id(request: &Request) -> Option<String> {
    let auth = request.headers.get("authorization")?.to_str().ok()?;
    let credential = auth.split("Credential=").nth(1)?;
    credential.split('/').next().map(str::to_string)
}

/// SigV4 service name (`sts`, `apigateway`) from the credential scope.
pub fn signing_service(request: &Request) -> Option<String> {
    let auth = request.headers.get("authorization")?.to_str().ok()?;
    let scope = auth.split("Credential=").nth(1)?.split(',').next()?;
    scope.split('/').nth(3).map(str::to_string)
}

/// Request body as JSON.
pub fn body_json(request: &Request) -> Result<Value, TestError> {
    Ok(serde_json::from_slice(&request.body)?)
}

/// A resolver that sees no ambient credentials.
pub fn isolated_resolver() -> CredentialResolver {
    CredentialResolver::with_ambient(AmbientEnvironment::empty())
}

/// Temporary directory for fixture files.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new() -> Result<Self, TestError> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Write `content` to `name` and return its path.
    pub fn write(&self, name: &str, content: impl AsRef<[u8]>) -> Result<PathBuf, TestError> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Write a shared credentials file with one profile per `(name, key id)`.
    pub fn credentials_file(&self, profiles: &[(&str, &str)]) -> Result<PathBuf, TestError> {
        let content: String = profiles
            .iter()
            .map(|(profile, key_id)| {
                format!(
                    "[{}]\naws_access_key_id = {}\naws_secret_access_key = {}-secret\n\n",
                    profile, key_id, profile
                )
            })
            .collect();
        self.write("credentials", content)
    }
}
