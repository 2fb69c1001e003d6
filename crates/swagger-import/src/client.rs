//! Signed HTTP plumbing shared by the STS and API Gateway calls.

use bytes::Bytes;
use reqwest::{Method, Url};
use serde_json::Value;
use swagger_import_sigv4 as sigv4;

use crate::config::ServiceEndpoints;
use crate::credentials::{AwsCredentials, IdentitySource};
use crate::error::{RemoteError, TransportError};

/// API Gateway API version the requests are written against.
pub const API_GATEWAY_VERSION: &str = "2015-07-09";

const USER_AGENT: &str = concat!(
    "swagger-import/",
    env!("CARGO_PKG_VERSION"),
    " apigateway/2015-07-09"
);

/// Authenticated access to API Gateway for one pipeline run.
///
/// Owns its credentials, region and HTTP client; nothing here is shared with
/// other runs or stored in process-wide state.
#[derive(Debug)]
pub struct ResolvedClientContext {
    credentials: AwsCredentials,
    identity: IdentitySource,
    region: String,
    endpoints: ServiceEndpoints,
    http: reqwest::Client,
}

impl ResolvedClientContext {
    pub fn new(
        credentials: AwsCredentials,
        identity: IdentitySource,
        region: impl Into<String>,
        endpoints: ServiceEndpoints,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            credentials,
            identity,
            region: region.into(),
            endpoints,
            http: http_client()?,
        })
    }

    pub fn credentials(&self) -> &AwsCredentials {
        &self.credentials
    }

    pub fn identity(&self) -> &IdentitySource {
        &self.identity
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn api_version(&self) -> &'static str {
        API_GATEWAY_VERSION
    }

    /// Send a signed JSON request to API Gateway.
    pub(crate) async fn apigateway(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Bytes,
    ) -> Result<RemoteResponse, TransportError> {
        send_signed(
            &self.http,
            self.credentials.signing(),
            &self.region,
            SignedRequest {
                service: "apigateway",
                method,
                base_url: &self.endpoints.apigateway_url(&self.region),
                path,
                query,
                content_type: "application/json",
                body,
            },
        )
        .await
    }
}

/// Build the HTTP client used for one run. Timeouts are reqwest's defaults.
pub(crate) fn http_client() -> Result<reqwest::Client, TransportError> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

/// One request to sign and send.
pub(crate) struct SignedRequest<'a> {
    pub service: &'a str,
    pub method: Method,
    pub base_url: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub content_type: &'a str,
    pub body: Bytes,
}

/// Status, error type and body of a service response.
#[derive(Debug)]
pub(crate) struct RemoteResponse {
    pub status: u16,
    pub error_type: Option<String>,
    pub body: Bytes,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse a successful JSON body, or turn the response into a [`RemoteError`].
    pub fn into_json(self) -> Result<Value, RemoteError> {
        if !self.is_success() {
            return Err(self.into_remote_error());
        }
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| RemoteError {
            status: self.status,
            error_type: Some("InvalidResponse".to_string()),
            message: format!("response body is not valid JSON: {}", e),
        })
    }

    /// Extract the AWS error code and message.
    ///
    /// Handles the REST-JSON shape (`x-amzn-ErrorType` + `{"message": ..}`),
    /// the query-protocol JSON shape (`{"Error": {"Code", "Message"}}`) and
    /// plain-text bodies.
    pub fn into_remote_error(self) -> RemoteError {
        let parsed: Option<Value> = serde_json::from_slice(&self.body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("Error"));

        let error_type = self
            .error_type
            .or_else(|| string_at(error, "Code"))
            .or_else(|| string_at(parsed.as_ref(), "__type"))
            .or_else(|| string_at(parsed.as_ref(), "code"));

        let message = string_at(parsed.as_ref(), "message")
            .or_else(|| string_at(parsed.as_ref(), "Message"))
            .or_else(|| string_at(error, "Message"))
            .unwrap_or_else(|| String::from_utf8_lossy(&self.body).trim().to_string());

        RemoteError {
            status: self.status,
            error_type,
            message,
        }
    }
}

fn string_at(value: Option<&Value>, key: &str) -> Option<String> {
    value?.get(key)?.as_str().map(str::to_string)
}

/// Sign `request` with `creds` and send it.
pub(crate) async fn send_signed(
    http: &reqwest::Client,
    creds: &sigv4::Credentials,
    region: &str,
    request: SignedRequest<'_>,
) -> Result<RemoteResponse, TransportError> {
    let raw_url = match request.query {
        Some(q) if !q.is_empty() => format!("{}{}?{}", request.base_url, request.path, q),
        _ => format!("{}{}", request.base_url, request.path),
    };
    let url = Url::parse(&raw_url).map_err(|e| TransportError::InvalidEndpoint {
        url: raw_url.clone(),
        message: e.to_string(),
    })?;
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(TransportError::InvalidEndpoint {
                url: raw_url,
                message: "missing host".to_string(),
            })
        }
    };

    let signed = sigv4::sign_request(
        &sigv4::SignableRequest {
            method: request.method.as_str(),
            host: &host,
            path: url.path(),
            query: url.query(),
            headers: &[("content-type", request.content_type)],
            body: &request.body,
        },
        creds,
        &sigv4::SigningConfig {
            region,
            service: request.service,
        },
        now_unix(),
    );

    let mut builder = http
        .request(request.method, url)
        .header("content-type", request.content_type)
        .header("accept", "application/json");
    for (name, value) in signed.pairs() {
        builder = builder.header(name, value);
    }

    let response = builder.body(request.body).send().await?;
    let status = response.status().as_u16();
    let error_type = response
        .headers()
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(':').next().unwrap_or(v).to_string());
    let body = response.bytes().await?;

    tracing::debug!(status, bytes = body.len(), "aws response received");

    Ok(RemoteResponse {
        status,
        error_type,
        body,
    })
}

fn now_unix() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
