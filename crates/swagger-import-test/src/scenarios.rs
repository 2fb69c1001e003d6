//! End-to-end pipeline runs against [`MockAws`].

use std::path::PathBuf;

use bytes::Bytes;
use serde_json::{json, Map, Value};

use swagger_import::{
    run_targets_with, AmbientEnvironment, ApiProvisioner, CredentialError, CredentialResolver,
    DeploymentError, DeploymentPipeline, DeploymentSpec, DescriptionSource, IdentitySource,
    ProvisionError, RunMode, Stage, StageError, StateKind, UpdateMode, UpdateSpec,
};

use crate::{
    body_json, isolated_resolver, signing_key_id, signing_service, MockAws, Scratch,
    STATIC_ACCESS_KEY_ID,
};

const PETSTORE: &str = r#"{
  "swagger": "2.0",
  "info": { "title": "Pets", "version": "1.0.0" },
  "paths": {
    "/pets": {
      "get": {
        "responses": { "200": { "description": "ok" } },
        "x-amazon-apigateway-integration": { "type": "mock" }
      }
    }
  }
}
"#;

fn inline_petstore() -> Map<String, Value> {
    match json!({
        "swagger": "2.0",
        "info": { "title": "Pets", "version": "1.0.0" },
        "paths": {}
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn update(id: &str, mode: UpdateMode) -> Option<UpdateSpec> {
    Some(UpdateSpec {
        rest_api_id: id.to_string(),
        mode,
    })
}

#[tokio::test]
async fn create_then_deploy_file_description() {
    let aws = MockAws::start().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;
    aws.mock_deployment("a1b2c3d4e5", "dep123").await;

    let scratch = Scratch::new().unwrap();
    let api = scratch.write("api.json", PETSTORE).unwrap();

    let mut target = aws.target("default", DescriptionSource::File(api));
    target.deployment = Some(DeploymentSpec::new("test"));

    let report = DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap();

    assert_eq!(report.provision.id, "a1b2c3d4e5");
    assert_eq!(report.provision.name.as_deref(), Some("Pets"));
    assert!(report.deployed());
    let record = report.deployment.record().unwrap();
    assert_eq!(record.id, "dep123");
    assert_eq!(record.rest_api_id, "a1b2c3d4e5");
    assert_eq!(
        report.states,
        vec![
            StateKind::Start,
            StateKind::CredentialsResolved,
            StateKind::DescriptionLoaded,
            StateKind::Provisioned,
            StateKind::Deployed,
            StateKind::Done,
        ]
    );

    let imports = aws.requests_to("POST", "/restapis").await;
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].body, PETSTORE.as_bytes());
    assert!(aws.requests_to("PUT", "/restapis/a1b2c3d4e5").await.is_empty());

    let deployments = aws
        .requests_to("POST", "/restapis/a1b2c3d4e5/deployments")
        .await;
    assert_eq!(deployments.len(), 1);
    assert_eq!(body_json(&deployments[0]).unwrap(), json!({"stageName": "test"}));
}

#[tokio::test]
async fn overwrite_inline_description_without_deployment() {
    let aws = MockAws::start().await;
    aws.mock_put("abc123", "overwrite").await;

    let document = inline_petstore();
    let mut target = aws.target("default", DescriptionSource::Inline(document.clone()));
    target.update = update("abc123", UpdateMode::Overwrite);

    let report = DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap();

    assert_eq!(report.provision.id, "abc123");
    assert!(!report.deployed());
    assert_eq!(
        &report.states[report.states.len() - 2..],
        &[StateKind::SkippedDeployment, StateKind::Done]
    );

    let puts = aws.requests_to("PUT", "/restapis/abc123").await;
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].body, serde_json::to_vec(&document).unwrap());
    assert_eq!(
        puts[0].url.query(),
        Some("mode=overwrite&failonwarnings=true")
    );

    let requests = aws.requests().await;
    assert_eq!(requests.len(), 1, "no import and no deployment expected");
}

#[tokio::test]
async fn merge_mode_is_sent_as_merge() {
    let aws = MockAws::start().await;
    aws.mock_put("abc123", "merge").await;

    let mut target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    target.update = update("abc123", UpdateMode::Merge);

    DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap();

    let puts = aws.requests_to("PUT", "/restapis/abc123").await;
    assert_eq!(puts[0].url.query(), Some("mode=merge&failonwarnings=true"));
}

#[tokio::test]
async fn empty_update_id_makes_no_remote_calls() {
    let aws = MockAws::start().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;
    aws.mock_assume_role("ASIATEMP", "token").await;

    let mut target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    target.update = update("", UpdateMode::Overwrite);
    target.credentials.assume_role_arn = Some("arn:aws:iam::123456789012:role/deployer".to_string());
    target.deployment = Some(DeploymentSpec::new("test"));

    let err = DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        err.error,
        StageError::Provision(ProvisionError::MissingTargetId)
    ));
    assert!(aws.requests().await.is_empty());
}

#[tokio::test]
async fn import_warnings_fail_without_deployment() {
    let aws = MockAws::start().await;
    aws.mock_import_with_warnings("a1b2c3d4e5", &["Unsupported model type 'MapProperty'"])
        .await;
    aws.mock_deployment("a1b2c3d4e5", "dep123").await;

    let mut target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    target.deployment = Some(DeploymentSpec::new("test"));

    let err = DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Provision);
    let StageError::Provision(ProvisionError::RemoteRejected(remote)) = &err.error else {
        panic!("expected RemoteRejected, got {:?}", err.error);
    };
    assert!(remote.message.contains("MapProperty"));
    assert!(!err.is_partial());
    assert!(aws
        .requests_to("POST", "/restapis/a1b2c3d4e5/deployments")
        .await
        .is_empty());
}

#[tokio::test]
async fn import_rejection_carries_service_error() {
    let aws = MockAws::start().await;
    aws.mock_rejection(
        "POST",
        "/restapis",
        400,
        "BadRequestException",
        "Errors found during import: Unable to parse API definition",
    )
    .await;

    let target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    let err = DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap_err();

    let StageError::Provision(ProvisionError::RemoteRejected(remote)) = &err.error else {
        panic!("expected RemoteRejected, got {:?}", err.error);
    };
    assert_eq!(remote.status, 400);
    assert_eq!(remote.error_type.as_deref(), Some("BadRequestException"));
    assert!(err.to_string().contains("failed at provision stage"));
}

#[tokio::test]
async fn failed_deployment_keeps_provisioned_api() {
    let aws = MockAws::start().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;
    aws.mock_rejection(
        "POST",
        "/restapis/a1b2c3d4e5/deployments",
        429,
        "TooManyRequestsException",
        "Too Many Requests",
    )
    .await;

    let mut target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    target.deployment = Some(DeploymentSpec::new("prod").with_cache_cluster(true, Some("0.5")));

    let err = DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Deploy);
    assert!(matches!(
        err.error,
        StageError::Deploy(DeploymentError::RemoteRejected(_))
    ));
    assert!(err.is_partial());
    assert_eq!(err.provisioned.as_ref().unwrap().id, "a1b2c3d4e5");
    assert_eq!(
        err.states,
        vec![
            StateKind::Start,
            StateKind::CredentialsResolved,
            StateKind::DescriptionLoaded,
            StateKind::Provisioned,
            StateKind::Failed,
        ]
    );
}

#[tokio::test]
async fn deployment_response_without_id_is_a_failure() {
    let aws = MockAws::start().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;
    aws.mock_deployment_body("a1b2c3d4e5", json!({"unexpected": true}))
        .await;

    let mut target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    target.deployment = Some(DeploymentSpec::new("test"));

    let err = DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Deploy);
    let StageError::Deploy(DeploymentError::RemoteRejected(remote)) = &err.error else {
        panic!("expected deploy rejection, got {:?}", err.error);
    };
    assert_eq!(remote.error_type.as_deref(), Some("InvalidResponse"));
    assert!(err.is_partial());
}

#[tokio::test]
async fn deployment_request_carries_all_stage_settings() {
    let aws = MockAws::start().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;
    aws.mock_deployment("a1b2c3d4e5", "dep123").await;

    let mut target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    target.deployment = Some(
        DeploymentSpec::new("prod")
            .with_cache_cluster(true, Some("0.5"))
            .with_description("My deployment")
            .with_stage_description("My awesome stage")
            // A stale id must never reach the request.
            .bound_to("stale000"),
    );

    DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap();

    assert!(aws
        .requests_to("POST", "/restapis/stale000/deployments")
        .await
        .is_empty());
    let deployments = aws
        .requests_to("POST", "/restapis/a1b2c3d4e5/deployments")
        .await;
    assert_eq!(
        body_json(&deployments[0]).unwrap(),
        json!({
            "stageName": "prod",
            "stageDescription": "My awesome stage",
            "description": "My deployment",
            "cacheClusterEnabled": true,
            "cacheClusterSize": "0.5"
        })
    );
}

#[tokio::test]
async fn create_mode_is_not_idempotent() {
    let aws = MockAws::start().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;

    for _ in 0..2 {
        let target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
        DeploymentPipeline::with_resolver(target, isolated_resolver())
            .run()
            .await
            .unwrap();
    }

    assert_eq!(aws.requests_to("POST", "/restapis").await.len(), 2);
}

#[tokio::test]
async fn profile_wins_over_key_pair() {
    let aws = MockAws::start().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;

    let scratch = Scratch::new().unwrap();
    let shared = scratch
        .credentials_file(&[("default", "AKIDDEFAULT"), ("deploy", "AKIDPROFILE")])
        .unwrap();
    let resolver = CredentialResolver::with_ambient(
        AmbientEnvironment::empty().with_shared_credentials_file(shared),
    );

    let mut target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    target.credentials.profile = Some("deploy".to_string());

    DeploymentPipeline::with_resolver(target, resolver)
        .run()
        .await
        .unwrap();

    let imports = aws.requests_to("POST", "/restapis").await;
    assert_eq!(signing_key_id(&imports[0]).as_deref(), Some("AKIDPROFILE"));
    assert_eq!(signing_service(&imports[0]).as_deref(), Some("apigateway"));
}

#[tokio::test]
async fn assumed_role_credentials_sign_gateway_calls() {
    let aws = MockAws::start().await;
    aws.mock_assume_role("ASIATEMPORARY", "session-token-1").await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;
    aws.mock_deployment("a1b2c3d4e5", "dep123").await;

    let mut target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    target.credentials.assume_role_arn = Some("arn:aws:iam::123456789012:role/deployer".to_string());
    target.credentials.role_session_name = Some("ci-run".to_string());
    target.deployment = Some(DeploymentSpec::new("test"));

    let resolver = isolated_resolver();
    let ctx = resolver
        .resolve(&target.credentials, &target.endpoints)
        .await
        .unwrap();
    assert_eq!(ctx.credentials().access_key_id(), "ASIATEMPORARY");
    assert!(ctx.credentials().is_temporary());
    assert!(ctx.credentials().expires_at().is_some());
    assert!(matches!(
        ctx.identity(),
        IdentitySource::AssumedRole { via, .. } if **via == IdentitySource::StaticKeys
    ));

    DeploymentPipeline::with_resolver(target, resolver)
        .run()
        .await
        .unwrap();

    let sts_calls = aws.requests_to("POST", "/").await;
    assert_eq!(sts_calls.len(), 2);
    let form = String::from_utf8(sts_calls[0].body.clone()).unwrap();
    assert!(form.contains("RoleSessionName=ci-run"));
    assert!(form.contains("DurationSeconds=3600"));
    assert_eq!(signing_key_id(&sts_calls[0]).as_deref(), Some(STATIC_ACCESS_KEY_ID));
    assert_eq!(signing_service(&sts_calls[0]).as_deref(), Some("sts"));

    for request in aws
        .requests()
        .await
        .iter()
        .filter(|r| r.url.path().starts_with("/restapis"))
    {
        assert_eq!(signing_key_id(request).as_deref(), Some("ASIATEMPORARY"));
        assert_eq!(
            request
                .headers
                .get("x-amz-security-token")
                .and_then(|v| v.to_str().ok()),
            Some("session-token-1")
        );
    }
}

#[tokio::test]
async fn denied_role_assumption_fails_at_credentials() {
    let aws = MockAws::start().await;
    aws.mock_assume_role_denied().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;

    let mut target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    target.credentials.assume_role_arn = Some("arn:aws:iam::123456789012:role/deployer".to_string());

    let err = DeploymentPipeline::with_resolver(target, isolated_resolver())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Credentials);
    let StageError::Credentials(CredentialError::AssumeRoleRejected(remote)) = &err.error else {
        panic!("expected AssumeRoleRejected, got {:?}", err.error);
    };
    assert_eq!(remote.status, 403);
    assert_eq!(remote.error_type.as_deref(), Some("AccessDenied"));
    assert!(aws.requests_to("POST", "/restapis").await.is_empty());
}

#[tokio::test]
async fn concurrent_targets_use_their_own_credentials() {
    let aws = MockAws::start().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;
    aws.mock_put("abc123", "overwrite").await;
    aws.mock_deployment("a1b2c3d4e5", "dep123").await;

    let mut first = aws.target("first", DescriptionSource::Inline(inline_petstore()));
    first.credentials.access_key_id = Some("AKIDFIRST".to_string());
    first.credentials.region = "eu-west-1".to_string();
    first.deployment = Some(DeploymentSpec::new("test"));

    let mut second = aws.target("second", DescriptionSource::Inline(inline_petstore()));
    second.credentials.access_key_id = Some("AKIDSECOND".to_string());
    second.update = update("abc123", UpdateMode::Overwrite);

    let mut broken = aws.target(
        "broken",
        DescriptionSource::File(PathBuf::from("/nonexistent/api.json")),
    );
    broken.credentials.access_key_id = Some("AKIDBROKEN".to_string());

    let results = run_targets_with(
        vec![first, broken, second],
        RunMode::Concurrent,
        AmbientEnvironment::empty(),
    )
    .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().target, "first");
    assert_eq!(results[1].as_ref().unwrap_err().stage(), Stage::Description);
    assert_eq!(results[2].as_ref().unwrap().provision.id, "abc123");

    let import = &aws.requests_to("POST", "/restapis").await[0];
    assert_eq!(signing_key_id(import).as_deref(), Some("AKIDFIRST"));
    let auth = import.headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth.contains("/eu-west-1/apigateway/"));

    let put = &aws.requests_to("PUT", "/restapis/abc123").await[0];
    assert_eq!(signing_key_id(put).as_deref(), Some("AKIDSECOND"));
    let auth = put.headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth.contains("/us-east-1/apigateway/"));
}

#[tokio::test]
async fn provisioner_preflight_matches_pipeline() {
    let spec = UpdateSpec {
        rest_api_id: "   ".to_string(),
        mode: UpdateMode::Merge,
    };
    assert!(matches!(
        ApiProvisioner::check(Some(&spec)),
        Err(ProvisionError::MissingTargetId)
    ));

    // The payload is handed over untouched.
    let aws = MockAws::start().await;
    aws.mock_import("a1b2c3d4e5", "Pets").await;
    let target = aws.target("default", DescriptionSource::Inline(inline_petstore()));
    let ctx = isolated_resolver()
        .resolve(&target.credentials, &target.endpoints)
        .await
        .unwrap();
    let payload = Bytes::from_static(b"not even json");
    let result = ApiProvisioner::provision(&ctx, payload, None).await.unwrap();
    assert_eq!(result.id, "a1b2c3d4e5");
    assert_eq!(
        aws.requests_to("POST", "/restapis").await[0].body,
        b"not even json"
    );
}
