//! The Azure and namespace stages of the real pipeline, run twice against a scripted cloud.

#![cfg(unix)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use aksboot_config::RunConfig;
use aksboot_orchestrator::{BootstrapHandle, RunOutcome, Sequencer};
use aksboot_registry::test_support::{FakeConnector, FakeRegistry};
use aksboot_runner::test_support::ScriptedRunner;
use aksboot_runner::{CommandSpec, ProcessOutput};
use aksboot_stage_api::test_support::test_context;
use aksboot_stage_api::{StageId, StageOutcome};
use aksboot_stages::default_pipeline;
use aksboot_utils::ExitCode;
use serde_json::json;
use tempfile::TempDir;

const GROUP_ID: &str = "/subscriptions/sub-1/resourceGroups/gws-rg";
const ACR_ID: &str = "/subscriptions/sub-1/resourceGroups/gws-rg/providers/Microsoft.ContainerRegistry/registries/gwsacr";

/// Preflight through namespaces.
const AZURE_PREFIX: usize = 8;

fn not_found() -> ProcessOutput {
    ProcessOutput::failed(3, "ERROR: (ResourceNotFound) not found")
}

fn value_after(cmd: &CommandSpec, flag: &str) -> String {
    let argv = cmd.argv();
    argv.iter()
        .position(|a| a == flag)
        .and_then(|i| argv.get(i + 1))
        .cloned()
        .unwrap_or_default()
}

/// Answers from `created` once `create` has flipped it, not found before.
fn backed_by(runner: &ScriptedRunner, show: &[&str], create: &[&str], body: String) {
    let created = Arc::new(AtomicBool::new(false));
    let (flag, shown) = (created.clone(), body.clone());
    runner.on(show, move |_| {
        if flag.load(Ordering::SeqCst) {
            ProcessOutput::ok(shown.clone())
        } else {
            not_found()
        }
    });
    runner.on(create, move |_| {
        created.store(true, Ordering::SeqCst);
        ProcessOutput::ok(body.clone())
    });
}

/// A subscription, a cluster API and the stub tools preflight looks for.
fn scripted_cloud() -> Arc<ScriptedRunner> {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond(
        &["az", "account", "show"],
        ProcessOutput::ok(r#"{"id":"sub-1","tenantId":"tenant-1","name":"dev"}"#),
    );

    backed_by(
        &runner,
        &["az", "group", "show"],
        &["az", "group", "create"],
        json!({"id": GROUP_ID, "name": "gws-rg", "location": "westeurope"}).to_string(),
    );
    backed_by(
        &runner,
        &["az", "aks", "show"],
        &["az", "aks", "create"],
        json!({
            "name": "gws-aks",
            "provisioningState": "Succeeded",
            "oidcIssuerProfile": { "enabled": true, "issuerUrl": "https://oidc.example/tid/" },
            "securityProfile": { "workloadIdentity": { "enabled": true } },
            "identityProfile": { "kubeletidentity": { "objectId": "kubelet-oid", "clientId": "kubelet-cid" } }
        })
        .to_string(),
    );
    backed_by(
        &runner,
        &["az", "acr", "show"],
        &["az", "acr", "create"],
        json!({"id": ACR_ID, "name": "gwsacr", "loginServer": "gwsacr.azurecr.io"}).to_string(),
    );
    backed_by(
        &runner,
        &["az", "identity", "show"],
        &["az", "identity", "create"],
        json!({
            "id": format!("{GROUP_ID}/providers/Microsoft.ManagedIdentity/userAssignedIdentities/gws-id"),
            "name": "gws-id",
            "clientId": "client-1",
            "principalId": "principal-1"
        })
        .to_string(),
    );
    runner.respond(&["az", "aks", "get-credentials"], ProcessOutput::ok(""));

    // (scope, role)
    let roles: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
    let r = roles.clone();
    runner.on(&["az", "role", "assignment", "list"], move |cmd| {
        let scope = value_after(cmd, "--scope");
        let held: Vec<_> = r
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == scope)
            .map(|(_, role)| json!({ "roleDefinitionName": role }))
            .collect();
        ProcessOutput::ok(json!(held).to_string())
    });
    let r = roles.clone();
    runner.on(&["az", "role", "assignment", "create"], move |cmd| {
        r.lock()
            .unwrap()
            .push((value_after(cmd, "--scope"), value_after(cmd, "--role")));
        ProcessOutput::ok("")
    });
    let r = roles;
    runner.on(&["az", "aks", "update"], move |cmd| {
        if cmd.argv().iter().any(|a| a == "--attach-acr") {
            r.lock().unwrap().push((ACR_ID.to_string(), "AcrPull".to_string()));
        }
        ProcessOutput::ok("")
    });

    let namespaces: Arc<Mutex<BTreeSet<String>>> = Arc::default();
    let ns = namespaces.clone();
    runner.on(&["kubectl", "get", "namespace"], move |cmd| {
        let name = cmd.argv()[3].clone();
        if ns.lock().unwrap().contains(&name) {
            ProcessOutput::ok(json!({"kind": "Namespace", "metadata": {"name": name}}).to_string())
        } else {
            ProcessOutput::failed(1, format!("Error from server (NotFound): namespaces \"{name}\" not found"))
        }
    });
    runner.on(&["kubectl", "create", "namespace"], move |cmd| {
        namespaces.lock().unwrap().insert(cmd.argv()[3].clone());
        ProcessOutput::ok("")
    });
    runner
}

fn tool_dir() -> TempDir {
    use std::os::unix::fs::PermissionsExt;
    let dir = TempDir::new().unwrap();
    for tool in ["az", "kubectl", "helm", "git"] {
        let path = dir.path().join(tool);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    dir
}

/// One `aksboot up` over the Azure prefix, in a fresh context like a new process.
async fn up(runner: &Arc<ScriptedRunner>, tools: &TempDir) -> RunOutcome {
    let ctx = test_context(RunConfig::default(), runner.clone())
        .with_tool_search_path(tools.path().as_os_str())
        .with_registry_connector(Arc::new(FakeConnector::new(Arc::new(FakeRegistry::new()))));
    let stages = default_pipeline().into_iter().take(AZURE_PREFIX).collect();
    BootstrapHandle::with_sequencer(ctx, Sequencer::new(stages))
        .up_until(std::future::pending())
        .await
}

fn outcome_of(run: &RunOutcome, stage: StageId) -> StageOutcome {
    run.report
        .records
        .iter()
        .find(|r| r.stage == stage)
        .map(|r| r.outcome)
        .unwrap_or_else(|| panic!("{stage:?} did not run"))
}

const CREATION_STAGES: [StageId; 6] = [
    StageId::ResourceGroup,
    StageId::AksCluster,
    StageId::OidcIssuer,
    StageId::ContainerRegistry,
    StageId::ManagedIdentity,
    StageId::Namespaces,
];

#[tokio::test]
async fn test_rerun_converges_without_creating_anything() {
    let runner = scripted_cloud();
    let tools = tool_dir();

    let first = up(&runner, &tools).await;
    assert!(first.error.is_none(), "{:?}", first.error);
    assert_eq!(first.exit_code(), ExitCode::SUCCESS);
    assert_eq!(first.report.records.len(), AZURE_PREFIX);
    for stage in [
        StageId::ResourceGroup,
        StageId::AksCluster,
        StageId::ContainerRegistry,
        StageId::ManagedIdentity,
        StageId::Namespaces,
    ] {
        assert_eq!(outcome_of(&first, stage), StageOutcome::Succeeded, "{stage:?}");
    }
    assert_eq!(runner.calls_matching(&["az", "group", "create"]).len(), 1);
    assert_eq!(runner.calls_matching(&["az", "aks", "create"]).len(), 1);
    assert_eq!(first.report.discovered.subscription_id.as_deref(), Some("sub-1"));
    assert_eq!(
        first.report.discovered.oidc_issuer_url.as_deref(),
        Some("https://oidc.example/tid/")
    );

    runner.clear_calls();
    let second = up(&runner, &tools).await;
    assert!(second.error.is_none(), "{:?}", second.error);
    assert_eq!(second.exit_code(), ExitCode::SUCCESS);
    for stage in CREATION_STAGES {
        assert_eq!(
            outcome_of(&second, stage),
            StageOutcome::SkippedAlreadySatisfied,
            "{stage:?}"
        );
    }
    let writes: Vec<_> = runner
        .calls()
        .into_iter()
        .filter(|argv| argv.iter().any(|a| a == "create" || a == "update"))
        .collect();
    assert!(writes.is_empty(), "rerun wrote: {writes:?}");
    assert_eq!(
        second.report.discovered.acr_login_server.as_deref(),
        Some("gwsacr.azurecr.io")
    );
}
