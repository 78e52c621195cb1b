//! Full pipeline runs against a scripted engine.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use capgate::{Gate, GateError};
use capgate_bootstrap::{evaluate, resolve_manifest, BootstrapState, ProvisionMarker, Provisioner, MARKER_ENV};
use capgate_catalog::{Arguments, CapabilityLibrary};
use capgate_sandbox::{
    AdapterConfig, CapabilityDispatcher, ExecutionRequest, ExecutionResult, FailureKind,
    ReferenceScanner, SandboxAdapter, SandboxEngine, SandboxError,
};
use serde_json::{json, Value};

const CATALOG: &str = r#"import random

async def greet(name: str) -> str:
    return f"Hello, {name}!"

async def reverse(text: str) -> str:
    return text[::-1]

async def random_numbers(n: int) -> list[float]:
    return [random.random() for _ in range(n)]
"#;

/// Understands exactly the snippets these tests send.
#[derive(Default)]
struct ScriptedEngine {
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedEngine {
    async fn call(
        capabilities: &dyn CapabilityDispatcher,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionResult> {
        capabilities
            .call_capability(name, Arguments::positional(args))
            .await
            .map_err(|e| ExecutionResult::failure(FailureKind::Name, e.to_string()))
    }
}

#[async_trait::async_trait]
impl SandboxEngine for ScriptedEngine {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        capabilities: Arc<dyn CapabilityDispatcher>,
    ) -> Result<ExecutionResult, SandboxError> {
        self.requests.lock().unwrap().push(request.clone());
        let caps = capabilities.as_ref();

        let result = match request.code.as_str() {
            "print(await greet('World'))" => {
                match Self::call(caps, "greet", vec![json!("World")]).await {
                    Ok(value) => ExecutionResult::output(value.as_str().unwrap_or_default()),
                    Err(failure) => failure,
                }
            }
            "print(len(random_numbers(100)))" => {
                match Self::call(caps, "random_numbers", vec![json!(100)]).await {
                    Ok(value) => ExecutionResult::output(value.as_array().map_or(0, Vec::len).to_string()),
                    Err(failure) => failure,
                }
            }
            "print(await greet('x')); print(await reverse('x'))" => {
                // Ask for both; only what was exposed should answer.
                let greet = Self::call(caps, "greet", vec![json!("x")]).await;
                let reverse = Self::call(caps, "reverse", vec![json!("x")]).await;
                match (greet, reverse) {
                    (Ok(a), Ok(b)) => ExecutionResult::output(format!(
                        "{}\n{}",
                        a.as_str().unwrap_or_default(),
                        b.as_str().unwrap_or_default()
                    )),
                    (Err(failure), _) | (_, Err(failure)) => failure,
                }
            }
            "print(await greet('x'))  # the engine also tries reverse" => {
                match Self::call(caps, "reverse", vec![json!("x")]).await {
                    Ok(value) => ExecutionResult::output(value.as_str().unwrap_or_default()),
                    Err(failure) => failure,
                }
            }
            "print(1/0)" => ExecutionResult::failure(FailureKind::ZeroDivision, "division by zero"),
            "print(2+2)" => ExecutionResult::output("4"),
            other => ExecutionResult::failure(FailureKind::Syntax, format!("unsupported snippet: {other}")),
        };
        Ok(result)
    }
}

fn gate(engine: Arc<ScriptedEngine>) -> Gate {
    Gate::new(
        CapabilityLibrary::builtin(),
        ReferenceScanner::default(),
        SandboxAdapter::new(engine, AdapterConfig::default()),
    )
}

fn write_catalog(dir: &Path, source: &str) -> PathBuf {
    let path = dir.join("functions.py");
    std::fs::write(&path, source).unwrap();
    path
}

#[tokio::test]
async fn greet_is_exposed_and_called() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), CATALOG);
    let engine = Arc::new(ScriptedEngine::default());

    let output = gate(engine.clone())
        .run("print(await greet('World'))", &catalog)
        .await
        .unwrap();
    assert_eq!(output, "Hello, World!");

    let requests = engine.requests.lock().unwrap();
    assert_eq!(requests[0].external_functions, vec!["greet"]);
    assert_eq!(requests[0].type_check_stubs, CATALOG);
}

#[tokio::test]
async fn division_by_zero_surfaces_as_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), "");
    let engine = Arc::new(ScriptedEngine::default());

    let err = gate(engine.clone()).run("print(1/0)", &catalog).await.unwrap_err();
    assert!(matches!(&err, GateError::Execution(SandboxError::Execution { .. })));
    assert!(err.to_string().contains("division by zero"), "{err}");
    assert_eq!(engine.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn random_numbers_returns_requested_length() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), CATALOG);
    let engine = Arc::new(ScriptedEngine::default());

    let output = gate(engine.clone())
        .run("print(len(random_numbers(100)))", &catalog)
        .await
        .unwrap();
    assert_eq!(output, "100");
    assert_eq!(
        engine.requests.lock().unwrap()[0].external_functions,
        vec!["random_numbers"]
    );
}

#[tokio::test]
async fn absent_catalog_runs_with_nothing_exposed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());

    let output = gate(engine.clone())
        .run("print(2+2)", &dir.path().join("functions.py"))
        .await
        .unwrap();
    assert_eq!(output, "4");

    let requests = engine.requests.lock().unwrap();
    assert!(requests[0].external_functions.is_empty());
    assert!(requests[0].type_check_stubs.is_empty());
}

#[tokio::test]
async fn every_referenced_capability_is_exposed() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), CATALOG);
    let engine = Arc::new(ScriptedEngine::default());

    let output = gate(engine.clone())
        .run("print(await greet('x')); print(await reverse('x'))", &catalog)
        .await
        .unwrap();
    assert_eq!(output, "Hello, x!\nx");
    assert_eq!(
        engine.requests.lock().unwrap()[0].external_functions,
        vec!["greet", "reverse"]
    );
}

#[tokio::test]
async fn unreferenced_capabilities_stay_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), CATALOG);
    let engine = Arc::new(ScriptedEngine::default());

    let err = gate(engine.clone())
        .run("print(await greet('x'))  # the engine also tries reverse", &catalog)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not exposed"), "{err}");
    assert_eq!(
        engine.requests.lock().unwrap()[0].external_functions,
        vec!["greet"]
    );
}

#[tokio::test]
async fn malformed_catalog_aborts_before_execution() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), "async def greet(name: str -> str:\n    ...\n");
    let engine = Arc::new(ScriptedEngine::default());

    let err = gate(engine.clone())
        .run("print(await greet('World'))", &catalog)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Configuration(_)), "{err}");
    assert!(engine.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn indirection_can_be_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), CATALOG);
    let engine = Arc::new(ScriptedEngine::default());

    let err = gate(engine.clone())
        .with_reject_indirection(true)
        .run("f = getattr(mod, 'gr' + 'eet'); print(f('x'))", &catalog)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GateError::Execution(SandboxError::IndirectInvocation { .. })
    ));
    assert!(engine.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn declared_dependencies_relaunch_once_then_run() {
    let dir = tempfile::tempdir().unwrap();
    let source = format!("# /// capability-deps: requests\n{CATALOG}");
    let catalog = write_catalog(dir.path(), &source);
    let exe = Path::new("/opt/capgate/bin/capgate");
    let code = "print(await greet('World'))";
    let args = vec![OsString::from(code)];

    // First launch: no marker, so a relaunch is planned.
    let manifest = resolve_manifest(None, &catalog).unwrap();
    let BootstrapState::NeedsProvisioning(plan) =
        evaluate(&manifest, None, &Provisioner::default(), exe, &args).unwrap()
    else {
        panic!("first launch should need provisioning");
    };
    assert!(plan.args.windows(2).any(|w| w == ["--with", "requests"]));

    // Relaunched process: the marker from the plan stops any further relaunch.
    let marker = plan
        .env
        .iter()
        .find(|(key, _)| key == MARKER_ENV)
        .and_then(|(_, value)| ProvisionMarker::parse(value));
    let manifest = resolve_manifest(None, &catalog).unwrap();
    let state = evaluate(&manifest, marker.as_ref(), &Provisioner::default(), exe, &args).unwrap();
    assert_eq!(state, BootstrapState::Provisioned);

    let output = gate(Arc::new(ScriptedEngine::default()))
        .run(code, &catalog)
        .await
        .unwrap();
    assert_eq!(output, "Hello, World!");
}
