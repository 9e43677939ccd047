//! Containment: no state, authority or replies cross a context boundary

use quarry_sandbox::{
    Arguments, ErrorKind, ExecutionResult, ResourceLimits, SandboxService, V8Runtime,
};
use quarry_tests::common::{setup_test_logging, MisroutingRuntime};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

fn service() -> SandboxService {
    SandboxService::new(V8Runtime::new())
}

async fn eval(service: &SandboxService, body: &str) -> ExecutionResult<Value> {
    let code = format!("function inspect() {{ {body} }}");
    service
        .execute::<Value>(&code, "inspect", Arguments::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_globals_do_not_survive_between_calls() {
    setup_test_logging();
    let service = service();

    let first = eval(&service, "globalThis.leak = 'secret'; return typeof globalThis.leak").await;
    assert_eq!(first, ExecutionResult::Success(json!("string")));

    let second = eval(&service, "return typeof globalThis.leak").await;
    assert_eq!(second, ExecutionResult::Success(json!("undefined")));
}

#[tokio::test]
async fn test_prototype_pollution_does_not_survive() {
    let service = service();

    eval(&service, "Object.prototype.polluted = true; Array.prototype.map = null; return 1").await;

    let result = eval(&service, "return [({}).polluted === undefined, typeof [].map]").await;
    assert_eq!(result, ExecutionResult::Success(json!([true, "function"])));
}

#[tokio::test]
async fn test_host_bridge_is_unreachable() {
    let result = eval(
        &service(),
        r#"return {
            deno: typeof Deno,
            bootstrap: typeof __bootstrap,
            document: typeof document,
            window: typeof window,
            process: typeof process,
            require: typeof require,
            fetch: typeof fetch,
        }"#,
    )
    .await;

    assert_eq!(
        result,
        ExecutionResult::Success(json!({
            "deno": "undefined",
            "bootstrap": "undefined",
            "document": "undefined",
            "window": "undefined",
            "process": "undefined",
            "require": "undefined",
            "fetch": "undefined",
        }))
    );
}

#[tokio::test]
async fn test_host_document_access_is_an_error() {
    let result = eval(&service(), "return document.cookie").await;

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.error.name, "ReferenceError");
}

#[tokio::test]
async fn test_function_constructor_only_reaches_own_global() {
    let service = service();

    let result = eval(
        &service,
        "const g = Function('return this')(); g.marker = 7; return typeof g.Deno",
    )
    .await;
    assert_eq!(result, ExecutionResult::Success(json!("undefined")));

    let next = eval(&service, "return typeof globalThis.marker").await;
    assert_eq!(next, ExecutionResult::Success(json!("undefined")));
}

#[tokio::test]
async fn test_dynamic_import_is_not_available() {
    let result = eval(&service(), "return import('file:///etc/passwd').then(() => 'loaded')").await;
    assert!(!result.is_success());
}

#[tokio::test]
async fn test_foreign_origin_reply_is_rejected() {
    setup_test_logging();

    let service = SandboxService::new(MisroutingRuntime::new());
    let result = service
        .execute::<Value>("function run(){ return 'not yours' }", "run", Arguments::new())
        .await
        .unwrap();

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Containment);
    assert!(!error.kind.is_user_error());
    assert!(result.return_value().is_none());
}

#[tokio::test]
async fn test_abandoned_call_releases_its_context() {
    setup_test_logging();

    let limits = ResourceLimits::default().with_max_duration(Duration::from_secs(30));
    let runtime = V8Runtime::with_limits(limits);
    let service = SandboxService::new(runtime.clone());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(300),
        service.execute::<Value>("function run(){ while (true) {} }", "run", Arguments::new()),
    )
    .await;
    assert!(abandoned.is_err(), "call should outlive the caller's patience");

    let deadline = Instant::now() + Duration::from_secs(10);
    while runtime.active_contexts() > 0 {
        assert!(Instant::now() < deadline, "abandoned context is still running");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The runtime is still usable afterwards
    let result = service
        .execute::<i64>("function run(){ return 5 }", "run", Arguments::new())
        .await
        .unwrap();
    assert_eq!(result, ExecutionResult::Success(5));
}
