//! End-to-end behaviour of `execute` against real V8 contexts

use assert_matches::assert_matches;
use quarry_sandbox::{
    Arguments, ErrorKind, ExecutionResult, Position, SandboxConfig, SandboxService, Transpiler,
    V8Runtime,
};
use quarry_tests::common::{args, setup_test_logging, v8_service};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

fn service() -> SandboxService {
    SandboxService::new(V8Runtime::new())
}

#[tokio::test]
async fn test_scenario_a_returns_value() {
    setup_test_logging();

    let result = service()
        .execute::<i64>("function run(x){ return x+1 }", "run", args(json!({"x": 41})))
        .await
        .unwrap();

    assert_eq!(result, ExecutionResult::Success(42));
}

#[tokio::test]
async fn test_scenario_b_runtime_error_has_position() {
    setup_test_logging();

    let result = service()
        .execute::<Value>(
            "function run(){ throw new Error('boom') }",
            "run",
            Arguments::new(),
        )
        .await
        .unwrap();

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.error.name, "Error");
    assert_eq!(error.message(), "boom");
    let position = error.position.expect("position of the throw");
    assert_eq!(position, Position { line: 1, column: 22 });
}

#[tokio::test]
async fn test_scenario_c_syntax_error_has_no_position() {
    setup_test_logging();

    let result = service()
        .execute::<Value>("function run(", "run", Arguments::new())
        .await
        .unwrap();

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Compile);
    assert!(error.position.is_none());
    assert!(!error.message().is_empty());
}

#[tokio::test]
async fn test_scenario_d_awaits_async_result() {
    setup_test_logging();

    let result = service()
        .execute::<Value>(
            "async function run(){ await null; return {a:1} }",
            "run",
            Arguments::new(),
        )
        .await
        .unwrap();

    assert_eq!(result, ExecutionResult::Success(json!({"a": 1})));
}

#[tokio::test]
async fn test_position_on_later_line_of_typescript() {
    setup_test_logging();

    let code = r#"interface Row {
  id: number;
  tags?: string[];
}

function transform(rows: Row[]): number[] {
  return rows.map((row) => row.tags!.length);
}"#;

    let result = service()
        .execute::<Vec<usize>>(code, "transform", args(json!({"rows": [{"id": 1}]})))
        .await
        .unwrap();

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.error.name, "TypeError");
    assert_eq!(error.position.expect("position").line, 7);
}

#[tokio::test]
async fn test_rejected_promise_is_runtime_error() {
    let result = service()
        .execute::<Value>(
            "async function run(){ await null; throw new RangeError('late') }",
            "run",
            Arguments::new(),
        )
        .await
        .unwrap();

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.error.name, "RangeError");
    assert_eq!(error.message(), "late");
}

#[tokio::test]
async fn test_thrown_non_error_value() {
    let result = service()
        .execute::<Value>("function run(){ throw 'plain' }", "run", Arguments::new())
        .await
        .unwrap();

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.message(), "plain");
    assert!(error.position.is_none());
}

#[tokio::test]
async fn test_missing_function_is_runtime_error() {
    let result = service()
        .execute::<Value>("function other(){ return 1 }", "run", Arguments::new())
        .await
        .unwrap();

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.error.name, "ReferenceError");
}

#[tokio::test]
async fn test_undefined_return_is_null() {
    let result = service()
        .execute::<Value>("function run(){ }", "run", Arguments::new())
        .await
        .unwrap();

    assert_eq!(result, ExecutionResult::Success(Value::Null));
}

#[tokio::test]
async fn test_non_plain_return_value_is_rejected() {
    let result = service()
        .execute::<Value>("function run(){ return () => 1 }", "run", Arguments::new())
        .await
        .unwrap();

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.error.name, "TypeError");
}

#[tokio::test]
async fn test_arguments_are_positional_in_insertion_order() {
    let mut arguments = Arguments::new();
    arguments.insert("b".into(), json!("second"));
    arguments.insert("a".into(), json!("first"));

    let result = service()
        .execute::<Vec<String>>("function run(b, a){ return [b, a] }", "run", arguments)
        .await
        .unwrap();

    assert_eq!(
        result.into_result().unwrap(),
        vec!["second".to_string(), "first".to_string()]
    );
}

#[derive(Debug, Deserialize, PartialEq)]
struct NormalizedFile {
    name: String,
    lines: Vec<String>,
}

#[tokio::test]
async fn test_post_process_call_site_shape() {
    let code = r#"
function postProcess(content: string, name: string) {
  return { name: name.toLowerCase(), lines: content.split("\n").filter((l) => l.length > 0) };
}
"#;

    let result = service()
        .execute::<NormalizedFile>(
            code,
            "postProcess",
            args(json!({"content": "a\n\nb\n", "name": "NOTES.TXT"})),
        )
        .await
        .unwrap();

    assert_eq!(
        result.into_result().unwrap(),
        NormalizedFile {
            name: "notes.txt".to_string(),
            lines: vec!["a".to_string(), "b".to_string()],
        }
    );
}

#[tokio::test]
async fn test_return_value_type_mismatch() {
    let result = service()
        .execute::<Vec<i64>>("function run(){ return 'rows' }", "run", Arguments::new())
        .await
        .unwrap();

    let error = result.error().expect("failure");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.error.name, "ReturnValueError");
}

#[tokio::test]
async fn test_console_output_does_not_disturb_result() {
    setup_test_logging();

    let result = service()
        .execute::<i64>(
            concat!(
                "function run(){ console.log('working', {step: 1}); ",
                "console.error('careful'); return 3 }",
            ),
            "run",
            Arguments::new(),
        )
        .await
        .unwrap();

    assert_eq!(result, ExecutionResult::Success(3));
}

#[tokio::test]
async fn test_sync_hang_times_out() {
    setup_test_logging();

    let service = v8_service(Duration::from_millis(200));
    let result = service
        .execute::<Value>("function run(){ while (true) {} }", "run", Arguments::new())
        .await
        .unwrap();

    assert_eq!(result.error().expect("failure").kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn test_never_settling_promise_times_out() {
    let service = v8_service(Duration::from_millis(200));
    let result = service
        .execute::<Value>(
            "async function run(){ await new Promise(() => {}) }",
            "run",
            Arguments::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.error().expect("failure").kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn test_service_keeps_working_after_timeout() {
    let service = v8_service(Duration::from_millis(200));
    let hung = service
        .execute::<Value>("function run(){ for(;;){} }", "run", Arguments::new())
        .await
        .unwrap();
    assert!(!hung.is_success());

    let result = service
        .execute::<i64>("function run(){ return 5 }", "run", Arguments::new())
        .await
        .unwrap();
    assert_eq!(result, ExecutionResult::Success(5));
}

#[tokio::test]
async fn test_transpiled_output_is_idempotent() {
    let code = "function run(xs: number[]): number { return xs.reduce((a, b) => a + b, 0) }";
    let transpiler = Transpiler::default();
    assert_eq!(
        transpiler.transpile(code).unwrap().output,
        transpiler.transpile(code).unwrap().output
    );

    let service = service();
    let first = service
        .execute::<i64>(code, "run", args(json!({"xs": [1, 2, 3]})))
        .await
        .unwrap();
    let second = service
        .execute::<i64>(code, "run", args(json!({"xs": [1, 2, 3]})))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first, ExecutionResult::Success(6));
}

#[tokio::test]
async fn test_service_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sandbox.toml");
    std::fs::write(
        &path,
        concat!(
            "[limits]\n",
            "max_duration = \"250ms\"\n",
            "\n",
            "[transpile]\n",
            "language = \"javascript\"\n",
            "specifier = \"file:///job.js\"\n",
        ),
    )
    .unwrap();

    let config = SandboxConfig::from_file(&path).unwrap();
    assert_eq!(config.limits.max_duration, Some(Duration::from_millis(250)));

    let service = SandboxService::from_config(&config).unwrap();
    let result = service
        .execute::<Value>("function run(){ while(true){} }", "run", Arguments::new())
        .await
        .unwrap();
    assert_matches!(result.error().map(|e| e.kind), Some(ErrorKind::Timeout));
}
