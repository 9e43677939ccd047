//! Deadline and heap limit enforcement

use quarry_sandbox::{Arguments, ResourceLimits, SandboxService, V8Runtime};
use serde_json::Value;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Sandbox Limits ===\n");

    let limits = ResourceLimits {
        max_duration: Some(Duration::from_millis(500)),
        max_heap_bytes: Some(32 * 1024 * 1024),
    };
    let service = SandboxService::new(V8Runtime::with_limits(limits));

    println!("1. Code that completes quickly:");
    let quick =
        "function run() { let sum = 0; for (let i = 0; i < 1000; i++) { sum += i } return sum }";
    let result = service.execute::<Value>(quick, "run", Arguments::new()).await?;
    println!("   Result: {:?}", result.return_value());

    println!("\n2. Infinite loop (should time out):");
    let start = Instant::now();
    let spin = "function run() { while (true) { Math.random() } }";
    let result = service.execute::<Value>(spin, "run", Arguments::new()).await?;
    if let Some(error) = result.error() {
        println!("   {:?} after {}ms: {}", error.kind, start.elapsed().as_millis(), error);
    }

    println!("\n3. Promise that never settles (should time out):");
    let pending = "async function run() { await new Promise(() => {}) }";
    let result = service.execute::<Value>(pending, "run", Arguments::new()).await?;
    if let Some(error) = result.error() {
        println!("   {:?}: {}", error.kind, error);
    }

    println!("\n4. Unbounded allocation (should hit the heap ceiling):");
    let hog = "function run() { const keep = []; for (;;) { keep.push(new Array(1000).fill(1)) } }";
    let result = service.execute::<Value>(hog, "run", Arguments::new()).await?;
    if let Some(error) = result.error() {
        println!("   {:?}: {}", error.kind, error);
    }

    Ok(())
}
