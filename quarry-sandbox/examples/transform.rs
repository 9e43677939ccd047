//! Run a TypeScript data transform in a fresh sandbox

use quarry_sandbox::{ExecutionRequest, ExecutionResult, SandboxService, V8Runtime};
use serde::Deserialize;
use serde_json::json;

const TRANSFORM: &str = r#"
interface Order {
  id: number;
  total: number;
  region: string;
}

function summarize(orders: Order[], region: string) {
  const picked = orders.filter((o) => o.region === region);
  const revenue = picked.reduce((sum, o) => sum + o.total, 0);
  console.log(`summarized ${picked.length} orders`);
  return { region, count: picked.length, revenue };
}
"#;

#[derive(Debug, Deserialize)]
struct Summary {
    region: String,
    count: usize,
    revenue: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Sandboxed Transform ===\n");

    let service = SandboxService::new(V8Runtime::new());

    let request = ExecutionRequest::new(TRANSFORM, "summarize")
        .with_argument(
            "orders",
            json!([
                {"id": 1, "total": 12.5, "region": "eu"},
                {"id": 2, "total": 40.0, "region": "us"},
                {"id": 3, "total": 7.5, "region": "eu"},
            ]),
        )
        .with_argument("region", json!("eu"));

    match service.execute_request::<Summary>(request).await? {
        ExecutionResult::Success(summary) => {
            println!(
                "Summary: region={}, count={}, revenue={}",
                summary.region, summary.count, summary.revenue
            );
        }
        ExecutionResult::Failure(error) => {
            println!("Failed ({:?}): {}", error.kind, error);
        }
    }

    println!("\n=== Runtime Error With Position ===\n");

    let broken = concat!(
        "function run(rows: any[]) {\n",
        "  const first = rows[0];\n",
        "  return first.name.length;\n",
        "}",
    );
    let request = ExecutionRequest::new(broken, "run").with_argument("rows", json!([]));
    let result = service.execute_request::<usize>(request).await?;
    if let Some(error) = result.error() {
        println!("Error: {}", error);
        if let Some(position) = error.position {
            println!("At original position {}", position);
        }
    }

    Ok(())
}
