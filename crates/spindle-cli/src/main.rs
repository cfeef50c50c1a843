use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use spindle_core::app::{UnknownActivityPolicy, WorkerConfig};
use spindle_core::domain::FailureDetails;
use spindle_core::impls::InMemoryService;
use spindle_core::telemetry::init_tracing;
use spindle_core::typed::PayloadCodec;
use spindle_core::{
    Activity, ActivityContext, ActivityError, ActivityImplementation, ImplementationScope, Worker,
};
use tracing::{info, warn};

/// Greeter：複数メソッドを 1 つの実装としてまとめて登録する例
struct Greeter {
    greeting: String,
}

impl Greeter {
    fn hello(&self, name: &str) -> Result<String, ActivityError> {
        if name.trim().is_empty() {
            return Err(ActivityError::new("ValueError", "bad name"));
        }
        Ok(format!("{} {name}", self.greeting))
    }
}

impl ActivityImplementation for Greeter {
    fn register_methods(self: Arc<Self>, scope: &mut ImplementationScope<'_>) {
        scope.method("hello", &self, |this, _ctx, (name,): (String,)| async move {
            this.hello(&name)
        });
    }
}

#[derive(Debug, Serialize)]
struct Quote {
    total_cents: u64,
    attempt: i32,
}

/// Activity trait を直接実装する例（context を使う）
struct PriceQuote;

#[async_trait]
impl Activity for PriceQuote {
    type Args = (u64, u32);
    type Output = Quote;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        (unit_cents, quantity): (u64, u32),
    ) -> Result<Quote, ActivityError> {
        let total_cents = unit_cents
            .checked_mul(u64::from(quantity))
            .ok_or_else(|| ActivityError::new("OverflowError", "total does not fit in u64"))?;
        Ok(Quote {
            total_cents,
            attempt: ctx.attempt(),
        })
    }
}

fn demo_config() -> WorkerConfig {
    match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "falling back to the demo configuration");
            let mut config = WorkerConfig::new("127.0.0.1", 7933, "samples", "greetings");
            config.activity_timeout = Some(Duration::from_secs(5));
            config.unknown_activity_policy = UnknownActivityPolicy::Abandon;
            config
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = demo_config();
    info!(endpoint = %config.endpoint(), domain = %config.domain, "spindle demo");

    let service = Arc::new(InMemoryService::with_poll_timeout(Duration::from_millis(500)));
    service.enqueue_args("tok-1", "Greeter::hello", &("World",)).await?;
    service.enqueue_args("tok-2", "Greeter::hello", &(" ",)).await?;
    service.enqueue_args("tok-3", "Pricing::quote", &(1250_u64, 3_u32)).await?;
    service.enqueue_args("tok-4", "Greeter::goodbye", &("World",)).await?;

    let worker = Worker::builder(config)
        .service(service.clone())
        .register_implementation(
            Greeter {
                greeting: "Hello".to_string(),
            },
            None,
        )
        .register("Pricing::quote", PriceQuote)
        .expect_activities(&["Greeter::hello", "Pricing::quote"])
        .build()?;

    let handle = worker.start();

    // tok-4 は未登録なので応答は 3 件
    if !service.wait_for_responses(3, Duration::from_secs(5)).await {
        warn!("timed out waiting for responses");
    }
    let stats = handle.stats();
    handle.shutdown_and_join().await?;

    for completed in service.completed().await {
        let result: serde_json::Value =
            PayloadCodec::decode_result(completed.result.as_deref().unwrap_or(b"null"))?;
        println!(
            "completed {} -> {result}",
            String::from_utf8_lossy(&completed.task_token),
        );
    }
    for failed in service.failed().await {
        let details: FailureDetails =
            serde_json::from_slice(failed.details.as_deref().unwrap_or_default())?;
        println!(
            "failed    {} -> {}",
            String::from_utf8_lossy(&failed.task_token),
            details.detail_message,
        );
    }
    println!("stats: {}", serde_json::to_string(&stats)?);

    Ok(())
}
