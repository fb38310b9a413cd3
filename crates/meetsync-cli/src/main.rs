//! meetsync demo
//!
//! Runs the whole pipeline in one process on the in-memory ports, admits one
//! sync task and follows it to the end.
//!
//! ```text
//! meetsync <meeting_id> [user_id] [--fail-at A|B|C]
//! ```
//!
//! Settings come from `MEETSYNC_*` environment variables; set
//! `MEETSYNC_LOG_FORMAT=json` for JSON logs and `RUST_LOG` for filtering.

use std::sync::Arc;

use meetsync_core::app::SyncAppBuilder;
use meetsync_core::config::PipelineConfig;
use meetsync_core::domain::{Stage, TaskStatus};
use meetsync_core::impls::ScriptedWork;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: meetsync <meeting_id> [user_id] [--fail-at A|B|C]";

#[derive(Debug)]
struct Args {
    meeting_id: String,
    user_id: String,
    fail_at: Option<Stage>,
}

fn parse_stage(raw: &str) -> Result<Stage, String> {
    match raw {
        "A" | "a" => Ok(Stage::A),
        "B" | "b" => Ok(Stage::B),
        "C" | "c" => Ok(Stage::C),
        other => Err(format!("unknown stage {other:?}; expected A, B or C")),
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut positional = Vec::new();
    let mut fail_at = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fail-at" => {
                let stage = args.next().ok_or("--fail-at needs a stage")?;
                fail_at = Some(parse_stage(&stage)?);
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let meeting_id = positional.next().ok_or(USAGE)?;
    let user_id = positional.next().unwrap_or_else(|| "demo-user".to_string());
    if positional.next().is_some() {
        return Err(USAGE.to_string());
    }
    Ok(Args {
        meeting_id,
        user_id,
        fail_at,
    })
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "meetsync_core=info,meetsync=info".into());
    let json = std::env::var("MEETSYNC_LOG_FORMAT").is_ok_and(|v| v == "json");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = parse_args(std::env::args().skip(1))?;

    let config = PipelineConfig::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;
    info!(
        node_id = %config.node_id,
        stage_delay_ms = config.stage_delay.as_millis() as u64,
        fault_one_in = config.fault_one_in,
        consumers_per_stage = config.consumers_per_stage,
        cache_ttl_seconds = config.cache_ttl.as_secs(),
        "Configuration loaded"
    );

    let mut builder = SyncAppBuilder::new().config(config.clone());
    if let Some(stage) = args.fail_at {
        builder = builder.stage_work(Arc::new(
            ScriptedWork::fail_at(stage).with_delay(config.stage_delay),
        ));
    }
    let app = builder.in_memory().build()?;

    let pipeline = app.spawn_pipeline().await?;
    let stopper = pipeline.stopper();
    let mut pipeline_task = tokio::spawn(pipeline.wait());

    let receipt = app.admission().admit(&args.meeting_id, &args.user_id).await?;
    let mut subscription = app.registry().subscribe(receipt.task_id);
    println!("{}", serde_json::to_string(&receipt)?);

    let final_status = loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if event.status.is_finished() {
                        break event.status;
                    }
                }
                // Replaced or evicted; the store knows the rest.
                None => break app.query().status(receipt.task_id, &args.user_id).await?,
            },
            joined = &mut pipeline_task => {
                let result = joined?;
                error!("pipeline stopped before the task finished");
                result?;
                return Err("pipeline stopped unexpectedly".into());
            }
            _ = signal::ctrl_c() => {
                warn!("Interrupted; shutting down");
                break app.query().status(receipt.task_id, &args.user_id).await?;
            }
        }
    };

    stopper.stop();
    pipeline_task.await??;

    let tasks = app.query().list_for_user(&args.user_id).await?;
    println!("{}", serde_json::to_string(&tasks)?);
    println!("{}", serde_json::to_string(&app.counts())?);

    info!(task_id = %receipt.task_id, status = %final_status, "done");
    match final_status {
        TaskStatus::Completed => Ok(()),
        other => Err(format!("task {} ended as {other}", receipt.task_id).into()),
    }
}
