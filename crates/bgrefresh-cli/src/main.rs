//! bgrefresh - in-memory の adapter で background refresh の流れを再現する
//!
//! ```text
//! bgrefresh [config.json]
//! RUST_LOG=bgrefresh_core=debug bgrefresh
//! ```
//!
//! background に入る → request 提出 → launch → action → completion → 再提出
//! を数サイクル回し、最後に status と lifecycle event を JSON で出す。

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use bgrefresh_core::impls::{
    InMemoryAssertions, InMemoryHost, InMemoryScheduler, RecordingEventSink,
};
use bgrefresh_core::ports::{Clock, SystemClock};
use bgrefresh_core::{RefreshBuilder, RefreshConfig, TaskIdentifier};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_IDENTIFIER: &str = "com.example.refresh";
const CYCLES: u64 = 3;
/// How long the demo action claims processing time for.
const WORK: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => RefreshConfig::from_json(&std::fs::read_to_string(&path)?)?,
        None => RefreshConfig::new(TaskIdentifier::new(DEFAULT_IDENTIFIER)?),
    };
    let identifier = config.identifier.clone();

    // (A) host 側の adapter
    let scheduler = InMemoryScheduler::new().permit(identifier.clone());
    let assertions = InMemoryAssertions::new();
    let host = InMemoryHost::new();
    let events = RecordingEventSink::new();

    // (B) manager を組み立てる。action は processing を宣言して仕事を別 task に出す
    let manager = RefreshBuilder::from_config(config)
        .scheduler(Arc::new(scheduler.clone()))
        .assertions(Arc::new(assertions.clone()))
        .host(Arc::new(host.clone()))
        .event_sink(Arc::new(events.clone()))
        .action(|refresh| {
            if refresh.set_processing(true).is_err() {
                return;
            }
            let refresh = refresh.clone();
            tokio::spawn(async move {
                sleep(WORK).await;
                info!(task = %refresh.identifier(), "demo work finished");
                if let Err(err) = refresh.set_processing(false) {
                    warn!(%err, "could not hand processing back");
                }
            });
        })
        .build()?;
    let handle = manager.handle().clone();
    let mut status = handle.subscribe();

    // (C) background に入ると最初の request が提出される
    host.enter_background();
    handle.status().await?;

    // (D) スケジューラの時計を earliest start まで進めて launch させる
    for cycle in 1..=CYCLES {
        let Some(pending) = scheduler.pending(&identifier) else {
            warn!(cycle, "no pending request; stopping early");
            break;
        };
        let due = pending.earliest_start.unwrap_or_else(|| SystemClock.now());
        scheduler.launch_due(due);

        status
            .wait_for(|st| st.completed_cycles >= cycle || st.stopped)
            .await?;
        info!(cycle, "cycle finished");
    }

    // (E) 結果を出して止める
    println!("{}", serde_json::to_string_pretty(&handle.status().await?)?);
    for event in events.events() {
        println!("{}", serde_json::to_string(&event)?);
    }
    manager.shutdown().await?;

    info!(
        completions = scheduler.completions().len(),
        assertions_acquired = assertions.acquired(),
        assertions_released = assertions.released(),
        "simulation finished"
    );
    Ok(())
}
