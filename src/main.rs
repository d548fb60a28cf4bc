mod estimate;
mod persistence;
mod telemetry;
mod walkthrough;

use anyhow::Result;
use estimate::EstimateAssembler;
use persistence::{BidDraft, BidStore, BidStoreConfig};
use telemetry::init_tracing;
use tracing::info;
use walkthrough::{SessionEvent, WalkthroughConfig, WalkthroughOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let store_config = match std::env::var("PAINTBID_DB_PATH") {
        Ok(path) => BidStoreConfig::file(path),
        Err(_) => BidStoreConfig::memory(),
    };
    let store = BidStore::bootstrap(store_config)?;

    let orchestrator = WalkthroughOrchestrator::simulated();
    let (handle, mut events) = orchestrator
        .start_session(WalkthroughConfig::default())
        .await?;

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::StepStarted { index, step, .. } => {
                info!(target: "session_manager", index, step = step.as_str(), "step started");
            }
            SessionEvent::Finished(result) => {
                let mut assembler = EstimateAssembler::new();
                assembler.add_suggested(result.suggested_items);

                let draft = BidDraft::new("demo-user", "Guided Scan Estimate", assembler.to_items());
                let bid = store.save_bid(&draft)?;
                info!(
                    target: "session_manager",
                    bid_id = %bid.id,
                    estimated_cost = bid.estimated_cost,
                    cancelled = result.cancelled,
                    "session result persisted"
                );
                break;
            }
            _ => {}
        }
    }

    drop(handle);
    Ok(())
}
