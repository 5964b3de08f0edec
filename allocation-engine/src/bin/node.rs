//! Allocation node binary
//!
//! Seeds the demo world, races two hospitals for the same donor, and logs the
//! resulting state and metrics.

use allocation_engine::{logging, AllocationEngine, Config, DemoDataset};
use donation_ledger::BloodGroup;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = if let Ok(config_path) = std::env::var("ALLOCATION_CONFIG") {
        Config::from_file(&config_path)?
    } else {
        Config::from_env()?
    };

    logging::init(&config.logging);
    info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting allocation node"
    );

    let engine = Arc::new(AllocationEngine::new(config)?);
    let demo = DemoDataset::load(&*engine)?;

    let candidates = engine.find_eligible_donors(BloodGroup::OPositive);
    info!(count = candidates.len(), "Eligible O+ donors");

    let Some(donor) = candidates.into_iter().next() else {
        warn!("No eligible O+ donor, nothing to race for");
        return Ok(());
    };

    // Second O+ request competing with the seeded pending one
    let rival = engine.create_request(&demo.hospitals[0], BloodGroup::OPositive, 1)?;

    let mut handles = Vec::new();
    for request_id in [demo.pending_request.clone(), rival.request_id.clone()] {
        let engine = Arc::clone(&engine);
        let donor_id = donor.donor_id.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let outcome = engine.assign_donors(&request_id, &[donor_id]);
            (request_id, outcome)
        }));
    }

    let mut winner = None;
    for handle in handles {
        match handle.await? {
            (request_id, Ok(_)) => {
                info!(request_id = %request_id, donor_id = %donor.donor_id, "Reservation won");
                winner = Some(request_id);
            }
            (request_id, Err(e)) => {
                info!(request_id = %request_id, error = %e, "Reservation lost");
            }
        }
    }

    if let Some(request_id) = winner {
        match engine.confirm_donation(&request_id, &donor.donor_id) {
            Ok(record) => {
                engine.approve_donation(&record.donation_id)?;
                info!(donation_id = %record.donation_id, "Donation confirmed and approved");
            }
            Err(e) => error!(error = %e, "Confirmation failed"),
        }
    }

    let snapshot = engine.snapshot();
    let violations = snapshot.invariant_violations();
    if !violations.is_empty() {
        error!(?violations, "Store invariants violated");
    }

    info!(snapshot = %serde_json::to_string(&snapshot)?, "Final state");
    info!(metrics = %engine.metrics().gather_text(), "Metrics");

    Ok(())
}
