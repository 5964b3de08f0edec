//! Blood Allocation Engine
//!
//! Matches voluntary donors to hospital blood requests and records confirmed
//! donations in an append-only ledger.
//!
//! # Architecture

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]
//!
//! Every state-changing operation is one transaction:
//!
//! 1. **Lock**: Acquire per-entity locks for the request and donors involved
//! 2. **Validate**: Re-read current state and check every precondition
//! 3. **Compute**: Apply the request lifecycle rules to copies
//! 4. **Commit**: Hand the write set to the store, applied all-or-nothing
//!
//! # Invariants
//!
//! - A donor is reserved on at most one active request
//! - `is_available` is false exactly while a donor holds a reservation
//! - `fulfilled <= quantity`, and assigned and fulfilled never overlap
//! - Fulfilled and cancelled requests hold no reservations
//! - A donation record is created exactly once per confirmed donation
//!
//! # Example
//!
//! ```no_run
//! use allocation_engine::{AllocationEngine, Config};
//! use donation_ledger::BloodGroup;
//!
//! fn main() -> allocation_engine::Result<()> {
//!     let engine = AllocationEngine::new(Config::from_env()?)?;
//!
//!     for donor in engine.find_eligible_donors(BloodGroup::ONegative) {
//!         println!("{} ({})", donor.name, donor.donor_id);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_debug_implementations, clippy::all)]

pub mod types;
pub mod eligibility;
pub mod lifecycle;
pub mod store;
pub mod locks;
pub mod engine;
pub mod error;
pub mod config;
pub mod metrics;
pub mod logging;
pub mod demo;

// Re-exports
pub use error::{Error, Result};
pub use types::{BloodRequest, Donor, Gender, Hospital, NewDonor, NewHospital, RequestStatus};
pub use config::Config;
pub use eligibility::EligibilityEvaluator;
pub use store::{AllocationStore, InMemoryStore, StoreSnapshot, WriteSet};
pub use engine::AllocationEngine;
pub use metrics::Metrics;
pub use demo::DemoDataset;
