//! Donation Ledger
//!
//! Append-only record of confirmed blood donations, plus the identity and
//! blood group types shared with the allocation engine.
//!
//! # Invariants
//!
//! - Append-only: records are never deleted or replaced
//! - The only mutation is the one-way `is_verified_by_admin` flip
//! - Record identities are unique and issued in sequence

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod ledger;
pub mod error;
pub mod config;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    BloodGroup, DonationId, DonationRecord, DonorId, HospitalId, IdSequence, RequestId,
};
pub use ledger::DonationLedger;
pub use config::Config;
