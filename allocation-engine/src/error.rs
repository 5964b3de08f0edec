//! Error types for the allocation engine
//!
//! Every variant except [`Error::Contention`] is a rejected precondition: the
//! engine made no change and retrying the same call will fail the same way.

use crate::types::RequestStatus;
use donation_ledger::{DonorId, HospitalId, RequestId};
use thiserror::Error;

/// Result type for allocation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Allocation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Hospital exists but has not been verified
    #[error("Hospital {0} is not verified")]
    UnverifiedHospital(HospitalId),

    /// Operation not allowed in the request's current status
    #[error("Request {request_id} is {status}, operation not allowed")]
    InvalidRequestState {
        /// Request
        request_id: RequestId,
        /// Status at the time of the call
        status: RequestStatus,
    },

    /// More new donors than open slots
    #[error("Request {request_id} has {open_slots} open slot(s), {requested} donor(s) supplied")]
    CapacityExceeded {
        /// Request
        request_id: RequestId,
        /// Distinct donors not already assigned
        requested: usize,
        /// quantity - fulfilled - assigned
        open_slots: usize,
    },

    /// Donor is already reserved on another active request
    #[error("Donor {donor_id} is already reserved on request {request_id}")]
    DonorAlreadyReserved {
        /// Donor
        donor_id: DonorId,
        /// Request currently holding the reservation
        request_id: RequestId,
    },

    /// Donor already donated against this request
    #[error("Donor {donor_id} already donated for request {request_id}")]
    DonorAlreadyDonated {
        /// Donor
        donor_id: DonorId,
        /// Request
        request_id: RequestId,
    },

    /// Donor fails blood group or cool-down screening
    #[error("Donor {donor_id} is not eligible: {reason}")]
    DonorIneligible {
        /// Donor
        donor_id: DonorId,
        /// Human-readable reason
        reason: String,
    },

    /// Donor has no reservation on any active request
    #[error("No active assignment for donor {0}")]
    NoActiveAssignment(DonorId),

    /// Entity lookup failed
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("donor", "request", ...)
        entity: &'static str,
        /// Identity that was looked up
        id: String,
    },

    /// Donor is not reserved on the request being confirmed
    #[error("Donor {donor_id} is not assigned to request {request_id}")]
    DonorNotAssigned {
        /// Donor
        donor_id: DonorId,
        /// Request
        request_id: RequestId,
    },

    /// Malformed input (zero quantity, empty name, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity locks could not be acquired in time
    #[error("Contention: {0}")]
    Contention(String),

    /// Write would break a store invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(donation_ledger::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Build a `NotFound` for any identity
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when the caller may retry the same call
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Contention(_))
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnverifiedHospital(_) => "unverified_hospital",
            Error::InvalidRequestState { .. } => "invalid_request_state",
            Error::CapacityExceeded { .. } => "capacity_exceeded",
            Error::DonorAlreadyReserved { .. } => "donor_already_reserved",
            Error::DonorAlreadyDonated { .. } => "donor_already_donated",
            Error::DonorIneligible { .. } => "donor_ineligible",
            Error::NoActiveAssignment(_) => "no_active_assignment",
            Error::NotFound { .. } => "not_found",
            Error::DonorNotAssigned { .. } => "donor_not_assigned",
            Error::InvalidInput(_) => "invalid_input",
            Error::Contention(_) => "contention",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Ledger(_) => "ledger",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }
}

impl From<donation_ledger::Error> for Error {
    fn from(err: donation_ledger::Error) -> Self {
        match err {
            donation_ledger::Error::RecordNotFound(id) => Error::NotFound {
                entity: "donation",
                id,
            },
            donation_ledger::Error::InvalidValue(msg) => Error::InvalidInput(msg),
            donation_ledger::Error::Config(msg) => Error::Config(msg),
            other => Error::Ledger(other),
        }
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_contention_is_retryable() {
        assert!(Error::Contention("busy".into()).is_retryable());
        assert!(!Error::NoActiveAssignment(DonorId::new("DON001")).is_retryable());
        assert!(!Error::not_found("donor", "DON001").is_retryable());
    }

    #[test]
    fn test_ledger_not_found_maps_to_not_found() {
        let err: Error = donation_ledger::Error::RecordNotFound("DREC009".into()).into();
        assert_eq!(err, Error::not_found("donation", "DREC009"));
    }

    #[test]
    fn test_display_mentions_ids() {
        let err = Error::DonorAlreadyReserved {
            donor_id: DonorId::new("DON001"),
            request_id: RequestId::new("REQ002"),
        };
        let text = err.to_string();
        assert!(text.contains("DON001"));
        assert!(text.contains("REQ002"));
    }
}
