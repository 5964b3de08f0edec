//! Request lifecycle rules
//!
//! ```text
//!            assign                confirm (fulfilled >= quantity)
//! Pending ───────────▶ InProgress ─────────────────────────────▶ Fulfilled
//!    ▲                    │  │
//!    └── last release ────┘  └── cancel_request ──▶ Cancelled
//! ```
//!
//! These functions mutate a request value only. They return the donors whose
//! reservation they dropped so the caller can flip availability in the same
//! write. Preconditions that need cross-entity state (reservations elsewhere,
//! donor existence) are checked by the transaction layer before calling in.

use crate::types::{BloodRequest, RequestStatus};
use crate::{Error, Result};
use donation_ledger::DonorId;

/// Fail unless the request is Pending or InProgress
pub fn ensure_active(request: &BloodRequest) -> Result<()> {
    if request.is_active() {
        Ok(())
    } else {
        Err(Error::InvalidRequestState {
            request_id: request.request_id.clone(),
            status: request.status,
        })
    }
}

/// Reserve `donor_ids` on the request
///
/// Ids already assigned are skipped. Moves the request to InProgress once it
/// holds any reservation.
pub fn assign(request: &mut BloodRequest, donor_ids: &[DonorId]) -> Result<()> {
    ensure_active(request)?;

    for donor_id in donor_ids {
        if !request.is_assigned(donor_id) {
            request.assigned_donors.push(donor_id.clone());
        }
    }

    if !request.assigned_donors.is_empty() {
        request.status = RequestStatus::InProgress;
    }
    Ok(())
}

/// Drop one reservation
///
/// Returns false when the donor was not assigned here. A request left with
/// no reservations and no donations goes back to Pending.
pub fn release(request: &mut BloodRequest, donor_id: &DonorId) -> bool {
    let before = request.assigned_donors.len();
    request.assigned_donors.retain(|d| d != donor_id);
    if request.assigned_donors.len() == before {
        return false;
    }

    if request.is_active() && request.assigned_donors.is_empty() && request.fulfilled_by.is_empty() {
        request.status = RequestStatus::Pending;
    }
    true
}

/// Count a completed donation
///
/// Moves the donor from `assigned_donors` to `fulfilled_by`. When the
/// quantity is reached the request becomes Fulfilled and every remaining
/// reservation is dropped; those donors are returned.
pub fn record_donation(request: &mut BloodRequest, donor_id: &DonorId) -> Result<Vec<DonorId>> {
    ensure_active(request)?;

    request.assigned_donors.retain(|d| d != donor_id);
    if !request.is_fulfilled_by(donor_id) {
        request.fulfilled_by.push(donor_id.clone());
    }

    if request.fulfilled_by.len() >= request.quantity as usize {
        request.status = RequestStatus::Fulfilled;
        return Ok(std::mem::take(&mut request.assigned_donors));
    }

    request.status = RequestStatus::InProgress;
    Ok(Vec::new())
}

/// Withdraw the request
///
/// Terminal requests are rejected. Returns the donors whose reservation was
/// dropped.
pub fn cancel(request: &mut BloodRequest) -> Result<Vec<DonorId>> {
    ensure_active(request)?;
    request.status = RequestStatus::Cancelled;
    Ok(std::mem::take(&mut request.assigned_donors))
}
