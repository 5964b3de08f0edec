//! Core types for the allocation engine
//!
//! Field names serialize in camelCase so snapshots match the shape the
//! surrounding application already consumes.

use chrono::{DateTime, Utc};
use donation_ledger::{BloodGroup, DonorId, HospitalId, RequestId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Donor gender as captured at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    /// Male
    Male,
    /// Female
    Female,
    /// Other / undisclosed
    Other,
}

/// Registered donor
///
/// `is_available` and `last_donation_date` are independent: the first says
/// whether the donor is reserved on a request, the second drives cool-down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    /// Donor ID
    pub donor_id: DonorId,

    /// Full name
    pub name: String,

    /// Age in years
    pub age: u32,

    /// Gender
    pub gender: Gender,

    /// Blood group
    pub blood_group: BloodGroup,

    /// Contact phone
    pub phone: String,

    /// Postal address
    pub address: String,

    /// Last confirmed donation, if any
    pub last_donation_date: Option<DateTime<Utc>>,

    /// False while reserved against a request
    pub is_available: bool,
}

/// Donor registration payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDonor {
    /// Full name
    pub name: String,
    /// Age in years
    pub age: u32,
    /// Gender
    pub gender: Gender,
    /// Blood group
    pub blood_group: BloodGroup,
    /// Contact phone
    pub phone: String,
    /// Postal address
    pub address: String,
}

/// Hospital that may raise blood requests once verified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    /// Hospital ID
    pub hospital_id: HospitalId,

    /// Display name
    pub name: String,

    /// Contact phone
    pub contact: String,

    /// City / site
    pub location: String,

    /// Set by an administrator
    pub is_verified: bool,
}

/// Hospital registration payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHospital {
    /// Display name
    pub name: String,
    /// Contact phone
    pub contact: String,
    /// City / site
    pub location: String,
}

/// Request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// No reservations yet (or all released)
    Pending,
    /// At least one donor reserved or donated
    #[serde(rename = "In Progress")]
    InProgress,
    /// Quantity reached (terminal)
    Fulfilled,
    /// Withdrawn (terminal)
    Cancelled,
}

impl RequestStatus {
    /// Pending or InProgress
    pub fn is_active(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::InProgress)
    }

    /// Fulfilled or Cancelled
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Label used in the UI and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::InProgress => "In Progress",
            RequestStatus::Fulfilled => "Fulfilled",
            RequestStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hospital's ask for `quantity` units of one blood group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequest {
    /// Request ID
    pub request_id: RequestId,

    /// Owning hospital
    pub hospital_id: HospitalId,

    /// Blood group needed
    pub blood_group: BloodGroup,

    /// Units needed
    pub quantity: u32,

    /// Creation instant
    pub request_date: DateTime<Utc>,

    /// Lifecycle status
    pub status: RequestStatus,

    /// Reserved, not yet donated (insertion order, no duplicates)
    pub assigned_donors: Vec<DonorId>,

    /// Completed donations (insertion order, no duplicates)
    pub fulfilled_by: Vec<DonorId>,
}

impl BloodRequest {
    /// Fresh pending request
    pub fn new(
        request_id: RequestId,
        hospital_id: HospitalId,
        blood_group: BloodGroup,
        quantity: u32,
        request_date: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            hospital_id,
            blood_group,
            quantity,
            request_date,
            status: RequestStatus::Pending,
            assigned_donors: Vec::new(),
            fulfilled_by: Vec::new(),
        }
    }

    /// Pending or InProgress
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Donor currently reserved here
    pub fn is_assigned(&self, donor_id: &DonorId) -> bool {
        self.assigned_donors.contains(donor_id)
    }

    /// Donor already donated here
    pub fn is_fulfilled_by(&self, donor_id: &DonorId) -> bool {
        self.fulfilled_by.contains(donor_id)
    }

    /// quantity - fulfilled - assigned, floored at zero
    pub fn open_slots(&self) -> usize {
        (self.quantity as usize)
            .saturating_sub(self.fulfilled_by.len())
            .saturating_sub(self.assigned_donors.len())
    }

    /// Check the per-request structural invariants
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if let Some(dup) = self.assigned_donors.iter().find(|d| self.fulfilled_by.contains(d)) {
            return Err(format!(
                "{}: donor {} is both assigned and fulfilled",
                self.request_id, dup
            ));
        }
        if self.fulfilled_by.len() > self.quantity as usize {
            return Err(format!(
                "{}: {} donations exceed quantity {}",
                self.request_id,
                self.fulfilled_by.len(),
                self.quantity
            ));
        }
        for set in [&self.assigned_donors, &self.fulfilled_by] {
            for (i, donor) in set.iter().enumerate() {
                if set[..i].contains(donor) {
                    return Err(format!("{}: donor {} listed twice", self.request_id, donor));
                }
            }
        }
        if self.status.is_terminal() && !self.assigned_donors.is_empty() {
            return Err(format!(
                "{}: {} request still holds reservations",
                self.request_id, self.status
            ));
        }
        if self.status == RequestStatus::Pending
            && !(self.assigned_donors.is_empty() && self.fulfilled_by.is_empty())
        {
            return Err(format!("{}: pending request has donors", self.request_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: u32) -> BloodRequest {
        BloodRequest::new(
            RequestId::new("REQ001"),
            HospitalId::new("HOS001"),
            BloodGroup::ONegative,
            quantity,
            Utc::now(),
        )
    }

    #[test]
    fn test_status_terminal() {
        assert!(RequestStatus::Pending.is_active());
        assert!(RequestStatus::InProgress.is_active());
        assert!(RequestStatus::Fulfilled.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_wire_label() {
        let json = serde_json::to_string(&RequestStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        assert_eq!(RequestStatus::InProgress.to_string(), "In Progress");
    }

    #[test]
    fn test_open_slots() {
        let mut req = request(3);
        assert_eq!(req.open_slots(), 3);

        req.assigned_donors.push(DonorId::new("DON001"));
        req.fulfilled_by.push(DonorId::new("DON002"));
        assert_eq!(req.open_slots(), 1);
    }

    #[test]
    fn test_invariants_detect_overlap() {
        let mut req = request(2);
        req.status = RequestStatus::InProgress;
        req.assigned_donors.push(DonorId::new("DON001"));
        assert!(req.check_invariants().is_ok());

        req.fulfilled_by.push(DonorId::new("DON001"));
        assert!(req.check_invariants().is_err());
    }

    #[test]
    fn test_invariants_detect_overfill() {
        let mut req = request(1);
        req.status = RequestStatus::Fulfilled;
        req.fulfilled_by = vec![DonorId::new("DON001"), DonorId::new("DON002")];
        assert!(req.check_invariants().is_err());
    }

    #[test]
    fn test_request_json_shape() {
        let value = serde_json::to_value(request(2)).unwrap();
        assert_eq!(value["requestId"], "REQ001");
        assert_eq!(value["bloodGroup"], "O-");
        assert_eq!(value["status"], "Pending");
        assert!(value["assignedDonors"].as_array().unwrap().is_empty());
    }
}
