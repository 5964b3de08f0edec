//! Append-only donation ledger
//!
//! Records are kept in append order with a secondary index by identity. The
//! ledger performs no locking of its own: the allocation store owns it and
//! serializes access together with the donor and request maps, so a record
//! and the state change that produced it land in the same critical section.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use donation_ledger::{Config, DonationLedger, DonationRecord, DonorId, RequestId};
//!
//! let mut ledger = DonationLedger::new(&Config::default());
//! let record = DonationRecord::new(
//!     ledger.next_id(),
//!     DonorId::new("DON001"),
//!     RequestId::new("REQ001"),
//!     Utc::now(),
//! );
//! let id = ledger.append(record).unwrap().donation_id.clone();
//! assert!(ledger.approve(&id).unwrap().is_verified_by_admin);
//! ```

use crate::{
    types::{DonationId, DonationRecord, DonorId, IdSequence},
    Config, Error, Result,
};
use std::collections::HashMap;

/// Append-only collection of donation records
#[derive(Debug)]
pub struct DonationLedger {
    /// Records in append order
    records: Vec<DonationRecord>,

    /// donation_id -> position in `records`
    index: HashMap<DonationId, usize>,

    /// Identity issuer
    ids: IdSequence,
}

impl DonationLedger {
    /// Create an empty ledger
    pub fn new(config: &Config) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            ids: IdSequence::new(config.donation_prefix.clone(), config.id_width),
        }
    }

    /// Issue a fresh record identity
    pub fn next_id(&self) -> DonationId {
        DonationId::new(self.ids.next())
    }

    /// Check that `record` could be appended, without appending it
    pub fn check_append(&self, record: &DonationRecord) -> Result<()> {
        if self.index.contains_key(&record.donation_id) {
            return Err(Error::DuplicateRecord(record.donation_id.to_string()));
        }
        Ok(())
    }

    /// Append a record
    ///
    /// Rejects a record whose identity is already present; existing records
    /// are never replaced.
    pub fn append(&mut self, record: DonationRecord) -> Result<&DonationRecord> {
        self.check_append(&record)?;

        let position = self.records.len();
        self.index.insert(record.donation_id.clone(), position);
        self.records.push(record);

        tracing::debug!(
            donation_id = %self.records[position].donation_id,
            donor_id = %self.records[position].donor_id,
            request_id = %self.records[position].request_id,
            "Donation recorded"
        );

        Ok(&self.records[position])
    }

    /// Mark a record as verified by an administrator
    ///
    /// Approving an already approved record is a no-op.
    pub fn approve(&mut self, donation_id: &DonationId) -> Result<DonationRecord> {
        let position = *self
            .index
            .get(donation_id)
            .ok_or_else(|| Error::RecordNotFound(donation_id.to_string()))?;

        let record = &mut self.records[position];
        if !record.is_verified_by_admin {
            record.is_verified_by_admin = true;
            tracing::info!(donation_id = %donation_id, "Donation approved");
        }

        Ok(record.clone())
    }

    /// Get record by identity
    pub fn get(&self, donation_id: &DonationId) -> Result<&DonationRecord> {
        self.index
            .get(donation_id)
            .map(|&position| &self.records[position])
            .ok_or_else(|| Error::RecordNotFound(donation_id.to_string()))
    }

    /// All records in append order
    pub fn records(&self) -> &[DonationRecord] {
        &self.records
    }

    /// Records for one donor, in append order
    pub fn by_donor<'a>(&'a self, donor_id: &'a DonorId) -> impl Iterator<Item = &'a DonationRecord> {
        self.records.iter().filter(move |r| &r.donor_id == donor_id)
    }

    /// Records still awaiting admin approval
    pub fn unverified(&self) -> impl Iterator<Item = &DonationRecord> {
        self.records.iter().filter(|r| !r.is_verified_by_admin)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
