//! Store abstraction for donors, hospitals, requests and the donation ledger
//!
//! The engine never mutates entities in place. A transaction reads copies,
//! computes the new values, and hands them to [`AllocationStore::commit`] as
//! one [`WriteSet`]. The store applies a write set completely or not at all.
//!
//! # Consistency
//!
//! - Reads return owned copies taken under one read lock (no torn request sets)
//! - `commit` validates every record append and every request invariant
//!   before touching any table
//! - The reservation index (donor → active request) is maintained by the
//!   store itself and rejects a write that would reserve one donor twice

use crate::types::{BloodRequest, Donor, Hospital};
use crate::{Error, Result};
use donation_ledger::{
    DonationId, DonationLedger, DonationRecord, DonorId, HospitalId, IdSequence, RequestId,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Kinds of entity the store issues identities for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// `DON…`
    Donor,
    /// `HOS…`
    Hospital,
    /// `REQ…`
    Request,
    /// `DREC…` (issued by the ledger)
    Donation,
}

impl EntityKind {
    /// Identity prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Donor => "DON",
            EntityKind::Hospital => "HOS",
            EntityKind::Request => "REQ",
            EntityKind::Donation => "DREC",
        }
    }
}

/// Entities to upsert and records to append, applied atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    /// Donors to insert or replace
    pub donors: Vec<Donor>,

    /// Hospitals to insert or replace
    pub hospitals: Vec<Hospital>,

    /// Requests to insert or replace
    pub requests: Vec<BloodRequest>,

    /// Donation records to append
    pub records: Vec<DonationRecord>,
}

impl WriteSet {
    /// Empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a donor
    pub fn donor(mut self, donor: Donor) -> Self {
        self.donors.push(donor);
        self
    }

    /// Add several donors
    pub fn donors(mut self, donors: impl IntoIterator<Item = Donor>) -> Self {
        self.donors.extend(donors);
        self
    }

    /// Add a hospital
    pub fn hospital(mut self, hospital: Hospital) -> Self {
        self.hospitals.push(hospital);
        self
    }

    /// Add a request
    pub fn request(mut self, request: BloodRequest) -> Self {
        self.requests.push(request);
        self
    }

    /// Add a donation record
    pub fn record(mut self, record: DonationRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Nothing to write
    pub fn is_empty(&self) -> bool {
        self.donors.is_empty()
            && self.hospitals.is_empty()
            && self.requests.is_empty()
            && self.records.is_empty()
    }
}

/// Consistent copy of everything in the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Donors ordered by id (issue order)
    pub donors: Vec<Donor>,
    /// Hospitals ordered by id
    pub hospitals: Vec<Hospital>,
    /// Requests ordered by id
    pub blood_requests: Vec<BloodRequest>,
    /// Records in append order
    pub donation_records: Vec<DonationRecord>,
}

impl StoreSnapshot {
    /// Check per-request invariants and the cross-request reservation rules
    ///
    /// Returns every violation found; an empty vector means consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut reserved: HashMap<&DonorId, &RequestId> = HashMap::new();

        for request in &self.blood_requests {
            if let Err(msg) = request.check_invariants() {
                violations.push(msg);
            }
            if !request.is_active() {
                continue;
            }
            for donor_id in &request.assigned_donors {
                if let Some(other) = reserved.insert(donor_id, &request.request_id) {
                    violations.push(format!(
                        "donor {} reserved on both {} and {}",
                        donor_id, other, request.request_id
                    ));
                }
            }
        }

        for donor in &self.donors {
            let is_reserved = reserved.contains_key(&donor.donor_id);
            if donor.is_available == is_reserved {
                violations.push(format!(
                    "donor {} is_available={} but reserved={}",
                    donor.donor_id, donor.is_available, is_reserved
                ));
            }
        }

        violations
    }
}

/// Storage seam the engine is written against
pub trait AllocationStore: Send + Sync {
    /// Issue a fresh identity of `kind`
    fn next_id(&self, kind: EntityKind) -> String;

    /// Donor by id
    fn donor(&self, donor_id: &DonorId) -> Option<Donor>;

    /// Hospital by id
    fn hospital(&self, hospital_id: &HospitalId) -> Option<Hospital>;

    /// Request by id
    fn request(&self, request_id: &RequestId) -> Option<BloodRequest>;

    /// Donation record by id
    fn donation(&self, donation_id: &DonationId) -> Option<DonationRecord>;

    /// Active request holding a reservation for `donor_id`
    fn active_reservation(&self, donor_id: &DonorId) -> Option<RequestId>;

    /// Records not yet approved, in append order
    fn unverified_donations(&self) -> Vec<DonationRecord>;

    /// One donor's records, in append order
    fn donations_by_donor(&self, donor_id: &DonorId) -> Vec<DonationRecord>;

    /// Consistent copy of all tables
    fn snapshot(&self) -> StoreSnapshot;

    /// Apply a write set atomically
    fn commit(&self, writes: WriteSet) -> Result<()>;

    /// Flip a record's verification flag
    fn approve_donation(&self, donation_id: &DonationId) -> Result<DonationRecord>;
}

struct Tables {
    donors: BTreeMap<DonorId, Donor>,
    hospitals: BTreeMap<HospitalId, Hospital>,
    requests: BTreeMap<RequestId, BloodRequest>,
    ledger: DonationLedger,
    /// donor -> active request holding it
    reservations: HashMap<DonorId, RequestId>,
}

impl Tables {
    /// Compute the reservation index as it would look after `writes`
    fn reservations_after(&self, writes: &WriteSet) -> Result<HashMap<DonorId, RequestId>> {
        let mut next = self.reservations.clone();
        let written: HashSet<&RequestId> = writes.requests.iter().map(|r| &r.request_id).collect();
        next.retain(|_, request_id| !written.contains(&*request_id));

        for request in writes.requests.iter().filter(|r| r.is_active()) {
            for donor_id in &request.assigned_donors {
                if let Some(existing) = next.insert(donor_id.clone(), request.request_id.clone()) {
                    if existing != request.request_id {
                        return Err(Error::InvariantViolation(format!(
                            "donor {} would be reserved on both {} and {}",
                            donor_id, existing, request.request_id
                        )));
                    }
                }
            }
        }
        Ok(next)
    }
}

/// In-process store guarded by a single reader/writer lock
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    donor_ids: IdSequence,
    hospital_ids: IdSequence,
    request_ids: IdSequence,
}

impl InMemoryStore {
    /// Empty store
    pub fn new(config: &donation_ledger::Config) -> Self {
        Self {
            tables: RwLock::new(Tables {
                donors: BTreeMap::new(),
                hospitals: BTreeMap::new(),
                requests: BTreeMap::new(),
                ledger: DonationLedger::new(config),
                reservations: HashMap::new(),
            }),
            donor_ids: IdSequence::new(EntityKind::Donor.prefix(), config.id_width),
            hospital_ids: IdSequence::new(EntityKind::Hospital.prefix(), config.id_width),
            request_ids: IdSequence::new(EntityKind::Request.prefix(), config.id_width),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(&donation_ledger::Config::default())
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("InMemoryStore")
            .field("donors", &tables.donors.len())
            .field("hospitals", &tables.hospitals.len())
            .field("requests", &tables.requests.len())
            .field("records", &tables.ledger.len())
            .finish()
    }
}

impl AllocationStore for InMemoryStore {
    fn next_id(&self, kind: EntityKind) -> String {
        match kind {
            EntityKind::Donor => self.donor_ids.next(),
            EntityKind::Hospital => self.hospital_ids.next(),
            EntityKind::Request => self.request_ids.next(),
            EntityKind::Donation => self.tables.read().ledger.next_id().to_string(),
        }
    }

    fn donor(&self, donor_id: &DonorId) -> Option<Donor> {
        self.tables.read().donors.get(donor_id).cloned()
    }

    fn hospital(&self, hospital_id: &HospitalId) -> Option<Hospital> {
        self.tables.read().hospitals.get(hospital_id).cloned()
    }

    fn request(&self, request_id: &RequestId) -> Option<BloodRequest> {
        self.tables.read().requests.get(request_id).cloned()
    }

    fn donation(&self, donation_id: &DonationId) -> Option<DonationRecord> {
        self.tables.read().ledger.get(donation_id).ok().cloned()
    }

    fn active_reservation(&self, donor_id: &DonorId) -> Option<RequestId> {
        self.tables.read().reservations.get(donor_id).cloned()
    }

    fn unverified_donations(&self) -> Vec<DonationRecord> {
        self.tables.read().ledger.unverified().cloned().collect()
    }

    fn donations_by_donor(&self, donor_id: &DonorId) -> Vec<DonationRecord> {
        self.tables.read().ledger.by_donor(donor_id).cloned().collect()
    }

    fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.read();
        StoreSnapshot {
            donors: tables.donors.values().cloned().collect(),
            hospitals: tables.hospitals.values().cloned().collect(),
            blood_requests: tables.requests.values().cloned().collect(),
            donation_records: tables.ledger.records().to_vec(),
        }
    }

    fn commit(&self, writes: WriteSet) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write();

        // Validate everything first; nothing below may fail
        for request in &writes.requests {
            request.check_invariants().map_err(Error::InvariantViolation)?;
        }
        let mut appended = HashSet::new();
        for record in &writes.records {
            tables.ledger.check_append(record)?;
            if !appended.insert(&record.donation_id) {
                return Err(donation_ledger::Error::DuplicateRecord(record.donation_id.to_string()).into());
            }
        }
        let reservations = tables.reservations_after(&writes)?;

        for donor in writes.donors {
            tables.donors.insert(donor.donor_id.clone(), donor);
        }
        for hospital in writes.hospitals {
            tables.hospitals.insert(hospital.hospital_id.clone(), hospital);
        }
        for request in writes.requests {
            tables.requests.insert(request.request_id.clone(), request);
        }
        for record in writes.records {
            tables.ledger.append(record)?;
        }
        tables.reservations = reservations;

        Ok(())
    }

    fn approve_donation(&self, donation_id: &DonationId) -> Result<DonationRecord> {
        Ok(self.tables.write().ledger.approve(donation_id)?)
    }
}
