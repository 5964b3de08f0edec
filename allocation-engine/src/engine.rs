//! Allocation transactions
//!
//! The composition root: every operation the surrounding application calls
//! goes through [`AllocationEngine`]. Each write follows the same shape:
//!
//! 1. Lock every request and donor the transaction touches (sorted, bounded)
//! 2. Re-read those entities from the store and check all preconditions
//! 3. Compute the new values with the lifecycle rules
//! 4. Commit one [`WriteSet`]
//!
//! Nothing is written until step 4, and the store applies a write set in
//! full or not at all, so a rejected call leaves no trace.
//!
//! # Example
//!
//! ```
//! use allocation_engine::{AllocationEngine, Config, NewDonor, NewHospital, Gender};
//! use donation_ledger::BloodGroup;
//!
//! let engine = AllocationEngine::new(Config::default()).unwrap();
//! let hospital = engine.register_hospital(NewHospital {
//!     name: "City General Hospital".into(),
//!     contact: "555-111-2222".into(),
//!     location: "Cityville".into(),
//! }).unwrap();
//! engine.verify_hospital(&hospital.hospital_id).unwrap();
//!
//! let donor = engine.register_donor(NewDonor {
//!     name: "John Doe".into(),
//!     age: 30,
//!     gender: Gender::Male,
//!     blood_group: BloodGroup::OPositive,
//!     phone: "123-456-7890".into(),
//!     address: "123 Main St".into(),
//! }).unwrap();
//!
//! let request = engine.create_request(&hospital.hospital_id, BloodGroup::OPositive, 1).unwrap();
//! engine.assign_donors(&request.request_id, &[donor.donor_id.clone()]).unwrap();
//! let record = engine.confirm_donation(&request.request_id, &donor.donor_id).unwrap();
//! assert!(!record.is_verified_by_admin);
//! ```

use crate::{
    config::Config,
    eligibility::EligibilityEvaluator,
    lifecycle,
    locks::{LockKey, LockSet, LockTable},
    metrics::Metrics,
    store::{AllocationStore, EntityKind, InMemoryStore, StoreSnapshot, WriteSet},
    types::{BloodRequest, Donor, Hospital, NewDonor, NewHospital, RequestStatus},
    Error, Result,
};
use chrono::{DateTime, Utc};
use donation_ledger::{BloodGroup, DonationId, DonationRecord, DonorId, HospitalId, RequestId};
use std::sync::Arc;
use std::time::Instant;

/// Donor–request allocation engine
pub struct AllocationEngine<S = InMemoryStore> {
    /// Entity store
    store: Arc<S>,

    /// Per-entity locks
    locks: LockTable,

    /// Eligibility rules
    eligibility: EligibilityEvaluator,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl AllocationEngine<InMemoryStore> {
    /// Engine over a fresh in-memory store
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(InMemoryStore::new(&config.ledger));
        Self::with_store(config, store)
    }
}

impl<S: AllocationStore> AllocationEngine<S> {
    /// Engine over an existing store
    pub fn with_store(config: Config, store: Arc<S>) -> Result<Self> {
        config.validate()?;
        let eligibility = EligibilityEvaluator::from_config(&config.eligibility);
        let metrics = Metrics::new()?;

        tracing::info!(
            service = %config.service_name,
            cooldown_months = config.eligibility.cooldown_months,
            lock_timeout_ms = config.allocation.lock_timeout_ms,
            allow_walk_in = config.allocation.allow_walk_in,
            "Allocation engine ready"
        );

        Ok(Self {
            store,
            locks: LockTable::new(),
            eligibility,
            metrics,
            config,
        })
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a donor; new donors are available and have never donated
    #[tracing::instrument(skip(self, new), fields(blood_group = %new.blood_group))]
    pub fn register_donor(&self, new: NewDonor) -> Result<Donor> {
        self.observe("register_donor", || {
            if new.name.trim().is_empty() {
                return Err(Error::InvalidInput("donor name must not be empty".to_string()));
            }
            if new.age == 0 {
                return Err(Error::InvalidInput("donor age must be positive".to_string()));
            }

            let donor = Donor {
                donor_id: DonorId::new(self.store.next_id(EntityKind::Donor)),
                name: new.name,
                age: new.age,
                gender: new.gender,
                blood_group: new.blood_group,
                phone: new.phone,
                address: new.address,
                last_donation_date: None,
                is_available: true,
            };
            self.store.commit(WriteSet::new().donor(donor.clone()))?;

            tracing::info!(donor_id = %donor.donor_id, blood_group = %donor.blood_group, "Donor registered");
            Ok(donor)
        })
    }

    /// Register a hospital; it cannot raise requests until verified
    #[tracing::instrument(skip(self, new))]
    pub fn register_hospital(&self, new: NewHospital) -> Result<Hospital> {
        self.observe("register_hospital", || {
            if new.name.trim().is_empty() {
                return Err(Error::InvalidInput("hospital name must not be empty".to_string()));
            }

            let hospital = Hospital {
                hospital_id: HospitalId::new(self.store.next_id(EntityKind::Hospital)),
                name: new.name,
                contact: new.contact,
                location: new.location,
                is_verified: false,
            };
            self.store.commit(WriteSet::new().hospital(hospital.clone()))?;

            tracing::info!(hospital_id = %hospital.hospital_id, "Hospital registered");
            Ok(hospital)
        })
    }

    /// Mark a hospital as verified (idempotent)
    #[tracing::instrument(skip(self))]
    pub fn verify_hospital(&self, hospital_id: &HospitalId) -> Result<Hospital> {
        self.observe("verify_hospital", || {
            let _locks = self.lock([LockKey::Hospital(hospital_id.clone())])?;

            let mut hospital = self.hospital(hospital_id)?;
            if !hospital.is_verified {
                hospital.is_verified = true;
                self.store.commit(WriteSet::new().hospital(hospital.clone()))?;
                tracing::info!(hospital_id = %hospital_id, "Hospital verified");
            }
            Ok(hospital)
        })
    }

    // ------------------------------------------------------------------
    // Request lifecycle
    // ------------------------------------------------------------------

    /// Raise a new pending request for a verified hospital
    #[tracing::instrument(skip(self))]
    pub fn create_request(
        &self,
        hospital_id: &HospitalId,
        blood_group: BloodGroup,
        quantity: u32,
    ) -> Result<BloodRequest> {
        self.observe("create_request", || {
            if quantity == 0 {
                return Err(Error::InvalidInput("quantity must be at least 1".to_string()));
            }

            let hospital = self.hospital(hospital_id)?;
            if !hospital.is_verified {
                return Err(Error::UnverifiedHospital(hospital_id.clone()));
            }

            let request = BloodRequest::new(
                RequestId::new(self.store.next_id(EntityKind::Request)),
                hospital_id.clone(),
                blood_group,
                quantity,
                Utc::now(),
            );
            self.store.commit(WriteSet::new().request(request.clone()))?;

            tracing::info!(
                request_id = %request.request_id,
                hospital_id = %hospital_id,
                blood_group = %blood_group,
                quantity,
                "Blood request created"
            );
            Ok(request)
        })
    }

    /// Reserve operator-selected donors against a request
    ///
    /// Donors already assigned to this request are skipped, so re-submitting
    /// the same list is a no-op. Only donors new to the request count against
    /// its open slots.
    #[tracing::instrument(skip(self, donor_ids), fields(donors = donor_ids.len()))]
    pub fn assign_donors(&self, request_id: &RequestId, donor_ids: &[DonorId]) -> Result<BloodRequest> {
        self.observe("assign", || {
            let mut unique: Vec<DonorId> = Vec::with_capacity(donor_ids.len());
            for id in donor_ids {
                if !unique.contains(id) {
                    unique.push(id.clone());
                }
            }

            let keys = std::iter::once(LockKey::Request(request_id.clone()))
                .chain(unique.iter().cloned().map(LockKey::Donor));
            let _locks = self.lock(keys)?;

            let original = self.request(request_id)?;
            lifecycle::ensure_active(&original)?;

            let new_ids: Vec<DonorId> = unique
                .into_iter()
                .filter(|id| !original.is_assigned(id))
                .collect();

            let open_slots = original.open_slots();
            if new_ids.len() > open_slots {
                return Err(Error::CapacityExceeded {
                    request_id: request_id.clone(),
                    requested: new_ids.len(),
                    open_slots,
                });
            }

            let now = Utc::now();
            let mut reserved = Vec::with_capacity(new_ids.len());
            for donor_id in &new_ids {
                let mut donor = self.donor(donor_id)?;

                if original.is_fulfilled_by(donor_id) {
                    return Err(Error::DonorAlreadyDonated {
                        donor_id: donor_id.clone(),
                        request_id: request_id.clone(),
                    });
                }
                if let Some(holder) = self.store.active_reservation(donor_id) {
                    return Err(Error::DonorAlreadyReserved {
                        donor_id: donor_id.clone(),
                        request_id: holder,
                    });
                }
                if self.config.allocation.screen_assignments {
                    self.screen(&donor, &original, now)?;
                }

                donor.is_available = false;
                reserved.push(donor);
            }

            let mut request = original.clone();
            lifecycle::assign(&mut request, &new_ids)?;
            if request == original {
                tracing::debug!(request_id = %request_id, "Assignment already in place");
                return Ok(request);
            }

            self.store
                .commit(WriteSet::new().donors(reserved).request(request.clone()))?;

            tracing::info!(
                request_id = %request_id,
                assigned = ?new_ids,
                status = %request.status,
                "Donors assigned"
            );
            Ok(request)
        })
    }

    /// Release a donor's reservation on whichever active request holds it
    #[tracing::instrument(skip(self))]
    pub fn cancel_assignment(&self, donor_id: &DonorId) -> Result<(Donor, BloodRequest)> {
        self.observe("cancel_assignment", || {
            for attempt in 1..=self.config.allocation.max_lock_attempts {
                let request_id = self
                    .store
                    .active_reservation(donor_id)
                    .ok_or_else(|| Error::NoActiveAssignment(donor_id.clone()))?;

                let _locks = self.lock([
                    LockKey::Request(request_id.clone()),
                    LockKey::Donor(donor_id.clone()),
                ])?;

                // The reservation may have moved between lookup and lock
                if self.store.active_reservation(donor_id).as_ref() != Some(&request_id) {
                    tracing::debug!(donor_id = %donor_id, attempt, "Reservation changed, retrying");
                    continue;
                }

                let mut request = self.request(&request_id)?;
                let mut donor = self.donor(donor_id)?;

                lifecycle::release(&mut request, donor_id);
                donor.is_available = true;

                self.store
                    .commit(WriteSet::new().donor(donor.clone()).request(request.clone()))?;

                tracing::info!(
                    donor_id = %donor_id,
                    request_id = %request_id,
                    status = %request.status,
                    "Assignment cancelled"
                );
                return Ok((donor, request));
            }

            Err(self.retries_exhausted(format!("cancel assignment of {}", donor_id)))
        })
    }

    /// Convert a reservation into a confirmed donation
    ///
    /// Appends an unverified record, stamps the donor's last donation, and
    /// fulfils the request once enough donations are counted. Reservations
    /// beyond what the request still needs are released, not donated.
    #[tracing::instrument(skip(self))]
    pub fn confirm_donation(&self, request_id: &RequestId, donor_id: &DonorId) -> Result<DonationRecord> {
        self.observe("confirm", || {
            for attempt in 1..=self.config.allocation.max_lock_attempts {
                let seen = self.request(request_id)?;
                let locks = self.lock(Self::request_keys(&seen, Some(donor_id)))?;

                let mut request = self.request(request_id)?;
                if !Self::covers(&locks, &request) {
                    tracing::debug!(request_id = %request_id, attempt, "Assigned set changed, retrying");
                    continue;
                }
                let mut donor = self.donor(donor_id)?;
                lifecycle::ensure_active(&request)?;

                if !request.is_assigned(donor_id) {
                    self.admit_walk_in(&request, donor_id)?;
                }

                let now = Utc::now();
                let record = DonationRecord::new(
                    DonationId::new(self.store.next_id(EntityKind::Donation)),
                    donor_id.clone(),
                    request_id.clone(),
                    now,
                );

                donor.last_donation_date = Some(now);
                donor.is_available = true;
                let released = lifecycle::record_donation(&mut request, donor_id)?;

                let writes = WriteSet::new()
                    .donor(donor)
                    .donors(self.released_donors(&released)?)
                    .request(request.clone())
                    .record(record.clone());
                self.store.commit(writes)?;

                if !released.is_empty() {
                    self.metrics.donors_released_total.inc_by(released.len() as u64);
                }
                tracing::info!(
                    donation_id = %record.donation_id,
                    donor_id = %donor_id,
                    request_id = %request_id,
                    status = %request.status,
                    released = released.len(),
                    "Donation confirmed"
                );
                return Ok(record);
            }

            Err(self.retries_exhausted(format!("confirm {} on {}", donor_id, request_id)))
        })
    }

    /// Withdraw an active request and release every reservation on it
    #[tracing::instrument(skip(self))]
    pub fn cancel_request(&self, request_id: &RequestId) -> Result<BloodRequest> {
        self.observe("cancel_request", || {
            for attempt in 1..=self.config.allocation.max_lock_attempts {
                let seen = self.request(request_id)?;
                let locks = self.lock(Self::request_keys(&seen, None))?;

                let mut request = self.request(request_id)?;
                if !Self::covers(&locks, &request) {
                    tracing::debug!(request_id = %request_id, attempt, "Assigned set changed, retrying");
                    continue;
                }

                let released = lifecycle::cancel(&mut request)?;
                let writes = WriteSet::new()
                    .donors(self.released_donors(&released)?)
                    .request(request.clone());
                self.store.commit(writes)?;

                self.metrics.donors_released_total.inc_by(released.len() as u64);
                tracing::info!(request_id = %request_id, released = released.len(), "Request cancelled");
                return Ok(request);
            }

            Err(self.retries_exhausted(format!("cancel request {}", request_id)))
        })
    }

    /// Mark a donation record as verified by an administrator
    ///
    /// Touches the record only; donors and requests are unaffected.
    #[tracing::instrument(skip(self))]
    pub fn approve_donation(&self, donation_id: &DonationId) -> Result<DonationRecord> {
        self.observe("approve", || self.store.approve_donation(donation_id))
    }

    // ------------------------------------------------------------------
    // Eligibility
    // ------------------------------------------------------------------

    /// Eligible donors of `blood_group` right now, sorted by name
    pub fn find_eligible_donors(&self, blood_group: BloodGroup) -> Vec<Donor> {
        self.find_eligible_donors_at(blood_group, Utc::now())
    }

    /// Eligible donors of `blood_group` at `now`, sorted by name
    pub fn find_eligible_donors_at(&self, blood_group: BloodGroup, now: DateTime<Utc>) -> Vec<Donor> {
        let snapshot = self.store.snapshot();
        let mut found = self
            .eligibility
            .filter_candidates(&snapshot.donors, blood_group, now);
        found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.donor_id.cmp(&b.donor_id)));
        found
    }

    /// Free and out of cool-down at `now`
    pub fn is_eligible(&self, donor: &Donor, now: DateTime<Utc>) -> bool {
        self.eligibility.is_eligible(donor, now)
    }

    /// When the donor leaves cool-down; `None` if they never donated
    pub fn next_eligible_date(&self, donor: &Donor) -> Option<DateTime<Utc>> {
        self.eligibility.next_eligible_date(donor)
    }

    /// Eligibility rules in use
    pub fn eligibility(&self) -> &EligibilityEvaluator {
        &self.eligibility
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Donor by id
    pub fn donor(&self, donor_id: &DonorId) -> Result<Donor> {
        self.store
            .donor(donor_id)
            .ok_or_else(|| Error::not_found("donor", donor_id))
    }

    /// Hospital by id
    pub fn hospital(&self, hospital_id: &HospitalId) -> Result<Hospital> {
        self.store
            .hospital(hospital_id)
            .ok_or_else(|| Error::not_found("hospital", hospital_id))
    }

    /// Request by id
    pub fn request(&self, request_id: &RequestId) -> Result<BloodRequest> {
        self.store
            .request(request_id)
            .ok_or_else(|| Error::not_found("request", request_id))
    }

    /// Donation record by id
    pub fn donation(&self, donation_id: &DonationId) -> Result<DonationRecord> {
        self.store
            .donation(donation_id)
            .ok_or_else(|| Error::not_found("donation", donation_id))
    }

    /// All donors, in issue order
    pub fn donors(&self) -> Vec<Donor> {
        self.store.snapshot().donors
    }

    /// All hospitals, in issue order
    pub fn hospitals(&self) -> Vec<Hospital> {
        self.store.snapshot().hospitals
    }

    /// All requests, in issue order
    pub fn requests(&self) -> Vec<BloodRequest> {
        self.store.snapshot().blood_requests
    }

    /// Requests currently in `status`
    pub fn requests_by_status(&self, status: RequestStatus) -> Vec<BloodRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.status == status)
            .collect()
    }

    /// Requests raised by one hospital
    pub fn requests_for_hospital(&self, hospital_id: &HospitalId) -> Vec<BloodRequest> {
        self.requests()
            .into_iter()
            .filter(|r| &r.hospital_id == hospital_id)
            .collect()
    }

    /// All donation records in append order
    pub fn donation_records(&self) -> Vec<DonationRecord> {
        self.store.snapshot().donation_records
    }

    /// Records still awaiting admin approval
    pub fn pending_approvals(&self) -> Vec<DonationRecord> {
        self.store.unverified_donations()
    }

    /// A donor's donations, newest first
    pub fn donation_history(&self, donor_id: &DonorId) -> Vec<DonationRecord> {
        let mut history = self.store.donations_by_donor(donor_id);
        // Same-instant ties keep the later record first
        history.reverse();
        history.sort_by(|a, b| b.donation_date.cmp(&a.donation_date));
        history
    }

    /// The active request currently holding the donor, if any
    pub fn active_assignment(&self, donor_id: &DonorId) -> Option<BloodRequest> {
        self.store
            .active_reservation(donor_id)
            .and_then(|request_id| self.store.request(&request_id))
    }

    /// Consistent copy of the whole store
    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock(&self, keys: impl IntoIterator<Item = LockKey>) -> Result<LockSet> {
        self.locks
            .acquire(keys, self.config.allocation.lock_timeout())
    }

    /// Request, the confirming donor, and everyone assigned to the request
    fn request_keys(request: &BloodRequest, donor_id: Option<&DonorId>) -> Vec<LockKey> {
        std::iter::once(LockKey::Request(request.request_id.clone()))
            .chain(donor_id.cloned().map(LockKey::Donor))
            .chain(request.assigned_donors.iter().cloned().map(LockKey::Donor))
            .collect()
    }

    /// Whether `locks` still covers every donor assigned to `request`
    fn covers(locks: &LockSet, request: &BloodRequest) -> bool {
        let keys: Vec<LockKey> = request
            .assigned_donors
            .iter()
            .cloned()
            .map(LockKey::Donor)
            .collect();
        locks.holds_all(&keys)
    }

    /// Preconditions for confirming a donor who holds no reservation here
    fn admit_walk_in(&self, request: &BloodRequest, donor_id: &DonorId) -> Result<()> {
        if !self.config.allocation.allow_walk_in {
            return Err(Error::DonorNotAssigned {
                donor_id: donor_id.clone(),
                request_id: request.request_id.clone(),
            });
        }
        if request.is_fulfilled_by(donor_id) {
            return Err(Error::DonorAlreadyDonated {
                donor_id: donor_id.clone(),
                request_id: request.request_id.clone(),
            });
        }
        if let Some(holder) = self.store.active_reservation(donor_id) {
            return Err(Error::DonorAlreadyReserved {
                donor_id: donor_id.clone(),
                request_id: holder,
            });
        }
        tracing::info!(donor_id = %donor_id, request_id = %request.request_id, "Walk-in donation admitted");
        Ok(())
    }

    /// Blood group and cool-down screening for a new reservation
    fn screen(&self, donor: &Donor, request: &BloodRequest, now: DateTime<Utc>) -> Result<()> {
        if donor.blood_group != request.blood_group {
            return Err(Error::DonorIneligible {
                donor_id: donor.donor_id.clone(),
                reason: format!(
                    "blood group {} does not match request {}",
                    donor.blood_group, request.blood_group
                ),
            });
        }
        if !self.eligibility.is_eligible_by_date(donor, now) {
            let until = self
                .eligibility
                .next_eligible_date(donor)
                .map(|d| d.to_rfc3339())
                .unwrap_or_default();
            return Err(Error::DonorIneligible {
                donor_id: donor.donor_id.clone(),
                reason: format!("in cool-down until {}", until),
            });
        }
        Ok(())
    }

    /// Current donor rows for `released`, flipped back to available
    fn released_donors(&self, released: &[DonorId]) -> Result<Vec<Donor>> {
        released
            .iter()
            .map(|id| {
                let mut donor = self.donor(id)?;
                donor.is_available = true;
                Ok(donor)
            })
            .collect()
    }

    fn retries_exhausted(&self, what: String) -> Error {
        Error::Contention(format!(
            "{}: entity set kept changing after {} attempts",
            what, self.config.allocation.max_lock_attempts
        ))
    }

    /// Run one operation with latency and outcome accounting
    fn observe<T>(&self, operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let result = f();
        match &result {
            Ok(_) => self
                .metrics
                .record_success(operation, start.elapsed().as_secs_f64()),
            Err(e) => {
                self.metrics.record_failure(operation, e);
                tracing::warn!(operation, kind = e.kind(), error = %e, "Transaction rejected");
            }
        }
        result
    }
}

impl<S> std::fmt::Debug for AllocationEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationEngine")
            .field("service", &self.config.service_name)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}
