//! Property-based tests for allocation invariants
//!
//! Random sequences of operations are replayed against a fresh engine:
//! - Store invariants hold after every step, accepted or rejected
//! - A rejected operation leaves the store exactly as it was
//! - Donation records only ever grow, one per accepted confirmation
//! - Approval never touches donors or requests

use allocation_engine::{AllocationEngine, Config, Gender, NewDonor, NewHospital};
use donation_ledger::{BloodGroup, DonorId, RequestId};
use proptest::prelude::*;

const DONORS: usize = 6;
const REQUESTS: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    Assign { request: usize, donors: Vec<usize> },
    CancelAssignment { donor: usize },
    Confirm { request: usize, donor: usize },
    CancelRequest { request: usize },
    Approve { record: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..REQUESTS, prop::collection::vec(0..DONORS, 1..4))
            .prop_map(|(request, donors)| Op::Assign { request, donors }),
        2 => (0..DONORS).prop_map(|donor| Op::CancelAssignment { donor }),
        3 => (0..REQUESTS, 0..DONORS).prop_map(|(request, donor)| Op::Confirm { request, donor }),
        1 => (0..REQUESTS).prop_map(|request| Op::CancelRequest { request }),
        1 => (0..8usize).prop_map(|record| Op::Approve { record }),
    ]
}

struct Harness {
    engine: AllocationEngine,
    donors: Vec<DonorId>,
    requests: Vec<RequestId>,
}

fn harness(quantities: &[u32], allow_walk_in: bool) -> Harness {
    let mut config = Config::default();
    config.allocation.allow_walk_in = allow_walk_in;
    let engine = AllocationEngine::new(config).unwrap();

    let hospital = engine
        .register_hospital(NewHospital {
            name: "City General Hospital".to_string(),
            contact: "555-111-2222".to_string(),
            location: "Cityville".to_string(),
        })
        .unwrap()
        .hospital_id;
    engine.verify_hospital(&hospital).unwrap();

    let donors = (0..DONORS)
        .map(|i| {
            engine
                .register_donor(NewDonor {
                    name: format!("Donor {}", i),
                    age: 20 + i as u32,
                    gender: Gender::Other,
                    blood_group: BloodGroup::AbNegative,
                    phone: "555-000-0000".to_string(),
                    address: "1 Test Rd".to_string(),
                })
                .unwrap()
                .donor_id
        })
        .collect();

    let requests = quantities
        .iter()
        .map(|&q| {
            engine
                .create_request(&hospital, BloodGroup::AbNegative, q)
                .unwrap()
                .request_id
        })
        .collect();

    Harness {
        engine,
        donors,
        requests,
    }
}

impl Harness {
    /// Apply one op; returns whether it was accepted
    fn apply(&self, op: &Op) -> bool {
        match op {
            Op::Assign { request, donors } => {
                let ids: Vec<DonorId> = donors.iter().map(|&i| self.donors[i].clone()).collect();
                self.engine.assign_donors(&self.requests[*request], &ids).is_ok()
            }
            Op::CancelAssignment { donor } => {
                self.engine.cancel_assignment(&self.donors[*donor]).is_ok()
            }
            Op::Confirm { request, donor } => self
                .engine
                .confirm_donation(&self.requests[*request], &self.donors[*donor])
                .is_ok(),
            Op::CancelRequest { request } => {
                self.engine.cancel_request(&self.requests[*request]).is_ok()
            }
            Op::Approve { record } => match self.engine.donation_records().get(*record) {
                Some(r) => self.engine.approve_donation(&r.donation_id).is_ok(),
                None => false,
            },
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: invariants hold after every step, and rejections write nothing
    #[test]
    fn prop_invariants_hold(
        quantities in prop::collection::vec(1u32..4, REQUESTS),
        allow_walk_in in any::<bool>(),
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let h = harness(&quantities, allow_walk_in);

        for op in &ops {
            let before = h.engine.snapshot();
            let accepted = h.apply(op);
            let after = h.engine.snapshot();

            let violations = after.invariant_violations();
            prop_assert!(violations.is_empty(), "after {:?}: {:?}", op, violations);

            if !accepted {
                prop_assert_eq!(&before, &after, "rejected {:?} changed state", op);
            }
        }
    }

    /// Property: one record per accepted confirmation, never removed
    #[test]
    fn prop_records_match_confirmations(
        quantities in prop::collection::vec(1u32..4, REQUESTS),
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let h = harness(&quantities, false);
        let mut confirmed = 0usize;

        for op in &ops {
            let accepted = h.apply(op);
            if accepted && matches!(op, Op::Confirm { .. }) {
                confirmed += 1;
            }
            prop_assert_eq!(h.engine.donation_records().len(), confirmed);
        }

        for request in h.engine.requests() {
            let recorded = h
                .engine
                .donation_records()
                .iter()
                .filter(|r| r.request_id == request.request_id)
                .count();
            prop_assert_eq!(recorded, request.fulfilled_by.len());
        }
    }

    /// Property: approval changes only the record's verification flag
    #[test]
    fn prop_approval_is_record_only(
        quantities in prop::collection::vec(1u32..4, REQUESTS),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let h = harness(&quantities, false);
        for op in &ops {
            h.apply(op);
        }

        let before = h.engine.snapshot();
        for record in &before.donation_records {
            h.engine.approve_donation(&record.donation_id).unwrap();
        }
        let after = h.engine.snapshot();

        prop_assert_eq!(before.donors, after.donors);
        prop_assert_eq!(before.blood_requests, after.blood_requests);
        prop_assert!(after.donation_records.iter().all(|r| r.is_verified_by_admin));
        prop_assert!(h.engine.pending_approvals().is_empty());
    }
}
