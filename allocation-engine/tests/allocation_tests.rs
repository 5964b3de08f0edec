//! End-to-end allocation tests
//!
//! Each test drives the public engine API and checks request state, donor
//! availability, and the ledger together.

use allocation_engine::{
    AllocationEngine, BloodRequest, Config, Error, Gender, NewDonor, NewHospital, RequestStatus,
};
use chrono::{Duration, Utc};
use donation_ledger::{BloodGroup, DonationId, DonorId, HospitalId, RequestId};

struct World {
    engine: AllocationEngine,
    hospital: HospitalId,
}

impl World {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        allocation_engine::logging::init_test();
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
        Self { engine, hospital }
    }

    fn donor(&self, name: &str, group: BloodGroup) -> DonorId {
        self.engine
            .register_donor(NewDonor {
                name: name.to_string(),
                age: 30,
                gender: Gender::Female,
                blood_group: group,
                phone: "555-000-1111".to_string(),
                address: "1 Test Rd".to_string(),
            })
            .unwrap()
            .donor_id
    }

    fn request(&self, group: BloodGroup, quantity: u32) -> RequestId {
        self.engine
            .create_request(&self.hospital, group, quantity)
            .unwrap()
            .request_id
    }

    fn available(&self, donor: &DonorId) -> bool {
        self.engine.donor(donor).unwrap().is_available
    }

    fn status(&self, request: &RequestId) -> RequestStatus {
        self.engine.request(request).unwrap().status
    }

    fn assert_consistent(&self) {
        let violations = self.engine.snapshot().invariant_violations();
        assert!(violations.is_empty(), "violations: {:?}", violations);
    }
}

#[test]
fn test_assign_moves_request_in_progress() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 2);
    let d1 = world.donor("Ann", BloodGroup::OPositive);
    let d2 = world.donor("Ben", BloodGroup::OPositive);

    let request = world
        .engine
        .assign_donors(&r, &[d1.clone(), d2.clone()])
        .unwrap();

    assert_eq!(request.status, RequestStatus::InProgress);
    assert_eq!(request.assigned_donors, vec![d1.clone(), d2.clone()]);
    assert!(!world.available(&d1));
    assert!(!world.available(&d2));
    world.assert_consistent();
}

#[test]
fn test_donor_cannot_be_reserved_twice() {
    let world = World::new();
    let r1 = world.request(BloodGroup::OPositive, 1);
    let r2 = world.request(BloodGroup::OPositive, 1);
    let d1 = world.donor("Ann", BloodGroup::OPositive);

    world.engine.assign_donors(&r1, &[d1.clone()]).unwrap();
    let result = world.engine.assign_donors(&r2, &[d1.clone()]);

    assert_eq!(
        result,
        Err(Error::DonorAlreadyReserved {
            donor_id: d1.clone(),
            request_id: r1.clone(),
        })
    );
    assert_eq!(world.status(&r2), RequestStatus::Pending);
    world.assert_consistent();
}

#[test]
fn test_cancel_assignment_reverts_to_pending() {
    let world = World::new();
    let r1 = world.request(BloodGroup::OPositive, 1);
    let d1 = world.donor("Ann", BloodGroup::OPositive);
    world.engine.assign_donors(&r1, &[d1.clone()]).unwrap();

    let (donor, request) = world.engine.cancel_assignment(&d1).unwrap();

    assert!(donor.is_available);
    assert_eq!(request.status, RequestStatus::Pending);
    assert!(request.assigned_donors.is_empty());
    assert!(world.engine.active_assignment(&d1).is_none());

    // Free again: another request may now take the donor
    let r2 = world.request(BloodGroup::OPositive, 1);
    world.engine.assign_donors(&r2, &[d1]).unwrap();
    world.assert_consistent();
}

#[test]
fn test_cancel_assignment_keeps_in_progress_with_other_donors() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 2);
    let d1 = world.donor("Ann", BloodGroup::OPositive);
    let d2 = world.donor("Ben", BloodGroup::OPositive);
    world.engine.assign_donors(&r, &[d1.clone(), d2.clone()]).unwrap();

    let (_, request) = world.engine.cancel_assignment(&d1).unwrap();
    assert_eq!(request.status, RequestStatus::InProgress);
    assert_eq!(request.assigned_donors, vec![d2]);
}

#[test]
fn test_cancel_without_assignment() {
    let world = World::new();
    let d1 = world.donor("Ann", BloodGroup::OPositive);
    assert_eq!(
        world.engine.cancel_assignment(&d1),
        Err(Error::NoActiveAssignment(d1))
    );
}

#[test]
fn test_confirm_single_unit_fulfils() {
    let world = World::new();
    let r = world.request(BloodGroup::BPositive, 1);
    let d = world.donor("Sam", BloodGroup::BPositive);
    world.engine.assign_donors(&r, &[d.clone()]).unwrap();

    let before = Utc::now();
    let record = world.engine.confirm_donation(&r, &d).unwrap();
    let after = Utc::now();

    assert!(!record.is_verified_by_admin);
    assert_eq!(record.donor_id, d);
    assert_eq!(record.request_id, r);
    assert_eq!(world.engine.donation_records(), vec![record.clone()]);

    let request = world.engine.request(&r).unwrap();
    assert_eq!(request.status, RequestStatus::Fulfilled);
    assert_eq!(request.fulfilled_by, vec![d.clone()]);

    let donor = world.engine.donor(&d).unwrap();
    assert!(donor.is_available);
    assert_eq!(donor.last_donation_date, Some(record.donation_date));
    assert!(record.donation_date >= before && record.donation_date <= after);
    world.assert_consistent();
}

#[test]
fn test_confirm_two_units_in_order() {
    let world = World::new();
    let r = world.request(BloodGroup::ANegative, 2);
    let d1 = world.donor("Ann", BloodGroup::ANegative);
    let d2 = world.donor("Ben", BloodGroup::ANegative);
    world.engine.assign_donors(&r, &[d1.clone(), d2.clone()]).unwrap();

    world.engine.confirm_donation(&r, &d1).unwrap();
    assert_eq!(world.status(&r), RequestStatus::InProgress);
    assert!(world.available(&d1));
    assert!(!world.available(&d2));

    world.engine.confirm_donation(&r, &d2).unwrap();
    let request = world.engine.request(&r).unwrap();
    assert_eq!(request.status, RequestStatus::Fulfilled);
    assert!(request.assigned_donors.is_empty());
    assert_eq!(request.fulfilled_by.len(), 2);
    world.assert_consistent();
}

#[test]
fn test_fulfilment_releases_extra_reservations() {
    let mut config = Config::default();
    config.allocation.allow_walk_in = true;
    let world = World::with_config(config);
    let r = world.request(BloodGroup::ANegative, 1);
    let reserved = world.donor("Ann", BloodGroup::ANegative);
    let walk_in = world.donor("Ben", BloodGroup::ANegative);
    world.engine.assign_donors(&r, &[reserved.clone()]).unwrap();

    // The walk-in covers the only unit; the reservation is released, not donated
    world.engine.confirm_donation(&r, &walk_in).unwrap();

    let request = world.engine.request(&r).unwrap();
    assert_eq!(request.status, RequestStatus::Fulfilled);
    assert_eq!(request.fulfilled_by, vec![walk_in]);
    assert!(request.assigned_donors.is_empty());
    assert!(world.available(&reserved));
    assert_eq!(world.engine.donor(&reserved).unwrap().last_donation_date, None);
    assert_eq!(world.engine.donation_records().len(), 1);
    assert_eq!(world.engine.metrics().donors_released_total.get(), 1);
    world.assert_consistent();
}

#[test]
fn test_slot_reopens_after_cancellation() {
    let world = World::new();
    let r = world.request(BloodGroup::ANegative, 2);
    let d1 = world.donor("Ann", BloodGroup::ANegative);
    let d2 = world.donor("Ben", BloodGroup::ANegative);
    let d3 = world.donor("Cat", BloodGroup::ANegative);
    world.engine.assign_donors(&r, &[d1.clone(), d2.clone()]).unwrap();
    world.engine.confirm_donation(&r, &d1).unwrap();

    world.engine.cancel_assignment(&d2).unwrap();
    assert_eq!(world.status(&r), RequestStatus::InProgress);
    world.engine.assign_donors(&r, &[d3.clone()]).unwrap();
    world.engine.confirm_donation(&r, &d3).unwrap();

    let request = world.engine.request(&r).unwrap();
    assert_eq!(request.status, RequestStatus::Fulfilled);
    assert_eq!(request.fulfilled_by, vec![d1, d3]);
    assert!(world.available(&d2));
    world.assert_consistent();
}

#[test]
fn test_confirm_requires_assignment() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 1);
    let d = world.donor("Ann", BloodGroup::OPositive);

    assert_eq!(
        world.engine.confirm_donation(&r, &d),
        Err(Error::DonorNotAssigned {
            donor_id: d.clone(),
            request_id: r.clone(),
        })
    );
    assert!(world.engine.donation_records().is_empty());
    assert_eq!(world.engine.donor(&d).unwrap().last_donation_date, None);
}

#[test]
fn test_confirm_unknown_entities() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 1);
    let d = world.donor("Ann", BloodGroup::OPositive);

    assert_eq!(
        world.engine.confirm_donation(&RequestId::new("REQ404"), &d),
        Err(Error::not_found("request", "REQ404"))
    );
    assert_eq!(
        world.engine.confirm_donation(&r, &DonorId::new("DON404")),
        Err(Error::not_found("donor", "DON404"))
    );
}

#[test]
fn test_walk_in_reserved_elsewhere_is_rejected() {
    let mut config = Config::default();
    config.allocation.allow_walk_in = true;
    let world = World::with_config(config);
    let r1 = world.request(BloodGroup::OPositive, 1);
    let r2 = world.request(BloodGroup::OPositive, 1);
    let d = world.donor("Ann", BloodGroup::OPositive);
    world.engine.assign_donors(&r1, &[d.clone()]).unwrap();

    let result = world.engine.confirm_donation(&r2, &d);
    assert!(matches!(result, Err(Error::DonorAlreadyReserved { .. })));
    world.assert_consistent();
}

#[test]
fn test_approve_is_record_only() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 2);
    let d1 = world.donor("Ann", BloodGroup::OPositive);
    let d2 = world.donor("Ben", BloodGroup::OPositive);
    world.engine.assign_donors(&r, &[d1.clone(), d2.clone()]).unwrap();
    let record = world.engine.confirm_donation(&r, &d1).unwrap();

    let before = world.engine.snapshot();
    let approved = world.engine.approve_donation(&record.donation_id).unwrap();
    let after = world.engine.snapshot();

    assert!(approved.is_verified_by_admin);
    assert_eq!(before.donors, after.donors);
    assert_eq!(before.blood_requests, after.blood_requests);
    assert_eq!(after.donation_records, vec![approved]);
    assert!(world.engine.pending_approvals().is_empty());

    // Approving twice is harmless
    world.engine.approve_donation(&record.donation_id).unwrap();
}

#[test]
fn test_approve_missing_record() {
    let world = World::new();
    assert_eq!(
        world.engine.approve_donation(&DonationId::new("DREC404")),
        Err(Error::not_found("donation", "DREC404"))
    );
}

#[test]
fn test_reassign_is_idempotent() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 2);
    let d1 = world.donor("Ann", BloodGroup::OPositive);
    let first = world.engine.assign_donors(&r, &[d1.clone()]).unwrap();
    let snapshot = world.engine.snapshot();

    let second = world.engine.assign_donors(&r, &[d1.clone()]).unwrap();

    assert_eq!(first, second);
    assert_eq!(snapshot, world.engine.snapshot());
}

#[test]
fn test_terminal_requests_reject_assign() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 1);
    let d1 = world.donor("Ann", BloodGroup::OPositive);
    let d2 = world.donor("Ben", BloodGroup::OPositive);
    world.engine.assign_donors(&r, &[d1.clone()]).unwrap();
    world.engine.confirm_donation(&r, &d1).unwrap();

    let result = world.engine.assign_donors(&r, &[d2.clone()]);
    assert_eq!(
        result,
        Err(Error::InvalidRequestState {
            request_id: r.clone(),
            status: RequestStatus::Fulfilled,
        })
    );
    assert!(world.available(&d2));
}

#[test]
fn test_over_assignment_rejected() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 1);
    let d1 = world.donor("Ann", BloodGroup::OPositive);
    let d2 = world.donor("Ben", BloodGroup::OPositive);

    let result = world.engine.assign_donors(&r, &[d1.clone(), d2.clone()]);
    assert!(matches!(result, Err(Error::CapacityExceeded { .. })));
    assert!(world.available(&d1));
    assert!(world.available(&d2));
    assert_eq!(world.status(&r), RequestStatus::Pending);
}

#[test]
fn test_failed_assign_leaves_no_partial_write() {
    let world = World::new();
    let r1 = world.request(BloodGroup::OPositive, 1);
    let r2 = world.request(BloodGroup::OPositive, 2);
    let d1 = world.donor("Ann", BloodGroup::OPositive);
    let d2 = world.donor("Ben", BloodGroup::OPositive);
    world.engine.assign_donors(&r1, &[d2.clone()]).unwrap();

    let before = world.engine.snapshot();
    let result = world.engine.assign_donors(&r2, &[d1.clone(), d2.clone()]);

    assert!(matches!(result, Err(Error::DonorAlreadyReserved { .. })));
    assert_eq!(before, world.engine.snapshot());
}

#[test]
fn test_find_eligible_donors_sorted_and_filtered() {
    let world = World::new();
    let zed = world.donor("Zed", BloodGroup::ONegative);
    let amy = world.donor("Amy", BloodGroup::ONegative);
    let busy = world.donor("Bob", BloodGroup::ONegative);
    world.donor("Other", BloodGroup::APositive);

    let r = world.request(BloodGroup::ONegative, 1);
    world.engine.assign_donors(&r, &[busy]).unwrap();

    let found: Vec<DonorId> = world
        .engine
        .find_eligible_donors(BloodGroup::ONegative)
        .into_iter()
        .map(|d| d.donor_id)
        .collect();
    assert_eq!(found, vec![amy, zed]);
}

#[test]
fn test_recent_donor_not_eligible() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 1);
    let d = world.donor("Ann", BloodGroup::OPositive);
    world.engine.assign_donors(&r, &[d.clone()]).unwrap();
    world.engine.confirm_donation(&r, &d).unwrap();

    let donor = world.engine.donor(&d).unwrap();
    assert!(donor.is_available);
    assert!(!world.engine.is_eligible(&donor, Utc::now()));
    assert!(world.engine.is_eligible(&donor, Utc::now() + Duration::days(120)));
    assert!(world.engine.find_eligible_donors(BloodGroup::OPositive).is_empty());
}

#[test]
fn test_unavailable_donor_never_eligible() {
    let world = World::new();
    let r = world.request(BloodGroup::OPositive, 1);
    let d = world.donor("Ann", BloodGroup::OPositive);
    world.engine.assign_donors(&r, &[d.clone()]).unwrap();

    let donor = world.engine.donor(&d).unwrap();
    assert_eq!(donor.last_donation_date, None);
    assert!(!world.engine.is_eligible(&donor, Utc::now()));
}

#[test]
fn test_screening_rejects_donor_in_cooldown() {
    let mut config = Config::default();
    config.allocation.screen_assignments = true;
    let world = World::with_config(config);
    let r1 = world.request(BloodGroup::OPositive, 1);
    let d = world.donor("Ann", BloodGroup::OPositive);
    world.engine.assign_donors(&r1, &[d.clone()]).unwrap();
    world.engine.confirm_donation(&r1, &d).unwrap();

    let r2 = world.request(BloodGroup::OPositive, 1);
    let result = world.engine.assign_donors(&r2, &[d.clone()]);
    assert!(matches!(result, Err(Error::DonorIneligible { .. })));
}

#[test]
fn test_reads_by_status_and_hospital() {
    let world = World::new();
    let r1 = world.request(BloodGroup::OPositive, 1);
    let r2 = world.request(BloodGroup::OPositive, 1);
    let d = world.donor("Ann", BloodGroup::OPositive);
    world.engine.assign_donors(&r1, &[d.clone()]).unwrap();
    world.engine.cancel_request(&r2).unwrap();

    let ids = |requests: Vec<BloodRequest>| -> Vec<RequestId> {
        requests.into_iter().map(|r| r.request_id).collect()
    };
    assert_eq!(ids(world.engine.requests_by_status(RequestStatus::InProgress)), vec![r1.clone()]);
    assert_eq!(ids(world.engine.requests_by_status(RequestStatus::Cancelled)), vec![r2.clone()]);
    assert_eq!(world.engine.requests_for_hospital(&world.hospital).len(), 2);
    assert_eq!(
        world.engine.active_assignment(&d).map(|r| r.request_id),
        Some(r1)
    );
}

#[test]
fn test_donation_history_newest_first() {
    let world = World::new();
    let d = world.donor("Ann", BloodGroup::OPositive);
    for _ in 0..2 {
        let r = world.request(BloodGroup::OPositive, 1);
        world.engine.assign_donors(&r, &[d.clone()]).unwrap();
        world.engine.confirm_donation(&r, &d).unwrap();
    }

    let history = world.engine.donation_history(&d);
    assert_eq!(history.len(), 2);
    assert!(history[0].donation_date >= history[1].donation_date);
}
