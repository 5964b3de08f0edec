//! Seed dataset for local runs
//!
//! Builds a small, consistent world through the engine's own operations:
//! five donors, three hospitals (one unverified), and three requests in
//! different lifecycle states. Historical donation dates are imported
//! directly into the store since no request exists for them.

use crate::{
    engine::AllocationEngine,
    store::{AllocationStore, WriteSet},
    types::{Gender, NewDonor, NewHospital},
    Result,
};
use chrono::{DateTime, TimeZone, Utc};
use donation_ledger::{BloodGroup, DonationId, DonorId, HospitalId, RequestId};

/// Identities created by [`DemoDataset::load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoDataset {
    /// Donors in registration order
    pub donors: Vec<DonorId>,
    /// Hospitals in registration order
    pub hospitals: Vec<HospitalId>,
    /// A- request for two units, both reserved
    pub reserved_request: RequestId,
    /// O+ request for four units, nobody assigned
    pub pending_request: RequestId,
    /// B+ request already fulfilled
    pub fulfilled_request: RequestId,
    /// Record written when the B+ request was fulfilled
    pub donation: DonationId,
}

struct SeedDonor {
    name: &'static str,
    age: u32,
    gender: Gender,
    blood_group: BloodGroup,
    phone: &'static str,
    address: &'static str,
    last_donation: Option<(i32, u32, u32)>,
}

const DONORS: [SeedDonor; 5] = [
    SeedDonor {
        name: "John Doe",
        age: 30,
        gender: Gender::Male,
        blood_group: BloodGroup::OPositive,
        phone: "123-456-7890",
        address: "123 Main St, Cityville",
        last_donation: Some((2024, 2, 15)),
    },
    SeedDonor {
        name: "Jane Smith",
        age: 25,
        gender: Gender::Female,
        blood_group: BloodGroup::ANegative,
        phone: "234-567-8901",
        address: "456 Oak Ave, Townburg",
        last_donation: Some((2024, 6, 10)),
    },
    SeedDonor {
        name: "Sam Wilson",
        age: 42,
        gender: Gender::Male,
        blood_group: BloodGroup::BPositive,
        phone: "345-678-9012",
        address: "789 Pine Ln, Villagetown",
        last_donation: None,
    },
    SeedDonor {
        name: "Emily Brown",
        age: 28,
        gender: Gender::Female,
        blood_group: BloodGroup::AbPositive,
        phone: "456-789-0123",
        address: "101 Maple Dr, Hamlet",
        last_donation: Some((2024, 7, 1)),
    },
    SeedDonor {
        name: "Chris Green",
        age: 35,
        gender: Gender::Male,
        blood_group: BloodGroup::ANegative,
        phone: "567-890-1234",
        address: "222 River Rd, Lakeside",
        last_donation: Some((2023, 12, 1)),
    },
];

const HOSPITALS: [(&str, &str, &str, bool); 3] = [
    ("City General Hospital", "555-111-2222", "Cityville", true),
    ("Townburg Medical Center", "555-333-4444", "Townburg", false),
    ("Community Clinic", "555-555-6666", "Villagetown", true),
];

fn historical(date: (i32, u32, u32)) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(date.0, date.1, date.2, 10, 0, 0).single()
}

impl DemoDataset {
    /// Populate `engine` with the seed world
    ///
    /// Expects an empty engine; identities are whatever the store issues.
    pub fn load<S: AllocationStore>(engine: &AllocationEngine<S>) -> Result<Self> {
        let mut donors = Vec::with_capacity(DONORS.len());
        let mut history = Vec::new();
        for seed in &DONORS {
            let mut donor = engine.register_donor(NewDonor {
                name: seed.name.to_string(),
                age: seed.age,
                gender: seed.gender,
                blood_group: seed.blood_group,
                phone: seed.phone.to_string(),
                address: seed.address.to_string(),
            })?;
            donors.push(donor.donor_id.clone());

            if let Some(date) = seed.last_donation.and_then(historical) {
                donor.last_donation_date = Some(date);
                history.push(donor);
            }
        }
        engine.store().commit(WriteSet::new().donors(history))?;

        let mut hospitals = Vec::with_capacity(HOSPITALS.len());
        for (name, contact, location, verified) in HOSPITALS {
            let hospital = engine.register_hospital(NewHospital {
                name: name.to_string(),
                contact: contact.to_string(),
                location: location.to_string(),
            })?;
            if verified {
                engine.verify_hospital(&hospital.hospital_id)?;
            }
            hospitals.push(hospital.hospital_id);
        }

        // Jane Smith and Chris Green are the two A- donors
        let reserved = engine.create_request(&hospitals[0], BloodGroup::ANegative, 2)?;
        engine.assign_donors(&reserved.request_id, &[donors[1].clone(), donors[4].clone()])?;

        let pending = engine.create_request(&hospitals[2], BloodGroup::OPositive, 4)?;

        let fulfilled = engine.create_request(&hospitals[0], BloodGroup::BPositive, 1)?;
        engine.assign_donors(&fulfilled.request_id, &[donors[2].clone()])?;
        let record = engine.confirm_donation(&fulfilled.request_id, &donors[2])?;

        tracing::info!(
            donors = donors.len(),
            hospitals = hospitals.len(),
            "Demo dataset loaded"
        );

        Ok(Self {
            donors,
            hospitals,
            reserved_request: reserved.request_id,
            pending_request: pending.request_id,
            fulfilled_request: fulfilled.request_id,
            donation: record.donation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, RequestStatus};

    #[test]
    fn test_demo_dataset_is_consistent() {
        let engine = AllocationEngine::new(Config::default()).unwrap();
        let demo = DemoDataset::load(&engine).unwrap();

        assert_eq!(demo.donors[0].as_str(), "DON001");
        assert_eq!(demo.hospitals.len(), 3);
        assert!(!engine.hospital(&demo.hospitals[1]).unwrap().is_verified);

        let reserved = engine.request(&demo.reserved_request).unwrap();
        assert_eq!(reserved.status, RequestStatus::InProgress);
        assert_eq!(reserved.assigned_donors.len(), 2);

        let fulfilled = engine.request(&demo.fulfilled_request).unwrap();
        assert_eq!(fulfilled.status, RequestStatus::Fulfilled);
        assert_eq!(engine.pending_approvals().len(), 1);

        assert!(engine.snapshot().invariant_violations().is_empty());
    }

    #[test]
    fn test_demo_history_imported() {
        let engine = AllocationEngine::new(Config::default()).unwrap();
        let demo = DemoDataset::load(&engine).unwrap();

        let john = engine.donor(&demo.donors[0]).unwrap();
        assert_eq!(john.last_donation_date, historical((2024, 2, 15)));
        assert!(john.is_available);

        let emily = engine.donor(&demo.donors[3]).unwrap();
        assert_eq!(emily.blood_group, BloodGroup::AbPositive);
        assert_eq!(emily.blood_group.to_string(), "AB+");
    }
}
