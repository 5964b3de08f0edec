//! Core types shared by the ledger and the allocation engine
//!
//! Identities are opaque strings. The system issues them as a prefix plus a
//! zero-padded sequence (`DON001`, `REQ014`); nothing relies on that shape.
//! They order shorter-first, then lexicographically, so issued identities
//! sort in issue order even after a sequence outgrows its pad width
//! (`DON999` < `DON1000`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! identity {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.0
                    .len()
                    .cmp(&other.0.len())
                    .then_with(|| self.0.cmp(&other.0))
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl $name {
            /// Create from any string
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get as string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

identity!(
    /// Donor identity
    DonorId
);
identity!(
    /// Hospital identity
    HospitalId
);
identity!(
    /// Blood request identity
    RequestId
);
identity!(
    /// Donation record identity
    DonationId
);

/// Monotonic identity issuer for one prefix
///
/// Safe to share between threads; every call to [`IdSequence::next`] returns
/// a distinct value.
#[derive(Debug)]
pub struct IdSequence {
    prefix: String,
    width: usize,
    counter: AtomicU64,
}

impl IdSequence {
    /// Create a sequence starting at 1
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
            counter: AtomicU64::new(0),
        }
    }

    /// Issue the next identity string
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{:0width$}", self.prefix, n, width = self.width)
    }
}

/// ABO/Rh blood group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BloodGroup {
    /// A positive
    #[serde(rename = "A+")]
    APositive,
    /// A negative
    #[serde(rename = "A-")]
    ANegative,
    /// B positive
    #[serde(rename = "B+")]
    BPositive,
    /// B negative
    #[serde(rename = "B-")]
    BNegative,
    /// AB positive
    #[serde(rename = "AB+")]
    AbPositive,
    /// AB negative
    #[serde(rename = "AB-")]
    AbNegative,
    /// O positive
    #[serde(rename = "O+")]
    OPositive,
    /// O negative
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodGroup {
    /// All eight groups, in display order
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APositive,
        BloodGroup::ANegative,
        BloodGroup::BPositive,
        BloodGroup::BNegative,
        BloodGroup::AbPositive,
        BloodGroup::AbNegative,
        BloodGroup::OPositive,
        BloodGroup::ONegative,
    ];

    /// Conventional label (`"AB-"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::APositive => "A+",
            BloodGroup::ANegative => "A-",
            BloodGroup::BPositive => "B+",
            BloodGroup::BNegative => "B-",
            BloodGroup::AbPositive => "AB+",
            BloodGroup::AbNegative => "AB-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ONegative => "O-",
        }
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodGroup {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        BloodGroup::ALL
            .into_iter()
            .find(|group| group.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::InvalidValue(format!("unknown blood group '{}'", s)))
    }
}

/// Confirmed donation
///
/// Historical truth, independent of the request lifecycle. Once appended it
/// is never removed; only `is_verified_by_admin` may change, from false to
/// true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    /// Record identity
    pub donation_id: DonationId,

    /// Donor who gave blood
    pub donor_id: DonorId,

    /// Request the donation was counted against
    pub request_id: RequestId,

    /// When the donation was confirmed
    pub donation_date: DateTime<Utc>,

    /// Audit approval flag
    pub is_verified_by_admin: bool,
}

impl DonationRecord {
    /// New unverified record
    pub fn new(
        donation_id: DonationId,
        donor_id: DonorId,
        request_id: RequestId,
        donation_date: DateTime<Utc>,
    ) -> Self {
        Self {
            donation_id,
            donor_id,
            request_id,
            donation_date,
            is_verified_by_admin: false,
        }
    }
}
