//! Donor eligibility
//!
//! A donor is eligible when they are not reserved on a request and their last
//! donation lies strictly before `now - cooldown`. The cool-down is counted in
//! calendar months, so a donation on 31 March clears three months later on
//! the last day of June.

use crate::config::EligibilityConfig;
use crate::types::Donor;
use chrono::{DateTime, Months, Utc};
use donation_ledger::BloodGroup;

/// Pure eligibility rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityEvaluator {
    cooldown: Months,
}

impl EligibilityEvaluator {
    /// Evaluator with a cool-down of `cooldown_months`
    pub fn new(cooldown_months: u32) -> Self {
        Self {
            cooldown: Months::new(cooldown_months),
        }
    }

    /// Evaluator from configuration
    pub fn from_config(config: &EligibilityConfig) -> Self {
        Self::new(config.cooldown_months)
    }

    /// Free and out of cool-down
    pub fn is_eligible(&self, donor: &Donor, now: DateTime<Utc>) -> bool {
        donor.is_available && self.is_eligible_by_date(donor, now)
    }

    /// Cool-down half of [`Self::is_eligible`], ignoring availability
    pub fn is_eligible_by_date(&self, donor: &Donor, now: DateTime<Utc>) -> bool {
        match donor.last_donation_date {
            None => true,
            Some(last) => match now.checked_sub_months(self.cooldown) {
                Some(cutoff) => last < cutoff,
                // Cut-off before the representable range: nothing can precede it
                None => false,
            },
        }
    }

    /// First instant the donor leaves cool-down; `None` if they never donated
    pub fn next_eligible_date(&self, donor: &Donor) -> Option<DateTime<Utc>> {
        donor
            .last_donation_date
            .and_then(|last| last.checked_add_months(self.cooldown))
    }

    /// Matching blood group and eligible
    pub fn is_candidate(&self, donor: &Donor, blood_group: BloodGroup, now: DateTime<Utc>) -> bool {
        donor.blood_group == blood_group && self.is_eligible(donor, now)
    }

    /// Filter `donors` down to candidates for `blood_group`
    pub fn filter_candidates<'a, I>(
        &self,
        donors: I,
        blood_group: BloodGroup,
        now: DateTime<Utc>,
    ) -> Vec<Donor>
    where
        I: IntoIterator<Item = &'a Donor>,
    {
        donors
            .into_iter()
            .filter(|d| self.is_candidate(d, blood_group, now))
            .cloned()
            .collect()
    }
}

impl Default for EligibilityEvaluator {
    fn default() -> Self {
        Self::from_config(&EligibilityConfig::default())
    }
}
