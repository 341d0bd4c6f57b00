//! Smoke screen unit tests for marketplace components
//!
//! These are unit tests that span the codebase, testing behavior in
//! isolation from integration scenarios. They are intended as smoke-screen
//! and generally test the happy-path.
//!
#![allow(unused_imports)]

use contract_escrow::{
    dispute::Resolution,
    notification::{Notification, NotificationKind},
    report::{Report, ReportStatus},
    state::{EscrowStatus, Status},
    user::ReputationLevel,
    utils::new_bech32_id,
};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that new_bech32_id generates valid bech32-encoded strings
    /// with the correct human-readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let result = new_bech32_id("user_");
        assert!(result.is_ok());

        let encoded = result.unwrap();
        assert!(encoded.starts_with("user_1"));
        assert!(encoded.len() > 10); // UUID should produce substantial output
    }

    /// Test that the function refuses an empty prefix
    #[test]
    fn handles_empty_hrp() {
        let result = new_bech32_id("");
        assert!(result.is_err());
    }

    /// Test that consecutive mints never collide and keep their prefixes apart
    #[test]
    fn minted_ids_are_unique_per_prefix() {
        let contract_a = new_bech32_id("contract_").unwrap();
        let contract_b = new_bech32_id("contract_").unwrap();
        let dispute = new_bech32_id("dispute_").unwrap();

        assert_ne!(contract_a, contract_b);
        assert!(contract_a.starts_with("contract_1"));
        assert!(dispute.starts_with("dispute_1"));
    }
}

// REPORT AND NOTIFICATION TESTS
#[cfg(test)]
mod entity_tests {
    use super::*;

    fn spam_report() -> Report {
        Report::new(
            "report_1".into(),
            "user_reporter".into(),
            "user_reported".into(),
            "contract_1".into(),
            "spam".into(),
        )
    }

    /// Test that the duplicate tuple match is direction-sensitive
    #[test]
    fn report_tuple_matches_exact_direction_only() {
        let report = spam_report();

        assert!(report.same_tuple("user_reporter", "user_reported", "contract_1"));
        // swapped parties are a different report
        assert!(!report.same_tuple("user_reported", "user_reporter", "contract_1"));
        // same pair on another contract is a different report
        assert!(!report.same_tuple("user_reporter", "user_reported", "contract_2"));
    }

    /// Test that a fresh report starts pending with no review trail
    #[test]
    fn new_report_is_pending() {
        let report = spam_report();

        assert_eq!(report.status, ReportStatus::Pending);
        assert!(report.reviewed_by.is_none());
        assert!(report.reviewed_at.is_none());
    }

    /// Test that a fresh notification is unread and carries its links
    #[test]
    fn new_notification_is_unread() {
        let ntf = Notification::new(
            "ntf_1".into(),
            "user_1".into(),
            NotificationKind::WorkSubmitted,
            "Work submitted".into(),
            "The deliverable is ready for review".into(),
            Some("contract_1".into()),
            None,
        );

        assert!(!ntf.read);
        assert_eq!(ntf.kind, NotificationKind::WorkSubmitted);
        assert_eq!(ntf.contract.as_deref(), Some("contract_1"));
        assert!(ntf.dispute.is_none());
    }
}

// DISPLAY AND PARSING TESTS
#[cfg(test)]
mod display_tests {
    use super::*;

    /// Test the status names used in error messages and logs
    #[test]
    fn status_names_are_pascal_case() {
        assert_eq!(Status::Created.to_string(), "Created");
        assert_eq!(Status::Disputed.to_string(), "Disputed");
        assert_eq!(EscrowStatus::NotFunded.to_string(), "NotFunded");
    }

    /// Test the wire spelling of dispute verdicts, both directions
    #[test]
    fn resolution_names_are_camel_case() {
        assert_eq!(Resolution::ClientWins.to_string(), "clientWins");
        assert_eq!(Resolution::FreelancerWins.to_string(), "freelancerWins");
        assert_eq!(
            "freelancerWins".parse::<Resolution>().unwrap(),
            Resolution::FreelancerWins
        );
    }

    /// Test that tier names render for the profile payload
    #[test]
    fn level_names_render() {
        assert_eq!(ReputationLevel::New.to_string(), "New");
        assert_eq!(ReputationLevel::Elite.to_string(), "Elite");
    }
}
