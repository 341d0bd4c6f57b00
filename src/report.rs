//! User-against-user reports, tied to a shared contract

use std::fmt;

use chrono::Utc;

use super::contract::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Reviewed,
    #[n(2)]
    Dismissed,
}

impl ReportStatus {
    /// Pending and Reviewed reports block a duplicate for the same
    /// reporter/reported/contract tuple; a dismissed one does not.
    pub fn blocks_duplicate(&self) -> bool {
        matches!(self, ReportStatus::Pending | ReportStatus::Reviewed)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportStatus::Pending => "Pending",
            ReportStatus::Reviewed => "Reviewed",
            ReportStatus::Dismissed => "Dismissed",
        };
        write!(f, "{name}")
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Report {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub reporter: String,
    #[n(2)]
    pub reported_user: String,
    #[n(3)]
    pub contract: String, // the contract both users are parties on
    #[n(4)]
    pub reason: String,
    #[n(5)]
    pub status: ReportStatus,
    #[n(6)]
    pub reviewed_by: Option<String>,
    #[n(7)]
    pub reviewed_at: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

impl Report {
    pub fn new(
        id: String,
        reporter: String,
        reported_user: String,
        contract: String,
        reason: String,
    ) -> Self {
        Self {
            id,
            reporter,
            reported_user,
            contract,
            reason,
            status: ReportStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: TimeStamp::now(),
        }
    }

    /// True when the report covers the given reporter/reported/contract tuple.
    pub fn same_tuple(&self, reporter: &str, reported_user: &str, contract: &str) -> bool {
        self.reporter == reporter && self.reported_user == reported_user && self.contract == contract
    }
}
