//! Dispute sub-entity: raised by a contract party, resolved by an admin

use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use super::contract::TimeStamp;
use super::error::Error;
use super::state::Role;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeStatus {
    #[n(0)]
    Open,
    #[n(1)]
    Resolved,
}

impl DisputeStatus {
    /// Resolution is terminal, a resolved dispute is never reopened.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputeStatus::Resolved)
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisputeStatus::Open => "Open",
            DisputeStatus::Resolved => "Resolved",
        };
        write!(f, "{name}")
    }
}

/// Admin verdict. Decides which terminal status the contract lands in:
/// freelancer wins releases escrow (Paid), client wins closes it (Resolved).
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    #[n(0)]
    ClientWins,
    #[n(1)]
    FreelancerWins,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resolution::ClientWins => "clientWins",
            Resolution::FreelancerWins => "freelancerWins",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clientWins" => Ok(Resolution::ClientWins),
            "freelancerWins" => Ok(Resolution::FreelancerWins),
            other => Err(Error::invalid_input(format!(
                "decision must be clientWins or freelancerWins, got: {other}"
            ))),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Dispute {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub contract: String, // one dispute per contract, ever
    #[n(2)]
    pub raised_by: Role, // which side of the contract opened it
    #[n(3)]
    pub raised_by_user: String,
    #[n(4)]
    pub reason: String,
    #[n(5)]
    pub evidence: Vec<String>,
    #[n(6)]
    pub status: DisputeStatus,
    #[n(7)]
    pub resolution: Option<Resolution>,
    #[n(8)]
    pub resolved_by: Option<String>,
    #[n(9)]
    pub resolved_at: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub created_at: TimeStamp<Utc>,
}

impl Dispute {
    pub fn new(
        id: String,
        contract: String,
        raised_by: Role,
        raised_by_user: String,
        reason: String,
        evidence: Vec<String>,
    ) -> Self {
        Self {
            id,
            contract,
            raised_by,
            raised_by_user,
            reason,
            evidence,
            status: DisputeStatus::Open,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
            created_at: TimeStamp::now(),
        }
    }
}

/// Listing row joining a dispute with display fields from the contract and
/// the raising user. Read-only projection, no state machine logic.
#[derive(Debug, Clone)]
pub struct DisputeView {
    pub dispute: Dispute,
    pub contract_title: String,
    pub raised_by_username: String,
}
