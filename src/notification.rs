//! Fire-and-forget notification records for user-facing history

use chrono::Utc;

use super::contract::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    #[n(0)]
    ApplicationReceived,
    #[n(1)]
    ContractAssigned,
    #[n(2)]
    ContractFunded,
    #[n(3)]
    WorkSubmitted,
    #[n(4)]
    WorkApproved,
    #[n(5)]
    PaymentReleased,
    #[n(6)]
    DisputeRaised,
    #[n(7)]
    DisputeResolved,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub user: String, // recipient
    #[n(2)]
    pub kind: NotificationKind,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub message: String,
    #[n(5)]
    pub contract: Option<String>,
    #[n(6)]
    pub dispute: Option<String>,
    #[n(7)]
    pub read: bool,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

impl Notification {
    pub fn new(
        id: String,
        user: String,
        kind: NotificationKind,
        title: String,
        message: String,
        contract: Option<String>,
        dispute: Option<String>,
    ) -> Self {
        Self {
            id,
            user,
            kind,
            title,
            message,
            contract,
            dispute,
            read: false,
            created_at: TimeStamp::now(),
        }
    }
}
