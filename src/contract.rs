//! Contract aggregate: terms, escrow shadow fields and audit timestamps

use chrono::{DateTime, TimeZone, Utc};

use super::error::Error;
use super::state::{EscrowStatus, Role, Status};

/// Wall-clock instant carried by every entity. Encoded as nanoseconds since
/// the epoch so ordering survives the round-trip.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// A freelancer's bid on an open contract. Advisory only, the client is free
/// to assign anyone.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Application {
    #[n(0)]
    pub freelancer: String,
    #[n(1)]
    pub applied_at: TimeStamp<Utc>,
}

/// Validated contract terms, produced by [`ContractDraft::validate_and_finalise`].
#[derive(Debug, Clone)]
pub struct ContractTerms {
    pub title: String,
    pub description: String,
    pub amount: u64,
    pub deadline: TimeStamp<Utc>,
}

// Used for constructing drafts before anything is persisted.
#[derive(Debug, Default)]
pub struct ContractDraft {
    title: Option<String>,
    description: Option<String>,
    amount: u64,
    deadline: Option<TimeStamp<Utc>>,
}

impl ContractDraft {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_owned());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }
    pub fn set_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }
    pub fn set_deadline(mut self, deadline: TimeStamp<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
    /// Checks every field is present and sane, then releases the terms.
    pub fn validate_and_finalise(self) -> Result<ContractTerms, Error> {
        let Some(title) = self.title.filter(|t| !t.trim().is_empty()) else {
            return Err(Error::invalid_input("title is not set"));
        };
        let Some(description) = self.description.filter(|d| !d.trim().is_empty()) else {
            return Err(Error::invalid_input("description is not set"));
        };
        if self.amount == 0 {
            return Err(Error::invalid_input("amount is set to zero"));
        }
        let Some(deadline) = self.deadline else {
            return Err(Error::invalid_input("deadline is not set"));
        };

        Ok(ContractTerms {
            title,
            description,
            amount: self.amount,
            deadline,
        })
    }
}

/// The aggregate root of the lifecycle. All status writes go through the
/// transition table; escrow fields shadow the external payment rail and are
/// not authoritative for progression.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub client: String, // owner, immutable after creation
    #[n(2)]
    pub freelancer: Option<String>, // unset until assignment
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub amount: u64, // integer currency units
    #[n(6)]
    pub deadline: TimeStamp<Utc>,
    #[n(7)]
    pub status: Status,
    #[n(8)]
    pub escrow_status: EscrowStatus,
    #[n(9)]
    pub escrow_address: Option<String>,
    #[n(10)]
    pub funded_at: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub ipfs_hash: Option<String>, // content pointer to the submitted deliverable
    #[n(12)]
    pub submitted_at: Option<TimeStamp<Utc>>,
    #[n(13)]
    pub applications: Vec<Application>,
    #[n(14)]
    pub created_at: TimeStamp<Utc>,
    #[n(15)]
    pub updated_at: TimeStamp<Utc>,
    #[n(16)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(17)]
    pub paid_at: Option<TimeStamp<Utc>>,
    #[n(18)]
    pub dispute: Option<String>, // at most one live dispute per contract
    #[n(19)]
    pub revision: u64, // bumped on every committed write
    #[n(20)]
    pub is_deleted: bool,
}

impl Contract {
    pub fn new(id: String, client: String, terms: ContractTerms) -> Self {
        let now = TimeStamp::now();
        Self {
            id,
            client,
            freelancer: None,
            title: terms.title,
            description: terms.description,
            amount: terms.amount,
            deadline: terms.deadline,
            status: Status::Created,
            escrow_status: EscrowStatus::NotFunded,
            escrow_address: None,
            funded_at: None,
            ipfs_hash: None,
            submitted_at: None,
            applications: vec![],
            created_at: now.clone(),
            updated_at: now,
            approved_at: None,
            paid_at: None,
            dispute: None,
            revision: 0,
            is_deleted: false,
        }
    }

    /// Which side of the contract the actor stands on, if any. Disputes and
    /// reports derive standing from this rather than the claimed role.
    pub fn party_role(&self, actor_id: &str) -> Option<Role> {
        if self.client == actor_id {
            return Some(Role::Client);
        }
        if self.freelancer.as_deref() == Some(actor_id) {
            return Some(Role::Freelancer);
        }
        None
    }

    pub fn is_party(&self, actor_id: &str) -> bool {
        self.party_role(actor_id).is_some()
    }

    pub fn has_applied(&self, freelancer_id: &str) -> bool {
        self.applications
            .iter()
            .any(|a| a.freelancer == freelancer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms() -> ContractTerms {
        ContractDraft::new()
            .set_title("Landing page")
            .set_description("Five sections, responsive")
            .set_amount(100)
            .set_deadline(TimeStamp::new_with(2031, 1, 15, 12, 0, 0))
            .validate_and_finalise()
            .unwrap()
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::now();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn contract_roundtrip() {
        let contract = Contract::new("contract_1".into(), "user_client".into(), terms());

        let encoding = minicbor::to_vec(&contract).unwrap();
        let decoded: Contract = minicbor::decode(&encoding).unwrap();

        assert_eq!(contract, decoded);
    }

    #[test]
    fn draft_rejects_missing_fields() {
        let missing_title = ContractDraft::new()
            .set_description("work")
            .set_amount(10)
            .set_deadline(TimeStamp::now())
            .validate_and_finalise();
        assert!(missing_title.is_err());

        let zero_amount = ContractDraft::new()
            .set_title("work")
            .set_description("work")
            .set_amount(0)
            .set_deadline(TimeStamp::now())
            .validate_and_finalise();
        assert!(zero_amount.is_err());

        let missing_deadline = ContractDraft::new()
            .set_title("work")
            .set_description("work")
            .set_amount(10)
            .validate_and_finalise();
        assert!(missing_deadline.is_err());
    }

    #[test]
    fn party_role_distinguishes_sides() {
        let mut contract = Contract::new("contract_1".into(), "user_client".into(), terms());
        contract.freelancer = Some("user_freelancer".into());

        assert_eq!(contract.party_role("user_client"), Some(Role::Client));
        assert_eq!(
            contract.party_role("user_freelancer"),
            Some(Role::Freelancer)
        );
        assert_eq!(contract.party_role("user_stranger"), None);
    }
}
