//! sled-backed persistence: one tree per entity, optimistic writes
//!
//! Single-entity mutations go through a compare-and-swap loop that re-runs
//! the caller's validation against the freshly loaded record on every
//! attempt. Mutations spanning two entities (contract + dispute, user +
//! ledger) run inside a sled multi-tree transaction so neither write can
//! land without the other.

use sled::Transactional;
use sled::transaction::ConflictableTransactionError;

use super::contract::{Contract, TimeStamp};
use super::dispute::Dispute;
use super::error::Error;
use super::notification::Notification;
use super::report::Report;
use super::reputation::{EventOutcome, ReputationEvent};
use super::user::User;

// attempts before a contended compare-and-swap gives up
const CAS_RETRIES: usize = 16;

fn abort(err: Error) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(err)
}

#[derive(Clone)]
pub struct Store {
    contracts: sled::Tree,
    disputes: sled::Tree,
    users: sled::Tree,
    notifications: sled::Tree,
    reports: sled::Tree,
    reputation_events: sled::Tree,
}

impl Store {
    pub fn open(db: &sled::Db) -> Result<Self, Error> {
        Ok(Self {
            contracts: db.open_tree("contracts")?,
            disputes: db.open_tree("disputes")?,
            users: db.open_tree("users")?,
            notifications: db.open_tree("notifications")?,
            reports: db.open_tree("reports")?,
            reputation_events: db.open_tree("reputation_events")?,
        })
    }

    fn get<T>(tree: &sled::Tree, key: &str) -> Result<Option<T>, Error>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match tree.get(key.as_bytes())? {
            Some(raw) => Ok(Some(minicbor::decode(raw.as_ref())?)),
            None => Ok(None),
        }
    }

    fn put<T>(tree: &sled::Tree, key: &str, value: &T) -> Result<(), Error>
    where
        T: minicbor::Encode<()>,
    {
        tree.insert(key.as_bytes(), minicbor::to_vec(value)?)?;
        Ok(())
    }

    fn scan<T>(tree: &sled::Tree) -> Result<Vec<T>, Error>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut out = vec![];
        for entry in tree.iter() {
            let (_key, raw) = entry?;
            out.push(minicbor::decode(raw.as_ref())?);
        }
        Ok(out)
    }

    /// Optimistic read-modify-write on one record. `apply` is re-run against
    /// the freshly loaded value on every attempt, so its checks always see
    /// the state the write will actually replace.
    fn update_cas<T, R>(
        tree: &sled::Tree,
        entity: &'static str,
        id: &str,
        mut apply: impl FnMut(&mut T) -> Result<R, Error>,
    ) -> Result<(T, R), Error>
    where
        T: for<'b> minicbor::Decode<'b, ()> + minicbor::Encode<()>,
    {
        for _ in 0..CAS_RETRIES {
            let Some(raw) = tree.get(id.as_bytes())? else {
                return Err(Error::not_found(entity, id));
            };
            let mut value: T = minicbor::decode(raw.as_ref())?;
            let out = apply(&mut value)?;
            let encoded = minicbor::to_vec(&value)?;
            match tree.compare_and_swap(id.as_bytes(), Some(&raw), Some(encoded))? {
                Ok(()) => return Ok((value, out)),
                Err(_) => continue,
            }
        }
        Err(Error::conflict(format!(
            "{entity} {id} kept changing underneath the write"
        )))
    }

    // contracts

    pub fn get_contract(&self, id: &str) -> Result<Option<Contract>, Error> {
        Self::get(&self.contracts, id)
    }

    pub fn scan_contracts(&self) -> Result<Vec<Contract>, Error> {
        Self::scan(&self.contracts)
    }

    pub fn insert_contract(&self, contract: &Contract) -> Result<(), Error> {
        Self::put(&self.contracts, &contract.id, contract)
    }

    pub fn update_contract<R>(
        &self,
        id: &str,
        mut apply: impl FnMut(&mut Contract) -> Result<R, Error>,
    ) -> Result<(Contract, R), Error> {
        Self::update_cas(&self.contracts, "contract", id, |contract: &mut Contract| {
            if contract.is_deleted {
                return Err(Error::not_found("contract", id));
            }
            let out = apply(contract)?;
            contract.revision += 1;
            contract.updated_at = TimeStamp::now();
            Ok(out)
        })
    }

    /// Existence query: do these two users share any non-deleted contract,
    /// in either role direction?
    pub fn shared_contract_exists(&self, a: &str, b: &str) -> Result<bool, Error> {
        for entry in self.contracts.iter() {
            let (_key, raw) = entry?;
            let contract: Contract = minicbor::decode(raw.as_ref())?;
            if contract.is_deleted {
                continue;
            }
            let pair = (contract.client.as_str(), contract.freelancer.as_deref());
            if pair == (a, Some(b)) || pair == (b, Some(a)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // disputes

    pub fn get_dispute(&self, id: &str) -> Result<Option<Dispute>, Error> {
        Self::get(&self.disputes, id)
    }

    pub fn scan_disputes(&self) -> Result<Vec<Dispute>, Error> {
        Self::scan(&self.disputes)
    }

    /// Atomically flip the contract and persist the new dispute. `apply`
    /// validates against the in-transaction contract, so a racing write
    /// cannot slip a second dispute past the checks.
    pub fn create_dispute(
        &self,
        contract_id: &str,
        apply: impl Fn(&mut Contract) -> Result<Dispute, Error>,
    ) -> Result<(Contract, Dispute), Error> {
        let outcome = (&self.contracts, &self.disputes).transaction(|(contracts, disputes)| {
            let Some(raw) = contracts.get(contract_id.as_bytes())? else {
                return Err(abort(Error::not_found("contract", contract_id)));
            };
            let mut contract: Contract =
                minicbor::decode(raw.as_ref()).map_err(|err| abort(err.into()))?;
            if contract.is_deleted {
                return Err(abort(Error::not_found("contract", contract_id)));
            }
            let dispute = apply(&mut contract).map_err(abort)?;
            contract.revision += 1;
            contract.updated_at = TimeStamp::now();
            let contract_bytes = minicbor::to_vec(&contract).map_err(|err| abort(err.into()))?;
            let dispute_bytes = minicbor::to_vec(&dispute).map_err(|err| abort(err.into()))?;
            contracts.insert(contract_id.as_bytes(), contract_bytes)?;
            disputes.insert(dispute.id.as_bytes(), dispute_bytes)?;
            Ok((contract, dispute))
        })?;
        Ok(outcome)
    }

    /// Resolve-style mutation spanning both records. The contract write and
    /// the dispute write commit together or not at all.
    pub fn update_dispute(
        &self,
        dispute_id: &str,
        apply: impl Fn(&mut Contract, &mut Dispute) -> Result<(), Error>,
    ) -> Result<(Contract, Dispute), Error> {
        let outcome = (&self.contracts, &self.disputes).transaction(|(contracts, disputes)| {
            let Some(raw_dispute) = disputes.get(dispute_id.as_bytes())? else {
                return Err(abort(Error::not_found("dispute", dispute_id)));
            };
            let mut dispute: Dispute =
                minicbor::decode(raw_dispute.as_ref()).map_err(|err| abort(err.into()))?;
            let Some(raw_contract) = contracts.get(dispute.contract.as_bytes())? else {
                return Err(abort(Error::not_found("contract", &dispute.contract)));
            };
            let mut contract: Contract =
                minicbor::decode(raw_contract.as_ref()).map_err(|err| abort(err.into()))?;
            if contract.is_deleted {
                return Err(abort(Error::not_found("contract", &dispute.contract)));
            }
            apply(&mut contract, &mut dispute).map_err(abort)?;
            contract.revision += 1;
            contract.updated_at = TimeStamp::now();
            let contract_bytes = minicbor::to_vec(&contract).map_err(|err| abort(err.into()))?;
            let dispute_bytes = minicbor::to_vec(&dispute).map_err(|err| abort(err.into()))?;
            contracts.insert(contract.id.as_bytes(), contract_bytes)?;
            disputes.insert(dispute_id.as_bytes(), dispute_bytes)?;
            Ok((contract, dispute))
        })?;
        Ok(outcome)
    }

    // users

    pub fn get_user(&self, id: &str) -> Result<Option<User>, Error> {
        Self::get(&self.users, id)
    }

    pub fn insert_user(&self, user: &User) -> Result<(), Error> {
        Self::put(&self.users, &user.id, user)
    }

    pub fn update_user<R>(
        &self,
        id: &str,
        mut apply: impl FnMut(&mut User) -> Result<R, Error>,
    ) -> Result<(User, R), Error> {
        Self::update_cas(&self.users, "user", id, |user| {
            let out = apply(user)?;
            user.updated_at = TimeStamp::now();
            Ok(out)
        })
    }

    /// Apply a points adjustment exactly once per ledger key. The user write
    /// and the ledger record commit together.
    pub fn apply_reputation_event(
        &self,
        user_id: &str,
        key: &str,
        points: i64,
    ) -> Result<EventOutcome, Error> {
        let outcome = (&self.users, &self.reputation_events).transaction(|(users, events)| {
            if events.get(key.as_bytes())?.is_some() {
                return Ok(EventOutcome::Duplicate);
            }
            let Some(raw) = users.get(user_id.as_bytes())? else {
                return Ok(EventOutcome::MissingUser);
            };
            let mut user: User =
                minicbor::decode(raw.as_ref()).map_err(|err| abort(err.into()))?;
            user.reputation = user.reputation.adjust(points);
            user.updated_at = TimeStamp::now();
            let record = ReputationEvent {
                user: user_id.to_owned(),
                points,
                applied_at: TimeStamp::now(),
            };
            let user_bytes = minicbor::to_vec(&user).map_err(|err| abort(err.into()))?;
            let event_bytes = minicbor::to_vec(&record).map_err(|err| abort(err.into()))?;
            users.insert(user_id.as_bytes(), user_bytes)?;
            events.insert(key.as_bytes(), event_bytes)?;
            Ok(EventOutcome::Applied(user.reputation))
        })?;
        Ok(outcome)
    }

    // notifications

    pub fn get_notification(&self, id: &str) -> Result<Option<Notification>, Error> {
        Self::get(&self.notifications, id)
    }

    pub fn put_notification(&self, ntf: &Notification) -> Result<(), Error> {
        Self::put(&self.notifications, &ntf.id, ntf)
    }

    pub fn scan_notifications(&self) -> Result<Vec<Notification>, Error> {
        Self::scan(&self.notifications)
    }

    // reports

    pub fn get_report(&self, id: &str) -> Result<Option<Report>, Error> {
        Self::get(&self.reports, id)
    }

    pub fn insert_report(&self, report: &Report) -> Result<(), Error> {
        Self::put(&self.reports, &report.id, report)
    }

    pub fn update_report<R>(
        &self,
        id: &str,
        apply: impl FnMut(&mut Report) -> Result<R, Error>,
    ) -> Result<(Report, R), Error> {
        Self::update_cas(&self.reports, "report", id, apply)
    }

    /// A prior Pending or Reviewed report for the same tuple blocks a new one.
    pub fn duplicate_report_exists(
        &self,
        reporter: &str,
        reported_user: &str,
        contract: &str,
    ) -> Result<bool, Error> {
        for entry in self.reports.iter() {
            let (_key, raw) = entry?;
            let report: Report = minicbor::decode(raw.as_ref())?;
            if report.same_tuple(reporter, reported_user, contract)
                && report.status.blocks_duplicate()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContractDraft, ContractTerms};
    use crate::state::Role;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> Store {
        let db = sled::open(dir.path().join("store_test.db")).unwrap();
        Store::open(&db).unwrap()
    }

    fn terms() -> ContractTerms {
        ContractDraft::new()
            .set_title("Logo refresh")
            .set_description("Vector source files included")
            .set_amount(250)
            .set_deadline(TimeStamp::new_with(2031, 6, 1, 9, 0, 0))
            .validate_and_finalise()
            .unwrap()
    }

    #[test]
    fn update_bumps_revision_each_commit() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let contract = Contract::new("contract_rev".into(), "user_client".into(), terms());
        store.insert_contract(&contract).unwrap();

        let (after_first, _) = store
            .update_contract("contract_rev", |c| {
                c.title = "Logo refresh v2".into();
                Ok(())
            })
            .unwrap();
        assert_eq!(after_first.revision, 1);

        let (after_second, _) = store.update_contract("contract_rev", |_| Ok(())).unwrap();
        assert_eq!(after_second.revision, 2);
    }

    #[test]
    fn update_on_missing_contract_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let err = store
            .update_contract("contract_ghost", |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "contract", .. }));
    }

    #[test]
    fn soft_deleted_contract_rejects_updates() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let mut contract = Contract::new("contract_gone".into(), "user_client".into(), terms());
        contract.is_deleted = true;
        store.insert_contract(&contract).unwrap();

        let err = store
            .update_contract("contract_gone", |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "contract", .. }));
    }

    #[test]
    fn aborted_dispute_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let contract = Contract::new("contract_d".into(), "user_client".into(), terms());
        store.insert_contract(&contract).unwrap();

        let result = store.create_dispute("contract_d", |_| {
            Err(Error::forbidden("not a party"))
        });
        assert!(result.is_err());

        assert!(store.scan_disputes().unwrap().is_empty());
        let reloaded = store.get_contract("contract_d").unwrap().unwrap();
        assert_eq!(reloaded.revision, 0);
        assert_eq!(reloaded.dispute, None);
    }

    #[test]
    fn reputation_event_applies_once() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let user = crate::user::UserDraft::new()
            .set_username("ada")
            .set_email("ada@example.com")
            .set_role(Role::Freelancer)
            .validate_and_finalise("user_rep".into())
            .unwrap();
        store.insert_user(&user).unwrap();

        let key = crate::reputation::event_key("contract_d", "payment-released");
        let first = store.apply_reputation_event("user_rep", &key, 10).unwrap();
        assert!(matches!(first, EventOutcome::Applied(rep) if rep.score == 10));

        let second = store.apply_reputation_event("user_rep", &key, 10).unwrap();
        assert_eq!(second, EventOutcome::Duplicate);

        let reloaded = store.get_user("user_rep").unwrap().unwrap();
        assert_eq!(reloaded.reputation.score, 10);
    }

    #[test]
    fn missing_user_event_is_quiet() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let outcome = store
            .apply_reputation_event("user_ghost", "contract_x/payment-released", 10)
            .unwrap();
        assert_eq!(outcome, EventOutcome::MissingUser);
    }
}
