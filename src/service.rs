//! Service layer API for marketplace lifecycle operations
//!
//! Every status-mutating operation validates against the transition table
//! inside the store's retry loop, so legality is always judged against the
//! state the write will actually replace. Reputation and notification side
//! effects run after the commit and never fail the operation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::contract::{Application, Contract, ContractDraft, TimeStamp};
use super::dispute::{Dispute, DisputeStatus, DisputeView, Resolution};
use super::error::{Error, Result};
use super::notification::{Notification, NotificationKind};
use super::report::{Report, ReportStatus};
use super::reputation::{self, EventOutcome, ReputationPolicy};
use super::state::{self, EscrowStatus, Role, Status};
use super::store::Store;
use super::user::{Profile, Reputation, User, UserDraft};
use super::utils;

#[derive(Clone)]
pub struct MarketService {
    store: Store,
    policy: ReputationPolicy,
}

impl MarketService {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self> {
        Self::with_policy(instance, ReputationPolicy::default())
    }

    pub fn with_policy(instance: Arc<sled::Db>, policy: ReputationPolicy) -> Result<Self> {
        Ok(Self {
            store: Store::open(&instance)?,
            policy,
        })
    }

    /// Table check with the wrong-state case separated from the wrong-role
    /// case, so the caller learns which rule actually blocked them.
    fn check_transition(
        contract: &Contract,
        requested: Status,
        role: Role,
        required: &'static str,
    ) -> Result<()> {
        if state::is_legal_transition(contract.status, requested, role) {
            return Ok(());
        }
        let rule = state::rule_for(contract.status);
        if !rule.next.contains(&requested) {
            return Err(Error::InvalidState {
                required,
                current: contract.status,
            });
        }
        Err(Error::forbidden(format!(
            "role {role} may not move a contract from {} to {requested}",
            contract.status
        )))
    }

    // users

    /// Register a user. The id is minted here; role casing is normalised by
    /// the draft.
    pub fn register_user(&self, draft: UserDraft) -> Result<User> {
        let id = utils::new_bech32_id("user_")?;
        let user = draft.validate_and_finalise(id)?;
        self.store.insert_user(&user)?;
        info!(user = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    /// Fetch a profile as seen by `requester_id`. Phone fields are included
    /// only for the owner or a user sharing a non-deleted contract with the
    /// target, in either role direction.
    pub fn view_profile(&self, requester_id: &str, target_id: &str) -> Result<Profile> {
        let user = self
            .store
            .get_user(target_id)?
            .ok_or_else(|| Error::not_found("user", target_id))?;
        let include_phone = requester_id == target_id
            || self.store.shared_contract_exists(requester_id, target_id)?;
        Ok(Profile::from_user(&user, include_phone))
    }

    /// Moderation toggle. Suspension also drops the active flag so listings
    /// can skip the account.
    pub fn set_user_suspended(
        &self,
        actor_role: Role,
        target_id: &str,
        suspended: bool,
    ) -> Result<User> {
        if actor_role != Role::Admin {
            return Err(Error::forbidden("only admins may suspend users"));
        }
        let (user, _) = self.store.update_user(target_id, |user| {
            user.is_suspended = suspended;
            user.is_active = !suspended;
            Ok(())
        })?;
        info!(user = %user.id, suspended, "suspension flag updated");
        Ok(user)
    }

    /// Direct ledger adjustment. Quietly returns `None` when the user does
    /// not exist.
    pub fn update_reputation(&self, user_id: &str, points: i64) -> Result<Option<Reputation>> {
        let updated = self.store.update_user(user_id, |user| {
            user.reputation = user.reputation.adjust(points);
            Ok(user.reputation)
        });
        match updated {
            Ok((_, reputation)) => Ok(Some(reputation)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    // contract lifecycle

    pub fn create_contract(
        &self,
        client_id: &str,
        actor_role: Role,
        draft: ContractDraft,
    ) -> Result<Contract> {
        if actor_role != Role::Client {
            return Err(Error::forbidden("only clients may create contracts"));
        }
        let terms = draft.validate_and_finalise()?;
        let id = utils::new_bech32_id("contract_")?;
        let contract = Contract::new(id, client_id.to_owned(), terms);
        self.store.insert_contract(&contract)?;
        info!(contract = %contract.id, client = %contract.client, "contract created");
        Ok(contract)
    }

    pub fn get_contract(&self, contract_id: &str) -> Result<Contract> {
        self.store
            .get_contract(contract_id)?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| Error::not_found("contract", contract_id))
    }

    /// Contracts the user is a party on, newest first. Soft-deleted records
    /// are omitted.
    pub fn contracts_for(&self, actor_id: &str) -> Result<Vec<Contract>> {
        let mut mine: Vec<Contract> = self
            .store
            .scan_contracts()?
            .into_iter()
            .filter(|c| !c.is_deleted && c.is_party(actor_id))
            .collect();
        mine.sort_by(|a, b| {
            b.created_at
                .to_datetime_utc()
                .cmp(&a.created_at.to_datetime_utc())
        });
        Ok(mine)
    }

    /// A freelancer puts themselves forward for an open contract. Advisory
    /// only: the client is free to assign anyone.
    pub fn apply_to_contract(
        &self,
        actor_id: &str,
        actor_role: Role,
        contract_id: &str,
    ) -> Result<Contract> {
        if actor_role != Role::Freelancer {
            return Err(Error::forbidden("only freelancers may apply"));
        }
        let applicant = self
            .store
            .get_user(actor_id)?
            .ok_or_else(|| Error::not_found("user", actor_id))?;
        if applicant.is_suspended {
            return Err(Error::forbidden("suspended users may not apply"));
        }
        let (contract, _) = self.store.update_contract(contract_id, |contract| {
            if contract.status != Status::Created {
                return Err(Error::InvalidState {
                    required: "Created",
                    current: contract.status,
                });
            }
            if contract.has_applied(actor_id) {
                return Err(Error::already_exists(format!(
                    "user {actor_id} already applied to contract {contract_id}"
                )));
            }
            contract.applications.push(Application {
                freelancer: actor_id.to_owned(),
                applied_at: TimeStamp::now(),
            });
            Ok(())
        })?;
        self.notify(
            &contract.client,
            NotificationKind::ApplicationReceived,
            "New application",
            format!("{} applied to \"{}\"", applicant.username, contract.title),
            Some(&contract.id),
            None,
        );
        Ok(contract)
    }

    pub fn assign_freelancer(
        &self,
        actor_id: &str,
        actor_role: Role,
        contract_id: &str,
        freelancer_id: &str,
    ) -> Result<Contract> {
        let freelancer = self
            .store
            .get_user(freelancer_id)?
            .ok_or_else(|| Error::not_found("user", freelancer_id))?;
        if freelancer.role != Role::Freelancer {
            return Err(Error::invalid_input(format!(
                "user {freelancer_id} is not a freelancer"
            )));
        }
        if freelancer.is_suspended {
            return Err(Error::invalid_input(format!(
                "user {freelancer_id} is suspended"
            )));
        }
        let (contract, _) = self.store.update_contract(contract_id, |contract| {
            Self::check_transition(contract, Status::Assigned, actor_role, "Created")?;
            if contract.client != actor_id {
                return Err(Error::forbidden("only the contract's client may assign"));
            }
            if contract.freelancer.is_some() {
                return Err(Error::conflict("freelancer already assigned"));
            }
            contract.freelancer = Some(freelancer_id.to_owned());
            contract.status = Status::Assigned;
            Ok(())
        })?;
        info!(contract = %contract.id, freelancer = %freelancer_id, "freelancer assigned");
        self.notify(
            freelancer_id,
            NotificationKind::ContractAssigned,
            "Contract assigned",
            format!("You were assigned to \"{}\"", contract.title),
            Some(&contract.id),
            None,
        );
        Ok(contract)
    }

    /// Mark the escrow funded and move the contract forward. Called by the
    /// payment rail wrapper once funds are locked; the address it allocated
    /// is recorded verbatim.
    pub fn fund_contract(
        &self,
        actor_id: &str,
        actor_role: Role,
        contract_id: &str,
        escrow_address: Option<String>,
    ) -> Result<Contract> {
        let (contract, _) = self.store.update_contract(contract_id, |contract| {
            Self::check_transition(contract, Status::Funded, actor_role, "Assigned")?;
            if contract.client != actor_id {
                return Err(Error::forbidden("only the contract's client may fund"));
            }
            contract.escrow_status = EscrowStatus::Funded;
            contract.escrow_address = escrow_address.clone();
            contract.funded_at = Some(TimeStamp::now());
            contract.status = Status::Funded;
            Ok(())
        })?;
        info!(contract = %contract.id, amount = contract.amount, "contract funded");
        if let Some(freelancer) = contract.freelancer.as_deref() {
            self.notify(
                freelancer,
                NotificationKind::ContractFunded,
                "Escrow funded",
                format!("Escrow for \"{}\" is funded, work can begin", contract.title),
                Some(&contract.id),
                None,
            );
        }
        Ok(contract)
    }

    pub fn submit_work(
        &self,
        actor_id: &str,
        actor_role: Role,
        contract_id: &str,
        ipfs_hash: &str,
    ) -> Result<Contract> {
        if ipfs_hash.trim().is_empty() {
            return Err(Error::invalid_input("ipfs hash is not set"));
        }
        let (contract, _) = self.store.update_contract(contract_id, |contract| {
            Self::check_transition(contract, Status::Submitted, actor_role, "Funded")?;
            if contract.freelancer.as_deref() != Some(actor_id) {
                return Err(Error::forbidden(
                    "only the assigned freelancer may submit work",
                ));
            }
            contract.ipfs_hash = Some(ipfs_hash.to_owned());
            contract.submitted_at = Some(TimeStamp::now());
            contract.status = Status::Submitted;
            Ok(())
        })?;
        info!(contract = %contract.id, "work submitted");
        self.notify(
            &contract.client,
            NotificationKind::WorkSubmitted,
            "Work submitted",
            format!(
                "The deliverable for \"{}\" is ready for review",
                contract.title
            ),
            Some(&contract.id),
            None,
        );
        Ok(contract)
    }

    /// Client sign-off on the submitted deliverable. The transition table
    /// also lists the freelancer role on this edge; the ownership check
    /// below keeps self-approval out regardless.
    pub fn approve_work(
        &self,
        actor_id: &str,
        actor_role: Role,
        contract_id: &str,
    ) -> Result<Contract> {
        let (contract, _) = self.store.update_contract(contract_id, |contract| {
            Self::check_transition(contract, Status::Approved, actor_role, "Submitted")?;
            if contract.client != actor_id {
                return Err(Error::forbidden("only the contract's client may approve"));
            }
            contract.approved_at = Some(TimeStamp::now());
            contract.status = Status::Approved;
            Ok(())
        })?;
        info!(contract = %contract.id, "work approved");
        if let Some(freelancer) = contract.freelancer.as_deref() {
            self.notify(
                freelancer,
                NotificationKind::WorkApproved,
                "Work approved",
                format!("\"{}\" was approved, payment is next", contract.title),
                Some(&contract.id),
                None,
            );
        }
        Ok(contract)
    }

    pub fn release_payment(
        &self,
        actor_id: &str,
        actor_role: Role,
        contract_id: &str,
    ) -> Result<Contract> {
        let (contract, _) = self.store.update_contract(contract_id, |contract| {
            Self::check_transition(contract, Status::Paid, actor_role, "Approved")?;
            if contract.client != actor_id {
                return Err(Error::forbidden(
                    "only the contract's client may release payment",
                ));
            }
            contract.paid_at = Some(TimeStamp::now());
            contract.status = Status::Paid;
            Ok(())
        })?;
        info!(contract = %contract.id, amount = contract.amount, "payment released");
        if let Some(freelancer) = contract.freelancer.clone() {
            self.reward(
                &freelancer,
                &contract.id,
                reputation::EVENT_PAYMENT_RELEASED,
                self.policy.payment_released,
            );
            self.notify(
                &freelancer,
                NotificationKind::PaymentReleased,
                "Payment released",
                format!("Escrow for \"{}\" was released to you", contract.title),
                Some(&contract.id),
                None,
            );
        }
        Ok(contract)
    }

    /// Soft delete. Only the owning client may remove a contract and only
    /// before anyone is engaged; a deleted contract reads as missing.
    pub fn delete_contract(
        &self,
        actor_id: &str,
        actor_role: Role,
        contract_id: &str,
    ) -> Result<()> {
        if actor_role != Role::Client {
            return Err(Error::forbidden("only clients may delete contracts"));
        }
        self.store.update_contract(contract_id, |contract| {
            if contract.client != actor_id {
                return Err(Error::forbidden("only the contract's client may delete"));
            }
            if contract.status != Status::Created {
                return Err(Error::InvalidState {
                    required: "Created",
                    current: contract.status,
                });
            }
            contract.is_deleted = true;
            Ok(())
        })?;
        info!(contract = %contract_id, "contract deleted");
        Ok(())
    }

    // disputes

    /// Open a dispute as one of the contract's parties. Standing is derived
    /// from the contract itself, not from the caller's claimed role.
    pub fn raise_dispute(
        &self,
        actor_id: &str,
        contract_id: &str,
        reason: &str,
        evidence: Vec<String>,
    ) -> Result<(Contract, Dispute)> {
        if reason.trim().is_empty() {
            return Err(Error::invalid_input("reason is not set"));
        }
        let dispute_id = utils::new_bech32_id("dispute_")?;
        let (contract, dispute) = self.store.create_dispute(contract_id, |contract| {
            if contract.dispute.is_some() {
                return Err(Error::already_exists(format!(
                    "dispute already exists for contract {contract_id}"
                )));
            }
            let Some(party) = contract.party_role(actor_id) else {
                return Err(Error::forbidden(
                    "only a party to the contract may raise a dispute",
                ));
            };
            Self::check_transition(contract, Status::Disputed, party, "Funded or Submitted")?;
            let dispute = Dispute::new(
                dispute_id.clone(),
                contract_id.to_owned(),
                party,
                actor_id.to_owned(),
                reason.trim().to_owned(),
                evidence.clone(),
            );
            contract.dispute = Some(dispute.id.clone());
            contract.status = Status::Disputed;
            Ok(dispute)
        })?;
        info!(
            contract = %contract.id,
            dispute = %dispute.id,
            raised_by = %dispute.raised_by,
            "dispute raised"
        );
        // let the other side know
        let counterparty = match dispute.raised_by {
            Role::Client => contract.freelancer.clone(),
            _ => Some(contract.client.clone()),
        };
        if let Some(user) = counterparty {
            self.notify(
                &user,
                NotificationKind::DisputeRaised,
                "Dispute raised",
                format!("A dispute was opened on \"{}\"", contract.title),
                Some(&contract.id),
                Some(&dispute.id),
            );
        }
        Ok((contract, dispute))
    }

    /// Admin verdict on an open dispute. Freelancer wins releases the escrow
    /// (contract ends Paid), client wins closes the contract (Resolved).
    pub fn resolve_dispute(
        &self,
        admin_id: &str,
        actor_role: Role,
        dispute_id: &str,
        decision: Resolution,
    ) -> Result<(Contract, Dispute)> {
        let (contract, dispute) = self.store.update_dispute(dispute_id, |contract, dispute| {
            if dispute.status != DisputeStatus::Open {
                return Err(Error::conflict(format!(
                    "dispute {dispute_id} is already resolved"
                )));
            }
            let target = match decision {
                Resolution::FreelancerWins => Status::Paid,
                Resolution::ClientWins => Status::Resolved,
            };
            Self::check_transition(contract, target, actor_role, "Disputed")?;
            if decision == Resolution::FreelancerWins {
                contract.paid_at = Some(TimeStamp::now());
            }
            contract.status = target;
            dispute.status = DisputeStatus::Resolved;
            dispute.resolution = Some(decision);
            dispute.resolved_by = Some(admin_id.to_owned());
            dispute.resolved_at = Some(TimeStamp::now());
            Ok(())
        })?;
        info!(
            contract = %contract.id,
            dispute = %dispute.id,
            resolution = %decision,
            "dispute resolved"
        );
        // reputation swings for both sides, keyed to this dispute
        let (winner, loser) = match decision {
            Resolution::FreelancerWins => {
                (contract.freelancer.clone(), Some(contract.client.clone()))
            }
            Resolution::ClientWins => (Some(contract.client.clone()), contract.freelancer.clone()),
        };
        if let Some(winner) = winner {
            self.reward(
                &winner,
                &dispute.id,
                reputation::EVENT_DISPUTE_WON,
                self.policy.dispute_won,
            );
        }
        if let Some(loser) = loser {
            self.reward(
                &loser,
                &dispute.id,
                reputation::EVENT_DISPUTE_LOST,
                self.policy.dispute_lost,
            );
        }
        for user in [Some(contract.client.clone()), contract.freelancer.clone()]
            .into_iter()
            .flatten()
        {
            self.notify(
                &user,
                NotificationKind::DisputeResolved,
                "Dispute resolved",
                format!(
                    "The dispute on \"{}\" was resolved: {decision}",
                    contract.title
                ),
                Some(&contract.id),
                Some(&dispute.id),
            );
        }
        Ok((contract, dispute))
    }

    /// Admin-wide dispute listing, newest first.
    pub fn all_disputes(&self, actor_role: Role) -> Result<Vec<DisputeView>> {
        if actor_role != Role::Admin {
            return Err(Error::forbidden("only admins may list all disputes"));
        }
        let mut disputes = self.store.scan_disputes()?;
        disputes.sort_by(|a, b| {
            b.created_at
                .to_datetime_utc()
                .cmp(&a.created_at.to_datetime_utc())
        });
        disputes
            .into_iter()
            .map(|d| self.dispute_view(d))
            .collect()
    }

    /// Disputes the user has standing in: raised by them or attached to a
    /// contract they are a party on.
    pub fn my_disputes(&self, actor_id: &str) -> Result<Vec<DisputeView>> {
        let mut mine = vec![];
        for dispute in self.store.scan_disputes()? {
            let involved = dispute.raised_by_user == actor_id
                || self
                    .store
                    .get_contract(&dispute.contract)?
                    .is_some_and(|c| c.is_party(actor_id));
            if involved {
                mine.push(dispute);
            }
        }
        mine.sort_by(|a, b| {
            b.created_at
                .to_datetime_utc()
                .cmp(&a.created_at.to_datetime_utc())
        });
        mine.into_iter().map(|d| self.dispute_view(d)).collect()
    }

    fn dispute_view(&self, dispute: Dispute) -> Result<DisputeView> {
        let contract_title = self
            .store
            .get_contract(&dispute.contract)?
            .map(|c| c.title)
            .unwrap_or_default();
        let raised_by_username = self
            .store
            .get_user(&dispute.raised_by_user)?
            .map(|u| u.username)
            .unwrap_or_else(|| dispute.raised_by_user.clone());
        Ok(DisputeView {
            dispute,
            contract_title,
            raised_by_username,
        })
    }

    // reports

    /// File a complaint against the other party on a shared contract.
    pub fn report_user(
        &self,
        actor_id: &str,
        contract_id: &str,
        reported_user_id: &str,
        reason: &str,
    ) -> Result<Report> {
        if reason.trim().is_empty() {
            return Err(Error::invalid_input("reason is not set"));
        }
        if actor_id == reported_user_id {
            return Err(Error::invalid_input("cannot report yourself"));
        }
        let contract = self.get_contract(contract_id)?;
        if !contract.is_party(actor_id) || !contract.is_party(reported_user_id) {
            return Err(Error::forbidden(
                "reporter and reported user must both be parties on the contract",
            ));
        }
        if self
            .store
            .duplicate_report_exists(actor_id, reported_user_id, contract_id)?
        {
            return Err(Error::already_exists(format!(
                "a report by {actor_id} against {reported_user_id} on contract {contract_id} is already on file"
            )));
        }
        let id = utils::new_bech32_id("report_")?;
        let report = Report::new(
            id,
            actor_id.to_owned(),
            reported_user_id.to_owned(),
            contract_id.to_owned(),
            reason.trim().to_owned(),
        );
        self.store.insert_report(&report)?;
        info!(report = %report.id, reporter = %actor_id, reported = %reported_user_id, "report filed");
        Ok(report)
    }

    /// Admin verdict on a pending report.
    pub fn review_report(
        &self,
        admin_id: &str,
        actor_role: Role,
        report_id: &str,
        outcome: ReportStatus,
    ) -> Result<Report> {
        if actor_role != Role::Admin {
            return Err(Error::forbidden("only admins may review reports"));
        }
        if outcome == ReportStatus::Pending {
            return Err(Error::invalid_input(
                "review outcome must be Reviewed or Dismissed",
            ));
        }
        let (report, _) = self.store.update_report(report_id, |report| {
            if report.status != ReportStatus::Pending {
                return Err(Error::conflict(format!(
                    "report {report_id} was already reviewed"
                )));
            }
            report.status = outcome;
            report.reviewed_by = Some(admin_id.to_owned());
            report.reviewed_at = Some(TimeStamp::now());
            Ok(())
        })?;
        info!(report = %report.id, outcome = %report.status, "report reviewed");
        Ok(report)
    }

    // notifications

    /// Notifications addressed to the user, newest first.
    pub fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>> {
        let mut out: Vec<Notification> = self
            .store
            .scan_notifications()?
            .into_iter()
            .filter(|n| n.user == user_id)
            .collect();
        out.sort_by(|a, b| {
            b.created_at
                .to_datetime_utc()
                .cmp(&a.created_at.to_datetime_utc())
        });
        Ok(out)
    }

    pub fn mark_notification_read(
        &self,
        actor_id: &str,
        notification_id: &str,
    ) -> Result<Notification> {
        let mut ntf = self
            .store
            .get_notification(notification_id)?
            .ok_or_else(|| Error::not_found("notification", notification_id))?;
        if ntf.user != actor_id {
            return Err(Error::forbidden("notification belongs to another user"));
        }
        ntf.read = true;
        self.store.put_notification(&ntf)?;
        Ok(ntf)
    }

    // side effects

    /// Reputation side effect. Failures are logged and swallowed, the
    /// triggering operation has already committed.
    fn reward(&self, user_id: &str, source_id: &str, event: &str, points: i64) {
        let key = reputation::event_key(source_id, event);
        match self.store.apply_reputation_event(user_id, &key, points) {
            Ok(EventOutcome::Applied(rep)) => {
                info!(
                    user = %user_id,
                    key = %key,
                    points,
                    score = rep.score,
                    level = %rep.level,
                    "reputation adjusted"
                );
            }
            Ok(EventOutcome::Duplicate) => {
                info!(user = %user_id, key = %key, "reputation event already applied");
            }
            Ok(EventOutcome::MissingUser) => {
                warn!(user = %user_id, key = %key, "reputation event for unknown user");
            }
            Err(err) => {
                warn!(user = %user_id, key = %key, error = %err, "reputation event failed");
            }
        }
    }

    /// Notification side effect. Fire and forget: a failure here never rolls
    /// back the operation that produced it.
    fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: String,
        contract: Option<&str>,
        dispute: Option<&str>,
    ) {
        let id = match utils::new_bech32_id("ntf_") {
            Ok(id) => id,
            Err(err) => {
                warn!(user = %user_id, error = %err, "failed to mint notification id");
                return;
            }
        };
        let ntf = Notification::new(
            id,
            user_id.to_owned(),
            kind,
            title.to_owned(),
            message,
            contract.map(str::to_owned),
            dispute.map(str::to_owned),
        );
        match self.store.put_notification(&ntf) {
            Ok(()) => debug!(user = %user_id, kind = ?kind, "notification stored"),
            Err(err) => warn!(user = %user_id, error = %err, "failed to store notification"),
        }
    }
}
