//! End-to-end walkthrough of the marketplace lifecycle.
//!
//! Runs one contract through the happy path and a second one through a
//! dispute, printing the records as they change:
//!
//! ```text
//! cargo run --example marketplace
//! ```

use std::sync::Arc;

use contract_escrow::{
    contract::{ContractDraft, TimeStamp},
    dispute::Resolution,
    service::MarketService,
    state::Role,
    user::UserDraft,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // throwaway database, a fresh run starts clean
    let dir = tempfile::tempdir()?;
    let db = Arc::new(sled::open(dir.path().join("marketplace.db"))?);
    let service = MarketService::new(db)?;

    let margaux = service.register_user(
        UserDraft::new()
            .set_username("margaux")
            .set_email("margaux@example.com")
            .set_role(Role::Client)
            .set_phone("+33 1 42 68 53 00"),
    )?;
    let tomas = service.register_user(
        UserDraft::new()
            .set_username("tomas")
            .set_email("tomas@example.com")
            .set_role(Role::Freelancer)
            .set_skills(vec!["rust".into(), "svelte".into()]),
    )?;
    let admin = service.register_user(
        UserDraft::new()
            .set_username("root")
            .set_email("ops@example.com")
            .set_role(Role::Admin)
            .set_permissions(vec!["disputes".into(), "reports".into()]),
    )?;

    // happy path: created -> assigned -> funded -> submitted -> approved -> paid
    let contract = service.create_contract(
        &margaux.id,
        Role::Client,
        ContractDraft::new()
            .set_title("Landing page")
            .set_description("Five sections, responsive, with a dark mode toggle")
            .set_amount(1_200)
            .set_deadline(TimeStamp::new_with(2031, 1, 15, 12, 0, 0)),
    )?;
    service.apply_to_contract(&tomas.id, Role::Freelancer, &contract.id)?;
    service.assign_freelancer(&margaux.id, Role::Client, &contract.id, &tomas.id)?;
    service.fund_contract(
        &margaux.id,
        Role::Client,
        &contract.id,
        Some("escrow_9f2c".into()),
    )?;
    service.submit_work(
        &tomas.id,
        Role::Freelancer,
        &contract.id,
        "QmYwAPJzv5CZsnAzt8auVTL6aKqgcZCvhx5pGXy3gDNYyB",
    )?;
    service.approve_work(&margaux.id, Role::Client, &contract.id)?;
    let paid = service.release_payment(&margaux.id, Role::Client, &contract.id)?;
    println!("{paid:#?}");

    // dispute path: the client sits on the second deliverable
    let stalled = service.create_contract(
        &margaux.id,
        Role::Client,
        ContractDraft::new()
            .set_title("Checkout flow")
            .set_description("Cart, payment form and confirmation emails")
            .set_amount(3_400)
            .set_deadline(TimeStamp::new_with(2031, 3, 1, 9, 0, 0)),
    )?;
    service.assign_freelancer(&margaux.id, Role::Client, &stalled.id, &tomas.id)?;
    service.fund_contract(
        &margaux.id,
        Role::Client,
        &stalled.id,
        Some("escrow_0a41".into()),
    )?;
    service.submit_work(
        &tomas.id,
        Role::Freelancer,
        &stalled.id,
        "QmT5NvUtoM5nWFfrQdVrFtvGfKFmG7AHE8P34isapyhCxX",
    )?;

    let (_, dispute) = service.raise_dispute(
        &tomas.id,
        &stalled.id,
        "payment withheld unfairly",
        vec!["QmT5NvUtoM5nWFfrQdVrFtvGfKFmG7AHE8P34isapyhCxX".into()],
    )?;
    let (resolved, verdict) = service.resolve_dispute(
        &admin.id,
        Role::Admin,
        &dispute.id,
        Resolution::FreelancerWins,
    )?;
    println!(
        "contract {} ended {} after verdict {}",
        resolved.id,
        resolved.status,
        verdict.resolution.unwrap()
    );

    // one payout and a won dispute later, the freelancer has a track record
    let profile = service.view_profile(&margaux.id, &tomas.id)?;
    println!(
        "{} is now {} with {} points",
        profile.username, profile.reputation.level, profile.reputation.score
    );

    for ntf in service.notifications_for(&tomas.id)? {
        println!("[{}] {}", if ntf.read { "x" } else { " " }, ntf.message);
    }

    Ok(())
}
