//! Escrow-mediated contract marketplace: lifecycle engine, disputes,
//! reputation ledger and notification records over a sled store.

pub mod contract;
pub mod dispute;
pub mod error;
pub mod notification;
pub mod report;
pub mod reputation;
pub mod service;
pub mod state;
pub mod store;
pub mod user;
pub mod utils;
