//! Supply-chain traceability ledger.
//!
//! Lots, products, manufacturing sites, transports and warehouses are kept as
//! CBOR records in a sled-backed world state with a per-key history. Every
//! contract operation runs through [`service::SupplyChain::invoke`] as one
//! transaction that is committed or discarded as a whole.

pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod identity;
pub mod ledger;
pub mod lot;
pub mod manufacture;
pub mod observability;
pub mod operation;
pub mod product;
pub mod record;
pub mod service;
pub mod transport;
pub mod types;
pub mod utils;
pub mod warehouse;

pub use error::{ErrorKind, LedgerError, Result};
pub use service::SupplyChain;
