//! Identity oracle
//!
//! Attests that keys and key sets belong to registered legal identities,
//! binding each attestation to a recent confirmed block hash.

pub mod app_state;
pub mod approver;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod keys;
pub mod models;
pub mod oracle;
pub mod routes;
pub mod store;
pub mod tracker;

pub use error::{OracleError, Result};
