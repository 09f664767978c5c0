//! Core models, tree synchronization and breach intelligence for vigil.
//!
//! This crate provides the shared types, the KeePass synchronization layer,
//! the breach scanner, CSV import and the password generator used by the
//! command-line frontend.

pub mod breach;
pub mod database;
pub mod generator;
pub mod import;
pub mod models;
pub mod sync;
pub mod tree;

pub use database::KeepassDatabase;
pub use models::{Entry, Group, AGGREGATE_ROOT_NAME};
