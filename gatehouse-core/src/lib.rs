//! Gatehouse core library: a transactional store for menus, permissions,
//! roles and their associations.
//!
//! The main entry point is [`service::Gatehouse`]. Every mutation is a
//! [`store::UnitOfWork`] queued on the store's [`store::WriteSerializer`]
//! and executed as one exclusive `SQLite` transaction; hierarchy checks in
//! [`hierarchy`] run inside the same transaction as the write they guard.

pub mod associations;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod tree;
pub mod types;

pub use error::{ErrorKind, GatehouseError, Result};
pub use service::Gatehouse;
