//! Ledger entities and the storage ports the services are written against.

pub mod account;
pub mod auction;
pub mod money;
pub mod permit;
pub mod ports;
pub mod tax;
pub mod ticket;
pub mod transaction;
