//! Application layer: the ledger engine and every flow that posts through it.
//!
//! `LedgerEngine` is the single writer of balances. The batch jobs
//! (`TaxSweep`, `AuctionCloser`) and the request-driven desks share it through
//! an `Arc` and coordinate with `KeyedLocks` and `JobLocks` instead of globals.

pub mod admin;
pub mod auction_close;
pub mod auctions;
pub mod ledger;
pub mod locks;
pub mod marketplace;
pub mod payroll;
pub mod permits;
pub mod tax_sweep;
pub mod tickets;
