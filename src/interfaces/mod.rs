//! Outer adapters: CSV import/export and the command handlers behind the binary.

pub mod cli;
pub mod csv;
