pub mod account_writer;
pub mod posting_reader;
