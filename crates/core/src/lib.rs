//! Shared plumbing for the command line tools: reading records and schemas from disk and printing
//! query results.

pub mod printer;
pub mod reader;
