//! Integration tests module
//!
//! Every test runs a real coordinator on an ephemeral localhost port:
//! - Fetch, analyze, sync round trips through the worker client and session
//! - Command lines and payloads written by hand onto the socket
//! - Failure handling on both sides of the connection

pub mod end_to_end_test;
pub mod error_scenarios;
pub mod fixtures;
pub mod protocol_test;
