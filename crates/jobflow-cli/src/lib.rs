//! Jobflow CLI library — command implementations shared by the `jobflow`
//! binary and its integration tests.

pub mod commands;
