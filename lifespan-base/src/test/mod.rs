//! Helpers for tests that run real servers.

mod free_port;

pub use free_port::*;
