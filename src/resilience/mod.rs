//! Resilience helpers.
//!
//! Every blocking point of an exchange (connect, read, write) goes through
//! [`timeouts::with_timeout`] so a stalled peer can never pin a session.

pub mod timeouts;
