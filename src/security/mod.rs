//! Security subsystem.
//!
//! Parsing limits that keep a single peer from exhausting memory. TLS
//! termination lives in `net::tls`.

pub mod limits;
