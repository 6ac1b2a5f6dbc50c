//! Core traits for the WinDNS system
//!
//! This module defines the abstract interfaces that transports must follow.
//!
//! - [`Connector`]: Open authenticated sessions to the remote shell host
//! - [`RemoteSession`]: Run one command over an open session

pub mod transport;

pub use transport::{CommandOutput, Connector, RemoteSession};
