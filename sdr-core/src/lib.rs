//! Host-side transport and command core for a software-defined-radio
//! client: the wire packet format, the command and data transport state
//! machines, the lock-free queues between them, and the ambient logging,
//! error, and configuration plumbing they share.
//!
//! Callers build a [`config::SessionConfig`] from the string-keyed map in
//! the session-configuration section, hand it to [`client::Session::connect`],
//! and drive the connection through the façade methods on [`client::Session`].
//! Everything below that is an implementation detail of how packets reach
//! the wire and come back.

pub mod async_dispatch;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod packet;
pub mod spsc;
pub mod stats;
pub mod transport;

pub use client::Session;
pub use error::CoreError;
