//! # Stoa Engine
//!
//! Narrow interfaces to the external HTTP engine.
//!
//! The registration layer never talks to sockets, parses headers, or walks a
//! routing trie itself; it consumes the engine through two small surfaces:
//!
//! - [`Exchange`] - per-request accessors, the request-scoped key/value
//!   store, the chain-abort primitive, and the response writers
//! - [`Engine`] - the startup-time mounting surface taking finished step
//!   chains, global middleware, and static mounts
//!
//! The [`loopback`] module provides an in-memory engine implementing both,
//! used by tests and demos.

#![doc(html_root_url = "https://docs.rs/stoa-engine/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod engine;
mod exchange;
pub mod loopback;

pub use engine::{run_chain, step, BoxFuture, Engine, RouteChain, Step};
pub use exchange::{EngineError, Exchange};
