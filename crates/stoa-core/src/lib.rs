//! # Stoa Core
//!
//! Core types for the Stoa registration layer.
//!
//! This crate provides the foundational types used throughout Stoa:
//!
//! - [`Fault`] / [`FaultKind`] - Domain error sentinels with a fixed status taxonomy
//! - [`ErrorMode`] - Development/production switch controlling error exposure
//! - [`Context`] / [`RequestId`] - Per-request view handed to business handlers
//! - [`Identity`] - Authenticated caller data stored by the identity gate
//! - [`Validate`] - Self-validation contract for bound inputs

#![doc(html_root_url = "https://docs.rs/stoa-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;
mod validate;

pub use context::{Context, RequestId};
pub use error::{ErrorMode, Fault, FaultBody, FaultKind, FaultResult};
pub use identity::Identity;
pub use validate::{Empty, FieldErrors, Validate};
