//! # Stoa
//!
//! Declarative handler registration atop an external HTTP engine.
//!
//! Business code supplies plain async functions; Stoa extracts routing
//! metadata from the structured documentation text attached to each
//! function, builds a per-route execution pipeline, and registers that
//! pipeline with the underlying engine:
//!
//! ```text
//! @authorize(admin,ops:::read,write)
//! @audit_log
//! [GET] /api/v1/widgets/:id 200 json
//! ```
//!
//! - the `[VERB] /path status mode` line becomes the route descriptor;
//! - the `@authorize` line prepends an identity gate invoking the
//!   externally supplied identifier function;
//! - every other `@name` line inserts the named decorator, in source order;
//! - the main action binds the typed input, validates it, calls the
//!   business function, and renders its typed output under the declared
//!   response mode.
//!
//! Registration happens once at process startup through [`Registry`];
//! [`Registry::freeze`] resolves all references and yields the immutable
//! [`RouteTable`], which [`RouteTable::mount`] hands to the engine. All
//! registration failures are [`RegistryError`] values: fail fast at boot,
//! never at the first request.
//!
//! # Example
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use stoa::{Context, FaultResult, Registry, Respond, Validate};
//!
//! #[derive(Deserialize, Validate)]
//! struct WidgetQuery {
//!     id: i64,
//! }
//!
//! #[derive(Serialize, Respond)]
//! struct Widget {
//!     id: i64,
//!     name: String,
//! }
//!
//! async fn get_widget(_ctx: Context, query: WidgetQuery) -> FaultResult<Widget> {
//!     Ok(Widget { id: query.id, name: "lid".into() })
//! }
//!
//! let mut registry = Registry::new();
//! registry.register("[GET] /api/v1/widgets/:id 200 json", get_widget)?;
//! let table = registry.freeze()?;
//! table.mount(&mut engine);
//! ```

#![doc(html_root_url = "https://docs.rs/stoa/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bind;
mod decorate;
mod descriptor;
mod error;
mod identify;
mod pipeline;
mod registry;
mod respond;

pub use decorate::{decorator, DecoratorFn};
pub use descriptor::{parse, Descriptors, IdentityDescriptor, RouteDescriptor, RouteKey};
pub use error::{BindError, RegistryError};
pub use identify::{identifier, IdentifierFn, IDENTITY_KEY};
pub use registry::{Registry, RouteTable, Settings};
pub use respond::{ErrorCodec, Respond, RespondCaps, ResponseMode};

// Core vocabulary, re-exported so business crates depend on `stoa` alone.
pub use stoa_core::{
    Context, Empty, ErrorMode, Fault, FaultBody, FaultKind, FaultResult, FieldErrors, Identity,
    RequestId, Validate,
};
pub use stoa_engine::{step, BoxFuture, Engine, Exchange, RouteChain, Step};

// Derive macros; same names as the traits they implement, serde-style.
pub use stoa_macros::{Respond, Validate};

#[doc(hidden)]
pub mod __private {
    //! Implementation details of the derive macros; not a public API.
    pub use serde_json;
}
