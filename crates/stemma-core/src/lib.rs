//! # stemma-core
//!
//! Core primitives for the Stemma lineage observability engine.
//!
//! This crate provides the foundational pieces shared by all Stemma
//! components:
//!
//! - **Error Types**: Shared error definitions and result aliases
//! - **Observability**: Logging initialization and span constructors
//! - **Environment**: Typed environment-variable parsing helpers
//! - **Cancellation**: Cooperative cancellation for long traversals
//!
//! ## Crate Boundary
//!
//! `stemma-core` is the only crate allowed to define shared primitives.
//! Domain logic lives in `stemma-artifacts` and `stemma-engine`; HTTP
//! composition lives in `stemma-api`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cancel;
pub mod envvar;
pub mod error;
pub mod observability;

pub use cancel::{CancelGuard, CancelToken};
pub use error::{Error, Result};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cancel::{CancelGuard, CancelToken};
    pub use crate::error::{Error, Result};
    pub use crate::observability::{LogFormat, init_logging};
}
