//! CRM boundary module
//!
//! Everything that talks to the remote CRM lives here: credential handling,
//! the `CrmClient`/`CrmConnector` traits the agent loop depends on, the
//! REST implementation, and the closed error classification that turns raw
//! provider error text into `QueryErrorKind` exactly once, at the boundary.

pub mod client;
pub mod error;
pub mod rest;
pub mod types;

pub use client::{CrmClient, CrmConnector};
pub use error::{ConnectionError, QueryErrorKind, QueryFailure};
pub use types::{CrmCredentials, QueryResult, Record};
