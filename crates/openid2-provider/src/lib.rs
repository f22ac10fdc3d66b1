//! # OpenID 2.0 Provider
//!
//! This crate implements the provider (OP) side of OpenID 2.0 authentication.
//!
//! ## Overview
//!
//! The openid2-provider crate handles:
//! - **Associations**: Shared HMAC-SHA1 / HMAC-SHA256 secrets identified by handles
//! - **Assertions**: Signed `id_res` responses for `checkid_immediate` and `checkid_setup`
//! - **Verification**: Stateless `check_authentication` for relying parties
//!   that keep no association state
//! - **Extensions**: Namespace-prefixed extension fields (SREG, AX, ...)
//!
//! Identity discovery, the relying-party side of the protocol and
//! Diffie-Hellman association sessions are not implemented.
//!
//! ## Features
//!
//! - `memory` (default): In-memory association store
//!
//! ## Usage
//!
//! The embedding application supplies two collaborators:
//! - an [`AssociationStore`] shared by all requests
//! - a [`LoginHandler`] that authenticates the user
//!
//! and passes every OpenID request to [`OpenIdProvider::handle`] (decoded
//! message) or [`OpenIdProvider::handle_query`] (raw query string or form
//! body). The returned [`ProviderResponse`] is either a key-value body or a
//! 303 redirect to the relying party.
//!
//! ## Logging
//!
//! The crate emits `tracing` events and spans; install a subscriber in the
//! embedding application to collect them. Secrets, signatures and nonces are
//! never logged.

pub mod association;
pub mod config;
pub mod encoding;
pub mod error;
pub mod extension;
pub mod login;
pub mod response;
pub mod server;

// Re-export main types
pub use association::{Association, AssociationManager, AssociationStore, AssociationType};
#[cfg(feature = "memory")]
pub use association::MemoryAssociationStore;
pub use config::ProviderConfig;
pub use encoding::{Params, NAMESPACE};
pub use error::{ProviderError, ProviderResult, StoreError, StoreResult};
pub use extension::Extension;
pub use login::{LoginDecision, LoginHandler, LoginMode, LoginRequest, LoginResponse};
pub use response::{ProviderResponse, Responder};
pub use server::{Mode, OpenIdProvider};
