//! Login flow
//!
//! `checkid_immediate` and `checkid_setup` requests are turned into a
//! [`LoginRequest`] and handed to the embedding application's
//! [`LoginHandler`], which decides whether the user is authenticated. An
//! approved login becomes a signed `id_res` assertion; a declined one becomes
//! `setup_needed` (immediate) or `cancel` (setup).
//!
//! ## Signed fields
//!
//! The assertion signs, in order: `op_endpoint`, `return_to`,
//! `response_nonce`, `assoc_handle`, then `claimed_id` and `identity` when
//! present, then every extension field in the order the extensions were
//! encoded.

use crate::association::{random_token, AssociationManager};
use crate::encoding::{Params, NAMESPACE};
use crate::error::{ProviderError, ProviderResult};
use crate::extension::{encode_extensions, find_extension, parse_extensions, Extension};
use crate::response::{ProviderResponse, Responder};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// An authentication request from a relying party.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    /// Identifier the user claims to own
    pub claimed_id: String,

    /// Provider-local identifier
    pub identity: String,

    /// Relying party callback URL
    pub return_to: String,

    /// Relying party trust root
    pub realm: String,

    /// Extensions requested by the relying party
    pub extensions: Vec<Extension>,
}

impl LoginRequest {
    /// Build a login request from a decoded message.
    ///
    /// `trust_root` is accepted in place of a missing `realm`.
    pub fn from_params(params: &Params) -> ProviderResult<Self> {
        let field = |name: &str| params.get(name).cloned().unwrap_or_default();

        let realm = params
            .get("realm")
            .or_else(|| params.get("trust_root"))
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            claimed_id: field("claimed_id"),
            identity: field("identity"),
            return_to: field("return_to"),
            realm,
            extensions: parse_extensions(params)?,
        })
    }

    /// Get the requested extension for `namespace`.
    pub fn extension(&self, namespace: &str) -> Option<&Extension> {
        find_extension(&self.extensions, namespace)
    }
}

/// A positive authentication decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    /// Identifier the user was authenticated as
    pub claimed_id: String,

    /// Provider-local identifier
    pub identity: String,

    /// This provider's endpoint URL
    pub op_endpoint: String,

    /// Extensions to return to the relying party
    pub extensions: Vec<Extension>,
}

impl LoginResponse {
    /// Create a response for `claimed_id` asserted by `op_endpoint`.
    pub fn new(claimed_id: impl Into<String>, op_endpoint: impl Into<String>) -> Self {
        Self {
            claimed_id: claimed_id.into(),
            op_endpoint: op_endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the provider-local identifier.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Add an extension.
    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }
}

/// Outcome of a [`LoginHandler`] decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginDecision {
    /// The user is authenticated
    Approved(LoginResponse),

    /// There is no authenticated user
    Declined,

    /// The handler produced the HTTP response itself, e.g. a credential
    /// form. Only valid when interaction is allowed.
    Handled(ProviderResponse),
}

/// Authentication decision provider supplied by the embedding application.
#[async_trait]
pub trait LoginHandler: Send + Sync {
    /// Decide whether `request` is authenticated.
    ///
    /// With `allow_interactive` false the decision must be made without user
    /// interaction and [`LoginDecision::Handled`] must not be returned.
    ///
    /// # Errors
    ///
    /// Any error aborts the request with an OpenID error message.
    async fn login(
        &self,
        allow_interactive: bool,
        request: &LoginRequest,
    ) -> ProviderResult<LoginDecision>;
}

/// The two login modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    /// `checkid_immediate`
    Immediate,
    /// `checkid_setup`
    Setup,
}

impl LoginMode {
    /// Whether the login handler may interact with the user.
    pub fn allows_interactive(&self) -> bool {
        matches!(self, LoginMode::Setup)
    }

    /// Mode of the negative response sent when the login is declined.
    fn declined_mode(&self) -> &'static str {
        match self {
            LoginMode::Immediate => "setup_needed",
            LoginMode::Setup => "cancel",
        }
    }
}

/// Generate a response nonce: the current UTC time followed by random text.
pub fn generate_nonce() -> String {
    format!(
        "{}{}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        random_token()
    )
}

/// Drives a login request to a signed assertion or a negative response.
#[derive(Clone)]
pub struct LoginFlow {
    associations: AssociationManager,
    handler: Arc<dyn LoginHandler>,
}

impl std::fmt::Debug for LoginFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginFlow")
            .field("associations", &self.associations)
            .finish_non_exhaustive()
    }
}

impl LoginFlow {
    /// Create a login flow signing with `associations`.
    pub fn new(associations: AssociationManager, handler: Arc<dyn LoginHandler>) -> Self {
        Self {
            associations,
            handler,
        }
    }

    /// Run the login flow for a decoded `checkid_*` message.
    #[instrument(skip(self, params))]
    pub async fn run(&self, mode: LoginMode, params: &Params) -> ProviderResponse {
        let return_to = params.get("return_to").map(String::as_str).unwrap_or("");
        let responder = Responder::indirect(return_to);

        let request = match LoginRequest::from_params(params) {
            Ok(request) => request,
            Err(e) => return responder.respond(Err(e)),
        };

        let response = match self.handler.login(mode.allows_interactive(), &request).await {
            Ok(LoginDecision::Approved(response)) => response,
            Ok(LoginDecision::Declined) => {
                debug!(mode = mode.declined_mode(), "login declined");
                return responder.respond(Ok(negative(mode.declined_mode())));
            }
            Ok(LoginDecision::Handled(response)) => match mode {
                LoginMode::Setup => {
                    debug!("login handler responded directly");
                    return response;
                }
                LoginMode::Immediate => {
                    warn!("login handler responded interactively to checkid_immediate");
                    return responder.respond(Err(ProviderError::LoginFailed(
                        "interactive response not allowed for checkid_immediate".to_string(),
                    )));
                }
            },
            Err(e) => return responder.respond(Err(e)),
        };

        if return_to.is_empty() {
            return Responder::Direct.respond(Err(ProviderError::MissingReturnTo));
        }

        let assertion = self.assertion(params, &response).await;
        if assertion.is_ok() {
            info!(claimed_id = %response.claimed_id, "positive assertion issued");
        }
        responder.respond(assertion)
    }

    /// Build the signed `id_res` message for an approved login.
    async fn assertion(&self, params: &Params, response: &LoginResponse) -> ProviderResult<Params> {
        let nonce = generate_nonce();
        let requested_handle = params.get("assoc_handle").map(String::as_str).unwrap_or("");
        let association = self
            .associations
            .get_or_create("", requested_handle)
            .await?;

        let mut fields = Params::new();
        fields.insert("ns".to_string(), NAMESPACE.to_string());
        fields.insert("mode".to_string(), "id_res".to_string());
        fields.insert("op_endpoint".to_string(), response.op_endpoint.clone());
        fields.insert(
            "return_to".to_string(),
            params.get("return_to").cloned().unwrap_or_default(),
        );
        fields.insert("response_nonce".to_string(), nonce);
        fields.insert("assoc_handle".to_string(), association.handle.clone());

        let mut signed: Vec<String> = ["op_endpoint", "return_to", "response_nonce", "assoc_handle"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if !response.claimed_id.is_empty() {
            fields.insert("claimed_id".to_string(), response.claimed_id.clone());
            signed.push("claimed_id".to_string());
        }
        if !response.identity.is_empty() {
            fields.insert("identity".to_string(), response.identity.clone());
            signed.push("identity".to_string());
        }
        if !requested_handle.is_empty() && requested_handle != association.handle {
            fields.insert("invalidate_handle".to_string(), requested_handle.to_string());
        }

        signed.extend(encode_extensions(&mut fields, &response.extensions));
        fields.insert("signed".to_string(), signed.join(","));

        let sig = association.sign(&signed, &fields)?;
        fields.insert("sig".to_string(), sig);
        Ok(fields)
    }
}

fn negative(mode: &str) -> Params {
    let mut params = Params::new();
    params.insert("ns".to_string(), NAMESPACE.to_string());
    params.insert("mode".to_string(), mode.to_string());
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    const SREG: &str = "http://openid.net/extensions/sreg/1.1";

    #[test]
    fn test_login_request_from_params() {
        let mut params = Params::new();
        params.insert("claimed_id".to_string(), "https://example.org/u1".to_string());
        params.insert("return_to".to_string(), "https://rp.example/cb".to_string());
        params.insert("trust_root".to_string(), "https://rp.example/".to_string());
        params.insert("ns.sreg".to_string(), SREG.to_string());
        params.insert("sreg.required".to_string(), "email".to_string());

        let request = LoginRequest::from_params(&params).unwrap();

        assert_eq!(request.claimed_id, "https://example.org/u1");
        assert_eq!(request.identity, "");
        assert_eq!(request.realm, "https://rp.example/");
        assert_eq!(request.extension(SREG).and_then(|e| e.get("required")), Some("email"));
    }

    #[test]
    fn test_login_request_prefers_realm() {
        let mut params = Params::new();
        params.insert("realm".to_string(), "https://a.example/".to_string());
        params.insert("trust_root".to_string(), "https://b.example/".to_string());

        let request = LoginRequest::from_params(&params).unwrap();
        assert_eq!(request.realm, "https://a.example/");
    }

    #[test]
    fn test_login_request_rejects_bad_extensions() {
        let mut params = Params::new();
        params.insert("ns.sig".to_string(), SREG.to_string());

        assert!(matches!(
            LoginRequest::from_params(&params),
            Err(ProviderError::InvalidExtension(_))
        ));
    }

    #[test]
    fn test_nonce_format() {
        let nonce = generate_nonce();
        let (timestamp, suffix) = nonce.split_at(20);

        assert!(timestamp.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert_eq!(suffix.len(), 22);
        assert_ne!(generate_nonce(), nonce);
    }

    #[test]
    fn test_login_modes() {
        assert!(!LoginMode::Immediate.allows_interactive());
        assert!(LoginMode::Setup.allows_interactive());
        assert_eq!(LoginMode::Immediate.declined_mode(), "setup_needed");
        assert_eq!(LoginMode::Setup.declined_mode(), "cancel");
    }

    #[test]
    fn test_login_response_builder() {
        let response = LoginResponse::new("https://example.org/u1", "https://op.example/id")
            .with_identity("https://op.example/id/u1")
            .with_extension(Extension::new(SREG, "sreg").with_param("email", "u1@example.org"));

        assert_eq!(response.identity, "https://op.example/id/u1");
        assert_eq!(response.extensions.len(), 1);
    }
}
