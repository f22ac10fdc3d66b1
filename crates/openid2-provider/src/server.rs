//! Request dispatch
//!
//! [`OpenIdProvider`] is the provider's single entry point: it checks the
//! message namespace, routes on `mode` and delivers the outcome on the
//! channel that mode uses.
//!
//! | mode                   | action                 | delivery  |
//! |------------------------|------------------------|-----------|
//! | `associate`            | association            | direct    |
//! | `checkid_immediate`    | login (no interaction) | indirect  |
//! | `checkid_setup`        | login (interactive)    | indirect  |
//! | `check_authentication` | signature verification | direct    |

use crate::association::{AssociationManager, AssociationStore};
use crate::config::ProviderConfig;
use crate::encoding::{parse_query, Params, NAMESPACE};
use crate::error::{ProviderError, ProviderResult};
use crate::login::{LoginFlow, LoginHandler, LoginMode};
use crate::response::{ProviderResponse, Responder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Protocol modes handled by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Association establishment
    Associate,
    /// Authentication without user interaction
    CheckidImmediate,
    /// Authentication with user interaction
    CheckidSetup,
    /// Stateless assertion verification
    CheckAuthentication,
}

impl Mode {
    /// Get the protocol name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Associate => "associate",
            Mode::CheckidImmediate => "checkid_immediate",
            Mode::CheckidSetup => "checkid_setup",
            Mode::CheckAuthentication => "check_authentication",
        }
    }

    /// Parse from the protocol name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "associate" => Some(Mode::Associate),
            "checkid_immediate" => Some(Mode::CheckidImmediate),
            "checkid_setup" => Some(Mode::CheckidSetup),
            "check_authentication" => Some(Mode::CheckAuthentication),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OpenID 2.0 provider.
///
/// # Example
///
/// ```rust,no_run
/// use openid2_provider::{
///     LoginDecision, LoginHandler, LoginRequest, LoginResponse, MemoryAssociationStore,
///     OpenIdProvider, ProviderConfig, ProviderResult,
/// };
/// use std::sync::Arc;
///
/// struct AlwaysYes;
///
/// #[async_trait::async_trait]
/// impl LoginHandler for AlwaysYes {
///     async fn login(&self, _: bool, request: &LoginRequest) -> ProviderResult<LoginDecision> {
///         Ok(LoginDecision::Approved(LoginResponse::new(
///             request.claimed_id.clone(),
///             "https://op.example/openid",
///         )))
///     }
/// }
///
/// async fn serve(query: &str) -> ProviderResult<()> {
///     let provider = OpenIdProvider::new(
///         Arc::new(MemoryAssociationStore::new()),
///         Arc::new(AlwaysYes),
///         ProviderConfig::default(),
///     )?;
///     let response = provider.handle_query(query).await;
///     println!("{} {:?}", response.status, response.location);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct OpenIdProvider {
    associations: AssociationManager,
    login: LoginFlow,
}

impl std::fmt::Debug for OpenIdProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenIdProvider")
            .field("associations", &self.associations)
            .finish_non_exhaustive()
    }
}

impl OpenIdProvider {
    /// Create a provider.
    ///
    /// # Arguments
    ///
    /// * `store` - Association store shared by all requests
    /// * `handler` - Authentication decision provider
    /// * `config` - Provider configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid
    pub fn new(
        store: Arc<dyn AssociationStore>,
        handler: Arc<dyn LoginHandler>,
        config: ProviderConfig,
    ) -> ProviderResult<Self> {
        config.validate()?;
        let associations = AssociationManager::new(store, config);
        let login = LoginFlow::new(associations.clone(), handler);
        Ok(Self {
            associations,
            login,
        })
    }

    /// The association manager used for signing and verification.
    pub fn associations(&self) -> &AssociationManager {
        &self.associations
    }

    /// Handle a decoded OpenID message.
    #[instrument(
        skip(self, params),
        fields(
            request_id = %Uuid::now_v7(),
            mode = params.get("mode").map(String::as_str).unwrap_or("")
        )
    )]
    pub async fn handle(&self, params: &Params) -> ProviderResponse {
        let return_to = params.get("return_to").map(String::as_str).unwrap_or("");
        let ns = params.get("ns").map(String::as_str).unwrap_or("");
        if ns != NAMESPACE {
            return Responder::indirect(return_to)
                .respond(Err(ProviderError::UnknownNamespace(ns.to_string())));
        }

        let mode = params.get("mode").map(String::as_str).unwrap_or("");
        match Mode::parse(mode) {
            Some(Mode::Associate) => Responder::Direct.respond(self.associations.associate(params)),
            Some(Mode::CheckidImmediate) => self.login.run(LoginMode::Immediate, params).await,
            Some(Mode::CheckidSetup) => self.login.run(LoginMode::Setup, params).await,
            Some(Mode::CheckAuthentication) => {
                Responder::Direct.respond(self.associations.check_authentication(params).await)
            }
            None => Responder::indirect(return_to)
                .respond(Err(ProviderError::UnknownMode(mode.to_string()))),
        }
    }

    /// Handle a request from its query string or form-encoded body.
    pub async fn handle_query(&self, query: &str) -> ProviderResponse {
        let params = parse_query(query);
        self.handle(&params).await
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::association::MemoryAssociationStore;
    use crate::login::{LoginDecision, LoginRequest};
    use async_trait::async_trait;

    struct Decline;

    #[async_trait]
    impl LoginHandler for Decline {
        async fn login(&self, _: bool, _: &LoginRequest) -> ProviderResult<LoginDecision> {
            Ok(LoginDecision::Declined)
        }
    }

    fn provider() -> OpenIdProvider {
        OpenIdProvider::new(
            Arc::new(MemoryAssociationStore::new()),
            Arc::new(Decline),
            ProviderConfig::default(),
        )
        .unwrap()
    }

    fn request(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_mode_parsing() {
        for mode in [
            Mode::Associate,
            Mode::CheckidImmediate,
            Mode::CheckidSetup,
            Mode::CheckAuthentication,
        ] {
            assert_eq!(Mode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(Mode::parse("id_res"), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ProviderConfig {
            handle_attempts: 0,
            ..Default::default()
        };
        let result = OpenIdProvider::new(
            Arc::new(MemoryAssociationStore::new()),
            Arc::new(Decline),
            config,
        );
        assert!(matches!(result, Err(ProviderError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_wrong_namespace_without_return_to() {
        let response = provider()
            .handle(&request(&[("ns", "http://openid.net/signon/1.1"), ("mode", "associate")]))
            .await;

        assert_eq!(response.status, 400);
        assert!(response.is_error());
        assert_eq!(
            response.fields["error"],
            "unknown ns \"http://openid.net/signon/1.1\""
        );
    }

    #[tokio::test]
    async fn test_wrong_namespace_with_return_to() {
        let response = provider()
            .handle(&request(&[
                ("mode", "checkid_setup"),
                ("return_to", "https://rp.example/cb"),
            ]))
            .await;

        assert_eq!(response.status, 303);
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_unknown_mode() {
        let response = provider()
            .handle(&request(&[
                ("ns", NAMESPACE),
                ("mode", "bogus"),
                ("return_to", "https://rp.example/cb"),
            ]))
            .await;

        assert_eq!(response.status, 303);
        assert_eq!(response.fields["error"], "unknown mode \"bogus\"");
        assert!(response
            .location
            .unwrap()
            .starts_with("https://rp.example/cb?"));
    }

    #[tokio::test]
    async fn test_handle_query() {
        let query = format!(
            "openid.ns={}&openid.mode=associate&openid.session_type=DH-SHA1",
            url::form_urlencoded::byte_serialize(NAMESPACE.as_bytes()).collect::<String>()
        );
        let response = provider().handle_query(&query).await;

        assert_eq!(response.status, 400);
        assert_eq!(response.fields["error-code"], "unsupported-type");
    }
}
