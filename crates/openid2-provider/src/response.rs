//! Response delivery
//!
//! OpenID messages reach the relying party either directly, as a key-value
//! body answering its own request, or indirectly, as a 303 redirect of the
//! user agent to the relying party's `return_to` URL with the message in the
//! query string.

use crate::encoding::{encode_http, encode_key_value, Params, NAMESPACE};
use crate::error::{ProviderError, ProviderResult};
use tracing::{debug, error, warn};
use url::Url;

/// Content type of direct key-value responses.
pub const KEY_VALUE_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Transport-neutral HTTP response produced by the provider.
///
/// Embedding servers copy status, `Location`, content type and body into
/// their framework's response type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    /// HTTP status code
    pub status: u16,

    /// Redirect target for indirect responses
    pub location: Option<String>,

    /// Body content type, empty when there is no body
    pub content_type: String,

    /// Response body
    pub body: String,

    /// The OpenID message carried by this response
    pub fields: Params,
}

impl ProviderResponse {
    /// Create a response that carries no OpenID message, such as a login
    /// page rendered by a [`LoginHandler`](crate::login::LoginHandler).
    pub fn page(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            location: None,
            content_type: content_type.into(),
            body: body.into(),
            fields: Params::new(),
        }
    }

    /// Check if this is a redirect.
    pub fn is_redirect(&self) -> bool {
        self.location.is_some()
    }

    /// Check if the carried message is an OpenID error.
    pub fn is_error(&self) -> bool {
        self.fields.get("mode").map(String::as_str) == Some("error")
    }
}

/// Delivery channel for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Responder {
    /// Key-value body
    Direct,
    /// 303 redirect to the relying party
    Indirect(Url),
}

impl Responder {
    /// Indirect delivery to `return_to`.
    ///
    /// Falls back to direct delivery when `return_to` is empty or not an
    /// absolute URL. A relative `return_to` such as `/finish` has no host to
    /// redirect to, so its message is answered directly instead.
    pub fn indirect(return_to: &str) -> Self {
        if return_to.is_empty() {
            return Responder::Direct;
        }
        match Url::parse(return_to) {
            Ok(url) => Responder::Indirect(url),
            Err(e) => {
                warn!(error = %e, "unusable return_to, responding directly");
                Responder::Direct
            }
        }
    }

    /// Deliver `result`, encoding an error as an OpenID error message.
    pub fn respond(self, result: ProviderResult<Params>) -> ProviderResponse {
        let (fields, status) = match result {
            Ok(fields) => (fields, 200),
            Err(e) => {
                if e.is_server_error() {
                    error!(code = e.error_code(), error = %e, "request failed");
                } else {
                    debug!(code = e.error_code(), error = %e, "protocol error");
                }
                (error_fields(&e), e.status_code())
            }
        };

        match self {
            Responder::Direct => ProviderResponse {
                status,
                location: None,
                content_type: KEY_VALUE_CONTENT_TYPE.to_string(),
                body: encode_key_value(&fields),
                fields,
            },
            Responder::Indirect(mut url) => {
                encode_http(&mut url, &fields);
                ProviderResponse {
                    status: 303,
                    location: Some(url.to_string()),
                    content_type: String::new(),
                    body: String::new(),
                    fields,
                }
            }
        }
    }
}

/// Uniform OpenID error message for `err`.
pub fn error_fields(err: &ProviderError) -> Params {
    let mut fields = Params::new();
    fields.insert("ns".to_string(), NAMESPACE.to_string());
    fields.insert("mode".to_string(), "error".to_string());
    fields.insert("error".to_string(), err.to_string());
    fields.extend(err.error_params());
    fields
}
