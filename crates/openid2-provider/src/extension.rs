//! Extension namespace negotiation
//!
//! Extensions ride inside the flat message as a namespace declaration
//! `ns.<prefix>=<uri>` followed by fields `<prefix>.<key>=<value>`. Within one
//! message each prefix names exactly one namespace and vice versa, and no
//! core protocol field name may be used as a prefix.

use crate::encoding::Params;
use crate::error::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Field names that can never be used as an extension prefix.
pub const RESERVED_PREFIXES: &[&str] = &[
    "assoc_handle",
    "assoc_type",
    "claimed_id",
    "contact",
    "delegate",
    "dh_consumer_public",
    "dh_gen",
    "dh_modulus",
    "error",
    "identity",
    "invalidate_handle",
    "mode",
    "ns",
    "op_endpoint",
    "openid",
    "realm",
    "reference",
    "response_nonce",
    "return_to",
    "server",
    "session_type",
    "sig",
    "signed",
    "trust_root",
];

/// Check if `prefix` is a reserved protocol field name.
pub fn is_reserved_prefix(prefix: &str) -> bool {
    RESERVED_PREFIXES.contains(&prefix)
}

/// An extension carried in a protocol message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Extension {
    /// Extension namespace URI
    pub namespace: String,

    /// Prefix the extension's fields appear under
    pub prefix: String,

    /// Extension fields without the prefix
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Extension {
    /// Create an extension with no fields.
    pub fn new(namespace: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            prefix: prefix.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a field.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Find the extension declared for `namespace`.
pub fn find_extension<'a>(extensions: &'a [Extension], namespace: &str) -> Option<&'a Extension> {
    extensions.iter().find(|ext| ext.namespace == namespace)
}

/// Parse the extensions declared in `params`.
///
/// Extensions are returned ordered by prefix. Fields under undeclared
/// prefixes are ignored.
pub fn parse_extensions(params: &Params) -> ProviderResult<Vec<Extension>> {
    let mut prefixes: BTreeMap<&str, &str> = BTreeMap::new();
    let mut namespaces: BTreeMap<&str, &str> = BTreeMap::new();

    for (key, namespace) in params {
        let Some(prefix) = key.strip_prefix("ns.") else {
            continue;
        };
        if prefix.is_empty() || is_reserved_prefix(prefix) {
            return Err(ProviderError::InvalidExtension(format!(
                "namespace prefix {:?} not allowed",
                prefix
            )));
        }
        if let Some(existing) = prefixes.get(prefix) {
            if *existing != namespace.as_str() {
                return Err(ProviderError::InvalidExtension(format!(
                    "namespace prefix {:?} assigned to multiple namespaces",
                    prefix
                )));
            }
        }
        if let Some(existing) = namespaces.get(namespace.as_str()) {
            if *existing != prefix {
                return Err(ProviderError::InvalidExtension(format!(
                    "namespace {:?} assigned to multiple prefixes",
                    namespace
                )));
            }
        }
        prefixes.insert(prefix, namespace.as_str());
        namespaces.insert(namespace.as_str(), prefix);
    }

    let mut extensions: BTreeMap<&str, Extension> = prefixes
        .iter()
        .map(|(prefix, namespace)| (*prefix, Extension::new(*namespace, *prefix)))
        .collect();

    for (key, value) in params {
        let Some((prefix, name)) = key.split_once('.') else {
            continue;
        };
        if prefix == "ns" {
            continue;
        }
        if let Some(extension) = extensions.get_mut(prefix) {
            extension.params.insert(name.to_string(), value.clone());
        }
    }

    Ok(extensions.into_values().collect())
}

/// Write `extensions` into `params`.
///
/// Each extension keeps its own prefix unless that prefix is reserved,
/// contains `.` or `,`, or is already taken in this message, in which case
/// the first free `extN` label is used. Extensions sharing a namespace are
/// merged under the first one's prefix, the first value of a repeated field
/// winning. Fields are written in key order; fields whose key is empty or
/// contains `,` are skipped.
///
/// # Returns
///
/// The names of the written extension fields, in the order they belong in
/// the `signed` list
pub fn encode_extensions(params: &mut Params, extensions: &[Extension]) -> Vec<String> {
    let mut signed = Vec::new();
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut namespaces: BTreeMap<&str, String> = BTreeMap::new();
    let mut next_label = 0usize;

    for extension in extensions {
        let prefix = match namespaces.get(extension.namespace.as_str()) {
            Some(prefix) => {
                debug!(namespace = %extension.namespace, prefix = %prefix, "merging repeated extension namespace");
                prefix.clone()
            }
            None => {
                let mut prefix = extension.prefix.clone();
                while !is_usable_prefix(&prefix) || used.contains(&prefix) {
                    prefix = format!("ext{}", next_label);
                    next_label += 1;
                }
                params.insert(format!("ns.{}", prefix), extension.namespace.clone());
                namespaces.insert(extension.namespace.as_str(), prefix.clone());
                used.insert(prefix.clone());
                prefix
            }
        };

        for (key, value) in &extension.params {
            if key.is_empty() || key.contains(',') {
                debug!(prefix = %prefix, key = %key, "skipping unencodable extension field");
                continue;
            }
            let field = format!("{}.{}", prefix, key);
            if params.contains_key(&field) {
                continue;
            }
            params.insert(field.clone(), value.clone());
            signed.push(field);
        }
    }

    signed
}

fn is_usable_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && !prefix.contains(['.', ',']) && !is_reserved_prefix(prefix)
}
