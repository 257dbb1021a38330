//! Credential Value Objects
//!
//! Identity and payload of the credential objects (Secrets) being watched,
//! plus the structured key under which each observed certificate field is
//! tracked and published.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

// =============================================================================
// Keys
// =============================================================================

/// Identity of a credential object within the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secret {}/{}", self.namespace, self.name)
    }
}

/// Key of one exported metric series: a single field of a single object.
///
/// Compared by value on all three components, so no separator can make two
/// distinct triples collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationKey {
    pub namespace: String,
    pub name: String,
    pub field: String,
}

impl ObservationKey {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            field: field.into(),
        }
    }

    /// Key for `field` of the object identified by `object`.
    pub fn for_field(object: &ObjectKey, field: impl Into<String>) -> Self {
        Self::new(object.namespace.clone(), object.name.clone(), field)
    }

    /// True if this observation was taken from `object`.
    pub fn belongs_to(&self, object: &ObjectKey) -> bool {
        self.namespace == object.namespace && self.name == object.name
    }

    /// Label values in series order: namespace, name, field.
    pub fn label_values(&self) -> [&str; 3] {
        [&self.namespace, &self.name, &self.field]
    }
}

impl fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.namespace, self.name, self.field)
    }
}

/// A tracked field together with the last time it was confirmed present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub key: ObservationKey,
    pub last_seen: DateTime<Utc>,
}

// =============================================================================
// Credential Object
// =============================================================================

/// Declared kind of a credential object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialKind {
    /// `Opaque` secrets, also assumed when no type is declared
    Opaque,
    /// `kubernetes.io/tls` secrets
    Tls,
    /// Any other secret type (service account tokens, docker configs, ...)
    Other(String),
}

impl CredentialKind {
    pub const OPAQUE: &'static str = "Opaque";
    pub const TLS: &'static str = "kubernetes.io/tls";

    /// Map a Secret `type` to a kind. An unset type is what the API server
    /// defaults to `Opaque`.
    pub fn from_type(secret_type: Option<&str>) -> Self {
        match secret_type {
            None | Some("") | Some(Self::OPAQUE) => CredentialKind::Opaque,
            Some(Self::TLS) => CredentialKind::Tls,
            Some(other) => CredentialKind::Other(other.to_string()),
        }
    }

    /// Only opaque and TLS secrets are searched for certificates.
    pub fn is_watched(&self) -> bool {
        matches!(self, CredentialKind::Opaque | CredentialKind::Tls)
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Opaque => write!(f, "{}", Self::OPAQUE),
            CredentialKind::Tls => write!(f, "{}", Self::TLS),
            CredentialKind::Other(t) => write!(f, "{}", t),
        }
    }
}

/// Snapshot of a credential object as delivered by the watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialObject {
    pub namespace: String,
    pub name: String,
    pub kind: CredentialKind,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl CredentialObject {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        kind: CredentialKind,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
            data,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}
