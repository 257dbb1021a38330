//! Kubernetes Secret Adapter
//!
//! Maps `core/v1` Secrets onto the domain's `CredentialObject`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, ResourceExt};

use crate::domain::{CredentialKind, CredentialObject};

/// Secrets API scoped to `namespace`, or cluster-wide when `None`.
pub fn secrets_api(client: Client, namespace: Option<&str>) -> Api<Secret> {
    match namespace {
        Some(ns) if !ns.is_empty() => Api::namespaced(client, ns),
        _ => Api::all(client),
    }
}

impl From<&Secret> for CredentialObject {
    fn from(secret: &Secret) -> Self {
        let data: BTreeMap<String, Vec<u8>> = secret
            .data
            .as_ref()
            .map(|data| {
                data.iter()
                    .map(|(field, bytes)| (field.clone(), bytes.0.clone()))
                    .collect()
            })
            .unwrap_or_default();

        CredentialObject::new(
            secret.namespace().unwrap_or_default(),
            secret.name_any(),
            CredentialKind::from_type(secret.type_.as_deref()),
            data,
        )
    }
}
