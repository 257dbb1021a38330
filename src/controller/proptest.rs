//! Property-Based Tests for the Secret pipeline
//!
//! Drives one Secret through arbitrary sequences of watch events and checks
//! that the registry and the sink always agree with the last version seen.
//!
//! # Test Properties
//!
//! 1. **Last Write Wins**: live fields == certificate fields of the last applied version
//! 2. **Delete Clears**: after a delete no observation of the object remains
//! 3. **Resync Idempotence**: resyncs never change the live field set
//! 4. **Sink Agreement**: the sink holds exactly one series per registry entry

#![cfg(test)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::runtime::watcher::Event;
use proptest::prelude::*;

use super::informer::SecretInformer;
use super::reconciler::SecretReconciler;
use crate::adapters::{InMemoryExpirySink, ManualClock};
use crate::domain::ObjectKey;
use crate::registry::ExpiryRegistry;

const FIELDS: [&str; 5] = ["certPEM", "rootPEM", "tls.crt", "ca.crt", "tls.key"];

const CONTENTS: [&[u8]; 5] = [
    include_bytes!("../../tests/testdata/root.pem"),
    include_bytes!("../../tests/testdata/leaf.pem"),
    include_bytes!("../../tests/testdata/tls.pem"),
    include_bytes!("../../tests/testdata/leaf-key.pem"),
    b"plain text",
];

/// Indices into `CONTENTS` that hold a certificate.
fn is_cert(content: usize) -> bool {
    content < 3
}

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Apply(BTreeMap<usize, usize>),
    Delete,
    Resync,
}

/// Strategy for one version of the Secret's data: field index → content index.
fn data_strategy() -> impl Strategy<Value = BTreeMap<usize, usize>> {
    prop::collection::btree_map(0..FIELDS.len(), 0..CONTENTS.len(), 0..FIELDS.len())
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => data_strategy().prop_map(Op::Apply),
        1 => Just(Op::Delete),
        1 => Just(Op::Resync),
    ]
}

fn secret(data: &BTreeMap<usize, usize>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("subject".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(
            data.iter()
                .map(|(&field, &content)| {
                    (FIELDS[field].to_string(), ByteString(CONTENTS[content].to_vec()))
                })
                .collect(),
        ),
        ..Default::default()
    }
}

fn cert_fields(data: &BTreeMap<usize, usize>) -> Vec<String> {
    let mut fields: Vec<String> = data
        .iter()
        .filter(|(_, content)| is_cert(**content))
        .map(|(&field, _)| FIELDS[field].to_string())
        .collect();
    fields.sort();
    fields
}

// =============================================================================
// State Machine Property
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_live_fields_track_last_version(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let sink = Arc::new(InMemoryExpirySink::new());
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let registry = ExpiryRegistry::new(sink.clone()).unwrap();
        let mut informer = SecretInformer::new(SecretReconciler::new(registry.clone(), clock));
        let key = ObjectKey::new("default", "subject");

        // Model: the data of the live version, if any.
        let mut live: Option<BTreeMap<usize, usize>> = None;

        for op in ops {
            match op {
                Op::Apply(data) => {
                    informer.handle(Event::Apply(secret(&data)));
                    live = Some(data);
                }
                Op::Delete => {
                    if let Some(data) = live.take() {
                        informer.handle(Event::Delete(secret(&data)));
                    }
                }
                Op::Resync => {
                    informer.resync();
                }
            }

            let expected = live.as_ref().map(cert_fields).unwrap_or_default();
            prop_assert_eq!(registry.fields_of(&key), expected);
            prop_assert_eq!(sink.len(), registry.len());
        }
    }

    #[test]
    fn prop_resync_is_idempotent(data in data_strategy(), resyncs in 1usize..5) {
        let sink = Arc::new(InMemoryExpirySink::new());
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let registry = ExpiryRegistry::new(sink.clone()).unwrap();
        let mut informer = SecretInformer::new(SecretReconciler::new(registry.clone(), clock));

        informer.handle(Event::Apply(secret(&data)));
        let before = sink.series();

        for _ in 0..resyncs {
            informer.resync();
        }

        prop_assert_eq!(sink.series(), before);
        prop_assert_eq!(registry.tallies().deleted, 0);
    }
}
