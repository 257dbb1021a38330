//! Certificate Field Extractor
//!
//! Finds PEM encoded X.509 certificates in credential data and reports each
//! certificate's `notAfter` time, keyed by the field it was found in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};
use x509_parser::pem::parse_x509_pem;

use crate::error::{Error, Result};

/// Longest data key the API server accepts for a Secret.
const MAX_FIELD_NAME_LEN: usize = 253;

const PEM_BEGIN: &[u8] = b"-----BEGIN";

/// Search `data` for PEM encoded certificates and return their expiry times.
///
/// For every field the first PEM block is decoded; if it holds a certificate
/// the field is included with the certificate's `notAfter`. Fields without a
/// PEM block, with a non-certificate block, or with an unrepresentable expiry
/// are left out of the result.
///
/// Fails only when a field name is not a valid Secret data key, since such a
/// name would be published verbatim as a label value.
pub fn search_expiries(data: &BTreeMap<String, Vec<u8>>) -> Result<BTreeMap<String, DateTime<Utc>>> {
    let mut results = BTreeMap::new();

    for (field, bytes) in data {
        validate_field_name(field)?;

        if let Some(not_after) = certificate_not_after(field, bytes) {
            results.insert(field.clone(), not_after);
        }
    }

    Ok(results)
}

/// Offset of the first line that starts with a PEM header. Anything before
/// it, including bytes that are not UTF-8, is ignored.
fn first_pem_block(bytes: &[u8]) -> Option<usize> {
    if bytes.starts_with(PEM_BEGIN) {
        return Some(0);
    }
    bytes
        .windows(PEM_BEGIN.len() + 1)
        .position(|window| window[0] == b'\n' && &window[1..] == PEM_BEGIN)
        .map(|newline| newline + 1)
}

/// Expiry of the certificate in the first PEM block of `bytes`, if any.
fn certificate_not_after(field: &str, bytes: &[u8]) -> Option<DateTime<Utc>> {
    let Some(offset) = first_pem_block(bytes) else {
        trace!(field, "no PEM block");
        return None;
    };

    let pem = match parse_x509_pem(&bytes[offset..]) {
        Ok((_, pem)) => pem,
        Err(e) => {
            trace!(field, "not PEM formatted: {}", e);
            return None;
        }
    };

    let cert = match pem.parse_x509() {
        Ok(cert) => cert,
        Err(e) => {
            debug!(field, label = %pem.label, "PEM block is not a certificate: {}", e);
            return None;
        }
    };

    let timestamp = cert.validity().not_after.timestamp();
    let not_after = DateTime::<Utc>::from_timestamp(timestamp, 0);
    if not_after.is_none() {
        debug!(field, timestamp, "certificate expiry out of range");
    }
    not_after
}

fn validate_field_name(field: &str) -> Result<()> {
    let reason = if field.is_empty() {
        Some("empty field name".to_string())
    } else if field.len() > MAX_FIELD_NAME_LEN {
        Some(format!("longer than {} bytes", MAX_FIELD_NAME_LEN))
    } else if let Some(c) = field
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        Some(format!("invalid character {:?}", c))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::MalformedCredential {
            field: field.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
