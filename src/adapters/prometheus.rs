//! Prometheus Expiry Sink Adapter
//!
//! Implements the `ExpirySink` port as a labelled Prometheus gauge.

use chrono::{DateTime, Utc};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::domain::{ExpirySink, ObservationKey};
use crate::error::{Error, Result};

/// Metric subsystem shared by everything kcertwatch exports.
pub const SUBSYSTEM: &str = "kcertwatch";

/// Label names, in [`ObservationKey::label_values`] order.
pub const EXPIRY_LABELS: [&str; 3] = ["secret_namespace", "secret_name", "secret_field"];

/// Publishes certificate expiry as `kcertwatch_cert_expire_time_seconds`.
#[derive(Clone)]
pub struct PrometheusExpirySink {
    gauge: GaugeVec,
}

impl PrometheusExpirySink {
    /// Create the gauge. It is not exposed until [`register`](Self::register) is called.
    pub fn new() -> Result<Self> {
        let opts = Opts::new(
            "cert_expire_time_seconds",
            "NotAfter time of certificate in seconds.",
        )
        .subsystem(SUBSYSTEM);

        Ok(Self {
            gauge: GaugeVec::new(opts, &EXPIRY_LABELS)?,
        })
    }

    /// Register the gauge with `registry`.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.gauge.clone()))?;
        Ok(())
    }
}

impl std::fmt::Debug for PrometheusExpirySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExpirySink")
            .field("labels", &EXPIRY_LABELS)
            .finish()
    }
}

impl ExpirySink for PrometheusExpirySink {
    fn set(&self, key: &ObservationKey, not_after: DateTime<Utc>) {
        self.gauge
            .with_label_values(&key.label_values())
            .set(not_after.timestamp() as f64);
    }

    fn delete(&self, key: &ObservationKey) -> bool {
        self.gauge.remove_label_values(&key.label_values()).is_ok()
    }
}

/// Render everything in `registry` in the Prometheus text format.
pub fn encode_text(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| Error::Internal(format!("metrics exposition is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn setup() -> (PrometheusExpirySink, Registry) {
        let sink = PrometheusExpirySink::new().unwrap();
        let registry = Registry::new();
        sink.register(&registry).unwrap();
        (sink, registry)
    }

    #[test]
    fn test_set_publishes_series() {
        let (sink, registry) = setup();
        let key = ObservationKey::new("default", "web", "tls.crt");

        sink.set(&key, Utc.timestamp_opt(1_813_048_200, 0).unwrap());

        let text = encode_text(&registry).unwrap();
        assert!(text.contains("# TYPE kcertwatch_cert_expire_time_seconds gauge"));
        assert!(text.contains(
            r#"kcertwatch_cert_expire_time_seconds{secret_field="tls.crt",secret_name="web",secret_namespace="default"} 1813048200"#
        ));
    }

    #[test]
    fn test_delete_reports_existence() {
        let (sink, registry) = setup();
        let key = ObservationKey::new("default", "web", "tls.crt");
        sink.set(&key, Utc.timestamp_opt(1_000, 0).unwrap());

        assert!(sink.delete(&key));
        assert!(!sink.delete(&key));

        let text = encode_text(&registry).unwrap();
        assert!(!text.contains("secret_name=\"web\""));
    }

    #[test]
    fn test_unregistered_sink_is_not_exposed() {
        let sink = PrometheusExpirySink::new().unwrap();
        let registry = Registry::new();
        sink.set(
            &ObservationKey::new("a", "b", "c"),
            Utc.timestamp_opt(1_000, 0).unwrap(),
        );

        assert!(encode_text(&registry).unwrap().is_empty());
    }

    #[test]
    fn test_adapter_debug() {
        let sink = PrometheusExpirySink::new().unwrap();
        assert!(format!("{:?}", sink).contains("PrometheusExpirySink"));
    }
}
