//! Prometheus registry for the exporter

use hostns_core::NamespaceId;
use prometheus::process_collector::ProcessCollector;
use prometheus::{Encoder, Gauge, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Dedicated registry plus the handful of metrics the exporter owns.
pub struct ExporterMetrics {
    registry: Registry,
    scrapes: IntCounter,
}

impl ExporterMetrics {
    pub fn new(listener_netns: NamespaceId, bootstrap_time: Duration) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let build_info = IntGaugeVec::new(
            Opts::new("hostns_exporter_build_info", "Build information of the exporter."),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);
        registry.register(Box::new(build_info))?;

        let netns = IntGaugeVec::new(
            Opts::new(
                "hostns_exporter_listener_netns",
                "Network namespace the HTTP listener was bound in.",
            ),
            &["netns"],
        )?;
        netns
            .with_label_values(&[listener_netns.to_string().as_str()])
            .set(1);
        registry.register(Box::new(netns))?;

        let bootstrap = Gauge::new(
            "hostns_exporter_bootstrap_seconds",
            "Time spent switching namespaces and binding the listener.",
        )?;
        bootstrap.set(bootstrap_time.as_secs_f64());
        registry.register(Box::new(bootstrap))?;

        let scrapes = IntCounter::new(
            "hostns_exporter_scrapes_total",
            "Number of metrics scrapes served.",
        )?;
        registry.register(Box::new(scrapes.clone()))?;

        registry.register(Box::new(ProcessCollector::for_self()))?;

        Ok(Self { registry, scrapes })
    }

    /// Content type of [`Self::render`] output.
    #[must_use]
    pub const fn content_type() -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Gather everything in the registry in text exposition format.
    pub fn render(&self) -> prometheus::Result<Vec<u8>> {
        self.scrapes.inc();

        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::with_capacity(16 * 1024);
        encoder.encode(&families, &mut buf)?;
        Ok(buf)
    }
}
