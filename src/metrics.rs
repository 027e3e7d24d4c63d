//! Metrics and tracing hooks.
//!
//! With the `metrics` feature, [`METRICS`] holds OpenTelemetry instruments on the
//! global meter; exporting them is up to the application. With the `tracing`
//! feature, [`tracing_helpers`] opens spans around declaration compile and page
//! fetch. Both compile to no-ops when their feature is off.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
use std::time::Duration;

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<SeawallMetrics> = Lazy::new(SeawallMetrics::init);

#[cfg(feature = "metrics")]
pub struct SeawallMetrics {
    pub declarations_total: Counter<u64>,
    pub declaration_errors_total: Counter<u64>,
    pub pages_total: Counter<u64>,
    pub page_fetch_duration: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl SeawallMetrics {
    pub fn init() -> Self {
        let meter = global::meter("seawall");

        let declarations_total = meter
            .u64_counter("seawall_declarations_total")
            .with_description("Repository methods compiled into query plans")
            .build();

        let declaration_errors_total = meter
            .u64_counter("seawall_declaration_errors_total")
            .with_description("Repository methods rejected at declaration time")
            .build();

        let pages_total = meter
            .u64_counter("seawall_pages_total")
            .with_description("Pages fetched")
            .build();

        let page_fetch_duration = meter
            .f64_histogram("seawall_page_fetch_seconds")
            .with_description("Duration of page fetches")
            .build();

        Self {
            declarations_total,
            declaration_errors_total,
            pages_total,
            page_fetch_duration,
        }
    }
}

/// Count a compiled declaration.
pub fn record_declaration() {
    #[cfg(feature = "metrics")]
    METRICS.declarations_total.add(1, &[]);
}

/// Count a rejected declaration, labelled with the error kind.
pub fn record_declaration_error(kind: &'static str) {
    #[cfg(feature = "metrics")]
    METRICS
        .declaration_errors_total
        .add(1, &[KeyValue::new("kind", kind)]);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Count a fetched page and its fetch time.
pub fn record_page(mode: &'static str, elapsed: Duration) {
    #[cfg(feature = "metrics")]
    {
        let labels = [KeyValue::new("mode", mode)];
        METRICS.pages_total.add(1, &labels);
        METRICS
            .page_fetch_duration
            .record(elapsed.as_secs_f64(), &labels);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = (mode, elapsed);
}

/// Span constructors for the engine's units of work.
pub mod tracing_helpers {
    #[cfg(feature = "tracing")]
    pub use tracing::Span;

    /// Stand-in span used when the `tracing` feature is off.
    #[cfg(not(feature = "tracing"))]
    #[derive(Debug, Clone, Default)]
    pub struct Span;

    #[cfg(not(feature = "tracing"))]
    impl Span {
        pub fn entered(self) -> Self {
            self
        }
    }

    pub fn compile_declaration_span(entity: &str, method: &str) -> Span {
        #[cfg(feature = "tracing")]
        {
            tracing::debug_span!("seawall.compile", entity = entity, method = method)
        }
        #[cfg(not(feature = "tracing"))]
        {
            let _ = (entity, method);
            Span
        }
    }

    pub fn fetch_page_span(method: &str, size: usize) -> Span {
        #[cfg(feature = "tracing")]
        {
            tracing::debug_span!("seawall.fetch_page", method = method, size = size)
        }
        #[cfg(not(feature = "tracing"))]
        {
            let _ = (method, size);
            Span
        }
    }

    pub fn execute_span(method: &str) -> Span {
        #[cfg(feature = "tracing")]
        {
            tracing::debug_span!("seawall.execute", method = method)
        }
        #[cfg(not(feature = "tracing"))]
        {
            let _ = method;
            Span
        }
    }
}
