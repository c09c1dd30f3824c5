//! Prometheus metrics for the controller.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Controller metrics, registered on a private registry
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconcile_total: IntCounterVec,
    reconcile_duration: Histogram,
    async_operations_total: IntCounterVec,
}

impl Metrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new(
                "azure_cluster_reconcile_total",
                "AzureCluster reconcile passes by outcome",
            ),
            &["outcome"],
        )?;
        let reconcile_duration = Histogram::with_opts(
            HistogramOpts::new(
                "azure_cluster_reconcile_duration_seconds",
                "Duration of AzureCluster reconcile passes",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0]),
        )?;
        let async_operations_total = IntCounterVec::new(
            Opts::new(
                "azure_async_operations_total",
                "Long-running Azure operations by verb and result",
            ),
            &["operation", "result"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(async_operations_total.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            reconcile_duration,
            async_operations_total,
        })
    }

    /// Count one reconcile pass
    pub fn record_reconcile(&self, outcome: &str, seconds: f64) {
        self.reconcile_total.with_label_values(&[outcome]).inc();
        self.reconcile_duration.observe(seconds);
    }

    /// Count one long-running operation step (`submitted`, `done`, `pending`, `failed`)
    pub fn record_async_operation(&self, operation: &str, result: &str) {
        self.async_operations_total
            .with_label_values(&[operation, result])
            .inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Current value of an async operation counter
    #[cfg(test)]
    pub fn async_operation_count(&self, operation: &str, result: &str) -> u64 {
        self.async_operations_total
            .with_label_values(&[operation, result])
            .get()
    }
}
