/// Prometheus metrics for the severity prediction pipeline.
///
/// Covers the inference hot path (prediction counts, latency, review flags,
/// unseen categories) and training runs (outcome, duration, held-out accuracy).
///
/// # Example
/// ```no_run
/// use accident_severity::metrics::PREDICTIONS_TOTAL;
///
/// PREDICTIONS_TOTAL.with_label_values(&["Slight"]).inc();
/// ```
use lazy_static::lazy_static;
use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry};

const NAMESPACE: &str = "accident_severity";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Inference Metrics
    // ============================================================================

    /// Total number of predictions served
    ///
    /// Labels: severity
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of severity predictions")
            .namespace(NAMESPACE),
        &["severity"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// End-to-end prediction latency in seconds (normalize, impute, align, classify)
    pub static ref PREDICTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "prediction_duration_seconds",
            "Prediction latency in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
    ).expect("Failed to create PREDICTION_DURATION_SECONDS metric");

    /// Predictions flagged for manual review
    pub static ref MANUAL_REVIEW_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("manual_review_total", "Predictions below the confidence threshold")
            .namespace(NAMESPACE),
    ).expect("Failed to create MANUAL_REVIEW_TOTAL metric");

    /// Categorical values not present in the feature schema
    ///
    /// Labels: attribute
    pub static ref UNSEEN_CATEGORIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("unseen_categories_total", "Categorical values unknown to the model")
            .namespace(NAMESPACE),
        &["attribute"]
    ).expect("Failed to create UNSEEN_CATEGORIES_TOTAL metric");

    // ============================================================================
    // Training Metrics
    // ============================================================================

    /// Training runs by outcome
    ///
    /// Labels: outcome (success, failure)
    pub static ref TRAINING_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("training_runs_total", "Total number of training runs")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create TRAINING_RUNS_TOTAL metric");

    /// Training duration in seconds
    pub static ref TRAINING_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "training_duration_seconds",
            "Training run duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
    ).expect("Failed to create TRAINING_DURATION_SECONDS metric");

    /// Held-out accuracy of the active model
    pub static ref MODEL_ACCURACY: Gauge = Gauge::with_opts(
        Opts::new("model_accuracy", "Held-out accuracy of the active model")
            .namespace(NAMESPACE),
    ).expect("Failed to create MODEL_ACCURACY metric");

    /// Feature schema width of the active model
    pub static ref MODEL_FEATURES: Gauge = Gauge::with_opts(
        Opts::new("model_features", "Number of columns in the active feature schema")
            .namespace(NAMESPACE),
    ).expect("Failed to create MODEL_FEATURES metric");
}

/// Register all metrics with the global registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(PREDICTIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PREDICTION_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(MANUAL_REVIEW_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(UNSEEN_CATEGORIES_TOTAL.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(TRAINING_RUNS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(TRAINING_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(MODEL_ACCURACY.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(MODEL_FEATURES.clone()))?;

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
