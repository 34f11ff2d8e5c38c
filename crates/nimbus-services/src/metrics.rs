//! Metrics sink used by the cache proxies, and its Prometheus implementation.
//!
//! Proxies only see the `MetricsSink` trait. `PrometheusMetrics` registers its
//! collectors into a caller-supplied `Registry` so tests and embedders never
//! touch a process-global one.

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Origin and lookup latency buckets (seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Which cache a hit or miss belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    City,
    CitiesAll,
    Weather,
}

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::City => "city",
            Self::CitiesAll => "cities_all",
            Self::Weather => "weather",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    pub fn from_ok(ok: bool) -> Self {
        if ok {
            Self::Success
        } else {
            Self::Error
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Receives cache and origin observations.
pub trait MetricsSink: Send + Sync {
    fn cache_hit(&self, cache: CacheType);

    fn cache_miss(&self, cache: CacheType);

    /// One catalog query, labelled with the store operation name.
    fn origin_request(&self, operation: &str, outcome: Outcome, elapsed: Duration);

    /// One call to the weather origin.
    fn weather_request(&self, outcome: Outcome, elapsed: Duration);

    /// Wall time of a whole proxy lookup, hit or miss.
    fn lookup_duration(&self, method: &str, elapsed: Duration);
}

/// Prometheus-backed `MetricsSink`.
#[derive(Clone)]
pub struct PrometheusMetrics {
    cache_hits_total: IntCounterVec,
    cache_misses_total: IntCounterVec,
    origin_requests_total: IntCounterVec,
    origin_request_duration_seconds: HistogramVec,
    weather_requests_total: IntCounterVec,
    weather_request_duration_seconds: Histogram,
    lookup_duration_seconds: HistogramVec,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    registry: Registry,
}

impl PrometheusMetrics {
    /// Create all collectors and register them into `registry`.
    ///
    /// Fails if any of the names is already registered there.
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let cache_hits_total = IntCounterVec::new(
            Opts::new("nimbus_cache_hits_total", "Total number of cache hits"),
            &["cache_type"],
        )?;
        let cache_misses_total = IntCounterVec::new(
            Opts::new("nimbus_cache_misses_total", "Total number of cache misses"),
            &["cache_type"],
        )?;
        let origin_requests_total = IntCounterVec::new(
            Opts::new(
                "nimbus_origin_requests_total",
                "Total number of city catalog queries",
            ),
            &["operation", "status"],
        )?;
        let origin_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "nimbus_origin_request_duration_seconds",
                "City catalog query duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["operation"],
        )?;
        let weather_requests_total = IntCounterVec::new(
            Opts::new(
                "nimbus_weather_requests_total",
                "Total number of weather origin requests",
            ),
            &["status"],
        )?;
        let weather_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "nimbus_weather_request_duration_seconds",
                "Weather origin request duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let lookup_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "nimbus_lookup_duration_seconds",
                "Cache proxy lookup duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["method"],
        )?;
        let http_requests_total = IntCounterVec::new(
            Opts::new("nimbus_http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "nimbus_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["method", "path"],
        )?;

        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cache_misses_total.clone()))?;
        registry.register(Box::new(origin_requests_total.clone()))?;
        registry.register(Box::new(origin_request_duration_seconds.clone()))?;
        registry.register(Box::new(weather_requests_total.clone()))?;
        registry.register(Box::new(weather_request_duration_seconds.clone()))?;
        registry.register(Box::new(lookup_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            cache_hits_total,
            cache_misses_total,
            origin_requests_total,
            origin_request_duration_seconds,
            weather_requests_total,
            weather_request_duration_seconds,
            lookup_duration_seconds,
            http_requests_total,
            http_request_duration_seconds,
            registry: registry.clone(),
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(elapsed.as_secs_f64());
    }

    /// Render every collector in the registry in Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsSink for PrometheusMetrics {
    fn cache_hit(&self, cache: CacheType) {
        self.cache_hits_total
            .with_label_values(&[cache.as_str()])
            .inc();
    }

    fn cache_miss(&self, cache: CacheType) {
        self.cache_misses_total
            .with_label_values(&[cache.as_str()])
            .inc();
    }

    fn origin_request(&self, operation: &str, outcome: Outcome, elapsed: Duration) {
        self.origin_requests_total
            .with_label_values(&[operation, outcome.as_str()])
            .inc();
        self.origin_request_duration_seconds
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    fn weather_request(&self, outcome: Outcome, elapsed: Duration) {
        self.weather_requests_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.weather_request_duration_seconds
            .observe(elapsed.as_secs_f64());
    }

    fn lookup_duration(&self, method: &str, elapsed: Duration) {
        self.lookup_duration_seconds
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }
}
