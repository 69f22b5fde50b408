//! 可观测性模块
//!
//! 提供 Prometheus 指标、结构化日志和健康检查。

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;
use crate::error::{AppError, Result};
use crate::models::search::RetrievalStrategy;
use crate::services::embedding::{CacheStats, EmbeddingProvider};
use crate::services::health::HealthProbe;

// ===== Metrics =====

/// 检索服务指标，内部持有独立的 Prometheus registry
#[derive(Clone)]
pub struct SearchMetrics {
    registry: Registry,
    search_requests: IntCounterVec,
    search_degraded: IntCounter,
    search_latency: Histogram,
    cache_hits: IntGauge,
    cache_misses: IntGauge,
    cache_entries: IntGauge,
    http_requests: IntCounterVec,
    http_latency: Histogram,
}

impl SearchMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let search_requests = IntCounterVec::new(
            Opts::new("search_requests_total", "Total search requests by strategy"),
            &["strategy"],
        )?;
        let search_degraded = IntCounter::new(
            "search_degraded_total",
            "Search requests answered by the fallback path",
        )?;
        let search_latency = Histogram::with_opts(HistogramOpts::new(
            "search_latency_seconds",
            "Search request latency in seconds",
        ))?;
        let cache_hits = IntGauge::new("embedding_cache_hits", "Embedding cache hits")?;
        let cache_misses = IntGauge::new("embedding_cache_misses", "Embedding cache misses")?;
        let cache_entries = IntGauge::new("embedding_cache_entries", "Cached embeddings")?;
        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &["method", "status"],
        )?;
        let http_latency = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ))?;

        registry.register(Box::new(search_requests.clone()))?;
        registry.register(Box::new(search_degraded.clone()))?;
        registry.register(Box::new(search_latency.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_latency.clone()))?;

        Ok(Self {
            registry,
            search_requests,
            search_degraded,
            search_latency,
            cache_hits,
            cache_misses,
            cache_entries,
            http_requests,
            http_latency,
        })
    }

    /// 记录一次检索请求
    pub fn record_search(&self, strategy: RetrievalStrategy, degraded: bool, elapsed: Duration) {
        self.search_requests
            .with_label_values(&[strategy.as_str()])
            .inc();
        if degraded {
            self.search_degraded.inc();
        }
        self.search_latency.observe(elapsed.as_secs_f64());
    }

    /// 记录 HTTP 请求
    pub fn record_http(&self, method: &str, status: u16, elapsed: Duration) {
        self.http_requests
            .with_label_values(&[method, &status.to_string()])
            .inc();
        self.http_latency.observe(elapsed.as_secs_f64());
    }

    /// 同步嵌入缓存统计
    pub fn observe_cache(&self, stats: CacheStats) {
        self.cache_hits.set(stats.hits as i64);
        self.cache_misses.set(stats.misses as i64);
        self.cache_entries.set(stats.entries as i64);
    }

    /// 生成 Prometheus 文本格式
    pub fn gather(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))
    }
}

// ===== Health Check =====

/// 应用状态（用于健康检查与指标）
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: SearchMetrics,
    pub probe: Arc<HealthProbe>,
    pub embeddings: Arc<EmbeddingProvider>,
    pub start_time: DateTime<Utc>,
    pub version: String,
}

impl ObservabilityState {
    pub fn new(
        metrics: SearchMetrics,
        probe: Arc<HealthProbe>,
        embeddings: Arc<EmbeddingProvider>,
        version: String,
    ) -> Self {
        Self {
            metrics,
            probe,
            embeddings,
            start_time: Utc::now(),
            version,
        }
    }

    /// 获取应用正常运行时间
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }
}

/// 完整健康状态，后端不可用时返回 503
pub async fn health_check(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let report = state.probe.report().await;
    let status_code = if report.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(report))
}

/// 简单存活检查
pub async fn liveness() -> impl IntoResponse {
    "OK"
}

/// 就绪检查
pub async fn readiness(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    if state.probe.is_healthy().await {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}

/// Prometheus 指标端点
pub async fn metrics(State(state): State<Arc<ObservabilityState>>) -> Result<String> {
    state.metrics.observe_cache(state.embeddings.cache_stats());
    state.metrics.gather()
}

/// 版本信息端点
pub async fn version(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": state.version,
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics))
        .route("/version", get(version))
        .with_state(state)
}

// ===== Request Metrics Middleware =====

/// 记录请求指标的中间件
pub async fn metrics_middleware(
    State(metrics): State<SearchMetrics>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();

    let response = next.run(req).await;

    metrics.record_http(&method, response.status().as_u16(), start.elapsed());
    response
}

// ===== Structured Logging =====

/// 初始化日志。`RUST_LOG` 优先于配置中的级别；
/// 配置了日志目录时额外按天滚动写文件，返回的 guard 需要保持到进程退出。
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.level)));

    let stdout_layer = if config.structured {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .boxed()
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "intellisearch.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(non_blocking)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Internal(format!("Failed to set tracing subscriber: {}", e)))?;

    Ok(guard)
}
