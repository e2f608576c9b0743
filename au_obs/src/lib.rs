//! ABOUTME: Side server for probes and Prometheus metrics
//! ABOUTME: Shares one metrics registry with the API server and scheduler

use actix_web::{
    dev::{Server, ServiceRequest, ServiceResponse},
    middleware::Logger,
    web, App, HttpResponse, HttpServer,
};
use au_core::Result;
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, histogram::Histogram},
    registry::Registry,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Readiness gate flipped once startup (migrations, clients) is complete
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    ready: Arc<AtomicBool>,
}

impl ReadinessGate {
    /// Gates start closed; the binary opens them after startup
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Application counters exported in Prometheus text format
///
/// Counter names are registered without the `_total` suffix; the encoder
/// appends it.
#[derive(Debug)]
pub struct Metrics {
    registry: Mutex<Registry>,
    http_requests: Counter,
    http_request_duration_seconds: Histogram,
    otp_sent: Counter,
    otp_verified: Counter,
    otp_failed: Counter,
    images_uploaded: Counter,
    aura_generation_failures: Counter,
    leaderboard_refresh: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("aura");

        let http_requests = Counter::default();
        registry.register(
            "http_requests",
            "Total number of HTTP requests",
            http_requests.clone(),
        );

        let http_request_duration_seconds =
            Histogram::new([0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0].into_iter());
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let otp_sent = Counter::default();
        registry.register("otp_sent", "OTP codes delivered by SMS", otp_sent.clone());

        let otp_verified = Counter::default();
        registry.register(
            "otp_verified",
            "Successful OTP verifications",
            otp_verified.clone(),
        );

        let otp_failed = Counter::default();
        registry.register(
            "otp_failed",
            "Rejected OTP verifications (wrong, expired or exhausted)",
            otp_failed.clone(),
        );

        let images_uploaded = Counter::default();
        registry.register(
            "images_uploaded",
            "Images stored with a generated aura",
            images_uploaded.clone(),
        );

        let aura_generation_failures = Counter::default();
        registry.register(
            "aura_generation_failures",
            "Failed calls to the aura generator",
            aura_generation_failures.clone(),
        );

        let leaderboard_refresh = Counter::default();
        registry.register(
            "leaderboard_refresh",
            "Leaderboard recomputations",
            leaderboard_refresh.clone(),
        );

        Self {
            registry: Mutex::new(registry),
            http_requests,
            http_request_duration_seconds,
            otp_sent,
            otp_verified,
            otp_failed,
            images_uploaded,
            aura_generation_failures,
            leaderboard_refresh,
        }
    }

    pub fn record_request(&self, duration_secs: f64) {
        self.http_requests.inc();
        self.http_request_duration_seconds.observe(duration_secs);
    }

    pub fn inc_otp_sent(&self) {
        self.otp_sent.inc();
    }

    pub fn inc_otp_verified(&self) {
        self.otp_verified.inc();
    }

    pub fn inc_otp_failed(&self) {
        self.otp_failed.inc();
    }

    pub fn inc_images_uploaded(&self) {
        self.images_uploaded.inc();
    }

    pub fn inc_aura_failures(&self) {
        self.aura_generation_failures.inc();
    }

    pub fn inc_leaderboard_refresh(&self) {
        self.leaderboard_refresh.inc();
    }

    pub fn encode(&self) -> Result<String> {
        let registry = self.registry.lock().map_err(|e| {
            au_core::Error::Config(format!("Failed to lock metrics registry: {}", e))
        })?;

        let mut buffer = String::new();
        encode(&mut buffer, &registry)
            .map_err(|e| au_core::Error::Config(format!("Failed to encode metrics: {}", e)))?;

        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state for observability endpoints
#[derive(Debug, Clone)]
pub struct ObsState {
    pub readiness: ReadinessGate,
    pub metrics: Arc<Metrics>,
}

impl ObsState {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(Metrics::new()))
    }

    /// Share one metrics registry with the API server
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            readiness: ReadinessGate::new(),
            metrics,
        }
    }
}

impl Default for ObsState {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of the probe endpoints
#[derive(Debug, Serialize)]
struct ProbeBody {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

impl ProbeBody {
    fn new(status: &'static str) -> Self {
        Self {
            status,
            service: "aura",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Liveness: the process answers
async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(ProbeBody::new("ok"))
}

/// Readiness: startup finished and shutdown not begun
async fn readiness(state: web::Data<ObsState>) -> HttpResponse {
    if state.readiness.is_ready() {
        HttpResponse::Ok().json(ProbeBody::new("ready"))
    } else {
        tracing::debug!("Readiness probe while not ready");
        HttpResponse::ServiceUnavailable().json(ProbeBody::new("starting"))
    }
}

async fn prometheus(state: web::Data<ObsState>) -> HttpResponse {
    match state.metrics.encode() {
        Ok(text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(text),
        Err(e) => {
            tracing::error!(error = %e, "Metrics export failed");
            HttpResponse::InternalServerError().json(ProbeBody::new("error"))
        }
    }
}

/// Create observability service factory
pub fn create_service(
    state: ObsState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .wrap(Logger::default())
        .service(
            web::scope("")
                .route("/healthz", web::get().to(liveness))
                .route("/readyz", web::get().to(readiness))
                .route("/metrics", web::get().to(prometheus)),
        )
}

/// Bind the observability server without running it
pub fn bind_server(bind_addr: &str, state: ObsState) -> Result<(Server, SocketAddr)> {
    let server = HttpServer::new(move || create_service(state.clone()))
        .workers(1)
        .bind(bind_addr)
        .map_err(|e| au_core::Error::Config(format!("Failed to bind server: {}", e)))?;

    let local_addr = server.addrs().first().copied().ok_or_else(|| {
        au_core::Error::Config(format!("No address bound for {}", bind_addr))
    })?;

    Ok((server.run(), local_addr))
}

/// Start observability server
pub async fn start_server(bind_addr: &str, state: ObsState) -> Result<()> {
    let (server, local_addr) = bind_server(bind_addr, state)?;
    tracing::info!("Observability server listening on {}", local_addr);

    server
        .await
        .map_err(|e| au_core::Error::Config(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app = test::init_service(create_service(ObsState::new())).await;

        let req = test::TestRequest::get().uri("/healthz").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "aura");
    }

    #[actix_web::test]
    async fn test_readiness_follows_gate() {
        let state = ObsState::new();
        let gate = state.readiness.clone();
        let app = test::init_service(create_service(state)).await;

        let req = test::TestRequest::get().uri("/readyz").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "starting");

        gate.set_ready(true);
        let req = test::TestRequest::get().uri("/readyz").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ready");
    }

    #[actix_web::test]
    async fn test_metrics_endpoint() {
        let state = ObsState::new();
        state.metrics.record_request(0.2);
        state.metrics.inc_otp_sent();
        state.metrics.inc_images_uploaded();

        let app = test::init_service(create_service(state)).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4; charset=utf-8"
        );

        let body = test::read_body(resp).await;
        let body_str = std::str::from_utf8(&body).unwrap();
        assert!(body_str.contains("aura_http_requests_total 1"));
        assert!(body_str.contains("aura_otp_sent_total 1"));
        assert!(body_str.contains("aura_images_uploaded_total 1"));
        assert!(body_str.contains("aura_http_request_duration_seconds"));
    }

    #[actix_web::test]
    async fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.inc_otp_failed();
        metrics.inc_otp_failed();
        metrics.inc_otp_verified();
        metrics.inc_aura_failures();
        metrics.inc_leaderboard_refresh();

        let encoded = metrics.encode().expect("Should encode successfully");
        assert!(encoded.contains("aura_otp_failed_total 2"));
        assert!(encoded.contains("aura_otp_verified_total 1"));
        assert!(encoded.contains("aura_aura_generation_failures_total 1"));
        assert!(encoded.contains("aura_leaderboard_refresh_total 1"));
    }
}
