//! ABOUTME: Web API layer with phone authentication and routing
//! ABOUTME: Provides REST endpoints and OpenAPI documentation

use actix_web::{
    dev::{Server, Service},
    web, App, HttpServer,
};
use au_ai::AuraGenerator;
use au_config::{Config, OtpConfig, SecurityConfig, StorageProviderKind, UploadConfig};
use au_core::{Error, Result};
use au_db::Db;
use au_notify::SmsSender;
use au_obs::Metrics;
use au_storage::ImageStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error;
pub mod middleware;
pub mod models;
pub mod otp_service;
pub mod routes;
pub mod upload_pipeline;


use error::ApiError;
use routes::{auth as auth_routes, explore, images, social, users};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub security: SecurityConfig,
    pub otp: OtpConfig,
    pub upload: UploadConfig,
    pub rate_limit: middleware::ratelimit::RateLimitConfig,
    pub public_base_url: String,
    /// Served under `/media` when images are stored on local disk
    pub media_dir: Option<PathBuf>,
    pub sms: Arc<dyn SmsSender>,
    pub generator: Arc<dyn AuraGenerator>,
    pub store: Arc<dyn ImageStore>,
    /// Used to re-download stored images for aura regeneration
    pub http: reqwest::Client,
    pub fetch_retry_delay: Duration,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire providers from configuration
    pub fn from_config(config: &Config, db: Db, metrics: Arc<Metrics>) -> Result<Self> {
        let store = au_storage::create_store(&config.storage, &config.server.public_base_url)?;
        let generator = au_ai::create_generator(&config.ai)?;
        let sms = au_notify::create_sender(&config.external);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.ai.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let media_dir = match config.storage.provider {
            StorageProviderKind::Local => Some(PathBuf::from(&config.storage.local_dir)),
            _ => None,
        };

        Ok(Self {
            db,
            security: config.security.clone(),
            otp: config.otp.clone(),
            upload: config.upload.clone(),
            rate_limit: (&config.server.rate_limit).into(),
            public_base_url: config.server.public_base_url.clone(),
            media_dir,
            sms,
            generator,
            store,
            http,
            fetch_retry_delay: Duration::from_millis(config.ai.retry_delay_ms),
            metrics,
        })
    }
}

/// Adds the bearer JWT scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Access token from POST /api/auth/otp/verify"))
                    .build(),
            ),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Aura API",
        description = "Phone-verified photo sharing where every upload gets an AI-generated aura."
    ),
    paths(
        auth_routes::send_otp,
        auth_routes::verify_otp,
        users::me,
        users::update_me,
        users::delete_me,
        users::get_user,
        users::user_images,
        images::upload_image,
        images::get_image,
        images::delete_image,
        images::regenerate_aura,
        social::toggle_follow,
        social::list_followers,
        social::list_following,
        social::toggle_like,
        social::share_image,
        explore::feed,
        explore::leaderboard,
        explore::search_users,
    ),
    components(
        schemas(
            models::ErrorResponse,
            models::SendOtpRequest,
            models::SendOtpResponse,
            models::VerifyOtpRequest,
            models::AuthResponse,
            models::UserProfile,
            models::PublicProfile,
            models::UpdateProfileRequest,
            models::UserSummary,
            models::ImageResponse,
            models::AuraResponse,
            models::ImageWithAuraResponse,
            models::ImageDetailResponse,
            models::UploadForm,
            models::FollowResponse,
            models::FollowUserResponse,
            models::LikeResponse,
            models::ShareRequest,
            models::ShareResponse,
            models::FeedItemResponse,
            models::LeaderboardEntryResponse,
        ),
    ),
    tags(
        (name = "auth", description = "Phone verification and tokens"),
        (name = "users", description = "Profiles"),
        (name = "images", description = "Uploads and auras"),
        (name = "social", description = "Follows, likes and shares"),
        (name = "explore", description = "Feed, leaderboard and search"),
    )
)]
pub struct ApiDoc;

/// Create the main web application service factory
pub fn create_app(
    state: AppState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let rate_limit_config = state.rate_limit.clone();
    let media_dir = state.media_dir.clone();
    let metrics = state.metrics.clone();

    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into());
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into());
    let path_config = web::PathConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into());

    let app = App::new()
        .app_data(web::Data::new(state))
        .app_data(json_config)
        .app_data(query_config)
        .app_data(path_config)
        .wrap(actix_web::middleware::Logger::default())
        .wrap_fn(move |req, srv| {
            let metrics = metrics.clone();
            let started = Instant::now();
            let fut = srv.call(req);
            async move {
                let res = fut.await;
                metrics.record_request(started.elapsed().as_secs_f64());
                res
            }
        })
        .service(SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        // Unauthenticated, so limited per client IP
                        .wrap(middleware::ratelimit::RateLimit::new(rate_limit_config))
                        .service(auth_routes::send_otp)
                        .service(auth_routes::verify_otp),
                )
                .service(
                    web::scope("/users")
                        .wrap(middleware::auth::RequireAuth::new())
                        .service(users::me)
                        .service(users::update_me)
                        .service(users::delete_me)
                        .service(users::user_images)
                        .service(users::get_user),
                )
                .service(
                    web::scope("/images")
                        .wrap(middleware::auth::RequireAuth::new())
                        .service(images::upload_image)
                        .service(images::regenerate_aura)
                        .service(images::get_image)
                        .service(images::delete_image),
                )
                .service(
                    web::scope("/social")
                        .wrap(middleware::auth::RequireAuth::new())
                        .service(social::toggle_follow)
                        .service(social::toggle_like)
                        .service(social::share_image)
                        .service(social::list_followers)
                        .service(social::list_following),
                )
                .service(
                    web::scope("/explore")
                        .service(explore::feed)
                        .service(explore::leaderboard)
                        .service(explore::search_users),
                ),
        );

    match media_dir {
        Some(dir) => app.service(actix_files::Files::new("/media", dir)),
        None => app,
    }
}

/// Bind the API server without running it; the address is the one actually bound
pub fn bind_server(bind_addr: &str, state: AppState) -> Result<(Server, SocketAddr)> {
    let server = HttpServer::new(move || create_app(state.clone()))
        .bind(bind_addr)
        .map_err(|e| Error::Config(format!("Failed to bind web server: {}", e)))?;

    let local_addr = server
        .addrs()
        .first()
        .copied()
        .ok_or_else(|| Error::Config(format!("No address bound for {}", bind_addr)))?;

    Ok((server.run(), local_addr))
}

/// Start the web server
pub async fn start_server(bind_addr: &str, state: AppState) -> Result<()> {
    let (server, local_addr) = bind_server(bind_addr, state)?;
    tracing::info!("Web server listening on {}", local_addr);

    server
        .await
        .map_err(|e| Error::Config(format!("Web server error: {}", e)))?;

    Ok(())
}
