//! Operator REST API over the session service

pub mod handlers;
pub mod models;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, put},
    Router,
};
use burrow_control::SessionService;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<SessionService>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Burrow API",
        version = "0.1.0",
        description = "REST API for inspecting client sessions and managing their tunnels"
    ),
    paths(
        handlers::health_check,
        handlers::list_sessions,
        handlers::get_session,
        handlers::delete_session,
        handlers::open_tunnels,
        handlers::close_tunnel,
    ),
    components(
        schemas(
            models::SessionStatus,
            models::TunnelInfo,
            models::SessionInfo,
            models::SessionList,
            models::OpenTunnelsRequest,
            models::OpenTunnelsResponse,
            models::HealthResponse,
            models::ErrorResponse,
        )
    ),
    tags(
        (name = "sessions", description = "Client session endpoints"),
        (name = "tunnels", description = "Tunnel management endpoints"),
        (name = "system", description = "System health and info endpoints")
    )
)]
struct ApiDoc;

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Allow browser calls from local development origins
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3080)),
            enable_cors: false,
        }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, service: Arc<SessionService>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { service }),
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route("/api/sessions", get(handlers::list_sessions))
            .route(
                "/api/sessions/{id}",
                get(handlers::get_session).delete(handlers::delete_session),
            )
            .route("/api/sessions/{id}/tunnels", put(handlers::open_tunnels))
            .route(
                "/api/sessions/{id}/tunnels/{tunnel_id}",
                delete(handlers::close_tunnel),
            )
            .with_state(self.state.clone());

        // SwaggerUi serves the spec at /api/openapi.json
        let router = Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
            .merge(api_router)
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
                    let origin = origin.to_str().unwrap_or("");
                    origin.starts_with("http://localhost:")
                        || origin.starts_with("http://127.0.0.1:")
                }));
            router.layer(cors)
        } else {
            router
        }
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );
        info!("Swagger UI: http://{}/swagger-ui", self.config.bind_addr);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}

/// Convenience function to create and start an API server
pub async fn run_api_server(
    bind_addr: SocketAddr,
    service: Arc<SessionService>,
) -> Result<(), anyhow::Error> {
    let config = ApiServerConfig {
        bind_addr,
        ..Default::default()
    };
    ApiServer::new(config, service).start().await
}
