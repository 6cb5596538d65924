//! Integration tests for the operator API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use burrow_api::{models::*, ApiServer, ApiServerConfig};
use burrow_control::{
    ClientConnection, ClientSession, ClientSessionRepository, DirectConnection, SessionService,
};
use burrow_ports::{ListenerProbe, PortAllocator, PortPool};
use burrow_proto::ConnectionRequest;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt; // For `oneshot` method

fn create_test_service(
    pool: std::ops::RangeInclusive<u16>,
    keep: Option<Duration>,
) -> Arc<SessionService> {
    let allocator = Arc::new(PortAllocator::new(
        PortPool::from_range(pool).unwrap(),
        Arc::new(ListenerProbe::new()),
    ));
    Arc::new(
        SessionService::new(allocator, Arc::new(ClientSessionRepository::new()))
            .with_keep_lost_clients(keep),
    )
}

fn create_test_router(service: Arc<SessionService>) -> Router {
    let config = ApiServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };
    ApiServer::new(config, service).build_router()
}

async fn connect_client(service: &SessionService, id: &str) -> Arc<ClientSession> {
    let connection: Arc<dyn ClientConnection> =
        Arc::new(DirectConnection::new("192.0.2.20:53000".parse().unwrap()));
    let request = ConnectionRequest {
        name: "edge".to_string(),
        tags: vec!["eu".to_string()],
        ..Default::default()
    };
    service
        .start_client_session(
            CancellationToken::new(),
            id,
            connection,
            &request,
            None,
            tracing::Span::none(),
        )
        .await
        .unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_router(create_test_service(46000..=46009, None));

    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.sessions, 0);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = create_test_router(create_test_service(46010..=46019, None));
    let (status, body) = send(&app, "GET", "/api/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);

    let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(doc["paths"]["/api/sessions"].is_object());
}

#[tokio::test]
async fn test_list_and_get_sessions() {
    let service = create_test_service(46020..=46029, None);
    let session = connect_client(&service, "s1").await;
    let app = create_test_router(service);

    let (status, body) = send(&app, "GET", "/api/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    let list: SessionList = serde_json::from_slice(&body).unwrap();
    assert_eq!(list.total, 1);
    assert_eq!(list.sessions[0].id, "s1");
    assert_eq!(list.sessions[0].status, SessionStatus::Connected);

    let (status, body) = send(&app, "GET", "/api/sessions/s1", None).await;
    assert_eq!(status, StatusCode::OK);
    let info: SessionInfo = serde_json::from_slice(&body).unwrap();
    assert_eq!(info.tags, vec!["eu".to_string()]);
    assert_eq!(info.address, "192.0.2.20:53000");

    let (status, body) = send(&app, "GET", "/api/sessions/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("SESSION_NOT_FOUND"));

    session.close();
}

#[tokio::test]
async fn test_open_and_close_tunnels() {
    let service = create_test_service(46030..=46039, None);
    let session = connect_client(&service, "s1").await;
    let app = create_test_router(service.clone());

    let (status, body) = send(
        &app,
        "PUT",
        "/api/sessions/s1/tunnels",
        Some(json!({ "remotes": ["127.0.0.1:22", "db.internal:5432"], "acl": ["10.0.0.0/8"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let opened: OpenTunnelsResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(opened.tunnels.len(), 2);
    assert_eq!(opened.tunnels[0].id, "1");
    assert_eq!(opened.tunnels[1].remote_host, "db.internal");
    assert!(opened.tunnels.iter().all(|t| t.auto_assigned));
    assert!(opened.tunnels.iter().all(|t| (46030..=46039).contains(&t.local_port)));
    assert_eq!(opened.tunnels[0].acl, vec!["10.0.0.0/8".to_string()]);

    let (status, _) = send(&app, "DELETE", "/api/sessions/s1/tunnels/1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "DELETE", "/api/sessions/s1/tunnels/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("TUNNEL_NOT_FOUND"));

    assert_eq!(session.tunnels().await.len(), 1);
    assert_eq!(service.allocator().leased_count(), 1);

    session.close();
}

#[tokio::test]
async fn test_open_tunnels_rejects_bad_input() {
    let service = create_test_service(46040..=46049, None);
    let session = connect_client(&service, "s1").await;
    let app = create_test_router(service);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/sessions/s1/tunnels",
        Some(json!({ "remotes": ["not-a-spec"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("INVALID_TUNNEL_SPEC"));

    let (status, body) = send(
        &app,
        "PUT",
        "/api/sessions/s1/tunnels",
        Some(json!({ "remotes": ["22"], "acl": ["10.0.0.0/99"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("INVALID_ACL"));

    let port = free_port();
    let spec = format!("127.0.0.1:{}:127.0.0.1:22", port);
    let (status, body) = send(
        &app,
        "PUT",
        "/api/sessions/s1/tunnels",
        Some(json!({ "remotes": [spec.clone(), spec] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("DUPLICATE_BINDING"));
    assert!(session.tunnels().await.is_empty());

    let (status, _) = send(
        &app,
        "PUT",
        "/api/sessions/missing/tunnels",
        Some(json!({ "remotes": ["22"] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    session.close();
}

#[tokio::test]
async fn test_pool_exhaustion_is_service_unavailable() {
    let service = create_test_service(46050..=46050, None);
    let session = connect_client(&service, "s1").await;
    let app = create_test_router(service);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/sessions/s1/tunnels",
        Some(json!({ "remotes": ["22", "23"] })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("PORT_POOL_EXHAUSTED"));

    session.close();
}

#[tokio::test]
async fn test_delete_active_session_cancels_it() {
    let service = create_test_service(46060..=46069, None);
    let session = connect_client(&service, "s1").await;
    let app = create_test_router(service);

    let (status, _) = send(&app, "DELETE", "/api/sessions/s1", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(session.context().is_cancelled());
}

#[tokio::test]
async fn test_delete_lost_session_forgets_it() {
    let service = create_test_service(46070..=46079, Some(Duration::from_secs(3600)));
    let session = connect_client(&service, "s1").await;
    service.terminate(&session).await.unwrap();
    let app = create_test_router(service);

    let (status, body) = send(&app, "GET", "/api/sessions/s1", None).await;
    assert_eq!(status, StatusCode::OK);
    let info: SessionInfo = serde_json::from_slice(&body).unwrap();
    assert_eq!(info.status, SessionStatus::Lost);
    assert!(info.disconnected_at.is_some());

    let (status, _) = send(&app, "PUT", "/api/sessions/s1/tunnels", Some(json!({ "remotes": ["22"] }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", "/api/sessions/s1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", "/api/sessions/s1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
