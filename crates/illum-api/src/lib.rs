pub mod handlers;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// All routes, mounted under `/api/v1`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/session", delete(handlers::handle_session_delete))
        .route("/session/create", post(handlers::handle_session_create))
        .route("/session/init", post(handlers::handle_session_init))
        .route("/session/status", get(handlers::handle_session_status))
        .route("/session/room", patch(handlers::handle_room_update))
        .route("/session/lamps", post(handlers::handle_lamp_add))
        .route(
            "/session/lamps/{lamp_id}",
            patch(handlers::handle_lamp_update).delete(handlers::handle_lamp_delete),
        )
        .route(
            "/session/zones",
            get(handlers::handle_zone_list).post(handlers::handle_zone_add),
        )
        .route(
            "/session/zones/{zone_id}",
            patch(handlers::handle_zone_update).delete(handlers::handle_zone_delete),
        )
        .route("/session/calculate/estimate", get(handlers::handle_estimate))
        .route("/session/calculate", post(handlers::handle_calculate))
        .route("/status", get(handlers::handle_status))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, bind: &str, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind((bind, port)).await?;
    tracing::info!(bind, port, "API listening");
    serve_on(listener, state).await
}

/// Serve on an already bound listener until a shutdown is broadcast.
pub async fn serve_on(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;
    Ok(())
}
