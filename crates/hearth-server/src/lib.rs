pub mod config;
pub mod connection;
pub mod gateway;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use gateway::{Gateway, GatewayError};

/// The HTTP surface: a single WebSocket endpoint at `/gateway`.
pub fn app(gateway: Gateway) -> Router {
    Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway)
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(gateway): State<Gateway>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway))
}
