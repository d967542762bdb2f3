use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use socketioxide::SocketIo;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod chat;
mod config;
mod events;
mod models;
mod routes;
mod schema;
mod socket;

use bazar_shared::clients::db::{create_pool, DbPool};
use bazar_shared::clients::rabbitmq::RabbitMQClient;
use bazar_shared::clients::redis::RedisClient;
use bazar_shared::middleware::JwtSecret;
use config::AppConfig;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub rabbitmq: RabbitMQClient,
    pub redis: RedisClient,
    pub io: SocketIo,
    pub http_client: reqwest::Client,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bazar_shared::middleware::init_tracing("bazar-chat");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = create_pool(&config.database_url)?;
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let redis = RedisClient::connect(&config.redis_url).await?;

    // Build Socket.IO layer - io rides in AppState so REST routes can emit
    let (sio_layer, io) = SocketIo::builder().build_layer();

    let http_client = reqwest::Client::new();
    let state = Arc::new(AppState {
        db,
        config,
        rabbitmq,
        redis,
        io: io.clone(),
        http_client,
    });

    // Configure the Socket.IO namespace with state via closure
    io.ns("/", {
        let state = state.clone();
        move |socket: socketioxide::extract::SocketRef,
              auth: socketioxide::extract::TryData<serde_json::Value>| {
            let state = state.clone();
            async move {
                socket::handlers::on_connect(socket, auth, state).await;
            }
        }
    });

    // Group membership changes arrive over RabbitMQ
    let sub_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_group_updates(sub_state).await {
            tracing::error!(error = %e, "group update subscriber failed");
        }
    });

    let app = Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Rooms
        .route("/chat/room", post(routes::rooms::open_pair_room))
        .route("/chat/room/group", post(routes::rooms::create_group_room))
        .route("/chat/list", get(routes::rooms::list_rooms))
        // Messages
        .route("/chat/send", post(routes::messages::send_message))
        .route("/chat/edit", post(routes::messages::edit_message))
        .route("/chat/recall", post(routes::messages::recall_message))
        .route("/chat/mark-read/:room_id", post(routes::messages::mark_read))
        .route("/chat/unread-count", get(routes::messages::get_unread_count))
        // History & search
        .route("/chat/history/:room_id", get(routes::history::get_history))
        .route(
            "/chat/history/:room_id/around/:message_id",
            get(routes::history::get_history_around),
        )
        .route("/chat/search", get(routes::search::search_messages))
        .layer(sio_layer)
        // REST token checks use the same configured secret as the socket
        // handshake
        .layer(Extension(JwtSecret(state.config.jwt_secret.clone())))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "bazar-chat starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
