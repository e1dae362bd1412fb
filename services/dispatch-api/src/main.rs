use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tracing::{debug, info, warn};

mod config;
mod handlers;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load()?;
    lifelink_core::logging::init_from_config(&config.logging);

    let state = Arc::new(AppState::new(config)?);
    spawn_notification_relay(&state);

    let app = router(state.clone());

    let bind_addr = state.config.bind_addr();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("LifeLink dispatch service listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/organs", get(handlers::list_organs))
        .route(
            "/api/hospitals",
            get(handlers::list_hospitals).post(handlers::register_hospital),
        )
        .route(
            "/api/listings",
            get(handlers::search_listings).post(handlers::publish_listing),
        )
        .route(
            "/api/drivers",
            get(handlers::list_drivers).post(handlers::register_driver),
        )
        .route("/api/drivers/:id/contact", patch(handlers::update_driver_contact))
        .route("/api/drivers/:id/board", get(handlers::driver_board))
        .route("/api/requests", post(handlers::submit_request))
        .route("/api/requests/emergency", post(handlers::submit_emergency))
        .route("/api/requests/:id", get(handlers::get_request))
        .route("/api/requests/:id/assign", post(handlers::assign_driver))
        .route("/api/requests/:id/reassign", post(handlers::reassign_driver))
        .route("/api/requests/:id/status", post(handlers::advance_status))
        .route("/api/dispatch/queue", get(handlers::dispatch_queue))
        .route("/api/hospitals/:name/outbound", get(handlers::hospital_outbound))
        .route("/api/hospitals/:name/inbound", get(handlers::hospital_inbound))
        .route("/api/hospitals/:name/listings", get(handlers::hospital_listings))
        .with_state(state)
        .layer(ServiceBuilder::new().into_inner())
}

/// Hand transition events to the notification side channel.
///
/// Delivery itself lives outside this service; the relay only records that
/// a notification is due.
fn spawn_notification_relay(state: &Arc<AppState>) {
    let mut rx = state.events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    debug!(request_id = %event.request_id(), event = ?event, "Notification due");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification relay lagged behind dispatch events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
