use std::sync::Arc;

use axum::Router;
use axum::debug_handler;
use axum::extract::State;
use axum::routing::get;
use chrono::Utc;
use framework::web::error::HttpResult;
use tracing::info;

use crate::AppState;
use crate::service;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(relay).post(relay))
}

#[debug_handler]
async fn relay(State(state): State<Arc<AppState>>) -> HttpResult<String> {
    let today = Utc::now().date_naive();
    let relayed = service::fetch_and_upload(&state, today).await?;
    let message = format!(
        "process completed, file for date {} uploaded to {}",
        relayed.target_date, relayed.location
    );
    info!("{message}");
    Ok(message)
}
