//! `GET /health` for orchestrators. Only the store is checked; the Slack
//! socket reconnects by itself and does not affect readiness.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bogbot_db::DbPool;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, Serialize)]
pub struct Component {
    pub status: Readiness,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub service: Component,
    pub database: Component,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    async fn gather(pool: &DbPool) -> Self {
        let database = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
            Ok(_) => Component { status: Readiness::Ready, detail: "sqlite answered".to_owned() },
            Err(error) => {
                warn!(
                    event_name = "system.health.database_degraded",
                    correlation_id = "health",
                    error = %error,
                    "health check could not reach the database"
                );
                Component {
                    status: Readiness::Degraded,
                    detail: format!("database query failed: {error}"),
                }
            }
        };

        Self {
            status: database.status,
            service: Component {
                status: Readiness::Ready,
                detail: "bogbot-server is running".to_owned(),
            },
            database,
            checked_at: Utc::now(),
        }
    }
}

impl IntoResponse for HealthReport {
    fn into_response(self) -> Response {
        let code = match self.status {
            Readiness::Ready => StatusCode::OK,
            Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
        };
        (code, Json(self)).into_response()
    }
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(report)).with_state(db_pool)
}

async fn report(State(pool): State<DbPool>) -> HealthReport {
    HealthReport::gather(&pool).await
}

/// Binds the listener up front so a taken port fails startup, then serves in
/// the background.
pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((bind_address, port)).await?;
    let local = listener.local_addr()?;
    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %local,
        "health endpoint listening"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint stopped"
            );
        }
    });
    Ok(())
}
