use axum::{Json, extract::State, http::StatusCode};

use crate::{AppState, db::probe::{Readiness, SchemaProbe}};

/// Store readiness. 503 when the database is unreachable or a required table is missing.
#[tracing::instrument(skip_all)]
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let readiness = SchemaProbe::new(&state.db, &state.config.database.required_tables)
        .check_ready()
        .await;
    let status = if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}
