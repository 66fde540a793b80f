use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::USER_AGENT},
};

use crate::{
    AppState,
    api::models::auth::{RegisterRequest, RegisterResponse, RegistrationInfo},
    errors::Error,
    registration::audit::RequestOrigin,
};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Get registration information
#[tracing::instrument(skip_all)]
pub async fn get_registration_info(State(state): State<AppState>) -> Result<Json<RegistrationInfo>, Error> {
    let enabled = state.registrar.registration_enabled();
    Ok(Json(RegistrationInfo {
        enabled,
        message: if enabled {
            "Registration is enabled".to_string()
        } else {
            "Registration is disabled".to_string()
        },
    }))
}

/// Register a new account
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<RegisterResponse, Error> {
    let origin = request_origin(&headers, &state.config.registration.client_ip_header);
    let user = state.registrar.register(request.into(), &origin).await?;

    Ok(RegisterResponse {
        user,
        message: "Registration successful".to_string(),
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Client address from the configured header, falling back to the first `x-forwarded-for` hop.
fn request_origin(headers: &HeaderMap, client_ip_header: &str) -> RequestOrigin {
    let ip = header_value(headers, client_ip_header).or_else(|| {
        header_value(headers, FORWARDED_FOR).and_then(|list| list.split(',').next().map(|hop| hop.trim().to_string()))
    });
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).map(str::to_string);
    RequestOrigin::new(ip, user_agent)
}
