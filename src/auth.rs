use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use http::HeaderMap;

use crate::error::HttpError;
use crate::models::{Role, Viewer};
use crate::settings::Settings;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_NAME_HEADER: &str = "x-user-name";

pub fn verify_token(
    settings: &Settings,
    auth: Option<Authorization<Bearer>>,
    query_token: Option<&str>,
) -> Result<(), HttpError> {
    let provided_token = auth
        .map(|a| a.token().to_string())
        .or_else(|| query_token.map(|s| s.to_string()));
    match provided_token {
        Some(token) if token == settings.auth_token => Ok(()),
        _ => Err(HttpError::Unauthorized(
            "Invalid authentication token".into(),
        )),
    }
}

/// Reads the viewer the identity gateway forwarded with the request.
pub fn viewer_from_headers(headers: &HeaderMap) -> Result<Viewer, HttpError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let id = header(USER_ID_HEADER)
        .ok_or_else(|| HttpError::Unauthorized("Missing viewer identity".into()))?;
    let role = header(USER_ROLE_HEADER)
        .ok_or_else(|| HttpError::Unauthorized("Missing viewer role".into()))?
        .parse::<Role>()
        .map_err(HttpError::Unauthorized)?;

    Ok(Viewer {
        id: id.to_string(),
        role,
        full_name: header(USER_NAME_HEADER).map(str::to_string),
    })
}
