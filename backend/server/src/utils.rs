use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, USER_AGENT},
        request::Parts,
    },
};
use ledger::ClientMeta;
use serde::Serialize;

use crate::{error::AppError, state::State};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// JSON body whose rejections render like every other [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl<T: Serialize> axum::response::IntoResponse for AppJson<T> {
    fn into_response(self) -> axum::response::Response {
        axum::Json(self.0).into_response()
    }
}

/// Client address and user agent of the current request.
pub struct RequestMeta(pub ClientMeta);

impl FromRequestParts<Arc<State>> for RequestMeta {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _: &Arc<State>) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(address)| address.ip().to_string());

        Ok(RequestMeta(client_meta(&parts.headers, peer)))
    }
}

pub fn client_meta(headers: &HeaderMap, peer: Option<String>) -> ClientMeta {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string);

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    ClientMeta {
        ip: forwarded.or(peer),
        user_agent,
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let length = value.trim().chars().count();
    if length < min || length > max {
        return Err(AppError::Validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }

    Ok(())
}

pub fn check_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if !valid || email.len() > 255 {
        return Err(AppError::Validation("Invalid email address".into()));
    }

    Ok(())
}

/// Required, non blank reason for an audited change.
pub fn require_reason(reason: Option<&str>) -> Result<&str, AppError> {
    reason
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .ok_or_else(|| AppError::Validation("change_reason is required".into()))
}
