use actix_web::http::StatusCode;
use actix_web::{error::BlockingError, web, HttpResponse, ResponseError};
use err_derive::Error;
use log::*;
use serde::Serialize;

use crate::auth::AuthError;
use crate::menu::MenuError;
use infra::persistence::DuplicateTitle;

/// Everything a handler can fail with. Each variant renders as
/// `{"success": false, "error": <status>, "message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(display = "{}", _0)]
    BadRequest(String),
    #[error(display = "resource not found")]
    NotFound,
    #[error(display = "method not allowed")]
    MethodNotAllowed,
    #[error(display = "{}", _0)]
    Unprocessable(String),
    #[error(display = "{}", _0)]
    Auth(AuthError),
    #[error(display = "Server Error")]
    Internal(anyhow::Error),
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    success: bool,
    error: u16,
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Auth(e) => e.status(),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            ApiError::Internal(e) => error!("Request failed: {:?}", e),
            other => debug!("Request rejected ({}): {}", status, other),
        }
        HttpResponse::build(status).json(ErrorBody {
            success: false,
            error: status.as_u16(),
            message: self.to_string(),
        })
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<BlockingError> for ApiError {
    fn from(err: BlockingError) -> Self {
        ApiError::Internal(anyhow::anyhow!("{}", err))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<MenuError>() {
                return ApiError::Unprocessable(e.to_string());
            }
            if let Some(e) = cause.downcast_ref::<DuplicateTitle>() {
                return ApiError::Unprocessable(e.to_string());
            }
        }
        ApiError::Internal(err)
    }
}

/// Ids are integers; anything else in their place names no resource.
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, req| {
        debug!("Unroutable path {}: {}", req.path(), err);
        ApiError::NotFound.into()
    })
}

pub async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}

/// Fallback for a known resource asked with a method it has no route for.
pub async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed)
}
