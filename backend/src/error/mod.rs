use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Missing or malformed deployment settings. Always fatal for the component
/// that needed them.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required setting `{0}` is missing or empty")]
    Missing(&'static str),
    #[error("setting `{key}` is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Failures surfaced by the resilient executor.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A transient failure that survived every retry; the last driver error is kept as-is.
    #[error("store unavailable after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
    /// A non-transient driver error, propagated unchanged.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("store call exceeded its deadline")]
    DeadlineExceeded,
}

impl StoreError {
    pub fn is_deadline(&self) -> bool {
        matches!(self, StoreError::DeadlineExceeded)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("too many failed login attempts from {source_address}")]
    RateLimited {
        source_address: String,
        retry_after_secs: u64,
    },
    #[error("account is suspended")]
    AccountSuspended,
    #[error("password reset required")]
    ResetRequired,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("invalid listing request: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    TooManyRequests { message: String, retry_after: u64 },
    PreconditionRequired(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
    InternalServerError(anyhow::Error),
    Validation(Vec<String>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, error_message, code, details) = match self {
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                msg,
                "UNAUTHORIZED".to_string(),
                None,
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN".to_string(), None),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                msg,
                "BAD_REQUEST".to_string(),
                None,
            ),
            AppError::TooManyRequests {
                message,
                retry_after: seconds,
            } => {
                retry_after = Some(seconds);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    message,
                    "RATE_LIMITED".to_string(),
                    Some(serde_json::json!({ "retry_after": seconds })),
                )
            }
            AppError::PreconditionRequired(msg) => (
                StatusCode::PRECONDITION_REQUIRED,
                msg,
                "RESET_REQUIRED".to_string(),
                None,
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "SERVICE_UNAVAILABLE".to_string(),
                None,
            ),
            AppError::GatewayTimeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                msg,
                "TIMEOUT".to_string(),
                None,
            ),
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR".to_string(),
                    None,
                )
            }
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                "VALIDATION_ERROR".to_string(),
                Some(serde_json::json!({ "errors": errors })),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code,
            details,
        });

        let mut response = (status, body).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let code = e.code.as_ref();
                    format!("{}: {}", field, code)
                })
            })
            .collect();
        AppError::Validation(messages)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "store call failed");
        if err.is_deadline() {
            AppError::GatewayTimeout("The request took too long, please try again".to_string())
        } else {
            AppError::ServiceUnavailable("Temporarily unavailable, please try again".to_string())
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::RateLimited {
                source_address,
                retry_after_secs,
            } => AppError::TooManyRequests {
                message: format!(
                    "Too many failed login attempts from {}. Please try again later.",
                    source_address
                ),
                retry_after: retry_after_secs,
            },
            AuthError::AccountSuspended => {
                AppError::Forbidden("This account has been suspended".to_string())
            }
            AuthError::ResetRequired => AppError::PreconditionRequired(
                "A password reset is required before signing in".to_string(),
            ),
            AuthError::InvalidCredentials => {
                AppError::Unauthorized("Invalid username or password".to_string())
            }
            AuthError::Configuration(err) => AppError::InternalServerError(err.into()),
            AuthError::Store(err) => err.into(),
        }
    }
}

impl From<ListingError> for AppError {
    fn from(err: ListingError) -> Self {
        match err {
            ListingError::Validation(errors) => errors.into(),
            ListingError::Store(err) => err.into(),
        }
    }
}
