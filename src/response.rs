use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

/// Stable error codes surfaced on the webhook boundary. One code per error
/// kind; the chat layer maps codes to localized user-facing text.
pub mod codes {
    pub const INVALID_INPUT: &str = "INVALID_INPUT";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const TRANSIENT_STORE: &str = "TRANSIENT_STORE";
    pub const TRANSIENT_MODEL: &str = "TRANSIENT_MODEL";
    pub const MODEL_SHAPE: &str = "MODEL_SHAPE";
    pub const CIRCUIT_OPEN: &str = "CIRCUIT_OPEN";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const BLOCKED_BY_USER: &str = "BLOCKED_BY_USER";
    pub const INTERNAL: &str = "INTERNAL_ERROR";
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    pub fn invalid_input(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: codes::INVALID_INPUT.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: codes::NOT_FOUND.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn conflict(message: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: codes::CONFLICT.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn transient_store(message: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: codes::TRANSIENT_STORE.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: codes::INTERNAL.to_string(),
            message: message.to_string(),
            is_operational: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            // 非运营类错误不向外暴露细节
            "internal server error".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

// StoreError 映射：NotFound/Conflict/Validation 可安全暴露；
// 瞬态类映射为 TRANSIENT_STORE（用户侧提示稍后重试）；其余按内部错误处理。
impl From<crate::store::StoreError> for AppError {
    fn from(value: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match &value {
            StoreError::Validation(msg) => AppError::invalid_input(msg),
            StoreError::NotFound { entity, key } => {
                AppError::not_found(&format!("{entity} not found: {key}"))
            }
            StoreError::Conflict { entity, key } => {
                AppError::conflict(&format!("{entity} conflict: {key}"))
            }
            StoreError::Sled(sled::Error::Io(_)) | StoreError::CasRetryExhausted { .. } => {
                AppError::transient_store("store is busy, try again")
            }
            _ => AppError::internal(&value.to_string()),
        }
    }
}

// GatewayError 映射：不可用/熔断/瞬态类均为可重试的运营类错误；
// 形状与 API 错误属于集成故障，按内部错误处理并脱敏。
impl From<crate::llm::GatewayError> for AppError {
    fn from(value: crate::llm::GatewayError) -> Self {
        use crate::llm::GatewayError;
        match value {
            GatewayError::Disabled | GatewayError::CircuitOpen => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: codes::CIRCUIT_OPEN.to_string(),
                message: "model temporarily unavailable".to_string(),
                is_operational: true,
            },
            GatewayError::Timeout => Self {
                status: StatusCode::GATEWAY_TIMEOUT,
                code: codes::TIMEOUT.to_string(),
                message: "model call timed out".to_string(),
                is_operational: true,
            },
            GatewayError::Transient(msg) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: codes::TRANSIENT_MODEL.to_string(),
                message: msg,
                is_operational: true,
            },
            GatewayError::Shape(msg) => Self {
                status: StatusCode::BAD_GATEWAY,
                code: codes::MODEL_SHAPE.to_string(),
                message: msg,
                is_operational: false,
            },
            GatewayError::Store(err) => err.into(),
            other @ (GatewayError::Api { .. } | GatewayError::Internal(_)) => {
                AppError::internal(&other.to_string())
            }
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}
