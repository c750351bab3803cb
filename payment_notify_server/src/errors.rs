use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use payment_notify_engine::{GatewayClientError, NotificationError, OrderApiError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("A valid admin token is required")]
    Unauthorized,
    #[error("Requests from this address are not allowed")]
    ForbiddenPeer,
    #[error("The request conflicts with the current state of the order. {0}")]
    Conflict(String),
    #[error("The payment gateway could not complete the request. {0}")]
    GatewayError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ForbiddenPeer => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::GatewayError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<GatewayClientError> for ServerError {
    fn from(e: GatewayClientError) -> Self {
        match e {
            GatewayClientError::NotConfigured(_) => Self::InvalidRequestPath(e.to_string()),
            GatewayClientError::NoTransaction(_) => Self::NoRecordFound(e.to_string()),
            GatewayClientError::Unsupported(..) => Self::InvalidRequestBody(e.to_string()),
            GatewayClientError::RequestFailed(_) | GatewayClientError::InvalidResponse(_) => {
                Self::GatewayError(e.to_string())
            },
        }
    }
}

impl From<OrderApiError> for ServerError {
    fn from(e: OrderApiError) -> Self {
        match e {
            OrderApiError::StoreError(e) => e.into(),
            OrderApiError::Gateway(e) => e.into(),
            OrderApiError::OrderMismatch(_) | OrderApiError::InvalidStatus { .. } => Self::Conflict(e.to_string()),
            OrderApiError::InvalidRequest(_) => Self::InvalidRequestBody(e.to_string()),
        }
    }
}

impl From<NotificationError> for ServerError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::Gateway(e) => e.into(),
            NotificationError::StoreError(e) => e.into(),
            NotificationError::StoreTimeout(_) => Self::BackendError(e.to_string()),
            _ => Self::Unspecified(e.to_string()),
        }
    }
}
