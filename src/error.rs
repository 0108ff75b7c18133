use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Error)]
pub enum ShipperError {
    #[error("network error: {0}")]
    Network(String),

    #[error("application error {code}: {message}")]
    Application { code: String, message: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("timed out waiting for {event}")]
    Timeout { event: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no current order")]
    NoCurrentOrder,

    #[error("no shipper assigned")]
    NoShipperAssigned,

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("order {requested} does not match current order {current}")]
    OrderMismatch { requested: String, current: String },

    /// Carries the backend's message when the backend refused the claim.
    #[error("order already assigned")]
    AlreadyAssigned(Option<String>),

    #[error("offer not found: {0}")]
    OfferNotFound(String),

    #[error("request already in flight: {0}")]
    Busy(String),

    #[error("socket not connected")]
    NotConnected,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShipperError {
    /// Message suitable for showing to the courier as-is.
    pub fn user_message(&self) -> String {
        match self {
            ShipperError::Network(_) => {
                "Connection failed. Please check your network and try again.".to_string()
            }
            ShipperError::Application { message, .. } if !message.trim().is_empty() => {
                message.clone()
            }
            ShipperError::Application { .. } => "The request was rejected by the server.".to_string(),
            ShipperError::Unauthorized => "Your session has expired. Please log in again.".to_string(),
            ShipperError::NotAuthenticated => "Please log in first.".to_string(),
            ShipperError::Timeout { .. } => {
                "The server did not respond in time. Please try again.".to_string()
            }
            ShipperError::Validation(message) => message.clone(),
            ShipperError::NoCurrentOrder => "There is no current order.".to_string(),
            ShipperError::NoShipperAssigned => "This order has no shipper assigned.".to_string(),
            ShipperError::InvalidTransition { from, to } => {
                format!("Cannot move the order from {from} to {to}.")
            }
            ShipperError::AlreadyAssigned(Some(message)) if !message.trim().is_empty() => {
                message.clone()
            }
            ShipperError::AlreadyAssigned(_) => {
                "This order has already been assigned.".to_string()
            }
            ShipperError::OfferNotFound(_) => "This offer is no longer available.".to_string(),
            ShipperError::Busy(_) => "Another request is still in progress.".to_string(),
            ShipperError::NotConnected => {
                "Not connected to the server. Please try again shortly.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ShipperError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ShipperError::Decode(err.to_string())
        } else {
            ShipperError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ShipperError {
    fn from(err: serde_json::Error) -> Self {
        ShipperError::Decode(err.to_string())
    }
}

impl IntoResponse for ShipperError {
    fn into_response(self) -> Response {
        let status = match &self {
            ShipperError::Network(_) => StatusCode::BAD_GATEWAY,
            ShipperError::Application { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ShipperError::Unauthorized | ShipperError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ShipperError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ShipperError::Validation(_)
            | ShipperError::InvalidTransition { .. }
            | ShipperError::OrderMismatch { .. } => StatusCode::BAD_REQUEST,
            ShipperError::NoCurrentOrder | ShipperError::OfferNotFound(_) => StatusCode::NOT_FOUND,
            ShipperError::NoShipperAssigned
            | ShipperError::AlreadyAssigned(_)
            | ShipperError::Busy(_) => StatusCode::CONFLICT,
            ShipperError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            ShipperError::Decode(_) | ShipperError::Storage(_) | ShipperError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.user_message()
        }));

        (status, body).into_response()
    }
}
