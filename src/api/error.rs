use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::error::{Error, QueryError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => StatusCode::NOT_FOUND.into_response(),
            Error::Validation(validation) => {
                (StatusCode::BAD_REQUEST, Json(validation)).into_response()
            }
            Error::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&message))).into_response()
            }
            Error::Query(QueryError::GeoIndexNotFound) => {
                log::error!("Proximity search on a model without a geospatial index");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(
                        ErrorResponse::new("Geospatial Index Not Found")
                            .with_message("A 2d or 2dsphere index is required for __near queries"),
                    ),
                )
                    .into_response()
            }
            Error::Query(err) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Bad Query").with_message(err.to_string())),
            )
                .into_response(),
            Error::Store(err) => {
                log::error!("Storage failure: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(&err.to_string())),
                )
                    .into_response()
            }
        }
    }
}
