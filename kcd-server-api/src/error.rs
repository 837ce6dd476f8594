use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kcd_server_domain::ServiceError;
use log::error;

#[derive(Debug)]
pub struct MyServiceError(pub ServiceError);

impl IntoResponse for MyServiceError {
    fn into_response(self) -> Response {
        let (status, msg) = match self.0 {
            ServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ServiceError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ServiceError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ServiceError::NotPossible(msg) => (StatusCode::BAD_REQUEST, msg),
            ServiceError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        let body = serde_json::json!({ "message": msg });
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for MyServiceError {
    fn from(value: ServiceError) -> Self {
        MyServiceError(value)
    }
}

impl From<JsonRejection> for MyServiceError {
    fn from(rejection: JsonRejection) -> Self {
        MyServiceError(ServiceError::BadRequest(rejection.body_text()))
    }
}

/// `Json` whose rejections are reported as 400 with the usual error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(MyServiceError))]
pub struct ApiJson<T>(pub T);
