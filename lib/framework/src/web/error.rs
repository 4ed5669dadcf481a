use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;

use crate::exception::Exception;
use crate::log;

pub type HttpResult<T> = Result<T, HttpError>;

/// Exception with the status code returned to the client, the body is the exception message as plain text.
pub struct HttpError {
    pub status: StatusCode,
    pub exception: Exception,
}

impl HttpError {
    pub fn new(status: StatusCode, exception: Exception) -> Self {
        HttpError { status, exception }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        log::log_exception(&self.exception);
        (
            self.status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
            self.exception.message,
        )
            .into_response()
    }
}
