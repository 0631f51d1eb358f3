//! Request-side errors (§7): always rendered as a 500 waiting page.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::waiting_page::WaitingPage;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing Host header")]
    MissingHost,
    #[error("no route bound to this host")]
    RouteNotFound,
    #[error("route points at an instance that is no longer registered")]
    InstanceMissing,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        (StatusCode::INTERNAL_SERVER_ERROR, WaitingPage::error(message)).into_response()
    }
}
