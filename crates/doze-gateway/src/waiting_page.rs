//! Rendering for the held-request page (§6): HTML by default, JSON when the
//! client's `Accept` header asks for it.

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct WaitingPage {
    pub message: String,
    #[serde(rename = "request_start_at", skip_serializing_if = "Option::is_none")]
    pub start_request: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WaitingPage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            start_request: None,
            error: None,
        }
    }

    pub fn with_start_request(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.start_request = at;
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: message.clone(),
            start_request: None,
            error: Some(message),
        }
    }

    pub fn with_error_text(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    fn to_html(&self) -> String {
        let start_request = self
            .start_request
            .map(|ts| format!("<p>Requested at: {}</p>", ts.to_rfc3339()))
            .unwrap_or_default();
        let error = self
            .error
            .as_ref()
            .map(|e| format!("<p class=\"error\">{}</p>", html_escape(e)))
            .unwrap_or_default();

        format!(
            "<!doctype html><html><head><meta charset=\"utf-8\"><title>doze</title></head>\
             <body><h1>{}</h1>{}{}</body></html>",
            html_escape(&self.message),
            start_request,
            error
        )
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Picks JSON when the caller's `Accept` header prefers it, HTML otherwise.
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

impl IntoResponse for WaitingPage {
    fn into_response(self) -> Response {
        (StatusCode::OK, Html(self.to_html())).into_response()
    }
}

/// Renders per the request's `Accept` header rather than unconditionally as HTML.
pub fn render(headers: &HeaderMap, status: StatusCode, page: WaitingPage) -> Response {
    if wants_json(headers) {
        (status, Json(page)).into_response()
    } else {
        (status, Html(page.to_html())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escapes_user_controlled_error_text() {
        let page = WaitingPage::new("starting requested").with_error_text("<script>bad</script>");
        assert!(page.to_html().contains("&lt;script&gt;"));
        assert!(!page.to_html().contains("<script>bad"));
    }
}
