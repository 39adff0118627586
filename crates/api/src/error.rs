use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use gateway_core::Error;
use serde_json::json;
use std::env;
use tracing::{error, warn};

/// Wraps a [`gateway_core::Error`] with the request-scoped context (request ID,
/// `Accept`-negotiated rendering) needed to turn it into an HTTP response, and applies
/// the environment-aware sanitization split `Error::to_api_response_with_environment`
/// already does.
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    request_id: Option<String>,
    environment: String,
    accept_html: bool,
}

impl ApiError {
    pub fn new(error: Error) -> Self {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self { error, request_id: None, environment, accept_html: false }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_html(mut self, accept_html: bool) -> Self {
        self.accept_html = accept_html;
        self
    }

    /// Errors worth a `security_audit` log target even at 4xx, per spec.md §4.9's
    /// tenant-routing/auth error family alongside the teacher's original security codes.
    fn is_security_relevant(&self) -> bool {
        use gateway_core::ErrorCode;
        matches!(
            self.error.code,
            ErrorCode::AuthenticationFailed
                | ErrorCode::AuthorizationFailed
                | ErrorCode::PermissionDenied
                | ErrorCode::SecurityPolicyViolation
                | ErrorCode::RateLimitExceeded
                | ErrorCode::TooManyRequests
                | ErrorCode::InvalidCredentials
                | ErrorCode::SchemaAccessDenied
                | ErrorCode::AdminAuthRequired
        )
    }

    fn log_error(&self) {
        let status_code = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match status_code.as_u16() {
            500..=599 => {
                error!(
                    error_code = %self.error.code,
                    error_id = %self.error.context.error_id,
                    request_id = ?self.request_id,
                    severity = ?self.error.severity,
                    "internal server error: {}",
                    self.error
                );
            }
            400..=499 => {
                if self.is_security_relevant() {
                    warn!(target: "security_audit",
                        error_code = %self.error.code,
                        error_id = %self.error.context.error_id,
                        request_id = ?self.request_id,
                        "security-relevant client error: {}",
                        self.error
                    );
                } else {
                    tracing::debug!(
                        error_code = %self.error.code,
                        request_id = ?self.request_id,
                        "client error: {}",
                        self.error
                    );
                }
            }
            _ => {
                tracing::info!(
                    error_code = %self.error.code,
                    request_id = ?self.request_id,
                    "informational response: {}",
                    self.error
                );
            }
        }
    }

    fn html_body(&self, status: StatusCode) -> String {
        format!(
            "<!doctype html><html><head><title>{status}</title></head><body>\
             <h1>{status}</h1><p>{message}</p>\
             {request_id}</body></html>",
            status = status,
            message = askama_free_escape(&self.error.message),
            request_id = self
                .request_id
                .as_ref()
                .map(|id| format!("<p><small>request id: {}</small></p>", askama_free_escape(id)))
                .unwrap_or_default(),
        )
    }
}

/// No templating engine is in the teacher's dependency set and one is not warranted for
/// a single error page; this is the entire extent of HTML escaping this path needs.
fn askama_free_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        self.log_error();

        if self.accept_html {
            return (status_code, Html(self.html_body(status_code))).into_response();
        }

        let mut response_json = self.error.to_api_response_with_environment(&self.environment);
        if let Some(request_id) = &self.request_id {
            if let Some(error_obj) = response_json.get_mut("error") {
                error_obj["request_id"] = json!(request_id);
            }
        }

        (status_code, Json(response_json)).into_response()
    }
}
