//! Convenience constructors for [`crate::error::ApiError`] that pull request-scoped
//! correlation (request ID, `Accept` negotiation) off the `axum::Request` extensions.

use crate::error::ApiError;
use crate::util::wants_html;
use axum::extract::Request;
use gateway_core::{error::RequestContext, Error};

pub fn create_api_error(error: Error) -> ApiError {
    ApiError::new(error)
}

pub fn create_api_error_with_request_id(error: Error, request: &Request) -> ApiError {
    let mut api_error = ApiError::new(error).with_html(wants_html(request.headers()));

    if let Some(request_context) = request.extensions().get::<RequestContext>() {
        api_error = api_error.with_request_id(request_context.request_id.clone());
    }

    api_error
}

pub fn handle_middleware_error(error: Error, request: &Request) -> axum::response::Response {
    use axum::response::IntoResponse;
    create_api_error_with_request_id(error, request).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use gateway_core::ErrorCode;

    #[test]
    fn create_api_error_carries_the_message() {
        let error = Error::new(ErrorCode::ValidationFailed, "missing field");
        let api_error = create_api_error(error);
        assert!(format!("{:?}", api_error).contains("missing field"));
    }

    #[tokio::test]
    async fn create_api_error_with_request_id_pulls_id_from_extensions() {
        let mut request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let request_context = RequestContext::new().with_request_id("test-request-789".to_string());
        request.extensions_mut().insert(request_context);

        let error = Error::new(ErrorCode::AuthenticationFailed, "auth failed");
        let api_error = create_api_error_with_request_id(error, &request);

        assert!(format!("{:?}", api_error).contains("test-request-789"));
    }
}
