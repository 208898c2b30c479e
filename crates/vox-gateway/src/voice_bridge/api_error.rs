use super::*;

#[derive(Debug)]
pub(super) struct ApiError {
    pub(super) status: StatusCode,
    pub(super) code: &'static str,
    pub(super) message: String,
}

impl ApiError {
    pub(super) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub(super) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        let message = error.to_string();
        match error {
            BridgeError::InvalidRequest(_) => Self::bad_request("invalid_request", message),
            BridgeError::SubmissionFailed(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "submission_failed", message)
            }
            BridgeError::ReplyTimedOut { .. } => {
                Self::new(StatusCode::REQUEST_TIMEOUT, "request_timeout", message)
            }
            BridgeError::Correlation(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "bridge_unavailable", message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_type = if self.status.is_client_error() {
            "invalid_request_error"
        } else {
            "server_error"
        };
        (
            self.status,
            Json(json!({
                "error": {
                    "type": error_type,
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}
