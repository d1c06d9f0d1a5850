use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sentrion_types::GovernanceError;
use serde_json::json;

/// Wraps the shared core error enum so every handler can return it
/// directly and have it map onto the right HTTP status.
pub struct ApiError(pub GovernanceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            GovernanceError::PaymentRequired { wallet_id, balance } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({ "error": "payment_required", "wallet_id": wallet_id, "balance": balance }),
            ),
            GovernanceError::NotFound(what) => {
                (StatusCode::NOT_FOUND, json!({ "error": "not_found", "detail": what }))
            }
            GovernanceError::Validation(what) => {
                (StatusCode::BAD_REQUEST, json!({ "error": "validation", "detail": what }))
            }
            GovernanceError::Conflict(what) => {
                (StatusCode::CONFLICT, json!({ "error": "conflict", "detail": what }))
            }
            GovernanceError::Unavailable(what) => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "unavailable", "detail": what }))
            }
        };
        (status, Json(body)).into_response()
    }
}

impl<E: Into<GovernanceError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}
