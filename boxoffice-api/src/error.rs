use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use boxoffice_core::ReservationError;
use serde_json::json;

/// Seconds a congested caller is asked to wait before retrying.
const CONGESTED_RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Reservation(#[from] ReservationError),

    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Reservation(e) => match e {
                ReservationError::Congested(_) => StatusCode::TOO_MANY_REQUESTS,
                ReservationError::AlreadyReserved(_) => StatusCode::CONFLICT,
                ReservationError::TicketNotFound(_) => StatusCode::NOT_FOUND,
                ReservationError::CoordinatorFault(_) | ReservationError::Cancelled => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ReservationError::StoreFault(_) | ReservationError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, retryable, message) = match &self {
            AppError::BadRequest(msg) => ("bad_request", false, msg.clone()),
            AppError::Reservation(e) if e.is_fault() => {
                tracing::error!(kind = e.kind(), "Reservation request failed: {}", e);
                (e.kind(), e.is_retryable(), "Internal Server Error".to_string())
            }
            AppError::Reservation(e) => (e.kind(), e.is_retryable(), e.to_string()),
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
            "retryable": retryable,
        }));

        let mut response = (status, body).into_response();
        if matches!(self, AppError::Reservation(ReservationError::Congested(_))) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(CONGESTED_RETRY_AFTER_SECS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::{CoordinatorError, StoreError, TicketId};

    #[test]
    fn test_status_mapping() {
        let id = TicketId::from("T-1");
        let cases = [
            (ReservationError::Congested(id.clone()), StatusCode::TOO_MANY_REQUESTS),
            (ReservationError::AlreadyReserved(id.clone()), StatusCode::CONFLICT),
            (ReservationError::TicketNotFound(id), StatusCode::NOT_FOUND),
            (
                ReservationError::CoordinatorFault(CoordinatorError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ReservationError::StoreFault(StoreError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ReservationError::Cancelled, StatusCode::SERVICE_UNAVAILABLE),
            (ReservationError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_congested_sets_retry_after() {
        let response = AppError::from(ReservationError::Congested(TicketId::from("T-1"))).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn test_conflict_has_no_retry_after() {
        let response = AppError::from(ReservationError::AlreadyReserved(TicketId::from("T-1"))).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
