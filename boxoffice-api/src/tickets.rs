use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use boxoffice_core::{Booking, ReservationRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveParams {
    user_id: Option<String>,
    user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyBookingsParams {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    booking_id: Uuid,
    ticket_id: String,
    user_id: String,
    user_name: String,
    created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            booking_id: booking.id,
            ticket_id: booking.ticket_id.to_string(),
            user_id: booking.requester_id,
            user_name: booking.requester_name.into_inner(),
            created_at: booking.created_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/tickets/{ticket_id}/reserve", post(reserve_ticket))
        .route("/api/v1/tickets/my", get(my_bookings))
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::BadRequest(format!("Missing query parameter: {}", name))),
    }
}

async fn reserve_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Query(params): Query<ReserveParams>,
) -> Result<Json<BookingResponse>, AppError> {
    let user_id = required(params.user_id, "userId")?;
    let user_name = required(params.user_name, "userName")?;
    let request = ReservationRequest::new(ticket_id, &user_id, &user_name);

    // Client disconnect drops this future; the lock guard still releases.
    let started = Instant::now();
    let outcome = state.facade.reserve_with_lock(&request).await;
    state.metrics.observe(&outcome, started.elapsed());

    let booking = outcome?;
    info!(ticket_id = %booking.ticket_id, booking_id = %booking.id, "Reservation confirmed");
    Ok(Json(booking.into()))
}

async fn my_bookings(
    State(state): State<AppState>,
    Query(params): Query<MyBookingsParams>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let user_id = required(params.user_id, "userId")?;
    let bookings = state.engine.list_bookings(&user_id).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}
