use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ReservationError;
use crate::models::{Booking, ReservationRequest};
use crate::repository::TicketStore;

/// A single reservation state transition. Implementations assume they are the only
/// writer for the ticket while they run; callers must hold the ticket's lock.
#[async_trait]
pub trait ReservationTransition: Send + Sync {
    async fn reserve(&self, request: &ReservationRequest) -> Result<Booking, ReservationError>;
}

/// Ticket reservation business rules, free of any locking concerns.
pub struct ReservationEngine {
    store: Arc<dyn TicketStore>,
}

impl ReservationEngine {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Read-only lookup, no locking involved.
    pub async fn list_bookings(&self, requester_id: &str) -> Result<Vec<Booking>, ReservationError> {
        Ok(self.store.bookings_for(requester_id).await?)
    }
}

#[async_trait]
impl ReservationTransition for ReservationEngine {
    async fn reserve(&self, request: &ReservationRequest) -> Result<Booking, ReservationError> {
        // 1. Load current status
        let mut ticket = self
            .store
            .find_ticket(&request.ticket_id)
            .await?
            .ok_or_else(|| ReservationError::TicketNotFound(request.ticket_id.clone()))?;

        // 2. Available → Reserved
        ticket.reserve()?;

        // 3. Status write + booking insert as one unit. A `false` here means another
        //    holder got in after our lease lapsed.
        let booking = Booking::for_request(request);
        if !self.store.commit_reservation(&booking).await? {
            debug!(ticket_id = %request.ticket_id, "Ticket changed between read and commit");
            return Err(ReservationError::AlreadyReserved(request.ticket_id.clone()));
        }

        info!(
            ticket_id = %booking.ticket_id,
            booking_id = %booking.id,
            requester_id = %booking.requester_id,
            "Ticket reserved"
        );
        Ok(booking)
    }
}
