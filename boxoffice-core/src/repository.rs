use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::{Booking, Ticket, TicketId, TicketStatus};

/// Durable home of ticket status and booking history.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Atomically flip the booking's ticket from AVAILABLE to RESERVED and insert the
    /// booking. Returns `false`, writing nothing, if the ticket is no longer AVAILABLE.
    async fn commit_reservation(&self, booking: &Booking) -> Result<bool, StoreError>;

    /// Bookings made by `requester_id`, newest first.
    async fn bookings_for(&self, requester_id: &str) -> Result<Vec<Booking>, StoreError>;

    /// Insert a ticket unless one with the same id exists. Returns whether it was inserted.
    async fn provision(&self, ticket: &Ticket) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
struct Inventory {
    tickets: HashMap<TicketId, Ticket>,
    bookings: Vec<Booking>,
}

/// Store kept in process memory. Status flip and booking insert happen under one
/// write lock, so partial writes are never observable.
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    inner: RwLock<Inventory>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_tickets(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write().await;
            for ticket in tickets {
                inner.tickets.insert(ticket.id.clone(), ticket);
            }
        }
        store
    }

    /// Every booking ever made for `ticket_id`.
    pub async fn bookings_for_ticket(&self, ticket_id: &TicketId) -> Vec<Booking> {
        let inner = self.inner.read().await;
        inner
            .bookings
            .iter()
            .filter(|b| &b.ticket_id == ticket_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn find_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.inner.read().await.tickets.get(id).cloned())
    }

    async fn commit_reservation(&self, booking: &Booking) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;

        let Some(ticket) = inner.tickets.get_mut(&booking.ticket_id) else {
            return Ok(false);
        };
        if ticket.status != TicketStatus::Available {
            return Ok(false);
        }

        ticket.status = TicketStatus::Reserved;
        inner.bookings.push(booking.clone());
        Ok(true)
    }

    async fn bookings_for(&self, requester_id: &str) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.read().await;
        let mut bookings: Vec<Booking> = inner
            .bookings
            .iter()
            .filter(|b| b.requester_id == requester_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn provision(&self, ticket: &Ticket) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.tickets.contains_key(&ticket.id) {
            return Ok(false);
        }
        inner.tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(true)
    }
}
