use crate::models::TicketId;

/// The lock coordination service could not be reached or answered with an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Lock coordinator unavailable: {0}")]
    Unavailable(String),
}

/// The ticket/booking store failed to read or write.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Ticket store backend error: {0}")]
    Backend(String),

    #[error("Corrupt ticket record {ticket_id}: {reason}")]
    Corrupt { ticket_id: String, reason: String },
}

/// Every way a lock-guarded reservation can end other than with a booking.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Too many concurrent requests for ticket {0}, please retry")]
    Congested(TicketId),

    #[error("Ticket {0} is already reserved")]
    AlreadyReserved(TicketId),

    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    #[error(transparent)]
    CoordinatorFault(#[from] CoordinatorError),

    #[error(transparent)]
    StoreFault(#[from] StoreError),

    #[error("Reservation cancelled")]
    Cancelled,

    #[error("Reservation failed unexpectedly: {0}")]
    Internal(String),
}

impl ReservationError {
    /// Stable label used for metrics and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ReservationError::Congested(_) => "congested",
            ReservationError::AlreadyReserved(_) => "already_reserved",
            ReservationError::TicketNotFound(_) => "ticket_not_found",
            ReservationError::CoordinatorFault(_) => "coordinator_fault",
            ReservationError::StoreFault(_) => "store_fault",
            ReservationError::Cancelled => "cancelled",
            ReservationError::Internal(_) => "internal",
        }
    }

    /// Whether the same request may succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReservationError::Congested(_)
                | ReservationError::CoordinatorFault(_)
                | ReservationError::StoreFault(_)
                | ReservationError::Cancelled
        )
    }

    /// Faults point at infrastructure, not at the request.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            ReservationError::CoordinatorFault(_)
                | ReservationError::StoreFault(_)
                | ReservationError::Internal(_)
        )
    }
}
