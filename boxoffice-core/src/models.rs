use boxoffice_shared::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ReservationError;

/// Opaque, unique identity of a reservable ticket (e.g. `T-100`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TicketId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Available,
    Reserved,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Available => "AVAILABLE",
            TicketStatus::Reserved => "RESERVED",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(TicketStatus::Available),
            "RESERVED" => Ok(TicketStatus::Reserved),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

/// A single seat of a performance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub performance_id: String,
    pub seat_number: String,
    pub status: TicketStatus,
}

impl Ticket {
    pub fn available(id: impl Into<TicketId>, performance_id: &str, seat_number: &str) -> Self {
        Self {
            id: id.into(),
            performance_id: performance_id.to_string(),
            seat_number: seat_number.to_string(),
            status: TicketStatus::Available,
        }
    }

    /// Transition: Available → Reserved. There is no way back.
    pub fn reserve(&mut self) -> Result<(), ReservationError> {
        if self.status != TicketStatus::Available {
            return Err(ReservationError::AlreadyReserved(self.id.clone()));
        }

        self.status = TicketStatus::Reserved;
        Ok(())
    }
}

/// Durable record of one successful reservation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub ticket_id: TicketId,
    pub requester_id: String,
    pub requester_name: Masked<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn for_request(request: &ReservationRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id: request.ticket_id.clone(),
            requester_id: request.requester_id.clone(),
            requester_name: request.requester_name.clone(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub ticket_id: TicketId,
    pub requester_id: String,
    pub requester_name: Masked<String>,
}

impl ReservationRequest {
    pub fn new(ticket_id: impl Into<TicketId>, requester_id: &str, requester_name: &str) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            requester_id: requester_id.to_string(),
            requester_name: Masked(requester_name.to_string()),
        }
    }
}
