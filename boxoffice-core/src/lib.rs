pub mod engine;
pub mod error;
pub mod facade;
pub mod lock;
pub mod models;
pub mod repository;

pub use engine::{ReservationEngine, ReservationTransition};
pub use error::{CoordinatorError, ReservationError, StoreError};
pub use facade::LockedReservationFacade;
pub use lock::{holder_token, Backoff, InMemoryLockCoordinator, LockCoordinator, LockGuard, LockHandle, LockPolicy};
pub use models::{Booking, ReservationRequest, Ticket, TicketId, TicketStatus};
pub use repository::{InMemoryTicketStore, TicketStore};
