use async_trait::async_trait;
use boxoffice_core::{Booking, StoreError, Ticket, TicketId, TicketStatus, TicketStore};
use boxoffice_shared::Masked;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

pub struct PostgresTicketStore {
    pool: PgPool,
}

impl PostgresTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: String,
    performance_id: String,
    seat_number: String,
    status: String,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status: TicketStatus = row.status.parse().map_err(|reason| StoreError::Corrupt {
            ticket_id: row.id.clone(),
            reason,
        })?;
        Ok(Ticket {
            id: TicketId::new(row.id),
            performance_id: row.performance_id,
            seat_number: row.seat_number,
            status,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    ticket_id: String,
    requester_id: String,
    requester_name: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            ticket_id: TicketId::new(row.ticket_id),
            requester_id: row.requester_id,
            requester_name: Masked::from(row.requester_name),
            created_at: row.created_at,
        }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl TicketStore for PostgresTicketStore {
    async fn find_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        let row = sqlx::query_as::<_, TicketRow>(
            "SELECT id, performance_id, seat_number, status FROM tickets WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn commit_reservation(&self, booking: &Booking) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Conditional flip: loses cleanly to any writer that got there first
        let updated = sqlx::query("UPDATE tickets SET status = $2 WHERE id = $1 AND status = $3")
            .bind(booking.ticket_id.as_str())
            .bind(TicketStatus::Reserved.as_str())
            .bind(TicketStatus::Available.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        if updated.rows_affected() == 0 {
            debug!(ticket_id = %booking.ticket_id, "Ticket not available at commit, rolling back");
            tx.rollback().await.map_err(backend)?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO bookings (id, ticket_id, requester_id, requester_name, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(booking.id)
        .bind(booking.ticket_id.as_str())
        .bind(&booking.requester_id)
        .bind(booking.requester_name.expose())
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn bookings_for(&self, requester_id: &str) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT id, ticket_id, requester_id, requester_name, created_at FROM bookings WHERE requester_id = $1 ORDER BY created_at DESC",
        )
        .bind(requester_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(Booking::from).collect())
    }

    /// Skips tickets whose id, or whose performance seat, already exists.
    async fn provision(&self, ticket: &Ticket) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO tickets (id, performance_id, seat_number, status) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(ticket.id.as_str())
        .bind(&ticket.performance_id)
        .bind(&ticket.seat_number)
        .bind(ticket.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::ReservationRequest;

    #[test]
    fn test_unknown_status_is_corrupt() {
        let row = TicketRow {
            id: "T-1".into(),
            performance_id: "P-1".into(),
            seat_number: "A1".into(),
            status: "BOOKED?".into(),
        };
        let err = Ticket::try_from(row).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ticket_id, .. } if ticket_id == "T-1"));
    }

    #[test]
    fn test_row_maps_to_ticket() {
        let row = TicketRow {
            id: "T-1".into(),
            performance_id: "P-1".into(),
            seat_number: "A1".into(),
            status: "RESERVED".into(),
        };
        let ticket = Ticket::try_from(row).unwrap();
        assert_eq!(ticket.status, TicketStatus::Reserved);
        assert_eq!(ticket.id, TicketId::from("T-1"));
    }

    async fn live_store() -> Option<PostgresTicketStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let db = crate::DbClient::new(&url, 2).await.unwrap();
        db.migrate().await.unwrap();
        Some(PostgresTicketStore::new(db.pool.clone()))
    }

    #[tokio::test]
    #[ignore = "needs Postgres, set DATABASE_URL"]
    async fn test_second_commit_writes_nothing() {
        let Some(store) = live_store().await else { return };
        let ticket = Ticket::available(format!("T-{}", Uuid::new_v4()), "P-it", &Uuid::new_v4().to_string());
        assert!(store.provision(&ticket).await.unwrap());

        let alice = format!("U-{}", Uuid::new_v4());
        let bob = format!("U-{}", Uuid::new_v4());
        let first = Booking::for_request(&ReservationRequest::new(ticket.id.clone(), &alice, "Alice"));
        let second = Booking::for_request(&ReservationRequest::new(ticket.id.clone(), &bob, "Bob"));

        assert!(store.commit_reservation(&first).await.unwrap());
        assert!(!store.commit_reservation(&second).await.unwrap());

        let stored = store.find_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Reserved);
        assert_eq!(store.bookings_for(&alice).await.unwrap().len(), 1);
        assert!(store.bookings_for(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "needs Postgres, set DATABASE_URL"]
    async fn test_provision_skips_taken_seat() {
        let Some(store) = live_store().await else { return };
        let seat = Uuid::new_v4().to_string();
        let original = Ticket::available(format!("T-{}", Uuid::new_v4()), "P-it", &seat);
        let same_seat = Ticket::available(format!("T-{}", Uuid::new_v4()), "P-it", &seat);

        assert!(store.provision(&original).await.unwrap());
        assert!(!store.provision(&same_seat).await.unwrap());
        assert!(store.find_ticket(&same_seat.id).await.unwrap().is_none());
    }
}
