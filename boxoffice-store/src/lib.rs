pub mod app_config;
pub mod database;
pub mod redis_repo;
pub mod ticket_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use redis_repo::RedisLockCoordinator;
pub use ticket_repo::PostgresTicketStore;
