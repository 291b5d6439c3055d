use boxoffice_core::{Backoff, LockPolicy, Ticket};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub locking: LockingConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Lock timing. `lease_timeout_ms` has to outlast the slowest reservation
/// transition (`transition_budget_ms`), see [`Config::validate`].
#[derive(Debug, Deserialize, Clone)]
pub struct LockingConfig {
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    #[serde(default = "default_lease_timeout_ms")]
    pub lease_timeout_ms: u64,
    #[serde(default = "default_transition_budget_ms")]
    pub transition_budget_ms: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_wait_timeout_ms() -> u64 { 10_000 }
fn default_lease_timeout_ms() -> u64 { 3_000 }
fn default_transition_budget_ms() -> u64 { 1_000 }
fn default_key_prefix() -> String { "lock:ticket:".to_string() }
fn default_retry_initial_ms() -> u64 { 50 }
fn default_retry_max_ms() -> u64 { 500 }

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            lease_timeout_ms: default_lease_timeout_ms(),
            transition_budget_ms: default_transition_budget_ms(),
            key_prefix: default_key_prefix(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

impl LockingConfig {
    pub fn policy(&self) -> LockPolicy {
        LockPolicy::new(
            Duration::from_millis(self.wait_timeout_ms),
            Duration::from_millis(self.lease_timeout_ms),
        )
        .with_key_prefix(&self.key_prefix)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.retry_initial_ms),
            Duration::from_millis(self.retry_max_ms),
        )
    }
}

/// Tickets inserted at startup when missing. Existing rows are left alone.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InventoryConfig {
    #[serde(default)]
    pub tickets: Vec<TicketSeed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TicketSeed {
    pub id: String,
    pub performance_id: String,
    pub seat_number: String,
}

impl TicketSeed {
    pub fn to_ticket(&self) -> Ticket {
        Ticket::available(self.id.as_str(), &self.performance_id, &self.seat_number)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `BOXOFFICE__LOCKING__LEASE_TIMEOUT_MS=5000`
            .add_source(config::Environment::with_prefix("BOXOFFICE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let locking = &self.locking;
        if locking.wait_timeout_ms == 0 || locking.lease_timeout_ms == 0 {
            return Err(config::ConfigError::Message(
                "locking.wait_timeout_ms and locking.lease_timeout_ms must be non-zero".into(),
            ));
        }
        if locking.retry_initial_ms == 0 {
            return Err(config::ConfigError::Message("locking.retry_initial_ms must be non-zero".into()));
        }
        if locking.lease_timeout_ms <= locking.transition_budget_ms {
            return Err(config::ConfigError::Message(format!(
                "locking.lease_timeout_ms ({}) must exceed locking.transition_budget_ms ({})",
                locking.lease_timeout_ms, locking.transition_budget_ms
            )));
        }
        if self.database.max_connections == 0 {
            return Err(config::ConfigError::Message("database.max_connections must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::TicketId;
    use config::{File, FileFormat};

    const BASE: &str = r#"
        [server]
        port = 3000

        [database]
        url = "postgres://boxoffice@localhost/boxoffice"

        [redis]
        url = "redis://127.0.0.1:6379"
    "#;

    fn parse(extra: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(BASE, FileFormat::Toml))
            .add_source(File::from_str(extra, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_when_locking_omitted() {
        let config = parse("");
        assert_eq!(config.database.max_connections, 5);
        assert!(config.inventory.tickets.is_empty());
        config.validate().unwrap();

        let policy = config.locking.policy();
        assert_eq!(policy.wait_timeout, Duration::from_secs(10));
        assert_eq!(policy.lease_timeout, Duration::from_secs(3));
        assert_eq!(policy.lock_key(&TicketId::from("42")), "lock:ticket:42");
    }

    #[test]
    fn test_overrides_and_inventory() {
        let config = parse(
            r#"
            [locking]
            wait_timeout_ms = 2000
            lease_timeout_ms = 5000
            transition_budget_ms = 4000
            key_prefix = "seat:"
            retry_initial_ms = 10
            retry_max_ms = 40

            [[inventory.tickets]]
            id = "T-100"
            performance_id = "P-1"
            seat_number = "A1"
            "#,
        );
        config.validate().unwrap();

        assert_eq!(config.locking.policy().wait_timeout, Duration::from_secs(2));
        assert_eq!(config.locking.policy().lock_key(&TicketId::from("T-100")), "seat:T-100");
        assert_eq!(
            config.locking.backoff(),
            Backoff::new(Duration::from_millis(10), Duration::from_millis(40))
        );

        let ticket = config.inventory.tickets[0].to_ticket();
        assert_eq!(ticket.id, TicketId::from("T-100"));
        assert_eq!(ticket.seat_number, "A1");
    }

    #[test]
    fn test_lease_must_outlast_transition_budget() {
        let config = parse(
            r#"
            [locking]
            lease_timeout_ms = 1000
            transition_budget_ms = 1000
            "#,
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("transition_budget_ms"));
    }

    #[test]
    fn test_zero_wait_is_rejected() {
        let config = parse("[locking]\nwait_timeout_ms = 0\n");
        assert!(config.validate().is_err());
    }
}
