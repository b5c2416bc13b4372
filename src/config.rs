//! Configuration for the call-session orchestrator
//!
//! The credentials block is a read-only view of what an external preferences
//! collaborator supplies (account id, password hash, signaling domain); this
//! core does not persist or validate credentials. The timing block carries the
//! protocol deadlines the orchestrator runs on.
//!
//! # Usage Examples
//!
//! ```rust
//! use call_session_core::config::{CoreConfig, Credentials};
//! use std::time::Duration;
//!
//! let config = CoreConfig::new(Credentials {
//!     account_id: "*0001*".to_string(),
//!     password_hash: "ha1:deadbeef".to_string(),
//!     domain: "sip.example.org".to_string(),
//! })
//! .with_user_agent("MobileClient/1.0".to_string())
//! .with_keep_alive_interval(Duration::from_secs(600));
//!
//! assert_eq!(config.keep_alive_interval, Duration::from_secs(600));
//! assert_eq!(config.sco_retry_attempts, 10);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read-only identity supplied by the external preferences collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account identifier registered with the signaling server
    pub account_id: String,
    /// Pre-hashed password; this core never sees the plaintext
    pub password_hash: String,
    /// Signaling-server domain
    pub domain: String,
}

/// Configuration for the orchestrator core
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Identity used for registration
    pub credentials: Credentials,
    /// User agent string identifying this client in logs
    pub user_agent: String,
    /// Keep-alive re-registration period (counters host-OS idle teardown)
    pub keep_alive_interval: Duration,
    /// Idle-connection check period while not in a call
    pub idle_check_interval: Duration,
    /// Deadline for the graceful-unregister phase of the termination protocol
    pub graceful_unregister_timeout: Duration,
    /// Engine iterate/poll pump period
    pub iterate_interval: Duration,
    /// Delay between Bluetooth SCO negotiation attempts
    pub sco_retry_interval: Duration,
    /// Maximum Bluetooth SCO negotiation attempts before giving up silently
    pub sco_retry_attempts: u32,
}

impl CoreConfig {
    /// Create a configuration with the protocol's default timings
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            user_agent: format!("call-session-core/{}", env!("CARGO_PKG_VERSION")),
            keep_alive_interval: Duration::from_secs(600),
            idle_check_interval: Duration::from_secs(20),
            graceful_unregister_timeout: Duration::from_secs(5),
            iterate_interval: Duration::from_millis(20),
            sco_retry_interval: Duration::from_millis(200),
            sco_retry_attempts: 10,
        }
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Set the keep-alive re-registration period
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Set the idle-connection check period
    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    /// Set the graceful-unregister deadline
    pub fn with_graceful_unregister_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_unregister_timeout = timeout;
        self
    }

    /// Set the SCO retry budget
    pub fn with_sco_retry(mut self, interval: Duration, attempts: u32) -> Self {
        self.sco_retry_interval = interval;
        self.sco_retry_attempts = attempts;
        self
    }
}
