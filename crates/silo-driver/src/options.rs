//! Connection settings forwarded to drivers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Settings a driver needs to open a connection.
///
/// The pool treats this as opaque configuration: it is validated and
/// interpreted by the driver alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Database name.
    pub database: Option<String>,

    /// User name.
    pub user: String,

    /// Password.
    pub password: String,

    /// Application name reported to the server.
    pub application_name: String,

    /// Connection establishment timeout.
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            database: None,
            user: String::new(),
            password: String::new(),
            application_name: "silo".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a semicolon-separated connection string.
    ///
    /// ```text
    /// host=db.internal;port=3306;database=app;user=svc;password=secret;
    /// ```
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] on malformed pairs, unknown keys,
    /// or unparsable values.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, DriverError> {
        let mut options = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| DriverError::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "host" | "server" => options.host = value.to_string(),
                "port" => {
                    options.port = value
                        .parse()
                        .map_err(|_| DriverError::Config(format!("invalid port: {value}")))?;
                }
                "database" => options.database = Some(value.to_string()),
                "user" => options.user = value.to_string(),
                "password" => options.password = value.to_string(),
                "application_name" | "app" => options.application_name = value.to_string(),
                "connect_timeout" => {
                    let seconds: u64 = value.parse().map_err(|_| {
                        DriverError::Config(format!("invalid connect_timeout: {value}"))
                    })?;
                    options.connect_timeout = Duration::from_secs(seconds);
                }
                other => {
                    return Err(DriverError::Config(format!("unknown option: {other}")));
                }
            }
        }

        Ok(options)
    }

    /// Set the host.
    #[must_use]
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Set the credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connection_string() {
        let options = ConnectOptions::from_connection_string(
            "host=db.internal;port=5432;database=app;user=svc;password=hunter2;",
        )
        .unwrap();

        assert_eq!(options.host, "db.internal");
        assert_eq!(options.port, 5432);
        assert_eq!(options.database.as_deref(), Some("app"));
        assert_eq!(options.user, "svc");
        assert_eq!(options.password, "hunter2");
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(ConnectOptions::from_connection_string("host").is_err());
        assert!(ConnectOptions::from_connection_string("port=abc").is_err());
        assert!(ConnectOptions::from_connection_string("color=blue").is_err());
    }

    #[test]
    fn test_builder_setters() {
        let options = ConnectOptions::new()
            .with_host("replica-1")
            .with_port(3307)
            .with_database("reports")
            .with_credentials("reader", "s3cret");

        assert_eq!(options.host, "replica-1");
        assert_eq!(options.port, 3307);
        assert_eq!(options.database.as_deref(), Some("reports"));
        assert_eq!(options.user, "reader");
    }
}
