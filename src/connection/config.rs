use crate::core::{AdminError, Result};
use serde::{Deserialize, Serialize};

/// Default classic protocol port of a server instance.
pub const DEFAULT_PORT: u16 = 3306;

/// SSL material used to reach an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslOptions {
    pub ca: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,
}

impl SslOptions {
    pub fn has_data(&self) -> bool {
        self.ca.is_some() || self.cert.is_some() || self.key.is_some()
    }

    /// Fills every field that is unset here from `other`.
    pub fn inherit_from(&mut self, other: &SslOptions) {
        if self.ca.is_none() {
            self.ca = other.ca.clone();
        }
        if self.cert.is_none() {
            self.cert = other.cert.clone();
        }
        if self.key.is_none() {
            self.key = other.key.clone();
        }
    }
}

/// Connection options of one server instance.
///
/// Similar to a MySQL connection URI restricted to TCP transport:
/// `user:password@host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Hostname or IP address
    pub host: String,

    /// TCP port; `None` until resolved against the default
    pub port: Option<u16>,

    /// Account used to connect
    pub user: Option<String>,

    /// Password of the account
    pub password: Option<String>,

    /// SSL material
    #[serde(default)]
    pub ssl: SslOptions,
}

impl ConnectionOptions {
    /// Create options for a host with nothing else set
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: None,
            user: None,
            password: None,
            ssl: SslOptions::default(),
        }
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the user
    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    /// Set the password
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Set the SSL material
    pub fn ssl(mut self, ssl: SslOptions) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn has_port(&self) -> bool {
        self.port.is_some()
    }

    pub fn has_user(&self) -> bool {
        self.user.is_some()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Port, falling back to [`DEFAULT_PORT`].
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Transport-only address, `host:port`. This is the key instances are
    /// registered under in the metadata catalog.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port_or_default())
    }

    /// Parse from connection string
    ///
    /// Accepted forms: `host`, `host:port`, `user@host:port`,
    /// `user:password@host:port`, optionally prefixed with `mysql://`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use clusteradmin::connection::ConnectionOptions;
    /// let opts = ConnectionOptions::from_uri("root:secret@db1.example.com:3306").unwrap();
    /// assert_eq!(opts.address(), "db1.example.com:3306");
    /// ```
    pub fn from_uri(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let uri = uri.strip_prefix("mysql://").unwrap_or(uri);
        if uri.is_empty() {
            return Err(AdminError::argument("Invalid connection options, no options provided."));
        }

        let (auth, transport) = match uri.rsplit_once('@') {
            Some((auth, transport)) => (Some(auth), transport),
            None => (None, uri),
        };

        let (host, port) = match transport.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    AdminError::argument(format!("Invalid URI: Illegal character in port number '{}'", port))
                })?;
                (host, Some(port))
            }
            None => (transport, None),
        };

        if host.is_empty() {
            return Err(AdminError::argument("Invalid URI: Missing host"));
        }

        let mut options = Self::new(host);
        options.port = port;

        if let Some(auth) = auth {
            match auth.split_once(':') {
                Some((user, password)) => {
                    options.user = Some(user.to_string());
                    options.password = Some(password.to_string());
                }
                None => options.user = Some(auth.to_string()),
            }
            if options.user.as_deref() == Some("") {
                return Err(AdminError::argument("Invalid URI: Missing user information"));
            }
        }

        Ok(options)
    }

    /// Connection string with the password hidden
    pub fn to_uri(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.address()),
            None => self.address(),
        }
    }

    /// Sets the default user when none was given.
    pub fn resolve_credentials(&mut self, default_user: &str) {
        if self.user.is_none() {
            self.user = Some(default_user.to_string());
        }
    }

    /// Copies user and password from another set of options where they are
    /// missing here, along with any SSL material.
    pub fn inherit_credentials(&mut self, other: &ConnectionOptions) {
        if self.user.is_none() {
            self.user = other.user.clone();
        }
        if self.password.is_none() {
            self.password = other.password.clone();
        }
        self.ssl.inherit_from(&other.ssl);
    }

    /// Rejects options that cannot describe a TCP instance
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AdminError::argument("Invalid connection options, host cannot be empty"));
        }
        if self.port == Some(0) {
            return Err(AdminError::argument("Invalid connection options, port cannot be 0"));
        }
        Ok(())
    }
}
