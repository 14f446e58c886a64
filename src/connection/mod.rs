pub mod config;

pub use config::{ConnectionOptions, SslOptions, DEFAULT_PORT};

use crate::core::{AdminError, Result, Value};
use crate::result::QueryResult;
use log::{error, info};
use std::sync::Arc;

/// Session to one server instance.
///
/// Implemented by the embedding application on top of its driver; this
/// crate only issues statements and reads/sets variables through it.
/// Similar to a classic-protocol `mysql::Conn`.
pub trait Session: Send + Sync {
    /// Options the session was opened with
    fn connection_options(&self) -> &ConnectionOptions;

    /// Execute a statement and return its rows
    fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// Read a global system variable; `Value::Null` when it is unset
    fn global_variable(&self, name: &str) -> Result<Value>;

    /// Set a global system variable
    fn set_global_variable(&self, name: &str, value: &Value) -> Result<()>;

    /// Read a global status variable; `Value::Null` when it is unset
    fn status_variable(&self, name: &str) -> Result<Value>;

    /// Whether the session can still be used
    fn is_open(&self) -> bool;

    /// Close the session. Further calls fail.
    fn close(&self);
}

/// Opens sessions to instances described by [`ConnectionOptions`].
pub trait Connector: Send + Sync {
    fn connect(&self, options: &ConnectionOptions) -> Result<Arc<dyn Session>>;
}

/// Opens a session, logging the attempt and turning a failure into a
/// runtime error that names the instance.
pub fn open_session(
    connector: &dyn Connector,
    options: &ConnectionOptions,
    purpose: &str,
) -> Result<Arc<dyn Session>> {
    let address = options.address();
    info!("Opening a new session to the {} instance {}", purpose, address);
    connector.connect(options).map_err(|err| {
        error!("Could not open connection to '{}': {}", address, err);
        AdminError::runtime(format!(
            "Could not open connection to '{}': {}",
            address,
            err.message()
        ))
    })
}

/// Session owned by a single operation; closed when dropped.
pub struct ScopedSession {
    session: Arc<dyn Session>,
}

impl ScopedSession {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub fn address(&self) -> String {
        self.session.connection_options().address()
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if self.session.is_open() {
            self.session.close();
        }
    }
}

/// Like [`open_session`], for a session that lives only as long as the
/// returned guard.
pub fn open_scoped_session(
    connector: &dyn Connector,
    options: &ConnectionOptions,
    purpose: &str,
) -> Result<ScopedSession> {
    open_session(connector, options, purpose).map(ScopedSession::new)
}

/// Reads a system variable as text; `None` when unset or empty.
pub fn get_server_variable(session: &dyn Session, name: &str) -> Result<Option<String>> {
    let value = session.global_variable(name)?;
    Ok(value.to_text().filter(|v| !v.is_empty()))
}

/// Reads a system variable that must be set.
pub fn require_server_variable(session: &dyn Session, name: &str) -> Result<String> {
    get_server_variable(session, name)?.ok_or_else(|| {
        AdminError::runtime(format!(
            "Unable to read '{}' from instance '{}'",
            name,
            session.connection_options().address()
        ))
    })
}

/// Reads a status variable as text; `None` when unset or empty.
pub fn get_status_variable(session: &dyn Session, name: &str) -> Result<Option<String>> {
    let value = session.status_variable(name)?;
    Ok(value.to_text().filter(|v| !v.is_empty()))
}

/// Escapes a string literal for inclusion in a statement.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
