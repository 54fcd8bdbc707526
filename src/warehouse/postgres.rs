// src/warehouse/postgres.rs

//! `PostgreSQL`-protocol implementation of [`WarehouseGateway`].
//!
//! Uses the sync `postgres` crate. Operators run on Tokio's blocking pool, so
//! several may call into the gateway at once; each call checks a client out
//! of a small idle pool (connecting a new one when the pool is empty) and
//! returns it afterwards unless the connection was closed.

use std::sync::{Mutex, MutexGuard};

use postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use super::{GatewayError, Row, Value, WarehouseGateway};

/// Gateway to a Postgres-compatible warehouse (Postgres, Redshift).
pub struct PostgresGateway {
    connstr: String,
    idle: Mutex<Vec<Client>>,
    max_idle: usize,
}

impl PostgresGateway {
    /// Connect once to verify the connection string, keeping the client idle.
    ///
    /// `connstr` is a libpq-style string or URI, e.g.
    /// `"host=localhost port=5439 dbname=dev user=etl"`.
    pub fn connect(connstr: &str, max_idle: usize) -> Result<Self, GatewayError> {
        let client = Client::connect(connstr, NoTls).map_err(classify)?;
        Ok(Self {
            connstr: connstr.to_string(),
            idle: Mutex::new(vec![client]),
            max_idle: max_idle.max(1),
        })
    }

    fn lock_idle(&self) -> Result<MutexGuard<'_, Vec<Client>>, GatewayError> {
        self.idle
            .lock()
            .map_err(|_| GatewayError::Connection("connection pool lock poisoned".to_string()))
    }

    fn checkout(&self) -> Result<Client, GatewayError> {
        if let Some(client) = self.lock_idle()?.pop() {
            if !client.is_closed() {
                return Ok(client);
            }
        }
        debug!("opening new warehouse connection");
        Client::connect(&self.connstr, NoTls).map_err(classify)
    }

    fn checkin(&self, client: Client) {
        if client.is_closed() {
            return;
        }
        if let Ok(mut idle) = self.lock_idle() {
            if idle.len() < self.max_idle {
                idle.push(client);
            }
        }
    }
}

impl WarehouseGateway for PostgresGateway {
    fn execute(&self, statement: &str) -> Result<(), GatewayError> {
        let mut client = self.checkout()?;
        let result = client.batch_execute(statement).map_err(classify);

        if result.is_err() && !client.is_closed() {
            // A failed batch can leave an open, aborted transaction behind.
            if let Err(e) = client.batch_execute("ROLLBACK") {
                warn!(error = %e, "rollback after failed statement also failed");
            }
        }

        self.checkin(client);
        result
    }

    fn query(&self, statement: &str) -> Result<Vec<Row>, GatewayError> {
        let mut client = self.checkout()?;
        let result = client.simple_query(statement).map_err(classify);
        self.checkin(client);

        let mut rows = Vec::new();
        for message in result? {
            if let SimpleQueryMessage::Row(row) = message {
                let values = (0..row.len())
                    .map(|i| match row.get(i) {
                        Some(text) => Value::Text(text.to_string()),
                        None => Value::Null,
                    })
                    .collect();
                rows.push(values);
            }
        }
        Ok(rows)
    }
}

impl Drop for PostgresGateway {
    // Closing a sync client blocks on its private runtime, which panics when
    // done from inside an async task. Close idle clients off-runtime instead.
    fn drop(&mut self) {
        let clients = match self.idle.get_mut() {
            Ok(idle) => std::mem::take(idle),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        if clients.is_empty() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            std::thread::spawn(move || drop(clients));
        } else {
            drop(clients);
        }
    }
}

/// Map driver errors onto the gateway taxonomy.
///
/// Anything the server answered with an error response is a statement error;
/// everything else (IO, TLS, closed socket) is treated as a connection error.
fn classify(err: postgres::Error) -> GatewayError {
    match err.as_db_error() {
        Some(db) => GatewayError::Statement(format!("{} ({})", db.message(), db.code().code())),
        None => GatewayError::Connection(err.to_string()),
    }
}
