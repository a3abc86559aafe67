//! Client library seam and its Redis implementation

use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::debug;

use crate::target::ConnectionTarget;

/// An open connection handle
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Target this client is connected to
    fn target(&self) -> &ConnectionTarget;

    /// Ask the server to close the connection
    async fn quit(&self) -> anyhow::Result<()>;
}

/// Opens connections; exposed to applications as the bundle's `lib`
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Client: StoreClient;

    async fn connect(&self, target: &ConnectionTarget) -> anyhow::Result<Self::Client>;
}

/// Connector backed by the `redis` crate's [`MultiplexedConnection`]
///
/// Each target is dialed once. A refused or dropped connection surfaces as an
/// error and is never retried or re-established.
#[derive(Debug, Clone, Default)]
pub struct RedisConnector;

impl RedisConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Client = RedisConnection;

    async fn connect(&self, target: &ConnectionTarget) -> anyhow::Result<RedisConnection> {
        debug!("Opening redis connection to {}", target);

        let client = Client::open(connection_info(target))
            .with_context(|| format!("Failed to create Redis client for {}", target))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", target))?;

        Ok(RedisConnection {
            target: target.clone(),
            conn,
        })
    }
}

/// An open Redis connection
pub struct RedisConnection {
    target: ConnectionTarget,
    conn: MultiplexedConnection,
}

impl RedisConnection {
    /// Handle for issuing commands; clones share the underlying connection
    pub fn connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

impl fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnection")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreClient for RedisConnection {
    fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    async fn quit(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("QUIT")
            .query_async::<()>(&mut conn)
            .await
            .with_context(|| format!("Failed to quit Redis connection {}", self.target))?;
        Ok(())
    }
}

fn connection_info(target: &ConnectionTarget) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(target.host.clone(), target.port),
        redis: RedisConnectionInfo {
            db: i64::from(target.db),
            username: target.username.clone(),
            password: target.password().map(str::to_string),
            ..Default::default()
        },
    }
}
