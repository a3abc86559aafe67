//! temps-redis: Redis connections for the Temps plugin server
//!
//! Opens one connection per configuration on registration, decorates the
//! server according to the configured policy, and closes every connection when
//! the server stops.
//!
//! ## Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use temps_core::PluginServer;
//! use temps_redis::{RedisClients, RedisPlugin, PLUGIN_NAME};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = PluginServer::new();
//! server
//!     .register(&RedisPlugin::new(), json!({ "settings": "redis://localhost:6379/0" }))
//!     .await?;
//!
//! let clients = server
//!     .plugin_state::<RedisClients>(PLUGIN_NAME, "client")
//!     .expect("client is exposed");
//! let _conn = clients.single().expect("one connection").connection();
//!
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod connector;
pub mod error;
pub mod manager;
pub mod options;
pub mod plugin;
pub mod target;

pub use bundle::{Bundle, Clients, RedisBundle, RedisClients};
pub use connector::{Connector, RedisConnection, RedisConnector, StoreClient};
pub use error::{FieldError, RedisPluginError};
pub use manager::{ConnectionManager, RegistrationState, GLOBAL_DECORATION};
pub use options::{ConnectionOptions, ConnectionSettings, Decoration, DecorationKind};
pub use plugin::{RedisPlugin, PLUGIN_NAME};
pub use target::{ConnectionTarget, StructuredSettings, PASSWORD_MASK};
