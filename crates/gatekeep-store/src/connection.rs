//! Credential-store connection management.

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::StoreError;
use crate::repository::SurrealPrincipalRepository;
use crate::schema::run_migrations;

/// Credential repository over the remote WebSocket engine.
pub type RemotePrincipalRepository = SurrealPrincipalRepository<Client>;

/// Configuration for connecting to the credential database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket address (e.g., `127.0.0.1:8000`).
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "gatekeep".into(),
            database: "credentials".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

/// Owns the connection to the credential database.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect, authenticate as root, select namespace and database,
    /// then bring the schema up to date.
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to credential store"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;

        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        run_migrations(&db).await?;

        info!("Credential store ready");

        Ok(Self { db })
    }

    /// Repository handle over this connection.
    pub fn principals(&self) -> RemotePrincipalRepository {
        SurrealPrincipalRepository::new(self.db.clone())
    }
}
