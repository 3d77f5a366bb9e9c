//! Connection context
//!
//! A `Connection` bundles the relational driver, the optional document store,
//! the process-wide default locale and the registry of repositories by name.
//! It is passed explicitly to every repository constructor. Applications that
//! want a single shared handle can install one with [`set_global`], which
//! succeeds exactly once.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::backends::{Driver, PostgresDriver};
use crate::config::DataObjectConfig;
use crate::document::DocumentStore;
use crate::error::{ModelError, ModelResult};
use crate::repository::Persistence;

struct ConnectionInner {
    driver: Option<Arc<dyn Driver>>,
    documents: Option<Arc<dyn DocumentStore>>,
    default_locale: RwLock<Option<String>>,
    repositories: DashMap<String, Arc<dyn Persistence>>,
    config: DataObjectConfig,
}

/// Shared handle to the store and its process-wide settings
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("has_driver", &self.inner.driver.is_some())
            .field("has_document_store", &self.inner.documents.is_some())
            .field("default_locale", &self.default_locale())
            .field("repositories", &self.inner.repositories.len())
            .finish()
    }
}

/// Builder for [`Connection`]
#[derive(Default)]
pub struct ConnectionBuilder {
    driver: Option<Arc<dyn Driver>>,
    documents: Option<Arc<dyn DocumentStore>>,
    config: DataObjectConfig,
}

impl ConnectionBuilder {
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(store);
        self
    }

    pub fn config(mut self, config: DataObjectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Connection {
        let default_locale = self.config.default_locale.clone();
        Connection {
            inner: Arc::new(ConnectionInner {
                driver: self.driver,
                documents: self.documents,
                default_locale: RwLock::new(default_locale),
                repositories: DashMap::new(),
                config: self.config,
            }),
        }
    }
}

impl Connection {
    /// Connection over a relational driver with default configuration
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::builder().driver(driver).build()
    }

    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Open a PostgreSQL pool described by `config`
    pub async fn connect(config: DataObjectConfig) -> ModelResult<Self> {
        let driver = PostgresDriver::connect(&config).await?;
        tracing::info!("Connection established");
        Ok(Self::builder()
            .driver(Arc::new(driver))
            .config(config)
            .build())
    }

    pub fn driver(&self) -> ModelResult<Arc<dyn Driver>> {
        self.inner
            .driver
            .clone()
            .ok_or(ModelError::ConnectionNotInitialised)
    }

    pub fn document_store(&self) -> ModelResult<Arc<dyn DocumentStore>> {
        self.inner
            .documents
            .clone()
            .ok_or(ModelError::ConnectionNotInitialised)
    }

    pub fn config(&self) -> &DataObjectConfig {
        &self.inner.config
    }

    pub fn default_locale(&self) -> Option<String> {
        self.inner
            .default_locale
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_default_locale(&self, locale: Option<&str>) {
        tracing::debug!("default locale set to {:?}", locale);
        *self
            .inner
            .default_locale
            .write()
            .unwrap_or_else(PoisonError::into_inner) = locale.map(str::to_string);
    }

    /// Make a repository reachable by name, used to reattach deserialized objects
    pub fn register(&self, repository: Arc<dyn Persistence>) {
        let name = repository.name().to_string();
        tracing::trace!("registering repository '{}'", name);
        self.inner.repositories.insert(name, repository);
    }

    pub fn repository(&self, name: &str) -> ModelResult<Arc<dyn Persistence>> {
        self.inner
            .repositories
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ModelError::UnregisteredRepository(name.to_string()))
    }

    pub fn ptr_eq(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

static GLOBAL: OnceCell<Connection> = OnceCell::new();

/// Install the process-wide connection; only the first call succeeds
pub fn set_global(connection: Connection) -> ModelResult<()> {
    GLOBAL
        .set(connection)
        .map_err(|_| ModelError::ConnectionAlreadyInitialised)?;
    tracing::info!("Global connection initialised");
    Ok(())
}

/// The process-wide connection installed by [`set_global`]
pub fn global() -> ModelResult<Connection> {
    GLOBAL.get().cloned().ok_or(ModelError::ConnectionNotInitialised)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryDriver;

    #[test]
    fn test_default_locale_from_config() {
        let connection = Connection::builder()
            .driver(Arc::new(MemoryDriver::new()))
            .config(DataObjectConfig {
                default_locale: Some("en".to_string()),
                ..DataObjectConfig::testing()
            })
            .build();

        assert_eq!(connection.default_locale().as_deref(), Some("en"));
        connection.set_default_locale(None);
        assert_eq!(connection.default_locale(), None);
    }

    #[test]
    fn test_missing_collaborators() {
        let connection = Connection::builder().build();
        assert!(matches!(connection.driver(), Err(ModelError::ConnectionNotInitialised)));
        assert!(matches!(
            connection.document_store(),
            Err(ModelError::ConnectionNotInitialised)
        ));
        assert!(matches!(
            connection.repository("article"),
            Err(ModelError::UnregisteredRepository(_))
        ));
    }
}
