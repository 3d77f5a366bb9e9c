//! Locale-scoped composite structures
//!
//! A `LocalizedFactory` is an extended factory whose auxiliary tables carry
//! one row per locale in a `locale` column. The effective locale is the one
//! set on the factory, else the connection default; reads and writes fail
//! with `LocaleNotSet` when neither is present.

use std::sync::{Mutex, PoisonError, RwLock};

use super::extended::{Extension, ExtendedFactory, JoinScope};
use crate::backends::Row;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};
use crate::model::traits::Localizable;
use crate::query::{JoinClause, Where};

/// Locale column of every auxiliary table
pub const LOCALE_COLUMN: &str = "locale";

pub type LocalizedFactory = ExtendedFactory<LocaleScope>;

struct CachedJoins {
    locale: String,
    base: Vec<JoinClause>,
    scoped: Vec<JoinClause>,
}

/// Scope adding `aux.locale = <locale>` to joins and auxiliary writes
#[derive(Default)]
pub struct LocaleScope {
    locale: RwLock<Option<String>>,
    cache: Mutex<Option<CachedJoins>>,
}

impl LocaleScope {
    fn local(&self) -> Option<String> {
        self.locale
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, locale: Option<&str>) {
        *self.locale.write().unwrap_or_else(PoisonError::into_inner) =
            locale.map(str::to_string);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn resolve(&self, connection: &Connection) -> Option<String> {
        self.local().or_else(|| connection.default_locale())
    }

    fn require(&self, connection: &Connection, table: &str) -> ModelResult<String> {
        self.resolve(connection)
            .ok_or_else(|| ModelError::LocaleNotSet(table.to_string()))
    }
}

impl JoinScope for LocaleScope {
    fn check(&self, connection: &Connection, table: &str) -> ModelResult<()> {
        self.require(connection, table).map(|_| ())
    }

    fn scoped_joins(
        &self,
        connection: &Connection,
        table: &str,
        base: Vec<JoinClause>,
    ) -> ModelResult<Vec<JoinClause>> {
        let locale = self.require(connection, table)?;

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_ref() {
            if cached.locale == locale && cached.base == base {
                return Ok(cached.scoped.clone());
            }
        }

        tracing::trace!("building '{}' joins for locale '{}'", table, locale);
        let scoped: Vec<JoinClause> = base
            .iter()
            .cloned()
            .map(|join| {
                let column = format!("{}.{}", join.table, LOCALE_COLUMN);
                JoinClause {
                    on: join.on.and_where(Where::eq(&column, locale.clone())),
                    ..join
                }
            })
            .collect();

        *cache = Some(CachedJoins {
            locale,
            base,
            scoped: scoped.clone(),
        });
        Ok(scoped)
    }

    fn write_scope(
        &self,
        connection: &Connection,
        extension: &Extension,
    ) -> ModelResult<Option<Where>> {
        let locale = self.require(connection, &extension.table)?;
        Ok(Some(Where::eq(&extension.column(LOCALE_COLUMN), locale)))
    }

    fn prepare_insert(
        &self,
        connection: &Connection,
        extension: &Extension,
        row: &mut Row,
    ) -> ModelResult<()> {
        let locale = self.require(connection, &extension.table)?;
        row.entry(LOCALE_COLUMN.to_string())
            .or_insert_with(|| locale.into());
        Ok(())
    }
}

impl Localizable for ExtendedFactory<LocaleScope> {
    fn locale(&self) -> Option<String> {
        self.scope().resolve(self.base().connection())
    }

    fn set_locale(&self, locale: Option<&str>) {
        tracing::debug!("'{}' locale set to {:?}", self.base().table().unwrap_or_default(), locale);
        self.scope().set(locale);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backends::MemoryDriver;
    use crate::model::traits::Joinable;
    use crate::repository::Repository;

    fn localized() -> (Connection, LocalizedFactory) {
        let connection = Connection::new(Arc::new(MemoryDriver::new()));
        let factory = LocalizedFactory::new(&connection, "article");
        factory.init_table("article", &["id"], &["id", "slug"]).unwrap();
        factory
            .init_extended("article_lang", "article_id", &["title"])
            .unwrap();
        (connection, factory)
    }

    #[test]
    fn test_locale_required() {
        let (_connection, factory) = localized();
        assert!(!factory.is_locale_set());
        assert!(matches!(
            factory.select(),
            Err(ModelError::LocaleNotSet(table)) if table == "article"
        ));
    }

    #[test]
    fn test_connection_default_locale_applies() {
        let (connection, factory) = localized();
        connection.set_default_locale(Some("fr"));
        assert_eq!(factory.locale().as_deref(), Some("fr"));

        factory.set_locale(Some("en"));
        assert_eq!(factory.locale().as_deref(), Some("en"));
    }

    #[test]
    fn test_joins_follow_locale_changes() {
        let (_connection, factory) = localized();
        factory.set_locale(Some("en"));
        let english = factory.select().unwrap().to_string();
        assert!(english.contains("article_lang.locale = 'en'"));

        factory.set_locale(Some("de"));
        let joins = factory.joins().unwrap();
        assert_eq!(joins.len(), 1);
        assert!(factory
            .select()
            .unwrap()
            .to_string()
            .contains("article_lang.locale = 'de'"));
    }
}
