use std::sync::Arc;

use elif_dataobject::{
    plugin::{plugin_constructor, PluginFactory, TablePluginFactory},
    prelude::*,
    FailOn, MemoryDriver, ModelError, Operation, PrimaryKey, Row,
};
use serde_json::{json, Value};

static AUTHOR_PLUGINS: PluginRegistry = PluginRegistry::new();

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

fn registry() -> &'static PluginRegistry {
    AUTHOR_PLUGINS.init(vec![
        (
            "bio",
            plugin_constructor(|connection| {
                let bio = TablePluginFactory::new(
                    connection,
                    "bio",
                    "author_bio",
                    &["author_id"],
                    "author_id",
                    &["text"],
                )?;
                Ok(Arc::new(bio) as Arc<dyn PluginFactory>)
            }),
        ),
        (
            "settings",
            plugin_constructor(|connection| {
                let settings = TablePluginFactory::new(
                    connection,
                    "settings",
                    "author_settings",
                    &["author_id"],
                    "author_id",
                    &["theme"],
                )?;
                Ok(Arc::new(settings) as Arc<dyn PluginFactory>)
            }),
        ),
        (
            "awards",
            plugin_constructor(|connection| {
                let awards = TablePluginFactory::new(
                    connection,
                    "awards",
                    "author_awards",
                    &["id"],
                    "author_id",
                    &["title"],
                )?;
                Ok(Arc::new(awards) as Arc<dyn PluginFactory>)
            }),
        ),
    ]);
    &AUTHOR_PLUGINS
}

fn authors() -> (Arc<MemoryDriver>, PluginableFactory) {
    let driver = Arc::new(MemoryDriver::new());
    driver.create_table("author", Some("id"));
    driver.create_table("author_bio", None);
    driver.create_table("author_settings", None);
    driver.seed("author", vec![row(json!({"id": 1, "name": "Ada"}))]);
    driver.seed("author_bio", vec![row(json!({"author_id": 1, "text": "Analyst"}))]);
    driver.seed("author_settings", vec![row(json!({"author_id": 1, "theme": "dark"}))]);

    let connection = Connection::new(driver.clone());
    let factory = Factory::new(&connection, "author");
    factory.init_table("author", &["id"], &[]).unwrap();

    let authors = PluginableFactory::new(factory, registry());
    authors.plugin_load(&["bio", "settings"]).unwrap();
    (driver, authors)
}

#[tokio::test]
async fn test_plugins_follow_load_order() {
    let (_driver, authors) = authors();
    let ada = authors.get_one(&json!(1)).await.unwrap();

    let names: Vec<_> = ada.plugins().iter().map(|p| p.name().to_string()).collect();
    assert_eq!(names, vec!["bio", "settings"]);
    assert_eq!(ada.plugin("settings").unwrap().get("theme"), Some(&json!("dark")));
}

#[tokio::test]
async fn test_save_cascades_plugins_before_owner() {
    let (driver, authors) = authors();
    let mut ada = authors.get_one(&json!(1)).await.unwrap();
    ada.set("name", "Ada L.").unwrap();
    ada.plugin_mut("bio").unwrap().set("text", "Mathematician").unwrap();

    driver.clear_log();
    ada.save().await.unwrap();

    let statements = driver.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("UPDATE author_bio"));
    assert!(statements[1].starts_with("UPDATE author "));
}

#[tokio::test]
async fn test_delete_cascade_failure_keeps_owner_row() {
    let (driver, authors) = authors();
    driver.fail_on("author_settings", FailOn::Delete);

    let mut ada = authors.get_one(&json!(1)).await.unwrap();
    let err = ada.delete().await.unwrap_err();
    assert!(matches!(
        err,
        ModelError::Persistence { operation: Operation::Delete, .. }
    ));

    // bio went first; settings failed and stopped the cascade
    assert!(driver.rows("author_bio").is_empty());
    assert_eq!(driver.rows("author_settings").len(), 1);
    assert_eq!(driver.rows("author").len(), 1);
    assert!(!ada.is_deleted());
}

#[tokio::test]
async fn test_delete_cascade() {
    let (driver, authors) = authors();
    let mut ada = authors.get_one(&json!(1)).await.unwrap();
    ada.delete().await.unwrap();

    assert!(driver.rows("author").is_empty());
    assert!(driver.rows("author_bio").is_empty());
    assert!(driver.rows("author_settings").is_empty());
    assert!(matches!(ada.save().await, Err(ModelError::AlreadyDeleted)));
}

#[tokio::test]
async fn test_unloaded_plugin_is_not_joined() {
    let (driver, authors) = authors();
    authors.plugin_unload(Some(&["settings"][..]));

    driver.clear_log();
    let ada = authors.get_one(&json!(1)).await.unwrap();
    assert!(!driver.statements()[0].contains("author_settings"));
    assert!(matches!(
        ada.plugin("settings"),
        Err(ModelError::ExtensionNotLoaded(name)) if name == "settings"
    ));
}

#[tokio::test]
async fn test_plugin_get_loads_temporarily() {
    let (_driver, authors) = authors();
    authors.plugin_unload(None);

    let mut ada = authors.get_one(&json!(1)).await.unwrap();
    assert!(ada.plugins().is_empty());

    let bio = authors.plugin_get("bio", ada.entity()).await.unwrap();
    assert!(bio.is_saved());
    ada.attach(bio).unwrap();
    assert_eq!(ada.plugin("bio").unwrap().get("text"), Some(&json!("Analyst")));
    assert!(!authors.plugin_is_loaded("bio"));
}

#[tokio::test]
async fn test_plugin_with_own_key_is_saved_and_deleted() {
    let (driver, authors) = authors();
    driver.create_table("author_awards", Some("id"));
    driver.seed(
        "author_awards",
        vec![row(json!({"id": 5, "author_id": 1, "title": "Prize"}))],
    );
    authors.plugin_load(&["awards"]).unwrap();

    let mut ada = authors.get_one(&json!(1)).await.unwrap();
    let awards = ada.plugin_mut("awards").unwrap();
    assert_eq!(awards.primary_key(), &PrimaryKey::Single(json!(5)));
    awards.set("title", "Medal").unwrap();

    ada.save().await.unwrap();
    assert_eq!(driver.rows("author_awards")[0]["title"], json!("Medal"));

    ada.delete().await.unwrap();
    assert!(driver.rows("author_awards").is_empty());
    assert!(driver.rows("author").is_empty());
}
