use std::sync::Arc;

use elif_dataobject::{prelude::*, FailOn, JoinType, MemoryDriver, ModelError, Row};
use serde_json::{json, Value};

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

fn driver() -> Arc<MemoryDriver> {
    let driver = Arc::new(MemoryDriver::new());
    driver.create_table("product", Some("id"));
    driver.create_table("product_detail", None);
    driver.create_table("product_lang", None);
    driver
}

#[tokio::test]
async fn test_extended_insert_and_read_back() {
    let driver = driver();
    let connection = Connection::new(driver.clone());
    let products: ExtendedFactory = ExtendedFactory::new(&connection, "product");
    products.init_table("product", &["id"], &["id", "sku"]).unwrap();
    products
        .init_extended("product_detail", "product_id", &["weight"])
        .unwrap();

    let key = products
        .insert(row(json!({"sku": "A-1", "_product_detail": {"weight": 12}})))
        .await
        .unwrap();
    assert_eq!(key, json!(1));
    assert_eq!(
        driver.rows("product_detail"),
        vec![row(json!({"product_id": 1, "weight": 12}))]
    );

    let product = products.get_one(&key).await.unwrap();
    assert_eq!(product.get("sku"), Some(&json!("A-1")));
    assert_eq!(product.get_in("product_detail", "weight"), Some(&json!(12)));
}

#[tokio::test]
async fn test_extended_update_writes_auxiliary_first() {
    let driver = driver();
    let connection = Connection::new(driver.clone());
    let products: ExtendedFactory = ExtendedFactory::new(&connection, "product");
    products.init_table("product", &["id"], &["id", "sku"]).unwrap();
    products
        .init_extended("product_detail", "product_id", &["weight"])
        .unwrap();
    let key = products
        .insert(row(json!({"sku": "A-1", "_product_detail": {"weight": 12}})))
        .await
        .unwrap();

    let mut product = products.get_one(&key).await.unwrap();
    product.set_in("product_detail", "weight", 15).unwrap();
    product.set("sku", "A-2").unwrap();

    driver.clear_log();
    product.save().await.unwrap();

    let statements = driver.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("UPDATE product_detail"));
    assert!(statements[1].starts_with("UPDATE product"));
    assert_eq!(driver.rows("product_detail")[0]["weight"], json!(15));
    assert_eq!(driver.rows("product")[0]["sku"], json!("A-2"));
}

#[tokio::test]
async fn test_extended_structure_is_locked() {
    let connection = Connection::new(driver());
    let products: ExtendedFactory = ExtendedFactory::new(&connection, "product");
    products.init_table("product", &["id"], &[]).unwrap();
    products
        .init_extended("product_detail", "product_id", &["weight"])
        .unwrap();

    assert!(matches!(
        products.init_extended("product_detail", "product_id", &["weight"]),
        Err(ModelError::StructureLocked(table)) if table == "product_detail"
    ));
    assert!(matches!(
        products.init_table("product", &["id"], &[]),
        Err(ModelError::StructureLocked(_))
    ));
}

#[tokio::test]
async fn test_extended_delete_removes_auxiliary_rows() {
    let driver = driver();
    let connection = Connection::new(driver.clone());
    let products: ExtendedFactory = ExtendedFactory::new(&connection, "product");
    products.init_table("product", &["id"], &[]).unwrap();
    products
        .init_extended("product_detail", "product_id", &["weight"])
        .unwrap();
    let key = products
        .insert(row(json!({"sku": "A-1", "_product_detail": {"weight": 1}})))
        .await
        .unwrap();

    driver.fail_on("product", FailOn::Delete);
    let mut product = products.get_one(&key).await.unwrap();
    assert!(product.delete().await.is_err());
    assert!(driver.rows("product_detail").is_empty());
    assert_eq!(driver.rows("product").len(), 1);
}

fn localized(driver: Arc<MemoryDriver>) -> (Connection, LocalizedFactory) {
    let connection = Connection::new(driver);
    let products = LocalizedFactory::new(&connection, "product");
    products.init_table("product", &["id"], &["id", "sku"]).unwrap();
    products
        .init_extended("product_lang", "product_id", &["name"])
        .unwrap();
    (connection, products)
}

#[tokio::test]
async fn test_localized_requires_locale() {
    let (_connection, products) = localized(driver());

    assert!(matches!(
        products.get_one(&json!(1)).await,
        Err(ModelError::LocaleNotSet(_))
    ));
    assert!(matches!(
        products.insert(row(json!({"sku": "A"}))).await,
        Err(ModelError::LocaleNotSet(_))
    ));
}

#[tokio::test]
async fn test_localized_join_carries_locale() {
    let driver = driver();
    let (_connection, products) = localized(driver.clone());
    products.set_locale(Some("en"));

    let key = products
        .insert(row(json!({"sku": "A", "_product_lang": {"name": "Chair"}})))
        .await
        .unwrap();
    driver.seed(
        "product_lang",
        vec![row(json!({"product_id": 1, "locale": "fr", "name": "Chaise"}))],
    );

    driver.clear_log();
    let english = products.get_one(&key).await.unwrap();
    assert!(driver.statements()[0].contains("product_lang.locale = 'en'"));
    assert_eq!(english.get_in("product_lang", "name"), Some(&json!("Chair")));

    products.set_locale(Some("fr"));
    let french = products.get_one(&key).await.unwrap();
    assert_eq!(french.get_in("product_lang", "name"), Some(&json!("Chaise")));
}

#[tokio::test]
async fn test_localized_update_is_scoped_to_locale() {
    let driver = driver();
    let (connection, products) = localized(driver.clone());
    connection.set_default_locale(Some("en"));
    assert!(products.is_locale_set());

    driver.seed("product", vec![row(json!({"id": 1, "sku": "A"}))]);
    driver.seed(
        "product_lang",
        vec![
            row(json!({"product_id": 1, "locale": "en", "name": "Chair"})),
            row(json!({"product_id": 1, "locale": "fr", "name": "Chaise"})),
        ],
    );

    let mut product = products.get_one(&json!(1)).await.unwrap();
    product.set_in("product_lang", "name", "Armchair").unwrap();
    product.save().await.unwrap();

    let names: Vec<_> = driver
        .rows("product_lang")
        .iter()
        .map(|r| r["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Armchair"), json!("Chaise")]);
}

#[tokio::test]
async fn test_aggregate_joins_supplier_into_products() {
    let driver = driver();
    driver.create_table("supplier", Some("id"));
    driver.seed("supplier", vec![row(json!({"id": 4, "name": "Acme"}))]);
    driver.seed(
        "product",
        vec![
            row(json!({"id": 1, "sku": "A-1", "supplier_id": 4})),
            row(json!({"id": 2, "sku": "B-2", "supplier_id": null})),
        ],
    );

    let connection = Connection::new(driver.clone());
    let products = Factory::new(&connection, "product");
    products
        .init_table("product", &["id"], &["id", "sku", "supplier_id"])
        .unwrap();
    let suppliers = Factory::new(&connection, "supplier");
    suppliers.init_table("supplier", &["id"], &["id", "name"]).unwrap();

    let select = suppliers
        .aggregate_select(products.select().unwrap(), "product.supplier_id", JoinType::Left)
        .unwrap()
        .order_by(vec![OrderBy::asc("product.id")]);
    let rows = products.fetch(&select).await.unwrap();
    assert_eq!(rows.len(), 2);

    let acme = suppliers.aggregate_object(&rows[0]).unwrap();
    assert_eq!(acme.get("name"), Some(&json!("Acme")));
    assert_eq!(rows[0]["sku"], json!("A-1"));

    assert!(matches!(
        suppliers.aggregate_object(&rows[1]),
        Err(ModelError::NotFound(table)) if table == "supplier"
    ));
}
