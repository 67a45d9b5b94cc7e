mod common;

use common::{init_tracing, new_device_info, new_product_info, new_registry};
use devmesh_error::MeshError;
use devmesh_registry::MemoryCoordination;
use devmesh_sdk::Settings;
use serde_json::{json, Map, Value};

#[tokio::test]
async fn device_config_shadows_product_config() {
    init_tracing();
    let client = MemoryCoordination::new();
    let registry = new_registry(&client, Settings::default());

    let product = registry.get_product("p-cfg");
    product.update(&new_product_info("p-cfg")).await.unwrap();
    product.put("k1", json!("a")).await.unwrap();

    let device = registry
        .register(new_device_info("d5", "p-cfg"))
        .await
        .unwrap();
    device.put("k2", json!("b")).await.unwrap();

    let composed = device.get_many(&["k1", "k2", "k3"]).await.unwrap();
    assert_eq!(composed.len(), 2);
    assert_eq!(composed["k1"], json!("a"));
    assert_eq!(composed["k2"], json!("b"));
    assert!(!composed.contains_key("k3"));

    // Product value until the device writes its own; never a mix.
    assert_eq!(device.get("k1").await.unwrap(), Some(json!("a")));
    device.put("k1", json!("override")).await.unwrap();
    assert_eq!(device.get("k1").await.unwrap(), Some(json!("override")));
    assert_eq!(product.get("k1").await.unwrap(), Some(json!("a")));
}

#[tokio::test]
async fn config_round_trip_removal_and_merge() {
    init_tracing();
    let client = MemoryCoordination::new();
    let registry = new_registry(&client, Settings::default());

    let product = registry.get_product("p-rt");
    product.update(&new_product_info("p-rt")).await.unwrap();
    product.put("test_config", json!("1234")).await.unwrap();
    product.put("test_config__", json!("aaa")).await.unwrap();

    let device = registry
        .register(new_device_info("d-rt", "p-rt"))
        .await
        .unwrap();
    assert_eq!(
        device.get("test_config").await.unwrap(),
        Some(json!("1234"))
    );

    device.put("test_config", json!("2345")).await.unwrap();
    device.put("test_config2", json!(1234)).await.unwrap();
    assert_eq!(
        device.get("test_config").await.unwrap(),
        Some(json!("2345"))
    );

    let composed = device
        .get_many(&["test_config", "test_config__", "test_config2"])
        .await
        .unwrap();
    assert_eq!(composed["test_config"], json!("2345"));
    assert_eq!(composed["test_config2"], json!(1234));
    assert_eq!(composed["test_config__"], json!("aaa"));

    let all = device.get_all().await.unwrap();
    assert_eq!(all["test_config"], json!("2345"));
    assert_eq!(all["test_config2"], json!(1234));
    assert_eq!(all["test_config__"], json!("aaa"));

    // Removing the device value uncovers the product value again.
    assert_eq!(
        device.remove("test_config").await.unwrap(),
        Some(json!("2345"))
    );
    assert_eq!(
        device.get("test_config").await.unwrap(),
        Some(json!("1234"))
    );

    // putAll(getAll()) leaves the merged view unchanged.
    device.put_all(Some(&all)).await.unwrap();
    assert_eq!(device.get_all().await.unwrap(), all);
}

#[tokio::test]
async fn write_boundary_rules() {
    init_tracing();
    let client = MemoryCoordination::new();
    let registry = new_registry(&client, Settings::default());
    let device = registry
        .register(new_device_info("d-bound", "p1"))
        .await
        .unwrap();

    device.put_all(None).await.unwrap();
    device.put_all(Some(&Map::new())).await.unwrap();
    assert!(device.get_all().await.unwrap().is_empty());

    let err = device.put("test", Value::Null).await.unwrap_err();
    assert!(matches!(err, MeshError::IllegalArgument(_)));
}

#[tokio::test]
async fn unregister_clears_device_scope_only() {
    init_tracing();
    let client = MemoryCoordination::new();
    let registry = new_registry(&client, Settings::default());

    let product = registry.get_product("p-keep");
    product.update(&new_product_info("p-keep")).await.unwrap();
    product.put("shared", json!("from-product")).await.unwrap();

    let device = registry
        .register(new_device_info("d-clear", "p-keep"))
        .await
        .unwrap();
    device.put("own", json!("from-device")).await.unwrap();

    registry.unregister("d-clear").await.unwrap();

    let device = registry.get_device("d-clear");
    // Device scope is gone; without a record there is no product fallback.
    assert_eq!(device.get("own").await.unwrap(), None);
    assert_eq!(device.get("shared").await.unwrap(), None);
    // The product scope itself is untouched.
    assert_eq!(
        product.get("shared").await.unwrap(),
        Some(json!("from-product"))
    );
}
