//! Memory storage adapter tests
//!
//! Covers session lifecycle and the four per-session stores

use serde_json::json;
use stratum_storage_adapter_memory::StorageAdapterMemory;
use stratum::owner::Owner;
use stratum::props;
use stratum::storage_adapter::{PropertyStore, StorageAdapter};

async fn create_test_adapter() -> StorageAdapterMemory {
	let adapter = StorageAdapterMemory::new();
	adapter.create_session("s1", false).await.expect("Failed to create session");
	adapter
}

#[tokio::test]
async fn test_session_lifecycle() {
	let adapter = create_test_adapter().await;
	adapter.create_session("s2", false).await.expect("create");
	// Creating an existing session is idempotent
	adapter.create_session("s1", false).await.expect("create again");

	let sessions = adapter.list_sessions().await.expect("list");
	let expected: Vec<Box<str>> = vec!["s1".into(), "s2".into()];
	assert_eq!(sessions, expected);

	adapter.delete_session("s2").await.expect("delete");
	adapter.delete_session("unknown").await.expect("delete unknown");
	assert!(adapter.connection("s2").await.is_err());
}

#[tokio::test]
async fn test_properties_and_permissives_are_independent() {
	let adapter = create_test_adapter().await;
	let conn = adapter.connection("s1").await.expect("conn");

	conn.set_properties(PropertyStore::Properties, Some("a"), None, &props!["hidden"])
		.await
		.expect("set");
	conn.set_properties(PropertyStore::Permissives, Some("a"), None, &props!["frozen"])
		.await
		.expect("set");

	let props = conn.get_properties(PropertyStore::Properties, Some("a"), None).await.expect("get");
	assert_eq!(props, Some(props!["hidden"]));
	let perms = conn.get_properties(PropertyStore::Permissives, Some("a"), None).await.expect("get");
	assert_eq!(perms, Some(props!["frozen"]));

	conn.del_properties(PropertyStore::Properties, Some("a"), None).await.expect("del");
	let props = conn.get_properties(PropertyStore::Properties, Some("a"), None).await.expect("get");
	assert_eq!(props, None);
}

#[tokio::test]
async fn test_follower_index_operations() {
	let adapter = create_test_adapter().await;
	let conn = adapter.connection("s1").await.expect("conn");

	for (idx, v) in ["x", "y", "z"].iter().enumerate() {
		conn.set_value(Some("l.f"), &json!(v), &Owner::User, Some(idx)).await.expect("set");
	}
	assert_eq!(conn.get_max_length("l.f").await.expect("len"), 3);

	conn.reset_value_index("l.f", 0).await.expect("reset");
	conn.reduce_index("l.f", 1).await.expect("reduce");
	conn.reduce_index("l.f", 2).await.expect("reduce");

	assert_eq!(conn.get_max_length("l.f").await.expect("len"), 2);
	let (owner, value) = conn.get_owner(Some("l.f"), Some(0)).await.expect("get").expect("stored");
	assert_eq!(owner, Owner::User);
	assert_eq!(value, json!("y"));
	assert!(conn.has_value("l.f", None).await.expect("has"));
	assert!(!conn.has_value("l.f", Some(2)).await.expect("has"));

	conn.reset_value("l.f").await.expect("reset");
	assert!(!conn.has_value("l.f", None).await.expect("has"));
}

#[tokio::test]
async fn test_values_export_import() {
	let adapter = create_test_adapter().await;
	let conn = adapter.connection("s1").await.expect("conn");
	conn.set_value(Some("a"), &json!(1), &Owner::User, None).await.expect("set");
	conn.set_value(None, &json!(null), &Owner::Custom("ops".into()), None).await.expect("set");

	let export = conn.export_values().await.expect("export");
	assert_eq!(export.len(), 2);

	adapter.create_session("s2", false).await.expect("create");
	let conn2 = adapter.connection("s2").await.expect("conn");
	conn2.import_values(&export).await.expect("import");
	let (owner, value) = conn2.get_owner(Some("a"), None).await.expect("get").expect("stored");
	assert_eq!((owner, value), (Owner::User, json!(1)));
	let (owner, _) = conn2.get_owner(None, None).await.expect("get").expect("stored");
	assert_eq!(owner, Owner::Custom("ops".into()));
}

#[tokio::test]
async fn test_information() {
	let adapter = create_test_adapter().await;
	let conn = adapter.connection("s1").await.expect("conn");

	conn.set_information(None, "doc", &json!("context doc")).await.expect("set");
	conn.set_information(Some("a"), "doc", &json!("option doc")).await.expect("set");

	assert_eq!(
		conn.get_information(None, "doc").await.expect("get"),
		Some(json!("context doc"))
	);
	let keys: Vec<Box<str>> = vec!["doc".into()];
	assert_eq!(conn.list_information(Some("a")).await.expect("list"), keys);

	conn.del_information(Some("a"), "doc").await.expect("del");
	assert!(conn.del_information(Some("a"), "doc").await.is_err());
	assert_eq!(conn.get_information(Some("a"), "doc").await.expect("get"), None);
}

// vim: ts=4
