//! SQLite storage adapter tests
//!
//! Covers session lifecycle, transactions and the four per-session stores

use serde_json::json;
use stratum::owner::Owner;
use stratum::props;
use stratum::storage_adapter::{PropertyStore, StorageAdapter};
use stratum_storage_adapter_sqlite::StorageAdapterSqlite;
use tempfile::TempDir;

async fn create_test_adapter() -> (StorageAdapterSqlite, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter = StorageAdapterSqlite::new(temp_dir.path().join("stratum.db"))
		.await
		.expect("Failed to create adapter");
	adapter.create_session("s1", false).await.expect("Failed to create session");
	(adapter, temp_dir)
}

#[tokio::test]
async fn test_session_lifecycle() {
	let (adapter, _temp) = create_test_adapter().await;
	adapter.create_session("s2", false).await.expect("create");
	adapter.create_session("s1", false).await.expect("create again");

	let sessions = adapter.list_sessions().await.expect("list");
	let expected: Vec<Box<str>> = vec!["s1".into(), "s2".into()];
	assert_eq!(sessions, expected);

	adapter.delete_session("s2").await.expect("delete");
	adapter.delete_session("unknown").await.expect("delete unknown");
	assert!(adapter.connection("s2").await.is_err());
}

#[tokio::test]
async fn test_delete_old_session_drops_its_data() {
	let (adapter, _temp) = create_test_adapter().await;
	{
		let conn = adapter.connection("s1").await.expect("conn");
		conn.set_value(Some("a"), &json!("kept"), &Owner::User, None).await.expect("set");
		conn.set_information(None, "doc", &json!("text")).await.expect("set");
		conn.commit().await.expect("commit");
	}

	adapter.create_session("s1", false).await.expect("reuse");
	let conn = adapter.connection("s1").await.expect("conn");
	assert!(conn.has_value("a", None).await.expect("has"));
	drop(conn);

	adapter.create_session("s1", true).await.expect("recreate");
	let conn = adapter.connection("s1").await.expect("conn");
	assert!(!conn.has_value("a", None).await.expect("has"));
	assert_eq!(conn.get_information(None, "doc").await.expect("get"), None);
}

#[tokio::test]
async fn test_uncommitted_writes_are_rolled_back() {
	let (adapter, _temp) = create_test_adapter().await;
	{
		let conn = adapter.connection("s1").await.expect("conn");
		conn.set_value(Some("a"), &json!(1), &Owner::User, None).await.expect("set");
		// Visible inside its own transaction
		assert!(conn.has_value("a", None).await.expect("has"));
	}

	let conn = adapter.connection("s1").await.expect("conn");
	assert!(!conn.has_value("a", None).await.expect("has"));

	conn.set_value(Some("a"), &json!(2), &Owner::User, None).await.expect("set");
	conn.commit().await.expect("commit");
	// The connection stays usable after a commit
	conn.set_value(Some("b"), &json!(3), &Owner::User, None).await.expect("set");
	drop(conn);

	let conn = adapter.connection("s1").await.expect("conn");
	let (_, value) = conn.get_owner(Some("a"), None).await.expect("get").expect("stored");
	assert_eq!(value, json!(2));
	assert!(!conn.has_value("b", None).await.expect("has"));
}

#[tokio::test]
async fn test_properties_and_permissives_are_independent() {
	let (adapter, _temp) = create_test_adapter().await;
	let conn = adapter.connection("s1").await.expect("conn");

	conn.set_properties(PropertyStore::Properties, None, None, &props!["cache", "validator"])
		.await
		.expect("set");
	conn.set_properties(PropertyStore::Properties, Some("a"), Some(1), &props!["hidden", "custom"])
		.await
		.expect("set");
	conn.set_properties(PropertyStore::Permissives, Some("a"), Some(1), &props!["frozen"])
		.await
		.expect("set");

	let props = conn.get_properties(PropertyStore::Properties, Some("a"), Some(1)).await.expect("get");
	assert_eq!(props, Some(props!["hidden", "custom"]));
	let props = conn.get_properties(PropertyStore::Properties, Some("a"), None).await.expect("get");
	assert_eq!(props, None);
	let perms = conn.get_properties(PropertyStore::Permissives, Some("a"), Some(1)).await.expect("get");
	assert_eq!(perms, Some(props!["frozen"]));

	let export = conn.export_properties(PropertyStore::Properties).await.expect("export");
	assert_eq!(export.len(), 2);
	assert_eq!(export.get(&None).and_then(|by_index| by_index.get(&None)), Some(&props!["cache", "validator"]));

	conn.import_properties(PropertyStore::Properties, &Default::default()).await.expect("import");
	let props = conn.get_properties(PropertyStore::Properties, None, None).await.expect("get");
	assert_eq!(props, None);
	// Permissives are untouched by a properties import
	let perms = conn.get_properties(PropertyStore::Permissives, Some("a"), Some(1)).await.expect("get");
	assert_eq!(perms, Some(props!["frozen"]));
}

#[tokio::test]
async fn test_follower_index_operations() {
	let (adapter, _temp) = create_test_adapter().await;
	let conn = adapter.connection("s1").await.expect("conn");

	for (idx, v) in ["x", "y", "z"].iter().enumerate() {
		conn.set_value(Some("l.f"), &json!(v), &Owner::User, Some(idx)).await.expect("set");
	}
	conn.set_value(Some("other"), &json!(1), &Owner::User, None).await.expect("set");
	assert_eq!(conn.get_max_length("l.f").await.expect("len"), 3);
	assert_eq!(conn.get_max_length("other").await.expect("len"), 0);

	conn.reset_value_index("l.f", 0).await.expect("reset");
	conn.reduce_index("l.f", 1).await.expect("reduce");
	conn.reduce_index("l.f", 2).await.expect("reduce");
	assert!(conn.reduce_index("l.f", 0).await.is_err());

	assert_eq!(conn.get_max_length("l.f").await.expect("len"), 2);
	let (owner, value) = conn.get_owner(Some("l.f"), Some(0)).await.expect("get").expect("stored");
	assert_eq!(owner, Owner::User);
	assert_eq!(value, json!("y"));
	assert!(conn.has_value("l.f", None).await.expect("has"));
	assert!(!conn.has_value("l.f", Some(2)).await.expect("has"));

	conn.set_owner("l.f", &Owner::Custom("ops".into()), Some(1)).await.expect("owner");
	let (owner, _) = conn.get_owner(Some("l.f"), Some(1)).await.expect("get").expect("stored");
	assert_eq!(owner, Owner::Custom("ops".into()));
	assert!(conn.set_owner("l.f", &Owner::User, Some(7)).await.is_err());

	conn.reset_value("l.f").await.expect("reset");
	assert!(!conn.has_value("l.f", None).await.expect("has"));
	assert!(conn.has_value("other", None).await.expect("has"));
}

#[tokio::test]
async fn test_values_export_import() {
	let (adapter, _temp) = create_test_adapter().await;
	let conn = adapter.connection("s1").await.expect("conn");
	conn.set_value(Some("a"), &json!({"nested": [1, 2]}), &Owner::User, None).await.expect("set");
	conn.set_value(Some("l.f"), &json!("x"), &Owner::Forced, Some(0)).await.expect("set");
	conn.set_value(None, &json!(null), &Owner::Custom("ops".into()), None).await.expect("set");

	let export = conn.export_values().await.expect("export");
	assert_eq!(export.len(), 3);
	conn.commit().await.expect("commit");
	drop(conn);

	adapter.create_session("s2", false).await.expect("create");
	let conn2 = adapter.connection("s2").await.expect("conn");
	conn2.import_values(&export).await.expect("import");
	let (owner, value) = conn2.get_owner(Some("a"), None).await.expect("get").expect("stored");
	assert_eq!((owner, value), (Owner::User, json!({"nested": [1, 2]})));
	let (owner, _) = conn2.get_owner(Some("l.f"), Some(0)).await.expect("get").expect("stored");
	assert_eq!(owner, Owner::Forced);
	let (owner, _) = conn2.get_owner(None, None).await.expect("get").expect("stored");
	assert_eq!(owner, Owner::Custom("ops".into()));
}

#[tokio::test]
async fn test_information() {
	let (adapter, _temp) = create_test_adapter().await;
	let conn = adapter.connection("s1").await.expect("conn");

	conn.set_information(None, "doc", &json!("context doc")).await.expect("set");
	conn.set_information(Some("a"), "doc", &json!("option doc")).await.expect("set");
	conn.set_information(Some("a"), "doc", &json!("updated")).await.expect("overwrite");

	assert_eq!(conn.get_information(None, "doc").await.expect("get"), Some(json!("context doc")));
	assert_eq!(conn.get_information(Some("a"), "doc").await.expect("get"), Some(json!("updated")));
	let keys: Vec<Box<str>> = vec!["doc".into()];
	assert_eq!(conn.list_information(Some("a")).await.expect("list"), keys);

	let export = conn.export_information().await.expect("export");
	assert_eq!(export.len(), 2);

	conn.del_information(Some("a"), "doc").await.expect("del");
	assert!(conn.del_information(Some("a"), "doc").await.is_err());
	assert_eq!(conn.get_information(Some("a"), "doc").await.expect("get"), None);

	conn.import_information(&export).await.expect("import");
	assert_eq!(conn.get_information(Some("a"), "doc").await.expect("get"), Some(json!("updated")));
}

// vim: ts=4
