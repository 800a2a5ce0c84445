//! End-to-end tests through the facade crate

use std::sync::Arc;

use stratum::prelude::*;
use stratum::storage_adapter::StorageAdapter;
use stratum::{Config, GroupDef, OptionDef, OptionType, Schema};

fn schema() -> Arc<Schema> {
	let port = OptionDef::builder("port", OptionType::Port).default(json!(22)).build().expect("port");
	let hosts = OptionDef::builder("hosts", OptionType::DomainName).multi().build().expect("hosts");
	let service = GroupDef::builder("ssh").child(port).child(hosts).build().expect("ssh");
	Schema::builder().child(service).build().expect("schema")
}

#[cfg(feature = "memory")]
#[tokio::test]
async fn test_memory_backend() {
	stratum::init_tracing();
	let storage: Arc<dyn StorageAdapter> = Arc::new(stratum::StorageAdapterMemory::new());
	let config = Config::builder(schema(), storage.clone()).session_id("main").build().await.expect("config");

	assert_eq!(config.get("ssh.port").await.expect("get"), json!(22));
	config.set("ssh.port", json!(2222)).await.expect("set");
	config.set("ssh.hosts", json!(["example.org"])).await.expect("set");

	// A second handle over the same session sees the stored values
	let again = Config::builder(config.schema().clone(), storage).session_id("main").build().await.expect("config");
	assert_eq!(again.get("ssh.port").await.expect("get"), json!(2222));
	assert_eq!(again.owner("ssh.hosts").await.expect("owner"), Owner::User);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_backend_persists_committed_writes() {
	let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
	let db_path = temp_dir.path().join("stratum.db");
	let schema = schema();
	{
		let storage: Arc<dyn StorageAdapter> =
			Arc::new(stratum::StorageAdapterSqlite::new(&db_path).await.expect("adapter"));
		let config = Config::builder(schema.clone(), storage).session_id("main").build().await.expect("config");
		config.set("ssh.port", json!(2222)).await.expect("set");
		config.set_information(None, "note", json!("persisted")).await.expect("info");
		// A rejected write leaves nothing behind
		assert!(config.set("ssh.port", json!(70000)).await.is_err());
		assert!(config.set("ssh.hosts", json!(["not a domain!"])).await.is_err());
	}

	let storage: Arc<dyn StorageAdapter> =
		Arc::new(stratum::StorageAdapterSqlite::new(&db_path).await.expect("adapter"));
	let config = Config::builder(schema, storage.clone()).session_id("main").build().await.expect("config");
	assert_eq!(config.get("ssh.port").await.expect("get"), json!(2222));
	assert_eq!(config.get("ssh.hosts").await.expect("get"), json!([]));
	assert_eq!(config.get_information(None, "note", None).await.expect("info"), json!("persisted"));

	let sessions = storage.list_sessions().await.expect("list");
	assert!(sessions.iter().any(|id| id.as_ref() == "main"));
}

// vim: ts=4
