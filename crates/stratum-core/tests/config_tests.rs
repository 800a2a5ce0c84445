//! Config value, owner, property and session tests

mod common;

use serde_json::json;
use std::sync::Arc;

use common::*;
use stratum_core::{Config, Mode, OptionDef, OptionType, Schema, When};
use stratum_types::prelude::*;
use stratum_types::property::rw_append;
use stratum_types::props;

fn port_schema() -> Arc<Schema> {
	let port = OptionDef::builder("port", OptionType::Port).default(json!(22)).build().expect("port");
	Schema::builder().child(port).child(str_opt("name")).build().expect("schema")
}

#[tokio::test]
async fn test_set_get_reset() {
	let config = create_config(port_schema()).await;

	assert_eq!(config.get("port").await.expect("get"), json!(22));
	assert!(config.is_default("port").await.expect("owner"));

	config.set("port", json!(8080)).await.expect("set");
	assert_eq!(config.get("port").await.expect("get"), json!(8080));
	assert_eq!(config.owner("port").await.expect("owner"), Owner::User);
	assert_eq!(config.default("port").await.expect("default"), json!(22));

	config.reset("port").await.expect("reset");
	assert_eq!(config.get("port").await.expect("get"), json!(22));
	assert_eq!(config.owner("port").await.expect("owner"), Owner::Default);

	// Resetting again changes nothing
	config.reset("port").await.expect("reset twice");
	assert_eq!(config.get("port").await.expect("get"), json!(22));
	assert_eq!(config.owner("port").await.expect("owner"), Owner::Default);
}

#[tokio::test]
async fn test_invalid_values_are_rejected() {
	let config = create_config(port_schema()).await;

	let res = config.set("port", json!(70000)).await;
	assert!(matches!(res, Err(Error::ValueError { .. })));
	let res = config.set("port", json!("ssh")).await;
	assert!(matches!(res, Err(Error::ValueError { .. })));
	assert!(matches!(config.get("unknown").await, Err(Error::ConfigError(_))));
	assert_eq!(config.get("port").await.expect("get"), json!(22));
}

#[tokio::test]
async fn test_rejected_writes_keep_value_and_owner() {
	let config = create_config(port_schema()).await;
	config.set("port", json!(8080)).await.expect("set");

	assert!(config.set("port", json!(70000)).await.is_err());
	assert_eq!(config.get("port").await.expect("get"), json!(8080));
	assert_eq!(config.owner("port").await.expect("owner"), Owner::User);

	// Resetting a mandatory option without default is refused
	let name = OptionDef::builder("name", OptionType::Str).property("mandatory").build().expect("name");
	let schema = Schema::builder().child(name).build().expect("schema");
	let config = create_config(schema).await;
	config.set("name", json!("x")).await.expect("set");
	config.set_context_properties(props!["cache", "validator", "mandatory"]).await.expect("context");

	let err = config.reset("name").await.expect_err("mandatory");
	assert!(err.properties().is_some_and(|p| p.contains(&Property::Mandatory)));
	assert_eq!(config.get("name").await.expect("get"), json!("x"));
	assert_eq!(config.owner("name").await.expect("owner"), Owner::User);
}

#[tokio::test]
async fn test_cache_hit_skips_storage() {
	let storage = Arc::new(CountingAdapter::default());
	let config = Config::new(port_schema(), storage.clone()).await.expect("config");

	assert_eq!(config.get("name").await.expect("get"), Value::Null);
	let reads = storage.reads();
	assert!(reads > 0);
	assert_eq!(config.get("name").await.expect("get"), Value::Null);
	assert_eq!(storage.reads(), reads);

	// A write invalidates the entry, the new value is served again
	config.set("name", json!("box")).await.expect("set");
	assert_eq!(config.get("name").await.expect("get"), json!("box"));

	// Changing context properties drops the cache
	config.add_context_property("expire").await.expect("add");
	let reads = storage.reads();
	assert_eq!(config.get("name").await.expect("get"), json!("box"));
	assert!(storage.reads() > reads);
}

#[tokio::test]
async fn test_mandatory_in_read_only() {
	let name = OptionDef::builder("name", OptionType::Str).property("mandatory").build().expect("name");
	let schema = Schema::builder().child(name).child(str_opt("other")).build().expect("schema");
	let config = create_config(schema).await;

	config.read_write().await.expect("rw");
	assert_eq!(config.get("name").await.expect("get"), Value::Null);
	assert!(config.mandatory_paths().await.expect("mandatory").contains(&"name".to_string()));

	config.read_only().await.expect("ro");
	let err = config.get("name").await.expect_err("mandatory");
	assert!(err.properties().is_some_and(|p| p.contains(&Property::Mandatory)));

	// Frozen context forbids the write that would fix it
	let res = config.set("name", json!("x")).await;
	assert!(res.is_err());

	config.read_write().await.expect("rw");
	config.set("name", json!("x")).await.expect("set");
	config.read_only().await.expect("ro");
	assert_eq!(config.get("name").await.expect("get"), json!("x"));
	assert!(config.mandatory_paths().await.expect("mandatory").is_empty());
}

#[tokio::test]
async fn test_calculated_property_invalidation() {
	let config = create_config(disabled_schema()).await;
	config.read_write().await.expect("rw");

	assert_eq!(config.get("service").await.expect("get"), json!("ssh"));
	config.set("activate", json!(false)).await.expect("set");

	let err = config.get("service").await.expect_err("disabled");
	assert_eq!(err.properties(), Some(&props!["disabled"]));
	assert!(matches!(&err, Error::PropertiesOptionError { help, .. } if help == &["activate is off"]));
	assert!(config.properties("service").await.expect("props").contains(&Property::Disabled));

	config.reset("activate").await.expect("reset");
	assert_eq!(config.get("service").await.expect("get"), json!("ssh"));
}

#[tokio::test]
async fn test_permissive_symmetry() {
	let secret = OptionDef::builder("secret", OptionType::Password).property("hidden").build().expect("secret");
	let schema = Schema::builder().child(secret).build().expect("schema");
	let config = create_config(schema).await;

	config.add_context_property("hidden").await.expect("add");
	assert!(config.get("secret").await.is_err());

	config.add_context_property("permissive").await.expect("add");
	config.add_context_permissive("hidden").await.expect("add permissive");
	assert_eq!(config.get("secret").await.expect("get"), Value::Null);

	config.pop_context_permissive("hidden").await.expect("pop permissive");
	assert!(config.get("secret").await.expect_err("hidden").is_property_error());

	// Option permissives lift the property for that option only
	config.set_permissives("secret", props!["hidden"]).await.expect("set permissives");
	assert_eq!(config.get("secret").await.expect("get"), Value::Null);
	config.reset_permissives("secret").await.expect("reset permissives");
	assert!(config.get("secret").await.is_err());

	let res = config.set_context_permissives(props!["force_store_value"]).await;
	assert!(matches!(res, Err(Error::ConfigError(_))));
}

#[tokio::test]
async fn test_option_properties() {
	let config = create_config(port_schema()).await;
	config.read_write().await.expect("rw");

	config.add_property("name", "hidden").await.expect("add");
	config.add_property("name", "my_flag").await.expect("add");
	assert_eq!(config.properties("name").await.expect("props"), props!["hidden", "my_flag"]);
	assert!(config.get("name").await.expect_err("hidden").is_property_error());

	config.pop_property("name", "hidden").await.expect("pop");
	assert_eq!(config.get("name").await.expect("get"), Value::Null);

	config.reset_properties("name").await.expect("reset");
	assert!(config.properties("name").await.expect("props").is_empty());

	let res = config.add_property("name", "force_store_value").await;
	assert!(matches!(res, Err(Error::ConfigError(_))));
}

#[tokio::test]
async fn test_context_properties_and_modes() {
	let config = create_config(port_schema()).await;
	assert_eq!(config.context_properties().await.expect("props"), props!["cache", "validator", "warnings"]);

	let res = config.add_context_property("force_store_value").await;
	assert!(matches!(res, Err(Error::ConfigError(_))));

	config.read_write().await.expect("rw");
	let props = config.context_properties().await.expect("props");
	assert!(props.contains(&Property::ForceStoreValue));
	assert!(props.contains(&Property::Hidden));
	assert_eq!(config.context_permissives().await.expect("perms"), props!["hidden"]);

	config.pop_context_property("hidden").await.expect("pop");
	assert!(!config.context_properties().await.expect("props").contains(&Property::Hidden));

	config.reset_context_properties().await.expect("reset");
	assert_eq!(config.context_properties().await.expect("props"), props!["cache", "validator", "warnings"]);
	config.reset_context_permissives().await.expect("reset perms");
	assert!(config.context_permissives().await.expect("perms").is_empty());

	assert_eq!(config.mode_properties(Mode::ReadWrite, When::Append), rw_append());
	config.set_mode_properties(Mode::ReadWrite, When::Append, props!["frozen"]);
	assert_eq!(config.mode_properties(Mode::ReadWrite, When::Append), props!["frozen"]);
}

#[tokio::test]
async fn test_frozen_option() {
	let name = OptionDef::builder("name", OptionType::Str).property("frozen").build().expect("name");
	let schema = Schema::builder().child(name).build().expect("schema");
	let config = create_config(schema).await;

	config.set("name", json!("before")).await.expect("set");
	config.add_context_property("frozen").await.expect("freeze");
	let err = config.set("name", json!("after")).await.expect_err("frozen");
	assert!(err.properties().is_some_and(|p| p.contains(&Property::Frozen)));
	assert_eq!(config.get("name").await.expect("get"), json!("before"));

	// permissive + frozen permissive lifts it
	config.add_context_property("permissive").await.expect("add");
	config.add_context_permissive("frozen").await.expect("permit");
	config.set("name", json!("after")).await.expect("set");
	assert_eq!(config.get("name").await.expect("get"), json!("after"));
}

#[tokio::test]
async fn test_owners() {
	let config = create_config(port_schema()).await;
	assert_eq!(config.context_owner().await.expect("owner"), Owner::User);

	let res = config.set_owner("port", "admin").await;
	assert!(matches!(res, Err(Error::ConfigError(_))));

	config.set("port", json!(2222)).await.expect("set");
	config.set_owner("port", "admin").await.expect("set owner");
	assert_eq!(config.owner("port").await.expect("owner"), Owner::Custom("admin".into()));
	assert!(config.set_owner("port", "forced").await.is_err());
	assert!(config.set_owner("port", "default").await.is_err());

	config.set_context_owner("deployer").await.expect("context owner");
	config.set("name", json!("srv")).await.expect("set");
	assert_eq!(config.owner("name").await.expect("owner"), Owner::Custom("deployer".into()));
	assert!(config.set_context_owner("default").await.is_err());
}

#[tokio::test]
async fn test_information() {
	let config = create_config(port_schema()).await;

	config.set_information(None, "doc", json!("demo")).await.expect("set");
	config.set_information(Some("port"), "unit", json!("tcp")).await.expect("set");
	assert_eq!(config.get_information(None, "doc", None).await.expect("get"), json!("demo"));
	assert_eq!(config.get_information(Some("port"), "unit", None).await.expect("get"), json!("tcp"));
	assert_eq!(config.get_information(None, "missing", Some(json!(1))).await.expect("get"), json!(1));
	assert!(matches!(config.get_information(None, "missing", None).await, Err(Error::NotFound)));

	let keys = config.list_information(None).await.expect("list");
	assert_eq!(keys, vec![Box::<str>::from("doc")]);
	config.del_information(None, "doc").await.expect("del");
	assert!(config.list_information(None).await.expect("list").is_empty());

	let res = config.set_information(Some("nope"), "k", json!(1)).await;
	assert!(matches!(res, Err(Error::ConfigError(_))));
}

#[tokio::test]
async fn test_export_import_round_trip() {
	let config = create_config(port_schema()).await;
	config.set("port", json!(443)).await.expect("set");
	config.set_owner("port", "ops").await.expect("owner");
	config.add_property("name", "my_flag").await.expect("prop");
	config.set_permissives("name", props!["hidden"]).await.expect("perm");
	config.set_information(None, "doc", json!("copy me")).await.expect("info");

	let copy = config.duplicate(Some("copy")).await.expect("duplicate");
	assert_eq!(copy.session_id(), "copy");
	assert_eq!(copy.get("port").await.expect("get"), json!(443));
	assert_eq!(copy.owner("port").await.expect("owner"), Owner::Custom("ops".into()));
	assert_eq!(copy.properties("name").await.expect("props"), config.properties("name").await.expect("props"));
	assert_eq!(copy.permissives("name").await.expect("perms"), props!["hidden"]);
	assert_eq!(copy.get_information(None, "doc", None).await.expect("info"), json!("copy me"));

	// The copy is independent
	copy.set("port", json!(80)).await.expect("set");
	assert_eq!(config.get("port").await.expect("get"), json!(443));

	let data = config.export().await.expect("export");
	copy.import(&data).await.expect("import");
	assert_eq!(copy.get("port").await.expect("get"), json!(443));
}

#[tokio::test]
async fn test_session_reuse() {
	let storage = memory();
	let config = Config::builder(port_schema(), storage.clone()).session_id("s1").build().await.expect("config");
	config.set("port", json!(2022)).await.expect("set");

	let reopened = Config::builder(port_schema(), storage.clone()).session_id("s1").build().await.expect("reopen");
	assert_eq!(reopened.get("port").await.expect("get"), json!(2022));

	let fresh = Config::builder(port_schema(), storage)
		.session_id("s1")
		.delete_old(true)
		.build()
		.await
		.expect("fresh");
	assert_eq!(fresh.get("port").await.expect("get"), json!(22));
}

#[tokio::test]
async fn test_dict() {
	let config = create_config(disabled_schema()).await;
	config.read_write().await.expect("rw");
	config.set("activate", json!(false)).await.expect("set");

	let dict = config.dict().await.expect("dict");
	assert_eq!(dict.get("activate"), Some(&json!(false)));
	// Disabled options are left out
	assert!(!dict.contains_key("service"));
}

// vim: ts=4
