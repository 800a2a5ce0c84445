//! Common test utilities and helpers
//!
//! Shared schema fixtures and a storage wrapper counting value reads.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use stratum_core::{Calculation, Config, GroupDef, OptionDef, OptionType, Param, Schema};
use stratum_storage_adapter_memory::StorageAdapterMemory;
use stratum_types::prelude::*;
use stratum_types::storage_adapter::{
	InformationExport, PropertiesExport, PropertyStore, StorageAdapter, StorageConnection,
	ValuesExport,
};

/// Memory storage counting `get_owner` round-trips
#[derive(Debug, Default)]
pub struct CountingAdapter {
	inner: StorageAdapterMemory,
	reads: Arc<AtomicUsize>,
}

impl CountingAdapter {
	pub fn reads(&self) -> usize {
		self.reads.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl StorageAdapter for CountingAdapter {
	async fn create_session(&self, session_id: &str, delete_old: bool) -> ClResult<()> {
		self.inner.create_session(session_id, delete_old).await
	}

	async fn list_sessions(&self) -> ClResult<Vec<Box<str>>> {
		self.inner.list_sessions().await
	}

	async fn delete_session(&self, session_id: &str) -> ClResult<()> {
		self.inner.delete_session(session_id).await
	}

	async fn connection(&self, session_id: &str) -> ClResult<Box<dyn StorageConnection>> {
		let inner = self.inner.connection(session_id).await?;
		Ok(Box::new(CountingConnection { inner, reads: self.reads.clone() }))
	}
}

#[derive(Debug)]
struct CountingConnection {
	inner: Box<dyn StorageConnection>,
	reads: Arc<AtomicUsize>,
}

#[async_trait]
impl StorageConnection for CountingConnection {
	fn session_id(&self) -> &str {
		self.inner.session_id()
	}

	async fn set_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
		properties: &PropertySet,
	) -> ClResult<()> {
		self.inner.set_properties(store, path, index, properties).await
	}

	async fn get_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<Option<PropertySet>> {
		self.inner.get_properties(store, path, index).await
	}

	async fn del_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<()> {
		self.inner.del_properties(store, path, index).await
	}

	async fn export_properties(&self, store: PropertyStore) -> ClResult<PropertiesExport> {
		self.inner.export_properties(store).await
	}

	async fn import_properties(&self, store: PropertyStore, data: &PropertiesExport) -> ClResult<()> {
		self.inner.import_properties(store, data).await
	}

	async fn set_value(
		&self,
		path: Option<&str>,
		value: &Value,
		owner: &Owner,
		index: Option<Index>,
	) -> ClResult<()> {
		self.inner.set_value(path, value, owner, index).await
	}

	async fn get_owner(
		&self,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<Option<(Owner, Value)>> {
		if path.is_some() {
			self.reads.fetch_add(1, Ordering::SeqCst);
		}
		self.inner.get_owner(path, index).await
	}

	async fn set_owner(&self, path: &str, owner: &Owner, index: Option<Index>) -> ClResult<()> {
		self.inner.set_owner(path, owner, index).await
	}

	async fn has_value(&self, path: &str, index: Option<Index>) -> ClResult<bool> {
		self.inner.has_value(path, index).await
	}

	async fn reset_value(&self, path: &str) -> ClResult<()> {
		self.inner.reset_value(path).await
	}

	async fn reset_value_index(&self, path: &str, index: Index) -> ClResult<()> {
		self.inner.reset_value_index(path, index).await
	}

	async fn reduce_index(&self, path: &str, index: Index) -> ClResult<()> {
		self.inner.reduce_index(path, index).await
	}

	async fn get_max_length(&self, path: &str) -> ClResult<usize> {
		self.inner.get_max_length(path).await
	}

	async fn export_values(&self) -> ClResult<ValuesExport> {
		self.inner.export_values().await
	}

	async fn import_values(&self, data: &ValuesExport) -> ClResult<()> {
		self.inner.import_values(data).await
	}

	async fn set_information(&self, path: Option<&str>, key: &str, value: &Value) -> ClResult<()> {
		self.inner.set_information(path, key, value).await
	}

	async fn get_information(&self, path: Option<&str>, key: &str) -> ClResult<Option<Value>> {
		self.inner.get_information(path, key).await
	}

	async fn del_information(&self, path: Option<&str>, key: &str) -> ClResult<()> {
		self.inner.del_information(path, key).await
	}

	async fn list_information(&self, path: Option<&str>) -> ClResult<Vec<Box<str>>> {
		self.inner.list_information(path).await
	}

	async fn export_information(&self) -> ClResult<InformationExport> {
		self.inner.export_information().await
	}

	async fn import_information(&self, data: &InformationExport) -> ClResult<()> {
		self.inner.import_information(data).await
	}

	async fn commit(&self) -> ClResult<()> {
		self.inner.commit().await
	}
}

pub fn memory() -> Arc<dyn StorageAdapter> {
	Arc::new(StorageAdapterMemory::new())
}

pub async fn create_config(schema: Arc<Schema>) -> Config {
	Config::new(schema, memory()).await.expect("Failed to create config")
}

pub fn str_opt(name: &str) -> OptionDef {
	OptionDef::builder(name, OptionType::Str).build().expect("option")
}

pub fn multi_opt(name: &str) -> OptionDef {
	OptionDef::builder(name, OptionType::Str).multi().build().expect("option")
}

/// Network interface leadership: `ip_admin` leads `netmask_admin`
pub fn interface_schema() -> Arc<Schema> {
	let ip = OptionDef::builder("ip_admin", OptionType::Ip).multi().build().expect("ip");
	let netmask = OptionDef::builder("netmask_admin", OptionType::Netmask).multi().build().expect("netmask");
	let leadership = GroupDef::leadership("ip_admin")
		.child(ip)
		.child(netmask)
		.build()
		.expect("leadership");
	let interface = GroupDef::builder("interface").child(leadership).build().expect("interface");
	Schema::builder().child(interface).build().expect("schema")
}

/// `activate` drives a calculated `disabled` on `service`
pub fn disabled_schema() -> Arc<Schema> {
	let activate = OptionDef::builder("activate", OptionType::Bool).default(json!(true)).build().expect("activate");
	let disabled_if_off = Calculation::new("disabled_if_off", |args| {
		Ok(if args.arg(0) == &json!(false) { json!("disabled") } else { Value::Null })
	})
	.arg(Param::option("activate"))
	.help(|_| Ok(json!("activate is off")));
	let service = OptionDef::builder("service", OptionType::Str)
		.default(json!("ssh"))
		.property_calc(disabled_if_off)
		.build()
		.expect("service");
	Schema::builder().child(activate).child(service).build().expect("schema")
}

// vim: ts=4
