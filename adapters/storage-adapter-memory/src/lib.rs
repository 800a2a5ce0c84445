//! In-memory storage adapter.
//!
//! Sessions live in a process-wide map guarded by a `parking_lot` lock.
//! Writes are applied immediately, so `commit` has nothing to do and a
//! dropped connection keeps what it wrote.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use stratum::{
	prelude::*,
	storage_adapter::{
		InformationExport, PropertiesExport, PropertyStore, StorageAdapter, StorageConnection,
		ValuesExport,
	},
};

type Key = (Option<Box<str>>, Option<Index>);

#[derive(Debug, Default, Clone)]
struct SessionData {
	properties: HashMap<Key, PropertySet>,
	permissives: HashMap<Key, PropertySet>,
	/// Ordered so that all indices of one path are adjacent
	values: BTreeMap<Key, (Owner, Value)>,
	information: HashMap<Option<Box<str>>, BTreeMap<Box<str>, Value>>,
}

impl SessionData {
	fn store(&self, store: PropertyStore) -> &HashMap<Key, PropertySet> {
		match store {
			PropertyStore::Properties => &self.properties,
			PropertyStore::Permissives => &self.permissives,
		}
	}

	fn store_mut(&mut self, store: PropertyStore) -> &mut HashMap<Key, PropertySet> {
		match store {
			PropertyStore::Properties => &mut self.properties,
			PropertyStore::Permissives => &mut self.permissives,
		}
	}

	fn path_keys(&self, path: &str) -> Vec<Key> {
		self.values.keys().filter(|(p, _)| p.as_deref() == Some(path)).cloned().collect()
	}
}

type Sessions = Arc<RwLock<HashMap<Box<str>, SessionData>>>;

#[derive(Debug, Default, Clone)]
pub struct StorageAdapterMemory {
	sessions: Sessions,
}

impl StorageAdapterMemory {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageAdapter for StorageAdapterMemory {
	async fn create_session(&self, session_id: &str, delete_old: bool) -> ClResult<()> {
		let mut sessions = self.sessions.write();
		if delete_old {
			sessions.remove(session_id);
		}
		sessions.entry(session_id.into()).or_default();
		debug!("memory session created: {}", session_id);
		Ok(())
	}

	async fn list_sessions(&self) -> ClResult<Vec<Box<str>>> {
		let mut ids: Vec<Box<str>> = self.sessions.read().keys().cloned().collect();
		ids.sort();
		Ok(ids)
	}

	async fn delete_session(&self, session_id: &str) -> ClResult<()> {
		self.sessions.write().remove(session_id);
		Ok(())
	}

	async fn connection(&self, session_id: &str) -> ClResult<Box<dyn StorageConnection>> {
		if !self.sessions.read().contains_key(session_id) {
			warn!("memory session not found: {}", session_id);
			return Err(Error::NotFound);
		}
		Ok(Box::new(MemoryConnection {
			sessions: self.sessions.clone(),
			session_id: session_id.into(),
		}))
	}
}

#[derive(Debug)]
pub struct MemoryConnection {
	sessions: Sessions,
	session_id: Box<str>,
}

impl MemoryConnection {
	fn read<T>(&self, f: impl FnOnce(&SessionData) -> T) -> ClResult<T> {
		let sessions = self.sessions.read();
		let data = sessions.get(&self.session_id).ok_or(Error::NotFound)?;
		Ok(f(data))
	}

	fn write<T>(&self, f: impl FnOnce(&mut SessionData) -> T) -> ClResult<T> {
		let mut sessions = self.sessions.write();
		let data = sessions.get_mut(&self.session_id).ok_or(Error::NotFound)?;
		Ok(f(data))
	}
}

fn key(path: Option<&str>, index: Option<Index>) -> Key {
	(path.map(Into::into), index)
}

#[async_trait]
impl StorageConnection for MemoryConnection {
	fn session_id(&self) -> &str {
		&self.session_id
	}

	// Properties and permissives
	//****************************
	async fn set_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
		properties: &PropertySet,
	) -> ClResult<()> {
		self.write(|data| {
			data.store_mut(store).insert(key(path, index), properties.clone());
		})
	}

	async fn get_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<Option<PropertySet>> {
		self.read(|data| data.store(store).get(&key(path, index)).cloned())
	}

	async fn del_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<()> {
		self.write(|data| {
			data.store_mut(store).remove(&key(path, index));
		})
	}

	async fn export_properties(&self, store: PropertyStore) -> ClResult<PropertiesExport> {
		self.read(|data| {
			let mut res = PropertiesExport::new();
			for ((path, index), props) in data.store(store) {
				res.entry(path.clone()).or_default().insert(*index, props.clone());
			}
			res
		})
	}

	async fn import_properties(&self, store: PropertyStore, export: &PropertiesExport) -> ClResult<()> {
		self.write(|data| {
			let target = data.store_mut(store);
			target.clear();
			for (path, by_index) in export {
				for (index, props) in by_index {
					target.insert((path.clone(), *index), props.clone());
				}
			}
		})
	}

	// Values and owners
	//*******************
	async fn set_value(
		&self,
		path: Option<&str>,
		value: &Value,
		owner: &Owner,
		index: Option<Index>,
	) -> ClResult<()> {
		self.write(|data| {
			data.values.insert(key(path, index), (owner.clone(), value.clone()));
		})
	}

	async fn get_owner(
		&self,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<Option<(Owner, Value)>> {
		self.read(|data| data.values.get(&key(path, index)).cloned())
	}

	async fn set_owner(&self, path: &str, owner: &Owner, index: Option<Index>) -> ClResult<()> {
		self.write(|data| match data.values.get_mut(&key(Some(path), index)) {
			Some(entry) => {
				entry.0 = owner.clone();
				Ok(())
			}
			None => Err(Error::NotFound),
		})?
	}

	async fn has_value(&self, path: &str, index: Option<Index>) -> ClResult<bool> {
		self.read(|data| match index {
			Some(idx) => data.values.contains_key(&key(Some(path), Some(idx))),
			None => data.values.keys().any(|(p, _)| p.as_deref() == Some(path)),
		})
	}

	async fn reset_value(&self, path: &str) -> ClResult<()> {
		self.write(|data| {
			for k in data.path_keys(path) {
				data.values.remove(&k);
			}
		})
	}

	async fn reset_value_index(&self, path: &str, index: Index) -> ClResult<()> {
		self.write(|data| {
			data.values.remove(&key(Some(path), Some(index)));
		})
	}

	async fn reduce_index(&self, path: &str, index: Index) -> ClResult<()> {
		if index == 0 {
			return Err(Error::IndexError(format!("cannot reduce index 0 of \"{}\"", path)));
		}
		self.write(|data| {
			if let Some(entry) = data.values.remove(&key(Some(path), Some(index))) {
				data.values.insert(key(Some(path), Some(index - 1)), entry);
			}
		})
	}

	async fn get_max_length(&self, path: &str) -> ClResult<usize> {
		self.read(|data| {
			data.values
				.keys()
				.filter(|(p, _)| p.as_deref() == Some(path))
				.filter_map(|(_, idx)| idx.map(|i| i + 1))
				.max()
				.unwrap_or(0)
		})
	}

	async fn export_values(&self) -> ClResult<ValuesExport> {
		self.read(|data| {
			let mut res = ValuesExport::default();
			for ((path, index), (owner, value)) in &data.values {
				res.push(path.clone(), *index, value.clone(), owner.clone());
			}
			res
		})
	}

	async fn import_values(&self, export: &ValuesExport) -> ClResult<()> {
		let rows: Vec<(Key, (Owner, Value))> = export
			.rows()?
			.map(|(path, index, value, owner)| (key(path, index), (owner.clone(), value.clone())))
			.collect();
		self.write(|data| {
			data.values = rows.into_iter().collect();
		})
	}

	// Information
	//*************
	async fn set_information(&self, path: Option<&str>, key: &str, value: &Value) -> ClResult<()> {
		self.write(|data| {
			data.information
				.entry(path.map(Into::into))
				.or_default()
				.insert(key.into(), value.clone());
		})
	}

	async fn get_information(&self, path: Option<&str>, key: &str) -> ClResult<Option<Value>> {
		self.read(|data| {
			data.information.get(&path.map(Into::into)).and_then(|infos| infos.get(key)).cloned()
		})
	}

	async fn del_information(&self, path: Option<&str>, key: &str) -> ClResult<()> {
		self.write(|data| {
			data.information
				.get_mut(&path.map(Into::into))
				.and_then(|infos| infos.remove(key))
				.map(|_| ())
				.ok_or(Error::NotFound)
		})?
	}

	async fn list_information(&self, path: Option<&str>) -> ClResult<Vec<Box<str>>> {
		self.read(|data| {
			data.information
				.get(&path.map(Into::into))
				.map(|infos| infos.keys().cloned().collect())
				.unwrap_or_default()
		})
	}

	async fn export_information(&self) -> ClResult<InformationExport> {
		self.read(|data| data.information.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
	}

	async fn import_information(&self, export: &InformationExport) -> ClResult<()> {
		self.write(|data| {
			data.information = export.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
		})
	}

	async fn commit(&self) -> ClResult<()> {
		Ok(())
	}
}

// vim: ts=4
