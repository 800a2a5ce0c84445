//! SQLite storage adapter.
//!
//! Each connection runs inside one transaction. `commit` makes its writes
//! durable and opens a fresh transaction; dropping an uncommitted
//! connection rolls its writes back.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

mod schema;

use async_trait::async_trait;
use sqlx::{
	Row, Sqlite, Transaction,
	sqlite::{self, SqlitePool, SqliteRow},
};
use std::{fmt, path::Path, time::Duration};
use tokio::sync::{Mutex, MutexGuard};

use stratum::{
	prelude::*,
	storage_adapter::{
		InformationExport, PropertiesExport, PropertyStore, StorageAdapter, StorageConnection,
		ValuesExport,
	},
};

const MAX_CONNECTIONS: u32 = 8;

// Helper functions
//******************
fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

fn db_err(err: sqlx::Error) -> Error {
	inspect(&err);
	Error::DbError
}

/// Context-level entries are stored with an empty path
fn db_path(path: Option<&str>) -> &str {
	path.unwrap_or("")
}

fn from_db_path(path: String) -> Option<Box<str>> {
	if path.is_empty() { None } else { Some(path.into_boxed_str()) }
}

/// Entries without index are stored at `-1`
fn db_idx(index: Option<Index>) -> ClResult<i64> {
	match index {
		Some(idx) => i64::try_from(idx).map_err(|_| Error::IndexError(format!("index {} is too large", idx))),
		None => Ok(-1),
	}
}

fn from_db_idx(idx: i64) -> Option<Index> {
	Index::try_from(idx).ok()
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> ClResult<String> {
	serde_json::to_string(value).map_err(|err| {
		warn!("DB: cannot encode JSON: {}", err);
		Error::DbError
	})
}

fn json_col<T: serde::de::DeserializeOwned>(row: &SqliteRow, col: &str) -> ClResult<T> {
	let raw: String = row.try_get(col).map_err(db_err)?;
	serde_json::from_str(&raw).map_err(|err| {
		warn!("DB: invalid JSON in column {}: {}", col, err);
		Error::DbError
	})
}

fn str_col(row: &SqliteRow, col: &str) -> ClResult<String> {
	row.try_get(col).map_err(db_err)
}

fn idx_col(row: &SqliteRow) -> ClResult<Option<Index>> {
	let idx: i64 = row.try_get("idx").map_err(db_err)?;
	Ok(from_db_idx(idx))
}

type TxGuard<'a> = MutexGuard<'a, Option<Transaction<'static, Sqlite>>>;

fn conn<'a>(guard: &'a mut TxGuard<'_>) -> ClResult<&'a mut sqlx::SqliteConnection> {
	guard.as_mut().map(|tx| &mut **tx).ok_or(Error::DbError)
}

#[derive(Debug, Clone)]
pub struct StorageAdapterSqlite {
	db: SqlitePool,
}

impl StorageAdapterSqlite {
	/// Open (or create) the database file at `path`
	pub async fn new(path: impl AsRef<Path>) -> ClResult<Self> {
		let opts = sqlite::SqliteConnectOptions::new()
			.filename(path.as_ref())
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal)
			.busy_timeout(Duration::from_secs(5));
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(MAX_CONNECTIONS)
			.connect_with(opts)
			.await
			.map_err(db_err)?;

		schema::init_db(&db).await.map_err(db_err)?;
		info!("sqlite storage opened: {}", path.as_ref().display());

		Ok(Self { db })
	}

	async fn session_exists(&self, session_id: &str) -> ClResult<bool> {
		let row = sqlx::query("SELECT 1 FROM sessions WHERE session_id = ?1")
			.bind(session_id)
			.fetch_optional(&self.db)
			.await
			.map_err(db_err)?;
		Ok(row.is_some())
	}
}

#[async_trait]
impl StorageAdapter for StorageAdapterSqlite {
	async fn create_session(&self, session_id: &str, delete_old: bool) -> ClResult<()> {
		if delete_old {
			self.delete_session(session_id).await?;
		}
		sqlx::query("INSERT OR IGNORE INTO sessions (session_id) VALUES (?1)")
			.bind(session_id)
			.execute(&self.db)
			.await
			.map_err(db_err)?;
		debug!("sqlite session created: {}", session_id);
		Ok(())
	}

	async fn list_sessions(&self) -> ClResult<Vec<Box<str>>> {
		let rows = sqlx::query("SELECT session_id FROM sessions ORDER BY session_id")
			.fetch_all(&self.db)
			.await
			.map_err(db_err)?;
		rows.iter().map(|row| str_col(row, "session_id").map(String::into_boxed_str)).collect()
	}

	async fn delete_session(&self, session_id: &str) -> ClResult<()> {
		let mut tx = self.db.begin().await.map_err(db_err)?;
		for table in ["properties", "vals", "information", "sessions"] {
			sqlx::query(&format!("DELETE FROM {} WHERE session_id = ?1", table))
				.bind(session_id)
				.execute(&mut *tx)
				.await
				.map_err(db_err)?;
		}
		tx.commit().await.map_err(db_err)?;
		debug!("sqlite session deleted: {}", session_id);
		Ok(())
	}

	async fn connection(&self, session_id: &str) -> ClResult<Box<dyn StorageConnection>> {
		if !self.session_exists(session_id).await? {
			warn!("sqlite session not found: {}", session_id);
			return Err(Error::NotFound);
		}
		let tx = self.db.begin().await.map_err(db_err)?;
		Ok(Box::new(SqliteStorageConnection {
			db: self.db.clone(),
			session_id: session_id.into(),
			tx: Mutex::new(Some(tx)),
		}))
	}
}

pub struct SqliteStorageConnection {
	db: SqlitePool,
	session_id: Box<str>,
	tx: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl fmt::Debug for SqliteStorageConnection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SqliteStorageConnection").field("session_id", &self.session_id).finish()
	}
}

impl SqliteStorageConnection {
	/// Lock the transaction, opening a new one after a commit
	async fn lock(&self) -> ClResult<TxGuard<'_>> {
		let mut guard = self.tx.lock().await;
		if guard.is_none() {
			*guard = Some(self.db.begin().await.map_err(db_err)?);
		}
		Ok(guard)
	}

	async fn clear(&self, table: &str, store: Option<PropertyStore>) -> ClResult<()> {
		let mut guard = self.lock().await?;
		let res = match store {
			Some(store) => {
				sqlx::query(&format!("DELETE FROM {} WHERE session_id = ?1 AND store = ?2", table))
					.bind(&*self.session_id)
					.bind(store.as_str())
					.execute(conn(&mut guard)?)
					.await
			}
			None => {
				sqlx::query(&format!("DELETE FROM {} WHERE session_id = ?1", table))
					.bind(&*self.session_id)
					.execute(conn(&mut guard)?)
					.await
			}
		};
		res.map_err(db_err)?;
		Ok(())
	}
}

#[async_trait]
impl StorageConnection for SqliteStorageConnection {
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
		let props = to_json(properties)?;
		let mut guard = self.lock().await?;
		sqlx::query(
			"INSERT INTO properties (session_id, store, path, idx, properties) VALUES (?1, ?2, ?3, ?4, ?5)
			ON CONFLICT(session_id, store, path, idx) DO UPDATE SET properties = excluded.properties",
		)
		.bind(&*self.session_id)
		.bind(store.as_str())
		.bind(db_path(path))
		.bind(db_idx(index)?)
		.bind(props)
		.execute(conn(&mut guard)?)
		.await
		.map_err(db_err)?;
		Ok(())
	}

	async fn get_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<Option<PropertySet>> {
		let mut guard = self.lock().await?;
		let row = sqlx::query(
			"SELECT properties FROM properties WHERE session_id = ?1 AND store = ?2 AND path = ?3 AND idx = ?4",
		)
		.bind(&*self.session_id)
		.bind(store.as_str())
		.bind(db_path(path))
		.bind(db_idx(index)?)
		.fetch_optional(conn(&mut guard)?)
		.await
		.map_err(db_err)?;
		row.map(|row| json_col(&row, "properties")).transpose()
	}

	async fn del_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<()> {
		let mut guard = self.lock().await?;
		sqlx::query("DELETE FROM properties WHERE session_id = ?1 AND store = ?2 AND path = ?3 AND idx = ?4")
			.bind(&*self.session_id)
			.bind(store.as_str())
			.bind(db_path(path))
			.bind(db_idx(index)?)
			.execute(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		Ok(())
	}

	async fn export_properties(&self, store: PropertyStore) -> ClResult<PropertiesExport> {
		let mut guard = self.lock().await?;
		let rows = sqlx::query(
			"SELECT path, idx, properties FROM properties WHERE session_id = ?1 AND store = ?2 ORDER BY path, idx",
		)
		.bind(&*self.session_id)
		.bind(store.as_str())
		.fetch_all(conn(&mut guard)?)
		.await
		.map_err(db_err)?;

		let mut res = PropertiesExport::new();
		for row in &rows {
			let path = from_db_path(str_col(row, "path")?);
			res.entry(path).or_default().insert(idx_col(row)?, json_col(row, "properties")?);
		}
		Ok(res)
	}

	async fn import_properties(&self, store: PropertyStore, data: &PropertiesExport) -> ClResult<()> {
		self.clear("properties", Some(store)).await?;
		for (path, by_index) in data {
			for (index, props) in by_index {
				self.set_properties(store, path.as_deref(), *index, props).await?;
			}
		}
		Ok(())
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
		let value = to_json(value)?;
		let mut guard = self.lock().await?;
		sqlx::query(
			"INSERT INTO vals (session_id, path, idx, value, owner) VALUES (?1, ?2, ?3, ?4, ?5)
			ON CONFLICT(session_id, path, idx) DO UPDATE SET value = excluded.value, owner = excluded.owner",
		)
		.bind(&*self.session_id)
		.bind(db_path(path))
		.bind(db_idx(index)?)
		.bind(value)
		.bind(owner.as_str())
		.execute(conn(&mut guard)?)
		.await
		.map_err(db_err)?;
		Ok(())
	}

	async fn get_owner(
		&self,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<Option<(Owner, Value)>> {
		let mut guard = self.lock().await?;
		let row = sqlx::query("SELECT value, owner FROM vals WHERE session_id = ?1 AND path = ?2 AND idx = ?3")
			.bind(&*self.session_id)
			.bind(db_path(path))
			.bind(db_idx(index)?)
			.fetch_optional(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		match row {
			Some(row) => Ok(Some((Owner::from(str_col(&row, "owner")?), json_col(&row, "value")?))),
			None => Ok(None),
		}
	}

	async fn set_owner(&self, path: &str, owner: &Owner, index: Option<Index>) -> ClResult<()> {
		let mut guard = self.lock().await?;
		let res = sqlx::query("UPDATE vals SET owner = ?4 WHERE session_id = ?1 AND path = ?2 AND idx = ?3")
			.bind(&*self.session_id)
			.bind(path)
			.bind(db_idx(index)?)
			.bind(owner.as_str())
			.execute(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		if res.rows_affected() == 0 {
			return Err(Error::NotFound);
		}
		Ok(())
	}

	async fn has_value(&self, path: &str, index: Option<Index>) -> ClResult<bool> {
		let mut guard = self.lock().await?;
		let row = match index {
			Some(_) => {
				sqlx::query("SELECT 1 FROM vals WHERE session_id = ?1 AND path = ?2 AND idx = ?3")
					.bind(&*self.session_id)
					.bind(path)
					.bind(db_idx(index)?)
					.fetch_optional(conn(&mut guard)?)
					.await
			}
			None => {
				sqlx::query("SELECT 1 FROM vals WHERE session_id = ?1 AND path = ?2 LIMIT 1")
					.bind(&*self.session_id)
					.bind(path)
					.fetch_optional(conn(&mut guard)?)
					.await
			}
		}
		.map_err(db_err)?;
		Ok(row.is_some())
	}

	async fn reset_value(&self, path: &str) -> ClResult<()> {
		let mut guard = self.lock().await?;
		sqlx::query("DELETE FROM vals WHERE session_id = ?1 AND path = ?2")
			.bind(&*self.session_id)
			.bind(path)
			.execute(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		Ok(())
	}

	async fn reset_value_index(&self, path: &str, index: Index) -> ClResult<()> {
		let mut guard = self.lock().await?;
		sqlx::query("DELETE FROM vals WHERE session_id = ?1 AND path = ?2 AND idx = ?3")
			.bind(&*self.session_id)
			.bind(path)
			.bind(db_idx(Some(index))?)
			.execute(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		Ok(())
	}

	async fn reduce_index(&self, path: &str, index: Index) -> ClResult<()> {
		if index == 0 {
			return Err(Error::IndexError(format!("cannot reduce index 0 of \"{}\"", path)));
		}
		let mut guard = self.lock().await?;
		// A value already stored at the target index is replaced
		sqlx::query("UPDATE OR REPLACE vals SET idx = ?4 WHERE session_id = ?1 AND path = ?2 AND idx = ?3")
			.bind(&*self.session_id)
			.bind(path)
			.bind(db_idx(Some(index))?)
			.bind(db_idx(Some(index - 1))?)
			.execute(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		Ok(())
	}

	async fn get_max_length(&self, path: &str) -> ClResult<usize> {
		let mut guard = self.lock().await?;
		let row = sqlx::query("SELECT MAX(idx) AS max_idx FROM vals WHERE session_id = ?1 AND path = ?2 AND idx >= 0")
			.bind(&*self.session_id)
			.bind(path)
			.fetch_one(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		let max_idx: Option<i64> = row.try_get("max_idx").map_err(db_err)?;
		Ok(max_idx.and_then(from_db_idx).map_or(0, |idx| idx + 1))
	}

	async fn export_values(&self) -> ClResult<ValuesExport> {
		let mut guard = self.lock().await?;
		let rows = sqlx::query("SELECT path, idx, value, owner FROM vals WHERE session_id = ?1 ORDER BY path, idx")
			.bind(&*self.session_id)
			.fetch_all(conn(&mut guard)?)
			.await
			.map_err(db_err)?;

		let mut res = ValuesExport::default();
		for row in &rows {
			res.push(
				from_db_path(str_col(row, "path")?),
				idx_col(row)?,
				json_col(row, "value")?,
				Owner::from(str_col(row, "owner")?),
			);
		}
		Ok(res)
	}

	async fn import_values(&self, data: &ValuesExport) -> ClResult<()> {
		let rows = data.rows()?;
		self.clear("vals", None).await?;
		for (path, index, value, owner) in rows {
			self.set_value(path, value, owner, index).await?;
		}
		Ok(())
	}

	// Information
	//*************
	async fn set_information(&self, path: Option<&str>, key: &str, value: &Value) -> ClResult<()> {
		let value = to_json(value)?;
		let mut guard = self.lock().await?;
		sqlx::query(
			"INSERT INTO information (session_id, path, key, value) VALUES (?1, ?2, ?3, ?4)
			ON CONFLICT(session_id, path, key) DO UPDATE SET value = excluded.value",
		)
		.bind(&*self.session_id)
		.bind(db_path(path))
		.bind(key)
		.bind(value)
		.execute(conn(&mut guard)?)
		.await
		.map_err(db_err)?;
		Ok(())
	}

	async fn get_information(&self, path: Option<&str>, key: &str) -> ClResult<Option<Value>> {
		let mut guard = self.lock().await?;
		let row = sqlx::query("SELECT value FROM information WHERE session_id = ?1 AND path = ?2 AND key = ?3")
			.bind(&*self.session_id)
			.bind(db_path(path))
			.bind(key)
			.fetch_optional(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		row.map(|row| json_col(&row, "value")).transpose()
	}

	async fn del_information(&self, path: Option<&str>, key: &str) -> ClResult<()> {
		let mut guard = self.lock().await?;
		let res = sqlx::query("DELETE FROM information WHERE session_id = ?1 AND path = ?2 AND key = ?3")
			.bind(&*self.session_id)
			.bind(db_path(path))
			.bind(key)
			.execute(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		if res.rows_affected() == 0 {
			return Err(Error::NotFound);
		}
		Ok(())
	}

	async fn list_information(&self, path: Option<&str>) -> ClResult<Vec<Box<str>>> {
		let mut guard = self.lock().await?;
		let rows = sqlx::query("SELECT key FROM information WHERE session_id = ?1 AND path = ?2 ORDER BY key")
			.bind(&*self.session_id)
			.bind(db_path(path))
			.fetch_all(conn(&mut guard)?)
			.await
			.map_err(db_err)?;
		rows.iter().map(|row| str_col(row, "key").map(String::into_boxed_str)).collect()
	}

	async fn export_information(&self) -> ClResult<InformationExport> {
		let mut guard = self.lock().await?;
		let rows = sqlx::query("SELECT path, key, value FROM information WHERE session_id = ?1 ORDER BY path, key")
			.bind(&*self.session_id)
			.fetch_all(conn(&mut guard)?)
			.await
			.map_err(db_err)?;

		let mut res = InformationExport::new();
		for row in &rows {
			let path = from_db_path(str_col(row, "path")?);
			res.entry(path).or_default().insert(str_col(row, "key")?.into_boxed_str(), json_col(row, "value")?);
		}
		Ok(res)
	}

	async fn import_information(&self, data: &InformationExport) -> ClResult<()> {
		self.clear("information", None).await?;
		for (path, infos) in data {
			for (key, value) in infos {
				self.set_information(path.as_deref(), key, value).await?;
			}
		}
		Ok(())
	}

	async fn commit(&self) -> ClResult<()> {
		let mut guard = self.tx.lock().await;
		if let Some(tx) = guard.take() {
			tx.commit().await.map_err(db_err)?;
		}
		Ok(())
	}
}

// vim: ts=4
