//! Database schema initialization
//!
//! Every table is keyed by session. A context-level entry is stored with an
//! empty path and an entry without index with index `-1`.

use sqlx::SqlitePool;

/// Initialize the database schema with all required tables and indexes
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	// Sessions
	//**********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS sessions (
		session_id text NOT NULL,
		created_at datetime DEFAULT (unixepoch()),
		PRIMARY KEY(session_id)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Properties and permissives
	//****************************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS properties (
		session_id text NOT NULL,
		store char(1) NOT NULL,
		path text NOT NULL,
		idx integer NOT NULL,
		properties json NOT NULL,
		PRIMARY KEY(session_id, store, path, idx)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Values
	//********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS vals (
		session_id text NOT NULL,
		path text NOT NULL,
		idx integer NOT NULL,
		value json NOT NULL,
		owner text NOT NULL,
		PRIMARY KEY(session_id, path, idx)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Information
	//*************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS information (
		session_id text NOT NULL,
		path text NOT NULL,
		key text NOT NULL,
		value json NOT NULL,
		PRIMARY KEY(session_id, path, key)
	)",
	)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(())
}

// vim: ts=4
