//! Per-config caches for resolved values and properties
//!
//! Entries are keyed by `(concrete path, index)` and remember the property
//! snapshots they were computed under. An entry is only served while both
//! snapshots are unchanged and, for options carrying `expire`, while it is
//! younger than the expiration time.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

use crate::prelude::*;

type Key = (Box<str>, Option<Index>);

#[derive(Debug, Clone)]
struct CacheEntry<T> {
	/// Template path, used for invalidation
	template: Box<str>,
	value: T,
	self_props: PropertySet,
	context_props: PropertySet,
	stamp: Instant,
	validated: bool,
}

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub(crate) struct CacheHit<T> {
	pub value: T,
	pub validated: bool,
}

#[derive(Debug)]
pub(crate) struct Cache<T> {
	entries: Mutex<LruCache<Key, CacheEntry<T>>>,
}

impl<T: Clone> Cache<T> {
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
		Self { entries: Mutex::new(LruCache::new(capacity)) }
	}

	/// Look up a valid entry
	///
	/// `self_props` is compared only when given.
	pub fn get(
		&self,
		path: &str,
		index: Option<Index>,
		context_props: &PropertySet,
		self_props: Option<&PropertySet>,
		expiration_time: Duration,
	) -> Option<CacheHit<T>> {
		if !context_props.contains(&Property::Cache) {
			return None;
		}
		let mut entries = self.entries.lock();
		let entry = entries.get(&(path.into(), index))?;
		if entry.context_props != *context_props {
			return None;
		}
		if let Some(props) = self_props {
			if entry.self_props != *props {
				return None;
			}
		}
		let expire = context_props.contains(&Property::Expire)
			|| entry.self_props.contains(&Property::Expire);
		if expire && entry.stamp + expiration_time < Instant::now() {
			return None;
		}
		Some(CacheHit { value: entry.value.clone(), validated: entry.validated })
	}

	/// Entry value regardless of its validity
	pub fn peek(&self, path: &str, index: Option<Index>) -> Option<T> {
		self.entries.lock().peek(&(path.into(), index)).map(|entry| entry.value.clone())
	}

	#[allow(clippy::too_many_arguments)]
	pub fn set(
		&self,
		path: &str,
		index: Option<Index>,
		template: &str,
		value: T,
		self_props: &PropertySet,
		context_props: &PropertySet,
		validated: bool,
	) {
		if !context_props.contains(&Property::Cache) {
			return;
		}
		let entry = CacheEntry {
			template: template.into(),
			value,
			self_props: self_props.clone(),
			context_props: context_props.clone(),
			stamp: Instant::now(),
			validated,
		};
		self.entries.lock().put((path.into(), index), entry);
	}

	/// Drop every entry computed for a template path
	pub fn reset_template(&self, template: &str) {
		let mut entries = self.entries.lock();
		let keys: Vec<Key> = entries
			.iter()
			.filter(|(_, entry)| &*entry.template == template)
			.map(|(key, _)| key.clone())
			.collect();
		for key in keys {
			entries.pop(&key);
		}
	}

	pub fn reset_all(&self) {
		self.entries.lock().clear();
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use stratum_types::props;

	#[tokio::test(start_paused = true)]
	async fn test_snapshot_and_expiry() {
		let cache: Cache<Value> = Cache::new(10);
		let ctx = props!["cache", "validator"];
		let own = props!["expire"];
		cache.set("a", None, "a", Value::from(1), &own, &ctx, true);

		let hit = cache.get("a", None, &ctx, Some(&own), Duration::from_secs(5));
		assert!(hit.is_some_and(|h| h.validated && h.value == Value::from(1)));

		// Another context snapshot misses
		let other = props!["cache"];
		assert!(cache.get("a", None, &other, Some(&own), Duration::from_secs(5)).is_none());

		tokio::time::advance(Duration::from_secs(6)).await;
		assert!(cache.get("a", None, &ctx, Some(&own), Duration::from_secs(5)).is_none());
		assert_eq!(cache.peek("a", None), Some(Value::from(1)));
	}

	#[test]
	fn test_reset_template() {
		let cache: Cache<Value> = Cache::new(10);
		let ctx = props!["cache"];
		cache.set("g.dyna.x", None, "g.dyn.x", Value::from(1), &PropertySet::new(), &ctx, true);
		cache.set("g.dynb.x", None, "g.dyn.x", Value::from(2), &PropertySet::new(), &ctx, true);
		cache.set("y", None, "y", Value::from(3), &PropertySet::new(), &ctx, true);
		cache.reset_template("g.dyn.x");
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn test_requires_cache_property() {
		let cache: Cache<Value> = Cache::new(10);
		let ctx = props!["validator"];
		cache.set("a", None, "a", Value::from(1), &PropertySet::new(), &ctx, true);
		assert_eq!(cache.len(), 0);
	}
}

// vim: ts=4
