use std::borrow::Borrow;
use std::fmt;

/// A map which remembers insertion order.
///
/// Parameter sets and capture templates are tiny (tens of entries at most)
/// and are iterated far more often than they are searched, so a flat vector
/// of pairs with a linear lookup beats a hash map here. Iteration order is
/// the order in which entries were added, which is what ends up in persisted
/// documents and in help output.
pub struct OrderedMap<K, V>(Vec<(K, V)>);

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for OrderedMap<K, V> {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		let mut dbg = f.debug_map();
		for (ref k, ref v) in self.0.iter() {
			dbg.entry(k, v);
		}
		dbg.finish()
	}
}

impl<K: Clone, V: Clone> Clone for OrderedMap<K, V> {
	fn clone(&self) -> Self {
		OrderedMap(self.0.clone())
	}
}

impl<K: PartialEq, V: PartialEq> PartialEq for OrderedMap<K, V> {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl<K, V> OrderedMap<K, V> {
	pub fn new() -> Self {
		Self(Vec::new())
	}

	pub fn with_capacity(capacity: usize) -> Self {
		Self(Vec::with_capacity(capacity))
	}

	#[inline]
	fn find<Q: ?Sized>(&self, k: &Q) -> Option<usize>
	where
		K: Borrow<Q>,
		Q: PartialEq,
	{
		self.0.iter().position(|kv| kv.0.borrow() == k)
	}

	/// Insert or replace; the old value is handed back on replacement.
	///
	/// Replacing keeps the entry's original position.
	pub fn insert(&mut self, k: K, mut v: V) -> Option<V>
	where
		K: PartialEq,
	{
		match self.find(&k) {
			Some(existing) => {
				std::mem::swap(&mut v, &mut self.0[existing].1);
				Some(v)
			}
			None => {
				self.0.push((k, v));
				None
			}
		}
	}

	pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<&V>
	where
		K: Borrow<Q>,
		Q: PartialEq,
	{
		match self.find(k) {
			Some(existing) => Some(&self.0[existing].1),
			None => None,
		}
	}

	pub fn get_mut<Q: ?Sized>(&mut self, k: &Q) -> Option<&mut V>
	where
		K: Borrow<Q>,
		Q: PartialEq,
	{
		match self.find(k) {
			Some(existing) => Some(&mut self.0[existing].1),
			None => None,
		}
	}

	pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: PartialEq,
	{
		self.find(k).is_some()
	}

	pub fn remove<Q: ?Sized>(&mut self, k: &Q) -> Option<V>
	where
		K: Borrow<Q>,
		Q: PartialEq,
	{
		match self.find(k) {
			Some(existing) => Some(self.0.remove(existing).1),
			None => None,
		}
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn keys(&self) -> impl Iterator<Item = &K> {
		self.0.iter().map(|kv| &kv.0)
	}

	pub fn values(&self) -> impl Iterator<Item = &V> {
		self.0.iter().map(|kv| &kv.1)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
		self.0.iter().map(|kv| (&kv.0, &kv.1))
	}
}

impl<K, V> From<OrderedMap<K, V>> for Vec<(K, V)> {
	fn from(other: OrderedMap<K, V>) -> Self {
		other.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_insert_and_get() {
		let mut m = OrderedMap::new();
		m.insert("sample_rate", 128000u32);
		assert_eq!(*m.get("sample_rate").unwrap(), 128000u32);
	}

	#[test]
	fn test_insert_returns_old_value() {
		let mut m = OrderedMap::new();
		m.insert("k1", "foo");
		assert_eq!(m.insert("k1", "bar").unwrap(), "foo");
	}

	#[test]
	fn test_preserves_insertion_order() {
		let mut m = OrderedMap::new();
		m.insert("zeta", 0);
		m.insert("alpha", 1);
		m.insert("mid", 2);
		let keys: Vec<_> = m.keys().cloned().collect();
		assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
	}

	#[test]
	fn test_replace_keeps_position() {
		let mut m = OrderedMap::new();
		m.insert("zeta", 0);
		m.insert("alpha", 1);
		m.insert("zeta", 2);
		let entries: Vec<_> = m.iter().map(|(k, v)| (*k, *v)).collect();
		assert_eq!(entries, vec![("zeta", 2), ("alpha", 1)]);
	}

	#[test]
	fn test_get_returns_none_on_nonexistant_key() {
		let m = OrderedMap::<&'static str, i32>::new();
		assert!(m.get("sample_rate").is_none());
	}

	#[test]
	fn test_remove() {
		let mut m = OrderedMap::new();
		m.insert("k1", "foo");
		m.insert("k2", "bar");
		assert_eq!(m.remove("k1").unwrap(), "foo");
		assert!(!m.contains_key("k1"));
		assert!(m.contains_key("k2"));
	}
}
