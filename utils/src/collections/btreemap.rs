/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! An ordered map, keyed by [`Ord`].

use core::{cmp::Ordering, fmt};

/// An ordered key-value map.
///
/// Insertion and removal delegate to [`alloc::collections::BTreeMap`] directly: the standard
/// library does not expose a fallible insertion path for `BTreeMap`, unlike the contiguous
/// collections in this crate.
pub struct BTreeMap<K, V>(alloc::collections::BTreeMap<K, V>);

impl<K, V> BTreeMap<K, V> {
	/// Creates a new, empty map.
	pub const fn new() -> Self {
		Self(alloc::collections::BTreeMap::new())
	}

	/// Returns the number of entries in the map.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Tells whether the map has no entry.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns an iterator over the map's entries, in key order.
	pub fn iter(&self) -> alloc::collections::btree_map::Iter<'_, K, V> {
		self.0.iter()
	}

	/// Returns a mutable iterator over the map's entries, in key order.
	pub fn iter_mut(&mut self) -> alloc::collections::btree_map::IterMut<'_, K, V> {
		self.0.iter_mut()
	}

	/// Returns an iterator over the map's keys, in order.
	pub fn keys(&self) -> alloc::collections::btree_map::Keys<'_, K, V> {
		self.0.keys()
	}

	/// Returns an iterator over the map's values, in key order.
	pub fn values(&self) -> alloc::collections::btree_map::Values<'_, K, V> {
		self.0.values()
	}

	/// Removes every entry.
	pub fn clear(&mut self) {
		self.0.clear();
	}

	/// Finds the entry whose key compares as [`Ordering::Equal`] under `f`, scanning in key
	/// order.
	///
	/// Intended for maps keyed by a value's *start*, searched by membership within a range (e.g.
	/// "the area covering this address"): `f` typically compares the queried point against the
	/// extent described by the key and associated value.
	pub fn cmp_get<F: Fn(&K, &V) -> Ordering>(&self, f: F) -> Option<(&K, &V)> {
		self.0.iter().find(|(k, v)| f(k, v) == Ordering::Equal)
	}

	/// Mutable counterpart to [`Self::cmp_get`].
	pub fn cmp_get_mut<F: Fn(&K, &V) -> Ordering>(&mut self, f: F) -> Option<(&K, &mut V)> {
		self.0.iter_mut().find(|(k, v)| f(k, v) == Ordering::Equal)
	}
}

impl<K: Ord, V> BTreeMap<K, V> {
	/// Inserts `value` under `key`, returning the previous value if any.
	pub fn insert(&mut self, key: K, value: V) -> Option<V> {
		self.0.insert(key, value)
	}

	/// Removes and returns the value under `key`, if any.
	pub fn remove(&mut self, key: &K) -> Option<V> {
		self.0.remove(key)
	}

	/// Returns a reference to the value under `key`, if any.
	pub fn get(&self, key: &K) -> Option<&V> {
		self.0.get(key)
	}

	/// Returns a mutable reference to the value under `key`, if any.
	pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
		self.0.get_mut(key)
	}

	/// Tells whether `key` is present in the map.
	pub fn contains_key(&self, key: &K) -> bool {
		self.0.contains_key(key)
	}

	/// Returns the last entry (highest key), if any.
	pub fn last_key_value(&self) -> Option<(&K, &V)> {
		self.0.iter().next_back()
	}

	/// Returns the first entry (lowest key), if any.
	pub fn first_key_value(&self) -> Option<(&K, &V)> {
		self.0.iter().next()
	}

	/// Returns an iterator over the entries whose key falls in `range`.
	pub fn range<R: core::ops::RangeBounds<K>>(
		&self,
		range: R,
	) -> alloc::collections::btree_map::Range<'_, K, V> {
		self.0.range(range)
	}
}

impl<K, V> Default for BTreeMap<K, V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BTreeMap<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.0, f)
	}
}

impl<'m, K, V> IntoIterator for &'m BTreeMap<K, V> {
	type Item = (&'m K, &'m V);
	type IntoIter = alloc::collections::btree_map::Iter<'m, K, V>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}
