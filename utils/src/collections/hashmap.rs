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

//! A hash map, keyed by [`Hash`] + [`Eq`].
//!
//! `core` has no hasher without pulling in `std`, so this uses a small FNV-1a implementation and
//! separate chaining rather than reaching for a crate the rest of the stack does not otherwise
//! need.

use crate::{collections::vec::Vec, errno::AllocResult};
use core::{
	fmt,
	hash::{Hash, Hasher},
};

const INITIAL_BUCKETS: usize = 16;

struct FnvHasher(u64);

impl FnvHasher {
	const fn new() -> Self {
		Self(0xcbf29ce484222325)
	}
}

impl Hasher for FnvHasher {
	fn finish(&self) -> u64 {
		self.0
	}

	fn write(&mut self, bytes: &[u8]) {
		for b in bytes {
			self.0 ^= *b as u64;
			self.0 = self.0.wrapping_mul(0x100000001b3);
		}
	}
}

fn hash_of<K: Hash>(key: &K) -> u64 {
	let mut hasher = FnvHasher::new();
	key.hash(&mut hasher);
	hasher.finish()
}

/// An unordered key-value map using separate-chaining hashing.
pub struct HashMap<K, V> {
	buckets: alloc::vec::Vec<Vec<(K, V)>>,
	len: usize,
}

impl<K, V> HashMap<K, V> {
	/// Creates a new, empty map.
	pub fn new() -> Self {
		let mut buckets = alloc::vec::Vec::new();
		buckets.resize_with(INITIAL_BUCKETS, Vec::new);
		Self {
			buckets,
			len: 0,
		}
	}

	/// Returns the number of entries in the map.
	pub fn len(&self) -> usize {
		self.len
	}

	/// Tells whether the map has no entry.
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Returns an iterator over the map's entries.
	pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
		self.buckets.iter().flat_map(|b| b.iter().map(|(k, v)| (k, v)))
	}

	/// Returns a mutable iterator over the map's entries.
	pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
		self.buckets
			.iter_mut()
			.flat_map(|b| b.iter_mut().map(|(k, v)| (&*k, v)))
	}

	/// Removes every entry.
	pub fn clear(&mut self) {
		for b in self.buckets.iter_mut() {
			b.clear();
		}
		self.len = 0;
	}
}

impl<K: Hash + Eq, V> HashMap<K, V> {
	fn bucket_index(&self, key: &K) -> usize {
		(hash_of(key) as usize) % self.buckets.len()
	}

	/// Inserts `value` under `key`, returning the previous value if any.
	pub fn insert(&mut self, key: K, value: V) -> AllocResult<Option<V>> {
		let idx = self.bucket_index(&key);
		let bucket = &mut self.buckets[idx];
		if let Some(slot) = bucket.iter_mut().find(|(k, _)| *k == key) {
			return Ok(Some(core::mem::replace(&mut slot.1, value)));
		}
		bucket.push((key, value))?;
		self.len += 1;
		Ok(None)
	}

	/// Removes and returns the value under `key`, if any.
	pub fn remove(&mut self, key: &K) -> Option<V> {
		let idx = self.bucket_index(key);
		let bucket = &mut self.buckets[idx];
		let pos = bucket.iter().position(|(k, _)| k == key)?;
		self.len -= 1;
		Some(bucket.remove(pos).1)
	}

	/// Returns a reference to the value under `key`, if any.
	pub fn get(&self, key: &K) -> Option<&V> {
		let idx = self.bucket_index(key);
		self.buckets[idx].iter().find(|(k, _)| k == key).map(|(_, v)| v)
	}

	/// Returns a mutable reference to the value under `key`, if any.
	pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
		let idx = self.bucket_index(key);
		self.buckets[idx]
			.iter_mut()
			.find(|(k, _)| k == key)
			.map(|(_, v)| v)
	}

	/// Tells whether `key` is present in the map.
	pub fn contains_key(&self, key: &K) -> bool {
		self.get(key).is_some()
	}
}

impl<K, V> Default for HashMap<K, V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for HashMap<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.iter()).finish()
	}
}
