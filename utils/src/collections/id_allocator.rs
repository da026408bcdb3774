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

//! Allocation of unique IDs out of a fixed-size pool, backed by a [`Bitfield`].

use crate::{collections::bitfield::Bitfield, errno::AllocResult};
use core::alloc::AllocError;

/// Allocates unique IDs in `0..max`.
pub struct IDAllocator {
	used: Bitfield,
	/// Hint for the next search, to spread allocations instead of always restarting at zero.
	next: u32,
}

impl IDAllocator {
	/// Creates a new allocator for IDs in `0..max`.
	pub fn new(max: u32) -> AllocResult<Self> {
		Ok(Self {
			used: Bitfield::new(max as usize)?,
			next: 0,
		})
	}

	/// Tells whether `id` is currently allocated.
	///
	/// # Panics
	///
	/// Panics if `id` is out of bounds.
	pub fn is_used(&self, id: u32) -> bool {
		self.used.is_set(id as usize)
	}

	/// Marks `id` as allocated.
	///
	/// # Panics
	///
	/// Panics if `id` is out of bounds.
	pub fn set_used(&mut self, id: u32) {
		self.used.set(id as usize);
	}

	/// Allocates and returns a free ID.
	///
	/// If `hint` is given and free, it is allocated directly; otherwise the first free ID at or
	/// after the allocator's internal cursor is used.
	pub fn alloc(&mut self, hint: Option<u32>) -> AllocResult<u32> {
		let len = self.used.len() as u32;
		if let Some(id) = hint {
			if id < len && !self.is_used(id) {
				self.set_used(id);
				return Ok(id);
			}
		}
		for offset in 0..len {
			let id = (self.next + offset) % len;
			if !self.is_used(id) {
				self.set_used(id);
				self.next = (id + 1) % len;
				return Ok(id);
			}
		}
		Err(AllocError)
	}

	/// Frees a previously allocated `id`.
	///
	/// # Panics
	///
	/// Panics if `id` is out of bounds.
	pub fn free(&mut self, id: u32) {
		self.used.clear(id as usize);
	}
}
