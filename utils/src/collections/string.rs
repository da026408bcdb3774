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

//! A growable, UTF-8-encoded string that reports allocation failure instead of aborting.

use crate::{errno::AllocResult, errno::Errno, TryClone};
use core::{
	alloc::AllocError,
	fmt,
	ops::{Deref, DerefMut},
};

/// An owned, growable UTF-8 string.
#[derive(Default)]
pub struct String(alloc::string::String);

impl String {
	/// Creates a new, empty string (this does not allocate).
	pub const fn new() -> Self {
		Self(alloc::string::String::new())
	}

	/// Creates a `String` by copying `s`.
	pub fn try_from(s: &str) -> AllocResult<Self> {
		let mut this = Self::new();
		this.push_str(s)?;
		Ok(this)
	}

	/// Appends `s` to the end of the string.
	pub fn push_str(&mut self, s: &str) -> AllocResult<()> {
		self.0.try_reserve(s.len()).map_err(|_| AllocError)?;
		self.0.push_str(s);
		Ok(())
	}

	/// Appends a single character to the end of the string.
	pub fn push(&mut self, c: char) -> AllocResult<()> {
		self.0.try_reserve(c.len_utf8()).map_err(|_| AllocError)?;
		self.0.push(c);
		Ok(())
	}

	/// Shortens the string, keeping only its first `new_len` bytes.
	///
	/// # Panics
	///
	/// Panics if `new_len` does not lie on a UTF-8 character boundary.
	pub fn truncate(&mut self, new_len: usize) {
		self.0.truncate(new_len);
	}

	/// Removes every character, keeping the allocated capacity.
	pub fn clear(&mut self) {
		self.0.clear();
	}

	/// Returns the string's content as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		self.0.as_bytes()
	}

	/// Returns the string's content as a `str` slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Deref for String {
	type Target = str;

	fn deref(&self) -> &str {
		&self.0
	}
}

impl DerefMut for String {
	fn deref_mut(&mut self) -> &mut str {
		&mut self.0
	}
}

impl fmt::Debug for String {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.0, f)
	}
}

impl fmt::Display for String {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

impl PartialEq for String {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl Eq for String {}

impl PartialEq<str> for String {
	fn eq(&self, other: &str) -> bool {
		self.0 == other
	}
}

impl TryFrom<&[u8]> for String {
	type Error = Errno;

	fn try_from(bytes: &[u8]) -> Result<Self, Errno> {
		let s = core::str::from_utf8(bytes).map_err(|_| crate::errno!(EINVAL))?;
		Ok(Self::try_from(s)?)
	}
}

impl TryClone for String {
	type Error = AllocError;

	fn try_clone(&self) -> Result<Self, AllocError> {
		Self::try_from(&self.0)
	}
}
