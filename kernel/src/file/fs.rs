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

//! Node operations.
//!
//! A [`NodeOps`] implementation provides the backing store for a [`super::vfs::node::Node`]:
//! metadata and raw byte-level reads/writes. The page cache ([`crate::memory::cache::MappedNode`])
//! sits above this and is what the memory-object layer actually faults against.
//!
//! This module only ships one backend, an in-memory filesystem, since resolving a real on-disk
//! filesystem is outside this kernel's scope.

use crate::file::{perm::AccessProfile, FileType, Stat};
use core::{cmp::min, fmt, sync::atomic::{AtomicU64, Ordering}};
use utils::{
	collections::{hashmap::HashMap, string::String, vec::Vec},
	errno,
	errno::EResult,
	lock::Mutex,
	ptr::arc::Arc,
};

use super::vfs::node::Node;

/// Allocates the next free inode number.
pub fn next_ino() -> u64 {
	static NEXT: AtomicU64 = AtomicU64::new(1);
	NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Backing operations for a filesystem node.
///
/// Implementors provide metadata and raw I/O; the page cache and memory objects built on top
/// take care of caching and copy-on-write.
pub trait NodeOps: fmt::Debug + Send + Sync {
	/// Returns the node's metadata.
	fn get_stat(&self) -> EResult<Stat>;

	/// Overwrites the node's metadata.
	fn set_stat(&self, stat: Stat) -> EResult<()>;

	/// Resizes the node's content to `size` bytes.
	fn truncate(&self, size: u64) -> EResult<()>;

	/// Reads `buf.len()` bytes starting at byte offset `off` into `buf`.
	///
	/// Reads past the end of the content are zero-filled.
	fn read_page(&self, off: u64, buf: &mut [u8]) -> EResult<()>;

	/// Writes `buf` at byte offset `off`, growing the content if necessary.
	fn write_page(&self, off: u64, buf: &[u8]) -> EResult<()>;

	/// Looks up a child of a directory node by name.
	fn lookup_entry(&self, _name: &[u8]) -> EResult<Option<Arc<Node>>> {
		Err(errno!(ENOTDIR))
	}

	/// Inserts a child in a directory node.
	fn add_entry(&self, _name: String, _node: Arc<Node>) -> EResult<()> {
		Err(errno!(ENOTDIR))
	}

	/// Removes the node's content from its backing store.
	///
	/// Called once the node's link count drops to zero and no reference remains.
	fn unlink(&self) -> EResult<()> {
		Ok(())
	}
}

/// State shared by in-memory nodes: permissions, timestamps and link count.
#[derive(Debug)]
struct TmpMeta(Mutex<Stat>);

impl TmpMeta {
	fn new(stat: Stat) -> Self {
		Self(Mutex::new(stat))
	}
}

/// An in-memory regular file: a resizable byte buffer.
#[derive(Debug)]
pub struct TmpFileOps {
	meta: TmpMeta,
	data: Mutex<Vec<u8>>,
}

impl TmpFileOps {
	pub fn new(stat: Stat) -> Self {
		Self {
			meta: TmpMeta::new(stat),
			data: Mutex::new(Vec::new()),
		}
	}
}

impl NodeOps for TmpFileOps {
	fn get_stat(&self) -> EResult<Stat> {
		let mut stat = *self.meta.0.lock();
		stat.size = self.data.lock().len() as u64;
		Ok(stat)
	}

	fn set_stat(&self, stat: Stat) -> EResult<()> {
		*self.meta.0.lock() = stat;
		Ok(())
	}

	fn truncate(&self, size: u64) -> EResult<()> {
		let mut data = self.data.lock();
		data.resize(size as usize, 0)?;
		Ok(())
	}

	fn read_page(&self, off: u64, buf: &mut [u8]) -> EResult<()> {
		buf.fill(0);
		let data = self.data.lock();
		let off = off as usize;
		if off >= data.len() {
			return Ok(());
		}
		let len = min(buf.len(), data.len() - off);
		buf[..len].copy_from_slice(&data[off..(off + len)]);
		Ok(())
	}

	fn write_page(&self, off: u64, buf: &[u8]) -> EResult<()> {
		let mut data = self.data.lock();
		let end = off as usize + buf.len();
		if data.len() < end {
			data.resize(end, 0)?;
		}
		data[(off as usize)..end].copy_from_slice(buf);
		Ok(())
	}
}

/// An in-memory directory: a name-to-node table.
#[derive(Debug)]
pub struct TmpDirOps {
	meta: TmpMeta,
	entries: Mutex<HashMap<String, Arc<Node>>>,
}

impl TmpDirOps {
	pub fn new(stat: Stat) -> Self {
		Self {
			meta: TmpMeta::new(stat),
			entries: Mutex::new(HashMap::new()),
		}
	}
}

impl NodeOps for TmpDirOps {
	fn get_stat(&self) -> EResult<Stat> {
		let mut stat = *self.meta.0.lock();
		// `.` plus one link per child subdirectory is a finer accounting than we need here;
		// keep it at two so `rmdir`-style threshold checks (nlink <= 1) still make sense.
		stat.nlink = stat.nlink.max(2);
		Ok(stat)
	}

	fn set_stat(&self, stat: Stat) -> EResult<()> {
		*self.meta.0.lock() = stat;
		Ok(())
	}

	fn truncate(&self, _size: u64) -> EResult<()> {
		Err(errno!(EISDIR))
	}

	fn read_page(&self, _off: u64, _buf: &mut [u8]) -> EResult<()> {
		Err(errno!(EISDIR))
	}

	fn write_page(&self, _off: u64, _buf: &[u8]) -> EResult<()> {
		Err(errno!(EISDIR))
	}

	fn lookup_entry(&self, name: &[u8]) -> EResult<Option<Arc<Node>>> {
		let name = core::str::from_utf8(name).map_err(|_| errno!(EINVAL))?;
		Ok(self.entries.lock().get(name).cloned())
	}

	fn add_entry(&self, name: String, node: Arc<Node>) -> EResult<()> {
		let mut entries = self.entries.lock();
		if entries.get(&name).is_some() {
			return Err(errno!(EEXIST));
		}
		entries.insert(name, node)?;
		Ok(())
	}
}

/// Checks whether `profile` is allowed to perform the access described by `mask` (a combination
/// of the read/write/execute bits) on `stat`.
pub fn check_access(stat: &Stat, profile: &AccessProfile, write: bool) -> EResult<()> {
	let ok = if write {
		profile.can_write_file(stat)
	} else {
		profile.can_read_file(stat)
	};
	if ok {
		Ok(())
	} else {
		Err(errno!(EACCES))
	}
}

/// Returns the [`FileType`] of a node's metadata, defaulting to [`FileType::Regular`] if unset.
pub fn stat_type(stat: &Stat) -> FileType {
	stat.get_type().unwrap_or(FileType::Regular)
}
