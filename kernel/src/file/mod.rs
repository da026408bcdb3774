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

//! Files implementation.
//!
//! A [`File`] is an open file description: a node plus a cursor and the flags passed at open
//! time. Several file descriptors, potentially in different processes (after `fork`), can point
//! to the same `File`, and several `File`s can point to the same underlying node.
//!
//! Resolving a node from a path goes through [`vfs`]. Node content and metadata are provided by
//! [`fs::NodeOps`].

pub mod fd;
pub mod fs;
pub mod path;
pub mod perm;
pub mod vfs;

use crate::{
	file::{
		perm::{Gid, Uid},
		vfs::node::Node,
	},
	memory::user::UserSlice,
};
use core::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use utils::{collections::vec::Vec, errno::EResult, ptr::arc::Arc};

/// Inode number type.
pub type INode = u64;
/// File permissions/type bitfield, as used by `st_mode`.
pub type Mode = u32;

/// Regular file type bit.
pub const S_IFREG: Mode = 0o100000;
/// Directory file type bit.
pub const S_IFDIR: Mode = 0o040000;
/// Character device file type bit.
pub const S_IFCHR: Mode = 0o020000;
/// Block device file type bit.
pub const S_IFBLK: Mode = 0o060000;
/// FIFO file type bit.
pub const S_IFIFO: Mode = 0o010000;
/// Symbolic link file type bit.
pub const S_IFLNK: Mode = 0o120000;
/// Socket file type bit.
pub const S_IFSOCK: Mode = 0o140000;
/// Mask for the file type bits of a mode.
pub const S_IFMT: Mode = 0o170000;

/// Open for reading only.
pub const O_RDONLY: i32 = 0o0;
/// Open for writing only.
pub const O_WRONLY: i32 = 0o1;
/// Open for reading and writing.
pub const O_RDWR: i32 = 0o2;
/// Creates the file if it does not exist.
pub const O_CREAT: i32 = 0o100;
/// Fails if `O_CREAT` is set and the file already exists.
pub const O_EXCL: i32 = 0o200;
/// If the file is a terminal, do not make it the process's controlling terminal.
pub const O_NOCTTY: i32 = 0o400;
/// Truncates the file to length zero when opened for writing.
pub const O_TRUNC: i32 = 0o1000;
/// Writes are appended to the end of the file.
pub const O_APPEND: i32 = 0o2000;
/// Opens in non-blocking mode.
pub const O_NONBLOCK: i32 = 0o4000;
/// Fails if the final component is not a directory.
pub const O_DIRECTORY: i32 = 0o200000;
/// Fails if the final component is a symbolic link.
pub const O_NOFOLLOW: i32 = 0o400000;
/// Sets the close-on-exec flag on the new descriptor.
pub const O_CLOEXEC: i32 = 0o2000000;

/// The type of a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileType {
	Regular,
	Directory,
	CharDevice,
	BlockDevice,
	Fifo,
	Link,
	Socket,
}

impl FileType {
	/// Extracts the type from a `st_mode`-style bitfield, if it encodes a known type.
	pub fn from_mode(mode: Mode) -> Option<Self> {
		Some(match mode & S_IFMT {
			S_IFREG => Self::Regular,
			S_IFDIR => Self::Directory,
			S_IFCHR => Self::CharDevice,
			S_IFBLK => Self::BlockDevice,
			S_IFIFO => Self::Fifo,
			S_IFLNK => Self::Link,
			S_IFSOCK => Self::Socket,
			_ => return None,
		})
	}

	/// Returns the type bits to be set in a `st_mode`-style bitfield.
	pub fn to_mode(self) -> Mode {
		match self {
			Self::Regular => S_IFREG,
			Self::Directory => S_IFDIR,
			Self::CharDevice => S_IFCHR,
			Self::BlockDevice => S_IFBLK,
			Self::Fifo => S_IFIFO,
			Self::Link => S_IFLNK,
			Self::Socket => S_IFSOCK,
		}
	}
}

/// A file's metadata, as stored by the node's [`fs::NodeOps`] implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stat {
	/// File type and permissions.
	pub mode: Mode,
	/// Number of hard links.
	pub nlink: u32,
	/// Owner user ID.
	pub uid: Uid,
	/// Owner group ID.
	pub gid: Gid,
	/// Size in bytes, for regular files.
	pub size: u64,
	/// Size in 512-byte blocks.
	pub blocks: u64,
	/// Device major number, for device files.
	pub dev_major: u32,
	/// Device minor number, for device files.
	pub dev_minor: u32,
	/// Last access timestamp, in seconds.
	pub atime: u64,
	/// Last modification timestamp, in seconds.
	pub mtime: u64,
	/// Last metadata change timestamp, in seconds.
	pub ctime: u64,
}

impl Stat {
	/// Returns the file's type, if set.
	pub fn get_type(&self) -> Option<FileType> {
		FileType::from_mode(self.mode)
	}
}

/// An open file description.
///
/// Several file descriptors (even across processes, after `fork`) may point to the same `File`,
/// sharing its cursor; several `File`s may point to the same [`Node`].
#[derive(Debug)]
pub struct File {
	/// The node this file was opened on.
	pub node: Arc<Node>,
	/// The byte offset of the next read or write.
	pub off: AtomicU64,
	/// The flags passed at `open` time (`O_*`).
	flags: AtomicI32,
}

impl File {
	/// Creates a new open file description on `node`.
	pub fn open(node: Arc<Node>, flags: i32) -> Self {
		Self {
			node,
			off: AtomicU64::new(0),
			flags: AtomicI32::new(flags),
		}
	}

	/// Returns the file's type.
	pub fn get_type(&self) -> EResult<FileType> {
		let stat = self.stat()?;
		Ok(stat.get_type().unwrap_or(FileType::Regular))
	}

	/// Returns the file's metadata.
	pub fn stat(&self) -> EResult<Stat> {
		self.node.get_stat()
	}

	/// Returns the open flags (`O_*`) the file was opened with.
	pub fn get_flags(&self) -> i32 {
		self.flags.load(Ordering::Relaxed)
	}

	/// Truncates the file's content to `size` bytes.
	pub fn truncate(&self, size: u64) -> EResult<()> {
		self.node.node_ops.truncate(size)
	}

	/// Reads at most `dst.len()` bytes starting at byte offset `off` into the userspace slice
	/// `dst`, returning the number of bytes read.
	pub fn read_user(&self, off: u64, dst: UserSlice<u8>) -> EResult<usize> {
		let size = self.stat()?.size;
		let avail = size.saturating_sub(off).min(dst.len() as u64) as usize;
		let mut tmp = Vec::new();
		tmp.resize(avail, 0)?;
		self.node.node_ops.read_page(off, &mut tmp)?;
		dst.copy_to_user(0, &tmp)?;
		Ok(avail)
	}

	/// Writes the userspace slice `src` at byte offset `off`, returning the number of bytes
	/// written.
	pub fn write_user(&self, off: u64, src: UserSlice<u8>) -> EResult<usize> {
		let len = src.len();
		let mut tmp = Vec::new();
		tmp.resize(len, 0)?;
		src.copy_from_user(0, &mut tmp)?;
		self.node.node_ops.write_page(off, &tmp)?;
		Ok(len)
	}
}
