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

//! The Virtual FileSystem resolves paths into [`Node`]s.
//!
//! There is a single, in-memory filesystem rooted at `/`; mounting other filesystems on top of
//! it is outside this kernel's scope.

pub mod node;

use crate::{
	file::{
		fs::{TmpDirOps, TmpFileOps},
		path::{Component, Path},
		perm::AccessProfile,
		FileType, Stat,
	},
	process::Process,
	time::{
		clock::{current_time, CLOCK_REALTIME},
		unit::TimestampScale,
	},
};
use node::Node;
use utils::{boxed::Box, collections::string::String, errno, errno::EResult, lock::Mutex, ptr::arc::Arc, TryClone};

/// The settings used to resolve a path: the starting points and the access rights of the caller.
#[derive(Clone)]
pub struct ResolutionSettings {
	/// The root directory, used when a path is absolute or climbs past `cwd`.
	pub root: Arc<Node>,
	/// The current working directory, used when a path is relative. `None` resolves relative
	/// paths against `root`.
	pub cwd: Option<Arc<Node>>,
	/// The access rights to check resolution against.
	pub access_profile: AccessProfile,
	/// Whether the final component should be created if missing.
	pub create: bool,
	/// Whether a final component that is a symbolic link should be followed.
	pub follow_link: bool,
}

impl ResolutionSettings {
	/// Returns settings granting full (kernel) access, following symbolic links.
	pub fn kernel_follow() -> EResult<Self> {
		Ok(Self {
			root: root_node()?,
			cwd: None,
			access_profile: AccessProfile::KERNEL,
			create: false,
			follow_link: true,
		})
	}

	/// Returns settings granting full (kernel) access, without following the final symbolic
	/// link.
	pub fn kernel_nofollow() -> EResult<Self> {
		let base = Self::kernel_follow()?;
		Ok(Self {
			follow_link: false,
			..base
		})
	}

	/// Returns settings resolving on behalf of `proc`.
	pub fn for_process(proc: &Process, follow_link: bool) -> EResult<Self> {
		Ok(Self {
			root: root_node()?,
			cwd: proc.cwd.clone(),
			access_profile: proc.access_profile,
			create: false,
			follow_link,
		})
	}
}

/// The result of resolving a path.
pub enum Resolved {
	/// The path points to an existing node.
	Found(Arc<Node>),
	/// The path's final component does not exist, but its parent does and resolution was
	/// requested with [`ResolutionSettings::create`] set.
	Creatable {
		/// The parent directory the new entry would be created in.
		parent: Arc<Node>,
		/// The name of the entry to create.
		name: String,
	},
}

/// The node backing the filesystem's root directory.
static ROOT: Mutex<Option<Arc<Node>>> = Mutex::new(None);

/// Returns the filesystem's root node, creating it on first use.
pub fn root_node() -> EResult<Arc<Node>> {
	let mut root = ROOT.lock();
	if let Some(node) = root.as_ref() {
		return Ok(node.clone());
	}
	let ts = current_time(CLOCK_REALTIME, TimestampScale::Second).unwrap_or(0);
	let stat = Stat {
		mode: FileType::Directory.to_mode() | 0o755,
		nlink: 2,
		ctime: ts,
		mtime: ts,
		atime: ts,
		..Default::default()
	};
	let node = Node::new(Box::new(TmpDirOps::new(stat))?)?;
	*root = Some(node.clone());
	Ok(node)
}

/// Resolves `path` against `rs`.
///
/// `..` is not tracked (this filesystem keeps no parent links); it is treated as a no-op, which
/// is enough for the absolute, non-traversal-heavy paths used by this kernel's syscalls.
pub fn resolve_path(path: &Path, rs: &ResolutionSettings) -> EResult<Resolved> {
	let mut cur = if path.is_absolute() {
		rs.root.clone()
	} else {
		rs.cwd.clone().unwrap_or_else(|| rs.root.clone())
	};
	let mut comps = path.components().peekable();
	while let Some(comp) = comps.next() {
		let is_last = comps.peek().is_none();
		let name = match &comp {
			Component::RootDir | Component::CurDir | Component::ParentDir => continue,
			Component::Normal(name) => *name,
		};
		let entry = cur.node_ops.lookup_entry(name)?;
		match entry {
			Some(next) => cur = next,
			None if is_last && rs.create => {
				let name = String::try_from(name)?;
				return Ok(Resolved::Creatable {
					parent: cur,
					name,
				});
			}
			None => return Err(errno!(ENOENT)),
		}
	}
	Ok(Resolved::Found(cur))
}

/// Resolves `path` against `rs`, requiring it to already exist.
pub fn get_file_from_path(path: &Path, rs: &ResolutionSettings) -> EResult<Arc<Node>> {
	match resolve_path(path, rs)? {
		Resolved::Found(node) => Ok(node),
		Resolved::Creatable {
			..
		} => Err(errno!(ENOENT)),
	}
}

/// Attempts to reclaim memory from the directory entry cache.
///
/// This filesystem keeps no separate dentry cache (lookups go straight through
/// [`crate::file::fs::NodeOps::lookup_entry`]), so there is nothing to reclaim.
pub fn shrink_entries() -> bool {
	false
}

/// Creates a new entry named `name` under `parent`, owned as described by `access_profile`, with
/// the rest of its metadata taken from `stat`.
pub fn create_file(
	parent: &Node,
	name: String,
	access_profile: &AccessProfile,
	mut stat: Stat,
) -> EResult<Arc<Node>> {
	stat.uid = access_profile.get_euid();
	stat.gid = access_profile.get_egid();
	let ops: Box<dyn crate::file::fs::NodeOps> = match stat.get_type() {
		Some(FileType::Directory) => {
			stat.nlink = 2;
			Box::new(TmpDirOps::new(stat))?
		}
		_ => {
			stat.nlink = 1;
			Box::new(TmpFileOps::new(stat))?
		}
	};
	let node = Node::new(ops)?;
	parent.node_ops.add_entry(name.try_clone()?, node.clone())?;
	Ok(node)
}
