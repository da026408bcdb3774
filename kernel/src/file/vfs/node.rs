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

//! Filesystem nodes.
//!
//! A [`Node`] is the in-kernel representation of an inode: identity ([`Node::ino`]), a page
//! cache ([`Node::mapped`]) shared by every memory object mapping the node, and the backing
//! operations ([`Node::node_ops`]) that actually read and write content.

use crate::{file::fs::NodeOps, memory::cache::MappedNode};
use utils::{
	boxed::Box,
	errno::{AllocResult, EResult},
	ptr::arc::Arc,
};

/// A filesystem node.
#[derive(Debug)]
pub struct Node {
	/// The node's inode number, unique within the kernel's lifetime.
	pub ino: u64,
	/// The node's page cache.
	///
	/// Shared by every [`crate::memory::mmobj`] backed by this node, so that concurrent
	/// mappings (and `MAP_SHARED` mappings in different processes) observe the same pages.
	pub mapped: MappedNode,
	/// Handle for node operations.
	pub node_ops: Box<dyn NodeOps>,
}

impl Node {
	/// Creates a new node with a freshly allocated inode number.
	pub fn new(ops: Box<dyn NodeOps>) -> AllocResult<Arc<Self>> {
		Arc::new(Self {
			ino: crate::file::fs::next_ino(),
			mapped: MappedNode::default(),
			node_ops: ops,
		})
	}

	/// Returns the node's metadata.
	pub fn get_stat(&self) -> EResult<crate::file::Stat> {
		self.node_ops.get_stat()
	}

	/// Releases a reference to the node, removing its content from the backing store if this
	/// was the last reference and its link count has dropped to zero.
	pub fn release(this: Arc<Self>) -> EResult<()> {
		// `this` + whatever just dropped = only reference left
		if Arc::strong_count(&this) > 1 {
			return Ok(());
		}
		let stat = this.get_stat()?;
		if stat.nlink == 0 {
			this.node_ops.unlink()?;
		}
		Ok(())
	}
}
