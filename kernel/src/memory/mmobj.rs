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

//! Memory objects (mmobj) are the sources of page content behind a memory mapping.
//!
//! Three variants exist:
//! - [`Anonymous`](MmobjKind::Anonymous): pages are zero-filled on first touch and have no
//!   backing store.
//! - [`File`](MmobjKind::File): pages are fetched from a [`Node`], and shared by every mapping of
//!   the same file.
//! - [`Shadow`](MmobjKind::Shadow): a private copy-on-write overlay above a parent object chain,
//!   used to implement `MAP_PRIVATE` and fork.
//!
//! An object's resident pages are cached in a [`MappedNode`]: for [`File`](MmobjKind::File), this
//! is the node's own cache (so every mapping of the file observes the same pages); for the other
//! two variants, it is private to the object.
//!
//! An object is reaped as soon as its last reference (held by a vmarea or a child shadow) is
//! dropped: [`Drop`] evicts its resident pages from the cache (and the global LRU), and, for a
//! shadow, releases the reference on its parent as an ordinary field drop. This is the Rust
//! counterpart of the usual "refcount == resident_pages ⇒ reap" bookkeeping.

use crate::{
	file::vfs::node::Node,
	memory::{
		buddy::FLAG_ZONE_TYPE_USER,
		cache::{FrameOwner, MappedNode, RcFrame},
	},
};
use utils::{errno::EResult, limits::PAGE_SIZE, ptr::arc::Arc};

/// A private copy-on-write overlay above a parent object chain.
pub struct Shadow {
	/// The object directly below this one in the chain.
	shadowed: Mmobj,
	/// The non-shadow object at the bottom of the chain.
	bottom: Mmobj,
}

/// The variant-specific state of a memory object.
pub enum MmobjKind {
	/// Pages are zero-filled on first touch; no backing store.
	Anonymous,
	/// Pages are fetched from, and written back to, a filesystem node.
	File(Arc<Node>),
	/// A copy-on-write overlay above [`Shadow::shadowed`].
	Shadow(Shadow),
}

struct MmobjInner {
	kind: MmobjKind,
	/// Resident pages private to this object. Unused for [`MmobjKind::File`], which instead uses
	/// the backing node's own cache so that every mapping of the file shares the same pages.
	pages: MappedNode,
}

impl Drop for MmobjInner {
	fn drop(&mut self) {
		// Anonymous and shadow objects own their page cache outright: once unreachable, every
		// resident page can be evicted immediately. A file's cache outlives any one mapping of
		// it, so it is left alone here.
		if !matches!(self.kind, MmobjKind::File(_)) {
			self.pages.truncate(0);
		}
	}
}

/// A reference-counted memory object.
///
/// Cloning increments the reference count (`ref`); dropping the last reference reaps the object
/// (`put`).
#[derive(Clone)]
pub struct Mmobj(Arc<MmobjInner>);

impl Mmobj {
	/// Creates a new anonymous object.
	pub fn new_anonymous() -> EResult<Self> {
		Ok(Self(Arc::new(MmobjInner {
			kind: MmobjKind::Anonymous,
			pages: MappedNode::default(),
		})?))
	}

	/// Creates a new file-backed object wrapping `node`.
	///
	/// Every call with the same node shares the same resident pages, since they are cached on
	/// the node itself.
	pub fn new_file(node: Arc<Node>) -> EResult<Self> {
		Ok(Self(Arc::new(MmobjInner {
			kind: MmobjKind::File(node),
			pages: MappedNode::default(),
		})?))
	}

	/// Creates a fresh shadow interposed directly above `shadowed`.
	pub fn new_shadow(shadowed: Mmobj) -> EResult<Self> {
		let bottom = shadowed.bottom();
		Ok(Self(Arc::new(MmobjInner {
			kind: MmobjKind::Shadow(Shadow {
				shadowed,
				bottom,
			}),
			pages: MappedNode::default(),
		})?))
	}

	/// Tells whether this object is a [`MmobjKind::Shadow`].
	#[inline]
	pub fn is_shadow(&self) -> bool {
		matches!(self.0.kind, MmobjKind::Shadow(_))
	}

	/// Returns the non-shadow object at the bottom of the chain this object belongs to.
	///
	/// For a non-shadow object, this returns a clone of `self`.
	pub fn bottom(&self) -> Mmobj {
		match &self.0.kind {
			MmobjKind::Shadow(s) => s.bottom.clone(),
			_ => self.clone(),
		}
	}

	/// Returns the cache holding this object's resident pages.
	fn pages(&self) -> &MappedNode {
		match &self.0.kind {
			MmobjKind::File(node) => &node.mapped,
			_ => &self.0.pages,
		}
	}

	/// Returns the frame for page `page_index`, forcing it resident if necessary.
	///
	/// If `for_write` is set on a shadow object, the page is forced resident *on this object*
	/// rather than delegated to an ancestor, which is what makes a shadow diverge from its
	/// parent on write.
	pub fn lookup_page(&self, page_index: u64, for_write: bool) -> EResult<RcFrame> {
		match &self.0.kind {
			MmobjKind::Anonymous => self
				.pages()
				.get_or_insert_frame(page_index, 0, || Self::fill_anonymous(page_index)),
			MmobjKind::File(node) => {
				let node = node.clone();
				self.pages()
					.get_or_insert_frame(page_index, 0, move || Self::fill_file(&node, page_index))
			}
			MmobjKind::Shadow(_) if for_write => {
				let this = self.clone();
				self.pages()
					.get_or_insert_frame(page_index, 0, move || this.fill_shadow(page_index))
			}
			MmobjKind::Shadow(_) => self.lookup_page_readonly(page_index),
		}
	}

	/// Walks the chain starting at (and including) `self`, looking for a resident copy of
	/// `page_index` without forcing one into existence. Used by the read-fault path, which must
	/// never allocate a private page.
	fn lookup_page_readonly(&self, page_index: u64) -> EResult<RcFrame> {
		let mut cur = self.clone();
		loop {
			if let Some(frame) = cur.pages().get(page_index) {
				return Ok(frame);
			}
			let MmobjKind::Shadow(s) = &cur.0.kind else {
				// Reached the bottom: delegate, possibly triggering I/O.
				return cur.lookup_page(page_index, false);
			};
			let next = s.shadowed.clone();
			cur = next;
		}
	}

	/// Fills a freshly forced page on this shadow by copying the current contents of the chain
	/// below it.
	fn fill_shadow(&self, page_index: u64) -> EResult<RcFrame> {
		let MmobjKind::Shadow(Shadow {
			shadowed, ..
		}) = &self.0.kind
		else {
			unreachable!("fill_shadow called on a non-shadow object");
		};
		let mut cur = shadowed.clone();
		let src = loop {
			if let Some(frame) = cur.pages().get(page_index) {
				break frame;
			}
			let next = match &cur.0.kind {
				MmobjKind::Shadow(s) => s.shadowed.clone(),
				// Reached the bottom non-shadow ancestor: fetch from it, possibly via I/O.
				_ => break cur.lookup_page(page_index, false)?,
			};
			cur = next;
		};
		let frame = RcFrame::new(0, FLAG_ZONE_TYPE_USER, FrameOwner::Anon, page_index)?;
		unsafe {
			frame.slice_mut::<u8>().copy_from_slice(src.slice::<u8>());
		}
		Ok(frame)
	}

	/// Allocates and zero-fills a fresh anonymous page.
	fn fill_anonymous(page_index: u64) -> EResult<RcFrame> {
		Ok(RcFrame::new_zeroed(0, FrameOwner::Anon, page_index)?)
	}

	/// Allocates a fresh page and reads its content from `node`.
	fn fill_file(node: &Arc<Node>, page_index: u64) -> EResult<RcFrame> {
		let frame = RcFrame::new(0, FLAG_ZONE_TYPE_USER, FrameOwner::Node(node.clone()), page_index)?;
		let off = page_index * PAGE_SIZE as u64;
		node.node_ops.read_page(off, unsafe { frame.slice_mut() })?;
		Ok(frame)
	}

	/// Marks `frame` (one of this object's resident pages) as dirty.
	///
	/// No-op for anonymous and shadow objects, which have no backing store to write back to.
	pub fn dirty_page(&self, frame: &RcFrame) {
		if matches!(self.0.kind, MmobjKind::File(_)) {
			frame.mark_dirty();
		}
	}

	/// Writes `frame` back to its backing store if dirty.
	///
	/// No-op for anonymous and shadow objects.
	pub fn clean_page(&self, frame: &RcFrame) -> EResult<()> {
		if matches!(self.0.kind, MmobjKind::File(_)) {
			frame.writeback(None, false)?;
		}
		Ok(())
	}
}
