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

//! A memory space is a virtual memory handler for a process.
//!
//! It keeps track of the process's [`VmArea`]s, an ordered, disjoint set of virtual page ranges
//! each bound to a window inside a memory object ([`Mmobj`]), and lazily reflects them into the
//! architecture's page tables ([`VMem`]) as page faults occur.

pub mod vmarea;

use crate::{
	arch::x86::paging::{
		FLAG_PRESENT, FLAG_USER, FLAG_WRITE, FLAG_XD, PAGE_FAULT_INSTRUCTION, PAGE_FAULT_WRITE,
	},
	file::vfs,
	memory::{PROCESS_END, VirtAddr, mmobj::Mmobj, vmem, vmem::VMem},
};
use core::{cmp::max, ffi::c_void, fmt};
use utils::{collections::btreemap::BTreeMap, errno, errno::EResult, limits::PAGE_SIZE, ptr::arc::Arc};
pub use vmarea::{
	MAP_ANONYMOUS, MAP_FIXED, MAP_PRIVATE, MAP_SHARED, PROT_EXEC, PROT_NONE, PROT_READ,
	PROT_WRITE, VmArea,
};

/// Search direction used by [`MemSpace::find_range`].
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum MapDir {
	/// Return the lowest-addressed gap large enough.
	Lowest,
	/// Return the highest-addressed gap large enough.
	Highest,
}

/// Executable program information.
#[derive(Clone)]
pub struct ExeInfo {
	/// The VFS node of the program loaded on this memory space.
	pub exe: Arc<vfs::node::Node>,
	/// Address to the beginning of program argument.
	pub argv_begin: VirtAddr,
	/// Address to the end of program argument.
	pub argv_end: VirtAddr,
	/// Address to the beginning of program environment.
	pub envp_begin: VirtAddr,
	/// Address to the end of program environment.
	pub envp_end: VirtAddr,
}

/// Converts a page-aligned virtual address to its virtual page number.
#[inline]
fn vpn_of(addr: VirtAddr) -> usize {
	addr.0 / PAGE_SIZE
}

/// Converts a virtual page number to its (page-aligned) virtual address.
#[inline]
fn addr_of(vpn: usize) -> VirtAddr {
	VirtAddr(vpn * PAGE_SIZE)
}

/// Builds the page table entry flags for a page belonging to an area with protection `prot`.
///
/// `write` tells whether the mapping should presently allow writing (used to lazily fault in
/// copy-on-write pages read-only until actually written).
fn pte_flags(prot: u8, write: bool) -> usize {
	let mut flags = FLAG_PRESENT | FLAG_USER;
	if write {
		flags |= FLAG_WRITE;
	}
	if prot & PROT_EXEC == 0 {
		flags |= FLAG_XD;
	}
	flags
}

/// A process's virtual memory space.
///
/// The space owns an ordered, disjoint set of [`VmArea`]s (the "vmmap") and the architecture
/// page table context ([`VMem`]) used as a lazily-populated cache of it: a page is only actually
/// mapped into `vmem` once a page fault (or an eager [`MemSpace::alloc`]) resolves it against
/// the area's memory object.
pub struct MemSpace {
	/// The set of virtual memory areas, keyed by their starting virtual page number.
	areas: BTreeMap<usize, VmArea>,
	/// Architecture-specific virtual memory context.
	vmem: VMem,

	/// The initial pointer of the `brk` system call.
	brk_init: VirtAddr,
	/// The current pointer of the `brk` system call.
	brk: VirtAddr,

	/// Executable program information.
	pub exe_info: ExeInfo,
}

impl MemSpace {
	/// Creates a new, empty virtual memory space.
	///
	/// `exe` is the VFS node of the program loaded on the memory space.
	pub fn new(exe: Arc<vfs::node::Node>) -> EResult<Self> {
		Ok(Self {
			areas: BTreeMap::new(),
			vmem: unsafe { VMem::new() },

			brk_init: VirtAddr::default(),
			brk: VirtAddr::default(),

			exe_info: ExeInfo {
				exe,
				argv_begin: Default::default(),
				argv_end: Default::default(),
				envp_begin: Default::default(),
				envp_end: Default::default(),
			},
		})
	}

	/// Returns the number of virtual memory pages currently mapped by an area.
	pub fn get_vmem_usage(&self) -> usize {
		self.areas.values().map(VmArea::npages).sum()
	}

	/// Binds the memory space's page table context to the current CPU.
	pub fn bind(&self) {
		self.vmem.bind();
	}

	/// Returns the area containing `vpn`, if any.
	fn lookup(&self, vpn: usize) -> Option<&VmArea> {
		self.areas
			.range(..=vpn)
			.next_back()
			.map(|(_, a)| a)
			.filter(|a| a.contains(vpn))
	}

	/// Returns a mutable reference to the area containing `vpn`, if any.
	fn lookup_mut(&mut self, vpn: usize) -> Option<&mut VmArea> {
		let start = self.areas.range(..=vpn).next_back().map(|(k, _)| *k)?;
		self.areas.get_mut(&start).filter(|a| a.contains(vpn))
	}

	/// Tells whether the range `[start_vpn, start_vpn + npages)` is free of any area.
	pub fn is_range_empty(&self, start_vpn: usize, npages: usize) -> bool {
		if npages == 0 {
			return true;
		}
		let end_vpn = start_vpn + npages;
		// An area starting at or before `start_vpn` and containing it overlaps the range.
		if self.lookup(start_vpn).is_some() {
			return false;
		}
		self.areas.range(start_vpn..end_vpn).next().is_none()
	}

	/// Finds a free range of `npages` contiguous pages within the user address space.
	///
	/// Returns the virtual page number of the first page of the range, or `None` if no such
	/// range exists.
	pub fn find_range(&self, npages: usize, dir: MapDir) -> Option<usize> {
		let low = vpn_of(VirtAddr(PAGE_SIZE));
		let high = vpn_of(PROCESS_END);
		if npages == 0 || npages > high - low {
			return None;
		}
		// Candidate boundaries: the low bound, the end of every area, in increasing order.
		let mut bounds: utils::collections::vec::Vec<usize> = utils::collections::vec::Vec::new();
		let _ = bounds.push(low);
		for area in self.areas.values() {
			let _ = bounds.push(area.end_vpn);
		}
		let mut candidates = utils::collections::vec::Vec::new();
		for &start in bounds.iter() {
			let end = start + npages;
			if end > high {
				continue;
			}
			if self.is_range_empty(start, npages) {
				let _ = candidates.push(start);
			}
		}
		match dir {
			MapDir::Lowest => candidates.iter().min().copied(),
			MapDir::Highest => candidates.iter().max().copied(),
		}
	}

	/// Inserts `area` into the map.
	///
	/// # Panics
	///
	/// Panics (in debug builds) if `area` overlaps an existing area.
	fn insert_area(&mut self, area: VmArea) {
		debug_assert!(self.is_range_empty(area.start_vpn, area.npages()));
		self.areas.insert(area.start_vpn, area);
	}

	/// Maps `npages` pages backed by `mmobj` (or a fresh anonymous object if `None`) into the
	/// address space.
	///
	/// Arguments:
	/// - `mmobj` is the memory object to map, or `None` for an anonymous mapping.
	/// - `lopage` is the hinted (or, with [`MAP_FIXED`], mandatory) starting virtual page number.
	/// - `npages` is the length of the mapping, in pages.
	/// - `prot` is the memory protection, a bitset of `PROT_*`.
	/// - `flags` is a bitset of `MAP_*`.
	/// - `offset_pages` is the starting page index within `mmobj`'s window.
	/// - `dir` picks the gap to use when the hint cannot be honored and `MAP_FIXED` is not set.
	///
	/// On success, returns the chosen starting virtual page number.
	#[allow(clippy::too_many_arguments)]
	pub fn map(
		&mut self,
		mmobj: Option<Mmobj>,
		lopage: usize,
		npages: usize,
		prot: u8,
		flags: u8,
		offset_pages: usize,
		dir: MapDir,
	) -> EResult<usize> {
		if npages == 0 || flags & (MAP_PRIVATE | MAP_SHARED) == 0 {
			return Err(errno!(EINVAL));
		}
		let start_vpn = if flags & MAP_FIXED != 0 {
			if !self.is_range_empty(lopage, npages) {
				return Err(errno!(EINVAL));
			}
			lopage
		} else if self.is_range_empty(lopage, npages) {
			lopage
		} else {
			self.find_range(npages, dir).ok_or(errno!(ENOMEM))?
		};
		// Resolve the backing object before touching the map: a node is shared as-is (the page
		// cache lives on the node), anonymous and private-file mappings each get their own.
		let obj = match mmobj {
			Some(o) => o,
			None => Mmobj::new_anonymous()?,
		};
		let area = VmArea::new(
			start_vpn,
			start_vpn + npages,
			offset_pages,
			prot,
			flags,
			obj,
		);
		self.insert_area(area);
		Ok(start_vpn)
	}

	/// Splits `area` to remove the sub-range `[lo, lo + n)`, which must be fully contained in it.
	///
	/// Returns the area(s) that replace it: `(Some(left), Some(right))` when the removed range
	/// is strictly inside, a single side when it touches an end, or `(None, None)` when the whole
	/// area is consumed.
	fn split_area(area: &VmArea, lo: usize, n: usize) -> (Option<VmArea>, Option<VmArea>) {
		let hi = lo + n;
		debug_assert!(area.start_vpn <= lo && hi <= area.end_vpn);
		let starts_at_area_start = lo == area.start_vpn;
		let ends_at_area_end = hi == area.end_vpn;
		match (starts_at_area_start, ends_at_area_end) {
			// Case 4: the removed range covers the whole area.
			(true, true) => (None, None),
			// Case 3: the removed range covers the head; advance the start.
			(true, false) => {
				let mut right = area.clone();
				right.start_vpn = hi;
				right.offset_pages += n;
				(None, Some(right))
			}
			// Case 2: the removed range covers the tail; shorten the end.
			(false, true) => {
				let mut left = area.clone();
				left.end_vpn = lo;
				(Some(left), None)
			}
			// Case 1: the removed range is strictly inside; split in two, the right half takes
			// a fresh reference on the same object.
			(false, false) => {
				let mut left = area.clone();
				left.end_vpn = lo;
				let mut right = area.clone();
				right.start_vpn = hi;
				right.offset_pages += hi - area.start_vpn;
				(Some(left), Some(right))
			}
		}
	}

	/// Removes the mapping covering `[lopage, lopage + npages)`, unmapping and shooting down any
	/// page table entries it had installed.
	pub fn remove(&mut self, lopage: usize, npages: usize) -> EResult<()> {
		if npages == 0 {
			return Ok(());
		}
		let hi = lopage + npages;
		// Collect the starts of every area overlapping the range; a `remove` on the map while
		// iterating it would be unsound, so gather first.
		let mut starts = utils::collections::vec::Vec::new();
		if let Some(before) = self.lookup(lopage) {
			if before.end_vpn > lopage {
				let _ = starts.push(before.start_vpn);
			}
		}
		for (&start, _) in self.areas.range(lopage..hi) {
			if starts.last() != Some(&start) {
				let _ = starts.push(start);
			}
		}
		for start in starts {
			let Some(area) = self.areas.remove(&start) else {
				continue;
			};
			let lo = max(area.start_vpn, lopage);
			let cut_hi = core::cmp::min(area.end_vpn, hi);
			let (left, right) = Self::split_area(&area, lo, cut_hi - lo);
			if let Some(left) = left {
				self.areas.insert(left.start_vpn, left);
			}
			if let Some(right) = right {
				self.areas.insert(right.start_vpn, right);
			}
			self.vmem.unmap_range(addr_of(lo), cut_hi - lo);
		}
		vmem::shootdown_range(addr_of(lopage), npages);
		Ok(())
	}

	/// Tells whether the given access is legal for the process, for use by user-space pointer
	/// validation in the syscall layer.
	///
	/// `user` selects whether the pointer is expected to point to userspace memory; `write`
	/// whether the access is a write.
	pub fn can_access(&self, addr: *const c_void, size: usize, user: bool, write: bool) -> bool {
		if size == 0 {
			return true;
		}
		let start = VirtAddr::from(addr);
		if user && start.0 >= PROCESS_END.0 {
			return false;
		}
		let start_vpn = vpn_of(start.down_align_to(PAGE_SIZE));
		let end_vpn = vpn_of((start + size - 1).down_align_to(PAGE_SIZE)) + 1;
		let mut vpn = start_vpn;
		while vpn < end_vpn {
			let Some(area) = self.lookup(vpn) else {
				return false;
			};
			if write && area.prot & PROT_WRITE == 0 {
				return false;
			}
			if !write && area.prot & PROT_READ == 0 {
				return false;
			}
			vpn = area.end_vpn;
		}
		true
	}

	/// Like [`Self::can_access`], but for a NUL-terminated string: scans memory starting at
	/// `ptr`, validating access page by page, and returns the string's length (excluding the
	/// terminator) once found, or `None` if access is denied before one is.
	pub fn can_access_string(&self, ptr: *const u8, user: bool, write: bool) -> Option<usize> {
		let mut addr = VirtAddr::from(ptr);
		let mut len = 0usize;
		loop {
			let page_off = addr.0 % PAGE_SIZE;
			let chunk = PAGE_SIZE - page_off;
			if !self.can_access(addr.as_ptr::<c_void>(), chunk, user, write) {
				return None;
			}
			let slice = unsafe { core::slice::from_raw_parts(addr.as_ptr::<u8>(), chunk) };
			if let Some(pos) = slice.iter().position(|&b| b == 0) {
				return Some(len + pos);
			}
			len += chunk;
			addr = addr + chunk;
		}
	}

	/// Eagerly faults in and maps `size` bytes starting at `addr`, which must already be covered
	/// by areas with write permission if `size` spans a write-intended buffer.
	///
	/// Used to pre-fault pages a syscall is about to hand to the kernel itself (e.g. a signal
	/// frame), where taking a fault from kernel mode is not desirable.
	pub fn alloc(&mut self, addr: *const c_void, size: usize) -> EResult<()> {
		if size == 0 {
			return Ok(());
		}
		let start = VirtAddr::from(addr);
		let start_vpn = vpn_of(start.down_align_to(PAGE_SIZE));
		let end_vpn = vpn_of((start + size - 1).down_align_to(PAGE_SIZE)) + 1;
		for vpn in start_vpn..end_vpn {
			if self.vmem.translate(addr_of(vpn)).is_some() {
				continue;
			}
			self.install_page(vpn, true)?;
		}
		Ok(())
	}

	/// Resolves and installs the page table entry for `vpn`, which must be covered by an area.
	fn install_page(&mut self, vpn: usize, for_write: bool) -> EResult<()> {
		let Some(area) = self.lookup_mut(vpn) else {
			return Err(errno!(EFAULT));
		};
		let page_index = area.page_index(vpn);
		let frame = area.mmobj.lookup_page(page_index as u64, for_write)?;
		if for_write {
			area.mmobj.dirty_page(&frame);
		}
		let writable = for_write && area.prot & PROT_WRITE != 0;
		let prot = area.prot;
		self.vmem.map(frame.phys_addr(), addr_of(vpn), pte_flags(prot, writable));
		Ok(())
	}

	/// Handles a page fault at `addr`.
	///
	/// `code` is the architecture fault-cause bitmask (`PAGE_FAULT_*`).
	///
	/// Returns `true` if the fault was resolved and execution may resume, `false` if the access
	/// was illegal and the process should be terminated.
	pub fn handle_page_fault(&mut self, addr: *const c_void, code: u32) -> bool {
		let addr = VirtAddr::from(addr);
		let vpn = vpn_of(addr.down_align_to(PAGE_SIZE));
		let Some(area) = self.lookup(vpn) else {
			return false;
		};
		let write = code & PAGE_FAULT_WRITE != 0;
		if write && area.prot & PROT_WRITE == 0 {
			return false;
		}
		if code & PAGE_FAULT_INSTRUCTION != 0 && area.prot & PROT_EXEC == 0 {
			return false;
		}
		if area.prot == PROT_NONE {
			return false;
		}
		self.install_page(vpn, write).is_ok()
	}

	/// Reads `buf.len()` bytes starting at page `lopage`, offset `off` within it, performing no
	/// permission check beyond the existence of a backing area.
	pub fn read(&self, lopage: usize, off: usize, buf: &mut [u8]) -> EResult<()> {
		let mut vpn = lopage;
		let mut pos = off;
		let mut done = 0;
		while done < buf.len() {
			let area = self.lookup(vpn).ok_or(errno!(EFAULT))?;
			let frame = area.mmobj.lookup_page(area.page_index(vpn) as u64, false)?;
			let chunk = core::cmp::min(PAGE_SIZE - pos, buf.len() - done);
			let src = frame.slice::<u8>();
			buf[done..done + chunk].copy_from_slice(&src[pos..pos + chunk]);
			done += chunk;
			pos = 0;
			vpn += 1;
		}
		Ok(())
	}

	/// Writes `buf` starting at page `lopage`, offset `off` within it, dirtying every page
	/// touched.
	pub fn write(&self, lopage: usize, off: usize, buf: &[u8]) -> EResult<()> {
		let mut vpn = lopage;
		let mut pos = off;
		let mut done = 0;
		while done < buf.len() {
			let area = self.lookup(vpn).ok_or(errno!(EFAULT))?;
			let frame = area.mmobj.lookup_page(area.page_index(vpn) as u64, true)?;
			let chunk = core::cmp::min(PAGE_SIZE - pos, buf.len() - done);
			// SAFETY: the frame was just looked up for writing and is not concurrently
			// accessed through the fault handler while the memory space is locked.
			let dst = unsafe {
				core::slice::from_raw_parts_mut(frame.virt_addr().as_ptr::<u8>(), PAGE_SIZE)
			};
			dst[pos..pos + chunk].copy_from_slice(&buf[done..done + chunk]);
			area.mmobj.dirty_page(&frame);
			done += chunk;
			pos = 0;
			vpn += 1;
		}
		Ok(())
	}

	/// Sets the initial pointer for the `brk` syscall and establishes the minimal heap area
	/// "the page just below the break" always resolves against.
	///
	/// This function MUST be called *only once*, before the program starts. `addr` MUST be
	/// page-aligned.
	pub fn set_brk_init(&mut self, addr: VirtAddr) -> EResult<()> {
		debug_assert!(addr.is_aligned_to(PAGE_SIZE));
		self.brk_init = addr;
		self.brk = addr;
		let vpn = vpn_of(addr);
		if self.lookup(vpn).is_none() {
			let mmobj = Mmobj::new_anonymous()?;
			self.insert_area(VmArea::new(
				vpn,
				vpn + 1,
				0,
				PROT_READ | PROT_WRITE,
				MAP_PRIVATE | MAP_ANONYMOUS,
				mmobj,
			));
		}
		Ok(())
	}

	/// Returns the current `brk` pointer.
	pub fn get_brk(&self) -> VirtAddr {
		self.brk
	}

	/// Performs the `brk` system call: moves the end of the heap to `addr`.
	///
	/// On failure, the function does nothing and returns the current break.
	pub fn set_brk(&mut self, addr: VirtAddr) -> VirtAddr {
		let old = self.brk;
		if addr == old || addr < self.brk_init || addr > PROCESS_END {
			return old;
		}
		// The area containing the page just below the current break; `set_brk_init` guarantees
		// one always exists.
		let Some(heap_start) = self.lookup(vpn_of(old - 1)).map(|a| a.start_vpn) else {
			return old;
		};
		if addr > old {
			let new_end_vpn = vpn_of(addr.align_to(PAGE_SIZE));
			let area_end = self.areas.get(&heap_start).unwrap().end_vpn;
			if new_end_vpn > area_end && !self.is_range_empty(area_end, new_end_vpn - area_end) {
				return old;
			}
			if new_end_vpn > area_end {
				self.areas.get_mut(&heap_start).unwrap().end_vpn = new_end_vpn;
			}
		} else {
			let new_end_vpn = max(vpn_of(addr.align_to(PAGE_SIZE)), heap_start + 1);
			let area = self.areas.get_mut(&heap_start).unwrap();
			let old_end_vpn = area.end_vpn;
			area.end_vpn = new_end_vpn;
			if new_end_vpn < old_end_vpn {
				let freed = addr_of(new_end_vpn);
				let pages = old_end_vpn - new_end_vpn;
				self.vmem.unmap_range(freed, pages);
				vmem::shootdown_range(freed, pages);
			}
		}
		self.brk = addr;
		addr
	}

	/// Clones this memory space for `fork`, giving private areas copy-on-write semantics by
	/// interposing a fresh shadow object between each of the parent's and the child's.
	///
	/// After this call, every page table entry for a private area in *this* (the parent) memory
	/// space has been invalidated: the next access to any of them, by either process, takes a
	/// fault and gets resolved through the shadow chain.
	pub fn fork(&mut self) -> EResult<MemSpace> {
		let mut child_areas = BTreeMap::new();
		for (&start, area) in self.areas.iter_mut() {
			let mut child_area = area.clone();
			if area.is_private() {
				// Interpose a fresh shadow on each side, both directly above the object the
				// parent area used before the fork: neither parent nor child keeps writing
				// through a shadow the other might still be reading pages from.
				let shadowed = area.mmobj.clone();
				area.mmobj = Mmobj::new_shadow(shadowed.clone())?;
				child_area.mmobj = Mmobj::new_shadow(shadowed)?;
			}
			child_areas.insert(start, child_area);
		}
		// Drop every stale PTE for a private area: both copies must now fault through their
		// respective shadow to pick up the right object.
		for area in self.areas.values().filter(|a| a.is_private()) {
			self.vmem.unmap_range(addr_of(area.start_vpn), area.npages());
		}
		vmem::flush();
		Ok(Self {
			areas: child_areas,
			vmem: unsafe { VMem::new() },

			brk_init: self.brk_init,
			brk: self.brk,

			exe_info: self.exe_info.clone(),
		})
	}
}

impl fmt::Debug for MemSpace {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemSpace")
			.field("areas", &self.areas.len())
			.field("brk", &self.brk)
			.finish()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::file::{fs::TmpFileOps, vfs::node::Node, Stat};
	use utils::boxed::Box;

	fn dummy_space() -> MemSpace {
		let node = Node::new(Box::new(TmpFileOps::new(Stat::default())).unwrap()).unwrap();
		MemSpace::new(node).unwrap()
	}

	#[test_case]
	fn mem_space_map_anon() {
		let mut space = dummy_space();
		let lopage = space
			.map(
				None,
				0,
				4,
				PROT_READ | PROT_WRITE,
				MAP_PRIVATE | MAP_ANONYMOUS,
				0,
				MapDir::Highest,
			)
			.unwrap();
		assert!(!space.is_range_empty(lopage, 4));
		assert_eq!(space.get_vmem_usage(), 4);
	}

	#[test_case]
	fn mem_space_map_rejects_bad_flags() {
		let mut space = dummy_space();
		assert!(space.map(None, 0, 1, PROT_READ, 0, 0, MapDir::Highest).is_err());
	}

	#[test_case]
	fn mem_space_remove_splits_area() {
		let mut space = dummy_space();
		let lopage = space
			.map(
				None,
				0,
				8,
				PROT_READ | PROT_WRITE,
				MAP_PRIVATE | MAP_ANONYMOUS,
				0,
				MapDir::Highest,
			)
			.unwrap();
		// Punch a hole in the middle of the area.
		space.remove(lopage + 3, 2).unwrap();
		assert!(space.lookup(lopage + 3).is_none());
		assert!(space.lookup(lopage).is_some());
		assert!(space.lookup(lopage + 7).is_some());
		assert_eq!(space.get_vmem_usage(), 6);
	}

	#[test_case]
	fn mem_space_find_range_avoids_existing_areas() {
		let mut space = dummy_space();
		let first = space
			.map(
				None,
				0,
				2,
				PROT_READ | PROT_WRITE,
				MAP_PRIVATE | MAP_ANONYMOUS,
				0,
				MapDir::Lowest,
			)
			.unwrap();
		let second = space.find_range(2, MapDir::Lowest).unwrap();
		assert!(second >= first + 2 || second + 2 <= first);
	}

	#[test_case]
	fn mem_space_brk_grows_and_shrinks() {
		let mut space = dummy_space();
		space.set_brk_init(VirtAddr(PAGE_SIZE)).unwrap();
		let initial = space.get_brk();
		let grown = space.set_brk(initial + PAGE_SIZE * 4);
		assert_eq!(grown, initial + PAGE_SIZE * 4);
		let shrunk = space.set_brk(initial + PAGE_SIZE);
		assert_eq!(shrunk, initial + PAGE_SIZE);
		// Requesting below the initial break is a no-op.
		assert_eq!(space.set_brk(VirtAddr(0)), shrunk);
	}

	#[test_case]
	fn mem_space_fork_gives_independent_shadows() {
		let mut space = dummy_space();
		space
			.map(
				None,
				0,
				1,
				PROT_READ | PROT_WRITE,
				MAP_PRIVATE | MAP_ANONYMOUS,
				0,
				MapDir::Lowest,
			)
			.unwrap();
		let child = space.fork().unwrap();
		let parent_area = space.lookup(0).unwrap();
		let child_area = child.lookup(0).unwrap();
		assert!(parent_area.mmobj.is_shadow());
		assert!(child_area.mmobj.is_shadow());
		assert_eq!(parent_area.mmobj.bottom().is_shadow(), false);
	}
}
