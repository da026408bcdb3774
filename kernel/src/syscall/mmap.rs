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

//! The `mmap` system call allows the process to allocate memory.

use crate::{
	file::FileType,
	memory,
	memory::mmobj::Mmobj,
	process::{
		mem_space,
		mem_space::{MapDir, MAP_ANONYMOUS, MAP_FIXED, MAP_PRIVATE, MAP_SHARED},
		Process,
	},
};
use core::ffi::{c_int, c_void};
use macros::syscall;
use utils::{
	errno,
	errno::{EResult, Errno},
};

/// Data can be read.
pub const PROT_READ: i32 = mem_space::PROT_READ as i32;
/// Data can be written.
pub const PROT_WRITE: i32 = mem_space::PROT_WRITE as i32;
/// Data can be executed.
pub const PROT_EXEC: i32 = mem_space::PROT_EXEC as i32;

/// Converts the raw `prot` argument to a bitset of `mem_space::PROT_*`.
fn get_prot(prot: i32) -> u8 {
	prot as u8 & (mem_space::PROT_READ | mem_space::PROT_WRITE | mem_space::PROT_EXEC)
}

/// Converts the raw `flags` argument to a bitset of `mem_space::MAP_*`.
fn get_flags(flags: i32) -> u8 {
	flags as u8 & (MAP_SHARED | MAP_PRIVATE | MAP_FIXED | MAP_ANONYMOUS)
}

/// Performs the `mmap` system call.
///
/// This function takes a `u64` for `offset` to allow implementing the `mmap2`
/// syscall.
pub fn do_mmap(
	addr: *mut c_void,
	length: usize,
	prot: i32,
	flags: i32,
	fd: i32,
	offset: u64,
) -> EResult<i32> {
	// Check alignment of `addr` and `length`
	if !addr.is_aligned_to(memory::PAGE_SIZE) || length == 0 {
		return Err(errno!(EINVAL));
	}
	// The length in number of pages
	let npages = length.div_ceil(memory::PAGE_SIZE);
	// Check for overflow
	let end = (addr as usize).wrapping_add(npages * memory::PAGE_SIZE);
	if end < addr as usize {
		return Err(errno!(EINVAL));
	}
	let mem_flags = get_flags(flags);
	let prot = get_prot(prot);
	if mem_flags & (MAP_PRIVATE | MAP_SHARED) == 0 {
		return Err(errno!(EINVAL));
	}
	// Get the current process
	let proc_mutex = Process::current_assert();
	let proc = proc_mutex.lock();
	// The object backing the mapping: a private/shared window into the file's page cache, or
	// `None` for an anonymous mapping.
	let mmobj = if mem_flags & MAP_ANONYMOUS == 0 {
		if offset as usize % memory::PAGE_SIZE != 0 {
			return Err(errno!(EINVAL));
		}
		let fd_table = proc.file_descriptors.as_ref().unwrap().lock();
		let file = fd_table.get_fd(fd)?.get_file();
		let stat = file.stat()?;
		if !matches!(stat.get_type(), Some(FileType::Regular)) {
			return Err(errno!(EACCES));
		}
		if prot & mem_space::PROT_READ != 0 && !proc.access_profile.can_read_file(&stat) {
			return Err(errno!(EPERM));
		}
		if prot & mem_space::PROT_WRITE != 0 && !proc.access_profile.can_write_file(&stat) {
			return Err(errno!(EPERM));
		}
		if prot & mem_space::PROT_EXEC != 0 && !proc.access_profile.can_execute_file(&stat) {
			return Err(errno!(EPERM));
		}
		Some(Mmobj::new_file(file.node.clone())?)
	} else {
		if fd >= 0 {
			return Err(errno!(EINVAL));
		}
		None
	};
	let offset_pages = (offset / memory::PAGE_SIZE as u64) as usize;
	// The process's memory space
	let mem_space_mutex = proc.get_mem_space().unwrap();
	let mut mem_space = mem_space_mutex.lock();
	// A hint or fixed address is honored as-is; otherwise a free range is picked, since an empty
	// `lopage` of 0 would otherwise be mistaken by `map` for a legitimate (and always free) hint.
	let lopage = if addr.is_null() {
		mem_space
			.find_range(npages, MapDir::Highest)
			.ok_or(errno!(ENOMEM))?
	} else {
		(addr as usize) / memory::PAGE_SIZE
	};
	let start_vpn = mem_space.map(
		mmobj,
		lopage,
		npages,
		prot,
		mem_flags,
		offset_pages,
		MapDir::Highest,
	)?;
	Ok((start_vpn * memory::PAGE_SIZE) as _)
}

// TODO Check last arg type
#[syscall]
pub fn mmap(
	addr: *mut c_void,
	length: usize,
	prot: c_int,
	flags: c_int,
	fd: c_int,
	offset: u64,
) -> Result<i32, Errno> {
	do_mmap(addr, length, prot, flags, fd, offset as _)
}
