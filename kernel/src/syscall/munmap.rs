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

//! The `munmap` system call allows the process to free memory that was
//! allocated with `mmap`.

use crate::{memory, memory::VirtAddr, process::Process};
use core::{ffi::c_void, intrinsics::unlikely};
use macros::syscall;
use utils::{
	errno,
	errno::Errno,
	limits::PAGE_SIZE,
};

#[syscall]
pub fn munmap(addr: *mut c_void, length: usize) -> Result<i32, Errno> {
	let addr = VirtAddr::from(addr);
	// Check address alignment
	if !addr.is_aligned_to(PAGE_SIZE) || length == 0 {
		return Err(errno!(EINVAL));
	}
	let npages = length.div_ceil(PAGE_SIZE);
	// Check for overflow
	let Some(end) = addr.0.checked_add(npages * PAGE_SIZE) else {
		return Err(errno!(EINVAL));
	};
	// Prevent from unmapping kernel memory
	if unlikely(end > memory::PROCESS_END.0) {
		return Err(errno!(EINVAL));
	}
	let proc_mutex = Process::current_assert();
	let proc = proc_mutex.lock();
	let mem_space_mutex = proc.get_mem_space().unwrap();
	let lopage = addr.0 / PAGE_SIZE;
	mem_space_mutex.lock().remove(lopage, npages)?;
	Ok(0)
}
