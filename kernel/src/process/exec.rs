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

//! Program execution replaces a process's memory space with a fresh one built around a target
//! executable, then hands off the initial CPU context to it.

use crate::{
	file::{
		path::{Path, PathBuf},
		vfs,
		vfs::{ResolutionSettings, Resolved},
	},
	memory::VirtAddr,
	process::{
		Process, USER_STACK_FLAGS, USER_STACK_PROT, USER_STACK_SIZE,
		mem_space::{MapDir, MemSpace},
		regs::Regs,
	},
};
use utils::{
	collections::{string::String, vec::Vec},
	errno,
	errno::EResult,
	limits::PAGE_SIZE,
	lock::IntMutex,
	ptr::arc::Arc,
};

/// Replaces `proc`'s memory space with a fresh one set up to run the executable pointed to by
/// `argv[0]`, resolved using `rs`.
///
/// `envp` becomes the new process's environment.
///
/// The calling thread's own memory space and registers are left untouched until this function
/// returns successfully, at which point they have both been replaced: a failure midway through
/// never leaves `proc` partially transitioned.
pub fn exec(
	proc_mutex: &Arc<IntMutex<Process>>,
	rs: &ResolutionSettings,
	argv: Vec<String>,
	envp: Vec<String>,
) -> EResult<()> {
	let path = argv.first().ok_or(errno!(ENOEXEC))?;
	let node = match vfs::resolve_path(Path::new(path.as_bytes())?, rs)? {
		Resolved::Found(node) => node,
		Resolved::Creatable {
			..
		} => return Err(errno!(ENOENT)),
	};
	let mut mem_space = MemSpace::new(node)?;
	// Reserve the low guard page, then start the heap right after it. The actual program break
	// is advanced by the `brk` syscall; real segment placement is the job of the program loader.
	mem_space.set_brk_init(VirtAddr(PAGE_SIZE))?;
	// Map the user stack at the top of the user address space.
	let stack_top = mem_space
		.find_range(USER_STACK_SIZE, MapDir::Highest)
		.ok_or(errno!(ENOMEM))?;
	mem_space.map(
		None,
		stack_top,
		USER_STACK_SIZE,
		USER_STACK_PROT,
		USER_STACK_FLAGS,
		0,
		MapDir::Highest,
	)?;
	let stack_bottom = VirtAddr((stack_top + USER_STACK_SIZE) * PAGE_SIZE);
	// TODO: parse the ELF program headers of `mem_space.exe_info.exe`, map its `PT_LOAD`
	// segments through the memory space and point `regs.eip` at its entry point. No ELF loader
	// exists yet in this tree; until one is written, a process transitioned through `exec` has
	// a valid address space and stack but no executable code mapped.
	let mut regs = Regs::default();
	regs.esp = stack_bottom.0 as u32;
	let exec_path = PathBuf::try_from(path.as_bytes())?;
	let mem_space = Arc::new(IntMutex::new(mem_space))?;
	let mut proc = proc_mutex.lock();
	proc.exec_path = Arc::new(exec_path)?;
	proc.argv = Arc::new(argv)?;
	proc.set_mem_space(Some(mem_space));
	proc.regs = regs;
	let _ = envp;
	Ok(())
}
