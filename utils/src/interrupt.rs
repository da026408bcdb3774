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

//! Architecture-independent wrappers for masking/unmasking hardware interrupts.
//!
//! The `utils` crate has no access to `crate::arch`, so these are implemented directly with
//! inline assembly on the architectures the kernel targets.

/// Disables maskable interrupts.
#[inline(always)]
pub fn cli() {
	#[cfg(target_arch = "x86")]
	unsafe {
		core::arch::asm!("cli");
	}
}

/// Enables maskable interrupts.
#[inline(always)]
pub fn sti() {
	#[cfg(target_arch = "x86")]
	unsafe {
		core::arch::asm!("sti");
	}
}

/// Tells whether maskable interrupts are currently enabled.
#[inline(always)]
pub fn is_interrupt_enabled() -> bool {
	#[cfg(target_arch = "x86")]
	{
		let flags: u32;
		unsafe {
			core::arch::asm!("pushfd", "pop {0}", out(reg) flags);
		}
		flags & 0x200 != 0
	}
	#[cfg(not(target_arch = "x86"))]
	{
		true
	}
}
