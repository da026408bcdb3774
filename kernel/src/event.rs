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

//! Interrupt callback register interface.
//!
//! This is the dispatch layer sitting behind the CPU's raw interrupt gates: each gate's
//! assembly trampoline saves the register state into a [`Regs`] and calls [`dispatch`], which
//! runs the callbacks registered for that vector in order.

use crate::{arch::x86::idt::ENTRIES_COUNT, process::regs::Regs};
use core::ptr;
use utils::{collections::vec::Vec, errno::AllocResult, lock::IntMutex};

/// The action to execute after an interrupt callback has returned.
pub enum CallbackResult {
	/// Executes the remaining callbacks for the interrupt.
	Continue,
	/// Stops running callbacks for the interrupt and lets the scheduler pick a new process to
	/// run.
	Idle,
	/// Makes the kernel panic with a message corresponding to the interruption.
	Panic,
}

/// A callback to handle an interruption.
///
/// Arguments:
/// - `id` is the id of the interrupt.
/// - `code` is an optional code associated with the interrupt. If no code is given, the value is
///   `0`.
/// - `regs` are the values of the registers when the interruption was triggered.
/// - `ring` tells the ring at which the code was running.
pub type Callback = fn(u32, u32, &Regs, u32) -> CallbackResult;

/// Structure used to detect whenever the object owning the callback is destroyed, allowing to
/// unregister it automatically.
#[must_use]
pub struct CallbackHook {
	/// The id of the interrupt the callback is bound to.
	id: u32,
	/// The pointer of the callback.
	callback: Callback,
}

impl Drop for CallbackHook {
	fn drop(&mut self) {
		let mut vec = CALLBACKS[self.id as usize].lock();
		let i = vec
			.iter()
			.enumerate()
			.find(|(_, c)| ptr::fn_addr_eq(**c, self.callback))
			.map(|(i, _)| i);
		if let Some(i) = i {
			vec.remove(i);
		}
	}
}

/// The default value for `CALLBACKS`.
#[allow(clippy::declare_interior_mutable_const)]
const CALLBACKS_INIT: IntMutex<Vec<Callback>> = IntMutex::new(Vec::new());
/// The list of callbacks registered for each interrupt vector.
static CALLBACKS: [IntMutex<Vec<Callback>>; ENTRIES_COUNT] = [CALLBACKS_INIT; ENTRIES_COUNT];

/// Registers the given callback and returns a hook to it.
///
/// The latest registered callback is executed last. Thus, a callback that is registered first
/// can prevent next callbacks from being executed.
///
/// If the provided ID is invalid, the function returns `None`.
pub fn register_callback(id: u32, callback: Callback) -> AllocResult<Option<CallbackHook>> {
	let Some(callbacks) = CALLBACKS.get(id as usize) else {
		return Ok(None);
	};
	callbacks.lock().push(callback)?;
	Ok(Some(CallbackHook {
		id,
		callback,
	}))
}

/// Forcibly unlocks the callback list for the given vector.
///
/// This is required when [`CallbackResult::Idle`] causes a jump into another process's context:
/// the interrupt handler never returns normally, so the lock guard held while iterating
/// callbacks is never dropped.
///
/// # Safety
///
/// The caller must ensure no other thread is concurrently accessing the callback list for
/// `vector`.
pub unsafe fn unlock_callbacks(vector: u32) {
	if let Some(callbacks) = CALLBACKS.get(vector as usize) {
		unsafe {
			callbacks.force_unlock();
		}
	}
}

/// The number of CPU exception vectors, before the remapped IRQ vectors begin.
const EXCEPTIONS_COUNT: u32 = 0x20;

/// Called by the architecture-specific interrupt trampoline whenever an interruption is
/// triggered.
///
/// Arguments:
/// - `id` is the interrupt vector.
/// - `code` is the error code associated with the interrupt, or `0`.
/// - `regs` is the saved register state of the interrupted context.
/// - `ring` is the privilege level the interrupted code was running at.
#[unsafe(no_mangle)]
extern "C" fn interrupt_handler(id: u32, code: u32, regs: &Regs, ring: u32) {
	if let Some(callbacks) = CALLBACKS.get(id as usize) {
		let mut i = 0;
		loop {
			// Not putting this in a loop's condition to ensure the guard is dropped each turn
			let Some(callback) = callbacks.lock().get(i).cloned() else {
				break;
			};
			i += 1;
			match callback(id, code, regs, ring) {
				CallbackResult::Continue => {}
				CallbackResult::Idle => break,
				CallbackResult::Panic => panic!("unhandled interrupt {id}, code: {code:x}"),
			}
		}
	}
	// Hardware IRQs (as opposed to CPU exceptions) require an explicit End Of Interrupt
	if let Some(irq) = id.checked_sub(EXCEPTIONS_COUNT) {
		crate::arch::end_of_interrupt(irq as _);
	}
}
