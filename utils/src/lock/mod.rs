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

//! Spinlock-based mutual exclusion.
//!
//! [`Mutex`] is a plain spinlock; [`IntMutex`] additionally masks maskable interrupts while
//! held, for state that must also be protected against the current CPU's own interrupt handlers
//! (e.g. a process table entry touched by both syscall and fault-handler context).
//!
//! This is the low-level primitive the rest of the kernel builds sleeping locks and wait queues
//! on top of; it has no notion of a scheduler, since `utils` sits below `kernel::process`.

pub mod once;

use crate::interrupt::{cli, is_interrupt_enabled, sti};
use core::{
	cell::UnsafeCell,
	fmt,
	hint,
	ops::{Deref, DerefMut},
	sync::atomic::{
		AtomicBool,
		Ordering::{Acquire, Release},
	},
};

/// A mutual-exclusion lock, optionally masking interrupts while held.
///
/// `INT` selects whether interrupts stay enabled (`true`, the [`Mutex`] alias) or are masked
/// (`false`, the [`IntMutex`] alias) for the duration of the critical section.
pub struct Lock<T: ?Sized, const INT: bool> {
	locked: AtomicBool,
	data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send, const INT: bool> Sync for Lock<T, INT> {}
unsafe impl<T: ?Sized + Send, const INT: bool> Send for Lock<T, INT> {}

impl<T, const INT: bool> Lock<T, INT> {
	/// Creates a new, unlocked instance wrapping `data`.
	pub const fn new(data: T) -> Self {
		Self {
			locked: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}
}

impl<T: ?Sized, const INT: bool> Lock<T, INT> {
	/// Acquires the lock, busy-waiting until it is free.
	pub fn lock(&self) -> LockGuard<T, INT> {
		let int_state = if !INT {
			let enabled = is_interrupt_enabled();
			cli();
			enabled
		} else {
			false
		};
		while self.locked.swap(true, Acquire) {
			hint::spin_loop();
		}
		LockGuard {
			lock: self,
			int_state,
		}
	}
}

impl<T: Default, const INT: bool> Default for Lock<T, INT> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

impl<T: ?Sized + fmt::Debug, const INT: bool> fmt::Debug for Lock<T, INT> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.lock(), f)
	}
}

/// A guard giving exclusive access to the value protected by a [`Lock`]. Releases the lock when
/// dropped.
pub struct LockGuard<'l, T: ?Sized, const INT: bool> {
	lock: &'l Lock<T, INT>,
	int_state: bool,
}

impl<T: ?Sized, const INT: bool> Deref for LockGuard<'_, T, INT> {
	type Target = T;

	fn deref(&self) -> &T {
		unsafe { &*self.lock.data.get() }
	}
}

impl<T: ?Sized, const INT: bool> DerefMut for LockGuard<'_, T, INT> {
	fn deref_mut(&mut self) -> &mut T {
		unsafe { &mut *self.lock.data.get() }
	}
}

impl<T: ?Sized, const INT: bool> Drop for LockGuard<'_, T, INT> {
	fn drop(&mut self) {
		self.lock.locked.store(false, Release);
		if !INT && self.int_state {
			sti();
		}
	}
}

/// A spinlock that leaves interrupts enabled while held.
pub type Mutex<T> = Lock<T, true>;
/// A spinlock that masks interrupts while held, for state also touched by interrupt/fault
/// handlers.
pub type IntMutex<T> = Lock<T, false>;
