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

//! POSIX-style implementation limits.

/// The size of a memory page in bytes.
pub const PAGE_SIZE: usize = 0x1000;
/// Maximum length of a path, in bytes.
pub const PATH_MAX: usize = 4096;
/// Maximum number of file descriptors a process may open at once.
pub const OPEN_MAX: usize = 256;
/// Maximum number of `iovec` entries in a single scatter/gather call.
pub const IOV_MAX: usize = 1024;
/// Maximum number of per-process timers.
pub const TIMER_MAX: usize = 32;
