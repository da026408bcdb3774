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

//! Byte-level (re)interpretation helpers.

/// Marker trait for types that are valid for any bit pattern of their size, meaning a byte slice
/// of the right length can be safely reinterpreted as `&[Self]` (or `&mut [Self]`).
///
/// # Safety
///
/// Implementors must have no padding, no invalid bit patterns, and no `Drop` glue: every sequence
/// of `size_of::<Self>()` bytes must be a valid instance of `Self`.
pub unsafe trait AnyRepr {}

unsafe impl AnyRepr for u8 {}
unsafe impl AnyRepr for i8 {}
unsafe impl AnyRepr for u16 {}
unsafe impl AnyRepr for i16 {}
unsafe impl AnyRepr for u32 {}
unsafe impl AnyRepr for i32 {}
unsafe impl AnyRepr for u64 {}
unsafe impl AnyRepr for i64 {}
unsafe impl AnyRepr for usize {}
unsafe impl AnyRepr for isize {}
unsafe impl<const N: usize, T: AnyRepr> AnyRepr for [T; N] {}
