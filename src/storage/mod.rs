//! # Storage Module
//!
//! The storage layer is the file-mapping capability the index is served
//! from: map a read-only file for its full length, hand out borrowed slices,
//! steer kernel read-ahead, unmap on release.
//!
//! ## Architecture Overview
//!
//! Index files are immutable, so the layer is deliberately small:
//!
//! - **Zero-copy reads**: `&[u8]` slices point straight into the mapping
//! - **No page cache of our own**: the OS page cache is the only cache
//! - **Advice, not control**: `madvise(2)` hints select random or sequential
//!   read-ahead to match lookups versus full sweeps
//!
//! ## Safety Model
//!
//! Slices borrow the `MappedFile` they came from, and releasing a mapping
//! consumes it:
//!
//! ```text
//! MappedFile::slice(&self, ..) -> &[u8]   // Borrows &self immutably
//! MappedFile::close(self)                 // Takes ownership
//! ```
//!
//! A slice can therefore never outlive its mapping, with no runtime checks.
//!
//! ## Module Organization
//!
//! - `mmap`: Read-only mapped file (`MappedFile`)
//! - `advice`: Paging advice (`ReadAdvice`) and scoped restore (`AdviceGuard`)
//!
//! ## Platform Support
//!
//! Mapping uses the `memmap2` crate (Linux, macOS, Windows). Paging advice is
//! applied on unix targets only and is a no-op elsewhere.

mod advice;
mod mmap;

pub use advice::{AdviceGuard, ReadAdvice};
pub use mmap::MappedFile;
