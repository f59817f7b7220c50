//! Core types for the tessera cell store.
//!
//! Tessera stores immutable JSON payloads ("cells") addressed by a
//! three-dimensional coordinate `(row_key, column_name, ref_key)` and spreads
//! them across a fixed number of shards by deterministic hashing. This crate
//! holds the pieces every other tessera crate needs:
//!
//! - [`Cell`], [`CellRef`], [`WriteCellRequest`]: the cell data model
//! - [`shard_for_row_key`] / [`shard_for_key`]: the FNV-32a shard mapping
//! - [`Cursor`]: the opaque pagination token used by partition and index scans
//!
//! Everything here is pure: no I/O, no runtime, no database. The storage,
//! index, trigger, and engine crates build on these types.

pub mod cell;
pub mod cursor;
pub mod shard;

pub use cell::{Cell, CellRef, WriteCellRequest};
pub use cursor::{clamp_limit, Cursor, CursorError, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use shard::{shard_for_key, shard_for_row_key, ShardId};
