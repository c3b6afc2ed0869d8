//! Purpose: Define the public Rust API boundary for the store.
//! Exports: Frames, schemas, tables, the one-big-table store, the file cache and errors.
//! Role: Additive-only surface used by the CLI and embedders.
//! Invariants: Everything the CLI touches is reachable from here.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::cache::{CacheKey, CacheValue, Json, MetaFileCache, migrate_to_obt};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::frame::{Column, ColumnData, DEFAULT_INDEX_NAME, Frame, FrameKey, Scalar};
pub use crate::core::index::CachingIndex;
pub use crate::core::obt::{OneBigTable, OpenMode, StoreOptions, StoreState};
pub use crate::core::query::{ColumnRef, CompareOp, Origin, Predicate, Query};
pub use crate::core::ranges::{compact, compact_mask};
pub use crate::core::records::{frame_from_records, frame_to_records, parse_records};
pub use crate::core::schema::{
    ColumnDescriptor, SchemaOptions, SemanticType, TableSchema, TimeUnit, sidecar_path,
};
pub use crate::core::table::{Durability, FrameTable, MetadataMode, TableOptions};
