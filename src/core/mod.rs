// Core modules implementing encoding, tables, stores, caches, and error modeling.
pub mod cache;
pub mod codec;
pub mod error;
pub mod filter;
pub mod frame;
pub mod index;
pub mod obt;
pub mod query;
pub mod ranges;
pub mod records;
pub mod schema;
pub mod table;
