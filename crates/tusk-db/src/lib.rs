//! Tusk DB Library
//!
//! Persistence for upload records. The protocol engine talks to the
//! [`UploadRepository`] trait; this crate ships a Postgres implementation
//! for production and an in-memory one for tests. `save` intentionally
//! never touches `metadata` or `created_at`: both are immutable after
//! creation.

mod memory;
mod postgres;
mod repository;

pub use memory::MemoryUploadRepository;
pub use postgres::PostgresUploadRepository;
pub use repository::UploadRepository;
