//! Tusk Services Library
//!
//! The protocol engine (`UploadService`) and the background expiry sweeper.
//! This is where every upload invariant is enforced; the crates around it
//! are adapters.

mod sweeper;
mod upload;

pub use sweeper::ExpirySweeper;
pub use upload::{
    AppendChunk, Appended, CreateUpload, Created, DeclaredChecksum, UploadInfo, UploadService,
};
