//! The WADO-RS retrieval engine: content negotiation, output strategies and the
//! streaming readers and writers behind them.

pub mod archive;
pub mod bulkdata;
pub mod codec;
pub mod context;
pub mod descriptor;
pub mod dicom_output;
pub mod encapsulated;
pub mod error;
pub mod frames;
pub mod media_type;
pub mod metadata;
pub mod negotiation;
pub mod object_type;
pub mod output;
pub mod resources;
pub mod service;
pub mod spool;
pub mod stream;
pub mod transfer_syntax;

#[cfg(test)]
pub mod testing;

pub use context::{RetrieveOptions, RetrieveRequest, RetrieveTarget};
pub use error::RetrieveError;
pub use service::RetrieveService;
