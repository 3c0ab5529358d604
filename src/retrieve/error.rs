use crate::backend::CatalogError;
use crate::retrieve::codec::CodecError;
use crate::retrieve::media_type::ParseMediaTypeError;
use crate::retrieve::stream::StreamError;
use axum::http::StatusCode;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrieveError {
	#[error("{0}")]
	NotFound(&'static str),
	#[error("{0}")]
	NotAcceptable(&'static str),
	#[error("Invalid frame number")]
	InvalidFrameNumber,
	#[error("No bulkdata {path} in requested object")]
	MissingBulkdata { path: String },
	#[error("No or incorrect encapsulated compressed pixel data in requested object")]
	NotEncapsulated,
	#[error("Number of data fragments not sufficient for number of frames in requested object")]
	IncompleteBitstream,
	#[error(transparent)]
	Codec(#[from] CodecError),
	#[error(transparent)]
	Stream(#[from] StreamError),
	#[error(transparent)]
	Io(#[from] io::Error),
	#[error(transparent)]
	MediaType(#[from] ParseMediaTypeError),
	#[error(transparent)]
	Catalog(#[from] CatalogError),
	#[error("Failed to parse DICOM object: {0}")]
	Decode(String),
	#[error("Failed to encode DICOM object: {0}")]
	Encode(String),
	#[error("Failed to create ZIP archive: {0}")]
	Zip(#[from] zip::result::ZipError),
	#[error("{0}")]
	Internal(&'static str),
	#[error("Retrieval was cancelled")]
	Cancelled,
}

impl RetrieveError {
	pub const fn status(&self) -> StatusCode {
		match self {
			Self::NotFound(_) | Self::InvalidFrameNumber | Self::MissingBulkdata { .. } => {
				StatusCode::NOT_FOUND
			}
			Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
			Self::MediaType(_) => StatusCode::BAD_REQUEST,
			Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
			Self::NotEncapsulated
			| Self::IncompleteBitstream
			| Self::Codec(_)
			| Self::Stream(_)
			| Self::Io(_)
			| Self::Catalog(_)
			| Self::Decode(_)
			| Self::Encode(_)
			| Self::Zip(_)
			| Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}
