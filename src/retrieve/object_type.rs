use crate::retrieve::codec;
use crate::retrieve::descriptor::InstanceDescriptor;
use crate::retrieve::media_type::MediaType;
use crate::retrieve::transfer_syntax::{
	self, ENCAPSULATED_CDA_STORAGE, ENCAPSULATED_MTL_STORAGE, ENCAPSULATED_OBJ_STORAGE,
	ENCAPSULATED_PDF_STORAGE, ENCAPSULATED_STL_STORAGE, MPEG2_VIDEO, MPEG4_VIDEO,
	PRIVATE_ENCAPSULATED_GENOZIP_STORAGE, STRUCTURED_REPORT_ROOT,
};

/// Kind of a stored object as far as its representations are concerned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObjectType {
	UncompressedSingleFrameImage,
	CompressedSingleFrameImage,
	UncompressedMultiFrameImage,
	CompressedMultiFrameImage,
	Mpeg2Video,
	Mpeg4Video,
	SrDocument,
	EncapsulatedPdf,
	EncapsulatedCda,
	EncapsulatedStl,
	EncapsulatedObj,
	EncapsulatedMtl,
	EncapsulatedGenozip,
	Other,
}

impl ObjectType {
	/// Classifies an instance. `frame` is the requested frame number or `0` for the
	/// whole instance; a multi-frame instance addressed by frame is a single-frame image.
	pub fn of(instance: &InstanceDescriptor, frame: u32) -> Self {
		if instance.is_image() {
			let ts = instance.transfer_syntax_uid();
			let multi_frame = frame == 0 && instance.is_multiframe();
			return if MPEG2_VIDEO.contains(&ts) {
				Self::Mpeg2Video
			} else if MPEG4_VIDEO.contains(&ts) {
				Self::Mpeg4Video
			} else if transfer_syntax::is_uncompressed(ts) {
				if multi_frame {
					Self::UncompressedMultiFrameImage
				} else {
					Self::UncompressedSingleFrameImage
				}
			} else if multi_frame {
				Self::CompressedMultiFrameImage
			} else {
				Self::CompressedSingleFrameImage
			};
		}

		match instance.sop_class_uid() {
			ENCAPSULATED_PDF_STORAGE => Self::EncapsulatedPdf,
			ENCAPSULATED_CDA_STORAGE => Self::EncapsulatedCda,
			ENCAPSULATED_STL_STORAGE => Self::EncapsulatedStl,
			ENCAPSULATED_OBJ_STORAGE => Self::EncapsulatedObj,
			ENCAPSULATED_MTL_STORAGE => Self::EncapsulatedMtl,
			PRIVATE_ENCAPSULATED_GENOZIP_STORAGE => Self::EncapsulatedGenozip,
			uid if uid.starts_with(STRUCTURED_REPORT_ROOT) => Self::SrDocument,
			_ => Self::Other,
		}
	}

	pub fn default_media_type(self) -> MediaType {
		match self {
			Self::UncompressedSingleFrameImage | Self::CompressedSingleFrameImage => {
				MediaType::new("image", "jpeg")
			}
			Self::UncompressedMultiFrameImage | Self::CompressedMultiFrameImage | Self::Other => {
				MediaType::application_dicom()
			}
			Self::Mpeg2Video => MediaType::new("video", "mpeg"),
			Self::Mpeg4Video => MediaType::new("video", "mp4"),
			Self::SrDocument => MediaType::new("text", "html"),
			Self::EncapsulatedPdf => MediaType::new("application", "pdf"),
			Self::EncapsulatedCda => MediaType::new("text", "xml"),
			Self::EncapsulatedStl => MediaType::new("model", "stl"),
			Self::EncapsulatedObj => MediaType::new("model", "obj"),
			Self::EncapsulatedMtl => MediaType::new("model", "mtl"),
			Self::EncapsulatedGenozip => MediaType::new("application", "vnd.genozip"),
		}
	}

	pub const fn is_image(self) -> bool {
		matches!(
			self,
			Self::UncompressedSingleFrameImage
				| Self::CompressedSingleFrameImage
				| Self::UncompressedMultiFrameImage
				| Self::CompressedMultiFrameImage
		)
	}

	pub const fn is_video(self) -> bool {
		matches!(self, Self::Mpeg2Video | Self::Mpeg4Video)
	}

	pub const fn is_encapsulated_document(self) -> bool {
		matches!(
			self,
			Self::EncapsulatedPdf
				| Self::EncapsulatedCda
				| Self::EncapsulatedStl
				| Self::EncapsulatedObj
				| Self::EncapsulatedMtl
				| Self::EncapsulatedGenozip
		)
	}

	/// Media types the bulk data of this kind may be returned in, `None` if it has no
	/// bulk data representation.
	///
	/// Compressed pixel data offers its native format first and, if a decoder is
	/// available, decompressed octet-stream second.
	pub fn bulkdata_media_types(self, instance: &InstanceDescriptor) -> Option<Vec<MediaType>> {
		match self {
			Self::UncompressedSingleFrameImage | Self::UncompressedMultiFrameImage => {
				Some(vec![MediaType::application_octet_stream()])
			}
			Self::CompressedSingleFrameImage | Self::CompressedMultiFrameImage => {
				let ts = instance.transfer_syntax_uid();
				let mut media_types: Vec<MediaType> =
					transfer_syntax::media_type_for(ts).into_iter().collect();
				if codec::can_decode(instance) {
					media_types.push(MediaType::application_octet_stream());
				}
				Some(media_types)
			}
			Self::SrDocument | Self::Other => None,
			Self::Mpeg2Video
			| Self::Mpeg4Video
			| Self::EncapsulatedPdf
			| Self::EncapsulatedCda
			| Self::EncapsulatedStl
			| Self::EncapsulatedObj
			| Self::EncapsulatedMtl
			| Self::EncapsulatedGenozip => Some(vec![self.default_media_type()]),
		}
	}
}
