//! Transfer syntax and SOP class UIDs used for classification and negotiation.

use crate::retrieve::media_type::MediaType;

pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";
pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
pub const JPEG_BASELINE_8BIT: &str = "1.2.840.10008.1.2.4.50";
pub const JPEG_EXTENDED_12BIT: &str = "1.2.840.10008.1.2.4.51";
pub const JPEG_LOSSLESS: &str = "1.2.840.10008.1.2.4.57";
pub const JPEG_LOSSLESS_SV1: &str = "1.2.840.10008.1.2.4.70";
pub const JPEG_LS_LOSSLESS: &str = "1.2.840.10008.1.2.4.80";
pub const JPEG_LS_NEAR_LOSSLESS: &str = "1.2.840.10008.1.2.4.81";
pub const JPEG_2000_LOSSLESS: &str = "1.2.840.10008.1.2.4.90";
pub const JPEG_2000: &str = "1.2.840.10008.1.2.4.91";
pub const JPEG_2000_MC_LOSSLESS: &str = "1.2.840.10008.1.2.4.92";
pub const JPEG_2000_MC: &str = "1.2.840.10008.1.2.4.93";
pub const MPEG2_MPML: &str = "1.2.840.10008.1.2.4.100";
pub const MPEG2_MPHL: &str = "1.2.840.10008.1.2.4.101";
pub const MPEG4_HP41: &str = "1.2.840.10008.1.2.4.102";
pub const MPEG4_HP41_BD: &str = "1.2.840.10008.1.2.4.103";
pub const MPEG4_HP42_2D: &str = "1.2.840.10008.1.2.4.104";
pub const MPEG4_HP42_3D: &str = "1.2.840.10008.1.2.4.105";
pub const MPEG4_HP42_STEREO: &str = "1.2.840.10008.1.2.4.106";
pub const HEVC_MP51: &str = "1.2.840.10008.1.2.4.107";
pub const HEVC_M10P51: &str = "1.2.840.10008.1.2.4.108";
pub const RLE_LOSSLESS: &str = "1.2.840.10008.1.2.5";

pub const MPEG2_VIDEO: &[&str] = &[MPEG2_MPML, MPEG2_MPHL];

pub const MPEG4_VIDEO: &[&str] = &[
	MPEG4_HP41,
	MPEG4_HP41_BD,
	MPEG4_HP42_2D,
	MPEG4_HP42_3D,
	MPEG4_HP42_STEREO,
	HEVC_MP51,
	HEVC_M10P51,
];

pub const ENCAPSULATED_PDF_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.1";
pub const ENCAPSULATED_CDA_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.2";
pub const ENCAPSULATED_STL_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.3";
pub const ENCAPSULATED_OBJ_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.4";
pub const ENCAPSULATED_MTL_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.5";
/// dcm4che private SOP class for Genozip-compressed genomic data.
pub const PRIVATE_ENCAPSULATED_GENOZIP_STORAGE: &str = "1.2.40.0.13.1.5.1.4.1.1.104.1";
pub const RT_DOSE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.481.2";
/// Root of all Structured Report storage SOP classes.
pub const STRUCTURED_REPORT_ROOT: &str = "1.2.840.10008.5.1.4.1.1.88.";

pub fn is_video(transfer_syntax_uid: &str) -> bool {
	MPEG2_VIDEO.contains(&transfer_syntax_uid) || MPEG4_VIDEO.contains(&transfer_syntax_uid)
}

/// Native (not encapsulated) pixel data encoded in little endian byte order.
pub fn is_uncompressed(transfer_syntax_uid: &str) -> bool {
	matches!(
		transfer_syntax_uid,
		IMPLICIT_VR_LITTLE_ENDIAN | EXPLICIT_VR_LITTLE_ENDIAN
	)
}

/// JPEG family transfer syntaxes whose frames end with an EOI marker.
pub fn is_jpeg_family(transfer_syntax_uid: &str) -> bool {
	matches!(
		transfer_syntax_uid,
		JPEG_BASELINE_8BIT
			| JPEG_EXTENDED_12BIT
			| JPEG_LOSSLESS
			| JPEG_LOSSLESS_SV1
			| JPEG_LS_LOSSLESS
			| JPEG_LS_NEAR_LOSSLESS
	)
}

/// Transfer syntaxes that are acceptable when the caller does not name any.
pub fn defaults() -> Vec<String> {
	std::iter::once(EXPLICIT_VR_LITTLE_ENDIAN)
		.chain(MPEG2_VIDEO.iter().copied())
		.chain(MPEG4_VIDEO.iter().copied())
		.map(String::from)
		.collect()
}

/// Media type that carries pixel data of the given transfer syntax in its native format.
///
/// Returns `None` for transfer syntaxes without a registered bulk data media type.
pub fn media_type_for(transfer_syntax_uid: &str) -> Option<MediaType> {
	let media_type = match transfer_syntax_uid {
		IMPLICIT_VR_LITTLE_ENDIAN | EXPLICIT_VR_LITTLE_ENDIAN => {
			return Some(MediaType::application_octet_stream());
		}
		JPEG_LOSSLESS_SV1 => return Some(MediaType::new("image", "jpeg")),
		JPEG_LS_LOSSLESS => return Some(MediaType::new("image", "jls")),
		JPEG_2000_LOSSLESS => return Some(MediaType::new("image", "jp2")),
		JPEG_2000_MC_LOSSLESS => return Some(MediaType::new("image", "jpx")),
		RLE_LOSSLESS => return Some(MediaType::new("image", "dicom-rle")),
		JPEG_BASELINE_8BIT | JPEG_EXTENDED_12BIT | JPEG_LOSSLESS => MediaType::new("image", "jpeg"),
		JPEG_LS_NEAR_LOSSLESS => MediaType::new("image", "jls"),
		JPEG_2000 => MediaType::new("image", "jp2"),
		JPEG_2000_MC => MediaType::new("image", "jpx"),
		MPEG2_MPML | MPEG2_MPHL => MediaType::new("video", "mpeg"),
		MPEG4_HP41 | MPEG4_HP41_BD => MediaType::new("video", "mp4"),
		_ => return None,
	};
	Some(media_type.with_param("transfer-syntax", transfer_syntax_uid))
}
