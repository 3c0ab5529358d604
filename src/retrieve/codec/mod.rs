//! Frame decompression on top of `dicom-pixeldata`.

use crate::retrieve::descriptor::InstanceDescriptor;
use crate::retrieve::transfer_syntax::{JPEG_BASELINE_8BIT, JPEG_EXTENDED_12BIT, RLE_LOSSLESS};
use dicom::core::value::PixelFragmentSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::encoding::TransferSyntaxIndex;
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::TransferSyntaxRegistry;
use dicom_pixeldata::PixelDecoder;
use std::io::{self, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
	#[error("Unsupported Transfer Syntax: {0}")]
	UnsupportedTransferSyntax(String),
	#[error("Unsupported Datatype: {bits_allocated} bits allocated")]
	UnsupportedDatatype { bits_allocated: u16 },
	#[error("Invalid RLE data: {0}")]
	Rle(&'static str),
	#[error("Failed to prepare frame decoding: {0}")]
	Template(String),
	#[error("Failed to decode pixel data: {0}")]
	PixelData(#[from] dicom_pixeldata::Error),
	#[error("Decoded frame has {actual} bytes, expected {expected}")]
	SizeMismatch { expected: usize, actual: usize },
}

/// Image geometry that determines the layout of a decoded frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameGeometry {
	pub rows: u16,
	pub columns: u16,
	pub samples_per_pixel: u16,
	pub bits_allocated: u16,
	/// Samples are stored plane by plane instead of pixel by pixel.
	pub planar: bool,
}

impl FrameGeometry {
	pub fn of(instance: &InstanceDescriptor) -> Self {
		Self {
			rows: instance.rows(),
			columns: instance.columns(),
			samples_per_pixel: instance.samples_per_pixel(),
			bits_allocated: instance.bits_allocated(),
			planar: instance.planar_configuration() == 1,
		}
	}

	pub fn pixels(&self) -> usize {
		usize::from(self.rows) * usize::from(self.columns)
	}

	pub fn samples(&self) -> usize {
		self.pixels() * usize::from(self.samples_per_pixel)
	}

	fn bytes_per_sample(&self) -> usize {
		usize::from(self.bits_allocated / 8)
	}
}

/// Reusable destination of [`FrameDecoder::decode`]. Holds one frame of little
/// endian samples in the planar configuration of the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
	geometry: FrameGeometry,
	data: Vec<u8>,
}

impl FrameBuffer {
	pub fn new(geometry: FrameGeometry) -> Self {
		let data = vec![0; geometry.samples() * geometry.bytes_per_sample()];
		Self { geometry, data }
	}

	/// Replaces the content with `decoded`, a frame of pixel-interleaved little endian
	/// samples.
	pub fn fill(&mut self, decoded: &[u8]) -> Result<(), CodecError> {
		if decoded.len() != self.data.len() {
			return Err(CodecError::SizeMismatch {
				expected: self.data.len(),
				actual: decoded.len(),
			});
		}
		if !self.geometry.planar || self.geometry.samples_per_pixel == 1 {
			self.data.copy_from_slice(decoded);
			return Ok(());
		}

		let width = self.geometry.bytes_per_sample();
		let samples_per_pixel = usize::from(self.geometry.samples_per_pixel);
		let mut planes = Vec::new();
		arrange(&mut planes, &self.geometry, width, |sample, pixel| {
			let start = (pixel * samples_per_pixel + sample) * width;
			&decoded[start..start + width]
		});
		self.data = planes;
		Ok(())
	}

	pub fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
		out.write_all(&self.data)
	}
}

pub trait FrameDecoder: Send {
	/// Decodes one encoded frame into `buffer`, replacing its previous content.
	fn decode(&mut self, encoded: &[u8], buffer: &mut FrameBuffer) -> Result<(), CodecError>;
}

/// Attributes `dicom-pixeldata` reads to interpret a frame.
const IMAGE_PIXEL_ATTRIBUTES: [Tag; 9] = [
	tags::SAMPLES_PER_PIXEL,
	tags::PHOTOMETRIC_INTERPRETATION,
	tags::PLANAR_CONFIGURATION,
	tags::ROWS,
	tags::COLUMNS,
	tags::BITS_ALLOCATED,
	tags::BITS_STORED,
	tags::HIGH_BIT,
	tags::PIXEL_REPRESENTATION,
];

/// Decodes single frames with the pixel data decoders of the transfer syntax registry.
///
/// Each frame is placed as the only fragment of a one-frame object that carries the
/// image pixel attributes of the instance.
pub struct PixelDataDecoder {
	frame: FileDicomObject<InMemDicomObject>,
	rle: Option<RleLayout>,
}

/// Segment layout RLE frames are checked against before they are handed over.
#[derive(Debug, Copy, Clone)]
struct RleLayout {
	segments: u32,
	/// Single byte grayscale frames get an empty high byte segment and are decoded as
	/// 16 bit samples, of which only the low bytes are kept.
	widened_samples: Option<usize>,
}

impl PixelDataDecoder {
	pub fn new(instance: &InstanceDescriptor) -> Result<Self, CodecError> {
		check(instance)?;
		let geometry = FrameGeometry::of(instance);

		let mut frame = InMemDicomObject::new_empty();
		for tag in IMAGE_PIXEL_ATTRIBUTES {
			if let Some(element) = instance.attributes().get(tag) {
				frame.put(element.clone());
			}
		}
		if frame.get(tags::BITS_STORED).is_none() {
			put_short(&mut frame, tags::BITS_STORED, geometry.bits_allocated);
		}
		if frame.get(tags::HIGH_BIT).is_none() {
			let bits_stored = frame
				.get(tags::BITS_STORED)
				.and_then(|element| element.to_int::<u16>().ok())
				.unwrap_or(geometry.bits_allocated);
			put_short(&mut frame, tags::HIGH_BIT, bits_stored.saturating_sub(1));
		}
		if frame.get(tags::PIXEL_REPRESENTATION).is_none() {
			put_short(&mut frame, tags::PIXEL_REPRESENTATION, 0);
		}
		if frame.get(tags::PHOTOMETRIC_INTERPRETATION).is_none() {
			let photometric = if geometry.samples_per_pixel == 1 {
				"MONOCHROME2"
			} else {
				"RGB"
			};
			frame.put_str(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, photometric);
		}

		let rle = (instance.transfer_syntax_uid() == RLE_LOSSLESS).then(|| {
			let widened = geometry.samples_per_pixel == 1 && geometry.bits_allocated == 8;
			RleLayout {
				segments: u32::from(geometry.samples_per_pixel)
					* u32::from(geometry.bits_allocated / 8),
				widened_samples: widened.then(|| geometry.pixels()),
			}
		});
		if rle.is_some_and(|layout| layout.widened_samples.is_some()) {
			put_short(&mut frame, tags::BITS_ALLOCATED, 16);
		}

		let meta = FileMetaTableBuilder::new()
			.media_storage_sop_class_uid(instance.sop_class_uid())
			.media_storage_sop_instance_uid(instance.sop_instance_uid())
			.transfer_syntax(instance.transfer_syntax_uid())
			.implementation_class_uid(crate::IMPLEMENTATION_CLASS_UID)
			.build()
			.map_err(|err| CodecError::Template(err.to_string()))?;

		Ok(Self {
			frame: frame.with_exact_meta(meta),
			rle,
		})
	}
}

impl FrameDecoder for PixelDataDecoder {
	fn decode(&mut self, encoded: &[u8], buffer: &mut FrameBuffer) -> Result<(), CodecError> {
		let fragment = match self.rle {
			Some(layout) => {
				if rle_segments(encoded)? != layout.segments {
					return Err(CodecError::Rle("segment count does not match the image"));
				}
				match layout.widened_samples {
					Some(samples) => widen_rle(encoded, samples)?,
					None => encoded.to_vec(),
				}
			}
			None => encoded.to_vec(),
		};
		self.frame.put(DataElement::new(
			tags::PIXEL_DATA,
			VR::OB,
			PixelFragmentSequence::new_fragments(vec![fragment]),
		));

		let decoded = self.frame.decode_pixel_data_frame(0)?;
		if self.rle.is_some_and(|layout| layout.widened_samples.is_some()) {
			let low_bytes: Vec<u8> = decoded.data().iter().step_by(2).copied().collect();
			buffer.fill(&low_bytes)
		} else {
			buffer.fill(decoded.data())
		}
	}
}

const RLE_HEADER_LENGTH: usize = 64;

fn rle_u32(encoded: &[u8], offset: usize) -> Option<u32> {
	let bytes = encoded.get(offset..offset + 4)?;
	Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Number of segments announced in the RLE header.
fn rle_segments(encoded: &[u8]) -> Result<u32, CodecError> {
	if encoded.len() < RLE_HEADER_LENGTH {
		return Err(CodecError::Rle("frame is shorter than its header"));
	}
	rle_u32(encoded, 0).ok_or(CodecError::Rle("frame is shorter than its header"))
}

/// Prepends an all-zero high byte segment of `samples` bytes to a one segment frame.
fn widen_rle(encoded: &[u8], samples: usize) -> Result<Vec<u8>, CodecError> {
	let start = rle_u32(encoded, 4)
		.and_then(|offset| usize::try_from(offset).ok())
		.filter(|&offset| offset >= RLE_HEADER_LENGTH)
		.ok_or(CodecError::Rle("invalid segment offset"))?;
	let segment = encoded
		.get(start..)
		.ok_or(CodecError::Rle("segment offset is past the end of the frame"))?;

	// replicate runs of at most 128 zeros
	let mut high = Vec::new();
	let mut remaining = samples;
	while remaining > 0 {
		let run = remaining.min(128);
		let count = u8::try_from(run - 1).unwrap_or(127);
		high.extend_from_slice(&[count.wrapping_neg(), 0]);
		remaining -= run;
	}
	let low_offset = u32::try_from(RLE_HEADER_LENGTH + high.len())
		.map_err(|_| CodecError::Rle("frame is too large"))?;

	let mut widened = vec![0u8; RLE_HEADER_LENGTH];
	widened[..4].copy_from_slice(&2u32.to_le_bytes());
	widened[4..8].copy_from_slice(&64u32.to_le_bytes());
	widened[8..12].copy_from_slice(&low_offset.to_le_bytes());
	widened.extend_from_slice(&high);
	widened.extend_from_slice(segment);
	Ok(widened)
}

fn put_short(object: &mut InMemDicomObject, tag: Tag, value: u16) {
	object.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

/// Whether the frames of `instance` can be decoded, judged before anything is read.
///
/// The registry must carry a decoder for the transfer syntax. The decoders produce 8
/// and 16 bit samples only, and lossy JPEG is limited to 8 bit precision.
pub fn check(instance: &InstanceDescriptor) -> Result<(), CodecError> {
	let uid = instance.transfer_syntax_uid();
	let decodable = TransferSyntaxRegistry
		.get(uid)
		.is_some_and(|ts| ts.is_encapsulated_pixel_data() && ts.can_decode_all());
	if !decodable {
		return Err(CodecError::UnsupportedTransferSyntax(uid.to_owned()));
	}

	let bits_allocated = instance.bits_allocated();
	let lossy_jpeg = matches!(uid, JPEG_BASELINE_8BIT | JPEG_EXTENDED_12BIT);
	match bits_allocated {
		8 => Ok(()),
		16 if !lossy_jpeg => Ok(()),
		_ => Err(CodecError::UnsupportedDatatype { bits_allocated }),
	}
}

/// Selects the decoder for the frames of an instance.
pub fn decoder_for(instance: &InstanceDescriptor) -> Result<Box<dyn FrameDecoder>, CodecError> {
	Ok(Box::new(PixelDataDecoder::new(instance)?))
}

pub fn can_decode(instance: &InstanceDescriptor) -> bool {
	check(instance).is_ok()
}

/// Builds the planar layout of a frame, sample plane after sample plane.
///
/// `sample(s, p)` yields the bytes of sample `s` of pixel `p`.
fn arrange<'a>(
	target: &mut Vec<u8>,
	geometry: &FrameGeometry,
	width: usize,
	sample: impl Fn(usize, usize) -> &'a [u8],
) {
	target.clear();
	target.reserve(geometry.samples() * width);
	for s in 0..usize::from(geometry.samples_per_pixel) {
		for p in 0..geometry.pixels() {
			target.extend_from_slice(sample(s, p));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::retrieve::testing::{image_attributes, rle_encode, MemorySource};
	use crate::retrieve::transfer_syntax::{JPEG_2000, RLE_LOSSLESS};
	use dicom_pixeldata::image::codecs::jpeg::JpegEncoder;
	use dicom_pixeldata::image::ExtendedColorType;
	use std::sync::Arc;

	fn instance(ts: &str, rows: u16, columns: u16, bits_allocated: u16, samples_per_pixel: u16) -> InstanceDescriptor {
		let attributes = image_attributes(
			"1.2.840.10008.5.1.4.1.1.7",
			"1.1",
			rows,
			columns,
			1,
			bits_allocated,
			samples_per_pixel,
		);
		InstanceDescriptor::new(attributes, ts, Arc::new(MemorySource(Arc::new(Vec::new()))))
	}

	fn planar(instance: InstanceDescriptor) -> InstanceDescriptor {
		let mut attributes = instance.attributes().clone();
		put_short(&mut attributes, tags::PLANAR_CONFIGURATION, 1);
		InstanceDescriptor::new(
			attributes,
			instance.transfer_syntax_uid(),
			Arc::new(MemorySource(Arc::new(Vec::new()))),
		)
	}

	fn decode(instance: &InstanceDescriptor, encoded: &[u8]) -> Result<Vec<u8>, CodecError> {
		let mut decoder = decoder_for(instance)?;
		let mut buffer = FrameBuffer::new(FrameGeometry::of(instance));
		decoder.decode(encoded, &mut buffer)?;
		Ok(buffer.data)
	}

	#[test]
	fn decodes_rle_grayscale() {
		let instance = instance(RLE_LOSSLESS, 2, 2, 8, 1);
		let encoded = rle_encode(&[vec![1, 2, 3, 4]]);
		assert_eq!(decode(&instance, &encoded).unwrap(), [1, 2, 3, 4]);
	}

	#[test]
	fn sixteen_bit_rle_is_little_endian() {
		let instance = instance(RLE_LOSSLESS, 1, 2, 16, 1);
		// most significant byte plane first
		let encoded = rle_encode(&[vec![0x01, 0xA0], vec![0x02, 0xB0]]);
		assert_eq!(decode(&instance, &encoded).unwrap(), [0x02, 0x01, 0xB0, 0xA0]);
	}

	#[test]
	fn rgb_follows_the_planar_configuration() {
		let planes = vec![vec![1, 2], vec![5, 6], vec![9, 10]];
		let encoded = rle_encode(&planes);

		let interleaved = instance(RLE_LOSSLESS, 1, 2, 8, 3);
		assert_eq!(decode(&interleaved, &encoded).unwrap(), [1, 5, 9, 2, 6, 10]);

		let planar = planar(instance(RLE_LOSSLESS, 1, 2, 8, 3));
		assert_eq!(decode(&planar, &encoded).unwrap(), planes.concat());
	}

	#[test]
	fn decoder_is_reused_across_frames() {
		let instance = instance(RLE_LOSSLESS, 2, 2, 8, 1);
		let mut decoder = decoder_for(&instance).unwrap();
		let mut buffer = FrameBuffer::new(FrameGeometry::of(&instance));
		decoder.decode(&rle_encode(&[vec![1; 4]]), &mut buffer).unwrap();
		decoder.decode(&rle_encode(&[vec![7; 4]]), &mut buffer).unwrap();
		assert_eq!(buffer.data, [7; 4]);
	}

	#[test]
	fn large_grayscale_frames_decode_completely() {
		let instance = instance(RLE_LOSSLESS, 15, 20, 8, 1);
		let pixels: Vec<u8> = (0..300u32).map(|i| u8::try_from(i % 251).unwrap()).collect();
		let encoded = rle_encode(&[pixels.clone()]);
		assert_eq!(decode(&instance, &encoded).unwrap(), pixels);
	}

	#[test]
	fn segment_count_must_match_the_image() {
		let instance = instance(RLE_LOSSLESS, 2, 2, 8, 3);
		let encoded = rle_encode(&[vec![1, 2, 3, 4]]);
		assert!(decode(&instance, &encoded).is_err());
	}

	#[test]
	fn decodes_baseline_jpeg() {
		let pixels = [128u8; 64];
		let mut encoded = Vec::new();
		JpegEncoder::new_with_quality(&mut encoded, 100)
			.encode(&pixels, 8, 8, ExtendedColorType::L8)
			.unwrap();
		let instance = instance(JPEG_BASELINE_8BIT, 8, 8, 8, 1);
		let decoded = decode(&instance, &encoded).unwrap();
		assert_eq!(decoded.len(), 64);
		assert!(decoded.iter().all(|&value| value.abs_diff(128) <= 2));
	}

	#[test]
	fn lossy_jpeg_above_eight_bits_is_not_decodable() {
		let twelve_bit = instance(JPEG_EXTENDED_12BIT, 8, 8, 16, 1);
		assert!(!can_decode(&twelve_bit));
		assert!(matches!(
			decoder_for(&twelve_bit),
			Err(CodecError::UnsupportedDatatype { bits_allocated: 16 })
		));
		assert!(can_decode(&instance(JPEG_EXTENDED_12BIT, 8, 8, 8, 1)));
		assert!(can_decode(&instance(RLE_LOSSLESS, 8, 8, 16, 1)));
	}

	#[test]
	fn unsupported_transfer_syntaxes_and_depths_have_no_decoder() {
		assert!(matches!(
			decoder_for(&instance(JPEG_2000, 2, 2, 8, 1)),
			Err(CodecError::UnsupportedTransferSyntax(_))
		));
		assert!(!can_decode(&instance(
			crate::retrieve::transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN,
			2,
			2,
			8,
			1
		)));
		assert!(matches!(
			check(&instance(RLE_LOSSLESS, 2, 2, 32, 1)),
			Err(CodecError::UnsupportedDatatype { bits_allocated: 32 })
		));
	}

	#[test]
	fn buffer_rejects_wrong_sizes() {
		let geometry = FrameGeometry {
			rows: 1,
			columns: 2,
			samples_per_pixel: 1,
			bits_allocated: 16,
			planar: false,
		};
		let mut buffer = FrameBuffer::new(geometry);
		assert_eq!(buffer.data.len(), 4);
		assert!(matches!(
			buffer.fill(&[1, 2, 3]),
			Err(CodecError::SizeMismatch { expected: 4, actual: 3 })
		));
		buffer.fill(&[1, 2, 3, 4]).unwrap();
		let mut out = Vec::new();
		buffer.write_to(&mut out).unwrap();
		assert_eq!(out, [1, 2, 3, 4]);
	}
}
