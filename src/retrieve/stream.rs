//! Forward-only reader over the binary encoding of a DICOM Part 10 file.
//!
//! Element headers are decoded with the stateful decoder of the file's transfer syntax.
//! Values are skipped or copied without interpretation.

use dicom::core::header::SequenceItemHeader;
use dicom::core::{DataElementHeader, Length, Tag};
use dicom::encoding::{Codec, TransferSyntaxIndex};
use dicom::object::meta;
use dicom::object::FileMetaTable;
use dicom::parser::stateful::decode;
use dicom::parser::{DynStatefulDecoder, StatefulDecode};
use dicom::transfer_syntax::TransferSyntaxRegistry;
use std::cell::Cell;
use std::io::{self, Read, Write};
use std::rc::Rc;
use thiserror::Error;

pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
pub const ITEM_DELIMITATION_ITEM: Tag = Tag(0xFFFE, 0xE00D);

#[derive(Debug, Error)]
pub enum StreamError {
	#[error(transparent)]
	Io(#[from] io::Error),
	#[error("Missing DICM prefix")]
	NotDicom,
	#[error("Invalid file meta information: {0}")]
	InvalidMeta(String),
	#[error("Unsupported Transfer Syntax: {0}")]
	UnsupportedTransferSyntax(String),
	#[error("Failed to decode dataset: {0}")]
	Decode(#[from] decode::Error),
	#[error("Expected {expected} but found {found}")]
	UnexpectedTag { expected: Tag, found: Tag },
	#[error("Unexpected end of stream")]
	UnexpectedEof,
}

/// Orders tags the way they are sorted in an encoded dataset.
pub fn tag_order(tag: Tag) -> u32 {
	(u32::from(tag.0) << 16) | u32::from(tag.1)
}

#[derive(Debug, Default, Copy, Clone)]
struct SourceState {
	/// Bytes handed out to the decoder.
	consumed: u64,
	end_of_stream: bool,
}

/// Dataset bytes as the decoder sees them, after any dataset codec.
struct CountingSource {
	inner: Box<dyn Read>,
	state: Rc<Cell<SourceState>>,
}

impl Read for CountingSource {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let read = self.inner.read(buf)?;
		let mut state = self.state.get();
		state.consumed += read as u64;
		state.end_of_stream |= read == 0 && !buf.is_empty();
		self.state.set(state);
		Ok(read)
	}
}

/// Keeps write errors of the destination apart from decoding errors.
struct Destination<'a> {
	out: &'a mut dyn Write,
	error: Option<io::Error>,
}

impl Write for Destination<'_> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.out.write(buf).map_err(|err| {
			let kind = err.kind();
			if kind != io::ErrorKind::Interrupted {
				self.error = Some(err);
			}
			io::Error::from(kind)
		})
	}

	fn flush(&mut self) -> io::Result<()> {
		self.out.flush()
	}
}

pub struct DicomStreamReader {
	decoder: DynStatefulDecoder<CountingSource>,
	state: Rc<Cell<SourceState>>,
	transfer_syntax_uid: String,
}

impl DicomStreamReader {
	/// Reads the preamble and the file meta group, leaving the reader at the first
	/// element of the dataset.
	pub fn open(mut source: impl Read + 'static) -> Result<Self, StreamError> {
		let mut preamble = [0u8; 128];
		source.read_exact(&mut preamble).map_err(|err| match err.kind() {
			io::ErrorKind::UnexpectedEof => StreamError::NotDicom,
			_ => StreamError::Io(err),
		})?;
		let meta = FileMetaTable::from_reader(&mut source).map_err(|err| match err {
			meta::Error::NotDicom { .. } => StreamError::NotDicom,
			err => StreamError::InvalidMeta(err.to_string()),
		})?;

		let transfer_syntax_uid = meta.transfer_syntax().to_owned();
		let ts = TransferSyntaxRegistry
			.get(&transfer_syntax_uid)
			.ok_or_else(|| StreamError::UnsupportedTransferSyntax(transfer_syntax_uid.clone()))?;
		let dataset: Box<dyn Read> = match ts.codec() {
			Codec::Dataset(Some(adapter)) => adapter.adapt_reader(Box::new(source)),
			Codec::Dataset(None) => {
				return Err(StreamError::UnsupportedTransferSyntax(transfer_syntax_uid));
			}
			Codec::None | Codec::EncapsulatedPixelData(..) => Box::new(source),
		};

		let state = Rc::new(Cell::new(SourceState::default()));
		let source = CountingSource {
			inner: dataset,
			state: Rc::clone(&state),
		};
		Ok(Self {
			decoder: DynStatefulDecoder::new_with_ts(source, ts, 0)?,
			state,
			transfer_syntax_uid,
		})
	}

	pub fn transfer_syntax_uid(&self) -> &str {
		&self.transfer_syntax_uid
	}

	/// Number of dataset bytes read so far.
	pub fn position(&self) -> u64 {
		self.decoder.position()
	}

	fn is_in_step(&self) -> bool {
		self.state.get().consumed == self.decoder.position()
	}

	fn failure(&self, err: decode::Error) -> StreamError {
		if self.state.get().end_of_stream {
			StreamError::UnexpectedEof
		} else {
			StreamError::Decode(err)
		}
	}

	/// Reads the next element header or `None` at a clean end of stream.
	pub fn read_header(&mut self) -> Result<Option<DataElementHeader>, StreamError> {
		match self.decoder.decode_header() {
			Ok(header) => Ok(Some(header)),
			Err(_) if self.is_in_step() && self.state.get().end_of_stream => Ok(None),
			Err(err) => Err(self.failure(err)),
		}
	}

	pub fn skip(&mut self, length: u64) -> Result<(), StreamError> {
		for chunk in chunks(length) {
			self.decoder.skip_bytes(chunk).map_err(|err| self.failure(err))?;
		}
		if self.is_in_step() {
			Ok(())
		} else {
			Err(StreamError::UnexpectedEof)
		}
	}

	/// Copies exactly `length` bytes to `out`.
	pub fn copy_to(&mut self, length: u64, out: &mut dyn Write) -> Result<(), StreamError> {
		let mut destination = Destination { out, error: None };
		for chunk in chunks(length) {
			if let Err(err) = self.decoder.read_to(chunk, &mut destination) {
				return Err(match destination.error.take() {
					Some(write_error) => StreamError::Io(write_error),
					None => self.failure(err),
				});
			}
		}
		if self.is_in_step() {
			Ok(())
		} else {
			Err(StreamError::UnexpectedEof)
		}
	}

	pub fn read_vec(&mut self, length: u64) -> Result<Vec<u8>, StreamError> {
		let mut value = Vec::new();
		self.copy_to(length, &mut value)?;
		Ok(value)
	}

	/// Skips the value of an element whose header was just read.
	pub fn skip_value(&mut self, header: &DataElementHeader) -> Result<(), StreamError> {
		match header.len.get() {
			Some(length) => self.skip(u64::from(length)),
			None => self.skip_items(),
		}
	}

	/// Skips sequence items (or encapsulated fragments) up to and including the
	/// sequence delimiter.
	pub fn skip_items(&mut self) -> Result<(), StreamError> {
		while let Some(length) = self.next_item()? {
			self.skip_item_content(length)?;
		}
		Ok(())
	}

	/// Reads the next item header. Returns `None` on the sequence delimiter.
	pub fn next_item(&mut self) -> Result<Option<Length>, StreamError> {
		match self.decoder.decode_item_header() {
			Ok(SequenceItemHeader::Item { len }) => Ok(Some(len)),
			Ok(SequenceItemHeader::SequenceDelimiter) => Ok(None),
			Ok(SequenceItemHeader::ItemDelimiter) => Err(StreamError::UnexpectedTag {
				expected: ITEM,
				found: ITEM_DELIMITATION_ITEM,
			}),
			Err(err) => Err(self.failure(err)),
		}
	}

	/// Skips the content of an item whose header was just read.
	pub fn skip_item_content(&mut self, length: Length) -> Result<(), StreamError> {
		match length.get() {
			Some(length) => self.skip(u64::from(length)),
			None => loop {
				let header = self.read_header()?.ok_or(StreamError::UnexpectedEof)?;
				if header.tag == ITEM_DELIMITATION_ITEM {
					return Ok(());
				}
				self.skip_value(&header)?;
			},
		}
	}

	/// Skips elements of the current dataset level until an element with a tag greater
	/// than or equal to `stop` is found. Its header is returned with the reader positioned
	/// at the start of its value.
	pub fn read_until(&mut self, stop: Tag) -> Result<Option<DataElementHeader>, StreamError> {
		while let Some(header) = self.read_header()? {
			if tag_order(header.tag) >= tag_order(stop) {
				return Ok(Some(header));
			}
			self.skip_value(&header)?;
		}
		Ok(None)
	}
}

/// Splits a length into pieces the decoder accepts.
fn chunks(length: u64) -> impl Iterator<Item = u32> {
	let full = length / u64::from(u32::MAX);
	#[allow(clippy::cast_possible_truncation)]
	let rest = (length % u64::from(u32::MAX)) as u32;
	(0..full)
		.map(|_| u32::MAX)
		.chain((rest > 0).then_some(rest))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::retrieve::testing::{encode_file, Part10Builder};
	use crate::retrieve::transfer_syntax::{
		DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN, EXPLICIT_VR_BIG_ENDIAN, EXPLICIT_VR_LITTLE_ENDIAN,
		IMPLICIT_VR_LITTLE_ENDIAN, RLE_LOSSLESS,
	};
	use dicom::core::{DataElement, PrimitiveValue, VR};
	use dicom::dictionary_std::tags;
	use dicom::object::InMemDicomObject;
	use std::io::Cursor;

	fn open(file: &[u8]) -> Result<DicomStreamReader, StreamError> {
		DicomStreamReader::open(Cursor::new(file.to_vec()))
	}

	#[test]
	fn reads_transfer_syntax_from_meta_group() {
		let file = Part10Builder::new(RLE_LOSSLESS).build();
		let reader = open(&file).unwrap();
		assert_eq!(reader.transfer_syntax_uid(), RLE_LOSSLESS);
	}

	#[test]
	fn rejects_missing_prefix() {
		assert!(matches!(open(&[0u8; 200]), Err(StreamError::NotDicom)));
		assert!(matches!(open(&[0u8; 20]), Err(StreamError::NotDicom)));
	}

	#[test]
	fn read_until_skips_sequences_of_undefined_length() {
		for explicit in [true, false] {
			let ts = if explicit {
				EXPLICIT_VR_LITTLE_ENDIAN
			} else {
				IMPLICIT_VR_LITTLE_ENDIAN
			};
			let file = Part10Builder::new(ts)
				.string(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3")
				.sequence_undefined(
					tags::REFERENCED_IMAGE_SEQUENCE,
					vec![
						Part10Builder::item().string(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, "4.5"),
					],
				)
				.bytes(tags::PIXEL_DATA, VR::OW, &[1, 2, 3, 4])
				.build();

			let mut reader = open(&file).unwrap();
			let header = reader.read_until(tags::PIXEL_DATA).unwrap().unwrap();
			assert_eq!(header.tag, tags::PIXEL_DATA);
			assert_eq!(header.len, Length::defined(4));
			let mut value = Vec::new();
			reader.copy_to(4, &mut value).unwrap();
			assert_eq!(value, [1, 2, 3, 4]);
			assert!(reader.read_header().unwrap().is_none());
		}
	}

	#[test]
	fn read_until_stops_at_greater_tag() {
		let file = Part10Builder::new(EXPLICIT_VR_LITTLE_ENDIAN)
			.string(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3")
			.bytes(tags::PIXEL_DATA, VR::OB, &[0; 2])
			.build();
		let mut reader = open(&file).unwrap();
		let header = reader.read_until(tags::ROWS).unwrap().unwrap();
		assert_eq!(header.tag, tags::PIXEL_DATA);
	}

	#[test]
	fn truncated_value_is_an_error() {
		let mut file = Part10Builder::new(EXPLICIT_VR_LITTLE_ENDIAN)
			.bytes(tags::PIXEL_DATA, VR::OB, &[0; 8])
			.build();
		file.truncate(file.len() - 3);
		let mut reader = open(&file).unwrap();
		let header = reader.read_until(tags::PIXEL_DATA).unwrap().unwrap();
		let length = u64::from(header.len.get().unwrap());
		assert!(matches!(
			reader.copy_to(length, &mut Vec::new()),
			Err(StreamError::UnexpectedEof)
		));
	}

	#[test]
	fn truncated_header_is_an_error() {
		let mut file = Part10Builder::new(EXPLICIT_VR_LITTLE_ENDIAN)
			.string(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3")
			.bytes(tags::PIXEL_DATA, VR::OB, &[0; 8])
			.build();
		// leaves half of the pixel data header
		file.truncate(file.len() - 8 - 6);
		let mut reader = open(&file).unwrap();
		assert!(matches!(
			reader.read_until(tags::PIXEL_DATA),
			Err(StreamError::UnexpectedEof)
		));
	}

	fn pixel_dataset() -> InMemDicomObject {
		let mut dataset = InMemDicomObject::new_empty();
		dataset.put_str(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3");
		dataset.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(2u16)));
		dataset.put(DataElement::new(
			tags::PIXEL_DATA,
			VR::OB,
			PrimitiveValue::from(vec![1u8, 2, 3, 4]),
		));
		dataset
	}

	#[test]
	fn reads_big_endian_datasets() {
		let file = encode_file(pixel_dataset(), EXPLICIT_VR_BIG_ENDIAN);
		let mut reader = open(&file).unwrap();
		assert_eq!(reader.transfer_syntax_uid(), EXPLICIT_VR_BIG_ENDIAN);
		let header = reader.read_until(tags::PIXEL_DATA).unwrap().unwrap();
		assert_eq!(header.tag, tags::PIXEL_DATA);
		assert_eq!(header.len, Length::defined(4));
		assert_eq!(reader.read_vec(4).unwrap(), [1, 2, 3, 4]);
	}

	#[test]
	fn inflates_deflated_datasets() {
		let file = encode_file(pixel_dataset(), DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN);
		let mut reader = open(&file).unwrap();
		let header = reader.read_until(tags::PIXEL_DATA).unwrap().unwrap();
		assert_eq!(header.len, Length::defined(4));
		assert_eq!(reader.read_vec(4).unwrap(), [1, 2, 3, 4]);
		assert!(reader.read_header().unwrap().is_none());
	}

	#[test]
	fn write_errors_stay_io_errors() {
		struct Closed;
		impl Write for Closed {
			fn write(&mut self, _: &[u8]) -> io::Result<usize> {
				Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
			}

			fn flush(&mut self) -> io::Result<()> {
				Ok(())
			}
		}

		let file = Part10Builder::new(EXPLICIT_VR_LITTLE_ENDIAN)
			.bytes(tags::PIXEL_DATA, VR::OB, &[0; 8])
			.build();
		let mut reader = open(&file).unwrap();
		reader.read_until(tags::PIXEL_DATA).unwrap();
		match reader.copy_to(8, &mut Closed) {
			Err(StreamError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
			other => panic!("unexpected result {other:?}"),
		}
	}

	#[test]
	fn long_values_are_split() {
		let pieces: Vec<u32> = chunks(u64::from(u32::MAX) + 5).collect();
		assert_eq!(pieces, [u32::MAX, 5]);
		assert_eq!(chunks(0).count(), 0);
	}
}
