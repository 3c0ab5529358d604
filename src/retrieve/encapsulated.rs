//! Forward-only cursor over the fragments of encapsulated pixel data.

use crate::retrieve::descriptor::{InstanceDescriptor, InstanceStream};
use crate::retrieve::error::RetrieveError;
use crate::retrieve::transfer_syntax;
use dicom::dictionary_std::tags;
use std::io::Write;

/// Where one frame ends and the next one starts.
#[derive(Debug, PartialEq, Eq)]
enum FrameBoundaries {
	/// Offsets from the Basic Offset Table, relative to the first fragment.
	OffsetTable(Vec<u64>),
	/// All fragments belong to the only frame.
	SingleFrame,
	/// Fragments are gathered until a JPEG end-of-image marker.
	EndOfImage,
	OneFragmentPerFrame,
}

pub struct EncapsulatedFrames {
	reader: InstanceStream,
	boundaries: FrameBoundaries,
	/// Stream position of the first fragment.
	base: u64,
	/// Length of a fragment whose header was read but whose value was not.
	pending: Option<u64>,
	frame: usize,
	end_of_stream: bool,
}

impl EncapsulatedFrames {
	/// Opens the instance and positions the cursor at the first frame.
	pub fn open(instance: &InstanceDescriptor) -> Result<Self, RetrieveError> {
		let mut reader = instance.open()?;
		let header = reader.read_until(tags::PIXEL_DATA)?;
		match header {
			Some(header) if header.tag == tags::PIXEL_DATA && header.len.is_undefined() => {}
			_ => return Err(RetrieveError::NotEncapsulated),
		}

		let table_length = reader.next_item()?.and_then(|length| length.get()).ok_or(RetrieveError::NotEncapsulated)?;
		let table = reader.read_vec(u64::from(table_length))?;
		let offsets: Vec<u64> = table
			.chunks_exact(4)
			.map(|chunk| u64::from(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
			.collect();

		let boundaries = if offsets.len() > 1 {
			FrameBoundaries::OffsetTable(offsets)
		} else if instance.number_of_frames() <= 1 {
			FrameBoundaries::SingleFrame
		} else if transfer_syntax::is_jpeg_family(instance.transfer_syntax_uid()) {
			FrameBoundaries::EndOfImage
		} else {
			FrameBoundaries::OneFragmentPerFrame
		};

		Ok(Self {
			base: reader.position(),
			reader,
			boundaries,
			pending: None,
			frame: 0,
			end_of_stream: false,
		})
	}

	pub const fn is_end_of_stream(&self) -> bool {
		self.end_of_stream
	}

	/// Reads the header of the next fragment. Returns `false` at the sequence delimiter.
	fn next_fragment(&mut self) -> Result<bool, RetrieveError> {
		if self.pending.is_some() {
			return Ok(true);
		}
		if self.end_of_stream {
			return Ok(false);
		}
		match self.reader.next_item()? {
			Some(length) => {
				let length = length.get().ok_or(RetrieveError::NotEncapsulated)?;
				self.pending = Some(u64::from(length));
				Ok(true)
			}
			None => {
				self.end_of_stream = true;
				Ok(false)
			}
		}
	}

	/// Position of the pending fragment's item header relative to the first fragment.
	fn pending_offset(&self) -> u64 {
		// item tag + item length precede the value
		self.reader.position() - self.base - 8
	}

	fn consume_fragment(&mut self, sink: Option<&mut Vec<u8>>) -> Result<(), RetrieveError> {
		let length = self.pending.take().ok_or(RetrieveError::Internal("no pending fragment"))?;
		match sink {
			Some(sink) => self.reader.copy_to(length, sink)?,
			None => self.reader.skip(length)?,
		}
		Ok(())
	}

	/// Reads the fragments of the current frame, appending them to `sink` if given.
	fn read_frame(&mut self, mut sink: Option<&mut Vec<u8>>) -> Result<(), RetrieveError> {
		if !self.next_fragment()? {
			return Err(RetrieveError::IncompleteBitstream);
		}

		match &self.boundaries {
			FrameBoundaries::OffsetTable(offsets) => {
				let end = offsets.get(self.frame + 1).copied();
				loop {
					self.consume_fragment(sink.as_deref_mut())?;
					if !self.next_fragment()? || end.is_some_and(|end| self.pending_offset() >= end) {
						break;
					}
				}
			}
			FrameBoundaries::SingleFrame => {
				while self.next_fragment()? {
					self.consume_fragment(sink.as_deref_mut())?;
				}
			}
			FrameBoundaries::EndOfImage => {
				let mut frame = Vec::new();
				loop {
					self.consume_fragment(Some(&mut frame))?;
					if ends_with_eoi(&frame) || !self.next_fragment()? {
						break;
					}
				}
				if let Some(sink) = sink {
					sink.extend_from_slice(&frame);
				}
			}
			FrameBoundaries::OneFragmentPerFrame => self.consume_fragment(sink)?,
		}

		self.frame += 1;
		Ok(())
	}

	/// Returns the encoded bytes of the current frame and advances to the next one.
	pub fn next_frame(&mut self) -> Result<Vec<u8>, RetrieveError> {
		let mut frame = Vec::new();
		self.read_frame(Some(&mut frame))?;
		Ok(frame)
	}

	pub fn skip_frame(&mut self) -> Result<(), RetrieveError> {
		self.read_frame(None)
	}

	/// Copies the values of all remaining fragments to `out`.
	pub fn write_remaining(&mut self, out: &mut dyn Write) -> Result<(), RetrieveError> {
		while self.next_fragment()? {
			let length = self.pending.take().ok_or(RetrieveError::Internal("no pending fragment"))?;
			self.reader.copy_to(length, out)?;
		}
		Ok(())
	}
}

/// JPEG streams end with FFD9, possibly followed by one padding byte.
fn ends_with_eoi(data: &[u8]) -> bool {
	let data = match data {
		[rest @ .., 0] => rest,
		_ => data,
	};
	data.ends_with(&[0xFF, 0xD9])
}
