//! Frame-level output of pixel data. Frames come from a forward-only source;
//! frames requested out of order are spooled to temporary files.

use crate::retrieve::codec::{decoder_for, FrameBuffer, FrameDecoder, FrameGeometry};
use crate::retrieve::descriptor::{InstanceDescriptor, InstanceStream};
use crate::retrieve::encapsulated::EncapsulatedFrames;
use crate::retrieve::error::RetrieveError;
use crate::retrieve::resources::Release;
use crate::retrieve::spool::SpoolDirectory;
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use tempfile::NamedTempFile;
use tracing::trace;

const FLOAT_PIXEL_DATA: Tag = Tag(0x7FE0, 0x0008);
const DOUBLE_FLOAT_PIXEL_DATA: Tag = Tag(0x7FE0, 0x0009);

/// Produces the frames of one instance in ascending order.
pub trait FrameSource {
	/// Opens the underlying stream. Called once before the first frame.
	fn open(&mut self) -> Result<(), RetrieveError>;

	/// Writes the next frame and advances past it.
	fn write_frame(&mut self, out: &mut dyn Write) -> Result<(), RetrieveError>;

	fn skip_frame(&mut self) -> Result<(), RetrieveError>;

	fn close(&mut self);
}

/// Frames of native pixel data: consecutive runs of `frame_bits` bits.
pub struct NativeFrames {
	instance: InstanceDescriptor,
	reader: Option<InstanceStream>,
	/// Byte of single bit data that the previous frame ended in, with the number of
	/// its bits that frame used.
	carry: Option<(u8, u32)>,
}

impl NativeFrames {
	pub const fn new(instance: InstanceDescriptor) -> Self {
		Self {
			instance,
			reader: None,
			carry: None,
		}
	}

	fn reader(&mut self) -> Result<&mut InstanceStream, RetrieveError> {
		self.reader
			.as_mut()
			.ok_or(RetrieveError::Internal("frame source is not open"))
	}

	fn is_byte_aligned(&self) -> bool {
		self.instance.frame_bits() % 8 == 0
	}

	/// Reads a frame of bit-packed samples that may start and end inside a byte.
	fn read_packed_frame(&mut self) -> Result<Vec<u8>, RetrieveError> {
		let bits = self.instance.frame_bits();
		let (mut packed, shift) = match self.carry.take() {
			Some((byte, used)) => (vec![byte], used),
			None => (Vec::new(), 0),
		};
		let total = u64::from(shift) + bits;
		let missing = total.div_ceil(8) - packed.len() as u64;
		self.reader()?.copy_to(missing, &mut packed)?;

		#[allow(clippy::cast_possible_truncation)]
		let used = (total % 8) as u32;
		if used != 0 {
			self.carry = packed.last().map(|&byte| (byte, used));
		}
		Ok(shift_bits(&packed, shift, bits))
	}
}

/// Extracts `bits` bits starting at bit `shift` of `packed`, least significant bit
/// first. Unused bits of the last byte are cleared.
fn shift_bits(packed: &[u8], shift: u32, bits: u64) -> Vec<u8> {
	#[allow(clippy::cast_possible_truncation)]
	let length = bits.div_ceil(8) as usize;
	let mut frame: Vec<u8> = (0..length)
		.map(|i| {
			let high = match shift {
				0 => 0,
				_ => packed.get(i + 1).map_or(0, |&byte| byte << (8 - shift)),
			};
			(packed[i] >> shift) | high
		})
		.collect();
	let tail = bits % 8;
	if tail != 0 {
		if let Some(last) = frame.last_mut() {
			*last &= (1u8 << tail) - 1;
		}
	}
	frame
}

impl FrameSource for NativeFrames {
	fn open(&mut self) -> Result<(), RetrieveError> {
		let mut reader = self.instance.open()?;
		match reader.read_until(FLOAT_PIXEL_DATA)? {
			Some(header)
				if [FLOAT_PIXEL_DATA, DOUBLE_FLOAT_PIXEL_DATA, tags::PIXEL_DATA]
					.contains(&header.tag)
					&& !header.len.is_undefined() => {}
			_ => {
				return Err(RetrieveError::MissingBulkdata {
					path: String::from("7FE00010"),
				});
			}
		}
		self.reader = Some(reader);
		Ok(())
	}

	fn write_frame(&mut self, out: &mut dyn Write) -> Result<(), RetrieveError> {
		if self.is_byte_aligned() {
			let length = self.instance.frame_length();
			self.reader()?.copy_to(length, out)?;
		} else {
			let frame = self.read_packed_frame()?;
			out.write_all(&frame)?;
		}
		Ok(())
	}

	fn skip_frame(&mut self) -> Result<(), RetrieveError> {
		if self.is_byte_aligned() {
			let length = self.instance.frame_length();
			self.reader()?.skip(length)?;
		} else {
			self.read_packed_frame()?;
		}
		Ok(())
	}

	fn close(&mut self) {
		self.reader = None;
		self.carry = None;
	}
}

/// Frames of encapsulated pixel data in their compressed form.
pub struct CompressedFrames {
	instance: InstanceDescriptor,
	cursor: Option<EncapsulatedFrames>,
}

impl CompressedFrames {
	pub const fn new(instance: InstanceDescriptor) -> Self {
		Self {
			instance,
			cursor: None,
		}
	}

	fn cursor(&mut self) -> Result<&mut EncapsulatedFrames, RetrieveError> {
		self.cursor
			.as_mut()
			.ok_or(RetrieveError::Internal("frame source is not open"))
	}
}

impl FrameSource for CompressedFrames {
	fn open(&mut self) -> Result<(), RetrieveError> {
		self.cursor = Some(EncapsulatedFrames::open(&self.instance)?);
		Ok(())
	}

	fn write_frame(&mut self, out: &mut dyn Write) -> Result<(), RetrieveError> {
		let frame = self.cursor()?.next_frame()?;
		out.write_all(&frame)?;
		Ok(())
	}

	fn skip_frame(&mut self) -> Result<(), RetrieveError> {
		self.cursor()?.skip_frame()
	}

	fn close(&mut self) {
		self.cursor = None;
	}
}

/// Frames of encapsulated pixel data, decoded to native samples.
pub struct DecompressedFrames {
	instance: InstanceDescriptor,
	state: Option<DecoderState>,
}

struct DecoderState {
	cursor: EncapsulatedFrames,
	decoder: Box<dyn FrameDecoder>,
	buffer: FrameBuffer,
}

impl DecompressedFrames {
	pub const fn new(instance: InstanceDescriptor) -> Self {
		Self {
			instance,
			state: None,
		}
	}

	fn state(&mut self) -> Result<&mut DecoderState, RetrieveError> {
		self.state
			.as_mut()
			.ok_or(RetrieveError::Internal("frame source is not open"))
	}
}

impl FrameSource for DecompressedFrames {
	fn open(&mut self) -> Result<(), RetrieveError> {
		let decoder = decoder_for(&self.instance)?;
		let buffer = FrameBuffer::new(FrameGeometry::of(&self.instance));
		let cursor = EncapsulatedFrames::open(&self.instance)?;
		self.state = Some(DecoderState {
			cursor,
			decoder,
			buffer,
		});
		Ok(())
	}

	fn write_frame(&mut self, out: &mut dyn Write) -> Result<(), RetrieveError> {
		let state = self.state()?;
		if state.cursor.is_end_of_stream() {
			return Err(RetrieveError::IncompleteBitstream);
		}
		let encoded = state.cursor.next_frame()?;
		state.decoder.decode(&encoded, &mut state.buffer)?;
		state.buffer.write_to(out)?;
		Ok(())
	}

	fn skip_frame(&mut self) -> Result<(), RetrieveError> {
		self.state()?.cursor.skip_frame()
	}

	fn close(&mut self) {
		self.state = None;
	}
}

/// Writes the frames of a frame list, one call per entry, in list order.
///
/// The source only moves forward. A frame that a later entry needs while the source
/// passes it is written to a spool file once and shared by every entry that wants it.
pub struct FramesOutput<S> {
	source: S,
	opened: bool,
	closed: bool,
	frames: Vec<u32>,
	/// Index of the next entry to write.
	index: usize,
	/// Number of the frame the source produces next.
	frame: u32,
	spooled: Vec<Option<Rc<NamedTempFile>>>,
	spool: Rc<RefCell<SpoolDirectory>>,
}

impl<S: FrameSource> FramesOutput<S> {
	pub fn new(source: S, frames: Vec<u32>, spool: Rc<RefCell<SpoolDirectory>>) -> Self {
		let spooled = vec![None; frames.len()];
		Self {
			source,
			opened: false,
			closed: false,
			frames,
			index: 0,
			frame: 1,
			spooled,
			spool,
		}
	}

	/// Writes the frame of the next entry.
	pub fn write_next(&mut self, out: &mut dyn Write) -> Result<(), RetrieveError> {
		let index = self.index;
		let wanted = *self
			.frames
			.get(index)
			.ok_or(RetrieveError::Internal("frame list exhausted"))?;
		self.index += 1;

		if let Some(file) = self.spooled[index].take() {
			trace!(frame = wanted, "Copying spooled frame");
			io::copy(&mut file.reopen()?, out)?;
		} else {
			self.open_source()?;
			while self.frame < wanted {
				if self.needed_after(index, self.frame) {
					self.spool_frame(index)?;
				} else {
					self.source.skip_frame()?;
				}
				self.frame += 1;
			}
			if self.needed_after(index, wanted) {
				let file = self.spool_frame(index)?;
				io::copy(&mut file.reopen()?, out)?;
			} else {
				self.source.write_frame(out)?;
			}
			self.frame += 1;
		}

		if !self.frames[self.index..].iter().any(|&f| f >= self.frame) {
			self.close_source();
		}
		Ok(())
	}

	fn open_source(&mut self) -> Result<(), RetrieveError> {
		if self.closed {
			return Err(RetrieveError::Internal("frame source already closed"));
		}
		if !self.opened {
			self.source.open()?;
			self.opened = true;
		}
		Ok(())
	}

	fn close_source(&mut self) {
		if self.opened && !self.closed {
			self.source.close();
		}
		self.closed = true;
	}

	fn needed_after(&self, index: usize, frame: u32) -> bool {
		self.frames[index + 1..]
			.iter()
			.enumerate()
			.any(|(i, &f)| f == frame && self.spooled[index + 1 + i].is_none())
	}

	/// Writes the current frame of the source to a spool file and hands it to every
	/// later entry that wants it.
	fn spool_frame(&mut self, index: usize) -> Result<Rc<NamedTempFile>, RetrieveError> {
		let mut file = self.spool.borrow_mut().create_file()?;
		self.source.write_frame(&mut file)?;
		file.flush()?;
		trace!(frame = self.frame, path = %file.path().display(), "Spooled frame");

		let file = Rc::new(file);
		for i in index + 1..self.frames.len() {
			if self.frames[i] == self.frame && self.spooled[i].is_none() {
				self.spooled[i] = Some(Rc::clone(&file));
			}
		}
		Ok(file)
	}
}

impl<S: FrameSource> Release for FramesOutput<S> {
	fn release(&mut self) {
		self.close_source();
		self.spooled.clear();
	}
}

/// Writes every encapsulated fragment of the instance back to back.
pub fn write_all_fragments(
	instance: &InstanceDescriptor,
	out: &mut dyn Write,
) -> Result<(), RetrieveError> {
	EncapsulatedFrames::open(instance)?.write_remaining(out)
}

/// Decodes every frame of the instance into one native pixel stream.
pub fn write_decompressed(
	instance: &InstanceDescriptor,
	out: &mut dyn Write,
) -> Result<(), RetrieveError> {
	let mut source = DecompressedFrames::new(instance.clone());
	source.open()?;
	for _ in 0..instance.number_of_frames() {
		source.write_frame(out)?;
	}
	Ok(())
}
