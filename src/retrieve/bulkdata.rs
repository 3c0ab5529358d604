//! Structural seek to a bulk data element addressed by an [`AttributePath`].

use crate::retrieve::context::{AttributePath, PathSegment};
use crate::retrieve::descriptor::{InstanceDescriptor, InstanceStream};
use crate::retrieve::error::RetrieveError;
use dicom::core::Length;
use dicom::dictionary_std::tags;
use std::io::Write;

pub struct BulkDataExtractor<'a> {
	path: &'a AttributePath,
}

impl<'a> BulkDataExtractor<'a> {
	pub const fn new(path: &'a AttributePath) -> Self {
		Self { path }
	}

	fn missing(&self) -> RetrieveError {
		RetrieveError::MissingBulkdata {
			path: self.path.to_string(),
		}
	}

	/// Copies the value of the addressed element to `out`. Nothing is decoded.
	pub fn write_to(
		&self,
		instance: &InstanceDescriptor,
		out: &mut dyn Write,
	) -> Result<(), RetrieveError> {
		let mut reader = instance.open()?;
		let mut length = None;
		for segment in self.path.segments() {
			match *segment {
				PathSegment::Tag(tag) => {
					let header = reader.read_until(tag)?;
					match header {
						Some(header) if header.tag == tag => length = Some(header.len),
						_ => return Err(self.missing()),
					}
				}
				PathSegment::Item(index) => self.enter_item(&mut reader, index)?,
			}
		}

		match length {
			Some(length) if length.is_undefined() => {
				let skip_offset_table = self.path.segments().last()
					== Some(&PathSegment::Tag(tags::PIXEL_DATA));
				self.copy_fragments(&mut reader, skip_offset_table, out)
			}
			Some(length) => {
				let length = length.get().map_or(0, u64::from);
				reader.copy_to(length, out)?;
				Ok(())
			}
			None => Err(self.missing()),
		}
	}

	/// Skips `index` items of the current sequence and steps into the next one.
	fn enter_item(&self, reader: &mut InstanceStream, index: u32) -> Result<(), RetrieveError> {
		for _ in 0..index {
			let length = self.next_item(reader)?;
			reader.skip_item_content(length)?;
		}
		self.next_item(reader).map(|_| ())
	}

	fn next_item(&self, reader: &mut InstanceStream) -> Result<Length, RetrieveError> {
		match reader.next_item() {
			Ok(Some(length)) => Ok(length),
			Ok(None) | Err(_) => Err(self.missing()),
		}
	}

	fn copy_fragments(
		&self,
		reader: &mut InstanceStream,
		skip_offset_table: bool,
		out: &mut dyn Write,
	) -> Result<(), RetrieveError> {
		let mut first = true;
		while let Some(length) = reader.next_item()? {
			let length = length.get().map_or(0, u64::from);
			if first && skip_offset_table {
				reader.skip(length)?;
			} else {
				reader.copy_to(length, out)?;
			}
			first = false;
		}
		Ok(())
	}
}
