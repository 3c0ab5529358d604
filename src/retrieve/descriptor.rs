use crate::retrieve::stream::{DicomStreamReader, StreamError};
use crate::retrieve::transfer_syntax::{self, RT_DOSE_STORAGE};
use crate::types::{UI, US};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;

/// Opens the stored bytes of an instance.
pub trait ObjectSource: Send + Sync {
	fn open(&self) -> io::Result<Box<dyn Read + Send>>;

	/// Human readable location used in log messages.
	fn describe(&self) -> String;
}

pub struct FileSource {
	path: PathBuf,
}

impl FileSource {
	pub const fn new(path: PathBuf) -> Self {
		Self { path }
	}
}

impl ObjectSource for FileSource {
	fn open(&self) -> io::Result<Box<dyn Read + Send>> {
		Ok(Box::new(BufReader::new(File::open(&self.path)?)))
	}

	fn describe(&self) -> String {
		self.path.display().to_string()
	}
}

pub type InstanceStream = DicomStreamReader;

/// Immutable facts about a matched instance, derived from its indexed attributes.
#[derive(Clone)]
pub struct InstanceDescriptor {
	attributes: Arc<InMemDicomObject>,
	sop_class_uid: UI,
	sop_instance_uid: UI,
	study_instance_uid: UI,
	series_instance_uid: UI,
	transfer_syntax_uid: UI,
	number_of_frames: u32,
	rows: US,
	columns: US,
	samples_per_pixel: US,
	bits_allocated: Option<US>,
	planar_configuration: US,
	is_image: bool,
	is_video: bool,
	source: Arc<dyn ObjectSource>,
}

impl InstanceDescriptor {
	pub fn new(
		attributes: InMemDicomObject,
		transfer_syntax_uid: &str,
		source: Arc<dyn ObjectSource>,
	) -> Self {
		let sop_class_uid = string(&attributes, tags::SOP_CLASS_UID);
		let bits_allocated = short(&attributes, tags::BITS_ALLOCATED);
		let transfer_syntax_uid = transfer_syntax_uid.trim_end_matches(['\0', ' ']).to_owned();

		Self {
			is_image: bits_allocated.is_some() && sop_class_uid != RT_DOSE_STORAGE,
			is_video: transfer_syntax::is_video(&transfer_syntax_uid),
			sop_instance_uid: string(&attributes, tags::SOP_INSTANCE_UID),
			study_instance_uid: string(&attributes, tags::STUDY_INSTANCE_UID),
			series_instance_uid: string(&attributes, tags::SERIES_INSTANCE_UID),
			number_of_frames: long(&attributes, tags::NUMBER_OF_FRAMES).unwrap_or(1),
			rows: short(&attributes, tags::ROWS).unwrap_or_default(),
			columns: short(&attributes, tags::COLUMNS).unwrap_or_default(),
			samples_per_pixel: short(&attributes, tags::SAMPLES_PER_PIXEL).unwrap_or(1),
			planar_configuration: short(&attributes, tags::PLANAR_CONFIGURATION)
				.unwrap_or_default(),
			bits_allocated,
			sop_class_uid,
			transfer_syntax_uid,
			attributes: Arc::new(attributes),
			source,
		}
	}

	pub fn attributes(&self) -> &InMemDicomObject {
		&self.attributes
	}

	pub fn sop_class_uid(&self) -> &str {
		&self.sop_class_uid
	}

	pub fn sop_instance_uid(&self) -> &str {
		&self.sop_instance_uid
	}

	pub fn study_instance_uid(&self) -> &str {
		&self.study_instance_uid
	}

	pub fn series_instance_uid(&self) -> &str {
		&self.series_instance_uid
	}

	pub fn transfer_syntax_uid(&self) -> &str {
		&self.transfer_syntax_uid
	}

	pub const fn number_of_frames(&self) -> u32 {
		self.number_of_frames
	}

	pub const fn rows(&self) -> US {
		self.rows
	}

	pub const fn columns(&self) -> US {
		self.columns
	}

	pub const fn samples_per_pixel(&self) -> US {
		self.samples_per_pixel
	}

	pub fn bits_allocated(&self) -> US {
		self.bits_allocated.unwrap_or(8)
	}

	pub const fn planar_configuration(&self) -> US {
		self.planar_configuration
	}

	pub fn photometric_interpretation(&self) -> String {
		string(&self.attributes, tags::PHOTOMETRIC_INTERPRETATION)
	}

	pub const fn is_image(&self) -> bool {
		self.is_image
	}

	pub const fn is_video(&self) -> bool {
		self.is_video
	}

	pub const fn is_multiframe(&self) -> bool {
		self.number_of_frames > 1
	}

	/// Number of samples in one frame.
	pub fn samples_per_frame(&self) -> usize {
		usize::from(self.rows) * usize::from(self.columns) * usize::from(self.samples_per_pixel)
	}

	/// Size of one frame of native pixel data in bits. Frames of single bit data are
	/// packed without padding, so they need not start on a byte boundary.
	pub fn frame_bits(&self) -> u64 {
		self.samples_per_frame() as u64 * u64::from(self.bits_allocated())
	}

	/// Size of one frame of native pixel data in bytes, as it is returned on its own.
	pub fn frame_length(&self) -> u64 {
		self.frame_bits().div_ceil(8)
	}

	pub fn source(&self) -> &dyn ObjectSource {
		self.source.as_ref()
	}

	/// Opens the stored object positioned at the start of its dataset.
	pub fn open(&self) -> Result<InstanceStream, StreamError> {
		DicomStreamReader::open(self.source.open()?)
	}
}

impl Debug for InstanceDescriptor {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InstanceDescriptor")
			.field("sop_class_uid", &self.sop_class_uid)
			.field("sop_instance_uid", &self.sop_instance_uid)
			.field("transfer_syntax_uid", &self.transfer_syntax_uid)
			.field("number_of_frames", &self.number_of_frames)
			.field("source", &self.source.describe())
			.finish_non_exhaustive()
	}
}

fn string(attributes: &InMemDicomObject, tag: Tag) -> String {
	attributes
		.get(tag)
		.and_then(|element| element.to_str().ok())
		.map(|value| value.trim_end_matches(['\0', ' ']).to_owned())
		.unwrap_or_default()
}

fn short(attributes: &InMemDicomObject, tag: Tag) -> Option<US> {
	attributes
		.get(tag)
		.map(InMemElement::to_int::<US>)
		.and_then(Result::ok)
}

fn long(attributes: &InMemDicomObject, tag: Tag) -> Option<u32> {
	attributes
		.get(tag)
		.map(InMemElement::to_int::<u32>)
		.and_then(Result::ok)
}
