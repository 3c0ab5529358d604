use crate::retrieve::descriptor::InstanceDescriptor;
use crate::retrieve::error::RetrieveError;
use crate::retrieve::media_type::MediaType;
use crate::retrieve::negotiation::AcceptableMediaTypes;
use crate::retrieve::resources::ResourceGuard;
use crate::retrieve::archive::EntryNameFormat;
use crate::types::UI;
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// What a request asks for. Fixed when the request is parsed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RetrieveTarget {
	Study,
	Series,
	Instance,
	Frame,
	Bulkdata,
	StudyMetadata,
	SeriesMetadata,
	InstanceMetadata,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseFrameListError {
	#[error("Invalid frame number '{0}'")]
	InvalidNumber(String),
	#[error("Empty frame list")]
	Empty,
}

/// 1-based frame numbers in the order the caller listed them. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSelection(Vec<u32>);

impl FrameSelection {
	pub const fn new(frames: Vec<u32>) -> Self {
		Self(frames)
	}

	pub fn frames(&self) -> &[u32] {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Drops frame numbers beyond `number_of_frames`. The second value tells whether
	/// anything was dropped.
	pub fn clamp(&self, number_of_frames: u32) -> (Self, bool) {
		let frames: Vec<u32> = self
			.0
			.iter()
			.copied()
			.filter(|&frame| frame >= 1 && frame <= number_of_frames)
			.collect();
		let dropped = frames.len() != self.0.len();
		(Self(frames), dropped)
	}
}

impl FromStr for FrameSelection {
	type Err = ParseFrameListError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let frames = s
			.split(',')
			.map(str::trim)
			.map(|value| match value.parse::<u32>() {
				Ok(frame) if frame > 0 => Ok(frame),
				_ => Err(ParseFrameListError::InvalidNumber(value.to_owned())),
			})
			.collect::<Result<Vec<_>, _>>()?;
		if frames.is_empty() {
			return Err(ParseFrameListError::Empty);
		}
		Ok(Self(frames))
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PathSegment {
	Tag(Tag),
	/// Zero-based sequence item index.
	Item(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseAttributePathError {
	#[error("Invalid attribute tag '{0}'")]
	InvalidTag(String),
	#[error("Invalid item index '{0}'")]
	InvalidItem(String),
	#[error("Attribute path must end with an attribute tag")]
	EndsWithItem,
}

/// Alternating attribute tags and item indices that address a nested element.
/// The empty path addresses the top level of the dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributePath(Vec<PathSegment>);

impl AttributePath {
	pub const fn root() -> Self {
		Self(Vec::new())
	}

	pub fn of(tag: Tag) -> Self {
		Self(vec![PathSegment::Tag(tag)])
	}

	pub fn segments(&self) -> &[PathSegment] {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Path of `tag` inside item `index` of the sequence this path ends with.
	pub fn child(&self, index: u32, tag: Tag) -> Self {
		let mut segments = self.0.clone();
		if !segments.is_empty() {
			segments.push(PathSegment::Item(index));
		}
		segments.push(PathSegment::Tag(tag));
		Self(segments)
	}

	pub fn is_encapsulated_document(&self) -> bool {
		self.0 == [PathSegment::Tag(tags::ENCAPSULATED_DOCUMENT)]
	}

	/// Retrieve URI of the addressed element relative to its instance URL.
	pub fn relative_uri(&self) -> String {
		format!("/bulkdata/{self}")
	}
}

impl Display for AttributePath {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		for (i, segment) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str("/")?;
			}
			match segment {
				PathSegment::Tag(tag) => write!(f, "{:04X}{:04X}", tag.0, tag.1)?,
				PathSegment::Item(index) => write!(f, "{index}")?,
			}
		}
		Ok(())
	}
}

impl FromStr for AttributePath {
	type Err = ParseAttributePathError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut segments = Vec::new();
		for (i, value) in s.trim_matches('/').split('/').enumerate() {
			if i % 2 == 0 {
				if value.len() != 8 {
					return Err(ParseAttributePathError::InvalidTag(value.to_owned()));
				}
				let tag = u32::from_str_radix(value, 16)
					.map_err(|_| ParseAttributePathError::InvalidTag(value.to_owned()))?;
				#[allow(clippy::cast_possible_truncation)]
				segments.push(PathSegment::Tag(Tag((tag >> 16) as u16, tag as u16)));
			} else {
				let index = value
					.parse::<u32>()
					.map_err(|_| ParseAttributePathError::InvalidItem(value.to_owned()))?;
				segments.push(PathSegment::Item(index));
			}
		}
		if segments.len() % 2 == 0 {
			return Err(ParseAttributePathError::EndsWithItem);
		}
		Ok(Self(segments))
	}
}

/// A parsed retrieve request. Sent to the worker that serves it.
#[derive(Debug, Clone)]
pub struct RetrieveRequest {
	pub target: RetrieveTarget,
	pub study_instance_uid: UI,
	pub series_instance_uid: Option<UI>,
	pub sop_instance_uid: Option<UI>,
	pub frames: Option<FrameSelection>,
	pub path: Option<AttributePath>,
	/// Absolute URL of the request, used for Content-Location and BulkDataURI values.
	pub request_url: String,
	pub accept: AcceptableMediaTypes,
}

/// Options of the engine that come from configuration.
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
	pub include_private: bool,
	pub zip_entry_names: EntryNameFormat,
	pub spool_directory: PathBuf,
	pub chunk_size: usize,
}

/// Per-response state. Owns everything a response opens; dropping it releases
/// those resources.
pub struct RetrievalContext {
	pub request: RetrieveRequest,
	pub options: RetrieveOptions,
	pub matches: Vec<InstanceDescriptor>,
	/// Negotiated part type of each retained match, keyed by SOP Instance UID.
	pub media_types: HashMap<UI, MediaType>,
	pub partial_content: bool,
	pub resources: ResourceGuard,
}

impl RetrievalContext {
	pub fn new(request: RetrieveRequest, options: RetrieveOptions) -> Self {
		let resources = ResourceGuard::new(options.spool_directory.clone());
		Self {
			request,
			options,
			matches: Vec::new(),
			media_types: HashMap::new(),
			partial_content: false,
			resources,
		}
	}

	pub const fn target(&self) -> RetrieveTarget {
		self.request.target
	}

	pub const fn accept(&self) -> &AcceptableMediaTypes {
		&self.request.accept
	}

	pub fn frames(&self) -> Option<&FrameSelection> {
		self.request.frames.as_ref()
	}

	/// Clamps the frame list to the frames of the instance.
	pub fn adjust_frame_list(&mut self, number_of_frames: u32) -> Result<(), RetrieveError> {
		let Some(frames) = &self.request.frames else {
			return Ok(());
		};
		let (clamped, dropped) = frames.clamp(number_of_frames);
		if clamped.is_empty() {
			return Err(RetrieveError::InvalidFrameNumber);
		}
		if dropped {
			self.partial_content = true;
		}
		self.request.frames = Some(clamped);
		Ok(())
	}

	/// URL of a match's instance resource, derived from the request URL.
	pub fn instance_url(&self, instance: &InstanceDescriptor) -> String {
		let mut url = self.request.request_url.clone();
		for marker in ["/metadata", "/frames/", "/bulkdata/"] {
			if let Some(position) = url.find(marker) {
				url.truncate(position);
			}
		}
		let url = url.trim_end_matches('/');
		let mut url = url.to_owned();
		if !url.contains("/series/") {
			url.push_str("/series/");
			url.push_str(instance.series_instance_uid());
		}
		if !url.contains("/instances/") {
			url.push_str("/instances/");
			url.push_str(instance.sop_instance_uid());
		}
		url
	}

	pub fn frame_url(&self, instance: &InstanceDescriptor, frame: u32) -> String {
		format!("{}/frames/{frame}", self.instance_url(instance))
	}
}
