//! Output strategies. A strategy decides which matches survive content negotiation
//! and how the survivors are turned into a response body.

use crate::retrieve::archive::write_zip;
use crate::retrieve::bulkdata::BulkDataExtractor;
use crate::retrieve::codec;
use crate::retrieve::context::{AttributePath, RetrievalContext, RetrieveTarget};
use crate::retrieve::descriptor::InstanceDescriptor;
use crate::retrieve::dicom_output::write_dicom;
use crate::retrieve::error::RetrieveError;
use crate::retrieve::frames::{
	write_all_fragments, write_decompressed, CompressedFrames, DecompressedFrames, FrameSource,
	FramesOutput, NativeFrames,
};
use crate::retrieve::media_type::MediaType;
use crate::retrieve::metadata::write_metadata;
use crate::retrieve::negotiation::{select_media_type, select_transfer_syntax, AcceptableMediaTypes};
use crate::retrieve::object_type::ObjectType;
use crate::retrieve::transfer_syntax;
use crate::utils::multipart::{MultipartPayload, OutputPart, CONTENT_LOCATION};
use axum::http::StatusCode;
use dicom::dictionary_std::tags;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use tracing::{debug, info};

pub type ResponseBody = Box<dyn FnOnce(&mut dyn Write) -> Result<(), RetrieveError>>;

/// Status, content type and body writer of a retrieve response.
pub struct RetrieveResponse {
	pub status: StatusCode,
	pub content_type: MediaType,
	pub body: ResponseBody,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputStrategy {
	/// DICOM objects in a multipart/related body.
	Dicom,
	/// DICOM objects in one ZIP archive.
	Zip,
	/// Pixel data or encapsulated documents of whole instances.
	Bulkdata,
	/// Selected frames of one instance.
	BulkdataFrame,
	/// One element addressed by an attribute path.
	BulkdataPath,
	MetadataJson,
}

enum Negotiation {
	Accepted(MediaType),
	Rejected,
	/// The match has no representation for this strategy at all.
	Unavailable,
}

impl OutputStrategy {
	pub fn select(
		target: RetrieveTarget,
		accept: &AcceptableMediaTypes,
	) -> Result<Self, RetrieveError> {
		let multipart = accept.multipart_related();
		match target {
			RetrieveTarget::Study | RetrieveTarget::Series | RetrieveTarget::Instance => {
				if multipart.is_empty() && accept.zip_transfer_syntaxes().is_empty() {
					Err(RetrieveError::NotAcceptable("No acceptable media type"))
				} else if select_media_type(multipart, &[MediaType::application_dicom()]).is_some() {
					Ok(Self::Dicom)
				} else if !accept.zip_transfer_syntaxes().is_empty() {
					Ok(Self::Zip)
				} else {
					Ok(Self::Bulkdata)
				}
			}
			RetrieveTarget::Frame | RetrieveTarget::Bulkdata if multipart.is_empty() => {
				Err(RetrieveError::NotAcceptable("No acceptable media type"))
			}
			RetrieveTarget::Frame => Ok(Self::BulkdataFrame),
			RetrieveTarget::Bulkdata => Ok(Self::BulkdataPath),
			RetrieveTarget::StudyMetadata
			| RetrieveTarget::SeriesMetadata
			| RetrieveTarget::InstanceMetadata => metadata_media_type(accept)
				.map(|_| Self::MetadataJson)
				.ok_or(RetrieveError::NotAcceptable("No acceptable media type")),
		}
	}

	/// Filters the matches of the context and assembles the response.
	pub fn build_response(
		self,
		context: &mut RetrievalContext,
	) -> Result<RetrieveResponse, RetrieveError> {
		let first = context
			.matches
			.first()
			.ok_or(RetrieveError::NotFound("No matches found"))?;

		if context.frames().is_some() {
			if !first.is_image() {
				return Err(RetrieveError::NotFound("Not an image"));
			}
			let number_of_frames = first.number_of_frames();
			context.adjust_frame_list(number_of_frames)?;
		}

		let rejected = self.remove_not_accepted_matches(context);
		if context.matches.is_empty() {
			return Err(if rejected > 0 {
				RetrieveError::NotAcceptable("No acceptable media type")
			} else {
				RetrieveError::NotFound("No matches found")
			});
		}
		if rejected > 0 {
			info!(rejected, "Dropped matches without acceptable media type");
			context.partial_content = true;
		}

		let status = if context.partial_content {
			StatusCode::PARTIAL_CONTENT
		} else {
			StatusCode::OK
		};
		let (content_type, body) = match self {
			Self::Zip => self.zip_body(context),
			Self::MetadataJson => self.metadata_body(context)?,
			_ => self.multipart_body(context)?,
		};
		Ok(RetrieveResponse {
			status,
			content_type,
			body,
		})
	}

	/// Keeps the matches that have an acceptable representation and records the
	/// negotiated media type of each. Returns the number of rejected matches.
	fn remove_not_accepted_matches(self, context: &mut RetrievalContext) -> usize {
		let frame = u32::from(context.frames().is_some());
		let mut rejected = 0;
		for instance in std::mem::take(&mut context.matches) {
			match self.negotiate(context, &instance, frame) {
				Negotiation::Accepted(media_type) => {
					context
						.media_types
						.insert(instance.sop_instance_uid().to_owned(), media_type);
					context.matches.push(instance);
				}
				Negotiation::Rejected => {
					debug!(sop_instance_uid = instance.sop_instance_uid(), "No acceptable media type");
					rejected += 1;
				}
				Negotiation::Unavailable => {
					debug!(sop_instance_uid = instance.sop_instance_uid(), "No representation available");
				}
			}
		}
		rejected
	}

	fn negotiate(
		self,
		context: &RetrievalContext,
		instance: &InstanceDescriptor,
		frame: u32,
	) -> Negotiation {
		let accept = context.accept();
		let object_type = ObjectType::of(instance, frame);
		let media_types = match self {
			Self::Dicom => return dicom_negotiation(accept.transfer_syntaxes(), instance),
			Self::Zip => return dicom_negotiation(accept.zip_transfer_syntaxes(), instance),
			Self::MetadataJson => {
				return metadata_media_type(accept)
					.map_or(Negotiation::Rejected, Negotiation::Accepted);
			}
			Self::Bulkdata => object_type.bulkdata_media_types(instance),
			Self::BulkdataFrame if object_type.is_image() => object_type.bulkdata_media_types(instance),
			Self::BulkdataFrame => None,
			Self::BulkdataPath => match &context.request.path {
				Some(path) if path.is_encapsulated_document() => {
					object_type.bulkdata_media_types(instance)
				}
				_ => Some(vec![MediaType::application_octet_stream()]),
			},
		};
		let Some(media_types) = media_types else {
			return Negotiation::Unavailable;
		};
		select_media_type(accept.multipart_related(), &media_types)
			.map_or(Negotiation::Rejected, Negotiation::Accepted)
	}

	fn zip_body(self, context: &RetrievalContext) -> (MediaType, ResponseBody) {
		let instances = context.matches.clone();
		let transfer_syntaxes = context.accept().zip_transfer_syntaxes().to_vec();
		let format = context.options.zip_entry_names.clone();
		let spool_root = context.options.spool_directory.clone();
		let body: ResponseBody = Box::new(move |out| {
			write_zip(&instances, &transfer_syntaxes, &format, &spool_root, out)
		});
		(MediaType::application_zip(), body)
	}

	fn metadata_body(
		self,
		context: &RetrievalContext,
	) -> Result<(MediaType, ResponseBody), RetrieveError> {
		let media_type = metadata_media_type(context.accept())
			.ok_or(RetrieveError::NotAcceptable("No acceptable media type"))?;
		let instances: Vec<(InstanceDescriptor, String)> = context
			.matches
			.iter()
			.map(|instance| (instance.clone(), context.instance_url(instance)))
			.collect();
		let include_private = context.options.include_private;
		let body: ResponseBody = Box::new(move |out| {
			write_metadata(
				instances.iter().map(|(instance, url)| (instance, url.clone())),
				include_private,
				out,
			)
		});
		Ok((media_type, body))
	}

	fn multipart_body(
		self,
		context: &mut RetrievalContext,
	) -> Result<(MediaType, ResponseBody), RetrieveError> {
		let mut payload = MultipartPayload::default();
		for instance in context.matches.clone() {
			let media_type = context
				.media_types
				.get(instance.sop_instance_uid())
				.cloned()
				.ok_or(RetrieveError::Internal("match without negotiated media type"))?;
			match self {
				Self::Dicom => add_dicom_part(&mut payload, instance, media_type),
				Self::Bulkdata => add_bulkdata_parts(context, &mut payload, instance, media_type),
				Self::BulkdataFrame => add_frame_parts(context, &mut payload, instance, media_type)?,
				Self::BulkdataPath => {
					let path = context
						.request
						.path
						.clone()
						.ok_or(RetrieveError::Internal("bulkdata request without attribute path"))?;
					let location = context.request.request_url.clone();
					add_part(&mut payload, instance, media_type, path, location);
				}
				Self::Zip | Self::MetadataJson => {
					return Err(RetrieveError::Internal("not a multipart representation"));
				}
			}
		}
		let content_type = payload.content_type();
		let body: ResponseBody = Box::new(move |out| payload.write_to(out));
		Ok((content_type, body))
	}
}

fn metadata_media_type(accept: &AcceptableMediaTypes) -> Option<MediaType> {
	select_media_type(
		accept.acceptable(),
		&[MediaType::application_dicom_json(), MediaType::application_json()],
	)
}

/// DICOM objects are always acceptable unless they would have to be decompressed
/// without a decoder for their transfer syntax.
fn dicom_negotiation(transfer_syntaxes: &[String], instance: &InstanceDescriptor) -> Negotiation {
	let stored = instance.transfer_syntax_uid();
	let selected = select_transfer_syntax(transfer_syntaxes, stored);
	if selected != stored && !transfer_syntax::is_uncompressed(stored) && !codec::can_decode(instance) {
		return Negotiation::Rejected;
	}
	Negotiation::Accepted(MediaType::application_dicom().with_param("transfer-syntax", selected))
}

fn add_dicom_part(
	payload: &mut MultipartPayload<RetrieveError>,
	instance: InstanceDescriptor,
	media_type: MediaType,
) {
	let transfer_syntax = media_type
		.param("transfer-syntax")
		.unwrap_or(transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN)
		.to_owned();
	payload.add_part(OutputPart::new(media_type, move |out| {
		write_dicom(&instance, &transfer_syntax, out)
	}));
}

/// Adds a part holding the element at `path`.
fn add_part(
	payload: &mut MultipartPayload<RetrieveError>,
	instance: InstanceDescriptor,
	media_type: MediaType,
	path: AttributePath,
	location: String,
) {
	payload.add_part(
		OutputPart::new(media_type, move |out| {
			BulkDataExtractor::new(&path).write_to(&instance, out)
		})
		.with_header(CONTENT_LOCATION, location),
	);
}

fn add_bulkdata_parts(
	context: &mut RetrievalContext,
	payload: &mut MultipartPayload<RetrieveError>,
	instance: InstanceDescriptor,
	media_type: MediaType,
) {
	let location = context.instance_url(&instance);
	let object_type = ObjectType::of(&instance, 0);
	if object_type.is_encapsulated_document() {
		let path = AttributePath::of(tags::ENCAPSULATED_DOCUMENT);
		add_part(payload, instance, media_type, path, location);
	} else if transfer_syntax::is_uncompressed(instance.transfer_syntax_uid()) {
		let path = AttributePath::of(tags::PIXEL_DATA);
		add_part(payload, instance, media_type, path, location);
	} else if media_type.has_essence(&MediaType::application_octet_stream()) {
		payload.add_part(
			OutputPart::new(media_type, move |out| write_decompressed(&instance, out))
				.with_header(CONTENT_LOCATION, location),
		);
	} else if object_type == ObjectType::CompressedMultiFrameImage {
		let frames: Vec<u32> = (1..=instance.number_of_frames()).collect();
		let source = CompressedFrames::new(instance.clone());
		add_frames(context, payload, &instance, &media_type, source, frames);
	} else {
		payload.add_part(
			OutputPart::new(media_type, move |out| write_all_fragments(&instance, out))
				.with_header(CONTENT_LOCATION, location),
		);
	}
}

fn add_frame_parts(
	context: &mut RetrievalContext,
	payload: &mut MultipartPayload<RetrieveError>,
	instance: InstanceDescriptor,
	media_type: MediaType,
) -> Result<(), RetrieveError> {
	let frames = context
		.frames()
		.map(|frames| frames.frames().to_vec())
		.ok_or(RetrieveError::Internal("frame request without frame list"))?;
	let uncompressed = transfer_syntax::is_uncompressed(instance.transfer_syntax_uid());
	let decompress = media_type.has_essence(&MediaType::application_octet_stream());

	if instance.is_multiframe() {
		if uncompressed {
			let source = NativeFrames::new(instance.clone());
			add_frames(context, payload, &instance, &media_type, source, frames);
		} else if decompress {
			let source = DecompressedFrames::new(instance.clone());
			add_frames(context, payload, &instance, &media_type, source, frames);
		} else {
			let source = CompressedFrames::new(instance.clone());
			add_frames(context, payload, &instance, &media_type, source, frames);
		}
		return Ok(());
	}

	// Clamping leaves only frame 1 of a single-frame instance.
	for frame in frames {
		let location = context.frame_url(&instance, frame);
		let instance = instance.clone();
		if uncompressed {
			let path = AttributePath::of(tags::PIXEL_DATA);
			add_part(payload, instance, media_type.clone(), path, location);
		} else if decompress {
			payload.add_part(
				OutputPart::new(media_type.clone(), move |out| write_decompressed(&instance, out))
					.with_header(CONTENT_LOCATION, location),
			);
		} else {
			payload.add_part(
				OutputPart::new(media_type.clone(), move |out| write_all_fragments(&instance, out))
					.with_header(CONTENT_LOCATION, location),
			);
		}
	}
	Ok(())
}

/// Adds one part per frame list entry, all served by one [`FramesOutput`].
fn add_frames<S: FrameSource + 'static>(
	context: &mut RetrievalContext,
	payload: &mut MultipartPayload<RetrieveError>,
	instance: &InstanceDescriptor,
	media_type: &MediaType,
	source: S,
	frames: Vec<u32>,
) {
	let output = Rc::new(RefCell::new(FramesOutput::new(
		source,
		frames.clone(),
		context.resources.spool(),
	)));
	context.resources.register(output.clone());
	for frame in frames {
		let output = Rc::clone(&output);
		payload.add_part(
			OutputPart::new(media_type.clone(), move |out| {
				output.borrow_mut().write_next(out)
			})
			.with_header(CONTENT_LOCATION, context.frame_url(instance, frame)),
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::retrieve::context::{FrameSelection, RetrieveRequest};
	use crate::retrieve::testing::{
		image_attributes, retrieve_options, retrieve_request, uncompressed_image, MemorySource,
	};
	use crate::retrieve::transfer_syntax::{EXPLICIT_VR_LITTLE_ENDIAN, JPEG_2000, JPEG_EXTENDED_12BIT};
	use std::sync::Arc;

	const INSTANCE_URL: &str = "http://host/studies/1.2.3/series/1.2.3.4/instances/1.1";

	struct Outcome {
		status: StatusCode,
		content_type: MediaType,
		body: Vec<u8>,
		spool_created: bool,
	}

	fn run(
		request: RetrieveRequest,
		matches: Vec<InstanceDescriptor>,
	) -> Result<Outcome, RetrieveError> {
		let spool = tempfile::tempdir().unwrap();
		let strategy = OutputStrategy::select(request.target, &request.accept)?;
		let mut context = RetrievalContext::new(request, retrieve_options(spool.path().to_path_buf()));
		context.matches = matches;
		let response = strategy.build_response(&mut context)?;
		let mut body = Vec::new();
		(response.body)(&mut body)?;
		let spool_created = context.resources.spool_created();
		Ok(Outcome {
			status: response.status,
			content_type: response.content_type,
			body,
			spool_created,
		})
	}

	fn part_count(outcome: &Outcome) -> usize {
		let boundary = outcome.content_type.param("boundary").unwrap();
		let delimiter = format!("--{boundary}\r\n");
		outcome
			.body
			.windows(delimiter.len())
			.filter(|window| *window == delimiter.as_bytes())
			.count()
	}

	fn jpeg_2000_image(sop_instance_uid: &str) -> InstanceDescriptor {
		InstanceDescriptor::new(
			image_attributes("1.2.840.10008.5.1.4.1.1.7", sop_instance_uid, 2, 2, 1, 8, 1),
			JPEG_2000,
			Arc::new(MemorySource(Arc::new(Vec::new()))),
		)
	}

	#[test]
	fn instance_as_dicom_is_a_single_part() {
		let (instance, file) = uncompressed_image("1.1", 2, 2, 1);
		let request = retrieve_request(RetrieveTarget::Instance, INSTANCE_URL, &["application/dicom"]);
		let outcome = run(request, vec![instance]).unwrap();
		assert_eq!(outcome.status, StatusCode::OK);
		assert_eq!(outcome.content_type.essence(), "multipart/related");
		assert_eq!(outcome.content_type.param("type"), Some("application/dicom"));
		assert_eq!(
			outcome.content_type.param("transfer-syntax"),
			Some(EXPLICIT_VR_LITTLE_ENDIAN)
		);
		assert_eq!(part_count(&outcome), 1);
		assert!(outcome.body.windows(file.len()).any(|window| window == file.as_slice()));
		assert!(outcome.body.ends_with(b"--"));
	}

	#[test]
	fn partially_acceptable_matches_are_partial_content() {
		let (image, _) = uncompressed_image("1.1", 2, 2, 1);
		let request = retrieve_request(
			RetrieveTarget::Series,
			"http://host/studies/1.2.3/series/1.2.3.4",
			&[r#"multipart/related; type="application/octet-stream""#],
		);
		let outcome = run(request, vec![image, jpeg_2000_image("1.2")]).unwrap();
		assert_eq!(outcome.status, StatusCode::PARTIAL_CONTENT);
		assert_eq!(part_count(&outcome), 1);
		assert_eq!(outcome.content_type.param("type"), Some("application/octet-stream"));
	}

	#[test]
	fn nothing_acceptable_is_not_acceptable() {
		let request = retrieve_request(
			RetrieveTarget::Series,
			"http://host/studies/1.2.3/series/1.2.3.4",
			&[r#"multipart/related; type="application/octet-stream""#],
		);
		let result = run(request, vec![jpeg_2000_image("1.2")]);
		assert!(matches!(result, Err(RetrieveError::NotAcceptable(_))));
	}

	#[test]
	fn no_matches_is_not_found() {
		let request = retrieve_request(RetrieveTarget::Study, "http://host/studies/1.2.3", &[]);
		assert!(matches!(run(request, Vec::new()), Err(RetrieveError::NotFound(_))));
	}

	#[test]
	fn objects_without_bulkdata_are_dropped_silently() {
		let mut attributes = dicom::object::InMemDicomObject::new_empty();
		attributes.put_str(tags::SOP_CLASS_UID, dicom::core::VR::UI, "1.2.840.10008.5.1.4.1.1.88.11");
		let report = InstanceDescriptor::new(
			attributes,
			EXPLICIT_VR_LITTLE_ENDIAN,
			Arc::new(MemorySource(Arc::new(Vec::new()))),
		);
		let request = retrieve_request(
			RetrieveTarget::Instance,
			INSTANCE_URL,
			&[r#"multipart/related; type="application/octet-stream""#],
		);
		assert!(matches!(run(request, vec![report]), Err(RetrieveError::NotFound(_))));
	}

	#[test]
	fn frames_beyond_the_instance_are_invalid() {
		let (instance, _) = uncompressed_image("1.1", 2, 2, 3);
		let mut request = retrieve_request(RetrieveTarget::Frame, INSTANCE_URL, &[]);
		request.frames = Some(FrameSelection::new(vec![5]));
		assert!(matches!(
			run(request, vec![instance]),
			Err(RetrieveError::InvalidFrameNumber)
		));
	}

	#[test]
	fn single_frame_is_streamed_without_spool() {
		let (instance, _) = uncompressed_image("1.1", 2, 2, 1);
		let mut request = retrieve_request(RetrieveTarget::Frame, INSTANCE_URL, &[]);
		request.frames = Some(FrameSelection::new(vec![1]));
		let outcome = run(request, vec![instance]).unwrap();
		assert_eq!(outcome.status, StatusCode::OK);
		assert_eq!(part_count(&outcome), 1);
		assert!(!outcome.spool_created);
		let body = String::from_utf8_lossy(&outcome.body);
		assert!(body.contains(&format!("Content-Location: {INSTANCE_URL}/frames/1\r\n")));
	}

	#[test]
	fn out_of_order_frames_are_spooled() {
		let (instance, _) = uncompressed_image("1.1", 1, 2, 3);
		let mut request = retrieve_request(RetrieveTarget::Frame, INSTANCE_URL, &[]);
		request.frames = Some(FrameSelection::new(vec![3, 1, 7]));
		let outcome = run(request, vec![instance]).unwrap();
		assert_eq!(outcome.status, StatusCode::PARTIAL_CONTENT);
		assert_eq!(part_count(&outcome), 2);
		assert!(outcome.spool_created);
		let body = String::from_utf8_lossy(&outcome.body);
		let third = body.find("/frames/3\r\n\r\n\u{3}\u{3}\r\n").unwrap();
		let first = body.find("/frames/1\r\n\r\n\u{1}\u{1}\r\n").unwrap();
		assert!(third < first);
	}

	#[test]
	fn zip_is_selected_when_dicom_is_not_acceptable() {
		let (instance, _) = uncompressed_image("1.1", 1, 1, 1);
		let request = retrieve_request(RetrieveTarget::Study, "http://host/studies/1.2.3", &["application/zip"]);
		let outcome = run(request, vec![instance]).unwrap();
		assert_eq!(outcome.content_type, MediaType::application_zip());
		assert!(outcome.body.starts_with(b"PK"));
	}

	#[test]
	fn metadata_is_a_json_array() {
		let (instance, _) = uncompressed_image("1.1", 1, 1, 1);
		let request = retrieve_request(
			RetrieveTarget::StudyMetadata,
			"http://host/studies/1.2.3/metadata",
			&["application/dicom+json"],
		);
		let outcome = run(request, vec![instance]).unwrap();
		assert_eq!(outcome.content_type, MediaType::application_dicom_json());
		let json: serde_json::Value = serde_json::from_slice(&outcome.body).unwrap();
		assert_eq!(json[0]["7FE00010"]["BulkDataURI"], INSTANCE_URL);
	}

	#[test]
	fn metadata_requires_a_json_type() {
		let accept = AcceptableMediaTypes::new(&[String::from("application/dicom")], &[]).unwrap();
		assert!(matches!(
			OutputStrategy::select(RetrieveTarget::InstanceMetadata, &accept),
			Err(RetrieveError::NotAcceptable(_))
		));
	}

	#[test]
	fn wildcard_selects_dicom() {
		let accept = AcceptableMediaTypes::new(&[], &[]).unwrap();
		assert_eq!(
			OutputStrategy::select(RetrieveTarget::Study, &accept).unwrap(),
			OutputStrategy::Dicom
		);
		assert_eq!(
			OutputStrategy::select(RetrieveTarget::Frame, &accept).unwrap(),
			OutputStrategy::BulkdataFrame
		);
	}

	#[test]
	fn requested_boundary_is_not_used() {
		let (instance, _) = uncompressed_image("1.1", 2, 2, 1);
		let request = retrieve_request(
			RetrieveTarget::Instance,
			INSTANCE_URL,
			&[r#"multipart/related; type="application/dicom"; boundary=DICM"#],
		);
		let outcome = run(request, vec![instance]).unwrap();
		let boundary = outcome.content_type.param("boundary").unwrap();
		assert_ne!(boundary, "DICM");
		assert_eq!(part_count(&outcome), 1);
	}

	#[test]
	fn twelve_bit_jpeg_frames_are_not_offered_decompressed() {
		let instance = InstanceDescriptor::new(
			image_attributes("1.2.840.10008.5.1.4.1.1.7", "1.1", 2, 2, 1, 16, 1),
			JPEG_EXTENDED_12BIT,
			Arc::new(MemorySource(Arc::new(Vec::new()))),
		);
		let mut request = retrieve_request(
			RetrieveTarget::Frame,
			INSTANCE_URL,
			&[r#"multipart/related; type="application/octet-stream""#],
		);
		request.frames = Some(FrameSelection::new(vec![1]));
		assert!(matches!(
			run(request, vec![instance]),
			Err(RetrieveError::NotAcceptable(_))
		));
	}
}
