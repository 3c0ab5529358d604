//! In-memory Part 10 fixtures for unit tests.

use crate::retrieve::context::{RetrieveOptions, RetrieveRequest, RetrieveTarget};
use crate::retrieve::descriptor::{InstanceDescriptor, ObjectSource};
use crate::retrieve::negotiation::AcceptableMediaTypes;
use crate::retrieve::transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN;
use dicom::core::{PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

enum Element {
	Value {
		tag: Tag,
		vr: VR,
		value: Vec<u8>,
	},
	Sequence {
		tag: Tag,
		items: Vec<Part10Builder>,
		undefined: bool,
	},
	Encapsulated {
		tag: Tag,
		offsets: Vec<u32>,
		fragments: Vec<Vec<u8>>,
	},
}

impl Element {
	const fn tag(&self) -> Tag {
		match self {
			Self::Value { tag, .. } | Self::Sequence { tag, .. } | Self::Encapsulated { tag, .. } => {
				*tag
			}
		}
	}
}

/// Builds the byte encoding of a DICOM file (or of a sequence item).
pub struct Part10Builder {
	transfer_syntax: String,
	elements: Vec<Element>,
}

impl Part10Builder {
	pub fn new(transfer_syntax: &str) -> Self {
		Self {
			transfer_syntax: transfer_syntax.to_owned(),
			elements: Vec::new(),
		}
	}

	/// Content of a sequence item. The encoding follows the enclosing file.
	pub fn item() -> Self {
		Self::new("")
	}

	pub fn string(mut self, tag: Tag, vr: VR, value: &str) -> Self {
		let mut value = value.as_bytes().to_vec();
		if value.len() % 2 == 1 {
			value.push(if vr == VR::UI { 0 } else { b' ' });
		}
		self.elements.push(Element::Value { tag, vr, value });
		self
	}

	pub fn u16(mut self, tag: Tag, value: u16) -> Self {
		self.elements.push(Element::Value {
			tag,
			vr: VR::US,
			value: value.to_le_bytes().to_vec(),
		});
		self
	}

	pub fn bytes(mut self, tag: Tag, vr: VR, value: &[u8]) -> Self {
		let mut value = value.to_vec();
		if value.len() % 2 == 1 {
			value.push(0);
		}
		self.elements.push(Element::Value { tag, vr, value });
		self
	}

	pub fn sequence(mut self, tag: Tag, items: Vec<Self>) -> Self {
		self.elements.push(Element::Sequence {
			tag,
			items,
			undefined: false,
		});
		self
	}

	pub fn sequence_undefined(mut self, tag: Tag, items: Vec<Self>) -> Self {
		self.elements.push(Element::Sequence {
			tag,
			items,
			undefined: true,
		});
		self
	}

	pub fn encapsulated(mut self, offsets: &[u32], fragments: Vec<Vec<u8>>) -> Self {
		self.elements.push(Element::Encapsulated {
			tag: tags::PIXEL_DATA,
			offsets: offsets.to_vec(),
			fragments,
		});
		self
	}

	pub fn build(&self) -> Vec<u8> {
		let mut meta = Vec::new();
		write_explicit(&mut meta, Tag(0x0002, 0x0001), VR::OB, &[0, 1]);
		let sop_class_uid = self.value_of(tags::SOP_CLASS_UID).unwrap_or("1.2.840.10008.5.1.4.1.1.7");
		write_explicit(&mut meta, Tag(0x0002, 0x0002), VR::UI, &uid_bytes(sop_class_uid));
		let sop_instance_uid = self.value_of(tags::SOP_INSTANCE_UID).unwrap_or("1.2.3.4.5");
		write_explicit(&mut meta, Tag(0x0002, 0x0003), VR::UI, &uid_bytes(sop_instance_uid));
		write_explicit(&mut meta, Tag(0x0002, 0x0010), VR::UI, &uid_bytes(&self.transfer_syntax));
		write_explicit(&mut meta, Tag(0x0002, 0x0012), VR::UI, &uid_bytes("1.2.3.99"));

		let mut file = vec![0u8; 128];
		file.extend_from_slice(b"DICM");
		let length = u32::try_from(meta.len()).unwrap().to_le_bytes();
		write_explicit(&mut file, Tag(0x0002, 0x0000), VR::UL, &length);
		file.extend_from_slice(&meta);
		file.extend_from_slice(&self.encode(self.transfer_syntax != IMPLICIT_VR_LITTLE_ENDIAN));
		file
	}

	fn value_of(&self, wanted: Tag) -> Option<&str> {
		self.elements.iter().find_map(|element| match element {
			Element::Value { tag, value, .. } if *tag == wanted => std::str::from_utf8(value)
				.ok()
				.map(|value| value.trim_end_matches(['\0', ' '])),
			_ => None,
		})
	}

	fn encode(&self, explicit: bool) -> Vec<u8> {
		let mut elements: Vec<&Element> = self.elements.iter().collect();
		elements.sort_by_key(|element| {
			let tag = element.tag();
			(tag.0, tag.1)
		});

		let mut out = Vec::new();
		for element in elements {
			match element {
				Element::Value { tag, vr, value } => {
					if explicit {
						write_explicit(&mut out, *tag, *vr, value);
					} else {
						write_header(&mut out, *tag, u32::try_from(value.len()).unwrap());
						out.extend_from_slice(value);
					}
				}
				Element::Sequence {
					tag,
					items,
					undefined,
				} => {
					let mut content = Vec::new();
					for item in items {
						let encoded = item.encode(explicit);
						if *undefined {
							write_header(&mut content, Tag(0xFFFE, 0xE000), u32::MAX);
							content.extend_from_slice(&encoded);
							write_header(&mut content, Tag(0xFFFE, 0xE00D), 0);
						} else {
							write_header(
								&mut content,
								Tag(0xFFFE, 0xE000),
								u32::try_from(encoded.len()).unwrap(),
							);
							content.extend_from_slice(&encoded);
						}
					}
					let length = if *undefined {
						write_header(&mut content, Tag(0xFFFE, 0xE0DD), 0);
						u32::MAX
					} else {
						u32::try_from(content.len()).unwrap()
					};
					write_long_header(&mut out, *tag, VR::SQ, length, explicit);
					out.extend_from_slice(&content);
				}
				Element::Encapsulated {
					tag,
					offsets,
					fragments,
				} => {
					write_long_header(&mut out, *tag, VR::OB, u32::MAX, explicit);
					let table: Vec<u8> = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
					write_header(&mut out, Tag(0xFFFE, 0xE000), u32::try_from(table.len()).unwrap());
					out.extend_from_slice(&table);
					for fragment in fragments {
						write_header(
							&mut out,
							Tag(0xFFFE, 0xE000),
							u32::try_from(fragment.len()).unwrap(),
						);
						out.extend_from_slice(fragment);
					}
					write_header(&mut out, Tag(0xFFFE, 0xE0DD), 0);
				}
			}
		}
		out
	}
}

fn uid_bytes(uid: &str) -> Vec<u8> {
	let mut bytes = uid.as_bytes().to_vec();
	if bytes.len() % 2 == 1 {
		bytes.push(0);
	}
	bytes
}

fn write_tag(out: &mut Vec<u8>, tag: Tag) {
	out.extend_from_slice(&tag.0.to_le_bytes());
	out.extend_from_slice(&tag.1.to_le_bytes());
}

fn write_header(out: &mut Vec<u8>, tag: Tag, length: u32) {
	write_tag(out, tag);
	out.extend_from_slice(&length.to_le_bytes());
}

fn write_long_header(out: &mut Vec<u8>, tag: Tag, vr: VR, length: u32, explicit: bool) {
	if explicit {
		write_tag(out, tag);
		out.extend_from_slice(vr.to_string().as_bytes());
		out.extend_from_slice(&[0, 0]);
		out.extend_from_slice(&length.to_le_bytes());
	} else {
		write_header(out, tag, length);
	}
}

fn write_explicit(out: &mut Vec<u8>, tag: Tag, vr: VR, value: &[u8]) {
	let length = u32::try_from(value.len()).unwrap();
	match vr {
		VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::SQ | VR::SV | VR::UC
		| VR::UN | VR::UR | VR::UT | VR::UV => write_long_header(out, tag, vr, length, true),
		_ => {
			write_tag(out, tag);
			out.extend_from_slice(vr.to_string().as_bytes());
			out.extend_from_slice(&u16::try_from(length).unwrap().to_le_bytes());
		}
	}
	out.extend_from_slice(value);
}

/// Writes `dataset` as a Part 10 file with the dataset encoder of `transfer_syntax`.
pub fn encode_file(dataset: InMemDicomObject, transfer_syntax: &str) -> Vec<u8> {
	let meta = FileMetaTableBuilder::new()
		.media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
		.media_storage_sop_instance_uid("1.2.3.4.5")
		.transfer_syntax(transfer_syntax)
		.implementation_class_uid("1.2.3.99")
		.build()
		.unwrap();
	let mut file = Vec::new();
	dataset.with_exact_meta(meta).write_all(&mut file).unwrap();
	file
}

/// Encodes RLE Lossless segments using literal runs only.
pub fn rle_encode(segments: &[Vec<u8>]) -> Vec<u8> {
	const HEADER_LENGTH: usize = 64;
	let mut body = Vec::new();
	let mut offsets = Vec::new();
	for segment in segments {
		offsets.push(u32::try_from(HEADER_LENGTH + body.len()).unwrap());
		for chunk in segment.chunks(128) {
			body.push(u8::try_from(chunk.len() - 1).unwrap());
			body.extend_from_slice(chunk);
		}
		if body.len() % 2 == 1 {
			body.push(0x80);
		}
	}
	let mut header = vec![0u8; HEADER_LENGTH];
	header[..4].copy_from_slice(&u32::try_from(segments.len()).unwrap().to_le_bytes());
	for (i, offset) in offsets.iter().enumerate() {
		header[4 + i * 4..8 + i * 4].copy_from_slice(&offset.to_le_bytes());
	}
	header.extend_from_slice(&body);
	header
}

/// Serves a fixed byte buffer.
pub struct MemorySource(pub Arc<Vec<u8>>);

impl ObjectSource for MemorySource {
	fn open(&self) -> io::Result<Box<dyn Read + Send>> {
		Ok(Box::new(Cursor::new(self.0.as_ref().clone())))
	}

	fn describe(&self) -> String {
		String::from("memory")
	}
}

/// Attributes of an image instance as the catalog would index them.
pub fn image_attributes(
	sop_class_uid: &str,
	sop_instance_uid: &str,
	rows: u16,
	columns: u16,
	frames: u32,
	bits_allocated: u16,
	samples_per_pixel: u16,
) -> InMemDicomObject {
	let mut attributes = InMemDicomObject::new_empty();
	attributes.put_str(tags::SOP_CLASS_UID, VR::UI, sop_class_uid);
	attributes.put_str(tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid);
	attributes.put_str(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3");
	attributes.put_str(tags::SERIES_INSTANCE_UID, VR::UI, "1.2.3.4");
	attributes.put_str(tags::NUMBER_OF_FRAMES, VR::IS, frames.to_string());
	attributes.put(dicom::core::DataElement::new(
		tags::ROWS,
		VR::US,
		PrimitiveValue::from(rows),
	));
	attributes.put(dicom::core::DataElement::new(
		tags::COLUMNS,
		VR::US,
		PrimitiveValue::from(columns),
	));
	attributes.put(dicom::core::DataElement::new(
		tags::BITS_ALLOCATED,
		VR::US,
		PrimitiveValue::from(bits_allocated),
	));
	attributes.put(dicom::core::DataElement::new(
		tags::SAMPLES_PER_PIXEL,
		VR::US,
		PrimitiveValue::from(samples_per_pixel),
	));
	attributes
}

/// Native image file whose frame `n` (1-based) is filled with the byte value `n`.
pub fn uncompressed_image(
	sop_instance_uid: &str,
	rows: u16,
	columns: u16,
	frames: u32,
) -> (InstanceDescriptor, Vec<u8>) {
	let frame_length = usize::from(rows) * usize::from(columns);
	let pixels: Vec<u8> = (1..=frames)
		.flat_map(|frame| std::iter::repeat_n(u8::try_from(frame).unwrap(), frame_length))
		.collect();
	let file = Part10Builder::new(crate::retrieve::transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN)
		.string(tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid)
		.u16(tags::ROWS, rows)
		.u16(tags::COLUMNS, columns)
		.bytes(tags::PIXEL_DATA, VR::OB, &pixels)
		.build();
	let attributes = image_attributes(
		"1.2.840.10008.5.1.4.1.1.7",
		sop_instance_uid,
		rows,
		columns,
		frames,
		8,
		1,
	);
	let descriptor = InstanceDescriptor::new(
		attributes,
		crate::retrieve::transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN,
		Arc::new(MemorySource(Arc::new(file.clone()))),
	);
	(descriptor, file)
}

pub fn retrieve_request(target: RetrieveTarget, url: &str, accept: &[&str]) -> RetrieveRequest {
	let accept: Vec<String> = accept.iter().map(ToString::to_string).collect();
	RetrieveRequest {
		target,
		study_instance_uid: String::from("1.2.3"),
		series_instance_uid: None,
		sop_instance_uid: None,
		frames: None,
		path: None,
		request_url: url.to_owned(),
		accept: AcceptableMediaTypes::new(&accept, &[]).unwrap(),
	}
}

pub fn retrieve_options(spool_directory: PathBuf) -> RetrieveOptions {
	RetrieveOptions {
		include_private: true,
		zip_entry_names: "DICOM/{0020000D,hash}/{0020000E,hash}/{00080018,hash}.dcm"
			.parse()
			.unwrap(),
		spool_directory,
		chunk_size: 8192,
	}
}
