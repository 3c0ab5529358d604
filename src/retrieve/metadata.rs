//! `application/dicom+json` metadata of matched instances.

use crate::retrieve::context::AttributePath;
use crate::retrieve::descriptor::InstanceDescriptor;
use crate::retrieve::dicom_output::read_dataset;
use crate::retrieve::error::RetrieveError;
use dicom::core::value::Value as DicomValue;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use dicom_json::DicomJson;
use serde_json::{Map, Value};
use std::io::Write;

const fn is_binary(vr: VR) -> bool {
	matches!(
		vr,
		VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN
	)
}

/// Drops the values of binary elements and, unless `include_private` is set,
/// private elements.
fn strip(object: &mut InMemDicomObject, include_private: bool) {
	let tags: Vec<Tag> = object.tags().collect();
	for tag in tags {
		if !include_private && tag.group() % 2 == 1 {
			object.remove_element(tag);
			continue;
		}
		let Some(vr) = object.get(tag).map(|element| element.vr()) else {
			continue;
		};
		match vr {
			vr if is_binary(vr) => {
				object.put(DataElement::new(tag, vr, PrimitiveValue::Empty));
			}
			VR::SQ => {
				object.update_value(tag, |value| {
					if let DicomValue::Sequence(sequence) = value {
						for item in sequence.items_mut() {
							strip(item, include_private);
						}
					}
				});
			}
			_ => (),
		}
	}
}

/// Replaces every binary value with a `BulkDataURI` under `instance_url`.
fn insert_bulkdata_uris(
	object: &mut Map<String, Value>,
	parent: &AttributePath,
	index: u32,
	instance_url: &str,
) {
	for (key, element) in object.iter_mut() {
		let Ok(tag) = u32::from_str_radix(key, 16) else {
			continue;
		};
		#[allow(clippy::cast_possible_truncation)]
		let path = parent.child(index, Tag((tag >> 16) as u16, tag as u16));
		let Some(element) = element.as_object_mut() else {
			continue;
		};
		match element.get("vr").and_then(Value::as_str) {
			Some("SQ") => {
				if let Some(Value::Array(items)) = element.get_mut("Value") {
					for (i, item) in (0u32..).zip(items.iter_mut()) {
						if let Some(item) = item.as_object_mut() {
							insert_bulkdata_uris(item, &path, i, instance_url);
						}
					}
				}
			}
			Some("OB" | "OD" | "OF" | "OL" | "OV" | "OW" | "UN") => {
				element.remove("InlineBinary");
				element.remove("Value");
				let uri = if path == AttributePath::of(tags::PIXEL_DATA) {
					instance_url.to_owned()
				} else {
					format!("{instance_url}{}", path.relative_uri())
				};
				element.insert(String::from("BulkDataURI"), Value::String(uri));
			}
			_ => (),
		}
	}
}

/// Metadata of one instance as a DICOM JSON object.
pub fn instance_metadata(
	instance: &InstanceDescriptor,
	instance_url: &str,
	include_private: bool,
) -> Result<Value, RetrieveError> {
	let mut dataset = read_dataset(instance, Some(tags::PIXEL_DATA))?;
	strip(&mut dataset, include_private);
	let mut json = serde_json::to_value(DicomJson::from(dataset))
		.map_err(|err| RetrieveError::Encode(err.to_string()))?;
	if let Some(object) = json.as_object_mut() {
		insert_bulkdata_uris(object, &AttributePath::root(), 0, instance_url);
		// Pixel data is never parsed, only linked.
		if instance.is_image() {
			let vr = if instance.bits_allocated() > 8 { "OW" } else { "OB" };
			object.insert(
				String::from("7FE00010"),
				serde_json::json!({ "vr": vr, "BulkDataURI": instance_url }),
			);
		}
	}
	Ok(json)
}

/// Writes the metadata of all instances as one JSON array.
pub fn write_metadata<'a>(
	instances: impl Iterator<Item = (&'a InstanceDescriptor, String)>,
	include_private: bool,
	out: &mut dyn Write,
) -> Result<(), RetrieveError> {
	out.write_all(b"[")?;
	for (i, (instance, instance_url)) in instances.enumerate() {
		if i > 0 {
			out.write_all(b",")?;
		}
		let json = instance_metadata(instance, &instance_url, include_private)?;
		serde_json::to_writer(&mut *out, &json)
			.map_err(|err| RetrieveError::Encode(err.to_string()))?;
	}
	out.write_all(b"]")?;
	Ok(())
}
