//! `application/dicom` representation of a stored instance.

use crate::retrieve::descriptor::InstanceDescriptor;
use crate::retrieve::error::RetrieveError;
use crate::retrieve::frames::write_decompressed;
use crate::retrieve::transfer_syntax::{self, EXPLICIT_VR_LITTLE_ENDIAN};
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::file::ReadPreamble;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject, OpenFileOptions};
use std::io::{self, Write};
use tracing::debug;

/// Writes the instance as a Part 10 file in `transfer_syntax_uid`.
///
/// The stored bytes are copied unchanged if they already use that transfer syntax.
/// Anything else is re-encoded as Explicit VR Little Endian.
pub fn write_dicom(
	instance: &InstanceDescriptor,
	transfer_syntax_uid: &str,
	out: &mut dyn Write,
) -> Result<(), RetrieveError> {
	if transfer_syntax_uid == instance.transfer_syntax_uid() {
		let mut source = instance.source().open()?;
		io::copy(&mut source, out)?;
		return Ok(());
	}

	debug!(
		sop_instance_uid = instance.sop_instance_uid(),
		from = instance.transfer_syntax_uid(),
		to = EXPLICIT_VR_LITTLE_ENDIAN,
		"Transcoding instance"
	);
	let mut dataset = read_dataset(instance, None)?;

	let stored = instance.transfer_syntax_uid();
	if !transfer_syntax::is_uncompressed(stored) && dataset.get(tags::PIXEL_DATA).is_some() {
		let mut pixels = Vec::new();
		write_decompressed(instance, &mut pixels)?;
		if pixels.len() % 2 == 1 {
			pixels.push(0);
		}
		let vr = if instance.bits_allocated() > 8 {
			VR::OW
		} else {
			VR::OB
		};
		dataset.put(DataElement::new(
			tags::PIXEL_DATA,
			vr,
			PrimitiveValue::from(pixels),
		));
		if transfer_syntax::is_jpeg_family(stored)
			&& instance.photometric_interpretation().starts_with("YBR")
		{
			dataset.put_str(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "RGB");
		}
	}

	let meta = FileMetaTableBuilder::new()
		.media_storage_sop_class_uid(instance.sop_class_uid())
		.media_storage_sop_instance_uid(instance.sop_instance_uid())
		.transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
		.implementation_class_uid(crate::IMPLEMENTATION_CLASS_UID)
		.implementation_version_name(crate::IMPLEMENTATION_VERSION_NAME)
		.build()
		.map_err(|err| RetrieveError::Encode(err.to_string()))?;
	dataset
		.with_exact_meta(meta)
		.write_all(out)
		.map_err(|err| RetrieveError::Encode(err.to_string()))
}

/// Parses the dataset of the stored instance, up to but excluding `read_until` if given.
pub fn read_dataset(
	instance: &InstanceDescriptor,
	read_until: Option<Tag>,
) -> Result<InMemDicomObject, RetrieveError> {
	let options = OpenFileOptions::new().read_preamble(ReadPreamble::Always);
	let options = match read_until {
		Some(tag) => options.read_until(tag),
		None => options,
	};
	let object = options
		.from_reader(instance.source().open()?)
		.map_err(|err| RetrieveError::Decode(err.to_string()))?;
	Ok(object.into_inner())
}
