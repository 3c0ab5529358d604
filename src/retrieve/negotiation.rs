//! Content negotiation over the caller's Accept preferences.

use crate::retrieve::media_type::{parse_accept_list, MediaType, ParseMediaTypeError};
use crate::retrieve::transfer_syntax::{self, EXPLICIT_VR_LITTLE_ENDIAN};
use std::str::FromStr;

/// Any transfer syntax is acceptable.
pub const ANY_TRANSFER_SYNTAX: &str = "*";

/// The caller's Accept preferences and the views derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptableMediaTypes {
	acceptable: Vec<MediaType>,
	multipart_related: Vec<MediaType>,
	transfer_syntaxes: Vec<String>,
	zip_transfer_syntaxes: Vec<String>,
}

impl AcceptableMediaTypes {
	/// `accept_params` (the `accept` query parameters) replace the Accept headers when
	/// present. Without either, everything is acceptable.
	pub fn new(
		accept_headers: &[String],
		accept_params: &[String],
	) -> Result<Self, ParseMediaTypeError> {
		let values = if accept_params.is_empty() {
			accept_headers
		} else {
			accept_params
		};
		let mut acceptable = parse_accept_list(values)?;
		if acceptable.is_empty() {
			acceptable.push(MediaType::any());
		}
		Self::from_media_types(acceptable)
	}

	pub fn from_media_types(acceptable: Vec<MediaType>) -> Result<Self, ParseMediaTypeError> {
		let multipart = MediaType::multipart_related();
		let mut multipart_related = Vec::new();
		for media_type in &acceptable {
			if media_type.is_compatible_with(&multipart) {
				multipart_related.push(part_type_of(media_type)?);
			} else if media_type.type_() != "multipart" {
				multipart_related.push(media_type.clone());
			}
		}

		let dicom = MediaType::application_dicom();
		let transfer_syntaxes =
			transfer_syntaxes_of(multipart_related.iter().filter(|m| m.is_compatible_with(&dicom)));

		let zip = MediaType::application_zip();
		let zip_transfer_syntaxes =
			transfer_syntaxes_of(acceptable.iter().filter(|m| m.is_compatible_with(&zip)));

		Ok(Self {
			acceptable,
			multipart_related,
			transfer_syntaxes,
			zip_transfer_syntaxes,
		})
	}

	pub fn acceptable(&self) -> &[MediaType] {
		&self.acceptable
	}

	/// Acceptable types of the parts of a multipart/related response.
	pub fn multipart_related(&self) -> &[MediaType] {
		&self.multipart_related
	}

	pub fn transfer_syntaxes(&self) -> &[String] {
		&self.transfer_syntaxes
	}

	pub fn zip_transfer_syntaxes(&self) -> &[String] {
		&self.zip_transfer_syntaxes
	}
}

/// Unwraps the `type` parameter of an accepted multipart type, keeping its other
/// parameters. Without a `type` parameter any part type is acceptable.
fn part_type_of(multipart: &MediaType) -> Result<MediaType, ParseMediaTypeError> {
	let Some(type_) = multipart.param("type") else {
		return Ok(MediaType::any());
	};

	let mut part_type = MediaType::from_str(type_)?;
	for (name, value) in multipart.params() {
		if !name.eq_ignore_ascii_case("type") {
			part_type.set_param(name, value);
		}
	}
	Ok(part_type)
}

fn transfer_syntaxes_of<'a>(media_types: impl Iterator<Item = &'a MediaType>) -> Vec<String> {
	let mut transfer_syntaxes: Vec<String> = media_types
		.map(|media_type| {
			if media_type.is_wildcard_type() {
				ANY_TRANSFER_SYNTAX
			} else {
				media_type.param("transfer-syntax").unwrap_or_default()
			}
		})
		.map(String::from)
		.collect();

	if transfer_syntaxes.iter().any(String::is_empty) {
		transfer_syntaxes.retain(|ts| !ts.is_empty());
		for ts in transfer_syntax::defaults() {
			if !transfer_syntaxes.contains(&ts) {
				transfer_syntaxes.push(ts);
			}
		}
	}
	transfer_syntaxes
}

/// Returns the first provided type compatible with an accepted type, honoring the
/// caller's preference order first and the provided order second.
pub fn select_media_type(accepted: &[MediaType], provided: &[MediaType]) -> Option<MediaType> {
	accepted.iter().find_map(|accepted| {
		provided
			.iter()
			.find(|provided| provided.is_compatible_with(accepted))
			.cloned()
	})
}

/// Transfer syntax a stored object is sent in: unchanged if acceptable, otherwise
/// Explicit VR Little Endian.
pub fn select_transfer_syntax<'a>(acceptable: &[String], stored: &'a str) -> &'a str {
	if acceptable
		.iter()
		.any(|ts| ts == ANY_TRANSFER_SYNTAX || ts == stored)
	{
		stored
	} else {
		EXPLICIT_VR_LITTLE_ENDIAN
	}
}
