use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// A media type with ordered parameters.
///
/// Unlike [`mime::Mime`], parameters can be added and removed, which is needed to carry
/// `type`, `transfer-syntax` and `boundary` between the accepted and the produced types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
	type_: String,
	subtype: String,
	params: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum ParseMediaTypeError {
	#[error("Invalid media type {value:?}: {source}")]
	Invalid {
		value: String,
		source: mime::FromStrError,
	},
}

impl MediaType {
	pub fn new(type_: &str, subtype: &str) -> Self {
		Self {
			type_: type_.to_ascii_lowercase(),
			subtype: subtype.to_ascii_lowercase(),
			params: Vec::new(),
		}
	}

	pub fn any() -> Self {
		Self::new("*", "*")
	}

	pub fn application_dicom() -> Self {
		Self::new("application", "dicom")
	}

	pub fn application_dicom_json() -> Self {
		Self::new("application", "dicom+json")
	}

	pub fn application_json() -> Self {
		Self::new("application", "json")
	}

	pub fn application_zip() -> Self {
		Self::new("application", "zip")
	}

	pub fn application_octet_stream() -> Self {
		Self::new("application", "octet-stream")
	}

	pub fn multipart_related() -> Self {
		Self::new("multipart", "related")
	}

	pub fn type_(&self) -> &str {
		&self.type_
	}

	pub fn subtype(&self) -> &str {
		&self.subtype
	}

	/// `type/subtype` without parameters.
	pub fn essence(&self) -> String {
		format!("{}/{}", self.type_, self.subtype)
	}

	pub fn param(&self, name: &str) -> Option<&str> {
		self.params
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
		self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	#[must_use]
	pub fn with_param(mut self, name: &str, value: &str) -> Self {
		self.set_param(name, value);
		self
	}

	pub fn set_param(&mut self, name: &str, value: &str) {
		let name = name.to_ascii_lowercase();
		match self.params.iter_mut().find(|(key, _)| *key == name) {
			Some((_, existing)) => *existing = value.to_owned(),
			None => self.params.push((name, value.to_owned())),
		}
	}

	#[must_use]
	pub fn without_param(mut self, name: &str) -> Self {
		self.params.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
		self
	}

	pub fn is_wildcard_type(&self) -> bool {
		self.type_ == "*"
	}

	pub fn is_wildcard_subtype(&self) -> bool {
		self.subtype == "*" || self.subtype.starts_with("*+")
	}

	/// Structured syntax suffix, e.g. `json` for `application/dicom+json`.
	fn suffix(&self) -> Option<&str> {
		self.subtype.rsplit_once('+').map(|(_, suffix)| suffix)
	}

	pub fn has_essence(&self, other: &Self) -> bool {
		self.type_ == other.type_ && self.subtype == other.subtype
	}

	/// Symmetric compatibility check honoring `*/*`, `type/*` and `type/*+suffix` wildcards.
	pub fn is_compatible_with(&self, other: &Self) -> bool {
		if self.is_wildcard_type() || other.is_wildcard_type() {
			return true;
		}
		if self.type_ != other.type_ {
			return false;
		}
		if self.subtype == other.subtype || self.subtype == "*" || other.subtype == "*" {
			return true;
		}
		match (self.is_wildcard_subtype(), other.is_wildcard_subtype()) {
			(true, false) => self.suffix() == other.suffix(),
			(false, true) => other.suffix() == self.suffix(),
			_ => false,
		}
	}
}

impl FromStr for MediaType {
	type Err = ParseMediaTypeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let parsed: mime::Mime =
			s.trim()
				.parse()
				.map_err(|source| ParseMediaTypeError::Invalid {
					value: s.to_owned(),
					source,
				})?;

		let subtype = match parsed.suffix() {
			Some(suffix) => format!("{}+{}", parsed.subtype(), suffix),
			None => parsed.subtype().to_string(),
		};
		let mut media_type = Self::new(parsed.type_().as_str(), &subtype);
		for (name, value) in parsed.params() {
			media_type.set_param(name.as_str(), &unquote(value.as_str()));
		}
		Ok(media_type)
	}
}

impl Display for MediaType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}/{}", self.type_, self.subtype)?;
		for (name, value) in &self.params {
			if is_token(value) {
				write!(f, "; {name}={value}")?;
			} else {
				write!(f, "; {name}=\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))?;
			}
		}
		Ok(())
	}
}

fn unquote(value: &str) -> String {
	match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
		Some(inner) => {
			let mut unescaped = String::with_capacity(inner.len());
			let mut chars = inner.chars();
			while let Some(c) = chars.next() {
				match c {
					'\\' => unescaped.extend(chars.next()),
					c => unescaped.push(c),
				}
			}
			unescaped
		}
		None => value.to_owned(),
	}
}

/// RFC 7230 token characters.
fn is_token(value: &str) -> bool {
	!value.is_empty()
		&& value.bytes().all(|b| {
			b.is_ascii_alphanumeric()
				|| matches!(
					b,
					b'!' | b'#'
						| b'$' | b'%' | b'&'
						| b'\'' | b'*' | b'+'
						| b'-' | b'.' | b'^'
						| b'_' | b'`' | b'|'
						| b'~'
				)
		})
}

/// Splits a header value on commas that are not inside a quoted string.
pub fn split_list(value: &str) -> Vec<&str> {
	let mut items = Vec::new();
	let mut start = 0;
	let mut quoted = false;
	let mut escaped = false;
	for (i, c) in value.char_indices() {
		match c {
			_ if escaped => escaped = false,
			'\\' if quoted => escaped = true,
			'"' => quoted = !quoted,
			',' if !quoted => {
				items.push(&value[start..i]);
				start = i + 1;
			}
			_ => {}
		}
	}
	items.push(&value[start..]);
	items
		.into_iter()
		.map(str::trim)
		.filter(|item| !item.is_empty())
		.collect()
}

/// Parses a list of Accept values into media types ordered by descending quality.
///
/// Types with equal quality keep their original order. The `q` parameter is dropped.
pub fn parse_accept_list<I, S>(values: I) -> Result<Vec<MediaType>, ParseMediaTypeError>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut weighted = Vec::new();
	for value in values {
		for item in split_list(value.as_ref()) {
			let media_type = MediaType::from_str(item)?;
			let quality = media_type
				.param("q")
				.and_then(|q| q.parse::<f32>().ok())
				.unwrap_or(1.0);
			weighted.push((quality, media_type.without_param("q")));
		}
	}
	weighted.sort_by(|(a, _), (b, _)| b.total_cmp(a));
	Ok(weighted.into_iter().map(|(_, media_type)| media_type).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_multipart_with_quoted_type() {
		let media_type: MediaType =
			r#"multipart/related; type="application/dicom"; transfer-syntax=1.2.840.10008.1.2.1"#
				.parse()
				.unwrap();
		assert_eq!(media_type.essence(), "multipart/related");
		assert_eq!(media_type.param("type"), Some("application/dicom"));
		assert_eq!(media_type.param("transfer-syntax"), Some("1.2.840.10008.1.2.1"));
	}

	#[test]
	fn suffix_is_part_of_subtype() {
		let media_type: MediaType = "application/dicom+json".parse().unwrap();
		assert_eq!(media_type.subtype(), "dicom+json");
		assert!(media_type.has_essence(&MediaType::application_dicom_json()));
	}

	#[test]
	fn compatibility() {
		let dicom = MediaType::application_dicom();
		assert!(MediaType::any().is_compatible_with(&dicom));
		assert!(dicom.is_compatible_with(&MediaType::any()));
		assert!(MediaType::new("application", "*").is_compatible_with(&dicom));
		assert!(!MediaType::new("image", "*").is_compatible_with(&dicom));
		assert!(!MediaType::application_json().is_compatible_with(&dicom));
		assert!(
			MediaType::new("application", "*+json")
				.is_compatible_with(&MediaType::application_dicom_json())
		);
		assert!(
			!MediaType::new("application", "*+xml")
				.is_compatible_with(&MediaType::application_dicom_json())
		);
	}

	#[test]
	fn display_quotes_non_tokens() {
		let media_type = MediaType::multipart_related()
			.with_param("type", "application/dicom")
			.with_param("boundary", "abc-123");
		assert_eq!(
			media_type.to_string(),
			r#"multipart/related; type="application/dicom"; boundary=abc-123"#
		);
	}

	#[test]
	fn accept_list_is_ordered_by_quality() {
		let list = parse_accept_list([
			"image/jpeg;q=0.5, application/dicom",
			r#"multipart/related; type="image/jpeg, image/png"; q=0.9"#,
		])
		.unwrap();
		let essences: Vec<String> = list.iter().map(MediaType::essence).collect();
		assert_eq!(
			essences,
			vec!["application/dicom", "multipart/related", "image/jpeg"]
		);
		assert!(list.iter().all(|m| m.param("q").is_none()));
		assert_eq!(list[1].param("type"), Some("image/jpeg, image/png"));
	}

	#[test]
	fn split_list_ignores_commas_in_quotes() {
		assert_eq!(
			split_list(r#"a/b; x="1,2", c/d ,"#),
			vec![r#"a/b; x="1,2""#, "c/d"]
		);
	}
}
