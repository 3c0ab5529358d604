//! `application/zip` representation of a set of instances.

use crate::retrieve::descriptor::InstanceDescriptor;
use crate::retrieve::dicom_output::write_dicom;
use crate::retrieve::error::RetrieveError;
use crate::retrieve::negotiation::select_transfer_syntax;
use dicom::core::Tag;
use dicom::object::InMemDicomObject;
use std::collections::HashSet;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::trace;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseEntryNameFormatError {
	#[error("Unterminated placeholder in '{0}'")]
	Unterminated(String),
	#[error("Invalid placeholder '{{{0}}}'")]
	InvalidPlaceholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
	Literal(String),
	Attribute { tag: Tag, hash: bool },
}

/// Template for ZIP entry names. `{ggggeeee}` inserts the value of an attribute,
/// `{ggggeeee,hash}` the hex encoded hash of that value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryNameFormat(Vec<Token>);

impl FromStr for EntryNameFormat {
	type Err = ParseEntryNameFormatError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut tokens = Vec::new();
		let mut rest = s;
		while let Some(start) = rest.find('{') {
			if start > 0 {
				tokens.push(Token::Literal(rest[..start].to_owned()));
			}
			let end = rest[start..]
				.find('}')
				.ok_or_else(|| ParseEntryNameFormatError::Unterminated(s.to_owned()))?;
			let placeholder = &rest[start + 1..start + end];
			tokens.push(parse_placeholder(placeholder)?);
			rest = &rest[start + end + 1..];
		}
		if !rest.is_empty() {
			tokens.push(Token::Literal(rest.to_owned()));
		}
		Ok(Self(tokens))
	}
}

fn parse_placeholder(placeholder: &str) -> Result<Token, ParseEntryNameFormatError> {
	let invalid = || ParseEntryNameFormatError::InvalidPlaceholder(placeholder.to_owned());
	let (tag, hash) = match placeholder.split_once(',') {
		Some((tag, "hash")) => (tag, true),
		Some(_) => return Err(invalid()),
		None => (placeholder, false),
	};
	if tag.len() != 8 {
		return Err(invalid());
	}
	let tag = u32::from_str_radix(tag, 16).map_err(|_| invalid())?;
	#[allow(clippy::cast_possible_truncation)]
	let tag = Tag((tag >> 16) as u16, tag as u16);
	Ok(Token::Attribute { tag, hash })
}

impl EntryNameFormat {
	pub fn format(&self, attributes: &InMemDicomObject) -> String {
		let mut name = String::new();
		for token in &self.0 {
			match token {
				Token::Literal(literal) => name.push_str(literal),
				Token::Attribute { tag, hash } => {
					let value = attributes
						.get(*tag)
						.and_then(|element| element.to_str().ok())
						.map(|value| value.trim_end_matches(['\0', ' ']).to_owned())
						.unwrap_or_default();
					if *hash {
						name.push_str(&format!("{:08X}", string_hash(&value)));
					} else {
						name.push_str(&value);
					}
				}
			}
		}
		name
	}
}

/// 31-multiplier hash over UTF-16 code units, wrapping at 32 bits.
fn string_hash(value: &str) -> u32 {
	value
		.encode_utf16()
		.fold(0u32, |hash, unit| hash.wrapping_mul(31).wrapping_add(u32::from(unit)))
}

/// Writes one ZIP archive containing the DICOM representation of every instance.
///
/// The archive is assembled in an anonymous temporary file in `spool_root` because the
/// central directory requires a seekable sink.
pub fn write_zip(
	instances: &[InstanceDescriptor],
	transfer_syntaxes: &[String],
	format: &EntryNameFormat,
	spool_root: &Path,
	out: &mut dyn Write,
) -> Result<(), RetrieveError> {
	let file = tempfile::tempfile_in(spool_root)?;
	let mut zip = ZipWriter::new(file);
	let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
	let mut directories = HashSet::new();

	for instance in instances {
		let name = format.format(instance.attributes());
		let mut parent = 0;
		while let Some(separator) = name[parent..].find('/') {
			parent += separator + 1;
			let directory = &name[..parent];
			if directories.insert(directory.to_owned()) {
				zip.add_directory(directory, options)?;
			}
		}
		trace!(entry = name, "Adding instance to ZIP archive");
		zip.start_file(name.as_str(), options)?;
		let transfer_syntax = select_transfer_syntax(transfer_syntaxes, instance.transfer_syntax_uid());
		write_dicom(instance, transfer_syntax, &mut zip)?;
	}

	let mut file = zip.finish()?;
	file.seek(SeekFrom::Start(0))?;
	io::copy(&mut file, out)?;
	Ok(())
}
