//! Writer for `multipart/related` response bodies.

use crate::retrieve::media_type::MediaType;
use std::io::{self, Write};
use uuid::Uuid;

pub const CONTENT_ID: &str = "Content-ID";
pub const CONTENT_LOCATION: &str = "Content-Location";

/// Writes the entity of a part.
pub type Producer<E> = Box<dyn FnOnce(&mut dyn Write) -> Result<(), E>>;

/// One body part of a [`MultipartPayload`].
pub struct OutputPart<E> {
	media_type: MediaType,
	headers: Vec<(String, String)>,
	producer: Producer<E>,
}

impl<E> OutputPart<E> {
	pub fn new(
		media_type: MediaType,
		producer: impl FnOnce(&mut dyn Write) -> Result<(), E> + 'static,
	) -> Self {
		Self {
			media_type,
			headers: Vec::new(),
			producer: Box::new(producer),
		}
	}

	#[must_use]
	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.headers.push((name.to_owned(), value.into()));
		self
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

/// Ordered parts behind one generated boundary. The first part is the root part.
pub struct MultipartPayload<E> {
	parts: Vec<OutputPart<E>>,
	boundary: String,
}

impl<E> Default for MultipartPayload<E> {
	fn default() -> Self {
		Self {
			parts: Vec::new(),
			boundary: Uuid::new_v4().to_string(),
		}
	}
}

impl<E: From<io::Error>> MultipartPayload<E> {
	/// Appends a part, assigning a Content-ID if it has none.
	pub fn add_part(&mut self, mut part: OutputPart<E>) {
		if part.header(CONTENT_ID).is_none() {
			let content_id = format!("<{}@dicom-wado>", Uuid::new_v4());
			part.headers.insert(0, (CONTENT_ID.to_owned(), content_id));
		}
		self.parts.push(part);
	}

	/// Content type of the whole body, derived from the root part.
	pub fn content_type(&self) -> MediaType {
		let mut content_type = MediaType::multipart_related();
		if let Some(root) = self.parts.first() {
			content_type.set_param("type", &root.media_type.essence());
			if let Some(transfer_syntax) = root.media_type.param("transfer-syntax") {
				content_type.set_param("transfer-syntax", transfer_syntax);
			}
		}
		if let Some(start) = self.parts.first().and_then(|root| root.header(CONTENT_ID)) {
			content_type.set_param("start", start);
		}
		content_type.set_param("boundary", &self.boundary);
		content_type
	}

	/// Writes all parts followed by the closing delimiter. Fails if a part's entity
	/// contains the boundary.
	pub fn write_to(self, out: &mut dyn Write) -> Result<(), E> {
		let boundary = self.boundary;
		for part in self.parts {
			write!(out, "--{boundary}\r\n")?;
			write!(out, "Content-Type: {}\r\n", part.media_type)?;
			for (name, value) in &part.headers {
				write!(out, "{name}: {value}\r\n")?;
			}
			out.write_all(b"\r\n")?;
			let mut guard = BoundaryGuard::new(out, boundary.as_bytes());
			(part.producer)(&mut guard)?;
			out.write_all(b"\r\n")?;
		}
		write!(out, "--{boundary}--")?;
		out.flush()?;
		Ok(())
	}
}

/// Passes bytes through and fails as soon as the boundary appears, even when it is
/// split across writes.
struct BoundaryGuard<'a, W: ?Sized> {
	inner: &'a mut W,
	boundary: &'a [u8],
	tail: Vec<u8>,
}

impl<'a, W: Write + ?Sized> BoundaryGuard<'a, W> {
	fn new(inner: &'a mut W, boundary: &'a [u8]) -> Self {
		Self {
			inner,
			boundary,
			tail: Vec::with_capacity(boundary.len()),
		}
	}

	fn contains_boundary(&self, buf: &[u8]) -> bool {
		let mut window = Vec::with_capacity(self.tail.len() + self.boundary.len());
		window.extend_from_slice(&self.tail);
		window.extend_from_slice(&buf[..buf.len().min(self.boundary.len())]);
		contains(&window, self.boundary) || contains(buf, self.boundary)
	}
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
	haystack.windows(needle.len()).any(|window| window == needle)
}

impl<W: Write + ?Sized> Write for BoundaryGuard<'_, W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if self.contains_boundary(buf) {
			return Err(io::Error::new(
				io::ErrorKind::InvalidData,
				"part entity contains the multipart boundary",
			));
		}
		self.inner.write_all(buf)?;

		let keep = self.boundary.len().saturating_sub(1);
		self.tail.extend_from_slice(buf);
		if self.tail.len() > keep {
			self.tail.drain(..self.tail.len() - keep);
		}
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		self.inner.flush()
	}
}
