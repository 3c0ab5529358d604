//! Runs retrievals on blocking workers and streams their bodies back to the async side.

use crate::backend::{CatalogQuery, InstanceCatalog};
use crate::retrieve::context::{RetrievalContext, RetrieveOptions, RetrieveRequest};
use crate::retrieve::error::RetrieveError;
use crate::retrieve::media_type::MediaType;
use crate::retrieve::output::OutputStrategy;
use crate::retrieve::stream::StreamError;
use axum::http::StatusCode;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, instrument, warn, Span};

/// Response head and streaming body of a retrieval.
pub struct StreamingResponse {
	pub status: StatusCode,
	pub content_type: MediaType,
	pub body: BoxStream<'static, io::Result<Bytes>>,
}

struct ResponseHead {
	status: StatusCode,
	content_type: MediaType,
}

#[derive(Clone)]
pub struct RetrieveService {
	catalog: Arc<dyn InstanceCatalog>,
	permits: Arc<Semaphore>,
	options: RetrieveOptions,
	channel_capacity: usize,
}

impl RetrieveService {
	pub fn new(
		catalog: Arc<dyn InstanceCatalog>,
		options: RetrieveOptions,
		max_concurrent_retrievals: usize,
		channel_capacity: usize,
	) -> Self {
		Self {
			catalog,
			permits: Arc::new(Semaphore::new(max_concurrent_retrievals.max(1))),
			options,
			channel_capacity: channel_capacity.max(1),
		}
	}

	/// Serves one request.
	///
	/// Errors detected before the first body byte are returned here. Errors after that
	/// point end the body stream with an error item.
	#[instrument(skip_all, fields(kind = ?request.target, study = %request.study_instance_uid))]
	pub async fn retrieve(
		&self,
		request: RetrieveRequest,
	) -> Result<StreamingResponse, RetrieveError> {
		let strategy = OutputStrategy::select(request.target, &request.accept)?;
		let permit = Arc::clone(&self.permits)
			.acquire_owned()
			.await
			.map_err(|_| RetrieveError::Cancelled)?;

		let (head_tx, head_rx) = oneshot::channel();
		let (body_tx, mut body_rx) = mpsc::channel(self.channel_capacity);
		let worker = Worker {
			catalog: Arc::clone(&self.catalog),
			options: self.options.clone(),
			strategy,
			request,
			_permit: permit,
		};
		let span = Span::current();
		tokio::task::spawn_blocking(move || {
			let _entered = span.enter();
			worker.run(head_tx, body_tx);
		});

		let head = head_rx.await.map_err(|_| RetrieveError::Cancelled)??;
		let body = async_stream::stream! {
			while let Some(chunk) = body_rx.recv().await {
				yield chunk;
			}
		};

		Ok(StreamingResponse {
			status: head.status,
			content_type: head.content_type,
			body: Box::pin(body),
		})
	}
}

/// Everything a blocking worker needs to serve one request.
struct Worker {
	catalog: Arc<dyn InstanceCatalog>,
	options: RetrieveOptions,
	strategy: OutputStrategy,
	request: RetrieveRequest,
	_permit: OwnedSemaphorePermit,
}

impl Worker {
	fn run(
		self,
		head_tx: oneshot::Sender<Result<ResponseHead, RetrieveError>>,
		body_tx: mpsc::Sender<io::Result<Bytes>>,
	) {
		let query = CatalogQuery::from(&self.request);
		let chunk_size = self.options.chunk_size;
		// Owns every stream and spool file of this response until the body is written.
		let mut context = RetrievalContext::new(self.request, self.options);

		let prepared = self
			.catalog
			.find(&query)
			.map_err(RetrieveError::from)
			.and_then(|matches| {
				debug!(matches = matches.len(), "Resolved matching instances");
				context.matches = matches;
				self.strategy.build_response(&mut context)
			});
		let response = match prepared {
			Ok(response) => response,
			Err(err) => {
				let _ = head_tx.send(Err(err));
				return;
			}
		};

		let head = ResponseHead {
			status: response.status,
			content_type: response.content_type,
		};
		if head_tx.send(Ok(head)).is_err() {
			debug!("Request was dropped before the response started");
			return;
		}

		let mut writer = ChannelWriter::new(body_tx, chunk_size);
		let result = (response.body)(&mut writer).and_then(|()| Ok(writer.flush()?));
		if let Err(err) = result {
			if is_disconnect(&err) {
				warn!("Client disconnected while streaming the response");
			} else {
				error!(kind = ?context.target(), "Failed to stream response: {err}");
				writer.abort(&err);
			}
		}
		drop(context);
	}
}

fn is_disconnect(err: &RetrieveError) -> bool {
	match err {
		RetrieveError::Io(err) | RetrieveError::Stream(StreamError::Io(err)) => {
			err.kind() == io::ErrorKind::BrokenPipe
		}
		_ => false,
	}
}

/// Blocking `Write` adapter over the bounded body channel. Bytes are forwarded in
/// chunks of `chunk_size`; a full channel blocks the writer.
struct ChannelWriter {
	sender: mpsc::Sender<io::Result<Bytes>>,
	buffer: Vec<u8>,
	chunk_size: usize,
}

impl ChannelWriter {
	fn new(sender: mpsc::Sender<io::Result<Bytes>>, chunk_size: usize) -> Self {
		let chunk_size = chunk_size.max(1);
		Self {
			sender,
			buffer: Vec::with_capacity(chunk_size),
			chunk_size,
		}
	}

	fn send(&mut self, chunk: io::Result<Bytes>) -> io::Result<()> {
		self.sender
			.blocking_send(chunk)
			.map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body receiver closed"))
	}

	/// Terminates the body with an error item so the connection is not ended cleanly.
	fn abort(&mut self, err: &RetrieveError) {
		self.buffer.clear();
		let _ = self.send(Err(io::Error::other(err.to_string())));
	}
}

impl Write for ChannelWriter {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		let free = self.chunk_size - self.buffer.len();
		let written = buf.len().min(free);
		self.buffer.extend_from_slice(&buf[..written]);
		if self.buffer.len() == self.chunk_size {
			self.flush()?;
		}
		Ok(written)
	}

	fn flush(&mut self) -> io::Result<()> {
		if self.buffer.is_empty() {
			return Ok(());
		}
		let chunk = Bytes::from(std::mem::replace(
			&mut self.buffer,
			Vec::with_capacity(self.chunk_size),
		));
		self.send(Ok(chunk))
	}
}
