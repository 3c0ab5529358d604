use crate::retrieve::context::{AttributePath, FrameSelection};
use crate::retrieve::negotiation::AcceptableMediaTypes;
use crate::retrieve::{RetrieveError, RetrieveRequest, RetrieveTarget};
use crate::types::UI;
use crate::AppState;
use axum::extract::rejection::PathRejection;
use axum::extract::{FromRef, FromRequestParts, OriginalUri, Path};
use axum::http::header::{ACCEPT, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::Query;
use serde::Deserialize;
use std::fmt::Display;
use tracing::{debug, error};

/// A WADO-RS request before its target is known. Each route turns it into the
/// [`RetrieveRequest`] for its own target.
#[derive(Debug)]
pub struct WadoRequest {
	pub query: ResourceQuery,
	pub frames: Option<FrameSelection>,
	pub path: Option<AttributePath>,
	pub accept: AcceptableMediaTypes,
	pub request_url: String,
}

impl WadoRequest {
	pub fn into_retrieve_request(self, target: RetrieveTarget) -> RetrieveRequest {
		RetrieveRequest {
			target,
			study_instance_uid: self.query.study_instance_uid,
			series_instance_uid: self.query.series_instance_uid,
			sop_instance_uid: self.query.sop_instance_uid,
			frames: self.frames,
			path: self.path,
			request_url: self.request_url,
			accept: self.accept,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceQuery {
	#[serde(rename = "study")]
	pub study_instance_uid: UI,
	#[serde(rename = "series")]
	pub series_instance_uid: Option<UI>,
	#[serde(rename = "instance")]
	pub sop_instance_uid: Option<UI>,
	pub frames: Option<String>,
	pub path: Option<String>,
}

/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_8.3.3.html#sect_8.3.3.1>
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RetrieveQueryParameters {
	#[serde(default)]
	pub accept: Vec<String>,
}

impl<S> FromRequestParts<S> for WadoRequest
where
	AppState: FromRef<S>,
	S: Send + Sync,
{
	type Rejection = Response;

	async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		let Path(query): Path<ResourceQuery> = Path::from_request_parts(parts, state)
			.await
			.map_err(PathRejection::into_response)?;

		let Query(params): Query<RetrieveQueryParameters> =
			Query::from_request_parts(parts, state)
				.await
				.map_err(IntoResponse::into_response)?;

		let frames = query
			.frames
			.as_deref()
			.map(str::parse::<FrameSelection>)
			.transpose()
			.map_err(bad_request)?;
		let path = query
			.path
			.as_deref()
			.map(|path| path.trim_matches('/').parse::<AttributePath>())
			.transpose()
			.map_err(bad_request)?;

		let accept_headers: Vec<String> = parts
			.headers
			.get_all(ACCEPT)
			.iter()
			.filter_map(|value| value.to_str().ok())
			.map(ToOwned::to_owned)
			.collect();
		let accept = AcceptableMediaTypes::new(&accept_headers, &params.accept).map_err(bad_request)?;

		let uri = match parts.extensions.get::<OriginalUri>() {
			Some(OriginalUri(uri)) => uri.clone(),
			None => parts.uri.clone(),
		};
		let request_url = request_url(&uri, &parts.headers);

		Ok(Self {
			query,
			frames,
			path,
			accept,
			request_url,
		})
	}
}

/// Absolute URL of the request without its query string.
fn request_url(uri: &Uri, headers: &HeaderMap) -> String {
	let scheme = headers
		.get("x-forwarded-proto")
		.and_then(|value| value.to_str().ok())
		.or_else(|| uri.scheme_str())
		.unwrap_or("http");
	let host = uri
		.authority()
		.map(ToString::to_string)
		.or_else(|| {
			headers
				.get(HOST)
				.and_then(|value| value.to_str().ok())
				.map(ToOwned::to_owned)
		})
		.unwrap_or_else(|| String::from("localhost"));
	format!("{scheme}://{host}{}", uri.path())
}

fn bad_request(err: impl Display) -> Response {
	(StatusCode::BAD_REQUEST, err.to_string()).into_response()
}

impl IntoResponse for RetrieveError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			error!("{self:?}");
		} else {
			debug!(%status, "{self}");
		}
		(status, self.to_string()).into_response()
	}
}
