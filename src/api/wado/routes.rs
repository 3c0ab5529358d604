use crate::api::wado::WadoRequest;
use crate::retrieve::{RetrieveError, RetrieveTarget};
use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::instrument;

/// HTTP Router for the Retrieve Transaction
/// https://dicom.nema.org/medical/dicom/current/output/html/part18.html#sect_10.4
#[rustfmt::skip]
pub fn routes() -> Router<AppState> {
	Router::new()
		// https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_10.4.html#sect_10.4.1.1.1
		.route("/studies/{study}", get(study_instances))
		.route("/studies/{study}/series/{series}", get(series_instances))
		.route("/studies/{study}/series/{series}/instances/{instance}", get(instance))

		// https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_10.4.html#sect_10.4.1.1.2
		.route("/studies/{study}/metadata", get(study_metadata))
		.route("/studies/{study}/series/{series}/metadata", get(series_metadata))
		.route("/studies/{study}/series/{series}/instances/{instance}/metadata", get(instance_metadata))

		// https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_10.4.html#sect_10.4.1.1.5
		.route("/studies/{study}/series/{series}/instances/{instance}/bulkdata/{*path}", get(bulkdata))

		// https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_10.4.html#sect_10.4.1.1.6
		.route("/studies/{study}/series/{series}/instances/{instance}/frames/{frames}", get(frames))
}

async fn retrieve_resource(
	state: AppState,
	request: WadoRequest,
	target: RetrieveTarget,
) -> Response {
	let response = match state.retrieve.retrieve(request.into_retrieve_request(target)).await {
		Ok(response) => response,
		Err(err) => return err.into_response(),
	};

	let Ok(content_type) = HeaderValue::from_str(&response.content_type.to_string()) else {
		return RetrieveError::Internal("content type is not a valid header value").into_response();
	};
	(
		response.status,
		[(CONTENT_TYPE, content_type)],
		Body::from_stream(response.body),
	)
		.into_response()
}

#[instrument(skip_all)]
async fn study_instances(State(state): State<AppState>, request: WadoRequest) -> Response {
	retrieve_resource(state, request, RetrieveTarget::Study).await
}

#[instrument(skip_all)]
async fn series_instances(State(state): State<AppState>, request: WadoRequest) -> Response {
	retrieve_resource(state, request, RetrieveTarget::Series).await
}

#[instrument(skip_all)]
async fn instance(State(state): State<AppState>, request: WadoRequest) -> Response {
	retrieve_resource(state, request, RetrieveTarget::Instance).await
}

#[instrument(skip_all)]
async fn study_metadata(State(state): State<AppState>, request: WadoRequest) -> Response {
	retrieve_resource(state, request, RetrieveTarget::StudyMetadata).await
}

#[instrument(skip_all)]
async fn series_metadata(State(state): State<AppState>, request: WadoRequest) -> Response {
	retrieve_resource(state, request, RetrieveTarget::SeriesMetadata).await
}

#[instrument(skip_all)]
async fn instance_metadata(State(state): State<AppState>, request: WadoRequest) -> Response {
	retrieve_resource(state, request, RetrieveTarget::InstanceMetadata).await
}

#[instrument(skip_all)]
async fn bulkdata(State(state): State<AppState>, request: WadoRequest) -> Response {
	retrieve_resource(state, request, RetrieveTarget::Bulkdata).await
}

#[instrument(skip_all)]
async fn frames(State(state): State<AppState>, request: WadoRequest) -> Response {
	retrieve_resource(state, request, RetrieveTarget::Frame).await
}
