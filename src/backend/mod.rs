use crate::retrieve::context::RetrieveRequest;
use crate::retrieve::descriptor::InstanceDescriptor;
use crate::types::UI;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub mod filesystem;

/// Instances to look up, narrowed from study to instance level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
	pub study_instance_uid: UI,
	pub series_instance_uid: Option<UI>,
	pub sop_instance_uid: Option<UI>,
}

impl CatalogQuery {
	pub fn matches(&self, instance: &InstanceDescriptor) -> bool {
		instance.study_instance_uid() == self.study_instance_uid
			&& self
				.series_instance_uid
				.as_deref()
				.is_none_or(|uid| instance.series_instance_uid() == uid)
			&& self
				.sop_instance_uid
				.as_deref()
				.is_none_or(|uid| instance.sop_instance_uid() == uid)
	}
}

impl From<&RetrieveRequest> for CatalogQuery {
	fn from(request: &RetrieveRequest) -> Self {
		Self {
			study_instance_uid: request.study_instance_uid.clone(),
			series_instance_uid: request.series_instance_uid.clone(),
			sop_instance_uid: request.sop_instance_uid.clone(),
		}
	}
}

#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("Failed to read storage directory {path}: {source}")]
	Storage { path: PathBuf, source: io::Error },
}

/// Resolves a query to the matching instances, in the order they are returned to clients.
/// Called from blocking retrieval workers.
pub trait InstanceCatalog: Send + Sync {
	fn find(&self, query: &CatalogQuery) -> Result<Vec<InstanceDescriptor>, CatalogError>;
}
