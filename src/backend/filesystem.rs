use crate::backend::{CatalogError, CatalogQuery, InstanceCatalog};
use crate::retrieve::descriptor::{FileSource, InstanceDescriptor};
use dicom::dictionary_std::tags;
use dicom::object::{OpenFileOptions, ReadError};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Serves the DICOM files found below a storage directory.
///
/// The directory is indexed once. Each file is parsed up to its pixel data, so the index
/// holds the attributes but never the bulk data itself.
pub struct FileSystemCatalog {
	instances: Vec<InstanceDescriptor>,
}

impl FileSystemCatalog {
	#[instrument(skip_all, fields(root = %root.display()))]
	pub fn scan(root: &Path) -> Result<Self, CatalogError> {
		std::fs::read_dir(root).map_err(|source| CatalogError::Storage {
			path: root.to_path_buf(),
			source,
		})?;

		let mut instances = Vec::new();
		for entry in WalkDir::new(root).follow_links(true) {
			let entry = match entry {
				Ok(entry) => entry,
				Err(err) => {
					warn!("Skipping unreadable entry: {err}");
					continue;
				}
			};
			if !entry.file_type().is_file() {
				continue;
			}

			match index_file(entry.path()) {
				Ok(instance) if instance.sop_instance_uid().is_empty() => {
					debug!(path = %entry.path().display(), "Skipping file without SOP Instance UID");
				}
				Ok(instance) => instances.push(instance),
				Err(err) => {
					debug!(path = %entry.path().display(), "Skipping file that is not DICOM: {err}");
				}
			}
		}

		instances.sort_by(compare_instances);
		info!(count = instances.len(), "Indexed stored instances");
		Ok(Self { instances })
	}

	pub fn len(&self) -> usize {
		self.instances.len()
	}
}

impl InstanceCatalog for FileSystemCatalog {
	fn find(&self, query: &CatalogQuery) -> Result<Vec<InstanceDescriptor>, CatalogError> {
		Ok(self
			.instances
			.iter()
			.filter(|instance| query.matches(instance))
			.cloned()
			.collect())
	}
}

fn index_file(path: &Path) -> Result<InstanceDescriptor, ReadError> {
	let file = OpenFileOptions::new()
		.read_until(tags::PIXEL_DATA)
		.open_file(path)?;
	let transfer_syntax_uid = file.meta().transfer_syntax().to_owned();

	Ok(InstanceDescriptor::new(
		file.into_inner(),
		&transfer_syntax_uid,
		Arc::new(FileSource::new(path.to_path_buf())),
	))
}

fn instance_number(instance: &InstanceDescriptor) -> Option<i32> {
	instance
		.attributes()
		.get(tags::INSTANCE_NUMBER)
		.and_then(|element| element.to_int::<i32>().ok())
}

fn compare_instances(a: &InstanceDescriptor, b: &InstanceDescriptor) -> Ordering {
	a.study_instance_uid()
		.cmp(b.study_instance_uid())
		.then_with(|| a.series_instance_uid().cmp(b.series_instance_uid()))
		.then_with(|| instance_number(a).cmp(&instance_number(b)))
		.then_with(|| a.sop_instance_uid().cmp(b.sop_instance_uid()))
}
