//! Per-request temporary storage for frames that are requested out of order.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, warn};

pub struct SpoolDirectory {
	root: PathBuf,
	directory: Option<TempDir>,
}

impl SpoolDirectory {
	pub const fn new(root: PathBuf) -> Self {
		Self {
			root,
			directory: None,
		}
	}

	pub const fn is_created(&self) -> bool {
		self.directory.is_some()
	}

	/// Creates the directory on first use.
	pub fn path(&mut self) -> io::Result<&Path> {
		if self.directory.is_none() {
			let directory = tempfile::Builder::new()
				.prefix("wado-spool-")
				.tempdir_in(&self.root)?;
			debug!(path = %directory.path().display(), "Created spool directory");
			self.directory = Some(directory);
		}
		match &self.directory {
			Some(directory) => Ok(directory.path()),
			None => Err(io::Error::other("spool directory vanished")),
		}
	}

	pub fn create_file(&mut self) -> io::Result<NamedTempFile> {
		let directory = self.path()?.to_path_buf();
		tempfile::Builder::new()
			.prefix("frame-")
			.suffix(".tmp")
			.tempfile_in(directory)
	}

	/// Deletes the directory with all remaining files.
	pub fn purge(&mut self) {
		let Some(directory) = self.directory.take() else {
			return;
		};

		let path = directory.path().to_path_buf();
		if let Ok(entries) = std::fs::read_dir(&path) {
			for entry in entries.flatten() {
				if let Err(err) = std::fs::remove_file(entry.path()) {
					warn!(path = %entry.path().display(), "Failed to delete spool file: {err}");
				}
			}
		}
		match directory.close() {
			Ok(()) => debug!(path = %path.display(), "Purged spool directory"),
			Err(err) => warn!(path = %path.display(), "Failed to delete spool directory: {err}"),
		}
	}
}

impl Drop for SpoolDirectory {
	fn drop(&mut self) {
		self.purge();
	}
}
