use crate::retrieve::spool::SpoolDirectory;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;

/// An open stream or decoder that must be closed when the response completes.
pub trait Release {
	fn release(&mut self);
}

/// Owns everything a response opened. Dropping the guard releases each handle once
/// and purges the spool directory, on success and on every error path.
pub struct ResourceGuard {
	handles: Vec<Rc<RefCell<dyn Release>>>,
	spool: Rc<RefCell<SpoolDirectory>>,
}

impl ResourceGuard {
	pub fn new(spool_root: PathBuf) -> Self {
		Self {
			handles: Vec::new(),
			spool: Rc::new(RefCell::new(SpoolDirectory::new(spool_root))),
		}
	}

	pub fn register(&mut self, handle: Rc<RefCell<dyn Release>>) {
		self.handles.push(handle);
	}

	pub fn spool(&self) -> Rc<RefCell<SpoolDirectory>> {
		Rc::clone(&self.spool)
	}

	pub fn spool_created(&self) -> bool {
		self.spool.borrow().is_created()
	}

	pub fn release_all(&mut self) {
		for handle in self.handles.drain(..) {
			handle.borrow_mut().release();
		}
		if self.spool_created() {
			debug!("Purging spooled frames");
		}
		self.spool.borrow_mut().purge();
	}
}

impl Drop for ResourceGuard {
	fn drop(&mut self) {
		self.release_all();
	}
}
