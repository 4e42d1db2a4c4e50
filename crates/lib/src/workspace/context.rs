//! Per-family parse contexts.

use std::fmt;

use super::{Workspace, WorkspaceError};
use crate::buildfile::BuildFile;

/// Work registered with [`Workspace::on_context_exit`], run after the family is declared.
pub type Deferred = Box<dyn FnOnce(&mut Workspace) -> Result<(), WorkspaceError>>;

/// The parse of one family, from the first declaration until its deferred links have run.
pub struct Context {
  buildfile: BuildFile,
  deferred: Vec<Deferred>,
}

impl Context {
  pub fn new(buildfile: BuildFile) -> Self {
    Self {
      buildfile,
      deferred: Vec::new(),
    }
  }

  /// The file whose parse opened the context.
  pub fn buildfile(&self) -> &BuildFile {
    &self.buildfile
  }

  pub fn defer(&mut self, action: Deferred) {
    self.deferred.push(action);
  }

  pub fn pending(&self) -> usize {
    self.deferred.len()
  }

  /// Deferred actions in registration order.
  pub fn into_deferred(self) -> Vec<Deferred> {
    self.deferred
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("buildfile", &self.buildfile)
      .field("deferred", &self.deferred.len())
      .finish()
  }
}
