//! Lua evaluation of declaration files.
//!
//! Declaration files are Lua scripts. Evaluating one never touches the workspace: each
//! constructor and factory call is recorded as a [`Statement`](crate::statement::Statement) and
//! the resulting list is replayed by the workspace.
//!
//! # Submodules
//!
//! - [`runtime`] - VM setup and file compilation
//! - [`globals`] - Constructors, factories, `capability()` and file-scoped bindings
//! - [`convert`] - Lua value to [`ArgValue`](crate::rule::ArgValue) conversion
//! - [`path`] - The `path` helper table

pub mod convert;
pub mod globals;
pub mod path;
pub mod runtime;

pub use runtime::{compile_file, compile_source};
