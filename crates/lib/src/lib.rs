//! b3-lib: Core types and logic for the b3 build engine
//!
//! This crate provides the building blocks of a b3 build:
//! - `BuildFile`/`Address`: where rules are declared and how they are named
//! - `Workspace`: lazily parses build file families and links rule dependencies
//! - `Rule`/`RuleTypeRegistry`: declared rules and the types they instantiate
//! - `DependencyGraph`: dependency edges, fork resolution and execution waves
//! - `Engine`: runs the requested rules wave by wave

pub mod address;
pub mod buildfile;
pub mod config;
pub mod consts;
pub mod engine;
pub mod execute;
pub mod graph;
pub mod lua;
pub mod rule;
pub mod rules;
pub mod statement;
pub mod util;
pub mod workspace;

pub use address::Address;
pub use buildfile::BuildFile;
pub use config::BuildConfig;
pub use engine::{BuildReport, Engine, EngineError, ExecutionPlan};
pub use workspace::{Workspace, WorkspaceError};
