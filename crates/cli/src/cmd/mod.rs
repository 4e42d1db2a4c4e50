mod build;
mod clean;
mod query;

pub use build::{BuildOptions, cmd_build};
pub use clean::cmd_clean;
pub use query::cmd_query;
