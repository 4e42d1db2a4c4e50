//! Names and markers shared across the crate.

/// Canonical name of a declaration file. Siblings are `BUILD.<suffix>`.
pub const BUILD_FILE_NAME: &str = "BUILD";

/// Marker file identifying the workspace root.
pub const ROOT_MARKER: &str = "B3ROOT";

/// Directory (next to the declaration files) holding compiled statement caches.
pub const CACHE_DIR_NAME: &str = ".b3cache";

/// Bumped whenever the serialized statement layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Default output directory, relative to the workspace root.
pub const DEFAULT_OUT_DIR: &str = "b3-out";

/// Property holding a rule's target language.
pub const LANGUAGE_PROPERTY: &str = "programming_language";

/// Metatable `__type` markers for Lua values handed out by the DSL.
pub const CAPABILITY_TYPE: &str = "b3.Capability";
pub const RULE_REF_TYPE: &str = "b3.RuleRef";
pub const SPECIALIZATION_TYPE: &str = "b3.Specialization";

/// Suffix appended to a rule type to form its factory name in the DSL.
pub const FACTORY_SUFFIX: &str = "_factory";
