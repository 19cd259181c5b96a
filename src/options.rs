//! Agent option string parsing.
//!
//! Options arrive as the `key=value[,key=value...]` suffix of the agent
//! load argument, e.g.
//! `-agentpath:libcovagent.so=includes=com/ex/*,classdumpdir=/tmp/dump`.

use std::path::PathBuf;

use thiserror::Error;

/// Loader types excluded by default. Reflection glue loaders define
/// throwaway classes that would otherwise flood the coverage data.
pub const DEFAULT_EXCL_CLASSLOADER: &str = "sun.reflect.DelegatingClassLoader";

/// Error raised for an option string the agent cannot accept.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid agent option (expected key=value): {0:?}")]
    InvalidEntry(String),
    #[error("unknown agent option: {0:?}")]
    UnknownOption(String),
}

/// Configuration options for the coverage agent.
///
/// Immutable after construction; the transformer borrows it once at
/// start-up and compiles the pattern fields into matchers.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// `:`-separated wildcard list of class names to instrument.
    pub includes: String,
    /// `:`-separated wildcard list of class names to skip.
    pub excludes: String,
    /// `:`-separated wildcard list of loader type names whose classes
    /// are skipped.
    pub excl_classloader: String,
    /// Directory generated-class bytecode is dumped to, if set.
    pub class_dump_dir: Option<PathBuf>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            includes: String::from("*"),
            excludes: String::new(),
            excl_classloader: String::from(DEFAULT_EXCL_CLASSLOADER),
            class_dump_dir: None,
        }
    }
}

impl AgentOptions {
    /// Parses an agent option string. The empty string yields defaults.
    ///
    /// Unknown keys are rejected so that a typo fails agent start-up
    /// instead of silently instrumenting the wrong classes.
    pub fn parse(text: &str) -> Result<Self, OptionsError> {
        let mut options = Self::default();
        for entry in text.split(',').filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| OptionsError::InvalidEntry(entry.to_string()))?;
            match key {
                "includes" => options.includes = value.to_string(),
                "excludes" => options.excludes = value.to_string(),
                "exclclassloader" => options.excl_classloader = value.to_string(),
                "classdumpdir" => options.class_dump_dir = Some(PathBuf::from(value)),
                _ => return Err(OptionsError::UnknownOption(key.to_string())),
            }
        }
        Ok(options)
    }
}
