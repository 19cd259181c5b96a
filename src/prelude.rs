//! Convenience re-exports for agent host glue.

pub use crate::merge::ExecFileLoader;
pub use crate::options::AgentOptions;
pub use crate::transform::{ClassFormatError, ClassIdentity, CoverageTransformer};
pub use crate::wildcard::WildcardMatcher;
pub use crate::{
    ClassHandle, ClassLoader, ExceptionLogger, Instrumenter, ProbeRuntime, TracingExceptionLogger,
};
