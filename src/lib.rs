//! # classcov
//!
//! Core of a bytecode coverage agent: the load-time transform pipeline
//! that decides whether a class gets coverage probes, plus the execution
//! data file format shared with downstream report tooling.
//!
//! The crate deliberately does **not** contain a bytecode rewriter or a
//! probe runtime. Both are external collaborators pinned behind traits:
//!
//! - [`Instrumenter`] - the opaque transform `(classfile bytes, vm name)
//!   -> instrumented bytes`
//! - [`ProbeRuntime`] - the runtime holding per-class probe arrays,
//!   consumed here only through [`ProbeRuntime::disconnect`]
//!
//! What *is* here:
//!
//! - [`transform::CoverageTransformer`] - the per-class-load entry point:
//!   filtering, redefinition handling, generated-class dumps, and the
//!   hand-off to the instrumenter
//! - [`wildcard::WildcardMatcher`] - compiled `*`/`?` glob lists used by
//!   the include/exclude/loader filters
//! - [`options::AgentOptions`] - the agent option string, parsed
//! - [`execdata`] - reader, writer and in-memory stores for the binary
//!   execution data format
//! - [`merge::ExecFileLoader`] - the accumulator behind the offline
//!   `execmerge` tool
//!
//! # Threading
//!
//! The host runtime may invoke the transformer from any thread, several
//! at once when parallel class loading is active. Everything reachable
//! from [`transform::CoverageTransformer::transform`] is immutable after
//! construction apart from the dump directory on disk, so the
//! transformer is `Send + Sync` and needs no locking of its own.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use classcov::prelude::*;
//!
//! let options = AgentOptions::parse("includes=com/ex/*,excludes=*/Test*")?;
//! let transformer = CoverageTransformer::new(
//!     runtime,              // Arc<dyn ProbeRuntime>
//!     instrumenter,         // Arc<dyn Instrumenter>
//!     &options,
//!     Arc::new(TracingExceptionLogger),
//! );
//!
//! // Host glue, per class load:
//! match transformer.transform(&identity)? {
//!     Some(bytes) => install(bytes),
//!     None => {} // leave the class untouched
//! }
//! ```

use std::error::Error;

pub mod classfile;
pub mod dump;
pub mod execdata;
pub mod merge;
pub mod options;
pub mod prelude;
pub mod transform;
pub mod wildcard;

/// Boxed error type used at the collaborator seams.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// The external bytecode rewriter.
///
/// Inserts coverage probes into a classfile and registers the class with
/// the probe runtime. Consumed as an opaque transform; any failure is
/// wrapped by the coordinator into a class-format fault.
pub trait Instrumenter: Send + Sync {
    /// Instruments `buffer` and returns the rewritten classfile.
    ///
    /// `vm_name` is the internal (slash-separated) name of the class.
    fn instrument(&self, buffer: &[u8], vm_name: &str) -> Result<Vec<u8>, BoxError>;
}

/// The external probe runtime.
pub trait ProbeRuntime: Send + Sync {
    /// Drops any probe array the runtime holds for `class`.
    ///
    /// Called before a class is redefined, because probe identifiers are
    /// assigned from the class structure and a redefined class may
    /// renumber them. Must accept handles it has never seen.
    fn disconnect(&self, class: &dyn ClassHandle) -> Result<(), BoxError>;
}

/// Handle to an already-loaded class, as supplied by the host runtime
/// when that class is being redefined.
pub trait ClassHandle {
    /// Dotted type names of the interfaces the class declares.
    fn interface_names(&self) -> Result<Vec<String>, BoxError>;
}

/// Handle to a defining class loader. `None` in [`transform::ClassIdentity`]
/// means the bootstrap loader.
pub trait ClassLoader {
    /// Dotted type name of the loader implementation, e.g.
    /// `jdk.internal.loader.ClassLoaders$AppClassLoader`.
    fn type_name(&self) -> &str;
}

/// Sink for exceptions the host runtime would otherwise swallow.
///
/// The class-loading machinery discards faults raised by transformers,
/// so the coordinator reports them here before propagating. Dump I/O
/// failures and option deprecations go through the same channel.
pub trait ExceptionLogger: Send + Sync {
    fn log_exception(&self, error: &(dyn Error + 'static));
}

/// [`ExceptionLogger`] that forwards to [`tracing::error!`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingExceptionLogger;

impl ExceptionLogger for TracingExceptionLogger {
    fn log_exception(&self, error: &(dyn Error + 'static)) {
        tracing::error!(%error, "coverage agent exception");
    }
}
