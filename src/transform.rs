//! The load-time transform coordinator.
//!
//! [`CoverageTransformer::transform`] is the entry the host runtime's
//! class-loading machinery calls for every class. It applies the
//! include/exclude filter, handles redefinition by dropping stale probe
//! state, dumps generated-class bytecode, and finally delegates to the
//! external instrumenter. Returning `Ok(None)` is the host-runtime
//! convention for "leave this class untouched" - it must never be
//! replaced by returning a copy of the input, which would disable later
//! transformers in the chain.

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::debug;

use crate::classfile::{self, ClassSummary};
use crate::dump::ClassDumper;
use crate::options::AgentOptions;
use crate::wildcard::{normalize_separators, to_vm_name, WildcardMatcher};
use crate::{BoxError, ClassHandle, ClassLoader, ExceptionLogger, Instrumenter, ProbeRuntime};

/// Interface-name prefix marking a class as belonging to the dynamic
/// language frontend, i.e. generated with no on-disk source.
pub const GENERATED_MARKER_PREFIX: &str = "IGosu";

static AGENT_PREFIX: OnceLock<String> = OnceLock::new();

/// Internal-form prefix of the agent's own code, derived from this
/// module's path at first use. Classes under it are never instrumented:
/// instrumenting the probe runtime would invoke the probe runtime during
/// its own instrumentation.
pub fn agent_prefix() -> &'static str {
    AGENT_PREFIX.get_or_init(|| {
        let path = module_path!();
        let parent = path.rsplit_once("::").map_or(path, |(p, _)| p);
        parent.replace("::", "/")
    })
}

/// Fault type required by the host runtime for a failed class transform.
///
/// The host runtime silently discards these, so the coordinator reports
/// every instance through the exception logger before returning it.
#[derive(Debug, Error)]
#[error("cannot instrument class {class}: {message}")]
pub struct ClassFormatError {
    /// Internal name of the class that failed.
    pub class: String,
    pub message: String,
    #[source]
    source: Option<BoxError>,
}

impl ClassFormatError {
    fn wrap(class: &str, source: BoxError) -> Self {
        Self {
            class: class.to_string(),
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Identity of one class presented for transformation. Owned by the
/// host glue; the coordinator only borrows it for the span of the call.
///
/// The host also supplies a protection domain; the coordinator never
/// consults it, so it is not modeled here.
pub struct ClassIdentity<'a> {
    /// Defining loader; `None` means the bootstrap loader.
    pub loader: Option<&'a dyn ClassLoader>,
    /// Internal (slash-separated) name of the class.
    pub name: &'a str,
    /// Present iff the class is being redefined rather than loaded for
    /// the first time.
    pub redefined: Option<&'a dyn ClassHandle>,
    /// Raw classfile bytes as supplied by the host runtime.
    pub buffer: &'a [u8],
}

/// [`ClassHandle`] backed by raw classfile bytes, for host glue that
/// holds the previous classfile of a redefined class rather than
/// reflective access to it.
pub struct ClassfileHandle {
    buffer: Vec<u8>,
}

impl ClassfileHandle {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self { buffer }
    }
}

impl ClassHandle for ClassfileHandle {
    fn interface_names(&self) -> Result<Vec<String>, BoxError> {
        let summary = ClassSummary::parse(&self.buffer)?;
        Ok(summary
            .interfaces
            .into_iter()
            .map(|name| name.replace('/', "."))
            .collect())
    }
}

/// Per-class-load transform coordinator.
///
/// Stateless per call and immutable after construction, so a single
/// instance serves concurrent class loads from any number of threads.
pub struct CoverageTransformer {
    runtime: Arc<dyn ProbeRuntime>,
    instrumenter: Arc<dyn Instrumenter>,
    logger: Arc<dyn ExceptionLogger>,
    includes: WildcardMatcher,
    excludes: WildcardMatcher,
    excl_classloader: WildcardMatcher,
    dumper: ClassDumper,
}

impl CoverageTransformer {
    /// Builds a transformer from the given collaborators and options.
    ///
    /// Include and exclude patterns are canonicalized to internal form
    /// before compilation because class names arrive in VM notation;
    /// loader patterns match dotted type names and stay as written.
    pub fn new(
        runtime: Arc<dyn ProbeRuntime>,
        instrumenter: Arc<dyn Instrumenter>,
        options: &AgentOptions,
        logger: Arc<dyn ExceptionLogger>,
    ) -> Self {
        let includes = WildcardMatcher::new(&to_vm_name(&normalize_separators(
            &options.includes,
            logger.as_ref(),
        )));
        let excludes = WildcardMatcher::new(&to_vm_name(&normalize_separators(
            &options.excludes,
            logger.as_ref(),
        )));
        let excl_classloader = WildcardMatcher::new(&normalize_separators(
            &options.excl_classloader,
            logger.as_ref(),
        ));
        let dumper = ClassDumper::new(options.class_dump_dir.clone(), Arc::clone(&logger));
        Self {
            runtime,
            instrumenter,
            logger,
            includes,
            excludes,
            excl_classloader,
            dumper,
        }
    }

    /// Transforms one class.
    ///
    /// Returns `Ok(None)` when the class is not of interest,
    /// `Ok(Some(bytes))` with the instrumented classfile otherwise. Any
    /// failure past the filter surfaces as a [`ClassFormatError`], which
    /// is also reported through the exception logger because the host
    /// runtime swallows transformer faults.
    pub fn transform(&self, class: &ClassIdentity<'_>) -> Result<Option<Vec<u8>>, ClassFormatError> {
        if !self.filter(class.loader, class.name) {
            return Ok(None);
        }

        debug!(class = class.name, size = class.buffer.len(), "transforming class");

        let generated = self.is_generated_class(class);
        self.dumper
            .possibly_dump(class.name, ".class", class.buffer, generated);

        if let Some(redefined) = class.redefined {
            // Probes might have changed shape; stale execution data for
            // the old definition must not leak into the new one.
            self.runtime
                .disconnect(redefined)
                .map_err(|e| self.report(ClassFormatError::wrap(class.name, e)))?;
        }

        classfile::verify_magic(class.buffer)
            .map_err(|e| self.report(ClassFormatError::wrap(class.name, Box::new(e))))?;

        self.instrumenter
            .instrument(class.buffer, class.name)
            .map(Some)
            .map_err(|e| self.report(ClassFormatError::wrap(class.name, e)))
    }

    fn report(&self, error: ClassFormatError) -> ClassFormatError {
        self.logger.log_exception(&error);
        error
    }

    /// Whether this class should be instrumented.
    ///
    /// Conjuncts are ordered so the common "not of interest" path exits
    /// as early and cheaply as possible.
    pub fn filter(&self, loader: Option<&dyn ClassLoader>, class_name: &str) -> bool {
        // Never instrument classes of the bootstrap loader.
        let Some(loader) = loader else { return false };

        !class_name.starts_with(agent_prefix())
            && !self.excl_classloader.matches(loader.type_name())
            && self.includes.matches(class_name)
            && !self.excludes.matches(class_name)
    }

    /// Whether the class is dynamically generated, i.e. has no class
    /// file on disk.
    ///
    /// Heuristic: only decidable on redefinition, where the existing
    /// class handle reveals the declared interfaces - one with a name
    /// starting with [`GENERATED_MARKER_PREFIX`] marks the class as
    /// generated. First-time loads are treated as not generated, as is
    /// any interface lookup fault.
    fn is_generated_class(&self, class: &ClassIdentity<'_>) -> bool {
        let Some(handle) = class.redefined else {
            return false;
        };
        match handle.interface_names() {
            Ok(names) => names
                .iter()
                .any(|name| name.starts_with(GENERATED_MARKER_PREFIX)),
            Err(error) => {
                debug!(class = class.name, %error, "interface lookup failed, treating class as not generated");
                false
            }
        }
    }
}
