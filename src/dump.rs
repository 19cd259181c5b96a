//! Bytecode dumps for generated classes.
//!
//! Dynamically generated classes have no source artifact a coverage
//! report could point back to, so when a dump directory is configured
//! their raw bytecode is preserved on disk for later disassembly. The
//! filesystem doubles as the dedup ledger: the presence of
//! `<dir>/<name>.class` means "already dumped".

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::ExceptionLogger;

/// Writes raw bytecode to the configured dump directory, at most once
/// per class name.
///
/// Dumping is observational only - every I/O failure is reported through
/// the exception logger and swallowed, never failing the transform.
pub struct ClassDumper {
    dump_dir: Option<PathBuf>,
    logger: Arc<dyn ExceptionLogger>,
}

impl ClassDumper {
    pub fn new(dump_dir: Option<PathBuf>, logger: Arc<dyn ExceptionLogger>) -> Self {
        Self { dump_dir, logger }
    }

    /// Dumps `bytecode` to `<dump_dir>/<name><suffix>` if a dump
    /// directory is configured, the class is flagged generated, and the
    /// file does not already exist.
    ///
    /// Two threads racing on the same generated class both write the
    /// identical raw bytes, so the create race is benign.
    pub fn possibly_dump(&self, name: &str, suffix: &str, bytecode: &[u8], generated: bool) {
        let Some(dir) = &self.dump_dir else { return };
        if !generated {
            return;
        }
        let file = dir.join(format!("{name}{suffix}"));
        if file.exists() {
            return;
        }
        info!(class = name, file = %file.display(), "dumping class bytecode");
        let result = file
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(&file, bytecode));
        if let Err(err) = result {
            self.logger.log_exception(&err);
        }
    }
}
