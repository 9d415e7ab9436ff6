//! The driver: parse, build and analyze sources into one IR [`Context`].

use std::{path::Path, path::PathBuf, sync::Arc};

use ember_ast::{FrontEnd, Module};
use ember_error::{diagnostic::Diagnostic, error::CompileError, handler::Handler};
use ember_ir::{
    package_to_string, register_known_passes, Context, IrError, Package, PassManager,
    PassManagerConfig,
};
use ember_types::{SourceEngine, Span};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::{
    build_config::BuildConfig,
    ir_generation::{compile_module, IncludeResolver},
    source::{SourceFile, SourceLoader},
};

/// Every package built so far, with the diagnostics found while building and analyzing them.
///
/// Files are remembered by path and content hash; building an unchanged file again is skipped.
pub struct Program {
    context: Context,
    handler: Handler,
    source_engine: SourceEngine,
    file_hashes: FxHashMap<PathBuf, String>,
    front_end: Box<dyn FrontEnd>,
    loader: Box<dyn SourceLoader>,
}

impl Program {
    pub fn new(front_end: impl FrontEnd + 'static, loader: impl SourceLoader + 'static) -> Self {
        Program {
            context: Context::new(),
            handler: Handler::default(),
            source_engine: SourceEngine::default(),
            file_hashes: FxHashMap::default(),
            front_end: Box::new(front_end),
            loader: Box::new(loader),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn source_engine(&self) -> &SourceEngine {
        &self.source_engine
    }

    /// Every diagnostic so far, in the order found.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.handler.diagnostics()
    }

    /// Build and analyze the source text `src` as a package named `name`.
    ///
    /// Returns `None` when the source did not parse.  Problems in the program itself are
    /// diagnostics; `Err` is only for a broken pipeline, such as an unknown pass or IR failing
    /// verification.
    pub fn compile_source(
        &mut self,
        name: &str,
        src: Arc<str>,
        config: &BuildConfig,
    ) -> Result<Option<Package>, IrError> {
        let Ok(module) = self.front_end.parse(&self.handler, src, None) else {
            return Ok(None);
        };
        self.compile_parsed(name, &module, config).map(Some)
    }

    /// Load, build and analyze the file at `path`.
    ///
    /// Returns `None` when the file could not be loaded or parsed, or is unchanged since it was
    /// last built.
    pub fn compile_file(
        &mut self,
        path: &Path,
        config: &BuildConfig,
    ) -> Result<Option<Package>, IrError> {
        let path_str = path.to_string_lossy();
        let file = match self.loader.load(&path_str) {
            Ok(file) => file,
            Err(reason) => {
                self.handler.emit_err(CompileError::IncludeFailed {
                    path: path_str.into_owned(),
                    reason,
                    span: Span::dummy(),
                });
                return Ok(None);
            }
        };
        if !record_file(&mut self.file_hashes, &file) {
            debug!(path = %file.path.display(), "unchanged, not building again");
            return Ok(None);
        }

        let source_id = self.source_engine.get_source_id(&file.path);
        let Ok(module) = self
            .front_end
            .parse(&self.handler, file.text, Some(source_id))
        else {
            return Ok(None);
        };
        let name = file
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_str.into_owned());
        self.compile_parsed(&name, &module, config).map(Some)
    }

    fn compile_parsed(
        &mut self,
        name: &str,
        module: &Module,
        config: &BuildConfig,
    ) -> Result<Package, IrError> {
        let externs = config.externs().resolve(&mut self.context)?;
        let mut includes = Includes {
            front_end: self.front_end.as_ref(),
            loader: self.loader.as_ref(),
            source_engine: &self.source_engine,
            file_hashes: &mut self.file_hashes,
        };
        let package = compile_module(
            &mut self.context,
            &self.handler,
            &externs,
            &mut includes,
            name,
            module,
        );

        if config.print_ir {
            info!("IR for {name}:\n{}", package_to_string(&self.context, package));
        }
        if config.verify_ir {
            self.context.verify()?;
        }

        let mut pass_manager = PassManager::default();
        register_known_passes(&mut pass_manager);
        for pass in &config.passes {
            let pass_config = PassManagerConfig {
                to_run: vec![pass.clone()],
            };
            let modified = pass_manager.run_on_package(
                &mut self.context,
                &self.handler,
                &pass_config,
                package,
            )?;
            if modified && config.verify_ir {
                self.context.verify()?;
            }
            if config.print_ir_after_passes {
                info!(
                    "IR for {name} after {pass}:\n{}",
                    package_to_string(&self.context, package)
                );
            }
        }
        Ok(package)
    }
}

/// Record `file` as built.  Returns false if it already was, with the same contents.
fn record_file(file_hashes: &mut FxHashMap<PathBuf, String>, file: &SourceFile) -> bool {
    if file_hashes.get(&file.path) == Some(&file.hash) {
        return false;
    }
    file_hashes.insert(file.path.clone(), file.hash.clone());
    true
}

/// Resolves `include`s through the program's loader and front-end.
struct Includes<'a> {
    front_end: &'a dyn FrontEnd,
    loader: &'a dyn SourceLoader,
    source_engine: &'a SourceEngine,
    file_hashes: &'a mut FxHashMap<PathBuf, String>,
}

impl IncludeResolver for Includes<'_> {
    fn resolve(&mut self, handler: &Handler, path: &str, span: &Span) -> Option<Module> {
        let file = match self.loader.load(path) {
            Ok(file) => file,
            Err(reason) => {
                handler.emit_err(CompileError::IncludeFailed {
                    path: path.to_owned(),
                    reason,
                    span: span.clone(),
                });
                return None;
            }
        };
        if !record_file(self.file_hashes, &file) {
            debug!(path = %file.path.display(), "include unchanged, skipping");
            return None;
        }
        let source_id = self.source_engine.get_source_id(&file.path);
        self.front_end
            .parse(handler, file.text, Some(source_id))
            .ok()
    }
}
