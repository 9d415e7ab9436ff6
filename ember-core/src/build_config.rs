use std::sync::Arc;

use ember_ir::{create_analysis_pipeline, PassManagerConfig};

use crate::externs::ExternTable;

/// Configuration for building and analyzing a program.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    // Print the IR once built, before any pass runs.
    pub(crate) print_ir: bool,
    // Print the IR after each pass.
    pub(crate) print_ir_after_passes: bool,
    // Verify the IR after building and after each transform.
    pub(crate) verify_ir: bool,
    // Passes to run, by name, in order.
    pub(crate) passes: Vec<String>,
    pub(crate) externs: Arc<ExternTable>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            print_ir: false,
            print_ir_after_passes: false,
            verify_ir: true,
            passes: create_analysis_pipeline().to_run,
            externs: Arc::new(ExternTable::default()),
        }
    }
}

impl BuildConfig {
    pub fn with_print_ir(self, print_ir: bool) -> Self {
        Self { print_ir, ..self }
    }

    pub fn with_print_ir_after_passes(self, print_ir_after_passes: bool) -> Self {
        Self {
            print_ir_after_passes,
            ..self
        }
    }

    pub fn with_verify_ir(self, verify_ir: bool) -> Self {
        Self { verify_ir, ..self }
    }

    /// Replace the pass pipeline.  An empty list only builds the IR.
    pub fn with_passes<S: Into<String>>(self, passes: impl IntoIterator<Item = S>) -> Self {
        Self {
            passes: passes.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_externs(self, externs: ExternTable) -> Self {
        Self {
            externs: Arc::new(externs),
            ..self
        }
    }

    pub fn externs(&self) -> &ExternTable {
        &self.externs
    }

    pub fn pass_config(&self) -> PassManagerConfig {
        PassManagerConfig {
            to_run: self.passes.clone(),
        }
    }
}
