use ember_error::handler::Handler;
use ember_types::FxIndexMap;
use itertools::Itertools;

use crate::{
    analysis::{
        create_block_condition_pass, create_type_check_pass, create_type_inference_pass,
        BLOCK_CONDITION_NAME, TYPE_CHECK_NAME, TYPE_INFERENCE_NAME,
    },
    optimize::create_const_fold_pass,
    Context, Function, IrError, Package,
};

/// Program scope over which a pass executes.
pub trait PassScope: Copy {}
impl PassScope for Package {}
impl PassScope for Function {}

/// Is a pass an Analysis or a Transformation over the IR?
///
/// Analyses only read the IR and report through the [`Handler`].  Transforms may rewrite it and
/// record their results on the IR itself, and return whether anything changed.
pub enum PassMutability<S: PassScope> {
    Analysis(fn(&Context, &Handler, S) -> Result<(), IrError>),
    Transform(fn(&mut Context, &Handler, S) -> Result<bool, IrError>),
}

/// A concrete version of [`PassScope`].
pub enum ScopedPass {
    PackagePass(PassMutability<Package>),
    FunctionPass(PassMutability<Function>),
}

pub struct Pass {
    pub name: &'static str,
    pub descr: &'static str,
    pub runner: ScopedPass,
}

impl Pass {
    pub fn is_analysis(&self) -> bool {
        match &self.runner {
            ScopedPass::PackagePass(pm) => matches!(pm, PassMutability::Analysis(_)),
            ScopedPass::FunctionPass(pm) => matches!(pm, PassMutability::Analysis(_)),
        }
    }

    pub fn is_transform(&self) -> bool {
        !self.is_analysis()
    }
}

#[derive(Default)]
pub struct PassManager {
    passes: FxIndexMap<&'static str, Pass>,
}

impl PassManager {
    /// Register a pass. Should be called only once for each pass.
    pub fn register(&mut self, pass: Pass) -> &'static str {
        let pass_name = pass.name;
        if self.passes.contains_key(pass_name) {
            panic!("Trying to register an already registered pass");
        }
        self.passes.insert(pass_name, pass);
        pass_name
    }

    /// Run the passes specified in `config`, in order, over every package.
    pub fn run(
        &mut self,
        ir: &mut Context,
        handler: &Handler,
        config: &PassManagerConfig,
    ) -> Result<bool, IrError> {
        let mut modified = false;
        for pass in &config.to_run {
            for package in ir.package_iter() {
                modified |= self.run_pass(ir, handler, pass, package)?;
            }
        }
        Ok(modified)
    }

    /// Run the passes specified in `config`, in order, over `package` alone.
    pub fn run_on_package(
        &mut self,
        ir: &mut Context,
        handler: &Handler,
        config: &PassManagerConfig,
        package: Package,
    ) -> Result<bool, IrError> {
        let mut modified = false;
        for pass in &config.to_run {
            modified |= self.run_pass(ir, handler, pass, package)?;
        }
        Ok(modified)
    }

    fn run_pass(
        &self,
        ir: &mut Context,
        handler: &Handler,
        pass: &str,
        package: Package,
    ) -> Result<bool, IrError> {
        let pass_t = self
            .passes
            .get(pass)
            .ok_or_else(|| IrError::UnregisteredPass(pass.to_owned()))?;
        tracing::debug!(pass = pass_t.name, package = package.get_name(ir), "running pass");
        let mut modified = false;
        match &pass_t.runner {
            ScopedPass::PackagePass(pm) => match pm {
                PassMutability::Analysis(analysis) => analysis(ir, handler, package)?,
                PassMutability::Transform(transform) => {
                    modified |= transform(ir, handler, package)?;
                }
            },
            ScopedPass::FunctionPass(fp) => {
                for function in package.function_iter(ir) {
                    match fp {
                        PassMutability::Analysis(analysis) => analysis(ir, handler, function)?,
                        PassMutability::Transform(transform) => {
                            modified |= transform(ir, handler, function)?;
                        }
                    }
                }
            }
        }
        Ok(modified)
    }

    /// Is `name` a registered pass?
    pub fn is_registered(&self, name: &str) -> bool {
        self.passes.contains_key(name)
    }

    pub fn help_text(&self) -> String {
        let summary = self
            .passes
            .iter()
            .map(|(name, pass)| format!("  {name:16} - {}", pass.descr))
            .join("\n");

        format!("Valid pass names are:\n\n{summary}",)
    }
}

/// Configuration for the pass manager to run passes.
pub struct PassManagerConfig {
    pub to_run: Vec<String>,
}

/// A convenience utility to register known passes.
pub fn register_known_passes(pm: &mut PassManager) {
    pm.register(create_const_fold_pass());
    pm.register(create_block_condition_pass());
    pm.register(create_type_inference_pass());
    pm.register(create_type_check_pass());
}

/// The analyses every compiled program goes through, in order.
pub fn create_analysis_pipeline() -> PassManagerConfig {
    PassManagerConfig {
        to_run: [BLOCK_CONDITION_NAME, TYPE_INFERENCE_NAME, TYPE_CHECK_NAME]
            .into_iter()
            .map(str::to_owned)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_pass_is_an_error() {
        let mut pm = PassManager::default();
        register_known_passes(&mut pm);
        assert!(pm.is_registered(TYPE_CHECK_NAME));
        assert!(pm.help_text().contains(BLOCK_CONDITION_NAME));

        let mut context = Context::new();
        let handler = Handler::default();
        let config = PassManagerConfig {
            to_run: vec!["inline".to_owned()],
        };
        assert_eq!(
            pm.run(&mut context, &handler, &config),
            Err(IrError::UnregisteredPass("inline".to_owned()))
        );
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn double_registration_panics() {
        let mut pm = PassManager::default();
        pm.register(create_type_check_pass());
        pm.register(create_type_check_pass());
    }
}
