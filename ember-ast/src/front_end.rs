use std::sync::Arc;

use ember_error::handler::{ErrorEmitted, Handler};
use ember_types::SourceId;

use crate::Module;

/// A source-language front-end producing the syntax tree the builder consumes.
///
/// Syntax errors are emitted into `handler`; `Err` means no usable tree was produced.
pub trait FrontEnd {
    fn parse(
        &self,
        handler: &Handler,
        src: Arc<str>,
        source_id: Option<SourceId>,
    ) -> Result<Module, ErrorEmitted>;
}
