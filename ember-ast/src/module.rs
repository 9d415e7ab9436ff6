use crate::priv_prelude::*;

/// One parsed source unit.
#[derive(Clone, Debug)]
pub struct Module {
    pub statements: Vec<Statement>,
    pub span: Span,
}

impl Spanned for Module {
    fn span(&self) -> Span {
        self.span.clone()
    }
}
