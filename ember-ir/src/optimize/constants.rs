//! Compile time evaluation of constant expressions.
//!
//! A `BinaryOp` or `UnaryOp` whose operands are all constants is replaced by its result
//! everywhere in the package, including in the closures which capture it, and then removed.
//! Folding repeats until nothing changes, so chains of constant expressions collapse entirely.

use ember_error::handler::Handler;

use crate::{
    constant::{Constant, ConstantValue},
    context::Context,
    error::IrError,
    instruction::{BinaryOpKind, Instruction, UnaryOpKind},
    package::Package,
    value::Value,
    Pass, PassMutability, ScopedPass,
};

pub const CONSTFOLD_NAME: &str = "constfold";

pub fn create_const_fold_pass() -> Pass {
    Pass {
        name: CONSTFOLD_NAME,
        descr: "constant folding.",
        runner: ScopedPass::PackagePass(PassMutability::Transform(fold_constants)),
    }
}

/// Fold every constant expression in `package`.
pub fn fold_constants(
    context: &mut Context,
    _: &Handler,
    package: Package,
) -> Result<bool, IrError> {
    let mut modified = false;
    while let Some((block, ins_val, folded)) = find_foldable(context, package) {
        let span = ins_val.get_span(context);
        let folded_val = Value::new_constant(context, folded, span);
        block.remove_instruction(context, ins_val);
        package.replace_value(context, ins_val, folded_val);
        modified = true;
    }
    Ok(modified)
}

fn find_foldable(
    context: &Context,
    package: Package,
) -> Option<(crate::block::Block, Value, Constant)> {
    package.function_iter(context).find_map(|function| {
        function
            .instruction_iter(context)
            .into_iter()
            .find_map(|(block, ins_val)| {
                fold_instruction(context, ins_val).map(|folded| (block, ins_val, folded))
            })
    })
}

/// The constant `value` evaluates to, when it is an operation over constants.
pub fn fold_instruction(context: &Context, value: Value) -> Option<Constant> {
    match value.get_instruction(context)? {
        Instruction::BinaryOp { op, arg1, arg2 } => fold_binary(
            context,
            *op,
            arg1.get_constant(context)?,
            arg2.get_constant(context)?,
        ),
        Instruction::UnaryOp { op, arg } => fold_unary(context, *op, arg.get_constant(context)?),
        _ => None,
    }
}

pub fn fold_binary(
    context: &Context,
    op: BinaryOpKind,
    lhs: &Constant,
    rhs: &Constant,
) -> Option<Constant> {
    use BinaryOpKind::*;
    use ConstantValue as C;

    let value = match (op, &lhs.value, &rhs.value) {
        (Eq, l, r) => C::Bool(l.eq_value(r)),
        (Ne, l, r) => C::Bool(!l.eq_value(r)),

        (LogicalAnd, C::Bool(l), C::Bool(r)) => C::Bool(*l && *r),
        (LogicalOr, C::Bool(l), C::Bool(r)) => C::Bool(*l || *r),

        (Add, C::String(l), C::String(r)) => C::String(format!("{l}{r}")),
        (Lt | Le | Gt | Ge, C::String(l), C::String(r)) => C::Bool(compare(op, l, r)),

        (_, C::Number(l), C::Number(r)) => fold_integers(op, *l, *r)?,
        (_, C::Number(_) | C::Float(_), C::Number(_) | C::Float(_)) => {
            fold_floats(op, as_float(&lhs.value)?, as_float(&rhs.value)?)?
        }
        _ => return None,
    };
    Some(Constant::new(context, value))
}

pub fn fold_unary(context: &Context, op: UnaryOpKind, arg: &Constant) -> Option<Constant> {
    use ConstantValue as C;

    let value = match (op, &arg.value) {
        (UnaryOpKind::Not, C::Bool(b)) => C::Bool(!b),
        (UnaryOpKind::Neg, C::Number(n)) => C::Number(n.checked_neg()?),
        (UnaryOpKind::Neg, C::Float(f)) => C::Float(-f),
        (UnaryOpKind::Plus, C::Number(_) | C::Float(_)) => arg.value.clone(),
        (UnaryOpKind::BitNot, C::Number(n)) => C::Number(!n),
        _ => return None,
    };
    Some(Constant::new(context, value))
}

fn fold_integers(op: BinaryOpKind, l: i64, r: i64) -> Option<ConstantValue> {
    use BinaryOpKind::*;

    let n = match op {
        Add => l.checked_add(r)?,
        Sub => l.checked_sub(r)?,
        Mul => l.checked_mul(r)?,
        Div => l.checked_div(r)?,
        Mod => l.checked_rem(r)?,
        And => l & r,
        Or => l | r,
        Xor => l ^ r,
        AndNot => l & !r,
        Shl => l.checked_shl(u32::try_from(r).ok()?)?,
        Shr => l.checked_shr(u32::try_from(r).ok()?)?,
        Lt | Le | Gt | Ge => return Some(ConstantValue::Bool(compare(op, &l, &r))),
        Eq | Ne | LogicalAnd | LogicalOr | In => return None,
    };
    Some(ConstantValue::Number(n))
}

fn fold_floats(op: BinaryOpKind, l: f64, r: f64) -> Option<ConstantValue> {
    use BinaryOpKind::*;

    let f = match op {
        Add => l + r,
        Sub => l - r,
        Mul => l * r,
        Div if r != 0.0 => l / r,
        Lt => return Some(ConstantValue::Bool(l < r)),
        Le => return Some(ConstantValue::Bool(l <= r)),
        Gt => return Some(ConstantValue::Bool(l > r)),
        Ge => return Some(ConstantValue::Bool(l >= r)),
        _ => return None,
    };
    Some(ConstantValue::Float(f))
}

fn as_float(value: &ConstantValue) -> Option<f64> {
    match value {
        ConstantValue::Number(n) => Some(*n as f64),
        ConstantValue::Float(f) => Some(*f),
        _ => None,
    }
}

fn compare<T: PartialOrd + ?Sized>(op: BinaryOpKind, l: &T, r: &T) -> bool {
    match op {
        BinaryOpKind::Lt => l < r,
        BinaryOpKind::Le => l <= r,
        BinaryOpKind::Gt => l > r,
        BinaryOpKind::Ge => l >= r,
        _ => unreachable!("only orderings are compared"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{function::Function, printer::function_to_string};
    use pretty_assertions::assert_eq;

    fn number(context: &Context, n: i64) -> Constant {
        Constant::new_number(context, n)
    }

    #[test]
    fn folds_arithmetic_and_comparisons() {
        let context = Context::new();
        let fold = |op, l, r| {
            fold_binary(&context, op, &number(&context, l), &number(&context, r))
                .map(|c| c.value)
        };
        assert_eq!(fold(BinaryOpKind::Add, 1, 2), Some(ConstantValue::Number(3)));
        assert_eq!(fold(BinaryOpKind::Lt, 1, 2), Some(ConstantValue::Bool(true)));
        assert_eq!(fold(BinaryOpKind::Eq, 2, 2), Some(ConstantValue::Bool(true)));
        assert_eq!(fold(BinaryOpKind::Div, 1, 0), None);
        assert_eq!(fold(BinaryOpKind::Add, i64::MAX, 1), None);

        let half = Constant::new(&context, ConstantValue::Float(0.5));
        assert_eq!(
            fold_binary(&context, BinaryOpKind::Add, &number(&context, 1), &half).map(|c| c.value),
            Some(ConstantValue::Float(1.5))
        );
        let hello = Constant::new_string(&context, "hello ".to_owned());
        let world = Constant::new_string(&context, "world".to_owned());
        assert_eq!(
            fold_binary(&context, BinaryOpKind::Add, &hello, &world).map(|c| c.value),
            Some(ConstantValue::String("hello world".to_owned()))
        );
        let yes = Constant::new_bool(&context, true);
        assert_eq!(
            fold_unary(&context, UnaryOpKind::Not, &yes).map(|c| c.value),
            Some(ConstantValue::Bool(false))
        );
        assert_eq!(fold_unary(&context, UnaryOpKind::Neg, &yes), None);
    }

    #[test]
    fn folds_chains_across_the_package() {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        let main = Function::new(&mut context, package, "main".to_owned(), None, None);
        let entry = main.get_entry_block(&context);

        let one = Constant::new_number(&context, 1);
        let one = Value::new_constant(&mut context, one, None);
        let two = Constant::new_number(&context, 2);
        let two = Value::new_constant(&mut context, two, None);
        let sum = entry.append(&mut context).binary_op(BinaryOpKind::Add, one, two);
        let cmp = entry.append(&mut context).binary_op(BinaryOpKind::Gt, sum, one);
        entry.append(&mut context).ret(vec![cmp]);

        let handler = Handler::default();
        assert!(fold_constants(&mut context, &handler, package).unwrap());
        assert!(!fold_constants(&mut context, &handler, package).unwrap());

        let expected = "fn main() {\n    entry:\n        ret true\n}\n";
        assert_eq!(function_to_string(&context, main), expected);
    }
}
