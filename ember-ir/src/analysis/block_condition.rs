//! Compute, for every reachable block, the boolean expression describing when control reaches
//! it.
//!
//! Constants are folded first, package wide.  Then every branch gets a table of edge conditions,
//! and a depth first walk from the entry block gives each block the disjunction, over its
//! predecessors, of `pred.condition && edge`.  A loop header ignores its latch, so every block is
//! visited only once all the predecessors it depends on are done.
//!
//! Conditions are detached values: they are built from instructions which never join a block,
//! simplified as they are built.

use ember_error::{
    handler::Handler,
    warning::{BranchKind, CompileWarning, Warning},
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    block::Block,
    constant::Constant,
    context::Context,
    error::IrError,
    function::Function,
    instruction::{BinaryOpKind, Instruction, UnaryOpKind},
    irtype::Type,
    optimize::{fold_binary, fold_constants, fold_unary},
    package::Package,
    value::Value,
    Pass, PassMutability, ScopedPass,
};

pub const BLOCK_CONDITION_NAME: &str = "blockcond";

pub fn create_block_condition_pass() -> Pass {
    Pass {
        name: BLOCK_CONDITION_NAME,
        descr: "compute the reachability condition of every block.",
        runner: ScopedPass::PackagePass(PassMutability::Transform(compute_block_conditions)),
    }
}

pub fn compute_block_conditions(
    context: &mut Context,
    handler: &Handler,
    package: Package,
) -> Result<bool, IrError> {
    let mut modified = fold_constants(context, handler, package)?;
    for function in package.function_iter(context) {
        modified |= compute_function_conditions(context, handler, function);
    }
    Ok(modified)
}

/// The conditions on the edges leaving a block.
enum EdgeConditions {
    /// A jump or an error handler: the block's own condition flows on unchanged.
    Unconditional,
    Conditional(FxHashMap<Block, Value>),
}

fn compute_function_conditions(
    context: &mut Context,
    handler: &Handler,
    function: Function,
) -> bool {
    let entry = function.get_entry_block(context);
    if entry.get_condition(context).is_some() {
        return false;
    }
    tracing::trace!(function = function.get_name(context), "computing block conditions");

    warn_constant_conditions(context, handler, function);

    let mut edges = FxHashMap::default();
    for block in function.block_iter(context) {
        let edge_conds = edge_conditions(context, block);
        edges.insert(block, edge_conds);
    }

    let reachable = reachable_blocks(context, entry);

    let true_val = bool_constant(context, true);
    entry.set_condition(context, true_val);
    entry.set_skip(context, true);

    let mut stack = successors_rev(context, entry);
    let mut waiting: FxHashMap<Block, Vec<Block>> = FxHashMap::default();
    while let Some(block) = stack.pop() {
        if block.is_skip(context) || block.get_condition(context).is_some() {
            continue;
        }

        let preds = merged_predecessors(context, block, &reachable);
        if let Some(pending) = preds
            .iter()
            .find(|pred| pred.get_condition(context).is_none())
        {
            waiting.entry(*pending).or_default().push(block);
            continue;
        }

        let mut cond = None;
        for pred in preds {
            let pred_cond = pred
                .get_condition(context)
                .expect("predecessor condition is computed");
            let incoming = match &edges[&pred] {
                EdgeConditions::Unconditional => pred_cond,
                EdgeConditions::Conditional(conds) => {
                    let edge = *conds.get(&block).unwrap_or_else(|| {
                        panic!(
                            "no edge condition recorded for {} -> {}",
                            pred.get_label(context),
                            block.get_label(context)
                        )
                    });
                    and(context, pred_cond, edge)
                }
            };
            cond = Some(match cond {
                None => incoming,
                Some(acc) => or(context, acc, incoming),
            });
        }
        let cond = cond.unwrap_or_else(|| bool_constant(context, false));
        block.set_condition(context, cond);

        if cond.get_bool_constant(context) == Some(false) {
            warn_unreachable(context, handler, block);
        }

        stack.extend(waiting.remove(&block).unwrap_or_default());
        stack.extend(successors_rev(context, block));
    }
    true
}

/// The predecessors whose conditions are merged into `block`'s.
fn merged_predecessors(
    context: &Context,
    block: Block,
    reachable: &FxHashSet<Block>,
) -> Vec<Block> {
    let latch = match block.get_terminator(context) {
        Some(Instruction::Loop { latch, .. }) => Some(*latch),
        _ => None,
    };
    let mut preds: Vec<Block> = Vec::new();
    for pred in block.pred_iter(context) {
        if Some(*pred) != latch && reachable.contains(pred) && !preds.contains(pred) {
            preds.push(*pred);
        }
    }
    preds
}

fn successors_rev(context: &Context, block: Block) -> Vec<Block> {
    block.succ_iter(context).rev().copied().collect()
}

fn reachable_blocks(context: &Context, entry: Block) -> FxHashSet<Block> {
    let mut reachable = FxHashSet::default();
    let mut stack = vec![entry];
    while let Some(block) = stack.pop() {
        if reachable.insert(block) {
            stack.extend(block.succ_iter(context).copied());
        }
    }
    reachable
}

fn edge_conditions(context: &mut Context, block: Block) -> EdgeConditions {
    let Some(terminator) = block.get_terminator(context).cloned() else {
        return EdgeConditions::Unconditional;
    };
    let mut conds: FxHashMap<Block, Value> = FxHashMap::default();
    let mut add_edge = |context: &mut Context, to: Block, cond: Value| {
        let cond = match conds.get(&to) {
            Some(existing) => or(context, *existing, cond),
            None => cond,
        };
        conds.insert(to, cond);
    };
    match terminator {
        Instruction::If {
            cond,
            true_block,
            false_block,
        } => {
            let not_cond = not(context, cond);
            add_edge(context, true_block, cond);
            add_edge(context, false_block, not_cond);
        }
        Instruction::Loop {
            cond,
            body,
            exit,
            key,
            init,
            ..
        } => {
            let on_entry = match (key, init) {
                (Some(key), Some(init)) => {
                    fold_substituted(context, cond, key, init).and_then(|c| c.as_bool())
                }
                _ => None,
            };
            let (body_cond, exit_cond) = match on_entry {
                Some(false) => (bool_constant(context, false), bool_constant(context, true)),
                Some(true) => (bool_constant(context, true), not(context, cond)),
                None => (cond, not(context, cond)),
            };
            add_edge(context, body, body_cond);
            add_edge(context, exit, exit_cond);
        }
        Instruction::Switch {
            cond,
            default,
            labels,
        } => {
            let mut default_cond = bool_constant(context, true);
            for (label, to) in labels {
                let test = match cond {
                    Some(subject) => eq(context, subject, label),
                    None => label,
                };
                let not_test = not(context, test);
                default_cond = and(context, default_cond, not_test);
                add_edge(context, to, test);
            }
            add_edge(context, default, default_cond);
        }
        Instruction::Jump(_) | Instruction::ErrorHandler { .. } | Instruction::Return(_) => {
            return EdgeConditions::Unconditional
        }
        _ => unreachable!("blocks end in a terminator"),
    }
    EdgeConditions::Conditional(conds)
}

/// Evaluate `value` with `init` in place of `key`, if that makes it a constant.
fn fold_substituted(context: &Context, value: Value, key: Value, init: Value) -> Option<Constant> {
    if value == key {
        return init.get_constant(context).cloned();
    }
    if let Some(c) = value.get_constant(context) {
        return Some(c.clone());
    }
    match value.get_instruction(context)? {
        Instruction::BinaryOp { op, arg1, arg2 } => {
            let lhs = fold_substituted(context, *arg1, key, init)?;
            let rhs = fold_substituted(context, *arg2, key, init)?;
            fold_binary(context, *op, &lhs, &rhs)
        }
        Instruction::UnaryOp { op, arg } => {
            let arg = fold_substituted(context, *arg, key, init)?;
            fold_unary(context, *op, &arg)
        }
        _ => None,
    }
}

fn bool_constant(context: &mut Context, value: bool) -> Value {
    let c = Constant::new_bool(context, value);
    Value::new_constant(context, c, None)
}

fn detached(context: &mut Context, ins: Instruction) -> Value {
    let value = Value::new_instruction(context, ins, None);
    let ty = Type::get_bool(context);
    value.set_type(context, ty);
    value
}

fn not(context: &mut Context, value: Value) -> Value {
    if let Some(b) = value.get_bool_constant(context) {
        return bool_constant(context, !b);
    }
    if let Some(Instruction::UnaryOp {
        op: UnaryOpKind::Not,
        arg,
    }) = value.get_instruction(context)
    {
        return *arg;
    }
    detached(
        context,
        Instruction::UnaryOp {
            op: UnaryOpKind::Not,
            arg: value,
        },
    )
}

fn and(context: &mut Context, lhs: Value, rhs: Value) -> Value {
    match (lhs.get_bool_constant(context), rhs.get_bool_constant(context)) {
        (Some(true), _) => rhs,
        (_, Some(true)) => lhs,
        (Some(false), _) => lhs,
        (_, Some(false)) => rhs,
        _ if lhs == rhs => lhs,
        _ => detached(
            context,
            Instruction::BinaryOp {
                op: BinaryOpKind::LogicalAnd,
                arg1: lhs,
                arg2: rhs,
            },
        ),
    }
}

fn or(context: &mut Context, lhs: Value, rhs: Value) -> Value {
    match (lhs.get_bool_constant(context), rhs.get_bool_constant(context)) {
        (Some(false), _) => rhs,
        (_, Some(false)) => lhs,
        (Some(true), _) => lhs,
        (_, Some(true)) => rhs,
        _ if lhs == rhs => lhs,
        _ => detached(
            context,
            Instruction::BinaryOp {
                op: BinaryOpKind::LogicalOr,
                arg1: lhs,
                arg2: rhs,
            },
        ),
    }
}

fn eq(context: &mut Context, lhs: Value, rhs: Value) -> Value {
    if let (Some(l), Some(r)) = (lhs.get_constant(context), rhs.get_constant(context)) {
        if let Some(folded) = fold_binary(context, BinaryOpKind::Eq, l, r) {
            return Value::new_constant(context, folded, None);
        }
    }
    detached(
        context,
        Instruction::BinaryOp {
            op: BinaryOpKind::Eq,
            arg1: lhs,
            arg2: rhs,
        },
    )
}

fn warn_constant_conditions(context: &Context, handler: &Handler, function: Function) {
    for block in function.block_iter(context) {
        let (cond, construct) = match block.get_terminator(context) {
            Some(Instruction::If { cond, .. }) => (*cond, BranchKind::If),
            Some(Instruction::Loop { cond, .. }) => (*cond, BranchKind::Loop),
            Some(Instruction::Switch {
                cond: Some(cond), ..
            }) => (*cond, BranchKind::Switch),
            _ => continue,
        };
        if !cond.is_constant(context) {
            continue;
        }
        if let Some(span) = cond.get_span(context) {
            handler.emit_warn(CompileWarning {
                span,
                warning_content: Warning::ConditionIsConst { construct },
            });
        }
    }
}

fn warn_unreachable(context: &Context, handler: &Handler, block: Block) {
    let span = block
        .instruction_iter(context)
        .find_map(|ins| ins.get_span(context).filter(|span| !span.is_dummy()));
    if let Some(span) = span {
        handler.emit_warn(CompileWarning {
            span,
            warning_content: Warning::BlockUnreachable,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::function_to_string;
    use ember_types::Span;

    fn constant(context: &mut Context, c: Constant, span: Option<Span>) -> Value {
        Value::new_constant(context, c, span)
    }

    /// `if c { } ` with `c` a parameter: the true block gets `c`, the merge gets `true`.
    #[test]
    fn if_conditions() {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        let main = Function::new(&mut context, package, "main".to_owned(), None, None);
        let c = main.add_param(&mut context, "c".to_owned(), None);
        let entry = main.get_entry_block(&context);
        let then_block = main.create_block(&mut context, Some("if.true".to_owned()));
        let done = main.create_block(&mut context, Some("if.done".to_owned()));
        entry.append(&mut context).branch_if(c, then_block, done);
        then_block.append(&mut context).jump(done);
        done.append(&mut context).ret(vec![]);

        let handler = Handler::default();
        assert!(compute_block_conditions(&mut context, &handler, package).unwrap());
        assert_eq!(then_block.get_condition(&context), Some(c));
        let done_cond = done.get_condition(&context).unwrap();
        // c || !c is left alone; only the structure is checked here.
        assert!(matches!(
            done_cond.get_instruction(&context),
            Some(Instruction::BinaryOp {
                op: BinaryOpKind::LogicalOr,
                ..
            })
        ));
        assert!(function_to_string(&context, main).contains("if.true: ; preds: entry ; cond: c"));
        assert!(!handler.has_warnings());

        // Running again changes nothing.
        assert!(!compute_block_conditions(&mut context, &handler, package).unwrap());
    }

    #[test]
    fn constant_false_branch_is_unreachable() {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        let main = Function::new(&mut context, package, "main".to_owned(), None, None);
        let entry = main.get_entry_block(&context);
        let then_block = main.create_block(&mut context, Some("if.true".to_owned()));
        let done = main.create_block(&mut context, Some("if.done".to_owned()));

        let src: std::sync::Arc<str> = "if 1 > 2 { a = 3 }".into();
        let cond_span = Span::new(src.clone(), 3, 8, None);
        let body_span = Span::new(src, 11, 16, None);
        let one = Constant::new_number(&context, 1);
        let one = constant(&mut context, one, None);
        let two = Constant::new_number(&context, 2);
        let two = constant(&mut context, two, None);
        let cond = entry
            .append(&mut context)
            .with_span(cond_span)
            .binary_op(BinaryOpKind::Gt, one, two);
        entry.append(&mut context).branch_if(cond, then_block, done);
        then_block
            .append(&mut context)
            .with_span(body_span)
            .jump(done);
        done.append(&mut context).ret(vec![]);

        let handler = Handler::default();
        compute_block_conditions(&mut context, &handler, package).unwrap();
        assert_eq!(
            then_block
                .get_condition(&context)
                .and_then(|c| c.get_bool_constant(&context)),
            Some(false)
        );
        assert_eq!(
            done.get_condition(&context)
                .and_then(|c| c.get_bool_constant(&context)),
            Some(true)
        );
        let warnings = handler
            .warnings()
            .into_iter()
            .map(|w| w.warning_content)
            .collect::<Vec<_>>();
        assert_eq!(
            warnings,
            vec![
                Warning::ConditionIsConst {
                    construct: BranchKind::If
                },
                Warning::BlockUnreachable
            ]
        );
    }

    /// `for i = 0; i < 10; i++ {}`: the latch is ignored at the header and the initializer proves
    /// the body is entered.
    #[test]
    fn loop_latch_is_ignored() {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        let main = Function::new(&mut context, package, "main".to_owned(), None, None);
        let entry = main.get_entry_block(&context);
        let header = main.create_block(&mut context, Some("loop.header".to_owned()));
        let body = main.create_block(&mut context, Some("loop.body".to_owned()));
        let latch = main.create_block(&mut context, Some("loop.latch".to_owned()));
        let exit = main.create_block(&mut context, Some("loop.exit".to_owned()));

        let zero = Constant::new_number(&context, 0);
        let zero = constant(&mut context, zero, None);
        let ten = Constant::new_number(&context, 10);
        let ten = constant(&mut context, ten, None);
        let one = Constant::new_number(&context, 1);
        let one = constant(&mut context, one, None);

        let phi = Value::new_instruction(
            &mut context,
            Instruction::Phi {
                name: "i".to_owned(),
                edges: vec![],
            },
            None,
        );
        header.add_phi(&mut context, phi);

        entry.append(&mut context).jump(header);
        body.append(&mut context).jump(latch);
        let inc = latch
            .append(&mut context)
            .binary_op(BinaryOpKind::Add, phi, one);
        latch.append(&mut context).jump(header);
        if let Some(Instruction::Phi { edges, .. }) = phi.get_instruction_mut(&mut context) {
            *edges = vec![zero, inc];
        }

        let cond = header
            .append(&mut context)
            .binary_op(BinaryOpKind::Lt, phi, ten);
        let branch = header.append(&mut context).loop_branch(cond, body, exit, latch);
        if let Some(Instruction::Loop { key, init, .. }) = branch.get_instruction_mut(&mut context)
        {
            *key = Some(phi);
            *init = Some(zero);
        }
        exit.append(&mut context).ret(vec![]);
        context.verify().unwrap();

        let handler = Handler::default();
        compute_block_conditions(&mut context, &handler, package).unwrap();

        let header_cond = header.get_condition(&context).unwrap();
        assert_eq!(header_cond.get_bool_constant(&context), Some(true));
        assert_eq!(
            body.get_condition(&context)
                .and_then(|c| c.get_bool_constant(&context)),
            Some(true)
        );
        assert_eq!(latch.get_condition(&context), body.get_condition(&context));
        let exit_cond = exit.get_condition(&context).unwrap();
        assert!(matches!(
            exit_cond.get_instruction(&context),
            Some(Instruction::UnaryOp {
                op: UnaryOpKind::Not,
                ..
            })
        ));
        assert!(!handler.has_warnings());
    }

    #[test]
    fn switch_default_negates_every_case() {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        let main = Function::new(&mut context, package, "main".to_owned(), None, None);
        let x = main.add_param(&mut context, "x".to_owned(), None);
        let entry = main.get_entry_block(&context);
        let case1 = main.create_block(&mut context, Some("switch.case".to_owned()));
        let default = main.create_block(&mut context, Some("switch.default".to_owned()));
        let done = main.create_block(&mut context, Some("switch.done".to_owned()));
        let one = Constant::new_number(&context, 1);
        let one = constant(&mut context, one, None);
        let two = Constant::new_number(&context, 2);
        let two = constant(&mut context, two, None);
        entry
            .append(&mut context)
            .switch(Some(x), default, vec![(one, case1), (two, case1)]);
        case1.append(&mut context).jump(done);
        default.append(&mut context).jump(done);
        done.append(&mut context).ret(vec![]);

        let handler = Handler::default();
        compute_block_conditions(&mut context, &handler, package).unwrap();
        let text = function_to_string(&context, main);
        assert!(text.contains("switch.case: ; preds: entry ; cond: lor(eq(x, 1), eq(x, 2))"));
        assert!(text.contains(
            "switch.default: ; preds: entry ; cond: land(not(eq(x, 1)), not(eq(x, 2)))"
        ));
    }
}
