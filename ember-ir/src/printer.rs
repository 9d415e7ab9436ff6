//! Print IR to human readable text.
//!
//! This module implements a small document based pretty-printer.  The output is deterministic
//! so it can be checked with `filecheck` directives in tests.

use rustc_hash::FxHashMap;

use crate::{
    block::Block,
    context::Context,
    function::Function,
    instruction::{Instruction, UndefineKind},
    package::Package,
    value::{Value, ValueDatum},
};

#[derive(Debug)]
enum Doc {
    Empty,
    Text(String),
    Line(Box<Doc>),
    Pair(Box<Doc>, Box<Doc>),
    List(Vec<Doc>),
    Indent(i64, Box<Doc>),
}

impl Doc {
    fn line(doc: Doc) -> Self {
        Doc::Line(Box::new(doc))
    }

    fn text_line<S: Into<String>>(s: S) -> Self {
        Doc::Line(Box::new(Doc::Text(s.into())))
    }

    fn indent(n: i64, doc: Doc) -> Doc {
        Doc::Indent(n, Box::new(doc))
    }

    fn append(self, doc: Doc) -> Doc {
        match (&self, &doc) {
            (Doc::Empty, _) => doc,
            (_, Doc::Empty) => self,
            _ => Doc::Pair(Box::new(self), Box::new(doc)),
        }
    }

    fn build(self) -> String {
        build_doc(self, 0)
    }
}

/// Pretty-print a whole [`Context`] to a string.
pub fn to_string(context: &Context) -> String {
    context
        .package_iter()
        .fold(Doc::Empty, |doc, package| {
            doc.append(package_to_doc(context, package))
        })
        .build()
}

/// Pretty-print a single [`Package`].
pub fn package_to_string(context: &Context, package: Package) -> String {
    package_to_doc(context, package).build()
}

/// Pretty-print a single [`Function`].
pub fn function_to_string(context: &Context, function: Function) -> String {
    function_to_doc(context, function).build()
}

fn package_to_doc(context: &Context, package: Package) -> Doc {
    Doc::text_line(format!("package {}", package.get_name(context))).append(Doc::List(
        package
            .function_iter(context)
            .map(|function| Doc::line(Doc::Empty).append(function_to_doc(context, function)))
            .collect(),
    ))
}

fn function_to_doc(context: &Context, function: Function) -> Doc {
    let namer = Namer::new(context, function);
    let content = &context.functions[function.0];
    let last = content.params.len().saturating_sub(1);
    let params = content
        .params
        .iter()
        .enumerate()
        .map(|(idx, param)| {
            let name = namer.operand(context, param);
            if content.variadic && idx == last {
                format!("{name}...")
            } else {
                name
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let sig = content
        .ty
        .and_then(|ty| ty.get_function_type(context))
        .map(|fn_ty| format!(" -> {}", fn_ty.ret.as_string(context)))
        .unwrap_or_default();
    let parent = content
        .parent
        .map(|parent| format!(" in {}", parent.get_name(context)))
        .unwrap_or_default();

    let header = Doc::text_line(format!("fn {}({params}){sig}{parent} {{", content.name));

    let free_values = Doc::List(
        content
            .free_values
            .iter()
            .map(|(name, val)| {
                let captured = match val.get_datum(context) {
                    ValueDatum::FreeValue {
                        captured: Some(_), ..
                    } => "",
                    _ => " unbound",
                };
                Doc::text_line(format!("free {name}{captured}"))
            })
            .collect(),
    );
    let side_effects = Doc::List(
        content
            .side_effects
            .iter()
            .map(|(name, val)| {
                Doc::text_line(format!("side_effect {name} = {}", namer.operand(context, val)))
            })
            .collect(),
    );
    let blocks = Doc::List(
        content
            .blocks
            .iter()
            .map(|block| block_to_doc(context, &namer, *block))
            .collect(),
    );

    header
        .append(Doc::indent(
            4,
            free_values.append(side_effects).append(blocks),
        ))
        .append(Doc::text_line("}"))
}

fn block_to_doc(context: &Context, namer: &Namer, block: Block) -> Doc {
    let content = &context.blocks[block.0];
    let preds = if content.preds.is_empty() {
        String::new()
    } else {
        format!(
            " ; preds: {}",
            content
                .preds
                .iter()
                .map(|pred| pred.get_label(context))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    let cond = content
        .condition
        .map(|cond| format!(" ; cond: {}", namer.operand(context, &cond)))
        .unwrap_or_default();
    let header = Doc::text_line(format!("{}:{preds}{cond}", content.label));
    let body = content
        .phis
        .iter()
        .chain(content.instructions.iter())
        .map(|ins| Doc::text_line(instruction_to_string(context, namer, block, ins)))
        .collect();
    header.append(Doc::indent(4, Doc::List(body)))
}

fn instruction_to_string(context: &Context, namer: &Namer, block: Block, ins: &Value) -> String {
    let Some(instruction) = ins.get_instruction(context) else {
        return namer.operand(context, ins);
    };
    let lhs = namer.name(ins);
    let op = |val: &Value| namer.operand(context, val);
    match instruction {
        Instruction::Undefine { name, kind } => match kind {
            UndefineKind::Unresolved => format!("{lhs} = undefine {name}"),
            UndefineKind::Declared => format!("{lhs} = undefine {name} declared"),
        },
        Instruction::BinaryOp { op: kind, arg1, arg2 } => {
            format!("{lhs} = {kind} {}, {}", op(arg1), op(arg2))
        }
        Instruction::UnaryOp { op: kind, arg } => format!("{lhs} = {kind} {}", op(arg)),
        Instruction::Phi { name, edges } => {
            let preds = &context.blocks[block.0].preds;
            let edges = edges
                .iter()
                .enumerate()
                .map(|(idx, edge)| {
                    let from = preds
                        .get(idx)
                        .map(|pred| pred.get_label(context))
                        .unwrap_or_else(|| "?".to_owned());
                    format!("{from}: {}", op(edge))
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{lhs} = phi {name} [{edges}]")
        }
        Instruction::Call {
            callee,
            args,
            ellipsis,
            drop_error,
            is_async,
            unpack,
            binding,
        } => {
            let mut args = args.iter().map(op).collect::<Vec<_>>();
            if *ellipsis {
                if let Some(last) = args.last_mut() {
                    last.push_str("...");
                }
            }
            let mut text = format!(
                "{lhs} = {}call {}({})",
                if *is_async { "go " } else { "" },
                op(callee),
                args.join(", ")
            );
            if *drop_error {
                text.push('~');
            }
            if let Some(count) = unpack {
                text.push_str(&format!(" unpack {count}"));
            }
            if !binding.is_empty() {
                let binds = binding
                    .iter()
                    .map(|(name, val)| format!("{name}: {}", op(val)))
                    .collect::<Vec<_>>()
                    .join(", ");
                text.push_str(&format!(" bind [{binds}]"));
            }
            text
        }
        Instruction::Field {
            object,
            key,
            is_method,
        } => format!(
            "{lhs} = {} {}, {}",
            if *is_method { "method" } else { "field" },
            op(object),
            op(key)
        ),
        Instruction::Update { object, key, value } => {
            format!("{lhs} = update {}, {}, {}", op(object), op(key), op(value))
        }
        Instruction::Make { ty, len, cap, .. } => {
            let mut text = format!("{lhs} = make {}", ty.as_string(context));
            for hint in len.iter().chain(cap.iter()) {
                text.push_str(&format!(", {}", op(hint)));
            }
            text
        }
        Instruction::Next { iter } => format!("{lhs} = next {}", op(iter)),
        Instruction::SideEffect { name, call, value } => {
            format!("{lhs} = side_effect {name} = {} after {}", op(value), op(call))
        }
        Instruction::ErrorCatch { try_block } => {
            format!("{lhs} = catch {}", try_block.get_label(context))
        }
        Instruction::Slice {
            object,
            low,
            high,
            max,
        } => {
            let bound = |val: &Option<Value>| val.as_ref().map(op).unwrap_or_default();
            let mut text = format!("{lhs} = slice {}[{}:{}", op(object), bound(low), bound(high));
            if max.is_some() {
                text.push_str(&format!(":{}", bound(max)));
            }
            text.push(']');
            text
        }
        Instruction::Send { chan, value } => format!("{lhs} = send {}, {}", op(chan), op(value)),
        Instruction::Assert { cond, msg } => match msg {
            Some(msg) => format!("{lhs} = assert {}, {}", op(cond), op(msg)),
            None => format!("{lhs} = assert {}", op(cond)),
        },
        Instruction::Panic(value) => format!("{lhs} = panic {}", op(value)),
        Instruction::Recover => format!("{lhs} = recover"),
        Instruction::Jump(to) => format!("jmp {}", to.get_label(context)),
        Instruction::If {
            cond,
            true_block,
            false_block,
        } => format!(
            "if {}, {}, {}",
            op(cond),
            true_block.get_label(context),
            false_block.get_label(context)
        ),
        Instruction::Loop {
            cond,
            body,
            exit,
            latch,
            key,
            init,
        } => {
            let mut text = format!(
                "loop {}, {}, {}, latch {}",
                op(cond),
                body.get_label(context),
                exit.get_label(context),
                latch.get_label(context)
            );
            if let (Some(key), Some(init)) = (key, init) {
                text.push_str(&format!(", key {} = {}", op(key), op(init)));
            }
            text
        }
        Instruction::Switch {
            cond,
            default,
            labels,
        } => {
            let labels = labels
                .iter()
                .map(|(label, block)| format!("{}: {}", op(label), block.get_label(context)))
                .collect::<Vec<_>>()
                .join(", ");
            let cond = cond.map(|cond| format!("{} ", op(&cond))).unwrap_or_default();
            format!(
                "switch {cond}[{labels}], default {}",
                default.get_label(context)
            )
        }
        Instruction::ErrorHandler {
            try_block,
            catch_block,
        } => format!(
            "try {}, catch {}",
            try_block.get_label(context),
            catch_block.get_label(context)
        ),
        Instruction::Return(values) => {
            if values.is_empty() {
                "ret".to_owned()
            } else {
                format!(
                    "ret {}",
                    values.iter().map(op).collect::<Vec<_>>().join(", ")
                )
            }
        }
    }
}

struct Namer {
    names: FxHashMap<Value, String>,
}

impl Namer {
    /// Number every phi and instruction of `function` up front, so forward references print
    /// the same name as their definition.
    fn new(context: &Context, function: Function) -> Self {
        let names = function
            .instruction_iter(context)
            .into_iter()
            .enumerate()
            .map(|(idx, (_, value))| (value, format!("v{idx}")))
            .collect();
        Namer { names }
    }

    fn name(&self, value: &Value) -> String {
        self.names
            .get(value)
            .cloned()
            .unwrap_or_else(|| "v?".to_owned())
    }

    fn operand(&self, context: &Context, value: &Value) -> String {
        if let Some(name) = self.names.get(value) {
            return name.clone();
        }
        match value.get_datum(context) {
            ValueDatum::Constant(c) => c.as_lit_string(),
            ValueDatum::Parameter { name, .. } => name.clone(),
            ValueDatum::FreeValue { name, .. } => format!("%{name}"),
            ValueDatum::Function(function) => format!("fn {}", function.get_name(context)),
            ValueDatum::Extern { name } => format!("@{name}"),
            // Detached instructions are block conditions; print them as expressions.
            ValueDatum::Instruction(Instruction::BinaryOp { op, arg1, arg2 }) => format!(
                "{op}({}, {})",
                self.operand(context, arg1),
                self.operand(context, arg2)
            ),
            ValueDatum::Instruction(Instruction::UnaryOp { op, arg }) => {
                format!("{op}({})", self.operand(context, arg))
            }
            ValueDatum::Instruction(_) => "v?".to_owned(),
        }
    }
}

fn build_doc(doc: Doc, indent: i64) -> String {
    match doc {
        Doc::Empty => "".into(),
        Doc::Text(t) => t,
        Doc::Line(d) => {
            if matches!(*d, Doc::Empty) {
                "\n".into()
            } else {
                format!("{}{}\n", " ".repeat(indent as usize), build_doc(*d, indent))
            }
        }
        Doc::Pair(l, r) => [build_doc(*l, indent), build_doc(*r, indent)].concat(),
        Doc::List(v) => v
            .into_iter()
            .map(|d| build_doc(d, indent))
            .collect::<Vec<String>>()
            .concat(),
        Doc::Indent(n, d) => build_doc(*d, indent + n),
    }
}
