use rustc_hash::FxHashMap;

use crate::{context::Context, package::Package, value::Value, ValueDatum};

/// Who reads each value in a package.
///
/// Instructions reading a value are recorded in order.  Capture edges of free values and
/// recorded side effects are uses too, but have no user instruction, so they are only counted.
#[derive(Default, Debug)]
pub struct UseMap {
    users: FxHashMap<Value, Vec<Value>>,
    other_uses: FxHashMap<Value, usize>,
}

impl UseMap {
    pub fn compute(context: &Context, package: Package) -> Self {
        let mut use_map = UseMap::default();
        for function in package.function_iter(context) {
            for (_, ins_val) in function.instruction_iter(context) {
                let Some(ins) = ins_val.get_instruction(context) else {
                    continue;
                };
                for operand in ins.get_operands() {
                    let users = use_map.users.entry(operand).or_default();
                    if !users.contains(&ins_val) {
                        users.push(ins_val);
                    }
                }
            }
            for (_, free_value) in function.free_values_iter(context) {
                if let ValueDatum::FreeValue {
                    captured: Some(captured),
                    ..
                } = free_value.get_datum(context)
                {
                    *use_map.other_uses.entry(*captured).or_default() += 1;
                }
            }
            for (_, value) in function.side_effects_iter(context) {
                *use_map.other_uses.entry(value).or_default() += 1;
            }
        }
        use_map
    }

    /// The instructions reading `value`.
    pub fn users(&self, value: Value) -> &[Value] {
        self.users.get(&value).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn use_count(&self, value: Value) -> usize {
        self.users(value).len() + self.other_uses.get(&value).copied().unwrap_or(0)
    }

    pub fn is_used(&self, value: Value) -> bool {
        self.use_count(value) > 0
    }
}
