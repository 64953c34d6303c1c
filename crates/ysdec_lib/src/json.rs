use serde_json::{Value, json};

use crate::instruction::Instruction;
use crate::variable::VarInfo;

fn operand(inst: Option<&Instruction>) -> Value {
    inst.map_or(Value::Null, ast_to_json)
}

fn variable_fields(mode: u8, var: &VarInfo) -> serde_json::Map<String, Value> {
    let mut m = serde_json::Map::new();
    m.insert("mode".into(), json!((mode as char).to_string()));
    m.insert("name".into(), json!(var.display_name()));
    m.insert("scope".into(), json!(var.scope.to_string()));
    m.insert("variableId".into(), json!(var.variable_id));
    m.insert("scriptIndex".into(), json!(var.script_index));
    m.insert("type".into(), json!(var.var_type));
    m.insert("dimensions".into(), json!(var.dimensions));
    m
}

fn literal(literal_type: &str, value: Value) -> Value {
    json!({ "kind": "Literal", "literalType": literal_type, "value": value })
}

/// Serializes an expression tree as nested objects tagged with `kind`.
pub fn ast_to_json(inst: &Instruction) -> Value {
    match inst {
        Instruction::Arithmetic(a) => json!({
            "kind": "Arithmetic",
            "op": a.op.symbol(),
            "negate": a.negate,
            "left": operand(a.left.as_deref()),
            "right": operand(a.right.as_deref()),
        }),
        Instruction::Relational(r) => json!({
            "kind": "Relational",
            "op": r.op.symbol(),
            "left": operand(r.left.as_deref()),
            "right": operand(r.right.as_deref()),
        }),
        Instruction::Logical(l) => json!({
            "kind": "Logical",
            "op": l.op.symbol(),
            "left": operand(l.left.as_deref()),
            "right": operand(l.right.as_deref()),
        }),
        Instruction::Unary(u) => json!({
            "kind": "Unary",
            "op": u.op.to_string(),
            "operand": operand(u.operand.as_deref()),
        }),
        Instruction::VariableAccess(v) => {
            let mut m = variable_fields(v.mode, &v.var);
            m.insert("kind".into(), json!("VariableAccess"));
            m.insert("negate".into(), json!(v.negate));
            Value::Object(m)
        }
        Instruction::VariableRef(v) => {
            let mut m = variable_fields(v.mode, &v.var);
            m.insert("kind".into(), json!("VariableRef"));
            Value::Object(m)
        }
        Instruction::ArrayAccess(a) => {
            let variable = match &a.variable {
                Some(v) => {
                    let mut m = variable_fields(v.mode, &v.var);
                    m.insert("kind".into(), json!("VariableRef"));
                    Value::Object(m)
                }
                None => Value::Null,
            };
            let indices: Vec<Value> = a.indices.iter().map(ast_to_json).collect();
            json!({
                "kind": "ArrayAccess",
                "negate": a.negate,
                "variable": variable,
                "indices": indices,
            })
        }
        Instruction::KeywordRef(name) => json!({ "kind": "KeywordRef", "name": name }),
        Instruction::RawStr(s) => json!({ "kind": "RawString", "value": s }),
        Instruction::Byte(v) => literal("byte", json!(v)),
        Instruction::Short(v) => literal("short", json!(v)),
        Instruction::Int(v) => literal("int", json!(v)),
        Instruction::Long(v) => literal("long", json!(v)),
        Instruction::Decimal(v) => literal("double", json!(v)),
        Instruction::Str(s) => literal("string", json!(s)),
        Instruction::Nop => json!({ "kind": "Nop" }),
    }
}
