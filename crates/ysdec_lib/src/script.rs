use std::collections::HashMap;
use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::decode::Decoder;
use crate::diagnostic::EvalError;
use crate::expr::{ExpressionInfo, ExpressionInstructionSet, OwnerRef};
use crate::json::ast_to_json;

const INDENT: usize = 4;

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error(
        "script {script_id}: command {command_index} ({command}), expression {expression_index}: {source}"
    )]
    Expression {
        script_id: i32,
        command_index: usize,
        command: String,
        expression_index: usize,
        #[source]
        source: EvalError,
    },

    #[error("invalid project dump: {0}")]
    Dump(#[from] serde_json::Error),
}

impl DecompileError {
    /// Full evaluator report, when the failure came from an expression.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            DecompileError::Expression { source, .. } => Some(source.diagnostic()),
            DecompileError::Dump(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDump {
    pub name: String,
    pub command_index: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionDump {
    #[serde(default)]
    pub id: u8,
    #[serde(default)]
    pub flag: u8,
    #[serde(default)]
    pub arg_load_fn: u8,
    #[serde(default)]
    pub arg_load_op: u8,
    /// Present for assignment-style expressions.
    #[serde(default)]
    pub info: Option<ExpressionInfo>,
    #[serde(default)]
    pub load_op: Option<String>,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDump {
    pub name: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub line_number: u32,
    #[serde(default)]
    pub label_id: u32,
    #[serde(default)]
    pub expressions: Vec<ExpressionDump>,
}

/// One compiled script as handed over by the container loaders.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDump {
    pub script_id: i32,
    pub source: String,
    #[serde(default)]
    pub labels: Vec<LabelDump>,
    #[serde(default)]
    pub commands: Vec<CommandDump>,
}

#[derive(Debug, Clone)]
pub struct DecompiledExpression {
    pub id: u8,
    pub flag: u8,
    pub arg_load_fn: u8,
    pub arg_load_op: u8,
    pub set: ExpressionInstructionSet,
}

impl Serialize for DecompiledExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("DecompiledExpression", 7)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("flag", &self.flag)?;
        s.serialize_field("argLoadFn", &self.arg_load_fn)?;
        s.serialize_field("argLoadOp", &self.arg_load_op)?;
        s.serialize_field(
            "loadOp",
            &self.set.assignment_info().map(|a| a.load_op.as_str()),
        )?;
        s.serialize_field("text", &self.set.to_string())?;
        s.serialize_field("ast", &self.set.root().map(ast_to_json))?;
        s.end()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompiledCommand {
    pub index: usize,
    #[serde(rename = "id")]
    pub name: String,
    #[serde(rename = "idNumeric")]
    pub code: u32,
    pub expr_count: usize,
    pub label_id: u32,
    pub line_number: u32,
    /// Nesting depth the command line is printed at.
    pub nest: usize,
    pub labels: Vec<String>,
    pub expressions: Vec<DecompiledExpression>,
}

impl fmt::Display for DecompiledCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.name)?;
        for (i, e) in self.expressions.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", e.set)?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompiledScript {
    pub script_id: i32,
    pub source: String,
    pub commands: Vec<DecompiledCommand>,
}

impl DecompiledScript {
    /// Script text, one command per line, block bodies indented.
    ///
    /// The trailing `END[]` every compiled script carries is not printed.
    pub fn render_text(&self) -> String {
        let mut commands: &[DecompiledCommand] = &self.commands;
        if let Some((last, rest)) = commands.split_last() {
            if last.name == "END" && last.expressions.is_empty() && last.labels.is_empty() {
                commands = rest;
            }
        }
        if commands.is_empty() {
            return "//Empty file.".to_string();
        }

        let mut out = String::new();
        for cmd in commands {
            for label in &cmd.labels {
                out.push_str(&format!("#={label}\n"));
            }
            out.push_str(&" ".repeat(cmd.nest * INDENT));
            out.push_str(&cmd.to_string());
            out.push('\n');
        }
        out
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Tracks block nesting across commands.
#[derive(Debug, Default)]
struct NestTracker {
    depth: usize,
}

impl NestTracker {
    /// Returns the depth `name` is printed at and updates the running depth.
    fn enter(&mut self, name: &str) -> usize {
        match name {
            "IF" | "LOOP" => {
                let at = self.depth;
                self.depth += 1;
                at
            }
            "ELSE" => self.depth.saturating_sub(1),
            "IFEND" | "LOOPEND" => {
                self.depth = self.depth.saturating_sub(1);
                self.depth
            }
            _ => self.depth,
        }
    }
}

/// Reconstructs every expression of `script`.
///
/// The first expression that fails aborts the script.
#[tracing::instrument(level = "debug", skip_all, fields(script_id = script.script_id))]
pub fn decompile_script(
    script: &ScriptDump,
    decoder: &dyn Decoder,
) -> Result<DecompiledScript, DecompileError> {
    let mut labels: HashMap<usize, Vec<String>> = HashMap::new();
    for l in &script.labels {
        labels.entry(l.command_index).or_default().push(l.name.clone());
    }

    let mut nest = NestTracker::default();
    let mut commands = Vec::with_capacity(script.commands.len());

    for (ci, cmd) in script.commands.iter().enumerate() {
        let mut expressions = Vec::with_capacity(cmd.expressions.len());
        for (ei, e) in cmd.expressions.iter().enumerate() {
            let owner = OwnerRef {
                command_index: ci,
                expression_index: ei,
            };
            let mut set = match &e.info {
                Some(info) => ExpressionInstructionSet::assignment(
                    script.script_id,
                    info.clone(),
                    e.load_op.as_deref().unwrap_or("="),
                ),
                None => ExpressionInstructionSet::new(script.script_id),
            }
            .with_owner(owner);

            set.get_instructions(&e.bytes, decoder)
                .map_err(|source| DecompileError::Expression {
                    script_id: script.script_id,
                    command_index: ci,
                    command: cmd.name.clone(),
                    expression_index: ei,
                    source,
                })?;

            expressions.push(DecompiledExpression {
                id: e.id,
                flag: e.flag,
                arg_load_fn: e.arg_load_fn,
                arg_load_op: e.arg_load_op,
                set,
            });
        }

        commands.push(DecompiledCommand {
            index: ci,
            name: cmd.name.clone(),
            code: cmd.code,
            expr_count: expressions.len(),
            label_id: cmd.label_id,
            line_number: cmd.line_number,
            nest: nest.enter(&cmd.name),
            labels: labels.remove(&ci).unwrap_or_default(),
            expressions,
        });
    }

    tracing::debug!(commands = commands.len(), "script decompiled");

    Ok(DecompiledScript {
        script_id: script.script_id,
        source: script.source.clone(),
        commands,
    })
}
