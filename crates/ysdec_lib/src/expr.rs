use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decode::{Decoder, decode_into};
use crate::diagnostic::{DiagnosticReport, EvalError, Position};
use crate::eval::{EvalContext, evaluate};
use crate::instruction::Instruction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultType {
    #[default]
    Any,
    Int,
    Decimal,
    String,
}

/// Assignment target description from the command table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionInfo {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub result_type: ResultType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub info: ExpressionInfo,
    /// `=` or a compound spelling such as `+=`.
    pub load_op: String,
}

impl Assignment {
    pub fn new(info: ExpressionInfo, load_op: impl Into<String>) -> Self {
        Self {
            info,
            load_op: load_op.into(),
        }
    }

    /// Target keyword, `None` when absent or empty.
    pub fn keyword(&self) -> Option<&str> {
        self.info.keyword.as_deref().filter(|k| !k.is_empty())
    }

    pub fn is_string(&self) -> bool {
        self.info.result_type == ResultType::String
    }
}

/// The command expression an instruction set was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerRef {
    pub command_index: usize,
    pub expression_index: usize,
}

/// Instructions of one expression: the flat decoded list until evaluation,
/// then the single root node.
#[derive(Debug, Clone)]
pub struct ExpressionInstructionSet {
    script_id: i32,
    owner: Option<OwnerRef>,
    assignment: Option<Assignment>,
    instructions: Vec<Instruction>,
    root: Option<Instruction>,
}

impl ExpressionInstructionSet {
    pub fn new(script_id: i32) -> Self {
        Self {
            script_id,
            owner: None,
            assignment: None,
            instructions: Vec::new(),
            root: None,
        }
    }

    pub fn assignment(script_id: i32, info: ExpressionInfo, load_op: impl Into<String>) -> Self {
        Self {
            assignment: Some(Assignment::new(info, load_op)),
            ..Self::new(script_id)
        }
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn script_id(&self) -> i32 {
        self.script_id
    }

    pub fn owner(&self) -> Option<OwnerRef> {
        self.owner
    }

    pub fn assignment_info(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    /// The flat list still waiting for evaluation.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn push(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    pub fn root(&self) -> Option<&Instruction> {
        self.root.as_ref()
    }

    pub fn into_root(self) -> Option<Instruction> {
        self.root
    }

    fn context(&self) -> EvalContext<'_> {
        EvalContext {
            script_id: self.script_id,
            assignment: self.assignment.as_ref(),
        }
    }

    /// Decodes `data` and reduces it to the root node.
    ///
    /// String-typed assignments skip the opcode decoder entirely: the whole
    /// slice is one raw string.
    pub fn get_instructions(
        &mut self,
        data: &[u8],
        decoder: &dyn Decoder,
    ) -> Result<&Instruction, EvalError> {
        if self.assignment.as_ref().is_some_and(Assignment::is_string) {
            self.instructions = vec![Instruction::RawStr(decoder.decode_text(data))];
            return self.evaluate();
        }

        self.instructions.clear();
        if let Err(e) = decode_into(decoder, data, &mut self.instructions) {
            let ctx = self.context();
            let report = DiagnosticReport::capture(
                "unhandled exception during decode",
                Position::Outside,
                None,
                &ctx,
                &[],
                &self.instructions,
            );
            return Err(EvalError::unhandled(report, e));
        }
        self.evaluate()
    }

    /// Reduces the flat list. On success the list is consumed and the root
    /// replaces it.
    pub fn evaluate(&mut self) -> Result<&Instruction, EvalError> {
        let root = evaluate(&self.instructions, self.context())?;
        self.instructions = Vec::new();
        Ok(self.root.insert(root))
    }
}

impl fmt::Display for ExpressionInstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let Some(keyword) = self.assignment.as_ref().and_then(Assignment::keyword) else {
            return write!(f, "{root}");
        };
        let load_op = self.assignment.as_ref().map_or("=", |a| a.load_op.as_str());
        // Array-typed variable values are written with "()".
        let suffix = if root.variable().is_some_and(|v| v.is_array()) {
            "()"
        } else {
            ""
        };
        write!(f, "{keyword}{load_op}{root}{suffix}")
    }
}
