use std::error::Error as StdError;
use std::fmt::{self, Write as _};

use thiserror::Error;

use crate::eval::EvalContext;
use crate::expr::ResultType;
use crate::instruction::Instruction;

const RENDER_FAILED: &str = "<failed to render>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    StackUnderflow,
    UnterminatedArrayAccess,
    UnsupportedNegateTarget,
    NonSingularResult,
    /// Any failure not raised by the evaluator itself.
    Unhandled,
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StackUnderflow => "stack underflow",
            Self::UnterminatedArrayAccess => "unterminated array access",
            Self::UnsupportedNegateTarget => "unsupported negate target",
            Self::NonSingularResult => "non-singular result",
            Self::Unhandled => "unhandled exception",
        };
        f.write_str(s)
    }
}

/// Where in the pass the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Instruction(usize),
    /// The final single-root check after the whole list was consumed.
    PostPass,
    /// Not attributable to one instruction.
    Outside,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instruction(i) => write!(f, "{i}"),
            Self::PostPass => f.write_str("<post-pass>"),
            Self::Outside => f.write_str("<n/a>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub kind: &'static str,
    pub text: String,
}

impl NodeSnapshot {
    /// Captures a node's kind and text. A node that fails to format gets a
    /// placeholder instead of aborting the report.
    pub fn capture(inst: &Instruction) -> Self {
        let mut text = String::new();
        if write!(text, "{inst}").is_err() {
            text = RENDER_FAILED.to_string();
        }
        Self {
            kind: inst.kind(),
            text,
        }
    }
}

impl fmt::Display for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentContext {
    pub keyword: Option<String>,
    pub load_op: String,
    pub result_type: ResultType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub reason: String,
    pub position: Position,
    pub current: Option<NodeSnapshot>,
    pub script_id: i32,
    pub assignment: Option<AssignmentContext>,
    /// Evaluator stack, top first.
    pub stack: Vec<NodeSnapshot>,
    pub instructions: Vec<NodeSnapshot>,
}

impl DiagnosticReport {
    pub fn capture(
        reason: impl Into<String>,
        position: Position,
        current: Option<&Instruction>,
        ctx: &EvalContext<'_>,
        stack: &[Instruction],
        instructions: &[Instruction],
    ) -> Self {
        let assignment = ctx.assignment.map(|a| AssignmentContext {
            keyword: a.info.keyword.clone(),
            load_op: a.load_op.clone(),
            result_type: a.info.result_type,
        });
        Self {
            reason: reason.into(),
            position,
            current: current.map(NodeSnapshot::capture),
            script_id: ctx.script_id,
            assignment,
            stack: stack.iter().rev().map(NodeSnapshot::capture).collect(),
            instructions: instructions.iter().map(NodeSnapshot::capture).collect(),
        }
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EVAL_DIAGNOSTIC")?;
        writeln!(f, "Reason: {}", self.reason)?;
        writeln!(f, "At instruction index: {}", self.position)?;
        match &self.current {
            Some(c) => writeln!(f, "Current instruction: {c}")?,
            None => writeln!(f, "Current instruction: <none>")?,
        }
        writeln!(f, "ScriptId: {}", self.script_id)?;
        match &self.assignment {
            Some(a) => writeln!(
                f,
                "Expr: Keyword='{}', LoadOp='{}', ResultType='{:?}'",
                a.keyword.as_deref().unwrap_or(""),
                a.load_op,
                a.result_type
            )?,
            None => writeln!(f, "Expr: <no-assign-context>")?,
        }
        writeln!(f, "StackCount: {}", self.stack.len())?;
        if self.stack.is_empty() {
            writeln!(f, "Stack Snapshot (top first): <empty>")?;
        } else {
            let entries: Vec<String> = self.stack.iter().map(|s| s.to_string()).collect();
            writeln!(f, "Stack Snapshot (top first): {}", entries.join(" | "))?;
        }
        write!(f, "Instruction List:")?;
        for (i, inst) in self.instructions.iter().enumerate() {
            write!(f, "\n[{i}] {}: {}", inst.kind, inst.text)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
#[error("{kind}: {}", .report.reason)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub report: Box<DiagnosticReport>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, report: DiagnosticReport) -> Self {
        Self {
            kind,
            report: Box::new(report),
            source: None,
        }
    }

    /// Wraps a foreign failure, keeping it as the underlying cause.
    pub fn unhandled(
        report: DiagnosticReport,
        cause: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            kind: EvalErrorKind::Unhandled,
            report: Box::new(report),
            source: Some(cause.into()),
        }
    }

    /// Full human-readable report.
    pub fn diagnostic(&self) -> String {
        let mut out = self.report.to_string();
        if let Some(cause) = &self.source {
            out.push_str(&format!("\nCaused by: {cause}"));
        }
        out
    }
}
