use std::error::Error as StdError;

use crate::diagnostic::{DiagnosticReport, EvalError, EvalErrorKind, Position};
use crate::expr::Assignment;
use crate::instruction::{ArrayAccess, Instruction, NegateError, UnaryOp, UnaryOperator};

/// What the evaluator knows about the expression it reduces.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub script_id: i32,
    /// Present for assignment expressions.
    pub assignment: Option<&'a Assignment>,
}

enum Failure {
    Eval(EvalError),
    Foreign(Box<dyn StdError + Send + Sync + 'static>),
}

impl From<EvalError> for Failure {
    fn from(e: EvalError) -> Self {
        Failure::Eval(e)
    }
}

struct StackEvaluator<'a> {
    instructions: &'a [Instruction],
    ctx: EvalContext<'a>,
    stack: Vec<Instruction>,
}

impl<'a> StackEvaluator<'a> {
    fn fail(
        &self,
        kind: EvalErrorKind,
        reason: impl Into<String>,
        position: Position,
        current: Option<&Instruction>,
    ) -> Failure {
        let report = DiagnosticReport::capture(
            reason,
            position,
            current,
            &self.ctx,
            &self.stack,
            self.instructions,
        );
        Failure::Eval(EvalError::new(kind, report))
    }

    fn run(&mut self) -> Result<Instruction, Failure> {
        let instructions = self.instructions;
        for (idx, inst) in instructions.iter().enumerate() {
            match inst {
                Instruction::Nop => continue,
                Instruction::Arithmetic(op) => {
                    let (left, right) = self.pop_operands(idx, inst)?;
                    let mut node = op.clone();
                    node.attach(left, right);
                    self.stack.push(Instruction::Arithmetic(node));
                }
                Instruction::Relational(op) => {
                    let (left, right) = self.pop_operands(idx, inst)?;
                    let mut node = op.clone();
                    node.attach(left, right);
                    self.stack.push(Instruction::Relational(node));
                }
                Instruction::Logical(op) => {
                    let (left, right) = self.pop_operands(idx, inst)?;
                    let mut node = op.clone();
                    node.attach(left, right);
                    self.stack.push(Instruction::Logical(node));
                }
                Instruction::Unary(u) if u.op == UnaryOp::Negate => self.negate_top(idx, inst)?,
                Instruction::Unary(u) => {
                    let Some(operand) = self.stack.pop() else {
                        return Err(self.fail(
                            EvalErrorKind::StackUnderflow,
                            "unary operator requires 1 operand, stack underflow",
                            Position::Instruction(idx),
                            Some(inst),
                        ));
                    };
                    self.stack.push(Instruction::Unary(UnaryOperator {
                        op: u.op,
                        operand: Some(Box::new(operand)),
                    }));
                }
                Instruction::ArrayAccess(_) => self.reduce_array_access(idx, inst)?,
                operand => self.stack.push(operand.clone()),
            }
        }

        if self.stack.len() != 1 {
            return Err(self.fail(
                EvalErrorKind::NonSingularResult,
                format!(
                    "expression did not resolve to a single value (stack count={})",
                    self.stack.len()
                ),
                Position::PostPass,
                None,
            ));
        }
        match self.stack.pop() {
            Some(root) => Ok(root),
            None => Err(Failure::Foreign("evaluator stack emptied unexpectedly".into())),
        }
    }

    /// Pops `(left, right)` for a binary operator.
    ///
    /// With a single operand inside an assignment expression the left side is
    /// the assignment target itself (compound assignment bytecode omits it).
    fn pop_operands(
        &mut self,
        idx: usize,
        inst: &Instruction,
    ) -> Result<(Instruction, Instruction), Failure> {
        if self.stack.len() >= 2 {
            if let (Some(right), Some(left)) = (self.stack.pop(), self.stack.pop()) {
                return Ok((left, right));
            }
        }
        if self.stack.len() == 1 {
            if let Some(assignment) = self.ctx.assignment {
                if let Some(right) = self.stack.pop() {
                    let keyword = assignment.info.keyword.clone().unwrap_or_default();
                    return Ok((Instruction::KeywordRef(keyword), right));
                }
            }
        }
        Err(self.fail(
            EvalErrorKind::StackUnderflow,
            format!("{} requires 2 operands, stack underflow", inst.kind()),
            Position::Instruction(idx),
            Some(inst),
        ))
    }

    fn negate_top(&mut self, idx: usize, inst: &Instruction) -> Result<(), Failure> {
        let result = match self.stack.last_mut() {
            Some(top) => top.negate(),
            None => {
                return Err(self.fail(
                    EvalErrorKind::StackUnderflow,
                    "negate operator requires 1 operand, stack underflow",
                    Position::Instruction(idx),
                    Some(inst),
                ));
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(NegateError::Unsupported(kind)) => Err(self.fail(
                EvalErrorKind::UnsupportedNegateTarget,
                format!("selected object ({kind}) does not support negate operator"),
                Position::Instruction(idx),
                Some(inst),
            )),
            Err(e @ NegateError::Overflow(_)) => Err(Failure::Foreign(Box::new(e))),
        }
    }

    /// Pops indices until the `VariableRef` base and pushes the resolved
    /// access with its indices in source order.
    fn reduce_array_access(&mut self, idx: usize, inst: &Instruction) -> Result<(), Failure> {
        let mut indices = Vec::new();
        let base = loop {
            match self.stack.pop() {
                Some(Instruction::VariableRef(v)) => break v,
                Some(other) => indices.push(other),
                None => {
                    // Put the popped indices back so the report shows the
                    // stack as it was when the token was reached.
                    self.stack.extend(indices.into_iter().rev());
                    return Err(self.fail(
                        EvalErrorKind::UnterminatedArrayAccess,
                        "array access missing VariableRef before indices are exhausted",
                        Position::Instruction(idx),
                        Some(inst),
                    ));
                }
            }
        };
        indices.reverse();
        self.stack
            .push(Instruction::ArrayAccess(ArrayAccess::resolved(base, indices)));
        Ok(())
    }
}

/// Reduces `instructions` to a single root node.
///
/// The flat list is left untouched so a failure can dump it in full.
pub fn evaluate(
    instructions: &[Instruction],
    ctx: EvalContext<'_>,
) -> Result<Instruction, EvalError> {
    let mut ev = StackEvaluator {
        instructions,
        ctx,
        stack: Vec::new(),
    };
    match ev.run() {
        Ok(root) => Ok(root),
        Err(Failure::Eval(e)) => Err(e),
        Err(Failure::Foreign(cause)) => {
            let report = DiagnosticReport::capture(
                "unhandled exception during evaluation",
                Position::Outside,
                None,
                &ev.ctx,
                &ev.stack,
                instructions,
            );
            Err(EvalError::unhandled(report, cause))
        }
    }
}
