use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::variable::VarInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOp {
    pub fn from_opcode_name(name: &str) -> Option<Self> {
        Some(match name {
            "add" => Self::Add,
            "sub" => Self::Sub,
            "mul" => Self::Mul,
            "div" => Self::Div,
            "mod" => Self::Mod,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationalOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl RelationalOp {
    pub fn from_opcode_name(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => Self::Equal,
            "neq" => Self::NotEqual,
            "lt" => Self::Less,
            "lte" => Self::LessEqual,
            "gt" => Self::Greater,
            "gte" => Self::GreaterEqual,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    AndAlso,
    OrElse,
    BitAnd,
    BitOr,
    BitXor,
}

impl LogicalOp {
    pub fn from_opcode_name(name: &str) -> Option<Self> {
        Some(match name {
            "and_also" => Self::AndAlso,
            "or_else" => Self::OrElse,
            "bit_and" => Self::BitAnd,
            "bit_or" => Self::BitOr,
            "bit_xor" => Self::BitXor,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::AndAlso => "&&",
            Self::OrElse => "||",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn from_opcode_name(name: &str) -> Option<Self> {
        Some(match name {
            "negate" => Self::Negate,
            "not" => Self::Not,
            "bit_not" => Self::BitNot,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Negate => "-",
            Self::Not => "!",
            Self::BitNot => "~",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Negate => "Negate",
            Self::Not => "Not",
            Self::BitNot => "BitNot",
        };
        f.write_str(name)
    }
}

/// A binary operator node.
///
/// `left` and `right` are empty while the node is still a token in the flat
/// list; the evaluator fills both before the node can become part of a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperator<K> {
    pub op: K,
    pub left: Option<Box<Instruction>>,
    pub right: Option<Box<Instruction>>,
    pub negate: bool,
}

impl<K> BinaryOperator<K> {
    pub fn new(op: K) -> Self {
        Self {
            op,
            left: None,
            right: None,
            negate: false,
        }
    }

    pub fn with_operands(op: K, left: Instruction, right: Instruction) -> Self {
        Self {
            op,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
            negate: false,
        }
    }

    pub fn attach(&mut self, left: Instruction, right: Instruction) {
        self.left = Some(Box::new(left));
        self.right = Some(Box::new(right));
    }

    pub fn is_resolved(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOperator {
    pub op: UnaryOp,
    pub operand: Option<Box<Instruction>>,
}

impl UnaryOperator {
    pub fn new(op: UnaryOp) -> Self {
        Self { op, operand: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableRef {
    pub mode: u8,
    pub var: VarInfo,
}

impl VariableRef {
    pub fn new(mode: u8, var: VarInfo) -> Self {
        Self { mode, var }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableAccess {
    pub mode: u8,
    pub negate: bool,
    pub var: VarInfo,
}

impl VariableAccess {
    pub fn new(mode: u8, var: VarInfo) -> Self {
        Self {
            mode,
            negate: false,
            var,
        }
    }
}

/// Array access.
///
/// As a decoded token `variable` is `None` and `indices` is empty. The
/// evaluator replaces the token with a resolved access whose indices are in
/// source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayAccess {
    pub variable: Option<VariableRef>,
    pub indices: Vec<Instruction>,
    pub negate: bool,
}

impl ArrayAccess {
    pub fn token() -> Self {
        Self {
            variable: None,
            indices: Vec::new(),
            negate: false,
        }
    }

    pub fn resolved(variable: VariableRef, indices: Vec<Instruction>) -> Self {
        Self {
            variable: Some(variable),
            indices,
            negate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Arithmetic(BinaryOperator<ArithmeticOp>),
    Relational(BinaryOperator<RelationalOp>),
    Logical(BinaryOperator<LogicalOp>),
    Unary(UnaryOperator),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Decimal(f64),
    Str(String),
    RawStr(String),
    VariableRef(VariableRef),
    VariableAccess(VariableAccess),
    ArrayAccess(ArrayAccess),
    /// Stands in for the elided left operand of a compound assignment.
    KeywordRef(String),
    Nop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegateError {
    #[error("{0} does not support negate operator")]
    Unsupported(&'static str),

    #[error("negating {0} overflows")]
    Overflow(&'static str),
}

impl Instruction {
    /// Node kind name used by diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Arithmetic(_) => "ArithmeticOperator",
            Self::Relational(_) => "RelationalOperator",
            Self::Logical(_) => "LogicalOperator",
            Self::Unary(_) => "UnaryOperator",
            Self::Byte(_) => "ByteLiteral",
            Self::Short(_) => "ShortLiteral",
            Self::Int(_) => "IntLiteral",
            Self::Long(_) => "LongLiteral",
            Self::Decimal(_) => "DecimalLiteral",
            Self::Str(_) => "StringLiteral",
            Self::RawStr(_) => "RawStringLiteral",
            Self::VariableRef(_) => "VariableRef",
            Self::VariableAccess(_) => "VariableAccess",
            Self::ArrayAccess(_) => "ArrayAccess",
            Self::KeywordRef(_) => "KeywordRef",
            Self::Nop => "Nop",
        }
    }

    /// Toggles negation in place.
    ///
    /// Literals flip their sign; variable accesses, array accesses and
    /// arithmetic nodes flip their `negate` flag. Every other kind is rejected.
    /// Byte and short literals fail on overflow, int and long literals wrap.
    pub fn negate(&mut self) -> Result<(), NegateError> {
        let kind = self.kind();
        match self {
            Self::Byte(v) => *v = v.checked_neg().ok_or(NegateError::Overflow(kind))?,
            Self::Short(v) => *v = v.checked_neg().ok_or(NegateError::Overflow(kind))?,
            Self::Int(v) => *v = v.wrapping_neg(),
            Self::Long(v) => *v = v.wrapping_neg(),
            Self::Decimal(v) => *v = -*v,
            Self::ArrayAccess(a) => a.negate ^= true,
            Self::VariableAccess(v) => v.negate ^= true,
            Self::Arithmetic(a) => a.negate ^= true,
            _ => return Err(NegateError::Unsupported(kind)),
        }
        Ok(())
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Self::Arithmetic(_) | Self::Relational(_) | Self::Logical(_)
        )
    }

    /// Variable behind a plain access or reference, if any.
    pub fn variable(&self) -> Option<&VarInfo> {
        match self {
            Self::VariableAccess(v) => Some(&v.var),
            Self::VariableRef(v) => Some(&v.var),
            _ => None,
        }
    }
}

fn fmt_operand(f: &mut fmt::Formatter<'_>, operand: Option<&Instruction>) -> fmt::Result {
    match operand {
        Some(i) if i.is_binary() => write!(f, "({i})"),
        Some(i) => write!(f, "{i}"),
        None => f.write_str("?"),
    }
}

fn fmt_binary(
    f: &mut fmt::Formatter<'_>,
    symbol: &str,
    left: Option<&Instruction>,
    right: Option<&Instruction>,
) -> fmt::Result {
    if left.is_none() && right.is_none() {
        return f.write_str(symbol);
    }
    fmt_operand(f, left)?;
    f.write_str(symbol)?;
    fmt_operand(f, right)
}

fn fmt_variable(f: &mut fmt::Formatter<'_>, mode: u8, var: &VarInfo) -> fmt::Result {
    write!(f, "{}{}", mode as char, var.display_name())
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arithmetic(a) => {
                if a.negate {
                    f.write_str("-(")?;
                    fmt_binary(f, a.op.symbol(), a.left.as_deref(), a.right.as_deref())?;
                    f.write_str(")")
                } else {
                    fmt_binary(f, a.op.symbol(), a.left.as_deref(), a.right.as_deref())
                }
            }
            Self::Relational(r) => {
                fmt_binary(f, r.op.symbol(), r.left.as_deref(), r.right.as_deref())
            }
            Self::Logical(l) => fmt_binary(f, l.op.symbol(), l.left.as_deref(), l.right.as_deref()),
            Self::Unary(u) => {
                f.write_str(u.op.symbol())?;
                match u.operand.as_deref() {
                    Some(i) if i.is_binary() => write!(f, "({i})"),
                    Some(i) => write!(f, "{i}"),
                    None => Ok(()),
                }
            }
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::RawStr(s) => f.write_str(s),
            Self::VariableRef(v) => fmt_variable(f, v.mode, &v.var),
            Self::VariableAccess(v) => {
                if v.negate {
                    f.write_str("-")?;
                }
                fmt_variable(f, v.mode, &v.var)
            }
            Self::ArrayAccess(a) => {
                let Some(base) = &a.variable else {
                    return f.write_str(")");
                };
                if a.negate {
                    f.write_str("-")?;
                }
                fmt_variable(f, base.mode, &base.var)?;
                f.write_str("(")?;
                for (i, index) in a.indices.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{index}")?;
                }
                f.write_str(")")
            }
            Self::KeywordRef(name) => f.write_str(name),
            Self::Nop => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Scope;

    fn var(id: u16, dims: Vec<u32>) -> VarInfo {
        VarInfo {
            scope: Scope::Global,
            script_index: -1,
            variable_id: id,
            var_type: 1,
            dimensions: dims,
            name: None,
            value: None,
        }
    }

    #[test]
    fn negate_twice_restores_literals() {
        for original in [
            Instruction::Byte(12),
            Instruction::Short(-300),
            Instruction::Int(70000),
            Instruction::Long(-5_000_000_000),
            Instruction::Decimal(1.5),
        ] {
            let mut node = original.clone();
            node.negate().unwrap();
            assert_ne!(node, original);
            node.negate().unwrap();
            assert_eq!(node, original);
        }
    }

    #[test]
    fn negate_twice_restores_flags() {
        let add = Instruction::Arithmetic(BinaryOperator::with_operands(
            ArithmeticOp::Add,
            Instruction::Int(1),
            Instruction::Int(2),
        ));
        let access = Instruction::VariableAccess(VariableAccess::new(b'@', var(3, vec![])));
        let array = Instruction::ArrayAccess(ArrayAccess::resolved(
            VariableRef::new(b'@', var(4, vec![10])),
            vec![Instruction::Int(0)],
        ));
        for original in [add, access, array] {
            let mut node = original.clone();
            node.negate().unwrap();
            assert!(node.to_string().starts_with('-'));
            node.negate().unwrap();
            assert_eq!(node, original);
        }
    }

    #[test]
    fn negate_rejects_other_kinds() {
        let mut s = Instruction::Str("a".into());
        assert_eq!(s.negate(), Err(NegateError::Unsupported("StringLiteral")));
        let mut r = Instruction::VariableRef(VariableRef::new(b'@', var(1, vec![])));
        assert_eq!(r.negate(), Err(NegateError::Unsupported("VariableRef")));
        let mut rel = Instruction::Relational(BinaryOperator::new(RelationalOp::Less));
        assert_eq!(rel.negate(), Err(NegateError::Unsupported("RelationalOperator")));
    }

    #[test]
    fn negate_min_value_overflows() {
        let mut b = Instruction::Byte(i8::MIN);
        assert_eq!(b.negate(), Err(NegateError::Overflow("ByteLiteral")));
        assert_eq!(b, Instruction::Byte(i8::MIN));
        let mut s = Instruction::Short(i16::MIN);
        assert_eq!(s.negate(), Err(NegateError::Overflow("ShortLiteral")));
    }

    #[test]
    fn negate_int_and_long_min_wraps() {
        let mut i = Instruction::Int(i32::MIN);
        assert_eq!(i.negate(), Ok(()));
        assert_eq!(i, Instruction::Int(i32::MIN));
        let mut l = Instruction::Long(i64::MIN);
        assert_eq!(l.negate(), Ok(()));
        assert_eq!(l, Instruction::Long(i64::MIN));
    }

    #[test]
    fn display_parenthesises_nested_binaries() {
        let inner = Instruction::Arithmetic(BinaryOperator::with_operands(
            ArithmeticOp::Add,
            Instruction::VariableAccess(VariableAccess::new(b'@', var(1, vec![]))),
            Instruction::Int(2),
        ));
        let mut outer =
            BinaryOperator::with_operands(RelationalOp::GreaterEqual, inner, Instruction::Int(10));
        assert_eq!(Instruction::Relational(outer.clone()).to_string(), "(@g1+2)>=10");
        outer.right = None;
        assert_eq!(Instruction::Relational(outer).to_string(), "(@g1+2)>=?");
    }

    #[test]
    fn display_tokens() {
        let mul = Instruction::Arithmetic(BinaryOperator::new(ArithmeticOp::Mul));
        assert_eq!(mul.to_string(), "*");
        assert_eq!(Instruction::ArrayAccess(ArrayAccess::token()).to_string(), ")");
        assert_eq!(Instruction::Unary(UnaryOperator::new(UnaryOp::Not)).to_string(), "!");
        assert_eq!(Instruction::Str("hi".into()).to_string(), "\"hi\"");
        assert_eq!(Instruction::RawStr("hi".into()).to_string(), "hi");
    }

    #[test]
    fn display_array_access() {
        let mut a = ArrayAccess::resolved(
            VariableRef::new(b'$', var(7, vec![4, 4])),
            vec![Instruction::Int(1), Instruction::Int(2)],
        );
        assert_eq!(Instruction::ArrayAccess(a.clone()).to_string(), "$g7(1,2)");
        a.negate = true;
        assert_eq!(Instruction::ArrayAccess(a).to_string(), "-$g7(1,2)");
    }
}
