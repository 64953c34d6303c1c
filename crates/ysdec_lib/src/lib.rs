use serde::{Deserialize, Serialize};

mod tables {
    include!(concat!(env!("OUT_DIR"), "/yuris_tables.rs"));
}

pub mod decode;
pub mod diagnostic;
pub mod eval;
pub mod expr;
pub mod instruction;
pub mod json;
pub mod project;
pub mod script;
pub mod variable;

pub use decode::{DecodeError, Decoder, OpcodeDecoder, decode_instructions};
pub use diagnostic::{DiagnosticReport, EvalError, EvalErrorKind, Position};
pub use eval::{EvalContext, evaluate};
pub use expr::{Assignment, ExpressionInfo, ExpressionInstructionSet, OwnerRef, ResultType};
pub use instruction::Instruction;
pub use json::ast_to_json;
pub use project::{ProjectDump, ScriptOutcome, decompile_project};
pub use script::{DecompileError, DecompiledScript, ScriptDump, decompile_script};
pub use variable::{Scope, VarInfo, VariableTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    ShiftJis,
    Gbk,
    Utf8,
}

impl TextEncoding {
    fn encoding(self) -> &'static encoding_rs::Encoding {
        match self {
            TextEncoding::ShiftJis => encoding_rs::SHIFT_JIS,
            TextEncoding::Gbk => encoding_rs::GBK,
            TextEncoding::Utf8 => encoding_rs::UTF_8,
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        let (text, had_errors) = self.encoding().decode_without_bom_handling(bytes);
        if had_errors {
            tracing::debug!(encoding = ?self, len = bytes.len(), "malformed text replaced");
        }
        text.into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompileOptions {
    pub format: OutputFormat,
    pub encoding: TextEncoding,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            encoding: TextEncoding::ShiftJis,
        }
    }
}

pub fn decompile_expression(
    bytes: &[u8],
    assignment: Option<(ExpressionInfo, &str)>,
    variables: &VariableTable,
    options: &DecompileOptions,
) -> Result<ExpressionInstructionSet, EvalError> {
    let decoder = OpcodeDecoder::new(variables, options.encoding);
    let mut set = match assignment {
        Some((info, load_op)) => ExpressionInstructionSet::assignment(-1, info, load_op),
        None => ExpressionInstructionSet::new(-1),
    };
    set.get_instructions(bytes, &decoder)?;
    tracing::debug!(text = %set, "expression decompiled");
    Ok(set)
}
