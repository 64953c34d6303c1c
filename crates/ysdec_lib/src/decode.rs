use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::TextEncoding;
use crate::instruction::{
    ArithmeticOp, ArrayAccess, BinaryOperator, Instruction, LogicalOp, RelationalOp, UnaryOperator,
    UnaryOp, VariableAccess, VariableRef,
};
use crate::tables::{self, OpClass, OpFmt};
use crate::variable::VariableTable;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    Eof,

    #[error("invalid opcode 0x{op:02x} at pc={pc}")]
    InvalidOpcode { pc: usize, op: u8 },

    #[error("opcode {name} has no instruction mapping")]
    UnmappedOpcode { name: &'static str },

    #[error("truncated operand at pc={pc} (operand size={size}, remaining={remaining})")]
    TruncatedOperand { pc: usize, size: usize, remaining: usize },

    #[error("operand width mismatch for {name} at pc={pc} (expected {expected}, got {actual})")]
    WidthMismatch {
        pc: usize,
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown variable id {id} at pc={pc}")]
    UnknownVariable { pc: usize, id: u16 },

    #[error("decoder did not advance past offset {offset}")]
    NoProgress { offset: usize },
}

/// Per-opcode decoder used by the decode loop.
pub trait Decoder {
    /// Decodes the instruction starting at `offset`, returning it together
    /// with the offset just past it.
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(Instruction, usize), DecodeError>;

    /// Decodes raw text with the configured encoding.
    fn decode_text(&self, bytes: &[u8]) -> String;
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn get_u8(&mut self) -> Result<u8, DecodeError> {
        if self.remaining() < 1 {
            return Err(DecodeError::Eof);
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn get_u16(&mut self) -> Result<u16, DecodeError> {
        if self.remaining() < 2 {
            return Err(DecodeError::Eof);
        }
        let v = LittleEndian::read_u16(&self.buf[self.pos..self.pos + 2]);
        self.pos += 2;
        Ok(v)
    }

    fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Eof);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }
}

fn opcode_info(op: u8) -> Option<&'static tables::OpInfo> {
    match tables::OPCODE_INDEX[op as usize] {
        0 => None,
        i => tables::OPCODE_INFO
            .get(i as usize - 1)
            .filter(|info| info.code == op),
    }
}

fn expect_width(
    info: &tables::OpInfo,
    pc: usize,
    payload: &[u8],
    expected: usize,
) -> Result<(), DecodeError> {
    if payload.len() != expected {
        return Err(DecodeError::WidthMismatch {
            pc,
            name: info.name,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Decoder for the YuRis expression opcode set.
pub struct OpcodeDecoder<'a> {
    variables: &'a VariableTable,
    encoding: TextEncoding,
}

impl<'a> OpcodeDecoder<'a> {
    pub fn new(variables: &'a VariableTable, encoding: TextEncoding) -> Self {
        Self {
            variables,
            encoding,
        }
    }

    fn literal(
        &self,
        info: &tables::OpInfo,
        pc: usize,
        payload: &[u8],
    ) -> Result<Instruction, DecodeError> {
        let inst = match info.fmt {
            OpFmt::I8 => {
                expect_width(info, pc, payload, 1)?;
                Instruction::Byte(payload[0] as i8)
            }
            OpFmt::I16 => {
                expect_width(info, pc, payload, 2)?;
                Instruction::Short(LittleEndian::read_i16(payload))
            }
            OpFmt::I32 => {
                expect_width(info, pc, payload, 4)?;
                Instruction::Int(LittleEndian::read_i32(payload))
            }
            OpFmt::I64 => {
                expect_width(info, pc, payload, 8)?;
                Instruction::Long(LittleEndian::read_i64(payload))
            }
            OpFmt::F64 => {
                expect_width(info, pc, payload, 8)?;
                Instruction::Decimal(LittleEndian::read_f64(payload))
            }
            OpFmt::TEXT => Instruction::Str(self.encoding.decode(payload)),
            OpFmt::NONE | OpFmt::ANY | OpFmt::VAR => {
                return Err(DecodeError::UnmappedOpcode { name: info.name });
            }
        };
        Ok(inst)
    }

    fn variable(
        &self,
        info: &tables::OpInfo,
        pc: usize,
        payload: &[u8],
    ) -> Result<(u8, crate::variable::VarInfo), DecodeError> {
        expect_width(info, pc, payload, 3)?;
        let mode = payload[0];
        let id = LittleEndian::read_u16(&payload[1..]);
        let var = self
            .variables
            .get(id)
            .cloned()
            .ok_or(DecodeError::UnknownVariable { pc, id })?;
        Ok((mode, var))
    }
}

impl Decoder for OpcodeDecoder<'_> {
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(Instruction, usize), DecodeError> {
        let pc = offset;
        let mut r = Reader::at(bytes, offset);
        let op = r.get_u8()?;
        let info = opcode_info(op).ok_or(DecodeError::InvalidOpcode { pc, op })?;
        let size = r.get_u16()? as usize;
        if r.remaining() < size {
            return Err(DecodeError::TruncatedOperand {
                pc,
                size,
                remaining: r.remaining(),
            });
        }
        let payload = r.get_bytes(size)?;
        let unmapped = || DecodeError::UnmappedOpcode { name: info.name };

        let inst = match info.class {
            OpClass::NOP => Instruction::Nop,
            OpClass::ARITHMETIC => Instruction::Arithmetic(BinaryOperator::new(
                ArithmeticOp::from_opcode_name(info.name).ok_or_else(unmapped)?,
            )),
            OpClass::RELATIONAL => Instruction::Relational(BinaryOperator::new(
                RelationalOp::from_opcode_name(info.name).ok_or_else(unmapped)?,
            )),
            OpClass::LOGICAL => Instruction::Logical(BinaryOperator::new(
                LogicalOp::from_opcode_name(info.name).ok_or_else(unmapped)?,
            )),
            OpClass::UNARY => Instruction::Unary(UnaryOperator::new(
                UnaryOp::from_opcode_name(info.name).ok_or_else(unmapped)?,
            )),
            OpClass::ARRAY_ACCESS => Instruction::ArrayAccess(ArrayAccess::token()),
            OpClass::LITERAL => self.literal(info, pc, payload)?,
            OpClass::VAR_ACCESS => {
                let (mode, var) = self.variable(info, pc, payload)?;
                Instruction::VariableAccess(VariableAccess::new(mode, var))
            }
            OpClass::VAR_REF => {
                let (mode, var) = self.variable(info, pc, payload)?;
                Instruction::VariableRef(VariableRef::new(mode, var))
            }
        };

        Ok((inst, r.pos))
    }

    fn decode_text(&self, bytes: &[u8]) -> String {
        self.encoding.decode(bytes)
    }
}

/// Decodes one expression's bytecode into its flat, postfix instruction list.
///
/// Every decoded token is kept, `Nop`s included.
pub fn decode_instructions(
    decoder: &dyn Decoder,
    bytes: &[u8],
) -> Result<Vec<Instruction>, DecodeError> {
    let mut out = Vec::new();
    decode_into(decoder, bytes, &mut out)?;
    Ok(out)
}

/// Like [`decode_instructions`], but leaves whatever was decoded before a
/// failure in `out`.
pub fn decode_into(
    decoder: &dyn Decoder,
    bytes: &[u8],
    out: &mut Vec<Instruction>,
) -> Result<(), DecodeError> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        let (inst, next) = decoder.decode(bytes, offset)?;
        if next <= offset {
            return Err(DecodeError::NoProgress { offset });
        }
        tracing::trace!(offset, kind = inst.kind(), "decoded instruction");
        out.push(inst);
        offset = next;
    }
    Ok(())
}

/// Encodes one token in the expression wire format. Used by tests and tooling
/// that build expressions by hand.
///
/// # Panics
///
/// If `payload` is longer than the u16 length field can describe.
pub fn encode_token(op: u8, payload: &[u8]) -> Vec<u8> {
    let Ok(size) = u16::try_from(payload.len()) else {
        panic!("operand of {} bytes does not fit a token", payload.len());
    };
    let mut out = Vec::with_capacity(3 + payload.len());
    out.push(op);
    let mut len = [0u8; 2];
    LittleEndian::write_u16(&mut len, size);
    out.extend_from_slice(&len);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::variable::{Scope, VarInfo};

    fn table() -> VariableTable {
        [VarInfo {
            scope: Scope::Global,
            script_index: -1,
            variable_id: 5,
            var_type: 1,
            dimensions: vec![3],
            name: Some("flags".into()),
            value: None,
        }]
        .into_iter()
        .collect()
    }

    fn decode_all(bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
        let vars = table();
        let dec = OpcodeDecoder::new(&vars, TextEncoding::ShiftJis);
        decode_instructions(&dec, bytes)
    }

    #[test]
    fn decodes_literals_and_operators() {
        let mut bytes = Vec::new();
        bytes.extend(encode_token(b'B', &[0xFF]));
        bytes.extend(encode_token(b'W', &300i16.to_le_bytes()));
        bytes.extend(encode_token(b'I', &(-7i32).to_le_bytes()));
        bytes.extend(encode_token(b'L', &(1i64 << 40).to_le_bytes()));
        bytes.extend(encode_token(b'F', &2.5f64.to_le_bytes()));
        bytes.extend(encode_token(b'+', &[]));
        bytes.extend(encode_token(b',', &[1, 2]));
        bytes.extend(encode_token(b'R', &[]));
        let insts = decode_all(&bytes).unwrap();
        assert_eq!(
            insts,
            vec![
                Instruction::Byte(-1),
                Instruction::Short(300),
                Instruction::Int(-7),
                Instruction::Long(1 << 40),
                Instruction::Decimal(2.5),
                Instruction::Arithmetic(BinaryOperator::new(ArithmeticOp::Add)),
                Instruction::Nop,
                Instruction::Unary(UnaryOperator::new(UnaryOp::Negate)),
            ]
        );
    }

    #[test]
    fn decodes_variables() {
        let mut bytes = Vec::new();
        bytes.extend(encode_token(b'v', &[b'@', 5, 0]));
        bytes.extend(encode_token(b'H', &[b'$', 5, 0]));
        let insts = decode_all(&bytes).unwrap();
        assert_eq!(insts.len(), 2);
        assert!(matches!(
            &insts[0],
            Instruction::VariableRef(v) if v.mode == b'@' && v.var.variable_id == 5
        ));
        assert!(matches!(&insts[1], Instruction::VariableAccess(v) if v.mode == b'$' && !v.negate));
    }

    #[test]
    fn decodes_shift_jis_string() {
        // "あ" in Shift_JIS
        let bytes = encode_token(b'M', &[0x82, 0xA0]);
        assert_eq!(decode_all(&bytes).unwrap(), vec![Instruction::Str("あ".into())]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            decode_all(&[0x01, 0, 0]),
            Err(DecodeError::InvalidOpcode { pc: 0, op: 0x01 })
        ));
        assert!(matches!(
            decode_all(&[b'I', 4, 0, 1]),
            Err(DecodeError::TruncatedOperand { pc: 0, size: 4, remaining: 1 })
        ));
        assert!(matches!(
            decode_all(&encode_token(b'I', &[1, 2])),
            Err(DecodeError::WidthMismatch { expected: 4, actual: 2, .. })
        ));
        assert!(matches!(
            decode_all(&encode_token(b'H', &[b'@', 9, 0])),
            Err(DecodeError::UnknownVariable { id: 9, .. })
        ));
        assert!(matches!(decode_all(&[b'+', 0]), Err(DecodeError::Eof)));
    }

    struct Stuck;

    impl Decoder for Stuck {
        fn decode(&self, _: &[u8], offset: usize) -> Result<(Instruction, usize), DecodeError> {
            Ok((Instruction::Nop, offset))
        }

        fn decode_text(&self, bytes: &[u8]) -> String {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }

    #[test]
    fn encode_token_writes_length_prefix() {
        assert_eq!(encode_token(b'I', &[1, 0, 0, 0]), vec![b'I', 4, 0, 1, 0, 0, 0]);
        let max = vec![0u8; usize::from(u16::MAX)];
        assert_eq!(&encode_token(b'M', &max)[..3], &[b'M', 0xff, 0xff]);
    }

    #[test]
    #[should_panic(expected = "does not fit a token")]
    fn encode_token_rejects_oversized_operand() {
        encode_token(b'M', &vec![0u8; usize::from(u16::MAX) + 1]);
    }

    #[test]
    fn loop_rejects_decoder_without_progress() {
        assert!(matches!(
            decode_instructions(&Stuck, &[0, 0]),
            Err(DecodeError::NoProgress { offset: 0 })
        ));
    }
}
