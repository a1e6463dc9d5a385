//! Instruction set: opcodes, operand widths, encoding and disassembly.
//!
//! An instruction is one opcode byte followed by its operands, each encoded
//! big-endian with the width listed in [`Opcode::operand_widths`]. Jump
//! targets are absolute offsets from the start of the enclosing function.

use std::fmt::Write as _;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Constant = 0,
    True,
    False,
    Null,
    List,
    Map,
    Closure,
    CurrentClosure,

    Add,
    Sub,
    Mul,
    Div,
    Mod,

    BwAnd,
    BwOr,
    BwXor,
    BwNot,
    BwLShift,
    BwRShift,

    And,
    Or,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanEqual,

    Minus,
    Bang,
    Index,

    Call,
    ConcurrentCall,
    Return,
    ReturnValue,

    Jump,
    JumpNotTruthy,

    Dot,
    Define,
    GetGlobal,
    SetGlobal,
    GetLocal,
    SetLocal,
    GetBuiltin,
    GetFree,
    LoadModule,
    Interpolate,

    Pop,
    Halt,
}

/// Every opcode, indexed by its byte value.
pub const ALL_OPCODES: [Opcode; 46] = [
    Opcode::Constant,
    Opcode::True,
    Opcode::False,
    Opcode::Null,
    Opcode::List,
    Opcode::Map,
    Opcode::Closure,
    Opcode::CurrentClosure,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Mod,
    Opcode::BwAnd,
    Opcode::BwOr,
    Opcode::BwXor,
    Opcode::BwNot,
    Opcode::BwLShift,
    Opcode::BwRShift,
    Opcode::And,
    Opcode::Or,
    Opcode::Equal,
    Opcode::NotEqual,
    Opcode::GreaterThan,
    Opcode::GreaterThanEqual,
    Opcode::Minus,
    Opcode::Bang,
    Opcode::Index,
    Opcode::Call,
    Opcode::ConcurrentCall,
    Opcode::Return,
    Opcode::ReturnValue,
    Opcode::Jump,
    Opcode::JumpNotTruthy,
    Opcode::Dot,
    Opcode::Define,
    Opcode::GetGlobal,
    Opcode::SetGlobal,
    Opcode::GetLocal,
    Opcode::SetLocal,
    Opcode::GetBuiltin,
    Opcode::GetFree,
    Opcode::LoadModule,
    Opcode::Interpolate,
    Opcode::Pop,
    Opcode::Halt,
];

impl Opcode {
    pub fn from_byte(b: u8) -> Option<Opcode> {
        ALL_OPCODES.get(b as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Constant => "OpConstant",
            Opcode::True => "OpTrue",
            Opcode::False => "OpFalse",
            Opcode::Null => "OpNull",
            Opcode::List => "OpList",
            Opcode::Map => "OpMap",
            Opcode::Closure => "OpClosure",
            Opcode::CurrentClosure => "OpCurrentClosure",
            Opcode::Add => "OpAdd",
            Opcode::Sub => "OpSub",
            Opcode::Mul => "OpMul",
            Opcode::Div => "OpDiv",
            Opcode::Mod => "OpMod",
            Opcode::BwAnd => "OpBwAnd",
            Opcode::BwOr => "OpBwOr",
            Opcode::BwXor => "OpBwXor",
            Opcode::BwNot => "OpBwNot",
            Opcode::BwLShift => "OpBwLShift",
            Opcode::BwRShift => "OpBwRShift",
            Opcode::And => "OpAnd",
            Opcode::Or => "OpOr",
            Opcode::Equal => "OpEqual",
            Opcode::NotEqual => "OpNotEqual",
            Opcode::GreaterThan => "OpGreaterThan",
            Opcode::GreaterThanEqual => "OpGreaterThanEqual",
            Opcode::Minus => "OpMinus",
            Opcode::Bang => "OpBang",
            Opcode::Index => "OpIndex",
            Opcode::Call => "OpCall",
            Opcode::ConcurrentCall => "OpConcurrentCall",
            Opcode::Return => "OpReturn",
            Opcode::ReturnValue => "OpReturnValue",
            Opcode::Jump => "OpJump",
            Opcode::JumpNotTruthy => "OpJumpNotTruthy",
            Opcode::Dot => "OpDot",
            Opcode::Define => "OpDefine",
            Opcode::GetGlobal => "OpGetGlobal",
            Opcode::SetGlobal => "OpSetGlobal",
            Opcode::GetLocal => "OpGetLocal",
            Opcode::SetLocal => "OpSetLocal",
            Opcode::GetBuiltin => "OpGetBuiltin",
            Opcode::GetFree => "OpGetFree",
            Opcode::LoadModule => "OpLoadModule",
            Opcode::Interpolate => "OpInterpolate",
            Opcode::Pop => "OpPop",
            Opcode::Halt => "OpHalt",
        }
    }

    /// Width in bytes of each operand.
    pub fn operand_widths(self) -> &'static [usize] {
        match self {
            Opcode::Constant
            | Opcode::List
            | Opcode::Map
            | Opcode::Jump
            | Opcode::JumpNotTruthy
            | Opcode::GetGlobal
            | Opcode::SetGlobal => &[2],
            Opcode::Closure => &[2, 1],
            Opcode::Interpolate => &[2, 2],
            Opcode::Call
            | Opcode::ConcurrentCall
            | Opcode::GetLocal
            | Opcode::SetLocal
            | Opcode::GetBuiltin
            | Opcode::GetFree => &[1],
            _ => &[],
        }
    }

    /// Total encoded length of the instruction, opcode byte included.
    pub fn encoded_len(self) -> usize {
        1 + self.operand_widths().iter().sum::<usize>()
    }
}

/// Encode one instruction. Operands wider than their slot are truncated to
/// the slot width; missing operands encode as zero.
pub fn make(op: Opcode, operands: &[usize]) -> Vec<u8> {
    let mut ins = Vec::with_capacity(op.encoded_len());
    ins.push(op as u8);
    for (i, width) in op.operand_widths().iter().enumerate() {
        let o = operands.get(i).copied().unwrap_or(0);
        match width {
            2 => ins.extend_from_slice(&(o as u16).to_be_bytes()),
            _ => ins.push(o as u8),
        }
    }
    ins
}

/// Decode the operands of `op` from `ins` (positioned right after the
/// opcode byte). Returns the operands and the number of bytes read, or
/// `None` if the stream is truncated.
pub fn read_operands(op: Opcode, ins: &[u8]) -> Option<(Vec<usize>, usize)> {
    let mut operands = Vec::with_capacity(op.operand_widths().len());
    let mut offset = 0;
    for width in op.operand_widths() {
        match width {
            2 => operands.push(read_u16(ins, offset)? as usize),
            _ => operands.push(*ins.get(offset)? as usize),
        }
        offset += width;
    }
    Some((operands, offset))
}

pub fn read_u16(ins: &[u8], offset: usize) -> Option<u16> {
    let bytes = ins.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Human-readable listing, one instruction per line: `0000 OpConstant 1`.
pub fn disassemble(ins: &[u8]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < ins.len() {
        let Some(op) = Opcode::from_byte(ins[i]) else {
            let _ = writeln!(out, "{i:04} ERROR: unknown opcode {}", ins[i]);
            i += 1;
            continue;
        };
        match read_operands(op, &ins[i + 1..]) {
            Some((operands, read)) => {
                let _ = write!(out, "{i:04} {}", op.name());
                for o in operands {
                    let _ = write!(out, " {o}");
                }
                out.push('\n');
                i += 1 + read;
            }
            None => {
                let _ = writeln!(out, "{i:04} ERROR: truncated {}", op.name());
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bytes_are_dense() {
        for (i, op) in ALL_OPCODES.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i);
            assert_eq!(Opcode::from_byte(i as u8), Some(*op));
        }
        assert_eq!(Opcode::Halt as u8, 45);
        assert!(Opcode::from_byte(46).is_none());
    }

    #[test]
    fn test_make() {
        assert_eq!(make(Opcode::Constant, &[65534]), vec![0, 255, 254]);
        assert_eq!(make(Opcode::Add, &[]), vec![Opcode::Add as u8]);
        assert_eq!(make(Opcode::GetLocal, &[255]), vec![Opcode::GetLocal as u8, 255]);
        assert_eq!(
            make(Opcode::Closure, &[65534, 255]),
            vec![Opcode::Closure as u8, 255, 254, 255]
        );
        assert_eq!(
            make(Opcode::Interpolate, &[1, 2]),
            vec![Opcode::Interpolate as u8, 0, 1, 0, 2]
        );
    }

    #[test]
    fn test_read_operands() {
        let ins = make(Opcode::Closure, &[513, 7]);
        let (operands, read) = read_operands(Opcode::Closure, &ins[1..]).unwrap();
        assert_eq!(operands, vec![513, 7]);
        assert_eq!(read, 3);
        assert!(read_operands(Opcode::Constant, &[0]).is_none());
    }

    #[test]
    fn test_disassemble() {
        let mut ins = Vec::new();
        ins.extend(make(Opcode::Add, &[]));
        ins.extend(make(Opcode::GetLocal, &[1]));
        ins.extend(make(Opcode::Constant, &[2]));
        ins.extend(make(Opcode::Constant, &[65535]));
        ins.extend(make(Opcode::Closure, &[65535, 255]));
        let expected = "0000 OpAdd\n\
                        0001 OpGetLocal 1\n\
                        0003 OpConstant 2\n\
                        0006 OpConstant 65535\n\
                        0009 OpClosure 65535 255\n";
        assert_eq!(disassemble(&ins), expected);
    }
}
