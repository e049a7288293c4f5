//! The opcode table (C4) and parsed-opcode representation (C5).
//!
//! Tokenizing a full script into a sequence of [`ParsedOpcode`]s is done
//! here too: the specification treats a *separate* tokenizer as an
//! external collaborator, but no concrete one supplies the length
//! descriptor this crate's `ParsedOpcode` needs for minimal-push
//! checking and exact serialization, so `parse_script` lives in this
//! crate, right beside the type it produces.

use crate::error::ExecError;

/// Raw opcode byte values, named exactly as in the Script reference.
pub mod opcodes {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_PUSHDATA4: u8 = 0x4e;
    pub const OP_1NEGATE: u8 = 0x4f;
    pub const OP_RESERVED: u8 = 0x50;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const OP_NOP: u8 = 0x61;
    pub const OP_VER: u8 = 0x62;
    pub const OP_IF: u8 = 0x63;
    pub const OP_NOTIF: u8 = 0x64;
    pub const OP_VERIF: u8 = 0x65;
    pub const OP_VERNOTIF: u8 = 0x66;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_VERIFY: u8 = 0x69;
    pub const OP_RETURN: u8 = 0x6a;
    pub const OP_TOALTSTACK: u8 = 0x6b;
    pub const OP_FROMALTSTACK: u8 = 0x6c;
    pub const OP_2DROP: u8 = 0x6d;
    pub const OP_2DUP: u8 = 0x6e;
    pub const OP_3DUP: u8 = 0x6f;
    pub const OP_2OVER: u8 = 0x70;
    pub const OP_2ROT: u8 = 0x71;
    pub const OP_2SWAP: u8 = 0x72;
    pub const OP_IFDUP: u8 = 0x73;
    pub const OP_DEPTH: u8 = 0x74;
    pub const OP_DROP: u8 = 0x75;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_NIP: u8 = 0x77;
    pub const OP_OVER: u8 = 0x78;
    pub const OP_PICK: u8 = 0x79;
    pub const OP_ROLL: u8 = 0x7a;
    pub const OP_ROT: u8 = 0x7b;
    pub const OP_SWAP: u8 = 0x7c;
    pub const OP_TUCK: u8 = 0x7d;
    pub const OP_CAT: u8 = 0x7e;
    pub const OP_SUBSTR: u8 = 0x7f;
    pub const OP_LEFT: u8 = 0x80;
    pub const OP_RIGHT: u8 = 0x81;
    pub const OP_SIZE: u8 = 0x82;
    pub const OP_INVERT: u8 = 0x83;
    pub const OP_AND: u8 = 0x84;
    pub const OP_OR: u8 = 0x85;
    pub const OP_XOR: u8 = 0x86;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_RESERVED1: u8 = 0x89;
    pub const OP_RESERVED2: u8 = 0x8a;
    pub const OP_1ADD: u8 = 0x8b;
    pub const OP_1SUB: u8 = 0x8c;
    pub const OP_2MUL: u8 = 0x8d;
    pub const OP_2DIV: u8 = 0x8e;
    pub const OP_NEGATE: u8 = 0x8f;
    pub const OP_ABS: u8 = 0x90;
    pub const OP_NOT: u8 = 0x91;
    pub const OP_0NOTEQUAL: u8 = 0x92;
    pub const OP_ADD: u8 = 0x93;
    pub const OP_SUB: u8 = 0x94;
    pub const OP_MUL: u8 = 0x95;
    pub const OP_DIV: u8 = 0x96;
    pub const OP_MOD: u8 = 0x97;
    pub const OP_LSHIFT: u8 = 0x98;
    pub const OP_RSHIFT: u8 = 0x99;
    pub const OP_BOOLAND: u8 = 0x9a;
    pub const OP_BOOLOR: u8 = 0x9b;
    pub const OP_NUMEQUAL: u8 = 0x9c;
    pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
    pub const OP_NUMNOTEQUAL: u8 = 0x9e;
    pub const OP_LESSTHAN: u8 = 0x9f;
    pub const OP_GREATERTHAN: u8 = 0xa0;
    pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
    pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
    pub const OP_MIN: u8 = 0xa3;
    pub const OP_MAX: u8 = 0xa4;
    pub const OP_WITHIN: u8 = 0xa5;
    pub const OP_RIPEMD160: u8 = 0xa6;
    pub const OP_SHA1: u8 = 0xa7;
    pub const OP_SHA256: u8 = 0xa8;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_HASH256: u8 = 0xaa;
    pub const OP_CODESEPARATOR: u8 = 0xab;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKSIGVERIFY: u8 = 0xad;
    pub const OP_CHECKMULTISIG: u8 = 0xae;
    pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
    pub const OP_NOP1: u8 = 0xb0;
    pub const OP_NOP2: u8 = 0xb1;
    pub const OP_NOP3: u8 = 0xb2;
    pub const OP_NOP4: u8 = 0xb3;
    pub const OP_NOP5: u8 = 0xb4;
    pub const OP_NOP6: u8 = 0xb5;
    pub const OP_NOP7: u8 = 0xb6;
    pub const OP_NOP8: u8 = 0xb7;
    pub const OP_NOP9: u8 = 0xb8;
    pub const OP_NOP10: u8 = 0xb9;
    pub const OP_INVALIDOPCODE: u8 = 0xff;

    /// True for `OP_NOP1..OP_NOP10`.
    pub fn is_upgradable_nop(op: u8) -> bool {
        (OP_NOP1..=OP_NOP10).contains(&op)
    }
}

use opcodes::*;

/// The length descriptor for a single opcode byte (C4's table entry,
/// minus the name/handler which the executor looks up separately).
///
/// Positive `N`: the total encoded instruction, opcode byte included, is
/// `N` bytes long (`N == 1` for opcodes with no immediate data).
/// Negative `-k`, `k` in `{1, 2, 4}`: the opcode is followed by a
/// `k`-byte little-endian length prefix and then that many data bytes.
fn length_descriptor(op: u8) -> i32 {
    match op {
        0 => 1,
        1..=75 => op as i32 + 1,
        OP_PUSHDATA1 => -1,
        OP_PUSHDATA2 => -2,
        OP_PUSHDATA4 => -4,
        _ => 1,
    }
}

lazy_static::lazy_static! {
    /// Immutable table indexed by opcode byte, built once at first use.
    static ref OPCODE_TABLE: [i32; 256] = {
        let mut table = [1i32; 256];
        for (op, entry) in table.iter_mut().enumerate() {
            *entry = length_descriptor(op as u8);
        }
        table
    };
}

/// A single parsed instruction: an opcode byte plus any immediate data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOpcode {
    pub opcode: u8,
    pub data: Vec<u8>,
}

impl ParsedOpcode {
    pub fn new(opcode: u8, data: Vec<u8>) -> Self {
        Self { opcode, data }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(
            self.opcode,
            OP_CAT
                | OP_SUBSTR
                | OP_LEFT
                | OP_RIGHT
                | OP_INVERT
                | OP_AND
                | OP_OR
                | OP_XOR
                | OP_2MUL
                | OP_2DIV
                | OP_MUL
                | OP_DIV
                | OP_MOD
                | OP_LSHIFT
                | OP_RSHIFT
        )
    }

    pub fn is_always_illegal(&self) -> bool {
        matches!(self.opcode, OP_VERIF | OP_VERNOTIF)
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.opcode, OP_IF | OP_NOTIF | OP_ELSE | OP_ENDIF)
    }

    /// The opcode is counted towards `MAX_OPS_PER_SCRIPT` only once
    /// executed (the push family, `opcode <= OP_16`, is exempt).
    pub fn is_counted(&self) -> bool {
        self.opcode > OP_16
    }

    /// True for opcodes that structurally carry a length-prefixed or
    /// direct-length payload, i.e. the ones `check_minimal_push` applies
    /// to. `OP_1NEGATE`/`OP_1..OP_16` carry no encoded bytes at all, so
    /// there's nothing non-minimal to check for them.
    pub fn is_data_push(&self) -> bool {
        self.opcode == OP_0 || (1..=75).contains(&self.opcode) || {
            matches!(self.opcode, OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4)
        }
    }

    /// Validates that this push used the shortest possible opcode for
    /// its payload (§4.5).
    pub fn check_minimal_push(&self) -> Result<(), ExecError> {
        let len = self.data.len();
        if len == 0 {
            if self.opcode != OP_0 {
                return Err(ExecError::MinimalData);
            }
        } else if len == 1 && (1..=16).contains(&self.data[0]) {
            if self.opcode != OP_1 + (self.data[0] - 1) {
                return Err(ExecError::MinimalData);
            }
        } else if len == 1 && self.data[0] == 0x81 {
            if self.opcode != OP_1NEGATE {
                return Err(ExecError::MinimalData);
            }
        } else if len <= 75 {
            if self.opcode as usize != len {
                return Err(ExecError::MinimalData);
            }
        } else if len <= 255 {
            if self.opcode != OP_PUSHDATA1 {
                return Err(ExecError::MinimalData);
            }
        } else if len <= 65535 {
            if self.opcode != OP_PUSHDATA2 {
                return Err(ExecError::MinimalData);
            }
        } else if self.opcode != OP_PUSHDATA4 {
            return Err(ExecError::MinimalData);
        }
        Ok(())
    }

    /// Re-encodes this instruction to its original wire form.
    pub fn serialize(&self) -> Result<Vec<u8>, ExecError> {
        let mut out = vec![self.opcode];
        match OPCODE_TABLE[self.opcode as usize] {
            n if n > 0 => {
                if self.data.len() + 1 != n as usize {
                    return Err(ExecError::InvalidOpcode);
                }
                out.extend_from_slice(&self.data);
            }
            n => {
                let k = (-n) as usize;
                let len = self.data.len();
                let len_bytes = (len as u32).to_le_bytes();
                out.extend_from_slice(&len_bytes[..k]);
                out.extend_from_slice(&self.data);
            }
        }
        Ok(out)
    }

    /// One-line disassembly: numeric literals for the constant-push
    /// opcodes, raw concatenated hex for every other push, the opcode
    /// mnemonic for everything else.
    pub fn to_asm_oneline(&self) -> String {
        match self.opcode {
            OP_0 => "0".to_string(),
            OP_1NEGATE => "-1".to_string(),
            op if (OP_1..=OP_16).contains(&op) => (op - OP_1 + 1).to_string(),
            op if op <= 75 && op > 0 => hex_concat(&self.data),
            OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4 => hex_concat(&self.data),
            op => opcode_name(op),
        }
    }

    /// Multi-line disassembly: mnemonic retained for every opcode, with
    /// an explicit length-prefix rendering for `PUSHDATA{1,2,4}`.
    pub fn to_asm_multiline(&self) -> String {
        let name = opcode_name(self.opcode);
        match self.opcode {
            op if op <= 75 && op > 0 => {
                if self.data.is_empty() {
                    name
                } else {
                    format!("{} {}", name, hex_spaced(&self.data))
                }
            }
            OP_PUSHDATA1 => format!(
                "{} 0x{:02x} {}",
                name,
                self.data.len(),
                hex_spaced(&self.data)
            ),
            OP_PUSHDATA2 => format!(
                "{} 0x{:04x} {}",
                name,
                self.data.len(),
                hex_spaced(&self.data)
            ),
            OP_PUSHDATA4 => format!(
                "{} 0x{:08x} {}",
                name,
                self.data.len(),
                hex_spaced(&self.data)
            ),
            _ => name,
        }
    }
}

fn hex_concat(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_spaced(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The canonical mnemonic for an opcode byte.
pub fn opcode_name(op: u8) -> String {
    match op {
        OP_0 => "OP_0".into(),
        1..=75 => format!("OP_PUSHBYTES_{op}"),
        OP_PUSHDATA1 => "OP_PUSHDATA1".into(),
        OP_PUSHDATA2 => "OP_PUSHDATA2".into(),
        OP_PUSHDATA4 => "OP_PUSHDATA4".into(),
        OP_1NEGATE => "OP_1NEGATE".into(),
        OP_RESERVED => "OP_RESERVED".into(),
        op if (OP_1..=OP_16).contains(&op) => format!("OP_{}", op - OP_1 + 1),
        OP_NOP => "OP_NOP".into(),
        OP_VER => "OP_VER".into(),
        OP_IF => "OP_IF".into(),
        OP_NOTIF => "OP_NOTIF".into(),
        OP_VERIF => "OP_VERIF".into(),
        OP_VERNOTIF => "OP_VERNOTIF".into(),
        OP_ELSE => "OP_ELSE".into(),
        OP_ENDIF => "OP_ENDIF".into(),
        OP_VERIFY => "OP_VERIFY".into(),
        OP_RETURN => "OP_RETURN".into(),
        OP_TOALTSTACK => "OP_TOALTSTACK".into(),
        OP_FROMALTSTACK => "OP_FROMALTSTACK".into(),
        OP_2DROP => "OP_2DROP".into(),
        OP_2DUP => "OP_2DUP".into(),
        OP_3DUP => "OP_3DUP".into(),
        OP_2OVER => "OP_2OVER".into(),
        OP_2ROT => "OP_2ROT".into(),
        OP_2SWAP => "OP_2SWAP".into(),
        OP_IFDUP => "OP_IFDUP".into(),
        OP_DEPTH => "OP_DEPTH".into(),
        OP_DROP => "OP_DROP".into(),
        OP_DUP => "OP_DUP".into(),
        OP_NIP => "OP_NIP".into(),
        OP_OVER => "OP_OVER".into(),
        OP_PICK => "OP_PICK".into(),
        OP_ROLL => "OP_ROLL".into(),
        OP_ROT => "OP_ROT".into(),
        OP_SWAP => "OP_SWAP".into(),
        OP_TUCK => "OP_TUCK".into(),
        OP_CAT => "OP_CAT".into(),
        OP_SUBSTR => "OP_SUBSTR".into(),
        OP_LEFT => "OP_LEFT".into(),
        OP_RIGHT => "OP_RIGHT".into(),
        OP_SIZE => "OP_SIZE".into(),
        OP_INVERT => "OP_INVERT".into(),
        OP_AND => "OP_AND".into(),
        OP_OR => "OP_OR".into(),
        OP_XOR => "OP_XOR".into(),
        OP_EQUAL => "OP_EQUAL".into(),
        OP_EQUALVERIFY => "OP_EQUALVERIFY".into(),
        OP_RESERVED1 => "OP_RESERVED1".into(),
        OP_RESERVED2 => "OP_RESERVED2".into(),
        OP_1ADD => "OP_1ADD".into(),
        OP_1SUB => "OP_1SUB".into(),
        OP_2MUL => "OP_2MUL".into(),
        OP_2DIV => "OP_2DIV".into(),
        OP_NEGATE => "OP_NEGATE".into(),
        OP_ABS => "OP_ABS".into(),
        OP_NOT => "OP_NOT".into(),
        OP_0NOTEQUAL => "OP_0NOTEQUAL".into(),
        OP_ADD => "OP_ADD".into(),
        OP_SUB => "OP_SUB".into(),
        OP_MUL => "OP_MUL".into(),
        OP_DIV => "OP_DIV".into(),
        OP_MOD => "OP_MOD".into(),
        OP_LSHIFT => "OP_LSHIFT".into(),
        OP_RSHIFT => "OP_RSHIFT".into(),
        OP_BOOLAND => "OP_BOOLAND".into(),
        OP_BOOLOR => "OP_BOOLOR".into(),
        OP_NUMEQUAL => "OP_NUMEQUAL".into(),
        OP_NUMEQUALVERIFY => "OP_NUMEQUALVERIFY".into(),
        OP_NUMNOTEQUAL => "OP_NUMNOTEQUAL".into(),
        OP_LESSTHAN => "OP_LESSTHAN".into(),
        OP_GREATERTHAN => "OP_GREATERTHAN".into(),
        OP_LESSTHANOREQUAL => "OP_LESSTHANOREQUAL".into(),
        OP_GREATERTHANOREQUAL => "OP_GREATERTHANOREQUAL".into(),
        OP_MIN => "OP_MIN".into(),
        OP_MAX => "OP_MAX".into(),
        OP_WITHIN => "OP_WITHIN".into(),
        OP_RIPEMD160 => "OP_RIPEMD160".into(),
        OP_SHA1 => "OP_SHA1".into(),
        OP_SHA256 => "OP_SHA256".into(),
        OP_HASH160 => "OP_HASH160".into(),
        OP_HASH256 => "OP_HASH256".into(),
        OP_CODESEPARATOR => "OP_CODESEPARATOR".into(),
        OP_CHECKSIG => "OP_CHECKSIG".into(),
        OP_CHECKSIGVERIFY => "OP_CHECKSIGVERIFY".into(),
        OP_CHECKMULTISIG => "OP_CHECKMULTISIG".into(),
        OP_CHECKMULTISIGVERIFY => "OP_CHECKMULTISIGVERIFY".into(),
        OP_NOP1 => "OP_NOP1".into(),
        OP_NOP2 => "OP_NOP2".into(),
        OP_NOP3 => "OP_NOP3".into(),
        OP_NOP4 => "OP_NOP4".into(),
        OP_NOP5 => "OP_NOP5".into(),
        OP_NOP6 => "OP_NOP6".into(),
        OP_NOP7 => "OP_NOP7".into(),
        OP_NOP8 => "OP_NOP8".into(),
        OP_NOP9 => "OP_NOP9".into(),
        OP_NOP10 => "OP_NOP10".into(),
        OP_INVALIDOPCODE => "OP_INVALIDOPCODE".into(),
        _ => "OP_UNKNOWN".into(),
    }
}

/// One parsed instruction plus its byte span in the owning script,
/// needed for `OP_CODESEPARATOR` (the "byte offset after this opcode")
/// and for subscript slicing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    pub start: usize,
    pub end: usize,
    pub op: ParsedOpcode,
}

/// Tokenizes a raw script into a sequence of parsed instructions.
pub fn parse_script(bytes: &[u8]) -> Result<Vec<ParsedInstruction>, ExecError> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let start = i;
        let opcode = bytes[i];
        i += 1;

        let data = match opcode {
            1..=75 => take(bytes, &mut i, opcode as usize)?,
            OP_PUSHDATA1 => {
                let len = *bytes.get(i).ok_or(ExecError::InvalidOpcode)? as usize;
                i += 1;
                take(bytes, &mut i, len)?
            }
            OP_PUSHDATA2 => {
                let b = bytes.get(i..i + 2).ok_or(ExecError::InvalidOpcode)?;
                let len = u16::from_le_bytes([b[0], b[1]]) as usize;
                i += 2;
                take(bytes, &mut i, len)?
            }
            OP_PUSHDATA4 => {
                let b = bytes.get(i..i + 4).ok_or(ExecError::InvalidOpcode)?;
                let len = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize;
                i += 4;
                take(bytes, &mut i, len)?
            }
            _ => Vec::new(),
        };

        out.push(ParsedInstruction {
            start,
            end: i,
            op: ParsedOpcode::new(opcode, data),
        });
    }
    Ok(out)
}

fn take(bytes: &[u8], i: &mut usize, len: usize) -> Result<Vec<u8>, ExecError> {
    let slice = bytes.get(*i..*i + len).ok_or(ExecError::InvalidOpcode)?;
    *i += len;
    Ok(slice.to_vec())
}

/// Re-encodes a sequence of parsed opcodes back to raw script bytes.
pub fn serialize_script(ops: &[ParsedOpcode]) -> Result<Vec<u8>, ExecError> {
    let mut out = Vec::new();
    for op in ops {
        out.extend_from_slice(&op.serialize()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serialize_roundtrip() {
        // OP_1 OP_1 OP_ADD OP_2 OP_EQUAL
        let script = [0x51u8, 0x51, 0x93, 0x52, 0x87];
        let parsed = parse_script(&script).unwrap();
        let ops: Vec<_> = parsed.into_iter().map(|i| i.op).collect();
        let reserialized = serialize_script(&ops).unwrap();
        assert_eq!(reserialized, script.to_vec());
    }

    #[test]
    fn direct_push_roundtrip() {
        let script = [0x05u8, 1, 2, 3, 4, 5];
        let parsed = parse_script(&script).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].op.data, vec![1, 2, 3, 4, 5]);
        assert_eq!(parsed[0].op.serialize().unwrap(), script.to_vec());
    }

    #[test]
    fn pushdata1_non_minimal() {
        // PUSHDATA1 pushing a single byte should have been OP_PUSHBYTES_1.
        let op = ParsedOpcode::new(OP_PUSHDATA1, vec![0x05]);
        assert_eq!(op.check_minimal_push(), Err(ExecError::MinimalData));
    }

    #[test]
    fn direct_push_is_minimal() {
        let op = ParsedOpcode::new(0x01, vec![0x05]);
        assert_eq!(op.check_minimal_push(), Ok(()));
    }

    #[test]
    fn disabled_and_illegal_classification() {
        assert!(ParsedOpcode::new(OP_CAT, vec![]).is_disabled());
        assert!(ParsedOpcode::new(OP_VERIF, vec![]).is_always_illegal());
        assert!(!ParsedOpcode::new(OP_VERIF, vec![]).is_disabled());
        assert!(ParsedOpcode::new(OP_IF, vec![]).is_conditional());
    }

    #[test]
    fn oneline_disasm_constants() {
        assert_eq!(ParsedOpcode::new(OP_0, vec![]).to_asm_oneline(), "0");
        assert_eq!(ParsedOpcode::new(OP_1NEGATE, vec![]).to_asm_oneline(), "-1");
        assert_eq!(ParsedOpcode::new(OP_16, vec![]).to_asm_oneline(), "16");
        assert_eq!(
            ParsedOpcode::new(0x02, vec![0xab, 0xcd]).to_asm_oneline(),
            "abcd"
        );
    }

    #[test]
    fn multiline_pushdata1_length_prefix() {
        let op = ParsedOpcode::new(OP_PUSHDATA1, vec![0u8; 200]);
        let s = op.to_asm_multiline();
        assert!(s.starts_with("OP_PUSHDATA1 0xc8 "));
    }
}
