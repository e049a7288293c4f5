//! Subscript construction and transaction digest computation (C7, first
//! half). `checksig.rs` builds on top of this for the actual signature
//! verification opcodes.

use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{Amount, ScriptBuf, Sequence, Transaction, TxOut};

use crate::error::ExecError;
use crate::opcode::{parse_script, serialize_script};

pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigHashType(pub u8);

impl SigHashType {
    pub fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// The low 5 bits, selecting ALL/NONE/SINGLE.
    pub fn base(self) -> u8 {
        self.0 & 0x1f
    }

    pub fn anyone_can_pay(self) -> bool {
        self.0 & SIGHASH_ANYONECANPAY != 0
    }

    /// Strict validation: base in `1..=3`, no bits set outside
    /// `{0x80, 0x1f}`.
    pub fn is_strict_valid(self) -> bool {
        let base = self.base();
        if !(SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base) {
            return false;
        }
        self.0 & !(SIGHASH_ANYONECANPAY | 0x1f) == 0
    }
}

/// Drops the prefix of `script` up to and including the last executed
/// `OP_CODESEPARATOR`, then removes every push instruction whose payload
/// equals `sig` exactly, by re-parsing rather than scanning raw bytes
/// (a raw byte search could be fooled by the signature colliding with
/// opcode bytes elsewhere in the script).
pub fn find_and_delete(script: &[u8], last_code_sep: usize, sig: &[u8]) -> Result<Vec<u8>, ExecError> {
    let start = last_code_sep.min(script.len());
    let tail = &script[start..];
    let parsed = parse_script(tail)?;
    let kept: Vec<_> = parsed
        .into_iter()
        .filter(|instr| instr.op.data != sig)
        .map(|instr| instr.op)
        .collect();
    serialize_script(&kept)
}

/// Removes every push matching any of `sigs` from `script`, in one pass.
pub fn find_and_delete_many(
    script: &[u8],
    last_code_sep: usize,
    sigs: &[Vec<u8>],
) -> Result<Vec<u8>, ExecError> {
    let start = last_code_sep.min(script.len());
    let tail = &script[start..];
    let parsed = parse_script(tail)?;
    let kept: Vec<_> = parsed
        .into_iter()
        .filter(|instr| !sigs.iter().any(|s| *s == instr.op.data))
        .map(|instr| instr.op)
        .collect();
    serialize_script(&kept)
}

/// The sentinel digest returned for `SIGHASH_SINGLE` when the input
/// index has no matching output: the 32-byte value `1`, stored the way
/// Bitcoin Core's `uint256` would (first byte `0x01`, the rest zero).
fn single_sentinel() -> [u8; 32] {
    let mut h = [0u8; 32];
    h[0] = 1;
    h
}

/// Builds the legacy sighash digest (§4.7 "Digest").
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    subscript: &[u8],
    sighash_type: u8,
) -> [u8; 32] {
    let ty = SigHashType::from_byte(sighash_type);
    let base = ty.base();

    if base == SIGHASH_SINGLE && input_index >= tx.output.len() {
        return single_sentinel();
    }

    let mut modified = tx.clone();
    for (i, input) in modified.input.iter_mut().enumerate() {
        input.script_sig = if i == input_index {
            ScriptBuf::from_bytes(subscript.to_vec())
        } else {
            ScriptBuf::new()
        };
    }

    match base {
        SIGHASH_NONE => {
            modified.output.clear();
            for (i, input) in modified.input.iter_mut().enumerate() {
                if i != input_index {
                    input.sequence = Sequence::from_consensus(0);
                }
            }
        }
        SIGHASH_SINGLE => {
            modified.output.truncate(input_index + 1);
            for out in modified.output.iter_mut().take(input_index) {
                *out = TxOut {
                    value: Amount::from_sat(u64::MAX),
                    script_pubkey: ScriptBuf::new(),
                };
            }
            for (i, input) in modified.input.iter_mut().enumerate() {
                if i != input_index {
                    input.sequence = Sequence::from_consensus(0);
                }
            }
        }
        _ => {}
    }

    if ty.anyone_can_pay() {
        let kept = modified.input[input_index].clone();
        modified.input = vec![kept];
    }

    let mut preimage = bitcoin::consensus::encode::serialize(&modified);
    preimage.extend_from_slice(&(sighash_type as u32).to_le_bytes());
    sha256d::Hash::hash(&preimage).to_byte_array()
}
