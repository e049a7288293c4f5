//! Execution core for a Bitcoin-style Script interpreter.
//!
//! This crate evaluates the stack-based bytecode that guards transaction
//! outputs: opcode dispatch, the conditional execution stack, and the
//! signature-check pipeline (sighash construction, DER/pubkey encoding
//! checks, ECDSA verification). Tokenization of the raw transaction,
//! the transaction model beyond a read-only [`bitcoin::Transaction`]
//! borrow, address/template classification, and a disassembly
//! pretty-printer are left to callers; this crate supplies only the
//! classification and rendering primitives on [`ParsedOpcode`] that
//! they need.
//!
//! The entry point is [`Exec`]: build one with a script, a transaction
//! view, an input index, and an [`Options`] flag set, then call
//! [`Exec::exec`] to run it to completion.

pub mod checksig;
pub mod data_structures;
pub mod error;
pub mod exec;
pub mod opcode;
pub mod options;
pub mod sighash;
pub mod utils;

pub use data_structures::{Stack, StackEntry};
pub use error::ExecError;
pub use exec::{Exec, Verdict};
pub use opcode::{opcode_name, opcodes, parse_script, serialize_script, ParsedInstruction, ParsedOpcode};
pub use options::Options;
pub use utils::{read_scriptint, scriptint_vec};

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

    fn dummy_tx() -> Transaction {
        Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::from_byte_array([0u8; 32]), 0),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(1),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    /// Exercises the crate root's public surface end to end, independent
    /// of any single module's internal test suite.
    #[test]
    fn public_api_runs_a_script() {
        let tx = dummy_tx();
        let script = vec![0x51, 0x51, 0x93, 0x52, 0x87]; // 1 1 ADD 2 EQUAL
        let exec = Exec::new(&tx, 0, script, vec![], Options::new()).unwrap();
        let (verdict, _) = exec.exec().unwrap();
        assert_eq!(verdict, Verdict::Success);
    }

    #[test]
    fn p2sh_style_two_stage_eval_passes_stack_forward() {
        // First stage (a stand-in scriptSig): push the redeem script bytes.
        let tx = dummy_tx();
        let redeem = vec![0x51u8]; // OP_TRUE as the "redeem script"
        let script_sig = vec![0x51u8]; // push OP_TRUE onto the stack
        let exec1 = Exec::new(&tx, 0, script_sig, vec![], Options::new()).unwrap();
        let (_, exec1) = exec1.exec().unwrap();
        let dstack = exec1.into_dstack_bytes();

        let exec2 = Exec::new(&tx, 0, redeem, dstack, Options::new()).unwrap();
        let (verdict, _) = exec2.exec().unwrap();
        assert_eq!(verdict, Verdict::Success);
    }
}
