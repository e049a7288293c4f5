//! The executor (C6) and engine facade (C9): advances an instruction
//! pointer over a parsed script, dispatching each opcode against the
//! stacks, the condition stack, and (for the crypto opcodes) the
//! signature pipeline.

use bitcoin::hashes::{hash160, ripemd160, sha1, sha256, sha256d, Hash};
use bitcoin::Transaction;
use log::{debug, trace};

use crate::checksig::{check_multisig, check_sig, validate_dummy_element};
use crate::data_structures::Stack;
use crate::error::ExecError;
use crate::opcode::{opcode_name, opcodes::*, parse_script, ParsedInstruction};
use crate::options::Options;
use crate::utils::ConditionStack;

pub const MAX_SCRIPT_SIZE: usize = 10_000;
pub const MAX_OPS_PER_SCRIPT: usize = 201;
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
pub const MAX_STACK_SIZE: usize = 1_000;
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// The engine's terminal verdict once a script finishes without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    EvalFalse,
}

/// One executing script plus its byte offset tracking, owned by `Exec`
/// for the duration of a single run. `Exec` only ever runs one script
/// per instance; a caller driving scriptSig → scriptPubKey → (P2SH)
/// redeemScript construction creates a fresh `Exec` per stage and
/// carries the resulting stacks forward by hand, matching the
/// specification's framing of P2SH chaining as the enclosing
/// collaborator's responsibility, not this core's.
struct Script {
    bytes: Vec<u8>,
    instructions: Vec<ParsedInstruction>,
}

/// The engine facade (C9): holds the transaction view, flags, program
/// counter, and both stacks, and drives per-instruction dispatch (C6).
pub struct Exec<'a> {
    tx: &'a Transaction,
    input_index: usize,
    opts: Options,

    script: Script,
    instr_index: usize,
    last_code_sep: usize,
    num_ops: usize,

    dstack: Stack,
    astack: Stack,
    cond_stack: ConditionStack,

    done: bool,
}

impl<'a> Exec<'a> {
    /// Builds a new engine for `script_bytes` against `tx`/`input_index`,
    /// seeding the data stack with `initial_stack` (e.g. the result of a
    /// prior scriptSig run, when evaluating a P2SH redeem script).
    pub fn new(
        tx: &'a Transaction,
        input_index: usize,
        script_bytes: Vec<u8>,
        initial_stack: Vec<Vec<u8>>,
        opts: Options,
    ) -> Result<Self, ExecError> {
        if script_bytes.len() > MAX_SCRIPT_SIZE {
            return Err(ExecError::ScriptTooBig);
        }
        let instructions = parse_script(&script_bytes)?;
        Ok(Self {
            tx,
            input_index,
            opts,
            script: Script {
                bytes: script_bytes,
                instructions,
            },
            instr_index: 0,
            last_code_sep: 0,
            num_ops: 0,
            dstack: Stack::from_u8_vec(initial_stack),
            astack: Stack::new(),
            cond_stack: ConditionStack::new(),
            done: false,
        })
    }

    pub fn dstack(&self) -> &Stack {
        &self.dstack
    }

    pub fn into_dstack_bytes(self) -> Vec<Vec<u8>> {
        self.dstack.to_u8_array()
    }

    /// Runs every remaining instruction to completion and returns the
    /// terminal verdict.
    pub fn exec(mut self) -> Result<(Verdict, Exec<'a>), ExecError> {
        while !self.done {
            if let Err(e) = self.step() {
                debug!("script aborted at instruction {}: {}", self.instr_index, e);
                return Err(e);
            }
        }
        let verdict = self.terminal_verdict()?;
        debug!("script finished: {:?}", verdict);
        Ok((verdict, self))
    }

    fn terminal_verdict(&self) -> Result<Verdict, ExecError> {
        if self.cond_stack.len() != 0 {
            return Err(ExecError::UnbalancedConditional);
        }
        if self.dstack.is_empty() {
            return Err(ExecError::EmptyStack);
        }
        if self.opts.clean_stack && self.dstack.len() + self.astack.len() != 1 {
            return Err(ExecError::CleanStack);
        }
        if self.dstack.topbool(-1)? {
            Ok(Verdict::Success)
        } else {
            Err(ExecError::EvalFalse)
        }
    }

    fn is_executing(&self) -> bool {
        self.cond_stack.all_true()
    }

    /// Executes exactly one instruction (C6's per-instruction procedure).
    fn step(&mut self) -> Result<(), ExecError> {
        if self.instr_index >= self.script.instructions.len() {
            self.done = true;
            return Ok(());
        }
        let instr = self.script.instructions[self.instr_index].clone();
        self.instr_index += 1;
        let op = &instr.op;

        trace!(
            "step {}: {} (depth {})",
            self.instr_index - 1,
            opcode_name(op.opcode),
            self.dstack.len()
        );

        if op.is_disabled() {
            return Err(ExecError::OpDisabled);
        }
        if op.is_always_illegal() {
            return Err(ExecError::ReservedOpcode);
        }

        if op.is_counted() {
            self.num_ops += 1;
            if self.num_ops > MAX_OPS_PER_SCRIPT {
                return Err(ExecError::TooManyOperations);
            }
        } else if op.data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ExecError::ElementTooBig);
        }

        let executing = self.is_executing();
        if !executing && !op.is_conditional() {
            return Ok(());
        }

        if executing && self.opts.requires_minimal_push() && op.is_data_push() {
            op.check_minimal_push()?;
        }

        if executing {
            self.dispatch(op.opcode, &op.data, instr.end)?;
        } else {
            // Only conditional opcodes reach here while skipping.
            self.dispatch_conditional_only(op.opcode)?;
        }

        if self.dstack.len() + self.astack.len() > MAX_STACK_SIZE {
            return Err(ExecError::StackOverflow);
        }
        Ok(())
    }

    /// `OP_IF`/`OP_NOTIF`/`OP_ELSE`/`OP_ENDIF` behavior while the
    /// surrounding branch is not executing: structure must still be
    /// tracked, but no stack value is consumed by `IF`/`NOTIF`.
    fn dispatch_conditional_only(&mut self, opcode: u8) -> Result<(), ExecError> {
        match opcode {
            OP_IF | OP_NOTIF => {
                self.cond_stack.push(false);
                Ok(())
            }
            OP_ELSE => {
                if self.cond_stack.is_empty() {
                    return Err(ExecError::UnbalancedConditional);
                }
                self.cond_stack.toggle_top();
                Ok(())
            }
            OP_ENDIF => {
                if !self.cond_stack.pop() {
                    return Err(ExecError::UnbalancedConditional);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn dispatch(&mut self, opcode: u8, data: &[u8], byte_offset_after: usize) -> Result<(), ExecError> {
        match opcode {
            OP_0 => {
                self.dstack.pushstr(&[]);
                Ok(())
            }
            OP_1NEGATE => {
                self.dstack.pushnum(-1);
                Ok(())
            }
            op if (OP_1..=OP_16).contains(&op) => {
                self.dstack.pushnum((op - OP_1 + 1) as i64);
                Ok(())
            }
            op if op <= 75 || matches!(op, OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4) => {
                self.dstack.pushstr(data);
                Ok(())
            }

            OP_NOP => Ok(()),
            op if crate::opcode::opcodes::is_upgradable_nop(op) => {
                if self.opts.discourage_upgradable_nops {
                    Err(ExecError::InvalidOpcode)
                } else {
                    Ok(())
                }
            }

            OP_IF => {
                let v = self.dstack.popbool()?;
                self.cond_stack.push(v);
                Ok(())
            }
            OP_NOTIF => {
                let v = self.dstack.popbool()?;
                self.cond_stack.push(!v);
                Ok(())
            }
            OP_ELSE => {
                if self.cond_stack.is_empty() {
                    return Err(ExecError::UnbalancedConditional);
                }
                self.cond_stack.toggle_top();
                Ok(())
            }
            OP_ENDIF => {
                if !self.cond_stack.pop() {
                    return Err(ExecError::UnbalancedConditional);
                }
                Ok(())
            }
            OP_VERIFY => {
                if self.dstack.popbool()? {
                    Ok(())
                } else {
                    Err(ExecError::VerifyFailed)
                }
            }
            OP_RETURN => Err(ExecError::EarlyReturn),

            OP_TOALTSTACK => {
                let v = self.dstack.pop().ok_or(ExecError::InvalidStackOperation)?;
                self.astack.push(v);
                Ok(())
            }
            OP_FROMALTSTACK => {
                let v = self.astack.pop().ok_or(ExecError::InvalidStackOperation)?;
                self.dstack.push(v);
                Ok(())
            }

            OP_2DROP => {
                self.dstack.needn(2)?;
                self.dstack.popn(2)
            }
            OP_2DUP => {
                self.dstack.needn(2)?;
                let a = self.dstack.get_entry(self.dstack.len() - 2);
                let b = self.dstack.get_entry(self.dstack.len() - 1);
                self.dstack.push(a);
                self.dstack.push(b);
                Ok(())
            }
            OP_3DUP => {
                self.dstack.needn(3)?;
                let n = self.dstack.len();
                for i in n - 3..n {
                    let e = self.dstack.get_entry(i);
                    self.dstack.push(e);
                }
                Ok(())
            }
            OP_2OVER => {
                self.dstack.needn(4)?;
                let n = self.dstack.len();
                let a = self.dstack.get_entry(n - 4);
                let b = self.dstack.get_entry(n - 3);
                self.dstack.push(a);
                self.dstack.push(b);
                Ok(())
            }
            OP_2ROT => {
                self.dstack.needn(6)?;
                let n = self.dstack.len();
                let a = self.dstack.get_entry(n - 6);
                let b = self.dstack.get_entry(n - 5);
                self.dstack.remove(n - 6);
                self.dstack.remove(n - 6);
                self.dstack.push(a);
                self.dstack.push(b);
                Ok(())
            }
            OP_2SWAP => {
                self.dstack.needn(4)?;
                let n = self.dstack.len();
                self.dstack.0.swap(n - 4, n - 2);
                self.dstack.0.swap(n - 3, n - 1);
                Ok(())
            }
            OP_IFDUP => {
                self.dstack.needn(1)?;
                if self.dstack.topbool(-1)? {
                    let top = self.dstack.get_entry(self.dstack.len() - 1);
                    self.dstack.push(top);
                }
                Ok(())
            }
            OP_DEPTH => {
                self.dstack.pushnum(self.dstack.len() as i64);
                Ok(())
            }
            OP_DROP => {
                self.dstack.needn(1)?;
                self.dstack.popn(1)
            }
            OP_DUP => {
                self.dstack.needn(1)?;
                let top = self.dstack.get_entry(self.dstack.len() - 1);
                self.dstack.push(top);
                Ok(())
            }
            OP_NIP => {
                self.dstack.needn(2)?;
                self.dstack.remove(self.dstack.len() - 2);
                Ok(())
            }
            OP_OVER => {
                self.dstack.needn(2)?;
                let e = self.dstack.get_entry(self.dstack.len() - 2);
                self.dstack.push(e);
                Ok(())
            }
            OP_PICK | OP_ROLL => {
                self.dstack.needn(1)?;
                let n = self.dstack.popnum(self.opts.requires_minimal_number())?;
                if n < 0 || n as usize >= self.dstack.len() {
                    return Err(ExecError::InvalidStackOperation);
                }
                let idx = self.dstack.len() - 1 - n as usize;
                let e = self.dstack.get_entry(idx);
                if opcode == OP_ROLL {
                    self.dstack.remove(idx);
                }
                self.dstack.push(e);
                Ok(())
            }
            OP_ROT => {
                self.dstack.needn(3)?;
                let n = self.dstack.len();
                let e = self.dstack.get_entry(n - 3);
                self.dstack.remove(n - 3);
                self.dstack.push(e);
                Ok(())
            }
            OP_SWAP => {
                self.dstack.needn(2)?;
                let n = self.dstack.len();
                self.dstack.0.swap(n - 2, n - 1);
                Ok(())
            }
            OP_TUCK => {
                self.dstack.needn(2)?;
                let n = self.dstack.len();
                let top = self.dstack.get_entry(n - 1);
                self.dstack.insert(n - 2, top);
                Ok(())
            }

            OP_SIZE => {
                self.dstack.needn(1)?;
                let len = self.dstack.topstr(-1)?.len();
                self.dstack.pushnum(len as i64);
                Ok(())
            }

            OP_EQUAL => {
                self.dstack.needn(2)?;
                let a = self.dstack.popstr()?;
                let b = self.dstack.popstr()?;
                self.dstack.pushbool(a == b);
                Ok(())
            }
            OP_EQUALVERIFY => {
                self.dstack.needn(2)?;
                let a = self.dstack.popstr()?;
                let b = self.dstack.popstr()?;
                if a == b {
                    Ok(())
                } else {
                    Err(ExecError::VerifyFailed)
                }
            }

            OP_1ADD => self.unary_num(|v| Ok(v + 1)),
            OP_1SUB => self.unary_num(|v| Ok(v - 1)),
            OP_NEGATE => self.unary_num(|v| Ok(-v)),
            OP_ABS => self.unary_num(|v| Ok(v.abs())),
            OP_NOT => self.unary_num(|v| Ok(i64::from(v == 0))),
            OP_0NOTEQUAL => self.unary_num(|v| Ok(i64::from(v != 0))),

            OP_ADD => self.binary_num(|v1, v0| Ok(v1 + v0)),
            OP_SUB => self.binary_num(|v1, v0| Ok(v1 - v0)),
            OP_BOOLAND => self.binary_num(|v1, v0| Ok(i64::from(v1 != 0 && v0 != 0))),
            OP_BOOLOR => self.binary_num(|v1, v0| Ok(i64::from(v1 != 0 || v0 != 0))),
            OP_NUMEQUAL => self.binary_num(|v1, v0| Ok(i64::from(v1 == v0))),
            OP_NUMEQUALVERIFY => {
                self.dstack.needn(2)?;
                let v0 = self.dstack.popnum(self.opts.requires_minimal_number())?;
                let v1 = self.dstack.popnum(self.opts.requires_minimal_number())?;
                if v1 == v0 {
                    Ok(())
                } else {
                    Err(ExecError::VerifyFailed)
                }
            }
            OP_NUMNOTEQUAL => self.binary_num(|v1, v0| Ok(i64::from(v1 != v0))),
            OP_LESSTHAN => self.binary_num(|v1, v0| Ok(i64::from(v1 < v0))),
            OP_GREATERTHAN => self.binary_num(|v1, v0| Ok(i64::from(v1 > v0))),
            OP_LESSTHANOREQUAL => self.binary_num(|v1, v0| Ok(i64::from(v1 <= v0))),
            OP_GREATERTHANOREQUAL => self.binary_num(|v1, v0| Ok(i64::from(v1 >= v0))),
            OP_MIN => self.binary_num(|v1, v0| Ok(v1.min(v0))),
            OP_MAX => self.binary_num(|v1, v0| Ok(v1.max(v0))),
            OP_WITHIN => {
                self.dstack.needn(3)?;
                let minimal = self.opts.requires_minimal_number();
                let max = self.dstack.popnum(minimal)?;
                let min = self.dstack.popnum(minimal)?;
                let x = self.dstack.popnum(minimal)?;
                self.dstack.pushbool(x >= min && x < max);
                Ok(())
            }

            OP_RIPEMD160 => self.hash_op(|d| ripemd160::Hash::hash(d).to_byte_array().to_vec()),
            OP_SHA1 => self.hash_op(|d| sha1::Hash::hash(d).to_byte_array().to_vec()),
            OP_SHA256 => self.hash_op(|d| sha256::Hash::hash(d).to_byte_array().to_vec()),
            OP_HASH160 => self.hash_op(|d| hash160::Hash::hash(d).to_byte_array().to_vec()),
            OP_HASH256 => self.hash_op(|d| sha256d::Hash::hash(d).to_byte_array().to_vec()),

            OP_CODESEPARATOR => {
                self.last_code_sep = byte_offset_after;
                Ok(())
            }

            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                self.dstack.needn(2)?;
                let pubkey = self.dstack.popstr()?;
                let sig = self.dstack.popstr()?;
                let ok = check_sig(
                    self.tx,
                    self.input_index,
                    &self.script.bytes,
                    self.last_code_sep,
                    &sig,
                    &pubkey,
                    &self.opts,
                )?;
                if opcode == OP_CHECKSIGVERIFY {
                    if ok {
                        Ok(())
                    } else {
                        Err(ExecError::VerifyFailed)
                    }
                } else {
                    self.dstack.pushbool(ok);
                    Ok(())
                }
            }

            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let ok = self.do_checkmultisig()?;
                if opcode == OP_CHECKMULTISIGVERIFY {
                    if ok {
                        Ok(())
                    } else {
                        Err(ExecError::VerifyFailed)
                    }
                } else {
                    self.dstack.pushbool(ok);
                    Ok(())
                }
            }

            _ => Err(ExecError::InvalidOpcode),
        }
    }

    fn do_checkmultisig(&mut self) -> Result<bool, ExecError> {
        self.dstack.needn(1)?;
        let minimal = self.opts.requires_minimal_number();
        let n = self.dstack.popnum(minimal)?;
        if !(0..=MAX_PUBKEYS_PER_MULTISIG as i64).contains(&n) {
            return Err(ExecError::TooManyPubkeys);
        }
        let n = n as usize;
        self.num_ops += n;
        if self.num_ops > MAX_OPS_PER_SCRIPT {
            return Err(ExecError::TooManyOperations);
        }
        self.dstack.needn(n)?;
        let mut pubkeys = Vec::with_capacity(n);
        for _ in 0..n {
            pubkeys.push(self.dstack.popstr()?);
        }
        pubkeys.reverse();

        self.dstack.needn(1)?;
        let m = self.dstack.popnum(minimal)?;
        if !(0..=n as i64).contains(&m) {
            return Err(ExecError::InvalidStackOperation);
        }
        let m = m as usize;
        self.dstack.needn(m)?;
        let mut sigs = Vec::with_capacity(m);
        for _ in 0..m {
            sigs.push(self.dstack.popstr()?);
        }
        sigs.reverse();

        let dummy = self.dstack.popstr()?;
        validate_dummy_element(&dummy, &self.opts)?;

        check_multisig(
            self.tx,
            self.input_index,
            &self.script.bytes,
            self.last_code_sep,
            &sigs,
            &pubkeys,
            &self.opts,
        )
    }

    fn unary_num(&mut self, f: impl Fn(i64) -> Result<i64, ExecError>) -> Result<(), ExecError> {
        self.dstack.needn(1)?;
        let v = self.dstack.popnum(self.opts.requires_minimal_number())?;
        self.dstack.pushnum(f(v)?);
        Ok(())
    }

    fn binary_num(&mut self, f: impl Fn(i64, i64) -> Result<i64, ExecError>) -> Result<(), ExecError> {
        self.dstack.needn(2)?;
        let minimal = self.opts.requires_minimal_number();
        let v0 = self.dstack.popnum(minimal)?;
        let v1 = self.dstack.popnum(minimal)?;
        self.dstack.pushnum(f(v1, v0)?);
        Ok(())
    }

    fn hash_op(&mut self, f: impl Fn(&[u8]) -> Vec<u8>) -> Result<(), ExecError> {
        self.dstack.needn(1)?;
        let data = self.dstack.popstr()?;
        self.dstack.pushstr(&f(&data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness};

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

    fn run(script: &[u8]) -> Result<Verdict, ExecError> {
        let tx = dummy_tx();
        let exec = Exec::new(&tx, 0, script.to_vec(), vec![], Options::new())?;
        exec.exec().map(|(v, _)| v)
    }

    #[test]
    fn s1_add_equal_succeeds() {
        let script = [0x51u8, 0x51, 0x93, 0x52, 0x87];
        assert_eq!(run(&script), Ok(Verdict::Success));
    }

    #[test]
    fn s2_eval_false() {
        let script = [0x60u8, 0x51, 0x87];
        assert_eq!(run(&script), Err(ExecError::EvalFalse));
    }

    #[test]
    fn s3_if_else_endif() {
        let script = [0x51u8, 0x63, 0x51, 0x67, 0x00, 0x68];
        assert_eq!(run(&script), Ok(Verdict::Success));
    }

    #[test]
    fn s4_early_return() {
        let script = [0x6au8];
        assert_eq!(run(&script), Err(ExecError::EarlyReturn));
    }

    #[test]
    fn s5_equal_direct_pushes() {
        let script = [0x01u8, 0x05, 0x01, 0x05, 0x87];
        assert_eq!(run(&script), Ok(Verdict::Success));
    }

    #[test]
    fn s6_minimal_data_rejected() {
        let tx = dummy_tx();
        let script = [0x4cu8, 0x01, 0x05];
        let opts = Options {
            verify_minimal_data: true,
            ..Options::new()
        };
        let exec = Exec::new(&tx, 0, script.to_vec(), vec![], opts).unwrap();
        assert_eq!(exec.exec().err(), Some(ExecError::MinimalData));
    }

    #[test]
    fn pick_zero_duplicates_top() {
        let tx = dummy_tx();
        // push 7, push 0, OP_PICK: duplicates the top, leaving [7, 7].
        let script = [0x57u8, 0x00, 0x79];
        let exec = Exec::new(&tx, 0, script.to_vec(), vec![], Options::new()).unwrap();
        let (verdict, exec) = exec.exec().unwrap();
        assert_eq!(verdict, Verdict::Success);
        assert_eq!(exec.dstack().len(), 2);
    }

    #[test]
    fn pick_at_depth_fails() {
        let tx = dummy_tx();
        // push 7, push 1, OP_PICK: only one item below, index 1 is out of range.
        let script = [0x57u8, 0x51, 0x79];
        let exec = Exec::new(&tx, 0, script.to_vec(), vec![], Options::new()).unwrap();
        assert_eq!(exec.exec().err(), Some(ExecError::InvalidStackOperation));
    }

    #[test]
    fn disabled_opcode_fails_even_when_skipped() {
        // OP_0 OP_IF OP_CAT OP_ENDIF -- CAT is inside a false branch.
        let script = [0x00u8, 0x63, 0x7e, 0x68];
        assert_eq!(run(&script), Err(ExecError::OpDisabled));
    }

    #[test]
    fn always_illegal_fails_even_when_skipped() {
        let script = [0x00u8, 0x63, 0x65, 0x68];
        assert_eq!(run(&script), Err(ExecError::ReservedOpcode));
    }

    #[test]
    fn element_too_big_rejected() {
        // PUSHDATA2 with a 521-byte payload exceeds MAX_SCRIPT_ELEMENT_SIZE.
        let mut big = vec![0x4du8, 0x09, 0x02];
        big.extend(vec![0u8; 521]);
        assert_eq!(run(&big), Err(ExecError::ElementTooBig));
    }

    #[test]
    fn element_at_limit_succeeds() {
        // PUSHDATA2 with exactly 520 bytes is allowed (trailing 0x01 so the
        // resulting top-of-stack value is truthy).
        let mut ok = vec![0x4du8, 0x08, 0x02];
        ok.extend(vec![0u8; 519]);
        ok.push(0x01);
        assert_eq!(run(&ok), Ok(Verdict::Success));
    }

    #[test]
    fn within_boundaries() {
        // 5 within [5, 10) -> true
        let script_true = [0x55u8, 0x55, 0x5a, 0xa5]; // 5 5 10 WITHIN
        assert_eq!(run(&script_true), Ok(Verdict::Success));
    }
}
