use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use bitcoin_script_vm::{ExecError, Exec, Options, Verdict};

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

fn run_with(script: &[u8], opts: Options) -> Result<Verdict, ExecError> {
    let tx = dummy_tx();
    let exec = Exec::new(&tx, 0, script.to_vec(), vec![], opts)?;
    exec.exec().map(|(v, _)| v)
}

fn run(script: &[u8]) -> Result<Verdict, ExecError> {
    run_with(script, Options::new())
}

#[test]
fn s1_push_add_equal_succeeds() {
    assert_eq!(run(&[0x51, 0x51, 0x93, 0x52, 0x87]), Ok(Verdict::Success));
}

#[test]
fn s2_mismatched_equal_is_eval_false() {
    assert_eq!(run(&[0x60, 0x51, 0x87]), Err(ExecError::EvalFalse));
}

#[test]
fn s3_if_else_endif_takes_true_branch() {
    assert_eq!(run(&[0x51, 0x63, 0x51, 0x67, 0x00, 0x68]), Ok(Verdict::Success));
}

#[test]
fn s4_op_return_aborts() {
    assert_eq!(run(&[0x6a]), Err(ExecError::EarlyReturn));
}

#[test]
fn s5_direct_pushes_compare_equal() {
    assert_eq!(run(&[0x01, 0x05, 0x01, 0x05, 0x87]), Ok(Verdict::Success));
}

#[test]
fn s6_non_minimal_pushdata_rejected_under_strict_flag() {
    let opts = Options { verify_minimal_data: true, ..Options::new() };
    assert_eq!(run_with(&[0x4c, 0x01, 0x05], opts), Err(ExecError::MinimalData));
}

#[test]
fn s6_same_script_passes_without_the_flag() {
    assert_eq!(run(&[0x4c, 0x01, 0x05]), Ok(Verdict::Success));
}

#[test]
fn boundary_push_of_520_bytes_succeeds() {
    let mut script = vec![0x4d, 0x08, 0x02]; // PUSHDATA2 len=520
    script.extend(vec![0u8; 519]);
    script.push(0x01);
    assert_eq!(run(&script), Ok(Verdict::Success));
}

#[test]
fn boundary_push_of_521_bytes_fails() {
    let mut script = vec![0x4d, 0x09, 0x02]; // PUSHDATA2 len=521
    script.extend(vec![0u8; 521]);
    assert_eq!(run(&script), Err(ExecError::ElementTooBig));
}

#[test]
fn boundary_201_counted_opcodes_succeed() {
    // OP_1 (uncounted push) followed by exactly 201 counted OP_1ADDs.
    let mut script = vec![0x51u8];
    script.extend(vec![0x8bu8; 201]);
    assert_eq!(run(&script), Ok(Verdict::Success));
}

#[test]
fn boundary_202_counted_opcodes_fail() {
    let mut script = vec![0x51u8];
    script.extend(vec![0x8bu8; 202]);
    assert_eq!(run(&script), Err(ExecError::TooManyOperations));
}

#[test]
fn boundary_pick_zero_duplicates_top() {
    let script = [0x57u8, 0x00, 0x79]; // 7 0 PICK
    let tx = dummy_tx();
    let exec = Exec::new(&tx, 0, script.to_vec(), vec![], Options::new()).unwrap();
    let (verdict, exec) = exec.exec().unwrap();
    assert_eq!(verdict, Verdict::Success);
    assert_eq!(exec.dstack().len(), 2);
}

#[test]
fn boundary_pick_at_depth_fails() {
    let script = [0x57u8, 0x51, 0x79]; // 7 1 PICK, only one item below
    assert_eq!(run(&script), Err(ExecError::InvalidStackOperation));
}

#[test]
fn boundary_within_inclusive_lower_exclusive_upper() {
    // WITHIN(5, 5, 10) = 1
    assert_eq!(run(&[0x55, 0x55, 0x5a, 0xa5]), Ok(Verdict::Success));
    // WITHIN(10, 5, 10) = 0 -> EvalFalse
    assert_eq!(run(&[0x5a, 0x55, 0x5a, 0xa5]), Err(ExecError::EvalFalse));
}

#[test]
fn disabled_opcode_fails_even_inside_a_false_branch() {
    // OP_0 IF OP_CAT ENDIF -- CAT sits in a never-taken branch but must still fail.
    assert_eq!(run(&[0x00, 0x63, 0x7e, 0x68]), Err(ExecError::OpDisabled));
}

#[test]
fn always_illegal_opcode_fails_even_inside_a_false_branch() {
    assert_eq!(run(&[0x00, 0x63, 0x65, 0x68]), Err(ExecError::ReservedOpcode));
}

#[test]
fn nested_conditionals_return_cond_stack_to_balanced() {
    // IF (true) { IF (false) {1} ELSE {2} ENDIF } ENDIF  -- should leave [2].
    let script = [0x51u8, 0x63, 0x00, 0x63, 0x51, 0x67, 0x52, 0x68, 0x68];
    assert_eq!(run(&script), Ok(Verdict::Success));
}

#[test]
fn unbalanced_else_without_if_errors() {
    assert_eq!(run(&[0x67]), Err(ExecError::UnbalancedConditional));
}

#[test]
fn unbalanced_endif_without_if_errors() {
    assert_eq!(run(&[0x68]), Err(ExecError::UnbalancedConditional));
}

#[test]
fn clean_stack_flag_rejects_leftover_elements() {
    let opts = Options { clean_stack: true, ..Options::new() };
    // Leaves two items: 1 and 2.
    assert_eq!(run_with(&[0x51, 0x52], opts), Err(ExecError::CleanStack));
}

#[test]
fn discourage_upgradable_nops_rejects_nop1() {
    let opts = Options { discourage_upgradable_nops: true, ..Options::new() };
    assert!(run_with(&[0xb0], opts).is_err());
}

#[test]
fn upgradable_nops_are_noop_by_default() {
    assert_eq!(run(&[0x51, 0xb0]), Ok(Verdict::Success));
}
