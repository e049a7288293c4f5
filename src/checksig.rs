//! Signature-check opcode handlers (C7, second half): `OP_CHECKSIG`,
//! `OP_CHECKSIGVERIFY`, `OP_CHECKMULTISIG`, `OP_CHECKMULTISIGVERIFY`.

use bitcoin::secp256k1::ecdsa::Signature as EcdsaSignature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1};
use bitcoin::Transaction;

use crate::error::ExecError;
use crate::options::Options;
use crate::sighash::{find_and_delete, find_and_delete_many, legacy_sighash, SigHashType};

/// Checks a DER-encoded ECDSA signature's hashtype byte and, when
/// `opts.strict_encoding`/`opts.der_signatures` is set, its raw
/// encoding. Returns the signature body (without the trailing hashtype
/// byte) and the hashtype.
///
/// An empty `sig` is always treated as a deliberate "null signature"
/// distinct from an encoding violation; callers decide what to do with
/// it (`CHECKSIG` fails cleanly, `CHECKMULTISIG`'s dummy-pop bug
/// tolerates it).
fn split_sig<'a>(sig: &'a [u8], opts: &Options) -> Result<(&'a [u8], u8), ExecError> {
    if sig.is_empty() {
        return Err(ExecError::InvalidSignatureEncoding);
    }
    let (body, hashtype) = sig.split_at(sig.len() - 1);
    let hashtype = hashtype[0];

    if opts.strict_encoding && !SigHashType::from_byte(hashtype).is_strict_valid() {
        return Err(ExecError::InvalidHashType);
    }
    if (opts.strict_encoding || opts.der_signatures) && !is_strict_der(body) {
        return Err(ExecError::InvalidSignatureEncoding);
    }
    if opts.low_s && !is_low_s(body) {
        return Err(ExecError::InvalidSignatureEncoding);
    }
    Ok((body, hashtype))
}

/// BIP-66 strict DER structure check: a single well-formed
/// `SEQUENCE { INTEGER r, INTEGER s }` with no trailing garbage and no
/// leading zero padding beyond what the sign bit requires.
fn is_strict_der(sig: &[u8]) -> bool {
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 2 {
        return false;
    }
    if sig[2] != 0x02 {
        return false;
    }
    let len_r = sig[3] as usize;
    if len_r == 0 || 4 + len_r >= sig.len() {
        return false;
    }
    if sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0 && sig[5] & 0x80 == 0 {
        return false;
    }
    let s_type_pos = 4 + len_r;
    if sig[s_type_pos] != 0x02 {
        return false;
    }
    let len_s_pos = s_type_pos + 1;
    if len_s_pos >= sig.len() {
        return false;
    }
    let len_s = sig[len_s_pos] as usize;
    if len_s == 0 || len_s_pos + 1 + len_s != sig.len() {
        return false;
    }
    let s_pos = len_s_pos + 1;
    if sig[s_pos] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[s_pos] == 0 && sig[s_pos + 1] & 0x80 == 0 {
        return false;
    }
    true
}

/// Rejects a DER signature whose `s` value is in the upper half of the
/// curve order (BIP-146 low-S rule), by round-tripping through
/// `secp256k1`'s own normalization.
fn is_low_s(sig: &[u8]) -> bool {
    let Ok(mut parsed) = EcdsaSignature::from_der(sig) else {
        return false;
    };
    let before = parsed.serialize_compact();
    parsed.normalize_s();
    before == parsed.serialize_compact()
}

fn check_pubkey_encoding(pubkey: &[u8], opts: &Options) -> Result<(), ExecError> {
    if !opts.strict_encoding {
        return Ok(());
    }
    let valid = matches!(
        (pubkey.first(), pubkey.len()),
        (Some(0x04), 65) | (Some(0x02), 33) | (Some(0x03), 33)
    );
    if valid {
        Ok(())
    } else {
        Err(ExecError::InvalidPubKeyEncoding)
    }
}

/// Verifies a single ECDSA signature against `pubkey` over the legacy
/// sighash digest of `tx`/`input_index` with subscript `script_code`.
///
/// A malformed pubkey or signature body (after encoding checks have
/// already passed, e.g. `strict_encoding` is off) is treated as a
/// verification failure rather than a hard error, matching consensus
/// behavior: scripts historically push garbage pubkeys and rely on the
/// check simply failing.
pub fn check_sig(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    last_code_sep: usize,
    sig: &[u8],
    pubkey: &[u8],
    opts: &Options,
) -> Result<bool, ExecError> {
    if sig.is_empty() {
        return Ok(false);
    }
    let (sig_body, hashtype) = split_sig(sig, opts)?;
    check_pubkey_encoding(pubkey, opts)?;

    let subscript = find_and_delete(script_code, last_code_sep, sig)?;
    let digest = legacy_sighash(tx, input_index, &subscript, hashtype);

    Ok(verify_ecdsa(sig_body, &digest, pubkey))
}

fn verify_ecdsa(sig_body: &[u8], digest: &[u8; 32], pubkey: &[u8]) -> bool {
    let (Ok(signature), Ok(pk)) = (
        EcdsaSignature::from_der(sig_body),
        PublicKey::from_slice(pubkey),
    ) else {
        return false;
    };
    let msg = Message::from_digest(*digest);
    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&msg, &signature, &pk).is_ok()
}

/// Runs the `OP_CHECKMULTISIG` M-of-N loop.
///
/// Preserves the off-by-one "dummy pop" consensus quirk: callers must
/// pop and discard one extra stack element (which real-world scripts
/// pad with an empty push) after popping `n` pubkeys, `m` signatures,
/// and the two counts. If `opts.strict_multisig`, that extra element
/// must be exactly the empty string or this returns an error.
///
/// Signatures and pubkeys are each consumed from the top down and must
/// match in relative order, but N need not equal M: unmatched pubkeys
/// are skipped. Pubkey encoding is checked lazily, only for pubkeys the
/// cursor loop actually attempts against the current signature, not for
/// every popped pubkey up front: a pubkey past the last match never gets
/// inspected, matching consensus.
pub fn check_multisig(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    last_code_sep: usize,
    sigs: &[Vec<u8>],
    pubkeys: &[Vec<u8>],
    opts: &Options,
) -> Result<bool, ExecError> {
    let subscript = find_and_delete_many(script_code, last_code_sep, sigs)?;

    let mut pk_iter = pubkeys.iter();
    'sigs: for sig in sigs {
        if sig.is_empty() {
            return Ok(false);
        }
        let (sig_body, hashtype) = split_sig(sig, opts)?;
        let digest = legacy_sighash(tx, input_index, &subscript, hashtype);
        for pk in pk_iter.by_ref() {
            check_pubkey_encoding(pk, opts)?;
            if verify_ecdsa(sig_body, &digest, pk) {
                continue 'sigs;
            }
        }
        return Ok(false);
    }
    Ok(true)
}

pub fn validate_dummy_element(dummy: &[u8], opts: &Options) -> Result<(), ExecError> {
    if opts.strict_multisig && !dummy.is_empty() {
        Err(ExecError::InvalidSignatureEncoding)
    } else {
        Ok(())
    }
}
