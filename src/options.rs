/// Execution options affecting strictness (C8).
///
/// Plain booleans, `Copy`: this is threaded through every opcode
/// handler, so it stays on the stack rather than behind a pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Treat a pay-to-script-hash pattern specially. The redeem-script
    /// re-evaluation itself is driven by the caller, not this engine;
    /// this flag only affects whether the caller should do so.
    pub bip16: bool,
    /// Enforce strict DER signatures, hashtype validity, and canonical
    /// pubkey length.
    pub strict_encoding: bool,
    /// Enforce DER-only signature encoding (subset of `strict_encoding`).
    pub der_signatures: bool,
    /// Reject signatures with a non-canonical (high) S value.
    pub low_s: bool,
    /// Require `OP_CHECKMULTISIG`'s dummy argument to be the empty
    /// string.
    pub strict_multisig: bool,
    /// Fail on `OP_NOP1..OP_NOP10`.
    pub discourage_upgradable_nops: bool,
    /// Enforce minimal push encoding and minimal number decoding.
    pub verify_minimal_data: bool,
    /// Fail if more than one element remains on the stack at the end of
    /// a successful evaluation.
    pub clean_stack: bool,
}

impl Options {
    /// All flags off, matching the historical, pre-BIP62/66 rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every strictness flag on.
    pub fn strict() -> Self {
        Self {
            bip16: true,
            strict_encoding: true,
            der_signatures: true,
            low_s: true,
            strict_multisig: true,
            discourage_upgradable_nops: true,
            verify_minimal_data: true,
            clean_stack: true,
        }
    }

    pub fn requires_minimal_push(&self) -> bool {
        self.verify_minimal_data
    }

    pub fn requires_minimal_number(&self) -> bool {
        self.verify_minimal_data
    }
}
