use core::fmt;

/// The single failure kind reported for an aborted script evaluation.
///
/// Handlers return these directly; the executor never wraps or
/// reinterprets them, except for the signature-check handlers, where a
/// malformed (but not strictly-rejected) signature or public key becomes
/// a pushed `false` instead of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    // --- Encoding ---
    /// The opcode byte does not correspond to a push whose length is
    /// self-consistent with the remaining script bytes.
    InvalidOpcode,
    /// A push opcode did not use the shortest possible encoding for its
    /// payload, and `VerifyMinimalData` is set.
    MinimalData,
    /// A number popped off the stack was not minimally encoded, and
    /// minimal-number decoding was required.
    MinimalNumberEncoding,
    /// A number popped off the stack was longer than the accepted size.
    NumberOverflow,
    /// A signature's DER encoding violated BIP-66 (or its S value was
    /// not canonical under `LowS`).
    InvalidSignatureEncoding,
    /// A public key was not 33-byte compressed or 65-byte uncompressed
    /// under `StrictEncoding`.
    InvalidPubKeyEncoding,
    /// A signature's hashtype byte had bits set outside `{0x80, 0x1F}`
    /// or a base value outside `1..3`, under `StrictEncoding`.
    InvalidHashType,

    // --- Semantic ---
    /// A disabled opcode was traversed.
    OpDisabled,
    /// `OP_VERIF`/`OP_VERNOTIF` was traversed.
    ReservedOpcode,
    /// `OP_RETURN` was executed.
    EarlyReturn,
    /// `OP_VERIFY`/`OP_*VERIFY` popped a false value.
    VerifyFailed,
    /// `OP_ELSE`/`OP_ENDIF` executed with no matching `OP_IF`.
    UnbalancedConditional,

    // --- Resource ---
    /// More than `MAX_OPS_PER_SCRIPT` counted opcodes were executed.
    TooManyOperations,
    /// A pushed element exceeded `MAX_SCRIPT_ELEMENT_SIZE`.
    ElementTooBig,
    /// The combined data/alt stack exceeded `MAX_STACK_SIZE`.
    StackOverflow,
    /// `OP_CHECKMULTISIG`'s pubkey count was outside `0..=20`.
    TooManyPubkeys,
    /// The script exceeded `MAX_SCRIPT_SIZE` bytes.
    ScriptTooBig,

    // --- Stack ---
    /// A stack operation underflowed, or an index argument was out of
    /// range.
    InvalidStackOperation,

    // --- Termination ---
    /// The data stack was empty where a result was required.
    EmptyStack,
    /// `CleanStack` was requested and more than one element remained.
    CleanStack,
    /// The final top-of-stack value was false.
    EvalFalse,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ExecError::*;

        let msg = match self {
            InvalidOpcode => "invalid opcode",
            MinimalData => "not minimally encoded push",
            MinimalNumberEncoding => "not minimally encoded number",
            NumberOverflow => "numeric overflow (number larger than accepted size)",
            InvalidSignatureEncoding => "invalid signature encoding",
            InvalidPubKeyEncoding => "invalid public key encoding",
            InvalidHashType => "invalid hashtype",
            OpDisabled => "disabled opcode",
            ReservedOpcode => "reserved opcode",
            EarlyReturn => "OP_RETURN encountered",
            VerifyFailed => "verify failed",
            UnbalancedConditional => "unbalanced conditional",
            TooManyOperations => "too many operations",
            ElementTooBig => "pushed element too big",
            StackOverflow => "stack size exceeded",
            TooManyPubkeys => "too many pubkeys in multisig",
            ScriptTooBig => "script too big",
            InvalidStackOperation => "invalid stack operation",
            EmptyStack => "stack empty at end of script",
            CleanStack => "stack not clean at end of script",
            EvalFalse => "script evaluated to false",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ExecError {}
