use crate::data_structures::ScriptIntError;
use crate::ExecError;

/// A data type to abstract out the condition stack during script execution (C3).
///
/// Conceptually it acts like a vector of booleans, one for each level of nested
/// IF/THEN/ELSE, indicating whether we're in the active or inactive branch of
/// each.
///
/// The elements on the stack cannot be observed individually; we only need to
/// expose whether the stack is empty and whether or not any false values are
/// present at all. To implement OP_ELSE, a toggle_top modifier is added, which
/// flips the last value without returning it.
///
/// This uses an optimized implementation that does not materialize the
/// actual stack. Instead, it just stores the size of the would-be stack,
/// and the position of the first false value in it. Once a false value is
/// buried under the top, pushing or toggling anything above it is
/// unobservable from the outside, which is exactly the {TRUE, FALSE, SKIP}
/// semantics the specification describes: a nested IF/NOTIF opened while
/// already non-executing behaves as SKIP no matter what its own ELSE does.
pub struct ConditionStack {
    /// The size of the implied stack.
    size: usize,
    /// The position of the first false value on the implied stack,
    /// or NO_FALSE if all true.
    first_false_pos: usize,
}

impl ConditionStack {
    /// A constant for first_false_pos to indicate there are no falses.
    const NO_FALSE: usize = usize::MAX;

    pub fn new() -> Self {
        Self {
            size: 0,
            first_false_pos: Self::NO_FALSE,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn all_true(&self) -> bool {
        self.first_false_pos == Self::NO_FALSE
    }

    pub fn push(&mut self, v: bool) {
        if self.first_false_pos == Self::NO_FALSE && !v {
            // The stack consists of all true values, and a false is added.
            // The first false value will appear at the current size.
            self.first_false_pos = self.size;
        }
        self.size += 1;
    }

    /// Returns `false` if it was empty, `true` otherwise.
    ///
    /// Note that the popped value is not returned.
    pub fn pop(&mut self) -> bool {
        if self.size == 0 {
            false
        } else {
            self.size -= 1;
            if self.first_false_pos == self.size {
                // When popping off the first false value, everything becomes true.
                self.first_false_pos = Self::NO_FALSE;
            }
            true
        }
    }

    pub fn toggle_top(&mut self) -> bool {
        if self.size == 0 {
            false
        } else {
            if self.first_false_pos == Self::NO_FALSE {
                // The current stack is all true values; the first false will be the top.
                self.first_false_pos = self.size - 1;
            } else if self.first_false_pos == self.size - 1 {
                // The top is the first false value; toggling it will make everything true.
                self.first_false_pos = Self::NO_FALSE;
            } else {
                // There is a false value, but not on top. No action is needed as toggling
                // anything but the first false value is unobservable.
            }
            true
        }
    }
}

impl Default for ConditionStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a script integer popped or peeked off a stack.
///
/// Thin wrapper over [`read_scriptint_size`] converting the
/// library-internal [`ScriptIntError`] to the public [`ExecError`]
/// variant the specification names for this context.
pub fn read_scriptint(item: &[u8], max_size: usize, minimal: bool) -> Result<i64, ExecError> {
    read_scriptint_size(item, max_size, minimal).map_err(|e| match e {
        ScriptIntError::NonMinimalPush => ExecError::MinimalNumberEncoding,
        ScriptIntError::NumericOverflow => ExecError::NumberOverflow,
    })
}

/// Decodes an integer in script format with a flexible size limit.
///
/// Note that in the majority of cases, you will want [`read_scriptint`]
/// instead, which maps onto the public error type directly.
///
/// Panics if max_size exceeds 8.
pub fn read_scriptint_size(
    v: &[u8],
    max_size: usize,
    minimal: bool,
) -> Result<i64, ScriptIntError> {
    assert!(max_size <= 8);

    if v.len() > max_size {
        return Err(ScriptIntError::NumericOverflow);
    }

    if v.is_empty() {
        return Ok(0);
    }

    if minimal {
        let last = match v.last() {
            Some(last) => last,
            None => return Ok(0),
        };
        // Comment and code copied from Bitcoin Core:
        // https://github.com/bitcoin/bitcoin/blob/447f50e4aed9a8b1d80e1891cda85801aeb80b4e/src/script/script.h#L247-L262
        // If the most-significant-byte - excluding the sign bit - is zero
        // then we're not minimal. Note how this test also rejects the
        // negative-zero encoding, 0x80.
        if (*last & 0x7f) == 0 {
            // One exception: if there's more than one byte and the most
            // significant bit of the second-most-significant-byte is set
            // it would conflict with the sign bit. An example of this case
            // is +-255, which encode to 0xff00 and 0xff80 respectively.
            // (big-endian).
            if v.len() <= 1 || (v[v.len() - 2] & 0x80) == 0 {
                return Err(ScriptIntError::NonMinimalPush);
            }
        }
    }

    Ok(scriptint_parse(v))
}

// Caller to guarantee that `v` is not empty.
fn scriptint_parse(v: &[u8]) -> i64 {
    let (mut ret, sh) = v
        .iter()
        .fold((0, 0), |(acc, sh), n| (acc + ((*n as i64) << sh), sh + 8));
    if v[v.len() - 1] & 0x80 != 0 {
        ret &= (1 << (sh - 1)) - 1;
        ret = -ret;
    }
    ret
}

/// Returns minimally encoded scriptint as a byte vector.
pub fn scriptint_vec(n: i64) -> Vec<u8> {
    let mut buf = [0u8; 9];
    let len = write_scriptint(&mut buf, n);
    buf[0..len].to_vec()
}

/// Encodes an integer in script (minimal `CScriptNum`) format.
///
/// Writes bytes into the buffer and returns the number of bytes written.
pub fn write_scriptint(out: &mut [u8; 9], n: i64) -> usize {
    let mut len = 0;
    if n == 0 {
        return len;
    }

    let neg = n < 0;
    let mut abs = n.unsigned_abs();

    while abs > 0xFF {
        out[len] = (abs & 0xFF) as u8;
        len += 1;
        abs >>= 8;
    }
    // If the number's value causes the sign bit to be set, we need an
    // extra byte to get the correct value and correct sign bit.
    if abs & 0x80 != 0 {
        out[len] = abs as u8;
        len += 1;
        out[len] = if neg { 0x80u8 } else { 0u8 };
        len += 1;
    } else {
        abs |= if neg { 0x80 } else { 0 };
        out[len] = abs as u8;
        len += 1;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for n in [
            0i64, 1, -1, 16, -16, 127, -127, 128, -128, 32767, -32767, 1_000_000, -1_000_000,
        ] {
            let enc = scriptint_vec(n);
            let dec = read_scriptint_size(&enc, 4, true).unwrap();
            assert_eq!(dec, n, "roundtrip failed for {n}");
        }
    }

    #[test]
    fn zero_is_empty() {
        assert_eq!(scriptint_vec(0), Vec::<u8>::new());
    }

    #[test]
    fn non_minimal_rejected() {
        // 0x05 0x00 is a non-minimal encoding of 5.
        assert_eq!(
            read_scriptint_size(&[0x05, 0x00], 4, true),
            Err(ScriptIntError::NonMinimalPush)
        );
        assert_eq!(read_scriptint_size(&[0x05, 0x00], 4, false), Ok(1285));
    }

    #[test]
    fn overflow_rejected() {
        assert_eq!(
            read_scriptint_size(&[1, 2, 3, 4, 5], 4, true),
            Err(ScriptIntError::NumericOverflow)
        );
    }

    #[test]
    fn negative_255_boundary() {
        // +255 and -255 both need a second byte to avoid colliding with the
        // sign bit, so 0xff00 / 0xff80 (little-endian bytes 0xff,0x00 / 0xff,0x80)
        // are each minimal two-byte encodings.
        assert_eq!(read_scriptint_size(&[0xff, 0x00], 4, true), Ok(255));
        assert_eq!(read_scriptint_size(&[0xff, 0x80], 4, true), Ok(-255));
    }

    #[test]
    fn condition_stack_skip_semantics() {
        let mut cs = ConditionStack::new();
        cs.push(false); // outer IF is false: non-executing
        cs.push(true); // nested IF pushed while non-executing stays unobservably "true"
        assert!(!cs.all_true());
        cs.toggle_top(); // nested ELSE: toggling anything but the first false is unobservable
        assert!(!cs.all_true());
        assert!(cs.pop()); // pop nested ENDIF
        assert!(cs.pop()); // pop outer ENDIF
        assert!(cs.all_true());
        assert!(!cs.pop()); // popping with nothing left fails
    }
}
