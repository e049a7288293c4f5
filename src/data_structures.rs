use crate::utils::scriptint_vec;
use crate::{read_scriptint, ExecError};
use std::cell::RefCell;
use std::cmp::PartialEq;
use std::rc::Rc;

/// A single entry on a data or alt stack (C2).
///
/// Most values that ever touch the stack started life as a scriptint
/// pushed by an arithmetic opcode; keeping those as a plain `i64` avoids
/// allocating and re-encoding on every `OP_ADD`/`OP_1ADD`/etc. Only
/// values that genuinely are byte strings (signatures, pubkeys, hashes,
/// literal pushes) pay for the `Rc<RefCell<Vec<u8>>>` indirection, which
/// is also what lets `OP_TOALTSTACK`/`OP_FROMALTSTACK` and `OP_DUP` move
/// values between stacks without recopying their payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StackEntry {
    Num(i64),
    StrRef(Rc<RefCell<Vec<u8>>>),
}

#[derive(Clone, Eq, Debug, PartialEq)]
pub struct Stack(pub(crate) Vec<StackEntry>);

impl Stack {
    pub fn new() -> Self {
        Self(Vec::with_capacity(1000))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Result<Vec<u8>, ExecError> {
        self.topstr(-1)
    }

    pub fn from_u8_vec(v: Vec<Vec<u8>>) -> Self {
        let mut res = Self::new();
        for entry in v {
            res.0.push(StackEntry::StrRef(Rc::new(RefCell::new(entry))));
        }
        res
    }

    /// Peek at the entry `offset` from the top; `offset` must be negative
    /// (`-1` is the top).
    pub fn top(&self, offset: isize) -> Result<&StackEntry, ExecError> {
        debug_assert!(offset < 0, "offsets should be < 0");
        self.0
            .len()
            .checked_sub(offset.unsigned_abs())
            .map(|i| &self.0[i])
            .ok_or(ExecError::InvalidStackOperation)
    }

    pub fn topstr(&self, offset: isize) -> Result<Vec<u8>, ExecError> {
        let entry = self.top(offset)?;
        match entry {
            StackEntry::Num(v) => Ok(scriptint_vec(*v)),
            StackEntry::StrRef(v) => Ok(v.borrow().to_vec()),
        }
    }

    pub fn topbool(&self, offset: isize) -> Result<bool, ExecError> {
        Ok(cast_to_bool(&self.topstr(offset)?))
    }

    pub fn topnum(&self, offset: isize, require_minimal: bool) -> Result<i64, ExecError> {
        let entry = self.top(offset)?;
        match entry {
            StackEntry::Num(v) => {
                if *v <= i32::MAX as i64 && *v >= i32::MIN as i64 {
                    Ok(*v)
                } else {
                    Err(ExecError::NumberOverflow)
                }
            }
            StackEntry::StrRef(v) => read_scriptint(v.borrow().as_slice(), 4, require_minimal),
        }
    }

    pub fn pushnum(&mut self, num: i64) {
        self.0.push(StackEntry::Num(num));
    }

    pub fn pushstr(&mut self, v: &[u8]) {
        self.0
            .push(StackEntry::StrRef(Rc::new(RefCell::new(v.to_vec()))));
    }

    pub fn pushbool(&mut self, v: bool) {
        if v {
            self.pushstr(&[1]);
        } else {
            self.pushstr(&[]);
        }
    }

    pub fn push(&mut self, v: StackEntry) {
        self.0.push(v);
    }

    pub fn needn(&self, min_nb_items: usize) -> Result<(), ExecError> {
        if self.len() < min_nb_items {
            Err(ExecError::InvalidStackOperation)
        } else {
            Ok(())
        }
    }

    pub fn popn(&mut self, n: usize) -> Result<(), ExecError> {
        for _ in 0..n {
            self.0.pop().ok_or(ExecError::InvalidStackOperation)?;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Option<StackEntry> {
        self.0.pop()
    }

    pub fn popstr(&mut self) -> Result<Vec<u8>, ExecError> {
        let entry = self.0.pop().ok_or(ExecError::InvalidStackOperation)?;
        match entry {
            StackEntry::Num(v) => Ok(scriptint_vec(v)),
            StackEntry::StrRef(v) => Ok(v.borrow().to_vec()),
        }
    }

    pub fn popbool(&mut self) -> Result<bool, ExecError> {
        Ok(cast_to_bool(&self.popstr()?))
    }

    pub fn popnum(&mut self, require_minimal: bool) -> Result<i64, ExecError> {
        let entry = self.0.pop().ok_or(ExecError::InvalidStackOperation)?;
        match entry {
            StackEntry::Num(v) => {
                if v <= i32::MAX as i64 && v >= i32::MIN as i64 {
                    Ok(v)
                } else {
                    Err(ExecError::NumberOverflow)
                }
            }
            StackEntry::StrRef(v) => read_scriptint(v.borrow().as_slice(), 4, require_minimal),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn remove(&mut self, v: usize) {
        self.0.remove(v);
    }

    pub fn insert(&mut self, index: usize, entry: StackEntry) {
        self.0.insert(index, entry);
    }

    pub fn get(&self, index: usize) -> Vec<u8> {
        match &self.0[index] {
            StackEntry::Num(v) => scriptint_vec(*v),
            StackEntry::StrRef(v) => v.borrow().to_vec(),
        }
    }

    pub fn get_entry(&self, index: usize) -> StackEntry {
        self.0[index].clone()
    }

    pub fn to_u8_array(&self) -> Vec<Vec<u8>> {
        let mut v = vec![];
        for entry in self.0.iter() {
            v.push(match entry {
                StackEntry::Num(v) => scriptint_vec(*v),
                StackEntry::StrRef(v) => v.borrow().to_vec(),
            });
        }
        v
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

/// A byte string is false iff every byte is zero, or it is the single
/// byte `0x80` (negative zero). Used for `OP_IF`/`OP_VERIFY`/boolean
/// opcodes and for the final verdict.
pub fn cast_to_bool(v: &[u8]) -> bool {
    for (i, &b) in v.iter().enumerate() {
        if b != 0 {
            // The last byte being 0x80 is only a false-y "negative zero"
            // if every byte before it was zero too.
            if i == v.len() - 1 && b == 0x80 {
                return false;
            }
            return true;
        }
    }
    false
}

/// Ways parsing script integers might fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptIntError {
    /// Something did a non-minimal push; for more information see
    /// <https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki#push-operators>
    NonMinimalPush,
    /// Tried to read an array off the stack as a number when it was more than 4 bytes.
    NumericOverflow,
}

impl std::fmt::Display for ScriptIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ScriptIntError::*;

        match *self {
            NonMinimalPush => f.write_str("non-minimal datapush"),
            NumericOverflow => {
                f.write_str("numeric overflow (number on stack larger than 4 bytes)")
            }
        }
    }
}
