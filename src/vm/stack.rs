//! The combined call/evaluation stack.
//!
//! Activation records and expression temporaries share one upward-growing
//! region. `sp` indexes the topmost live cell and `fp` the base cell of the
//! active frame. Cell 0 is the root frame's base cell; it exists before
//! anything is pushed, so `capacity` words fit above it.
//!
//! Invariant: `0 <= fp <= sp <= capacity`.

use super::error::VmError;
use super::heap::{ObjRef, ObjectSpace};
use super::value::{AddressMap, StackAddr, Word};

#[derive(Debug)]
pub struct FrameStack {
    cells: Vec<Word>,
    sp: usize,
    fp: usize,
}

impl FrameStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: vec![Word::default(); capacity + 1],
            sp: 0,
            fp: 0,
        }
    }

    /// Number of words that can be pushed onto an empty stack.
    pub fn capacity(&self) -> usize {
        self.cells.len() - 1
    }

    /// Size of the stack region in words, base cell included.
    pub fn region_len(&self) -> usize {
        self.cells.len()
    }

    /// Number of words pushed above the base cell.
    pub fn depth(&self) -> usize {
        self.sp
    }

    pub fn sp(&self) -> StackAddr {
        StackAddr(self.sp)
    }

    pub fn fp(&self) -> StackAddr {
        StackAddr(self.fp)
    }

    /// Read any cell in the region, live or not.
    pub fn cell(&self, slot: StackAddr) -> Option<Word> {
        self.cells.get(slot.0).copied()
    }

    pub fn push_word(&mut self, word: Word) -> Result<(), VmError> {
        if self.sp + 1 >= self.cells.len() {
            return Err(VmError::StackOverflow {
                capacity: self.capacity(),
            });
        }
        self.sp += 1;
        self.cells[self.sp] = word;
        Ok(())
    }

    /// Pop the top word. Popping the active frame's base cell is an
    /// underflow; frames are unwound with `leave_frame`.
    pub fn pop_word(&mut self) -> Result<Word, VmError> {
        if self.sp == self.fp {
            return Err(VmError::StackUnderflow {
                frame_base: self.fp,
            });
        }
        let word = self.cells[self.sp];
        self.sp -= 1;
        Ok(word)
    }

    /// The word at the stack pointer. On an empty stack this is the root
    /// frame's base cell.
    pub fn top_word(&self) -> Word {
        self.cells[self.sp]
    }

    /// Push an object reference after checking that it names a well-formed
    /// object.
    pub fn eval_push(&mut self, obj: ObjRef, objects: &ObjectSpace) -> Result<(), VmError> {
        if !objects.is_object(obj.addr()) {
            return Err(VmError::TypeMismatch {
                found: format!("{:?}", Word::Obj(obj)),
            });
        }
        self.push_word(Word::Obj(obj))
    }

    /// Pop the top word as an object reference. The stack is left untouched
    /// when the top word does not name a well-formed object.
    pub fn eval_pop(
        &mut self,
        objects: &ObjectSpace,
        map: &AddressMap,
    ) -> Result<ObjRef, VmError> {
        if self.sp == self.fp {
            return Err(VmError::StackUnderflow {
                frame_base: self.fp,
            });
        }
        let word = self.top_word();
        let addr = word.bits(map);
        if !objects.is_object(addr) {
            return Err(VmError::TypeMismatch {
                found: format!("{:?}", word),
            });
        }
        self.sp -= 1;
        Ok(ObjRef::from_addr(addr))
    }

    /// `eval_push` without the tag check.
    pub fn eval_push_unchecked(&mut self, obj: ObjRef) -> Result<(), VmError> {
        self.push_word(Word::Obj(obj))
    }

    /// `eval_pop` without the tag check; the top word's bits are taken as
    /// an object address.
    pub fn eval_pop_unchecked(&mut self, map: &AddressMap) -> Result<ObjRef, VmError> {
        let word = self.pop_word()?;
        Ok(ObjRef::from_addr(word.bits(map)))
    }

    pub fn set_frame_pointer(&mut self, fp: StackAddr) -> Result<(), VmError> {
        if fp.0 > self.sp {
            return Err(VmError::InvalidFramePointer {
                fp: fp.0,
                sp: self.sp,
            });
        }
        self.fp = fp.0;
        Ok(())
    }

    /// Open a new activation record: save the caller's frame pointer on the
    /// stack and make that cell the new frame base.
    pub fn enter_frame(&mut self) -> Result<(), VmError> {
        self.push_word(Word::Stack(StackAddr(self.fp)))?;
        self.fp = self.sp;
        Ok(())
    }

    /// Discard the active activation record and restore the caller's frame
    /// pointer from its base cell.
    pub fn leave_frame(&mut self, map: &AddressMap) -> Result<(), VmError> {
        if self.fp == 0 {
            return Err(VmError::StackUnderflow { frame_base: 0 });
        }
        let saved = self.cells[self.fp];
        let caller_fp = match saved {
            Word::Stack(slot) => Some(slot),
            other => map.stack_slot_of(other.bits(map), self.region_len()),
        };
        let caller_fp = caller_fp.ok_or_else(|| VmError::TypeMismatch {
            found: format!("{:?} as saved frame pointer", saved),
        })?;
        let caller_sp = self.fp - 1;
        if caller_fp.0 > caller_sp {
            return Err(VmError::InvalidFramePointer {
                fp: caller_fp.0,
                sp: caller_sp,
            });
        }
        self.sp = caller_sp;
        self.fp = caller_fp.0;
        Ok(())
    }

    /// Read the cell `offset` words from the frame base. Negative offsets
    /// reach into the caller's frame, e.g. for arguments.
    pub fn load_local(&self, offset: i64) -> Result<Word, VmError> {
        let slot = self.frame_slot(offset)?;
        Ok(self.cells[slot])
    }

    pub fn store_local(&mut self, offset: i64, word: Word) -> Result<(), VmError> {
        let slot = self.frame_slot(offset)?;
        self.cells[slot] = word;
        Ok(())
    }

    fn frame_slot(&self, offset: i64) -> Result<usize, VmError> {
        let slot = (self.fp as i64).checked_add(offset);
        match slot {
            Some(slot) if slot >= 0 && slot as usize <= self.sp => Ok(slot as usize),
            _ => Err(VmError::FrameSlotOutOfRange {
                offset,
                fp: self.fp,
                sp: self.sp,
            }),
        }
    }
}
