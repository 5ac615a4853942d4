use std::fmt;

use serde::{Deserialize, Serialize};

use super::heap::ObjRef;
use super::ops::{Instruction, Op};

/// Size in bytes of one machine word in the simulated address space.
pub const WORD_SIZE: u64 = 8;

/// Base addresses of the simulated memory regions.
///
/// Words never carry raw host pointers. Every address a word can hold is a
/// position inside one of these regions, so the diagnostic path can decide
/// region membership with plain range comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressMap {
    /// Address of the first entry in the instruction table.
    pub instr_base: u64,
    /// Address of code slot 0.
    pub code_base: u64,
    /// Address of stack slot 0.
    pub stack_base: u64,
    /// Address of the first object header.
    pub heap_base: u64,
}

impl Default for AddressMap {
    fn default() -> Self {
        Self {
            instr_base: 0x0040_0000,
            code_base: 0x0060_0000,
            stack_base: 0x7ff0_0000,
            heap_base: 0x1000_0000,
        }
    }
}

impl AddressMap {
    /// Address of an instruction's entry point.
    pub fn instr_addr(&self, op: Op) -> u64 {
        self.instr_base
            .wrapping_add((op as u64).wrapping_mul(WORD_SIZE))
    }

    /// Address of a code slot.
    pub fn code_addr(&self, slot: CodeAddr) -> u64 {
        self.code_base
            .wrapping_add((slot.0 as u64).wrapping_mul(WORD_SIZE))
    }

    /// Address of a stack slot.
    pub fn stack_addr(&self, slot: StackAddr) -> u64 {
        self.stack_base
            .wrapping_add((slot.0 as u64).wrapping_mul(WORD_SIZE))
    }

    /// Map a raw address back to a stack slot, if it lies inside a stack
    /// region of `slots` words. Pure range test, nothing is read.
    pub fn stack_slot_of(&self, addr: u64, slots: usize) -> Option<StackAddr> {
        let limit = self
            .stack_base
            .checked_add((slots as u64).checked_mul(WORD_SIZE)?)?;
        if addr < self.stack_base || addr >= limit {
            return None;
        }
        let offset = addr - self.stack_base;
        if offset % WORD_SIZE != 0 {
            return None;
        }
        Some(StackAddr((offset / WORD_SIZE) as usize))
    }

    /// Map a raw address back to a code slot inside a code region of
    /// `slots` words.
    pub fn code_slot_of(&self, addr: u64, slots: usize) -> Option<CodeAddr> {
        let limit = self
            .code_base
            .checked_add((slots as u64).checked_mul(WORD_SIZE)?)?;
        if addr < self.code_base || addr >= limit {
            return None;
        }
        let offset = addr - self.code_base;
        if offset % WORD_SIZE != 0 {
            return None;
        }
        Some(CodeAddr((offset / WORD_SIZE) as usize))
    }
}

/// Index of a cell in the frame/eval stack, counted from the stack base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackAddr(pub usize);

/// Index of a word in the code store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodeAddr(pub usize);

/// One machine word.
///
/// Producers that know what they are storing use the typed variants. `Raw`
/// holds a bit pattern whose kind nobody recorded; consumers decide how to
/// read it, and the introspector can only guess.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Word {
    Instr(Op),
    Int(i64),
    Obj(ObjRef),
    Stack(StackAddr),
    Code(CodeAddr),
    Raw(u64),
}

impl Word {
    /// The word's bit pattern under the given address map.
    pub fn bits(&self, map: &AddressMap) -> u64 {
        match self {
            Word::Instr(op) => map.instr_addr(*op),
            Word::Int(n) => *n as u64,
            Word::Obj(r) => r.addr(),
            Word::Stack(slot) => map.stack_addr(*slot),
            Word::Code(slot) => map.code_addr(*slot),
            Word::Raw(bits) => *bits,
        }
    }

    /// Reinterpret the word as an integer, the way a consumer that expects
    /// an integer would.
    pub fn as_int(&self, map: &AddressMap) -> i64 {
        match self {
            Word::Int(n) => *n,
            other => other.bits(map) as i64,
        }
    }

    pub fn as_instr(&self) -> Option<Op> {
        match self {
            Word::Instr(op) => Some(*op),
            _ => None,
        }
    }
}

impl Default for Word {
    fn default() -> Self {
        Word::Raw(0)
    }
}

impl From<Op> for Word {
    fn from(op: Op) -> Self {
        Word::Instr(op)
    }
}

impl From<i64> for Word {
    fn from(n: i64) -> Self {
        Word::Int(n)
    }
}

impl From<ObjRef> for Word {
    fn from(r: ObjRef) -> Self {
        Word::Obj(r)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Word::Instr(op) => write!(f, "Instr({})", op.name()),
            Word::Int(n) => write!(f, "Int({})", n),
            Word::Obj(r) => write!(f, "Obj({:#x})", r.addr()),
            Word::Stack(slot) => write!(f, "Stack({})", slot.0),
            Word::Code(slot) => write!(f, "Code({})", slot.0),
            Word::Raw(bits) => write!(f, "Raw({:#x})", bits),
        }
    }
}
