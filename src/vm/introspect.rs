//! Best-effort classification of words for traces and stack dumps.
//!
//! A word read back from the stack or the code block carries no reliable
//! record of what it holds. The introspector guesses from the bit pattern,
//! checking in this order, first match wins:
//!
//! 1. the entry address of a known instruction
//! 2. an integer in `0..=1000`
//! 3. the address of a well-formed object header
//! 4. an address inside the stack region
//! 5. anything else is unknown
//!
//! Nothing here reads memory through an unverified address: object and stack
//! checks are table lookups and range comparisons. The result is for humans
//! only and must never drive execution.

use std::fmt;

use super::heap::ObjectSpace;
use super::ops::{Instruction, Op};
use super::value::{AddressMap, StackAddr, Word};

/// Largest value reported as a plain integer.
pub const SMALL_INT_MAX: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Instruction(Op),
    Integer(i64),
    Object { class_name: String, addr: u64 },
    StackAddress(StackAddr),
    Unknown(u64),
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Instruction(op) => write!(f, "{}", op.name()),
            Classification::Integer(n) => write!(f, "(int) {}", n),
            Classification::Object { class_name, addr } => {
                write!(f, "({} object) {:#x}", class_name, addr)
            }
            Classification::StackAddress(slot) => write!(f, "(stack ptr) {}", slot.0),
            Classification::Unknown(bits) => write!(f, "Unknown thing: {:#x}", bits),
        }
    }
}

/// Read-only view over the VM state needed to classify words.
#[derive(Clone, Copy)]
pub struct Introspector<'a> {
    map: &'a AddressMap,
    stack_slots: usize,
    objects: &'a ObjectSpace,
}

impl<'a> Introspector<'a> {
    /// `stack_slots` is the size of the stack region in words.
    pub fn new(map: &'a AddressMap, stack_slots: usize, objects: &'a ObjectSpace) -> Self {
        Self {
            map,
            stack_slots,
            objects,
        }
    }

    /// Classify a bare bit pattern.
    pub fn classify_bits(&self, bits: u64) -> Classification {
        if let Some(op) = Op::ALL.iter().find(|op| self.map.instr_addr(**op) == bits) {
            return Classification::Instruction(*op);
        }

        let as_int = bits as i64;
        if (0..=SMALL_INT_MAX).contains(&as_int) {
            return Classification::Integer(as_int);
        }

        if let Some(header) = self.objects.header(bits).filter(|h| h.is_well_formed()) {
            return Classification::Object {
                class_name: header.class_name().to_string(),
                addr: bits,
            };
        }

        if let Some(slot) = self.map.stack_slot_of(bits, self.stack_slots) {
            return Classification::StackAddress(slot);
        }

        Classification::Unknown(bits)
    }

    /// Classify a word. Instruction words are identified by their variant;
    /// everything else goes through the bit-pattern heuristic, so traces read
    /// the same whether or not the producer tagged the word.
    pub fn classify(&self, word: &Word) -> Classification {
        match word {
            Word::Instr(op) => Classification::Instruction(*op),
            other => self.classify_bits(other.bits(self.map)),
        }
    }

    pub fn describe(&self, word: &Word) -> String {
        self.classify(word).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::heap::{ClassDescriptor, GOOD_OBJ_TAG};
    use crate::vm::value::CodeAddr;

    fn setup() -> (AddressMap, ObjectSpace) {
        let map = AddressMap::default();
        let objects = ObjectSpace::new(map.heap_base);
        (map, objects)
    }

    #[test]
    fn test_integer_window_boundaries() {
        let (map, objects) = setup();
        let intro = Introspector::new(&map, 16, &objects);
        assert_eq!(intro.classify(&Word::Int(0)), Classification::Integer(0));
        assert_eq!(
            intro.classify(&Word::Int(1000)),
            Classification::Integer(1000)
        );
        assert_eq!(
            intro.classify(&Word::Int(-1)),
            Classification::Unknown(u64::MAX)
        );
        assert_eq!(intro.classify(&Word::Int(1001)), Classification::Unknown(1001));
    }

    #[test]
    fn test_instruction_by_variant_and_by_bits() {
        let (map, objects) = setup();
        let intro = Introspector::new(&map, 16, &objects);
        assert_eq!(intro.describe(&Word::Instr(Op::Halt)), "halt");
        let raw = Word::Raw(map.instr_addr(Op::Swap));
        assert_eq!(intro.classify(&raw), Classification::Instruction(Op::Swap));
    }

    #[test]
    fn test_instruction_wins_over_integer_and_stack() {
        let map = AddressMap {
            instr_base: 0,
            ..AddressMap::default()
        };
        let objects = ObjectSpace::new(map.heap_base);
        let intro = Introspector::new(&map, 16, &objects);
        // Nop lives at address 8 under this map.
        assert_eq!(
            intro.classify(&Word::Int(8)),
            Classification::Instruction(Op::Nop)
        );
        assert_eq!(intro.classify(&Word::Int(4)), Classification::Integer(4));

        let map = AddressMap {
            instr_base: AddressMap::default().stack_base,
            ..AddressMap::default()
        };
        let intro = Introspector::new(&map, 16, &objects);
        assert_eq!(
            intro.classify(&Word::Stack(StackAddr(2))),
            Classification::Instruction(Op::Lit)
        );
    }

    #[test]
    fn test_object_classification() {
        let (map, mut objects) = setup();
        let obj = objects.alloc(&ClassDescriptor::new("String")).unwrap();
        let bad = objects.alloc(&ClassDescriptor::new("String")).unwrap();
        objects.poison(bad, !GOOD_OBJ_TAG);
        let intro = Introspector::new(&map, 16, &objects);
        assert_eq!(
            intro.describe(&Word::Obj(obj)),
            format!("(String object) {:#x}", obj.addr())
        );
        assert_eq!(
            intro.classify(&Word::Raw(obj.addr())),
            Classification::Object {
                class_name: "String".to_string(),
                addr: obj.addr()
            }
        );
        assert_eq!(
            intro.classify(&Word::Obj(bad)),
            Classification::Unknown(bad.addr())
        );
    }

    #[test]
    fn test_stack_addresses() {
        let (map, objects) = setup();
        let intro = Introspector::new(&map, 8, &objects);
        for k in 0..8 {
            assert_eq!(
                intro.describe(&Word::Stack(StackAddr(k))),
                format!("(stack ptr) {}", k)
            );
        }
        assert!(matches!(
            intro.classify(&Word::Stack(StackAddr(8))),
            Classification::Unknown(_)
        ));
    }

    #[test]
    fn test_unknown_fallback() {
        let (map, objects) = setup();
        let intro = Introspector::new(&map, 8, &objects);
        assert_eq!(
            intro.describe(&Word::Raw(0xdead_beef_0000)),
            "Unknown thing: 0xdeadbeef0000"
        );
        assert!(matches!(
            intro.classify(&Word::Code(CodeAddr(0))),
            Classification::Unknown(_)
        ));
    }
}
