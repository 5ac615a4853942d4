use super::error::VmError;
use super::value::{CodeAddr, Word};

/// Fixed-capacity code block read through a program counter.
///
/// Unloaded slots hold `Word::Raw(0)`, like a zero-filled code page.
#[derive(Debug)]
pub struct CodeStore {
    words: Vec<Word>,
    /// Number of slots written by the loader (high-water mark).
    loaded: usize,
    /// Next slot to fetch.
    pc: usize,
}

impl CodeStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![Word::default(); capacity],
            loaded: 0,
            pc: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Number of slots written so far.
    pub fn len(&self) -> usize {
        self.loaded
    }

    pub fn is_empty(&self) -> bool {
        self.loaded == 0
    }

    /// Append a word after the last loaded slot.
    pub fn emit(&mut self, word: Word) -> Result<CodeAddr, VmError> {
        let slot = self.loaded;
        if slot >= self.capacity() {
            return Err(VmError::CodeStoreFull {
                capacity: self.capacity(),
            });
        }
        self.words[slot] = word;
        self.loaded += 1;
        Ok(CodeAddr(slot))
    }

    /// Append a sequence of words. Returns the address of the first one.
    /// Nothing is written if the sequence does not fit.
    pub fn load(&mut self, words: &[Word]) -> Result<CodeAddr, VmError> {
        let start = self.loaded;
        if words.len() > self.capacity() - start {
            return Err(VmError::CodeStoreFull {
                capacity: self.capacity(),
            });
        }
        self.words[start..start + words.len()].copy_from_slice(words);
        self.loaded += words.len();
        Ok(CodeAddr(start))
    }

    /// Overwrite an already loaded slot (back-patching jump targets).
    pub fn patch(&mut self, addr: CodeAddr, word: Word) -> Result<(), VmError> {
        if addr.0 >= self.loaded {
            return Err(VmError::InvalidCodeAddress {
                addr: addr.0.to_string(),
            });
        }
        self.words[addr.0] = word;
        Ok(())
    }

    pub fn get(&self, addr: CodeAddr) -> Option<Word> {
        self.words.get(addr.0).copied()
    }

    pub fn pc(&self) -> CodeAddr {
        CodeAddr(self.pc)
    }

    /// Move the program counter, as control transfer instructions do.
    pub fn set_pc(&mut self, addr: CodeAddr) -> Result<(), VmError> {
        if addr.0 >= self.capacity() {
            return Err(VmError::InvalidCodeAddress {
                addr: addr.0.to_string(),
            });
        }
        self.pc = addr.0;
        Ok(())
    }

    /// Return the word at the program counter and advance past it.
    pub fn fetch_next(&mut self) -> Result<Word, VmError> {
        let word = self
            .words
            .get(self.pc)
            .copied()
            .ok_or(VmError::CodeOverrun {
                pc: self.pc,
                capacity: self.capacity(),
            })?;
        self.pc += 1;
        Ok(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Op;

    #[test]
    fn test_fetch_advances_pc() {
        let mut code = CodeStore::new(4);
        code.load(&[Word::Instr(Op::Nop), Word::Int(7)]).unwrap();
        assert_eq!(code.fetch_next().unwrap(), Word::Instr(Op::Nop));
        assert_eq!(code.pc(), CodeAddr(1));
        assert_eq!(code.fetch_next().unwrap(), Word::Int(7));
        assert_eq!(code.pc(), CodeAddr(2));
    }

    #[test]
    fn test_unloaded_slots_read_as_zero() {
        let mut code = CodeStore::new(2);
        assert_eq!(code.fetch_next().unwrap(), Word::Raw(0));
    }

    #[test]
    fn test_fetch_past_capacity_is_overrun() {
        let mut code = CodeStore::new(1);
        code.emit(Word::Instr(Op::Halt)).unwrap();
        code.fetch_next().unwrap();
        let err = code.fetch_next().unwrap_err();
        assert!(matches!(err, VmError::CodeOverrun { pc: 1, capacity: 1 }));
    }

    #[test]
    fn test_load_beyond_capacity() {
        let mut code = CodeStore::new(2);
        code.emit(Word::Int(1)).unwrap();
        assert!(matches!(
            code.load(&[Word::Int(2), Word::Int(3)]),
            Err(VmError::CodeStoreFull { capacity: 2 })
        ));
        assert_eq!(code.len(), 1);
        assert_eq!(code.emit(Word::Int(2)).unwrap(), CodeAddr(1));
        assert!(code.emit(Word::Int(3)).is_err());
    }

    #[test]
    fn test_set_pc_and_patch() {
        let mut code = CodeStore::new(4);
        code.load(&[Word::Int(0), Word::Int(1)]).unwrap();
        code.set_pc(CodeAddr(1)).unwrap();
        assert_eq!(code.fetch_next().unwrap(), Word::Int(1));
        assert!(code.set_pc(CodeAddr(4)).is_err());

        code.patch(CodeAddr(0), Word::Int(9)).unwrap();
        assert_eq!(code.get(CodeAddr(0)), Some(Word::Int(9)));
        assert!(code.patch(CodeAddr(2), Word::Int(9)).is_err());
    }
}
