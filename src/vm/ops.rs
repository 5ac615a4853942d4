use super::constants::NOT_FOUND;
use super::error::VmError;
use super::value::{CodeAddr, Word};
use super::vm::Vm;

/// Something the execution loop can invoke.
pub trait Instruction {
    /// Mnemonic shown in traces.
    fn name(&self) -> &'static str;

    /// Run the instruction against the VM. Operands are fetched from the
    /// code stream by the instruction itself.
    fn execute(&self, vm: &mut Vm) -> Result<(), VmError>;
}

/// Core instruction set.
///
/// Code is direct threaded: each code slot holds an instruction word, and
/// any operands follow inline as ordinary words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// [] → [], stops the run loop
    Halt = 0,
    Nop,
    /// [] → [w], w is the next code word
    Lit,
    /// [] → [obj], next code word is a constant pool index
    Const,
    Pop,
    Dup,
    Swap,
    /// [] → [w], next code word is an fp-relative offset
    Load,
    /// [w] → [], next code word is an fp-relative offset
    Store,
    /// Save fp on the stack and start a new frame there.
    Enter,
    /// Drop the current frame and restore the saved fp.
    Leave,
    /// Next code word is the target.
    Jump,
    /// [] → [ret], next code word is the target.
    Call,
    /// [ret] → []
    Ret,
}

impl Op {
    /// Every opcode, in encoding order.
    pub const ALL: &'static [Op] = &[
        Op::Halt,
        Op::Nop,
        Op::Lit,
        Op::Const,
        Op::Pop,
        Op::Dup,
        Op::Swap,
        Op::Load,
        Op::Store,
        Op::Enter,
        Op::Leave,
        Op::Jump,
        Op::Call,
        Op::Ret,
    ];
}

impl Instruction for Op {
    fn name(&self) -> &'static str {
        match self {
            Op::Halt => "halt",
            Op::Nop => "nop",
            Op::Lit => "lit",
            Op::Const => "const",
            Op::Pop => "pop",
            Op::Dup => "dup",
            Op::Swap => "swap",
            Op::Load => "load",
            Op::Store => "store",
            Op::Enter => "enter",
            Op::Leave => "leave",
            Op::Jump => "jump",
            Op::Call => "call",
            Op::Ret => "ret",
        }
    }

    fn execute(&self, vm: &mut Vm) -> Result<(), VmError> {
        match self {
            Op::Halt => vm.halt(),
            Op::Nop => {}
            Op::Lit => {
                let word = vm.fetch_next()?;
                vm.push_word(word)?;
            }
            Op::Const => {
                let operand = vm.fetch_next()?;
                let index = vm.operand_int(operand);
                // Negative operands can never name an entry.
                let index = usize::try_from(index).unwrap_or(NOT_FOUND);
                let obj = vm.constants().get_value(index)?;
                vm.eval_push(obj)?;
            }
            Op::Pop => {
                vm.pop_word()?;
            }
            Op::Dup => {
                let word = vm.pop_word()?;
                vm.push_word(word)?;
                vm.push_word(word)?;
            }
            Op::Swap => {
                let a = vm.pop_word()?;
                let b = vm.pop_word()?;
                vm.push_word(a)?;
                vm.push_word(b)?;
            }
            Op::Load => {
                let operand = vm.fetch_next()?;
                let offset = vm.operand_int(operand);
                let word = vm.stack().load_local(offset)?;
                vm.push_word(word)?;
            }
            Op::Store => {
                let operand = vm.fetch_next()?;
                let offset = vm.operand_int(operand);
                let word = vm.pop_word()?;
                vm.stack_mut().store_local(offset, word)?;
            }
            Op::Enter => vm.stack_mut().enter_frame()?,
            Op::Leave => vm.leave_frame()?,
            Op::Jump => {
                let target = vm.fetch_next()?;
                let target = vm.code_target(target)?;
                vm.code_mut().set_pc(target)?;
            }
            Op::Call => {
                let target = vm.fetch_next()?;
                let target = vm.code_target(target)?;
                let ret = vm.code().pc();
                vm.push_word(Word::Code(ret))?;
                vm.code_mut().set_pc(target)?;
            }
            Op::Ret => {
                let ret = vm.pop_word()?;
                let ret: CodeAddr = vm.code_target(ret)?;
                vm.code_mut().set_pc(ret)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_in_encoding_order() {
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
        }
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = Op::ALL.iter().map(|op| op.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Op::ALL.len());
    }

    #[test]
    fn test_name_through_trait_object() {
        let ops: Vec<&dyn Instruction> = vec![&Op::Halt, &Op::Const, &Op::Ret];
        let names: Vec<_> = ops.iter().map(|op| op.name()).collect();
        assert_eq!(names, ["halt", "const", "ret"]);
    }
}
