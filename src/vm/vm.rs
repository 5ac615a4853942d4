use std::fmt;
use std::io::{self, Write};

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::{TraceFormat, VmConfig};
use crate::vm::{
    AddressMap, CodeAddr, CodeStore, ConstantPool, FrameStack, Instruction, Introspector, ObjRef,
    ObjectSpace, StackAddr, VmError, Word,
};

/// Whether the run loop keeps stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

/// One cell of a stack dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpCell {
    /// Offset from the stack base
    pub index: usize,
    /// Whether the frame pointer references this cell
    pub frame_pointer: bool,
    pub description: String,
}

/// Snapshot of the topmost stack cells, lowest index first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackDump {
    pub sp: usize,
    pub fp: usize,
    pub cells: Vec<DumpCell>,
}

/// One line of a JSON trace.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum TraceEvent<'a> {
    Fetch {
        pc: usize,
        bits: u64,
        description: String,
    },
    Step {
        pc: usize,
        op: &'static str,
    },
    Dump(&'a StackDump),
}

impl fmt::Display for StackDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===")?;
        for cell in &self.cells {
            let marker = if cell.frame_pointer { "-fp->" } else { "     " };
            writeln!(f, "{} {} : {}", marker, cell.index, cell.description)?;
        }
        writeln!(f, "===")
    }
}

/// The virtual machine: code block, frame/eval stack, constant pool and
/// the object space it executes against. Each instance owns all of its
/// state.
pub struct Vm {
    config: VmConfig,
    code: CodeStore,
    stack: FrameStack,
    constants: ConstantPool,
    objects: ObjectSpace,
    run_state: RunState,
    /// Trace sink
    output: Box<dyn Write>,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("config", &self.config)
            .field("code", &self.code)
            .field("stack", &self.stack)
            .field("constants", &self.constants)
            .field("objects", &self.objects)
            .field("run_state", &self.run_state)
            .finish_non_exhaustive()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self::with_output(config, Box::new(io::stdout()))
    }

    /// Create a VM that writes its trace to `output`.
    pub fn with_output(config: VmConfig, output: Box<dyn Write>) -> Self {
        Self {
            code: CodeStore::new(config.code_capacity),
            stack: FrameStack::new(config.stack_capacity),
            constants: ConstantPool::new(config.const_pool_capacity),
            objects: ObjectSpace::new(config.layout.heap_base),
            run_state: RunState::Stopped,
            output,
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn layout(&self) -> &AddressMap {
        &self.config.layout
    }

    /// Turn tracing on or off.
    pub fn set_trace(&mut self, trace: bool) {
        self.config.trace = trace;
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn code(&self) -> &CodeStore {
        &self.code
    }

    pub fn code_mut(&mut self) -> &mut CodeStore {
        &mut self.code
    }

    pub fn stack(&self) -> &FrameStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut FrameStack {
        &mut self.stack
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    pub fn constants_mut(&mut self) -> &mut ConstantPool {
        &mut self.constants
    }

    pub fn objects(&self) -> &ObjectSpace {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectSpace {
        &mut self.objects
    }

    /// Append words to the code block.
    pub fn load(&mut self, words: &[Word]) -> Result<CodeAddr, VmError> {
        self.code.load(words)
    }

    pub fn introspector(&self) -> Introspector<'_> {
        Introspector::new(&self.config.layout, self.stack.region_len(), &self.objects)
    }

    pub fn describe(&self, word: &Word) -> String {
        self.introspector().describe(word)
    }

    // ========================================
    // Code
    // ========================================

    /// Fetch the word at the program counter and advance past it.
    pub fn fetch_next(&mut self) -> Result<Word, VmError> {
        let pc = self.code.pc();
        let word = self.code.fetch_next()?;
        if self.config.trace {
            let bits = word.bits(&self.config.layout);
            let description = self.describe(&word);
            match self.config.trace_format {
                TraceFormat::Human => {
                    writeln!(self.output, "Fetched {:#x} ({})", bits, description)?
                }
                TraceFormat::Json => self.emit(&TraceEvent::Fetch {
                    pc: pc.0,
                    bits,
                    description,
                })?,
            }
        }
        Ok(word)
    }

    /// Read an operand word as an integer.
    pub fn operand_int(&self, word: Word) -> i64 {
        word.as_int(&self.config.layout)
    }

    /// Resolve a word used as a control transfer target.
    pub fn code_target(&self, word: Word) -> Result<CodeAddr, VmError> {
        let target = match word {
            Word::Code(addr) => Some(addr),
            other => self
                .config
                .layout
                .code_slot_of(other.bits(&self.config.layout), self.code.capacity()),
        };
        target.ok_or_else(|| VmError::InvalidCodeAddress {
            addr: self.describe(&word),
        })
    }

    // ========================================
    // Stack
    // ========================================

    pub fn push_word(&mut self, word: Word) -> Result<(), VmError> {
        self.stack.push_word(word)
    }

    pub fn pop_word(&mut self) -> Result<Word, VmError> {
        self.stack.pop_word()
    }

    pub fn top_word(&self) -> Word {
        self.stack.top_word()
    }

    pub fn eval_push(&mut self, obj: ObjRef) -> Result<(), VmError> {
        if self.config.check_tags {
            self.stack.eval_push(obj, &self.objects)
        } else {
            self.stack.eval_push_unchecked(obj)
        }
    }

    pub fn eval_pop(&mut self) -> Result<ObjRef, VmError> {
        if self.config.check_tags {
            self.stack.eval_pop(&self.objects, &self.config.layout)
        } else {
            self.stack.eval_pop_unchecked(&self.config.layout)
        }
    }

    pub fn leave_frame(&mut self) -> Result<(), VmError> {
        self.stack.leave_frame(&self.config.layout)
    }

    /// Describe up to `n_words` cells from the top of the stack.
    pub fn stack_dump(&self, n_words: usize) -> StackDump {
        let depth = self.stack.depth();
        let start = depth + 1 - n_words.min(depth);
        let fp = self.stack.fp().0;
        let intro = self.introspector();
        let cells = (start..=depth)
            .filter_map(|index| {
                let word = self.stack.cell(StackAddr(index))?;
                Some(DumpCell {
                    index,
                    frame_pointer: index == fp,
                    description: intro.describe(&word),
                })
            })
            .collect();
        StackDump {
            sp: depth,
            fp,
            cells,
        }
    }

    /// Write a stack dump to the trace sink in the configured format.
    pub fn print_stack_dump(&mut self, n_words: usize) -> Result<(), VmError> {
        let dump = self.stack_dump(n_words);
        match self.config.trace_format {
            TraceFormat::Human => write!(self.output, "{}", dump)?,
            TraceFormat::Json => self.emit(&TraceEvent::Dump(&dump))?,
        }
        Ok(())
    }

    /// Write one JSON trace event as a single line.
    fn emit(&mut self, event: &TraceEvent<'_>) -> Result<(), VmError> {
        serde_json::to_writer(&mut self.output, event).map_err(io::Error::from)?;
        writeln!(self.output)?;
        Ok(())
    }

    // ========================================
    // Execution
    // ========================================

    /// Request that the run loop stop after the current instruction.
    pub fn halt(&mut self) {
        self.run_state = RunState::Stopped;
    }

    /// Execute one instruction at the program counter.
    pub fn step(&mut self) -> Result<(), VmError> {
        let pc = self.code.pc();
        let word = self.fetch_next()?;
        let op = word.as_instr().ok_or_else(|| VmError::NotAnInstruction {
            pc: pc.0,
            found: self.describe(&word),
        })?;

        let name = op.name();
        if self.config.trace {
            match self.config.trace_format {
                TraceFormat::Human => writeln!(self.output, "Step:  {}", name)?,
                TraceFormat::Json => self.emit(&TraceEvent::Step {
                    pc: pc.0,
                    op: name,
                })?,
            }
        }
        trace!(target: "wordvm::vm", pc = pc.0, op = name, "step");

        op.execute(self)?;

        if self.config.trace {
            self.print_stack_dump(self.config.dump_depth)?;
        }
        Ok(())
    }

    /// Step until an instruction stops the machine. A fault also leaves
    /// the machine stopped.
    pub fn run(&mut self) -> Result<(), VmError> {
        self.run_state = RunState::Running;
        debug!(target: "wordvm::vm", pc = self.code.pc().0, "run started");

        while self.run_state == RunState::Running {
            if let Err(e) = self.step() {
                self.run_state = RunState::Stopped;
                warn!(target: "wordvm::vm", pc = self.code.pc().0, error = %e, "run aborted");
                return Err(e);
            }
        }

        debug!(
            target: "wordvm::vm",
            pc = self.code.pc().0,
            depth = self.stack.depth(),
            "halted"
        );
        self.output.flush()?;
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{ClassDescriptor, Op};

    fn run_code(words: Vec<Word>) -> Result<Vm, VmError> {
        let mut vm = Vm::with_output(VmConfig::default(), Box::new(io::sink()));
        vm.load(&words)?;
        vm.run()?;
        Ok(vm)
    }

    #[test]
    fn test_halt_stops_run() {
        let vm = run_code(vec![Word::Instr(Op::Halt)]).unwrap();
        assert_eq!(vm.run_state(), RunState::Stopped);
        assert_eq!(vm.code().pc(), CodeAddr(1));
    }

    #[test]
    fn test_lit_pushes_operand() {
        let vm = run_code(vec![
            Op::Lit.into(),
            Word::Int(7),
            Op::Lit.into(),
            Word::Int(9),
            Op::Swap.into(),
            Op::Halt.into(),
        ])
        .unwrap();
        assert_eq!(vm.stack().depth(), 2);
        assert_eq!(vm.top_word(), Word::Int(7));
    }

    #[test]
    fn test_dup_and_pop() {
        let vm = run_code(vec![
            Op::Lit.into(),
            Word::Int(1),
            Op::Dup.into(),
            Op::Dup.into(),
            Op::Pop.into(),
            Op::Halt.into(),
        ])
        .unwrap();
        assert_eq!(vm.stack().depth(), 2);
    }

    #[test]
    fn test_pop_on_empty_stack_aborts_run() {
        let err = run_code(vec![Op::Pop.into(), Op::Halt.into()]).unwrap_err();
        assert!(matches!(err, VmError::StackUnderflow { frame_base: 0 }));
    }

    #[test]
    fn test_fault_leaves_machine_stopped() {
        let mut vm = Vm::with_output(VmConfig::default(), Box::new(io::sink()));
        vm.load(&[Op::Pop.into()]).unwrap();
        assert!(vm.run().is_err());
        assert_eq!(vm.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_non_instruction_word() {
        let err = run_code(vec![Word::Int(3)]).unwrap_err();
        match err {
            VmError::NotAnInstruction { pc, found } => {
                assert_eq!(pc, 0);
                assert_eq!(found, "(int) 3");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_running_off_unloaded_code() {
        // Unloaded slots are zero and zero is not an instruction word.
        let err = run_code(vec![Op::Nop.into()]).unwrap_err();
        assert!(matches!(err, VmError::NotAnInstruction { pc: 1, .. }));
    }

    #[test]
    fn test_code_overrun() {
        let config = VmConfig {
            code_capacity: 2,
            ..VmConfig::default()
        };
        let mut vm = Vm::with_output(config, Box::new(io::sink()));
        vm.load(&[Op::Nop.into(), Op::Nop.into()]).unwrap();
        assert!(matches!(
            vm.run(),
            Err(VmError::CodeOverrun { pc: 2, capacity: 2 })
        ));
    }

    #[test]
    fn test_const_pushes_object() {
        let mut vm = Vm::with_output(VmConfig::default(), Box::new(io::sink()));
        let class = ClassDescriptor::new("String");
        let obj = vm.objects_mut().alloc(&class).unwrap();
        let index = vm.constants_mut().create_value("hi", obj).unwrap();
        vm.load(&[Op::Const.into(), Word::Int(index as i64), Op::Halt.into()])
            .unwrap();
        vm.run().unwrap();
        assert_eq!(vm.eval_pop().unwrap(), obj);
    }

    #[test]
    fn test_const_with_bad_index() {
        let err = run_code(vec![Op::Const.into(), Word::Int(-2), Op::Halt.into()]).unwrap_err();
        assert!(matches!(err, VmError::InvalidConstantIndex { index: 0, next: 1 }));
    }

    #[test]
    fn test_jump_skips_code() {
        let vm = run_code(vec![
            Op::Jump.into(),
            Word::Code(CodeAddr(4)),
            Op::Lit.into(),
            Word::Int(1),
            Op::Halt.into(),
        ])
        .unwrap();
        assert_eq!(vm.stack().depth(), 0);
    }

    #[test]
    fn test_jump_to_non_address() {
        let err = run_code(vec![Op::Jump.into(), Word::Int(5)]).unwrap_err();
        assert!(matches!(err, VmError::InvalidCodeAddress { .. }));
    }

    #[test]
    fn test_call_and_return_with_frame() {
        // main: lit 5; call f; halt
        // f:    enter; load -2; store -2; leave; ret
        let vm = run_code(vec![
            Op::Lit.into(),          // 0
            Word::Int(5),            // 1
            Op::Call.into(),         // 2
            Word::Code(CodeAddr(5)), // 3
            Op::Halt.into(),         // 4
            Op::Enter.into(),        // 5
            Op::Load.into(),         // 6
            Word::Int(-2),           // 7
            Op::Store.into(),        // 8
            Word::Int(-2),           // 9
            Op::Leave.into(),        // 10
            Op::Ret.into(),          // 11
        ])
        .unwrap();
        assert_eq!(vm.stack().depth(), 1);
        assert_eq!(vm.stack().fp(), StackAddr(0));
        assert_eq!(vm.top_word(), Word::Int(5));
        assert_eq!(vm.code().pc(), CodeAddr(5));
    }

    #[test]
    fn test_stack_dump_marks_frame_pointer() {
        let mut vm = Vm::with_output(VmConfig::default(), Box::new(io::sink()));
        vm.push_word(Word::Int(1)).unwrap();
        vm.stack_mut().enter_frame().unwrap();
        vm.push_word(Word::Int(2)).unwrap();

        let dump = vm.stack_dump(2);
        assert_eq!(dump.cells.len(), 2);
        assert_eq!(dump.cells[0].index, 2);
        assert!(dump.cells[0].frame_pointer);
        assert_eq!(dump.cells[0].description, "(stack ptr) 0");
        assert_eq!(dump.cells[1].description, "(int) 2");
        assert_eq!(
            dump.to_string(),
            "===\n-fp-> 2 : (stack ptr) 0\n      3 : (int) 2\n===\n"
        );
    }

    #[test]
    fn test_stack_dump_on_shallow_stack() {
        let mut vm = Vm::with_output(VmConfig::default(), Box::new(io::sink()));
        assert!(vm.stack_dump(3).cells.is_empty());
        vm.push_word(Word::Int(4)).unwrap();
        let dump = vm.stack_dump(3);
        assert_eq!(dump.cells.len(), 1);
        assert_eq!(dump.cells[0].index, 1);
    }

    #[test]
    fn test_unchecked_eval_pop() {
        let config = VmConfig {
            check_tags: false,
            ..VmConfig::default()
        };
        let mut vm = Vm::with_output(config, Box::new(io::sink()));
        vm.push_word(Word::Int(5)).unwrap();
        assert_eq!(vm.eval_pop().unwrap(), ObjRef::from_addr(5));
    }
}
