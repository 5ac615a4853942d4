use thiserror::Error;

/// Errors raised by VM operations.
#[derive(Error, Debug)]
pub enum VmError {
    #[error("stack overflow: capacity of {capacity} words exceeded")]
    StackOverflow { capacity: usize },

    #[error("stack underflow: pop below frame base {frame_base}")]
    StackUnderflow { frame_base: usize },

    #[error("type mismatch: expected an object, found {found}")]
    TypeMismatch { found: String },

    #[error("code overrun: pc {pc} is outside code capacity {capacity}")]
    CodeOverrun { pc: usize, capacity: usize },

    #[error("code store full: capacity of {capacity} words exceeded")]
    CodeStoreFull { capacity: usize },

    #[error("invalid code address: {addr}")]
    InvalidCodeAddress { addr: String },

    #[error("not an instruction at pc {pc}: {found}")]
    NotAnInstruction { pc: usize, found: String },

    #[error("constant pool exhausted: capacity of {capacity} entries exceeded")]
    ConstantPoolExhausted { capacity: usize },

    #[error("invalid constant index {index} (assigned: 1..{next})")]
    InvalidConstantIndex { index: usize, next: usize },

    #[error("invalid frame pointer {fp}: stack pointer is {sp}")]
    InvalidFramePointer { fp: usize, sp: usize },

    #[error("frame slot {offset} out of range (fp {fp}, sp {sp})")]
    FrameSlotOutOfRange { offset: i64, fp: usize, sp: usize },

    #[error("object space at {base:#x} cannot hold more than {count} objects")]
    HeapExhausted { base: u64, count: usize },

    #[error("trace output failed: {0}")]
    TraceIo(#[from] std::io::Error),
}

/// Errors raised while loading a `VmConfig`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
