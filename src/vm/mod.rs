mod code;
mod constants;
mod error;
mod heap;
mod introspect;
mod ops;
mod stack;
mod value;
mod vm;

pub use code::CodeStore;
pub use constants::{ConstantPool, NOT_FOUND};
pub use error::{ConfigError, VmError};
pub use heap::{ClassDescriptor, GOOD_OBJ_TAG, OBJECT_STRIDE, ObjRef, ObjectHeader, ObjectSpace};
pub use introspect::{Classification, Introspector, SMALL_INT_MAX};
pub use ops::{Instruction, Op};
pub use stack::FrameStack;
pub use value::{AddressMap, CodeAddr, StackAddr, WORD_SIZE, Word};
pub use vm::{DumpCell, RunState, StackDump, Vm};
