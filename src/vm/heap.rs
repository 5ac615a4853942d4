//! Read-only view of the object model the VM executes against.
//!
//! The VM does not define object layout or manage object lifetime. It only
//! needs to know, for a given address, whether a well-formed object header
//! lives there and which class it belongs to. `ObjectSpace` provides exactly
//! that: a bump arena of headers with no collection and no fields.

use std::fmt;
use std::rc::Rc;

use super::error::VmError;

/// Tag value found at the start of every well-formed object header.
pub const GOOD_OBJ_TAG: u32 = 0x0B1E_C7ED;

/// Distance in bytes between consecutive object headers.
pub const OBJECT_STRIDE: u64 = 16;

/// Class descriptor referenced from an object header.
#[derive(Debug, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: String,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self { name: name.into() })
    }
}

/// Header at the start of every heap object.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    pub tag: u32,
    pub class: Rc<ClassDescriptor>,
}

impl ObjectHeader {
    pub fn is_well_formed(&self) -> bool {
        self.tag == GOOD_OBJ_TAG
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }
}

/// A reference to a heap object.
///
/// Two references are equal exactly when they name the same object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    addr: u64,
}

impl ObjRef {
    /// Build a reference from a raw address. Nothing is checked; use
    /// `ObjectSpace::header` to find out whether an object lives there.
    pub fn from_addr(addr: u64) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({:#x})", self.addr)
    }
}

/// Arena of object headers addressed by simulated addresses.
#[derive(Debug)]
pub struct ObjectSpace {
    base: u64,
    headers: Vec<ObjectHeader>,
}

impl ObjectSpace {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            headers: Vec::new(),
        }
    }

    /// Allocate a well-formed object of the given class. Fails when the
    /// next header address does not fit in the address space.
    pub fn alloc(&mut self, class: &Rc<ClassDescriptor>) -> Result<ObjRef, VmError> {
        let addr = (self.headers.len() as u64)
            .checked_mul(OBJECT_STRIDE)
            .and_then(|offset| self.base.checked_add(offset))
            .ok_or(VmError::HeapExhausted {
                base: self.base,
                count: self.headers.len(),
            })?;
        self.headers.push(ObjectHeader {
            tag: GOOD_OBJ_TAG,
            class: Rc::clone(class),
        });
        Ok(ObjRef::from_addr(addr))
    }

    /// Overwrite the tag of an existing header. Returns false if no object
    /// lives at `obj`.
    pub fn poison(&mut self, obj: ObjRef, tag: u32) -> bool {
        match self.index_of(obj.addr()) {
            Some(index) => {
                self.headers[index].tag = tag;
                true
            }
            None => false,
        }
    }

    /// The header stored at `addr`, if `addr` is the start of an object
    /// allocated in this space. Any other bit pattern yields `None`.
    pub fn header(&self, addr: u64) -> Option<&ObjectHeader> {
        self.index_of(addr).map(|index| &self.headers[index])
    }

    /// Whether `addr` names a well-formed object.
    pub fn is_object(&self, addr: u64) -> bool {
        self.header(addr).is_some_and(ObjectHeader::is_well_formed)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    fn index_of(&self, addr: u64) -> Option<usize> {
        let offset = addr.checked_sub(self.base)?;
        if offset % OBJECT_STRIDE != 0 {
            return None;
        }
        let index = usize::try_from(offset / OBJECT_STRIDE).ok()?;
        (index < self.headers.len()).then_some(index)
    }
}
