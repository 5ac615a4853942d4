use super::error::VmError;
use super::heap::ObjRef;

/// Index that is never assigned, used as the numeric "not found" signal.
pub const NOT_FOUND: usize = 0;

#[derive(Debug, Clone)]
struct ConstantEntry {
    name: String,
    value: ObjRef,
}

/// Append-only table of literal objects, indexed from 1.
///
/// Names are not deduplicated: `create_value` always appends, and callers
/// that want one entry per literal go through `intern`.
#[derive(Debug)]
pub struct ConstantPool {
    entries: Vec<ConstantEntry>,
    capacity: usize,
}

impl ConstantPool {
    /// A pool with room for `capacity` entries (indices `1..=capacity`).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Index of the first entry created under `name`.
    pub fn lookup_index(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.name == name)
            .map(|pos| pos + 1)
    }

    /// `lookup_index` with `NOT_FOUND` in place of `None`.
    pub fn lookup_index_raw(&self, name: &str) -> usize {
        self.lookup_index(name).unwrap_or(NOT_FOUND)
    }

    /// Append a new entry and return its index.
    pub fn create_value(&mut self, name: &str, value: ObjRef) -> Result<usize, VmError> {
        if self.entries.len() >= self.capacity {
            return Err(VmError::ConstantPoolExhausted {
                capacity: self.capacity,
            });
        }
        self.entries.push(ConstantEntry {
            name: name.to_string(),
            value,
        });
        Ok(self.entries.len())
    }

    /// Return the index of `name`, creating the entry with `make` if absent.
    pub fn intern<F>(&mut self, name: &str, make: F) -> Result<usize, VmError>
    where
        F: FnOnce() -> ObjRef,
    {
        match self.lookup_index(name) {
            Some(index) => Ok(index),
            None => self.create_value(name, make()),
        }
    }

    pub fn get_value(&self, index: usize) -> Result<ObjRef, VmError> {
        self.entry(index).map(|entry| entry.value)
    }

    pub fn name(&self, index: usize) -> Result<&str, VmError> {
        self.entry(index).map(|entry| entry.name.as_str())
    }

    /// Next index `create_value` will assign.
    pub fn next_index(&self) -> usize {
        self.entries.len() + 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over `(index, name, value)` in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str, ObjRef)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i + 1, entry.name.as_str(), entry.value))
    }

    fn entry(&self, index: usize) -> Result<&ConstantEntry, VmError> {
        index
            .checked_sub(1)
            .and_then(|pos| self.entries.get(pos))
            .ok_or(VmError::InvalidConstantIndex {
                index,
                next: self.next_index(),
            })
    }
}
