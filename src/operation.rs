//! Pending partition table edits, in the order they were committed.
//!
//! The journal is what a disk executor replays against the real device.
//! Records are never changed after they are appended; a correction is a new
//! record.

use serde::Serialize;

use crate::drives::Partition;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
  Create,
  Delete,
  Resize,
  /// Filesystem or mount point change on an existing partition
  Format,
}

/// One committed edit with the partition before and after it.
///
/// For `Create` the original is the free region the partition was carved
/// from; for `Delete` the new snapshot is the free region left behind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Operation {
  kind: OperationKind,
  device_path: String,
  partition_orig: Partition,
  partition_new: Partition,
}

impl Operation {
  pub fn new(kind: OperationKind, device_path: &str, orig: Partition, new: Partition) -> Self {
    Self {
      kind,
      device_path: device_path.to_string(),
      partition_orig: orig,
      partition_new: new,
    }
  }
  pub fn create(device_path: &str, region: Partition, created: Partition) -> Self {
    Self::new(OperationKind::Create, device_path, region, created)
  }
  pub fn delete(device_path: &str, deleted: Partition, freed: Partition) -> Self {
    Self::new(OperationKind::Delete, device_path, deleted, freed)
  }
  pub fn resize(device_path: &str, orig: Partition, resized: Partition) -> Self {
    Self::new(OperationKind::Resize, device_path, orig, resized)
  }
  pub fn format(device_path: &str, orig: Partition, formatted: Partition) -> Self {
    Self::new(OperationKind::Format, device_path, orig, formatted)
  }
  pub fn kind(&self) -> OperationKind {
    self.kind
  }
  pub fn device_path(&self) -> &str {
    &self.device_path
  }
  pub fn partition_orig(&self) -> &Partition {
    &self.partition_orig
  }
  pub fn partition_new(&self) -> &Partition {
    &self.partition_new
  }
}

/// Append-only list of operations.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Journal {
  operations: Vec<Operation>,
}

impl Journal {
  pub fn new() -> Self {
    Self::default()
  }
  pub(crate) fn push(&mut self, op: Operation) {
    self.operations.push(op);
  }
  pub fn len(&self) -> usize {
    self.operations.len()
  }
  pub fn is_empty(&self) -> bool {
    self.operations.is_empty()
  }
  pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
    self.operations.iter()
  }
  pub fn as_slice(&self) -> &[Operation] {
    &self.operations
  }
  pub fn last(&self) -> Option<&Operation> {
    self.operations.last()
  }
}

impl<'a> IntoIterator for &'a Journal {
  type Item = &'a Operation;
  type IntoIter = std::slice::Iter<'a, Operation>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}
