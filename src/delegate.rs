//! The current proposed disk layout and the journal of edits made to it.
//!
//! Every successful mutation builds a complete new snapshot first and then
//! commits snapshot, journal record and refresh notification together. A
//! rejected request leaves all three untouched.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::drives::{Device, DiskLabel, FsType, Partition, PartitionBuilder, PartitionType};
use crate::error::{LayoutError, PartitionError};
use crate::internal::Policy;
use crate::operation::{Journal, Operation};
use crate::validate::{self, InstallSettings, LayoutReport};

/// Notified after every change to the snapshot.
pub trait RefreshListener {
  fn device_refreshed(&mut self, devices: &Arc<[Device]>);
}

impl<F> RefreshListener for F
where
  F: FnMut(&Arc<[Device]>),
{
  fn device_refreshed(&mut self, devices: &Arc<[Device]>) {
    self(devices)
  }
}

pub struct PartitionDelegate {
  devices: Arc<[Device]>,
  journal: Journal,
  listeners: Vec<Box<dyn RefreshListener>>,
}

impl PartitionDelegate {
  pub fn new(devices: Vec<Device>) -> Self {
    Self {
      devices: normalize(devices),
      journal: Journal::new(),
      listeners: vec![],
    }
  }

  /// Shared read-only snapshot. It stays valid, and unchanged, for as long
  /// as the caller holds it, but goes stale at the next refresh.
  pub fn devices(&self) -> Arc<[Device]> {
    Arc::clone(&self.devices)
  }

  pub fn device(&self, path: &str) -> Option<&Device> {
    self.devices.iter().find(|d| d.path() == path)
  }

  pub fn journal(&self) -> &Journal {
    &self.journal
  }

  pub fn add_listener(&mut self, listener: Box<dyn RefreshListener>) {
    self.listeners.push(listener);
  }

  /// Partitions and free regions offered for editing: everything except
  /// extended containers and partitions in use, in device order.
  pub fn editable_partitions(&self) -> Vec<Partition> {
    self
      .devices
      .iter()
      .flat_map(|d| d.partitions())
      .filter(|p| !p.is_extended() && !p.busy())
      .cloned()
      .collect()
  }

  /// Look a partition up by block device path, e.g. `/dev/sda2`
  pub fn find_partition(&self, path: &str) -> Option<Partition> {
    self
      .devices
      .iter()
      .flat_map(|d| d.used_partitions())
      .find(|p| p.path().as_deref() == Some(path))
      .cloned()
  }

  /// Whether `candidate` can be added as a primary partition: the table has
  /// a primary slot left and the candidate lies in free space outside any
  /// extended partition.
  pub fn can_add_primary(&self, candidate: &Partition) -> bool {
    let Some(device) = self.device(candidate.device_path()) else {
      return false;
    };
    if device.primary_slots_used() >= device.label().max_primaries() {
      debug!(
        "{}: all {} primary slots used",
        device.path(),
        device.label().max_primaries()
      );
      return false;
    }
    device
      .free_region_containing(candidate.start(), candidate.end())
      .is_some_and(|region| !device.is_inside_extended(region))
  }

  /// Whether `candidate` can be added as a logical partition: the device has
  /// an extended partition with enough free space for it.
  pub fn can_add_logical(&self, candidate: &Partition) -> bool {
    let Some(device) = self.device(candidate.device_path()) else {
      return false;
    };
    if device.label() != DiskLabel::Msdos || device.extended().is_none() {
      return false;
    }
    device
      .free_region_containing(candidate.start(), candidate.end())
      .is_some_and(|region| device.is_inside_extended(region))
  }

  /// Whether any new partition fits where `candidate` is
  pub fn check_new_partition(&self, candidate: &Partition) -> Result<(), PartitionError> {
    if self.can_add_primary(candidate) || self.can_add_logical(candidate) {
      Ok(())
    } else {
      warn!("Can not add new partition any more at {}", candidate.describe());
      Err(PartitionError::PartitionLimitReached(candidate.device_path().to_string()))
    }
  }

  /// Add `candidate` to its device. Its type picks the rules applied:
  /// primary and extended partitions need a primary slot, logical ones an
  /// extended partition. Returns the partition as committed.
  pub fn create_partition(&mut self, candidate: &Partition) -> Result<Partition, PartitionError> {
    let result = self.plan_create(candidate);
    let (next, op) = self.reject_on_error(result)?;
    let created = op.partition_new().clone();
    self.commit(next, op);
    Ok(created)
  }

  /// Remove `partition` from the layout, leaving free space behind.
  pub fn delete_partition(&mut self, partition: &Partition) -> Result<(), PartitionError> {
    let result = self.plan_delete(partition);
    let (next, op) = self.reject_on_error(result)?;
    self.commit(next, op);
    Ok(())
  }

  /// Change the length of `partition`, keeping its start. Growing takes
  /// space from the free region directly after it.
  pub fn resize_partition(
    &mut self,
    partition: &Partition,
    new_length: u64,
  ) -> Result<Partition, PartitionError> {
    let result = self.plan_resize(partition, new_length);
    let (next, op) = self.reject_on_error(result)?;
    let resized = op.partition_new().clone();
    self.commit(next, op);
    Ok(resized)
  }

  /// Set the filesystem and mount point of `partition`.
  pub fn format_partition(
    &mut self,
    partition: &Partition,
    fs: FsType,
    mount_point: &str,
  ) -> Result<Partition, PartitionError> {
    let result = self.plan_format(partition, fs, mount_point);
    let (next, op) = self.reject_on_error(result)?;
    let formatted = op.partition_new().clone();
    self.commit(next, op);
    Ok(formatted)
  }

  /// Tell listeners to redraw from the current snapshot.
  pub fn refresh_visual(&mut self) {
    for listener in self.listeners.iter_mut() {
      listener.device_refreshed(&self.devices);
    }
  }

  /// Swap in a freshly probed layout. The journal is kept.
  pub fn replace_devices(&mut self, devices: Vec<Device>) {
    info!("Replacing layout with {} probed device(s)", devices.len());
    self.devices = normalize(devices);
    self.refresh_visual();
  }

  pub fn validate(&self, policy: &Policy) -> Result<LayoutReport, LayoutError> {
    validate::validate(&self.devices, policy)
  }

  /// Validate and hand the swap file decision to `settings` on success.
  pub fn validate_into(
    &self,
    policy: &Policy,
    settings: &mut dyn InstallSettings,
  ) -> Result<LayoutReport, LayoutError> {
    validate::validate_into(&self.devices, policy, settings)
  }

  fn reject_on_error<T>(&self, result: Result<T, PartitionError>) -> Result<T, PartitionError> {
    if let Err(e) = &result {
      warn!("Rejected partition edit: {e}");
    }
    result
  }

  fn commit(&mut self, next: Vec<Device>, op: Operation) {
    info!(
      "{:?} {} on {}",
      op.kind(),
      op.partition_new().describe(),
      op.device_path()
    );
    self.devices = Arc::from(next);
    self.journal.push(op);
    self.refresh_visual();
  }

  fn device_index(&self, path: &str) -> Result<usize, PartitionError> {
    self
      .devices
      .iter()
      .position(|d| d.path() == path)
      .ok_or_else(|| PartitionError::DeviceNotFound(path.to_string()))
  }

  /// Find the live entry for `partition` and make sure it may be edited.
  /// Returns device and partition indexes.
  fn locate_editable(&self, partition: &Partition) -> Result<(usize, usize), PartitionError> {
    let dev_idx = self.device_index(partition.device_path())?;
    let device = &self.devices[dev_idx];
    let not_found = || PartitionError::PartitionNotFound {
      device: device.path().to_string(),
      id: partition.id(),
    };
    let part_idx = device.position_by_id(partition.id()).ok_or_else(not_found)?;
    let live = &device.partitions()[part_idx];
    if live.is_unallocated() {
      return Err(not_found());
    }
    if live.busy() {
      return Err(PartitionError::PartitionBusy(live.describe()));
    }
    if live.is_extended() {
      return Err(PartitionError::ExtendedPartition(live.describe()));
    }
    Ok((dev_idx, part_idx))
  }

  fn check_mount_point(&self, mount_point: &str, except: Option<u64>) -> Result<(), PartitionError> {
    if mount_point.is_empty() {
      return Ok(());
    }
    match self
      .devices
      .iter()
      .find(|d| d.mount_point_taken(mount_point, except))
    {
      Some(device) => Err(PartitionError::MountPointInUse {
        device: device.path().to_string(),
        mount_point: mount_point.to_string(),
      }),
      None => Ok(()),
    }
  }

  fn plan_create(&self, candidate: &Partition) -> Result<(Vec<Device>, Operation), PartitionError> {
    let dev_idx = self.device_index(candidate.device_path())?;
    let device = &self.devices[dev_idx];
    if candidate.length() == 0 {
      return Err(PartitionError::InvalidSize(0));
    }

    let limit_reached = || PartitionError::PartitionLimitReached(device.path().to_string());
    let no_space = || PartitionError::NotEnoughSpace {
      device: device.path().to_string(),
      requested: candidate.length(),
    };

    let partition_type = candidate.partition_type();
    let number = match partition_type {
      PartitionType::Primary | PartitionType::Extended => {
        if device.primary_slots_used() >= device.label().max_primaries() {
          return Err(limit_reached());
        }
        if partition_type == PartitionType::Extended
          && (device.label() != DiskLabel::Msdos || device.extended().is_some())
        {
          return Err(limit_reached());
        }
        if !self.can_add_primary(candidate) {
          return Err(no_space());
        }
        device.next_primary_number().ok_or_else(limit_reached)?
      }
      PartitionType::Logical => {
        if device.label() != DiskLabel::Msdos || device.extended().is_none() {
          return Err(limit_reached());
        }
        if !self.can_add_logical(candidate) {
          return Err(no_space());
        }
        device.next_logical_number()
      }
      PartitionType::Unallocated => return Err(PartitionError::InvalidType(partition_type)),
    };

    let (fs, mount_point) = if partition_type == PartitionType::Extended {
      (FsType::Unknown, "")
    } else {
      (candidate.fs(), candidate.mount_point())
    };
    self.check_mount_point(mount_point, None)?;

    let region = device
      .free_region_containing(candidate.start(), candidate.end())
      .cloned()
      .ok_or_else(no_space)?;
    let created = PartitionBuilder::new(device.path(), candidate.start(), candidate.length())
      .number(number)
      .partition_type(partition_type)
      .fs(fs)
      .mount_point(mount_point)
      .build()?;
    debug!(
      "Carving {} from free region {}..{}",
      created.describe(),
      region.start(),
      region.end()
    );

    let mut next = self.devices.to_vec();
    let target = &mut next[dev_idx];
    target.partitions_mut().push(created.clone());
    target.calculate_free_space();
    let op = Operation::create(device.path(), region, created);
    Ok((next, op))
  }

  fn plan_delete(&self, partition: &Partition) -> Result<(Vec<Device>, Operation), PartitionError> {
    let (dev_idx, part_idx) = self.locate_editable(partition)?;
    let device = &self.devices[dev_idx];
    let live = device.partitions()[part_idx].clone();

    let mut next = self.devices.to_vec();
    let target = &mut next[dev_idx];
    target.partitions_mut().remove(part_idx);
    target.calculate_free_space();
    let freed = target
      .free_region_containing(live.start(), live.end())
      .cloned()
      .unwrap_or_else(|| Partition::unallocated(device.path(), live.start(), live.length()));
    let op = Operation::delete(device.path(), live, freed);
    Ok((next, op))
  }

  fn plan_resize(
    &self,
    partition: &Partition,
    new_length: u64,
  ) -> Result<(Vec<Device>, Operation), PartitionError> {
    let (dev_idx, part_idx) = self.locate_editable(partition)?;
    let device = &self.devices[dev_idx];
    let live = device.partitions()[part_idx].clone();
    if new_length == 0 || new_length == live.length() {
      return Err(PartitionError::InvalidSize(new_length));
    }

    if new_length > live.length() {
      let new_end = live.start().saturating_add(new_length);
      let follower = device
        .partitions()
        .get(part_idx + 1)
        .filter(|f| f.is_unallocated() && device.is_inside_extended(f) == live.is_logical());
      let fits = follower.is_some_and(|f| f.end() >= new_end);
      if !fits {
        return Err(PartitionError::NotEnoughSpace {
          device: device.path().to_string(),
          requested: new_length,
        });
      }
    }

    let mut resized = live.clone();
    resized.set_length(new_length);
    let mut next = self.devices.to_vec();
    let target = &mut next[dev_idx];
    target.partitions_mut()[part_idx] = resized.clone();
    target.calculate_free_space();
    let op = Operation::resize(device.path(), live, resized);
    Ok((next, op))
  }

  fn plan_format(
    &self,
    partition: &Partition,
    fs: FsType,
    mount_point: &str,
  ) -> Result<(Vec<Device>, Operation), PartitionError> {
    let (dev_idx, part_idx) = self.locate_editable(partition)?;
    let device = &self.devices[dev_idx];
    let live = device.partitions()[part_idx].clone();
    self.check_mount_point(mount_point, Some(live.id()))?;

    let mut formatted = live.clone();
    formatted.set_fs(fs);
    formatted.set_mount_point(mount_point);
    let mut next = self.devices.to_vec();
    next[dev_idx].partitions_mut()[part_idx] = formatted.clone();
    let op = Operation::format(device.path(), live, formatted);
    Ok((next, op))
  }
}

fn normalize(devices: Vec<Device>) -> Arc<[Device]> {
  devices
    .into_iter()
    .map(|mut d| {
      d.calculate_free_space();
      d
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::operation::OperationKind;
  use crate::units::{GIB, MIB};
  use std::cell::Cell;
  use std::rc::Rc;

  fn primary(device: &str, number: u32, start: u64, length: u64) -> Partition {
    PartitionBuilder::new(device, start, length)
      .number(number)
      .fs(FsType::Ext4)
      .build()
      .unwrap()
  }

  fn msdos_disk(parts: Vec<Partition>) -> Device {
    Device::new("/dev/sda", "QEMU HARDDISK", 100 * GIB, DiskLabel::Msdos, parts)
  }

  fn counter(delegate: &mut PartitionDelegate) -> Rc<Cell<usize>> {
    let count = Rc::new(Cell::new(0));
    let seen = Rc::clone(&count);
    delegate.add_listener(Box::new(move |_: &Arc<[Device]>| seen.set(seen.get() + 1)));
    count
  }

  fn free_region(delegate: &PartitionDelegate, idx: usize) -> Partition {
    delegate.devices()[0].free_spaces().nth(idx).unwrap().clone()
  }

  #[test]
  fn four_primaries_fill_msdos_table() {
    let delegate = PartitionDelegate::new(vec![msdos_disk(vec![
      primary("/dev/sda", 1, MIB, 10 * GIB),
      primary("/dev/sda", 2, 11 * GIB, 10 * GIB),
      primary("/dev/sda", 3, 21 * GIB, 10 * GIB),
      primary("/dev/sda", 4, 31 * GIB, 10 * GIB),
    ])]);
    let free = delegate.devices()[0].free_spaces().last().unwrap().clone();
    assert!(free.length() > 50 * GIB);
    assert!(!delegate.can_add_primary(&free));
    assert!(!delegate.can_add_logical(&free));
    assert_eq!(
      delegate.check_new_partition(&free),
      Err(PartitionError::PartitionLimitReached("/dev/sda".into()))
    );
  }

  #[test]
  fn primary_needs_free_space() {
    let delegate = PartitionDelegate::new(vec![msdos_disk(vec![primary(
      "/dev/sda",
      1,
      MIB,
      10 * GIB,
    )])]);
    let free = free_region(&delegate, 0);
    assert!(delegate.can_add_primary(&free));
    let overlapping = PartitionBuilder::new("/dev/sda", 5 * GIB, GIB).build().unwrap();
    assert!(!delegate.can_add_primary(&overlapping));
    let too_big = PartitionBuilder::new("/dev/sda", free.start(), free.length() + 1)
      .build()
      .unwrap();
    assert!(!delegate.can_add_primary(&too_big));
    let elsewhere = PartitionBuilder::new("/dev/sdz", MIB, GIB).build().unwrap();
    assert!(!delegate.can_add_primary(&elsewhere));
  }

  #[test]
  fn logical_needs_extended_partition() {
    let ext = PartitionBuilder::new("/dev/sda", 10 * GIB, 20 * GIB)
      .number(2)
      .partition_type(PartitionType::Extended)
      .build()
      .unwrap();
    let delegate = PartitionDelegate::new(vec![msdos_disk(vec![
      primary("/dev/sda", 1, MIB, 5 * GIB),
      ext,
    ])]);
    let device = &delegate.devices()[0];
    let inside = device.free_spaces().find(|f| device.is_inside_extended(f)).unwrap().clone();
    let outside = device.free_spaces().find(|f| !device.is_inside_extended(f)).unwrap().clone();
    assert!(delegate.can_add_logical(&inside));
    assert!(!delegate.can_add_primary(&inside));
    assert!(!delegate.can_add_logical(&outside));
    assert!(delegate.can_add_primary(&outside));

    let no_ext = PartitionDelegate::new(vec![msdos_disk(vec![])]);
    assert!(!no_ext.can_add_logical(&free_region(&no_ext, 0)));
  }

  #[test]
  fn create_logical_partitions_get_numbers_from_five() {
    let ext = PartitionBuilder::new("/dev/sda", MIB, 50 * GIB)
      .number(1)
      .partition_type(PartitionType::Extended)
      .build()
      .unwrap();
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![ext])]);
    let first = PartitionBuilder::new("/dev/sda", 2 * MIB, 10 * GIB)
      .partition_type(PartitionType::Logical)
      .fs(FsType::Ext4)
      .mount_point("/")
      .build()
      .unwrap();
    let first = delegate.create_partition(&first).unwrap();
    assert_eq!(first.path().as_deref(), Some("/dev/sda5"));
    let second = PartitionBuilder::new("/dev/sda", 20 * GIB, 10 * GIB)
      .partition_type(PartitionType::Logical)
      .build()
      .unwrap();
    let second = delegate.create_partition(&second).unwrap();
    assert_eq!(second.number(), 6);
  }

  #[test]
  fn create_appends_journal_and_notifies_once() {
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![])]);
    let refreshes = counter(&mut delegate);
    let region = free_region(&delegate, 0);
    let candidate = PartitionBuilder::new("/dev/sda", region.start(), 30 * GIB)
      .fs(FsType::Ext4)
      .mount_point("/")
      .build()
      .unwrap();

    let created = delegate.create_partition(&candidate).unwrap();
    assert_eq!(created.number(), 1);
    assert_eq!(created.mount_point(), "/");
    assert_eq!(refreshes.get(), 1);
    assert_eq!(delegate.journal().len(), 1);
    let op = delegate.journal().last().unwrap();
    assert_eq!(op.kind(), OperationKind::Create);
    assert_eq!(op.partition_orig().start(), region.start());
    assert!(op.partition_orig().is_unallocated());

    let device = &delegate.devices()[0];
    assert_eq!(device.used_partitions().count(), 1);
    let rest = device.free_spaces().next().unwrap();
    assert_eq!(rest.start(), created.end());
  }

  #[test]
  fn create_delete_resize_journal_in_commit_order() {
    let a = primary("/dev/sda", 1, MIB, 10 * GIB);
    let b = primary("/dev/sda", 2, 20 * GIB, 10 * GIB);
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![a.clone(), b.clone()])]);
    let refreshes = counter(&mut delegate);

    let candidate = PartitionBuilder::new("/dev/sda", 40 * GIB, 5 * GIB).build().unwrap();
    let created = delegate.create_partition(&candidate).unwrap();
    delegate.delete_partition(&b).unwrap();
    delegate.resize_partition(&a, 15 * GIB).unwrap();

    let journal = delegate.journal();
    assert_eq!(journal.len(), 3);
    let kinds: Vec<_> = journal.iter().map(|op| op.kind()).collect();
    assert_eq!(
      kinds,
      vec![OperationKind::Create, OperationKind::Delete, OperationKind::Resize]
    );
    assert_eq!(journal.as_slice()[0].partition_new().start(), created.start());
    assert_eq!(journal.as_slice()[1].partition_orig().path().as_deref(), Some("/dev/sda2"));
    assert_eq!(journal.as_slice()[2].partition_orig().length(), 10 * GIB);
    assert_eq!(journal.as_slice()[2].partition_new().length(), 15 * GIB);
    assert!(journal.iter().all(|op| op.device_path() == "/dev/sda"));
    assert_eq!(refreshes.get(), 3);
  }

  #[test]
  fn duplicate_root_is_rejected() {
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![])]);
    let root = PartitionBuilder::new("/dev/sda", MIB, 30 * GIB)
      .mount_point("/")
      .build()
      .unwrap();
    delegate.create_partition(&root).unwrap();
    let again = PartitionBuilder::new("/dev/sda", 40 * GIB, 30 * GIB)
      .mount_point("/")
      .build()
      .unwrap();
    assert_eq!(
      delegate.create_partition(&again),
      Err(PartitionError::MountPointInUse {
        device: "/dev/sda".into(),
        mount_point: "/".into()
      })
    );
    assert_eq!(delegate.journal().len(), 1);
  }

  #[test]
  fn free_region_itself_is_not_creatable() {
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![])]);
    let region = free_region(&delegate, 0);
    assert_eq!(
      delegate.create_partition(&region),
      Err(PartitionError::InvalidType(PartitionType::Unallocated))
    );
  }

  #[test]
  fn delete_busy_partition_changes_nothing() {
    let busy = PartitionBuilder::new("/dev/sda", MIB, 10 * GIB)
      .number(1)
      .busy(true)
      .build()
      .unwrap();
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![busy.clone()])]);
    let refreshes = counter(&mut delegate);
    let before = delegate.devices();

    assert_eq!(
      delegate.delete_partition(&busy),
      Err(PartitionError::PartitionBusy("/dev/sda1".into()))
    );
    assert!(Arc::ptr_eq(&before, &delegate.devices()));
    assert!(delegate.journal().is_empty());
    assert_eq!(refreshes.get(), 0);
  }

  #[test]
  fn delete_unknown_partition_is_reported() {
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![])]);
    let stranger = primary("/dev/sda", 1, MIB, GIB);
    assert!(matches!(
      delegate.delete_partition(&stranger),
      Err(PartitionError::PartitionNotFound { .. })
    ));
    let other_disk = primary("/dev/sdb", 1, MIB, GIB);
    assert_eq!(
      delegate.delete_partition(&other_disk),
      Err(PartitionError::DeviceNotFound("/dev/sdb".into()))
    );
    let region = free_region(&delegate, 0);
    assert!(matches!(
      delegate.delete_partition(&region),
      Err(PartitionError::PartitionNotFound { .. })
    ));
  }

  #[test]
  fn delete_extended_is_rejected() {
    let ext = PartitionBuilder::new("/dev/sda", MIB, 10 * GIB)
      .number(1)
      .partition_type(PartitionType::Extended)
      .build()
      .unwrap();
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![ext.clone()])]);
    assert_eq!(
      delegate.delete_partition(&ext),
      Err(PartitionError::ExtendedPartition("/dev/sda1".into()))
    );
  }

  #[test]
  fn delete_merges_free_space() {
    let a = primary("/dev/sda", 1, MIB, 10 * GIB);
    let b = primary("/dev/sda", 2, 10 * GIB + MIB, 10 * GIB);
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![a, b.clone()])]);
    delegate.delete_partition(&b).unwrap();
    let device = &delegate.devices()[0];
    let free: Vec<_> = device.free_spaces().collect();
    assert_eq!(free.len(), 1);
    assert_eq!(free[0].start(), 10 * GIB + MIB);
    assert_eq!(free[0].end(), 100 * GIB);
    let op = delegate.journal().last().unwrap();
    assert_eq!(op.kind(), OperationKind::Delete);
    assert_eq!(op.partition_orig().path().as_deref(), Some("/dev/sda2"));
    assert_eq!(op.partition_new().start(), 10 * GIB + MIB);
  }

  #[test]
  fn resize_grows_into_following_space() {
    let a = primary("/dev/sda", 1, MIB, 10 * GIB);
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![a.clone()])]);
    let grown = delegate.resize_partition(&a, 20 * GIB).unwrap();
    assert_eq!(grown.length(), 20 * GIB);
    assert_eq!(grown.id(), a.id());
    let device = &delegate.devices()[0];
    assert_eq!(device.free_spaces().next().unwrap().start(), MIB + 20 * GIB);

    assert!(matches!(
      delegate.resize_partition(&a, 200 * GIB),
      Err(PartitionError::NotEnoughSpace { .. })
    ));
    assert_eq!(delegate.resize_partition(&a, 0), Err(PartitionError::InvalidSize(0)));
    assert_eq!(delegate.journal().len(), 1);
  }

  #[test]
  fn resize_blocked_by_neighbour() {
    let a = primary("/dev/sda", 1, MIB, 10 * GIB);
    let b = primary("/dev/sda", 2, 10 * GIB + MIB, 10 * GIB);
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![a.clone(), b])]);
    assert!(matches!(
      delegate.resize_partition(&a, 11 * GIB),
      Err(PartitionError::NotEnoughSpace { .. })
    ));
    let shrunk = delegate.resize_partition(&a, 5 * GIB).unwrap();
    assert_eq!(shrunk.end(), MIB + 5 * GIB);
    let device = &delegate.devices()[0];
    assert_eq!(device.free_spaces().next().unwrap().start(), MIB + 5 * GIB);
  }

  #[test]
  fn format_sets_mount_point() {
    let a = primary("/dev/sda", 1, MIB, 30 * GIB);
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![a.clone()])]);
    let formatted = delegate.format_partition(&a, FsType::Btrfs, "/").unwrap();
    assert_eq!(formatted.fs(), FsType::Btrfs);
    // rebinding its own mount point is fine
    delegate.format_partition(&formatted, FsType::Ext4, "/").unwrap();
    let op = delegate.journal().last().unwrap();
    assert_eq!(op.kind(), OperationKind::Format);
    assert_eq!(op.partition_orig().fs(), FsType::Btrfs);
    assert_eq!(op.partition_new().fs(), FsType::Ext4);
  }

  #[test]
  fn editable_partitions_skip_extended_and_busy() {
    let busy = PartitionBuilder::new("/dev/sda", MIB, 5 * GIB)
      .number(1)
      .busy(true)
      .build()
      .unwrap();
    let ext = PartitionBuilder::new("/dev/sda", 10 * GIB, 20 * GIB)
      .number(2)
      .partition_type(PartitionType::Extended)
      .build()
      .unwrap();
    let logical = PartitionBuilder::new("/dev/sda", 10 * GIB + MIB, 5 * GIB)
      .number(5)
      .partition_type(PartitionType::Logical)
      .build()
      .unwrap();
    let delegate = PartitionDelegate::new(vec![msdos_disk(vec![busy, ext, logical])]);
    let editable = delegate.editable_partitions();
    assert!(editable.iter().all(|p| !p.is_extended() && !p.busy()));
    assert!(editable.iter().any(|p| p.number() == 5));
    assert_eq!(delegate.find_partition("/dev/sda5").map(|p| p.number()), Some(5));
  }

  #[test]
  fn replace_devices_keeps_journal_and_notifies() {
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![])]);
    let candidate = PartitionBuilder::new("/dev/sda", MIB, GIB).build().unwrap();
    delegate.create_partition(&candidate).unwrap();
    let refreshes = counter(&mut delegate);
    delegate.replace_devices(vec![msdos_disk(vec![])]);
    assert_eq!(refreshes.get(), 1);
    assert_eq!(delegate.journal().len(), 1);
    assert_eq!(delegate.devices()[0].used_partitions().count(), 0);
    delegate.refresh_visual();
    assert_eq!(refreshes.get(), 2);
  }

  #[test]
  fn snapshot_survives_later_edits() {
    let a = primary("/dev/sda", 1, MIB, 10 * GIB);
    let mut delegate = PartitionDelegate::new(vec![msdos_disk(vec![a.clone()])]);
    let before = delegate.devices();
    let handle = std::thread::spawn({
      let snapshot = Arc::clone(&before);
      move || snapshot[0].used_partitions().count()
    });
    delegate.delete_partition(&a).unwrap();
    assert_eq!(handle.join().unwrap(), 1);
    assert_eq!(before[0].used_partitions().count(), 1);
    assert_eq!(delegate.devices()[0].used_partitions().count(), 0);
  }
}
