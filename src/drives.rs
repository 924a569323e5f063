use std::{collections::BTreeSet, fmt, sync::atomic::AtomicU64};
use serde::{Deserialize, Serialize};

use crate::error::PartitionError;
use crate::units::{gpt_tail_reserve, MIB};

static NEXT_PART_ID: AtomicU64 = AtomicU64::new(1);

pub fn get_entry_id() -> u64 {
  NEXT_PART_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

/// Space left untouched at the start of every disk.
pub const FRONT_RESERVE: u64 = MIB;
/// Gaps up to this size are alignment slack, not usable free space.
pub const MIN_FREE_SPACE: u64 = MIB;
/// msdos logical partitions are numbered after the four primary slots.
pub const FIRST_LOGICAL_NUMBER: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskLabel {
  #[serde(rename = "gpt")]
  Gpt,
  #[serde(rename = "msdos")]
  Msdos,
  #[serde(rename = "none")]
  None,
}

impl DiskLabel {
  pub fn from_lsblk(s: &str) -> Self {
    match s {
      "gpt" => DiskLabel::Gpt,
      "dos" | "msdos" => DiskLabel::Msdos, // lsblk uses "dos" for MBR
      _ => DiskLabel::None,
    }
  }
  pub fn as_str(&self) -> &'static str {
    match self {
      DiskLabel::Gpt => "gpt",
      DiskLabel::Msdos => "msdos",
      DiskLabel::None => "none",
    }
  }
  /// Primary slots in the partition table. Extended partitions take one too.
  /// An unlabeled disk is going to get a GPT label.
  pub fn max_primaries(&self) -> usize {
    match self {
      DiskLabel::Msdos => 4,
      DiskLabel::Gpt | DiskLabel::None => 128,
    }
  }
}

impl fmt::Display for DiskLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FsType {
  #[default]
  Unknown,
  Efi,
  LinuxSwap,
  Ext2,
  Ext3,
  Ext4,
  Btrfs,
  Xfs,
  Fat16,
  Fat32,
  Ntfs,
}

impl FsType {
  pub fn as_str(&self) -> &'static str {
    match self {
      FsType::Unknown => "unknown",
      FsType::Efi => "efi",
      FsType::LinuxSwap => "linux-swap",
      FsType::Ext2 => "ext2",
      FsType::Ext3 => "ext3",
      FsType::Ext4 => "ext4",
      FsType::Btrfs => "btrfs",
      FsType::Xfs => "xfs",
      FsType::Fat16 => "fat16",
      FsType::Fat32 => "fat32",
      FsType::Ntfs => "ntfs",
    }
  }
  /// Map an lsblk/blkid filesystem name. `vfat` is reported for every FAT
  /// flavour, so it maps to fat32.
  pub fn from_fs_name(s: &str) -> Self {
    match s {
      "efi" => FsType::Efi,
      "swap" | "linux-swap" => FsType::LinuxSwap,
      "ext2" => FsType::Ext2,
      "ext3" => FsType::Ext3,
      "ext4" => FsType::Ext4,
      "btrfs" => FsType::Btrfs,
      "xfs" => FsType::Xfs,
      "fat16" => FsType::Fat16,
      "vfat" | "fat32" => FsType::Fat32,
      "ntfs" => FsType::Ntfs,
      _ => FsType::Unknown,
    }
  }
}

impl fmt::Display for FsType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionType {
  #[default]
  Primary,
  Logical,
  Extended,
  /// Free region between partitions
  Unallocated,
}

/// A partition, or a free region, on a disk.
///
/// Ranges are half-open: `[start, start + length)`, both in bytes.
/// The owning disk is referenced by path only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
  #[serde(skip, default = "get_entry_id")]
  id: u64,
  #[serde(default)]
  device_path: String,
  /// Table index, 0 until the partition gets one
  #[serde(default)]
  number: u32,
  #[serde(default, rename = "type")]
  partition_type: PartitionType,
  #[serde(default)]
  fs: FsType,
  #[serde(default)]
  mount_point: String,
  start: u64,
  length: u64,
  #[serde(default)]
  busy: bool,
}

impl Partition {
  pub(crate) fn unallocated(device_path: &str, start: u64, length: u64) -> Self {
    Self {
      id: get_entry_id(),
      device_path: device_path.to_string(),
      number: 0,
      partition_type: PartitionType::Unallocated,
      fs: FsType::Unknown,
      mount_point: String::new(),
      start,
      length,
      busy: false,
    }
  }
  pub fn id(&self) -> u64 {
    self.id
  }
  pub fn device_path(&self) -> &str {
    &self.device_path
  }
  pub fn number(&self) -> u32 {
    self.number
  }
  /// Kernel block device path, e.g. `/dev/sda2` or `/dev/nvme0n1p2`
  pub fn path(&self) -> Option<String> {
    if self.number == 0 {
      return None;
    }
    let sep = if self.device_path.chars().last().is_some_and(|c| c.is_ascii_digit()) {
      "p"
    } else {
      ""
    };
    Some(format!("{}{}{}", self.device_path, sep, self.number))
  }
  pub fn partition_type(&self) -> PartitionType {
    self.partition_type
  }
  pub fn fs(&self) -> FsType {
    self.fs
  }
  pub fn mount_point(&self) -> &str {
    &self.mount_point
  }
  pub fn start(&self) -> u64 {
    self.start
  }
  pub fn length(&self) -> u64 {
    self.length
  }
  pub fn end(&self) -> u64 {
    self.start.saturating_add(self.length)
  }
  pub fn busy(&self) -> bool {
    self.busy
  }
  pub fn is_unallocated(&self) -> bool {
    self.partition_type == PartitionType::Unallocated
  }
  pub fn is_extended(&self) -> bool {
    self.partition_type == PartitionType::Extended
  }
  pub fn is_logical(&self) -> bool {
    self.partition_type == PartitionType::Logical
  }
  /// Whether the partition takes one of the primary table slots
  pub fn takes_primary_slot(&self) -> bool {
    matches!(self.partition_type, PartitionType::Primary | PartitionType::Extended)
  }
  /// Whether `[start, end)` lies completely inside this partition
  pub fn contains_range(&self, start: u64, end: u64) -> bool {
    start >= self.start && end <= self.end() && start < end
  }
  /// Label used in logs and errors
  pub fn describe(&self) -> String {
    self
      .path()
      .unwrap_or_else(|| format!("{}@{}", self.device_path, self.start))
  }

  pub(crate) fn set_device_path<S: Into<String>>(&mut self, path: S) {
    self.device_path = path.into();
  }
  pub(crate) fn set_fs(&mut self, fs: FsType) {
    self.fs = fs;
  }
  pub(crate) fn set_mount_point<S: Into<String>>(&mut self, mount_point: S) {
    self.mount_point = mount_point.into();
  }
  pub(crate) fn set_length(&mut self, length: u64) {
    self.length = length;
  }
}

pub struct PartitionBuilder {
  device_path: String,
  start: u64,
  length: u64,
  number: u32,
  partition_type: PartitionType,
  fs: FsType,
  mount_point: String,
  busy: bool,
}

impl PartitionBuilder {
  pub fn new<S: Into<String>>(device_path: S, start: u64, length: u64) -> Self {
    Self {
      device_path: device_path.into(),
      start,
      length,
      number: 0,
      partition_type: PartitionType::Primary,
      fs: FsType::Unknown,
      mount_point: String::new(),
      busy: false,
    }
  }
  pub fn number(mut self, number: u32) -> Self {
    self.number = number;
    self
  }
  pub fn partition_type(mut self, partition_type: PartitionType) -> Self {
    self.partition_type = partition_type;
    self
  }
  pub fn fs(mut self, fs: FsType) -> Self {
    self.fs = fs;
    self
  }
  pub fn mount_point<S: Into<String>>(mut self, mount_point: S) -> Self {
    self.mount_point = mount_point.into();
    self
  }
  pub fn busy(mut self, busy: bool) -> Self {
    self.busy = busy;
    self
  }
  pub fn build(self) -> Result<Partition, PartitionError> {
    if self.length == 0 {
      return Err(PartitionError::InvalidSize(0));
    }
    Ok(Partition {
      id: get_entry_id(),
      device_path: self.device_path,
      number: self.number,
      partition_type: self.partition_type,
      fs: self.fs,
      mount_point: self.mount_point,
      start: self.start,
      length: self.length,
      busy: self.busy,
    })
  }
}

/// A physical disk and its layout, free regions included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
  path: String,
  #[serde(default)]
  model: String,
  /// bytes
  length: u64,
  #[serde(default = "default_label")]
  label: DiskLabel,
  /// On-disk order
  #[serde(default)]
  partitions: Vec<Partition>,
}

fn default_label() -> DiskLabel {
  DiskLabel::None
}

impl Device {
  pub fn new<S: Into<String>>(
    path: S,
    model: S,
    length: u64,
    label: DiskLabel,
    partitions: Vec<Partition>,
  ) -> Self {
    let mut new = Self {
      path: path.into(),
      model: model.into(),
      length,
      label,
      partitions,
    };
    new.calculate_free_space();
    new
  }
  pub fn path(&self) -> &str {
    &self.path
  }
  pub fn model(&self) -> &str {
    &self.model
  }
  pub fn length(&self) -> u64 {
    self.length
  }
  pub fn label(&self) -> DiskLabel {
    self.label
  }
  /// Partitions and free regions in on-disk order
  pub fn partitions(&self) -> &[Partition] {
    &self.partitions
  }
  /// Real partitions, free regions skipped
  pub fn used_partitions(&self) -> impl Iterator<Item = &Partition> {
    self.partitions.iter().filter(|p| !p.is_unallocated())
  }
  pub fn free_spaces(&self) -> impl Iterator<Item = &Partition> {
    self.partitions.iter().filter(|p| p.is_unallocated())
  }
  pub fn extended(&self) -> Option<&Partition> {
    self.partitions.iter().find(|p| p.is_extended())
  }
  pub(crate) fn position_by_id(&self, id: u64) -> Option<usize> {
    self.partitions.iter().position(|p| p.id() == id)
  }
  pub(crate) fn partitions_mut(&mut self) -> &mut Vec<Partition> {
    &mut self.partitions
  }
  /// Primary plus extended partitions, the entries counted against
  /// the label's primary slots
  pub fn primary_slots_used(&self) -> usize {
    self.partitions.iter().filter(|p| p.takes_primary_slot()).count()
  }
  /// Whether `part` sits inside the extended partition of this device
  pub fn is_inside_extended(&self, part: &Partition) -> bool {
    match self.extended() {
      Some(ext) if ext.id() != part.id() => ext.contains_range(part.start(), part.end()),
      _ => false,
    }
  }
  /// The free region holding `[start, end)`, if any
  pub fn free_region_containing(&self, start: u64, end: u64) -> Option<&Partition> {
    self.free_spaces().find(|f| f.contains_range(start, end))
  }
  /// Whether another partition of this device, other than `except`,
  /// is bound to `mount_point`
  pub fn mount_point_taken(&self, mount_point: &str, except: Option<u64>) -> bool {
    self
      .used_partitions()
      .any(|p| p.mount_point() == mount_point && Some(p.id()) != except)
  }
  /// First byte past the usable area of the disk
  pub fn last_usable(&self) -> u64 {
    let tail_reserve = match self.label {
      DiskLabel::Gpt | DiskLabel::None => gpt_tail_reserve(),
      DiskLabel::Msdos => 0,
    };
    self.length.saturating_sub(tail_reserve)
  }

  /// Lowest primary number not in use
  pub(crate) fn next_primary_number(&self) -> Option<u32> {
    let used: BTreeSet<u32> = self
      .used_partitions()
      .filter(|p| p.takes_primary_slot())
      .map(|p| p.number())
      .collect();
    (1..=self.label.max_primaries() as u32).find(|n| !used.contains(n))
  }

  pub(crate) fn next_logical_number(&self) -> u32 {
    self
      .used_partitions()
      .filter(|p| p.is_logical())
      .map(|p| p.number().saturating_add(1))
      .max()
      .unwrap_or(FIRST_LOGICAL_NUMBER)
      .max(FIRST_LOGICAL_NUMBER)
  }

  /// Rebuild the free regions between partitions
  ///
  /// Existing free entries are dropped and regenerated:
  /// 1. Real partitions are sorted by start, extended containers first
  /// 2. Gaps between them become free regions, split at the extended
  ///    partition boundaries so each region is either inside or outside it
  /// 3. 1 MiB is left at the front, the GPT backup table at the end, and
  ///    gaps up to `MIN_FREE_SPACE` are dropped
  pub(crate) fn calculate_free_space(&mut self) {
    let path = self.path.clone();
    let mut rest: Vec<Partition> = self
      .partitions
      .drain(..)
      .filter(|p| !p.is_unallocated())
      .map(|mut p| {
        p.set_device_path(path.as_str());
        p
      })
      .collect();
    rest.sort_by_key(|p| (p.start(), !p.is_extended()));

    let last_usable = self.last_usable();
    let extended = rest
      .iter()
      .find(|p| p.is_extended())
      .map(|p| (p.start(), p.end()));

    let mut gaps = vec![];
    let mut cursor = FRONT_RESERVE.min(last_usable);
    for p in rest.iter().filter(|p| !p.is_extended()) {
      if p.start() > cursor {
        push_gaps(&mut gaps, &path, cursor, p.start().min(last_usable), extended);
      }
      cursor = cursor.max(p.end().min(last_usable));
    }
    if cursor < last_usable {
      push_gaps(&mut gaps, &path, cursor, last_usable, extended);
    }

    let mut layout = rest.into_iter().chain(gaps).collect::<Vec<_>>();
    // an extended container sorts before the free region opening it
    layout.sort_by_key(|p| (p.start(), !p.is_extended()));
    self.partitions = layout;
  }
}

fn push_gaps(
  gaps: &mut Vec<Partition>,
  device_path: &str,
  from: u64,
  to: u64,
  extended: Option<(u64, u64)>,
) {
  let mut cuts = vec![from];
  if let Some((ext_start, ext_end)) = extended {
    for boundary in [ext_start, ext_end] {
      if boundary > from && boundary < to {
        cuts.push(boundary);
      }
    }
  }
  cuts.push(to);
  for w in cuts.windows(2) {
    let (start, end) = (w[0], w[1]);
    if end > start && end - start > MIN_FREE_SPACE {
      gaps.push(Partition::unallocated(device_path, start, end - start));
    }
  }
}
