//! Reads the disks of the running system from `lsblk`.

use std::process::Command;

use log::{debug, warn};
use serde_json::{from_slice, Map, Value};

use crate::drives::{Device, DiskLabel, FsType, Partition, PartitionBuilder, PartitionType};
use crate::drives::FIRST_LOGICAL_NUMBER;
use crate::error::ConfigError;

const EFI_PART_GUID: &str = "c12a7328-f81f-11d2-ba4b-00a0c93ec93b";
const EFI_PART_MSDOS: &str = "0xef";
const EXTENDED_PART_MSDOS: [&str; 3] = ["0x5", "0xf", "0x85"];
/// lsblk START comes from sysfs, which counts 512 byte units whatever the
/// logical sector size of the disk.
const SYSFS_SECTOR: u64 = 512;

/// Run `lsblk` and turn its disks into `Device`s.
///
/// Partitions mounted on the live system come back `busy`.
pub fn lsblk() -> Result<Vec<Device>, ConfigError> {
  // -b: sizes in bytes, START stays in 512 byte units
  let output = Command::new("lsblk")
    .args([
      "--json",
      "-b",
      "-o",
      "PATH,NAME,SIZE,TYPE,MOUNTPOINT,FSTYPE,START,PTTYPE,PARTTYPE,PARTN,MODEL",
    ])
    .output()?;

  if !output.status.success() {
    return Err(ConfigError::Lsblk(format!(
      "lsblk command failed with status: {}",
      output.status
    )));
  }

  let json: Value = from_slice(&output.stdout)?;
  parse_lsblk(&json)
}

/// Convert `lsblk --json -b` output into devices. Only entries of type
/// `disk` are kept.
pub fn parse_lsblk(json: &Value) -> Result<Vec<Device>, ConfigError> {
  let blockdevices = json
    .get("blockdevices")
    .and_then(|v| v.as_array())
    .ok_or_else(|| ConfigError::Lsblk("missing 'blockdevices' array".into()))?;

  let mut devices = vec![];
  for entry in blockdevices {
    let obj = entry
      .as_object()
      .ok_or_else(|| ConfigError::Lsblk("device entry is not an object".into()))?;
    if str_field(obj, "type") != Some("disk") {
      continue;
    }
    devices.push(parse_disk(obj)?);
  }
  debug!("lsblk reported {} disk(s)", devices.len());
  Ok(devices)
}

fn parse_disk(obj: &Map<String, Value>) -> Result<Device, ConfigError> {
  let path = device_path(obj)?;
  let length = u64_field(obj, "size")
    .ok_or_else(|| ConfigError::Lsblk(format!("{path}: missing or invalid SIZE")))?;
  let label = str_field(obj, "pttype")
    .map(DiskLabel::from_lsblk)
    .unwrap_or(DiskLabel::None);
  let model = str_field(obj, "model").unwrap_or_default().trim().to_string();

  let mut partitions = vec![];
  if let Some(children) = obj.get("children").and_then(|v| v.as_array()) {
    for child in children {
      let child = child
        .as_object()
        .ok_or_else(|| ConfigError::Lsblk(format!("{path}: partition entry is not an object")))?;
      if str_field(child, "type") != Some("part") {
        continue;
      }
      partitions.push(parse_partition(child, &path, label)?);
    }
  }
  fit_extended(&mut partitions);

  Ok(Device::new(path, model, length, label, partitions))
}

fn parse_partition(
  obj: &Map<String, Value>,
  disk: &str,
  label: DiskLabel,
) -> Result<Partition, ConfigError> {
  let path = device_path(obj)?;
  let start = u64_field(obj, "start")
    .ok_or_else(|| ConfigError::Lsblk(format!("{path}: missing or invalid START")))?
    .saturating_mul(SYSFS_SECTOR);
  let length = u64_field(obj, "size")
    .ok_or_else(|| ConfigError::Lsblk(format!("{path}: missing or invalid SIZE")))?;
  let number = u64_field(obj, "partn")
    .and_then(|n| u32::try_from(n).ok())
    .or_else(|| trailing_number(&path))
    .unwrap_or(0);
  let part_type = str_field(obj, "parttype").unwrap_or_default().to_lowercase();
  let busy = str_field(obj, "mountpoint").is_some_and(|m| !m.is_empty());

  let msdos = label == DiskLabel::Msdos;
  let partition_type = if msdos && EXTENDED_PART_MSDOS.contains(&part_type.as_str()) {
    PartitionType::Extended
  } else if msdos && number >= FIRST_LOGICAL_NUMBER {
    PartitionType::Logical
  } else {
    PartitionType::Primary
  };
  let fs = if part_type == EFI_PART_GUID || (msdos && part_type == EFI_PART_MSDOS) {
    FsType::Efi
  } else {
    str_field(obj, "fstype")
      .map(FsType::from_fs_name)
      .unwrap_or_default()
  };

  // lsblk reports the EBR of an extended partition as 1 KiB or less;
  // fit_extended() grows it afterwards.
  let length = length.max(1);
  PartitionBuilder::new(disk, start, length)
    .number(number)
    .partition_type(partition_type)
    .fs(fs)
    .busy(busy)
    .build()
    .map_err(|e| ConfigError::Lsblk(format!("{path}: {e}")))
}

/// Stretch the extended partition over its logical partitions.
fn fit_extended(partitions: &mut [Partition]) {
  let logical_end = partitions
    .iter()
    .filter(|p| p.is_logical())
    .map(|p| p.end())
    .max();
  let Some(ext) = partitions.iter_mut().find(|p| p.is_extended()) else {
    return;
  };
  match logical_end {
    Some(end) if end > ext.end() => ext.set_length(end - ext.start()),
    Some(_) => {}
    None => warn!("Extended partition {} holds no logical partitions", ext.describe()),
  }
}

fn device_path(obj: &Map<String, Value>) -> Result<String, ConfigError> {
  match (str_field(obj, "path"), str_field(obj, "name")) {
    (Some(path), _) => Ok(path.to_string()),
    (None, Some(name)) if name.starts_with("/dev/") => Ok(name.to_string()),
    (None, Some(name)) => Ok(format!("/dev/{name}")),
    (None, None) => Err(ConfigError::Lsblk("entry without PATH or NAME".into())),
  }
}

fn trailing_number(path: &str) -> Option<u32> {
  let digits = path.len() - path.trim_end_matches(|c: char| c.is_ascii_digit()).len();
  path[path.len() - digits..].parse().ok()
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
  obj.get(key).and_then(|v| v.as_str())
}

/// Older lsblk versions print numbers as strings even with `--json`.
fn u64_field(obj: &Map<String, Value>, key: &str) -> Option<u64> {
  match obj.get(key)? {
    Value::Number(n) => n.as_u64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}
