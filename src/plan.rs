//! Applies a list of requested edits to a delegate.

use log::{debug, info};
use thiserror::Error;

use crate::delegate::PartitionDelegate;
use crate::drives::{Partition, PartitionBuilder};
use crate::error::PartitionError;
use crate::internal::config::PlanStep;
use crate::units::parse_size;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
  #[error("step {step}: no partition {path}")]
  UnknownPartition { step: usize, path: String },

  #[error("step {step}: invalid size {size:?}")]
  InvalidSize { step: usize, size: String },

  #[error("step {step}: {source}")]
  Rejected {
    step: usize,
    #[source]
    source: PartitionError,
  },
}

/// Apply `steps` in order. Stops at the first rejected step; the steps
/// before it stay applied and journaled.
pub fn apply(delegate: &mut PartitionDelegate, steps: &[PlanStep]) -> Result<(), PlanError> {
  for (idx, step) in steps.iter().enumerate() {
    let step_no = idx + 1;
    debug!("Plan step {step_no}: {step:?}");
    apply_step(delegate, step, step_no)?;
  }
  info!("Applied {} plan step(s)", steps.len());
  Ok(())
}

fn apply_step(
  delegate: &mut PartitionDelegate,
  step: &PlanStep,
  step_no: usize,
) -> Result<(), PlanError> {
  let rejected = |source: PartitionError| PlanError::Rejected {
    step: step_no,
    source,
  };
  let size = |s: &str| {
    parse_size(s).ok_or_else(|| PlanError::InvalidSize {
      step: step_no,
      size: s.to_string(),
    })
  };

  match step {
    PlanStep::Create {
      device,
      start,
      size: requested,
      logical,
      fs,
      mount_point,
    } => {
      let candidate = PartitionBuilder::new(device.as_str(), *start, size(requested.as_str())?)
        .partition_type(PlanStep::partition_type(*logical))
        .fs(PlanStep::fs_type(fs.as_deref()))
        .mount_point(mount_point.clone().unwrap_or_default())
        .build()
        .map_err(rejected)?;
      delegate.create_partition(&candidate).map_err(rejected)?;
    }
    PlanStep::Delete { partition } => {
      let target = find(delegate, partition, step_no)?;
      delegate.delete_partition(&target).map_err(rejected)?;
    }
    PlanStep::Resize {
      partition,
      size: requested,
    } => {
      let target = find(delegate, partition, step_no)?;
      delegate
        .resize_partition(&target, size(requested.as_str())?)
        .map_err(rejected)?;
    }
    PlanStep::Format {
      partition,
      fs,
      mount_point,
    } => {
      let target = find(delegate, partition, step_no)?;
      let mount_point = mount_point.as_deref().unwrap_or(target.mount_point());
      delegate
        .format_partition(&target, PlanStep::fs_type(Some(fs)), mount_point)
        .map_err(rejected)?;
    }
  }
  Ok(())
}

fn find(delegate: &PartitionDelegate, path: &str, step: usize) -> Result<Partition, PlanError> {
  delegate
    .find_partition(path)
    .ok_or_else(|| PlanError::UnknownPartition {
      step,
      path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::drives::{Device, DiskLabel, FsType};
  use crate::units::GIB;

  fn delegate() -> PartitionDelegate {
    PartitionDelegate::new(vec![Device::new(
      "/dev/vda",
      "",
      64 * GIB,
      DiskLabel::Gpt,
      vec![],
    )])
  }

  fn steps(json: &str) -> Vec<PlanStep> {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn create_then_format() {
    let mut delegate = delegate();
    apply(
      &mut delegate,
      &steps(
        r#"[
          {"action": "create", "device": "/dev/vda", "start": 1048576, "size": "512MiB", "fs": "efi", "mount_point": "/boot/efi"},
          {"action": "create", "device": "/dev/vda", "start": 537919488, "size": "40GiB"},
          {"action": "format", "partition": "/dev/vda2", "fs": "btrfs", "mount_point": "/"}
        ]"#,
      ),
    )
    .unwrap();
    assert_eq!(delegate.journal().len(), 3);
    let root = delegate.find_partition("/dev/vda2").unwrap();
    assert_eq!(root.fs(), FsType::Btrfs);
    assert_eq!(root.mount_point(), "/");
    // keeps the mount point when none is given
    apply(
      &mut delegate,
      &steps(r#"[{"action": "format", "partition": "/dev/vda1", "fs": "fat32"}]"#),
    )
    .unwrap();
    assert_eq!(
      delegate.find_partition("/dev/vda1").unwrap().mount_point(),
      "/boot/efi"
    );
  }

  #[test]
  fn stops_at_first_failure() {
    let mut delegate = delegate();
    let err = apply(
      &mut delegate,
      &steps(
        r#"[
          {"action": "create", "device": "/dev/vda", "start": 1048576, "size": "1GiB"},
          {"action": "delete", "partition": "/dev/vda9"},
          {"action": "delete", "partition": "/dev/vda1"}
        ]"#,
      ),
    )
    .unwrap_err();
    assert_eq!(
      err,
      PlanError::UnknownPartition {
        step: 2,
        path: "/dev/vda9".into()
      }
    );
    assert_eq!(delegate.journal().len(), 1);
  }

  #[test]
  fn bad_size_and_rejected_edit() {
    let mut delegate = delegate();
    let err = apply(
      &mut delegate,
      &steps(r#"[{"action": "create", "device": "/dev/vda", "start": 1048576, "size": "lots"}]"#),
    )
    .unwrap_err();
    assert!(matches!(err, PlanError::InvalidSize { step: 1, .. }));

    let err = apply(
      &mut delegate,
      &steps(r#"[{"action": "create", "device": "/dev/vda", "start": 1048576, "size": "100GiB"}]"#),
    )
    .unwrap_err();
    assert!(matches!(
      err,
      PlanError::Rejected {
        step: 1,
        source: PartitionError::NotEnoughSpace { .. }
      }
    ));
    assert!(delegate.journal().is_empty());
  }
}
