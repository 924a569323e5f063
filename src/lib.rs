//! Partition planning and validation for the installer.
//!
//! A [`delegate::PartitionDelegate`] holds the proposed layout of every disk
//! and a journal of the edits made to it. [`validate::validate`] decides
//! whether a layout can be installed to, and [`encrypt::EncryptGate`]
//! collects the full-disk-encryption password.

pub mod delegate;
pub mod drives;
pub mod encrypt;
pub mod error;
pub mod internal;
pub mod operation;
pub mod plan;
pub mod probe;
pub mod units;
pub mod validate;

pub use delegate::{PartitionDelegate, RefreshListener};
pub use drives::{Device, DiskLabel, FsType, Partition, PartitionBuilder, PartitionType};
pub use error::{ConfigError, EncryptError, LayoutError, PartitionError};
pub use internal::Policy;
pub use operation::{Journal, Operation, OperationKind};
