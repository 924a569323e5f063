//! Full-disk-encryption password gate.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::drives::Device;
use crate::error::EncryptError;
use crate::internal::files;
use crate::units::GIB;

/// Where `cryptsetup -d` picks the key up during install.
pub const DEFAULT_KEY_FILE: &str = "/tmp/luks";

/// Receives the encryption password once the gate is committed. An empty
/// password means the disk is not encrypted.
pub trait SecretSink {
  fn write_full_disk_encrypt_password(&mut self, password: &str) -> io::Result<()>;
}

/// Stores the password in a key file readable by its owner only.
#[derive(Debug, Clone)]
pub struct KeyFileSink {
  path: PathBuf,
}

impl KeyFileSink {
  pub fn new<P: Into<PathBuf>>(path: P) -> Self {
    Self { path: path.into() }
  }
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Default for KeyFileSink {
  fn default() -> Self {
    Self::new(DEFAULT_KEY_FILE)
  }
}

impl SecretSink for KeyFileSink {
  fn write_full_disk_encrypt_password(&mut self, password: &str) -> io::Result<()> {
    files::write_secret_file(&self.path, password)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputField {
  text: String,
  enabled: bool,
}

impl InputField {
  fn new() -> Self {
    Self {
      text: String::new(),
      enabled: true,
    }
  }
  pub fn text(&self) -> &str {
    &self.text
  }
  pub fn enabled(&self) -> bool {
    self.enabled
  }
  fn set_text(&mut self, text: &str) -> Result<(), EncryptError> {
    if !self.enabled {
      return Err(EncryptError::FieldDisabled);
    }
    self.text = text.to_string();
    Ok(())
  }
}

/// The disk the gate is shown for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
  pub path: String,
  pub model: String,
  pub size_gib: u64,
}

#[derive(Debug, Clone)]
pub struct EncryptGate {
  enabled: bool,
  password: InputField,
  password_repeat: InputField,
  password_label_enabled: bool,
  repeat_label_enabled: bool,
  last_error: Option<&'static str>,
  finished: bool,
  device: Option<DeviceSummary>,
}

impl Default for EncryptGate {
  fn default() -> Self {
    Self::new()
  }
}

impl EncryptGate {
  pub fn new() -> Self {
    Self {
      enabled: true,
      password: InputField::new(),
      password_repeat: InputField::new(),
      password_label_enabled: true,
      repeat_label_enabled: true,
      last_error: None,
      finished: false,
      device: None,
    }
  }

  pub fn enabled(&self) -> bool {
    self.enabled
  }
  pub fn password(&self) -> &InputField {
    &self.password
  }
  pub fn password_repeat(&self) -> &InputField {
    &self.password_repeat
  }
  pub fn labels_enabled(&self) -> (bool, bool) {
    (self.password_label_enabled, self.repeat_label_enabled)
  }
  /// Tip shown under the fields after a failed commit
  pub fn last_error(&self) -> Option<&'static str> {
    self.last_error
  }
  pub fn finished(&self) -> bool {
    self.finished
  }
  pub fn device(&self) -> Option<&DeviceSummary> {
    self.device.as_ref()
  }

  /// Both fields and their labels follow the toggle. Typed text is kept.
  pub fn set_enabled(&mut self, enabled: bool) {
    debug!("Full disk encryption {}", if enabled { "on" } else { "off" });
    self.enabled = enabled;
    self.password.enabled = enabled;
    self.password_repeat.enabled = enabled;
    self.password_label_enabled = enabled;
    self.repeat_label_enabled = enabled;
  }

  pub fn set_password(&mut self, text: &str) -> Result<(), EncryptError> {
    self.password.set_text(text)?;
    self.last_error = None;
    Ok(())
  }

  pub fn set_password_repeat(&mut self, text: &str) -> Result<(), EncryptError> {
    self.password_repeat.set_text(text)?;
    self.last_error = None;
    Ok(())
  }

  pub fn set_device(&mut self, device: &Device) {
    self.device = Some(DeviceSummary {
      path: device.path().to_string(),
      model: device.model().to_string(),
      size_gib: device.length() / GIB,
    });
  }

  /// Hand the password to `sink` and finish the gate.
  ///
  /// With encryption disabled the sink receives an empty string. Mismatching
  /// passwords keep the gate open and write nothing.
  pub fn commit(&mut self, sink: &mut dyn SecretSink) -> Result<(), EncryptError> {
    if self.finished {
      return Err(EncryptError::AlreadyFinished);
    }
    let secret = if self.enabled {
      if self.password.text != self.password_repeat.text {
        warn!("Encryption passwords do not match");
        self.last_error = Some("Passwords do not match");
        return Err(EncryptError::PasswordMismatch);
      }
      self.password.text.as_str()
    } else {
      ""
    };
    sink.write_full_disk_encrypt_password(secret)?;
    info!(
      "Full disk encryption {}",
      if secret.is_empty() { "disabled" } else { "configured" }
    );
    self.finished = true;
    Ok(())
  }
}
