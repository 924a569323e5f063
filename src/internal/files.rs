use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub fn remove_file(path: &Path) -> io::Result<()> {
  fs::remove_file(path)?;
  log::info!("Remove {}", path.display());
  Ok(())
}

/// Write `content` to `path`, replacing any previous content.
/// The file is readable by the owner only, as it holds key material.
pub fn write_secret_file(path: &Path, content: &str) -> io::Result<()> {
  let mut options = OpenOptions::new();
  options.write(true).create(true).truncate(true);
  #[cfg(unix)]
  {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
  }
  let mut file = options.open(path)?;
  file.write_all(content.as_bytes())?;
  log::info!("Write key file {}", path.display());
  Ok(())
}
