use std::path::Path;

const EFI_FIRMWARE_DIR: &str = "/sys/firmware/efi";

/// Whether the running system was booted through UEFI firmware
pub fn is_efi() -> bool {
  is_efi_at(Path::new(EFI_FIRMWARE_DIR))
}

fn is_efi_at(firmware_dir: &Path) -> bool {
  let efi = firmware_dir.is_dir();
  log::debug!("EFI firmware directory {firmware_dir:?} present: {efi}");
  efi
}
