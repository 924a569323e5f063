//! Byte units and size arithmetic shared by the planner and the validator.

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;
pub const TIB: u64 = 1 << 40;

/// Bytes lost to partition table rounding and alignment.
/// Size checks add this to a partition's length before comparing.
pub const ALIGNMENT_PADDING: u64 = MIB;

pub fn mib_to_bytes(mib: u64) -> u64 {
  mib.saturating_mul(MIB)
}

pub fn gib_to_bytes(gib: u64) -> u64 {
  gib.saturating_mul(GIB)
}

/// Whether `length` plus the alignment padding reaches `required` bytes.
pub fn meets_threshold(length: u64, required: u64) -> bool {
  length.saturating_add(ALIGNMENT_PADDING) >= required
}

#[inline]
pub fn align_up(x: u64, align: u64) -> u64 {
  if align == 0 {
    return x;
  }
  x.div_ceil(align) * align
}

/// Bytes reserved at the end of a GPT disk for the backup header and table.
/// Assumes 512 byte sectors and the usual 128 entries of 128 bytes.
pub fn gpt_tail_reserve() -> u64 {
  let sector = 512;
  let table_bytes = 128 * 128;
  sector + align_up(table_bytes, sector)
}

/// Simple byte size formatter
pub fn bytes_readable(bytes: u64) -> String {
  if bytes >= TIB {
    format!("{:.2} TiB", bytes as f64 / TIB as f64)
  } else if bytes >= GIB {
    format!("{:.2} GiB", bytes as f64 / GIB as f64)
  } else if bytes >= MIB {
    format!("{:.2} MiB", bytes as f64 / MIB as f64)
  } else if bytes >= KIB {
    format!("{:.2} KiB", bytes as f64 / KIB as f64)
  } else {
    format!("{bytes} B")
  }
}

/// Parse human-readable size strings into bytes
/// Supports binary and decimal suffixes: "50 MiB", "500MB", "1024B", "20G"
/// A bare number is taken as bytes.
pub fn parse_size(s: &str) -> Option<u64> {
  let s = s.trim().to_lowercase();

  // longest suffixes first so "mib" is not read as "b"
  let units: [(&str, f64); 13] = [
    ("tib", TIB as f64),
    ("gib", GIB as f64),
    ("mib", MIB as f64),
    ("kib", KIB as f64),
    ("tb", 1_000_000_000_000.0),
    ("gb", 1_000_000_000.0),
    ("mb", 1_000_000.0),
    ("kb", 1_000.0),
    ("t", TIB as f64),
    ("g", GIB as f64),
    ("m", MIB as f64),
    ("k", KIB as f64),
    ("b", 1.0),
  ];

  for (unit, multiplier) in units.iter() {
    if let Some(num_str) = s.strip_suffix(unit) {
      let value = num_str.trim().parse::<f64>().ok()?;
      if value < 0.0 || !value.is_finite() {
        return None;
      }
      return Some((value * multiplier).round() as u64);
    }
  }

  s.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn threshold_includes_padding() {
    let required = gib_to_bytes(20);
    assert!(meets_threshold(required - MIB, required));
    assert!(!meets_threshold(required - MIB - 1, required));
  }

  #[test]
  fn threshold_saturates() {
    assert!(meets_threshold(u64::MAX, gib_to_bytes(1)));
  }

  #[test]
  fn parses_sizes() {
    assert_eq!(parse_size("512MiB"), Some(512 * MIB));
    assert_eq!(parse_size(" 20 GiB "), Some(20 * GIB));
    assert_eq!(parse_size("500MB"), Some(500_000_000));
    assert_eq!(parse_size("1.5g"), Some(GIB + GIB / 2));
    assert_eq!(parse_size("4096"), Some(4096));
    assert_eq!(parse_size("-1MiB"), None);
    assert_eq!(parse_size("lots"), None);
  }

  #[test]
  fn readable() {
    assert_eq!(bytes_readable(300), "300 B");
    assert_eq!(bytes_readable(300 * MIB), "300.00 MiB");
    assert_eq!(bytes_readable(20 * GIB), "20.00 GiB");
  }

  #[test]
  fn alignment() {
    assert_eq!(align_up(MIB + 1, MIB), 2 * MIB);
    assert_eq!(align_up(7, 0), 7);
    assert_eq!(gpt_tail_reserve(), 512 + 16384);
  }
}
