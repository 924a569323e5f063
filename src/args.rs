use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "aegis-partman")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Plan and check partition layouts for the installer", long_about = None)]
pub struct Cli {
  #[command(subcommand)]
  pub command: Command,

  #[arg(short, long, action = clap::ArgAction::Count)]
  pub verbose: u8,

  /// Log file, without the .log extension
  #[arg(long, global = true, default_value = "/tmp/aegis-partman")]
  pub log_file: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Print the disks of this machine as a layout file
  #[command(name = "probe")]
  Probe,

  /// Check whether a layout can be installed to
  #[command(name = "validate")]
  Validate(ValidateArgs),

  /// Apply a list of partition edits to a layout
  #[command(name = "plan")]
  Plan(PlanArgs),

  /// Set up or skip full disk encryption
  #[command(name = "encrypt")]
  Encrypt(EncryptArgs),
}

#[derive(Debug, Args)]
pub struct PolicyArgs {
  /// Policy file (TOML). Built-in thresholds are used when omitted
  #[arg(long)]
  pub policy: Option<PathBuf>,

  /// Validate for an EFI install regardless of policy and firmware
  #[arg(long)]
  pub efi: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
  /// Layout file (JSON). The disks of this machine are probed when omitted
  #[arg(long)]
  pub layout: Option<PathBuf>,

  #[command(flatten)]
  pub policy: PolicyArgs,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
  /// Layout file (JSON). The disks of this machine are probed when omitted
  #[arg(long)]
  pub layout: Option<PathBuf>,

  /// Edits to apply (JSON list)
  #[arg(long)]
  pub ops: PathBuf,

  #[command(flatten)]
  pub policy: PolicyArgs,

  /// Write the resulting journal here instead of stdout
  #[arg(long)]
  pub journal: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct EncryptArgs {
  /// Install without encryption
  #[arg(long, conflicts_with_all = ["password", "repeat"])]
  pub disable: bool,

  #[arg(long, required_unless_present = "disable")]
  pub password: Option<String>,

  #[arg(long, required_unless_present = "disable")]
  pub repeat: Option<String>,

  /// Key file handed to cryptsetup
  #[arg(long, default_value = aegis_partman::encrypt::DEFAULT_KEY_FILE)]
  pub key_file: PathBuf,
}
