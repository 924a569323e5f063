mod args;
mod logging;

use crate::args::{Cli, Command, EncryptArgs, PlanArgs, PolicyArgs, ValidateArgs};
use aegis_partman::encrypt::{EncryptGate, KeyFileSink};
use aegis_partman::internal::config::{read_layout, read_plan};
use aegis_partman::units::bytes_readable;
use aegis_partman::validate::InstallSettings;
use aegis_partman::{probe, plan, Device, PartitionDelegate, Policy};
use anyhow::Context;
use clap::Parser;
use std::path::Path;

/// Records the swap file decision of a successful validation
#[derive(Debug, Default)]
struct ReportSettings {
  swap_file: Option<bool>,
}

impl InstallSettings for ReportSettings {
  fn write_requiring_swap_file(&mut self, required: bool) {
    self.swap_file = Some(required);
  }
}

fn main() -> anyhow::Result<()> {
  human_panic::setup_panic!();
  let cli = Cli::parse();
  let _logger = logging::init(cli.verbose, &cli.log_file)?;
  match cli.command {
    Command::Probe => {
      let devices = probe::lsblk().context("Probe disks")?;
      println!("{}", serde_json::to_string_pretty(&devices)?);
    }
    Command::Validate(args) => validate(args)?,
    Command::Plan(args) => run_plan(args)?,
    Command::Encrypt(args) => encrypt(args)?,
  }
  Ok(())
}

fn load_layout(path: Option<&Path>) -> anyhow::Result<Vec<Device>> {
  match path {
    Some(path) => read_layout(path).with_context(|| format!("Read layout {}", path.display())),
    None => probe::lsblk().context("Probe disks"),
  }
}

fn load_policy(args: &PolicyArgs) -> anyhow::Result<Policy> {
  let mut policy = Policy::load(args.policy.as_deref()).context("Read policy")?;
  if args.efi {
    policy.efi = true;
  }
  log::debug!("Using {policy:?}");
  Ok(policy)
}

/// Validate the delegate's layout and log the outcome
fn report(delegate: &PartitionDelegate, policy: &Policy) -> anyhow::Result<()> {
  for device in delegate.devices().iter() {
    log::debug!(
      "{} ({}) {} label, {}",
      device.path(),
      device.model(),
      device.label(),
      bytes_readable(device.length())
    );
    for part in device.partitions() {
      log::debug!(
        "{} {:?} {} {} {}",
        part.describe(),
        part.partition_type(),
        part.fs(),
        part.mount_point(),
        bytes_readable(part.length())
      );
    }
  }
  let mut settings = ReportSettings::default();
  delegate
    .validate_into(policy, &mut settings)
    .context("Layout is not installable")?;
  log::info!("Layout is installable");
  if settings.swap_file == Some(true) {
    log::info!("No swap partition, a swap file will be created");
  }
  Ok(())
}

fn validate(args: ValidateArgs) -> anyhow::Result<()> {
  let policy = load_policy(&args.policy)?;
  let delegate = PartitionDelegate::new(load_layout(args.layout.as_deref())?);
  report(&delegate, &policy)
}

fn run_plan(args: PlanArgs) -> anyhow::Result<()> {
  let policy = load_policy(&args.policy)?;
  let mut delegate = PartitionDelegate::new(load_layout(args.layout.as_deref())?);
  let steps = read_plan(&args.ops).with_context(|| format!("Read plan {}", args.ops.display()))?;
  let applied = plan::apply(&mut delegate, &steps);

  // the journal of the steps that did apply is written either way
  let journal = serde_json::to_string_pretty(delegate.journal().as_slice())?;
  match &args.journal {
    Some(path) => std::fs::write(path, journal)
      .with_context(|| format!("Write journal {}", path.display()))?,
    None => println!("{journal}"),
  }
  applied.context("Apply plan")?;
  report(&delegate, &policy)
}

fn encrypt(args: EncryptArgs) -> anyhow::Result<()> {
  let mut gate = EncryptGate::new();
  if args.disable {
    gate.set_enabled(false);
  } else {
    gate.set_password(args.password.as_deref().unwrap_or_default())?;
    gate.set_password_repeat(args.repeat.as_deref().unwrap_or_default())?;
  }
  let mut sink = KeyFileSink::new(args.key_file);
  gate.commit(&mut sink)?;
  log::info!("Key file {}", sink.path().display());
  Ok(())
}
