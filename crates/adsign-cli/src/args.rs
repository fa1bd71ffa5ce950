use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "adsign",
    version,
    about = "Diagnostics for signed contextual ads verification"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List an ad tech's registered signing keys, soonest-expiring first
    Keys(KeysArgs),
    /// Verify a signed contextual ads payload against the key store
    Verify(VerifyArgs),
}

#[derive(clap::Args, Debug)]
pub struct KeysArgs {
    /// Key-store JSON file (enrollments + signing keys)
    #[arg(long)]
    pub store: PathBuf,
    /// Ad tech identifier to look up
    pub ad_tech: String,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Key-store JSON file (enrollments + signing keys)
    #[arg(long)]
    pub store: PathBuf,
    /// Signed payload JSON file
    #[arg(long)]
    pub payload: PathBuf,
    /// Seller ad tech, used only for failure attribution
    #[arg(long)]
    pub seller: String,
    /// Caller package name recorded on failures
    #[arg(long, default_value = "adsign-cli")]
    pub caller_package: String,
    /// Print the full outcome as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}
