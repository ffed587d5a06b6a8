//! Command-line interface for suraksha.
//!
//! This module provides the CLI structure for the `suraksha` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AlertCommand, ConfigCommand, EvidenceCommand, EvidenceKindArg, LocationArgs, ReportCommand,
    RiskLevelArg, RoleArg, StatsCommand, SubjectCommand, SyncCommand, ZoneArgs, ZoneCommand,
};

/// suraksha - SOS alerts, risk zones and offline sync
///
/// Operates the emergency-alert core against a local database: manage
/// geofenced risk zones, raise and resolve alerts, attach evidence, file
/// anonymous crime reports and apply batches recorded offline.
#[derive(Debug, Parser)]
#[command(name = "suraksha")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage geofenced risk zones
    #[command(subcommand)]
    Zone(ZoneCommand),

    /// Manage subjects and their emergency contacts
    #[command(subcommand)]
    Subject(SubjectCommand),

    /// Trigger, resolve and inspect SOS alerts
    #[command(subcommand)]
    Alert(AlertCommand),

    /// Attach and list alert evidence
    #[command(subcommand)]
    Evidence(EvidenceCommand),

    /// File and list anonymous crime reports
    #[command(subcommand)]
    Report(ReportCommand),

    /// Apply offline-recorded operations
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Show dashboard statistics
    Stats(StatsCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
