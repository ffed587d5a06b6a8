//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::error::Result;
use crate::evidence::EvidenceKind;
use crate::geofence::Coordinate;
use crate::subject::Role;
use crate::zone::RiskLevel;

/// A latitude/longitude pair given on the command line.
#[derive(Debug, Clone, Copy, Args)]
pub struct LocationArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,
}

impl LocationArgs {
    /// Validate into a coordinate.
    ///
    /// # Errors
    ///
    /// Returns a validation error if either value is out of range.
    pub fn coordinate(&self) -> Result<Coordinate> {
        Coordinate::new(self.lat, self.lon)
    }
}

/// Fields shared by `zone add` and `zone update`.
#[derive(Debug, Clone, Args)]
pub struct ZoneArgs {
    /// Zone name
    #[arg(long)]
    pub name: String,

    /// Center of the zone
    #[command(flatten)]
    pub center: LocationArgs,

    /// Radius in kilometers
    #[arg(long)]
    pub radius: f64,

    /// Risk level
    #[arg(long, value_enum, default_value = "high")]
    pub level: RiskLevelArg,

    /// Free-text description
    #[arg(long)]
    pub description: Option<String>,
}

/// Risk zone commands.
#[derive(Debug, Subcommand)]
pub enum ZoneCommand {
    /// Create a risk zone
    Add {
        /// Zone fields
        #[command(flatten)]
        zone: ZoneArgs,

        /// Subject creating the zone
        #[arg(long)]
        created_by: Option<i64>,
    },

    /// List zones
    List {
        /// Include deactivated zones
        #[arg(short, long)]
        all: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Replace a zone's fields
    Update {
        /// Zone ID
        id: i64,

        /// Zone fields
        #[command(flatten)]
        zone: ZoneArgs,
    },

    /// Deactivate a zone
    Deactivate {
        /// Zone ID
        id: i64,
    },

    /// Report which active zone, if any, contains a location
    Check {
        /// Location to check
        #[command(flatten)]
        location: LocationArgs,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Subject directory commands.
#[derive(Debug, Subcommand)]
pub enum SubjectCommand {
    /// Register or update a subject
    Add {
        /// Subject ID issued by the identity provider
        id: i64,

        /// Display name
        name: String,

        /// Subject's own phone number
        #[arg(long)]
        phone: Option<String>,

        /// Role
        #[arg(long, value_enum, default_value = "citizen")]
        role: RoleArg,

        /// Emergency contact (repeat for several)
        #[arg(long = "contact", value_name = "PHONE")]
        contacts: Vec<String>,
    },

    /// Show a subject
    Show {
        /// Subject ID
        id: i64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Alert lifecycle commands.
#[derive(Debug, Subcommand)]
pub enum AlertCommand {
    /// Raise an SOS alert and notify emergency contacts
    Trigger {
        /// Subject raising the alert
        #[arg(long)]
        subject: i64,

        /// Where the subject is
        #[command(flatten)]
        location: LocationArgs,

        /// Human-readable address
        #[arg(long)]
        address: Option<String>,
    },

    /// Resolve an active alert
    Resolve {
        /// Alert ID
        id: i64,

        /// Resolving operator's subject ID
        #[arg(long = "by")]
        resolver: i64,

        /// Resolution notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show an alert with its evidence and notifications
    Show {
        /// Alert ID
        id: i64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List alerts, newest first
    List {
        /// Only unresolved alerts
        #[arg(short, long)]
        active: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Evidence commands.
#[derive(Debug, Subcommand)]
pub enum EvidenceCommand {
    /// Attach a recording to an alert
    Attach {
        /// Alert ID
        alert_id: i64,

        /// Media kind
        #[arg(short, long, value_enum)]
        kind: EvidenceKindArg,

        /// File to store in the blob directory
        #[arg(short, long, conflicts_with = "handle", required_unless_present = "handle")]
        file: Option<PathBuf>,

        /// Existing payload handle
        #[arg(long)]
        handle: Option<String>,

        /// Recording length in seconds
        #[arg(short, long)]
        duration: Option<u32>,

        /// Capture latitude
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Capture longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// List evidence for an alert in capture order
    List {
        /// Alert ID
        alert_id: i64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Write a stored recording to a file or stdout
    Fetch {
        /// Evidence ID
        evidence_id: i64,

        /// Destination file (stdout if omitted)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

/// Crime report commands.
#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// File an anonymous crime report
    Submit {
        /// Where it happened
        #[command(flatten)]
        location: LocationArgs,

        /// Crime type (defaults to "other")
        #[arg(short = 't', long = "type")]
        crime_type: Option<String>,

        /// What happened
        #[arg(short, long)]
        description: Option<String>,

        /// Human-readable address
        #[arg(long)]
        address: Option<String>,

        /// Voice note to store in the blob directory
        #[arg(long, value_name = "FILE")]
        voice: Option<PathBuf>,
    },

    /// List reports, newest first
    List {
        /// Maximum number of reports
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Write a report's voice note to a file or stdout
    Voice {
        /// Report ID
        report_id: i64,

        /// Destination file (stdout if omitted)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

/// Offline sync commands.
#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Apply a JSON batch of buffered client operations
    Apply {
        /// File holding a JSON array of operations (`-` for stdin)
        file: PathBuf,

        /// Subject the batch belongs to
        #[arg(long)]
        subject: i64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Risk level argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RiskLevelArg {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
}

impl From<RiskLevelArg> for RiskLevel {
    fn from(arg: RiskLevelArg) -> Self {
        match arg {
            RiskLevelArg::Low => Self::Low,
            RiskLevelArg::Medium => Self::Medium,
            RiskLevelArg::High => Self::High,
        }
    }
}

/// Role argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Ordinary user
    Citizen,
    /// Operator
    Admin,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Citizen => Self::Citizen,
            RoleArg::Admin => Self::Admin,
        }
    }
}

/// Evidence kind argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EvidenceKindArg {
    /// Audio recording
    Audio,
    /// Video recording
    Video,
}

impl From<EvidenceKindArg> for EvidenceKind {
    fn from(arg: EvidenceKindArg) -> Self {
        match arg {
            EvidenceKindArg::Audio => Self::Audio,
            EvidenceKindArg::Video => Self::Video,
        }
    }
}
