//! `suraksha` - CLI for the emergency-alert core
//!
//! This binary operates zones, subjects, alerts, evidence, crime reports and
//! offline sync batches against the configured local database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use suraksha::cli::{
    AlertCommand, Cli, Command, ConfigCommand, EvidenceCommand, ReportCommand, SubjectCommand,
    SyncCommand, ZoneArgs, ZoneCommand,
};
use suraksha::{
    init_logging, BlobStore, Config, Coordinate, Engine, FsBlobStore, LogDispatcher,
    PayloadHandle, ReportDraft, RiskZone, Storage, Subject, ZoneSpec,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        command => run(&config, command).await,
    }
}

async fn run(config: &Config, command: Command) -> anyhow::Result<()> {
    let storage = Arc::new(Storage::open(config.database_path())?);
    let engine = Engine::new(storage, config, Arc::new(LogDispatcher))?;

    match command {
        Command::Zone(cmd) => handle_zone(&engine, cmd),
        Command::Subject(cmd) => handle_subject(&engine, cmd),
        Command::Alert(cmd) => handle_alert(&engine, cmd).await,
        Command::Evidence(cmd) => handle_evidence(&engine, config, cmd),
        Command::Report(cmd) => handle_report(&engine, config, cmd),
        Command::Sync(cmd) => handle_sync(&engine, cmd).await,
        Command::Stats(cmd) => handle_stats(&engine, cmd.json),
        Command::Config(cmd) => handle_config(config, cmd),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn zone_spec(args: ZoneArgs) -> anyhow::Result<ZoneSpec> {
    Ok(ZoneSpec {
        name: args.name,
        center: args.center.coordinate()?,
        radius_km: args.radius,
        risk_level: args.level.into(),
        description: args.description,
    })
}

fn print_zone(zone: &RiskZone) {
    println!(
        "#{:<5} {:<24} {:<7} {:>7.2} km  ({}){}",
        zone.id,
        zone.name,
        zone.risk_level,
        zone.radius_km,
        zone.center,
        if zone.is_active() { "" } else { "  [inactive]" }
    );
}

fn handle_zone(engine: &Engine, cmd: ZoneCommand) -> anyhow::Result<()> {
    let zones = engine.zones();
    match cmd {
        ZoneCommand::Add { zone, created_by } => {
            let created = zones.create(&zone_spec(zone)?, created_by)?;
            println!("Created zone #{} ({})", created.id, created.name);
        }
        ZoneCommand::List { all, json } => {
            let list = if all {
                zones.list_all()?
            } else {
                zones.list_active()?
            };
            if json {
                print_json(&list)?;
            } else if list.is_empty() {
                println!("No zones.");
            } else {
                list.iter().for_each(print_zone);
            }
        }
        ZoneCommand::Update { id, zone } => {
            let updated = zones.update(id, &zone_spec(zone)?)?;
            println!("Updated zone #{} ({})", updated.id, updated.name);
        }
        ZoneCommand::Deactivate { id } => {
            let zone = zones.deactivate(id)?;
            println!("Deactivated zone #{} ({})", zone.id, zone.name);
        }
        ZoneCommand::Check { location, json } => {
            let point = location.coordinate()?;
            let hit = zones.check_location(&point)?;
            if json {
                print_json(&serde_json::json!({
                    "location": point,
                    "inZone": hit.is_some(),
                    "zone": hit,
                }))?;
            } else if let Some(zone) = hit {
                println!("{point} is inside {} risk zone \"{}\"", zone.risk_level, zone.name);
            } else {
                println!("{point} is not inside any active risk zone");
            }
        }
    }
    Ok(())
}

fn handle_subject(engine: &Engine, cmd: SubjectCommand) -> anyhow::Result<()> {
    match cmd {
        SubjectCommand::Add {
            id,
            name,
            phone,
            role,
            contacts,
        } => {
            let subject = Subject {
                id,
                name,
                phone,
                role: role.into(),
                emergency_contacts: contacts,
            };
            engine.subjects().register(&subject)?;
            println!(
                "Registered subject #{} with {} emergency contact(s)",
                subject.id,
                subject.emergency_contacts.len()
            );
        }
        SubjectCommand::Show { id, json } => {
            let subject = engine.subjects().get(id)?;
            if json {
                print_json(&subject)?;
            } else {
                println!("Subject #{}", subject.id);
                println!("  Name:      {}", subject.name);
                println!("  Role:      {}", subject.role);
                println!("  Phone:     {}", subject.phone.as_deref().unwrap_or("-"));
                println!("  Contacts:  {}", subject.emergency_contacts.join(", "));
            }
        }
    }
    Ok(())
}

async fn handle_alert(engine: &Engine, cmd: AlertCommand) -> anyhow::Result<()> {
    let alerts = engine.alerts();
    match cmd {
        AlertCommand::Trigger {
            subject,
            location,
            address,
        } => {
            let alert = alerts
                .trigger(subject, location.coordinate()?, address)
                .await?;
            let detail = alerts.detail(alert.id)?;
            println!("Alert #{} raised at {}", alert.id, alert.location);
            if let Some(zone) = &detail.zone_name {
                println!("  Inside risk zone: {zone}");
            }
            for record in &detail.notifications {
                println!("  {} -> {}", record.recipient, record.status);
            }
        }
        AlertCommand::Resolve {
            id,
            resolver,
            notes,
        } => {
            let alert = alerts.resolve(id, resolver, notes.as_deref())?;
            println!("Alert #{} resolved", alert.id);
        }
        AlertCommand::Show { id, json } => {
            let detail = alerts.detail(id)?;
            if json {
                print_json(&detail)?;
            } else {
                let alert = &detail.alert;
                println!("Alert #{} ({})", alert.id, alert.status);
                println!("  Subject:       {}", alert.subject_id);
                println!("  Location:      {}", alert.location);
                if let Some(address) = &alert.address {
                    println!("  Address:       {address}");
                }
                println!(
                    "  Zone:          {}",
                    detail.zone_name.as_deref().unwrap_or("-")
                );
                println!("  Triggered:     {}", alert.triggered_at.to_rfc3339());
                if let Some(resolution) = &alert.resolution {
                    println!(
                        "  Resolved:      {} by {}",
                        resolution.resolved_at.to_rfc3339(),
                        resolution.resolved_by
                    );
                    if let Some(notes) = &resolution.notes {
                        println!("  Notes:         {notes}");
                    }
                }
                println!("  Evidence:      {}", detail.evidence.len());
                for record in &detail.notifications {
                    println!("  Notified {} ({})", record.recipient, record.status);
                }
            }
        }
        AlertCommand::List { active, json } => {
            let list = if active {
                alerts.list_active()?
            } else {
                alerts.list_all()?
            };
            if json {
                print_json(&list)?;
            } else if list.is_empty() {
                println!("No alerts.");
            } else {
                for alert in &list {
                    println!(
                        "#{:<5} {:<9} subject {:<6} {}  ({})",
                        alert.id,
                        alert.status,
                        alert.subject_id,
                        alert.triggered_at.format("%Y-%m-%d %H:%M:%S"),
                        alert.location
                    );
                }
            }
        }
    }
    Ok(())
}

fn store_file(config: &Config, path: &Path) -> anyhow::Result<PayloadHandle> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let blobs = FsBlobStore::open(config.blob_dir())?;
    Ok(blobs.put(&bytes)?)
}

fn write_blob(config: &Config, handle: &PayloadHandle, out: Option<&Path>) -> anyhow::Result<()> {
    let bytes = FsBlobStore::open(config.blob_dir())?.get(handle)?;
    match out {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => std::io::stdout().lock().write_all(&bytes)?,
    }
    Ok(())
}

fn handle_evidence(engine: &Engine, config: &Config, cmd: EvidenceCommand) -> anyhow::Result<()> {
    match cmd {
        EvidenceCommand::Attach {
            alert_id,
            kind,
            file,
            handle,
            duration,
            lat,
            lon,
        } => {
            let handle = match (file, handle) {
                (Some(path), _) => store_file(config, &path)?,
                (None, Some(handle)) => PayloadHandle::new(handle)?,
                (None, None) => anyhow::bail!("either --file or --handle is required"),
            };
            let location = match (lat, lon) {
                (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)?),
                _ => None,
            };
            let evidence =
                engine
                    .evidence()
                    .attach(alert_id, kind.into(), handle, location, duration)?;
            println!(
                "Attached {} evidence #{} to alert #{} ({})",
                evidence.kind, evidence.id, evidence.alert_id, evidence.payload_handle
            );
        }
        EvidenceCommand::List { alert_id, json } => {
            let list = engine.evidence().list_for_alert(alert_id)?;
            if json {
                print_json(&list)?;
            } else if list.is_empty() {
                println!("No evidence for alert #{alert_id}.");
            } else {
                for evidence in &list {
                    println!(
                        "#{:<5} {:<5} {}  {}",
                        evidence.id,
                        evidence.kind,
                        evidence.captured_at.format("%Y-%m-%d %H:%M:%S"),
                        evidence.payload_handle
                    );
                }
            }
        }
        EvidenceCommand::Fetch { evidence_id, out } => {
            let evidence = engine.evidence().get(evidence_id)?;
            write_blob(config, &evidence.payload_handle, out.as_deref())?;
        }
    }
    Ok(())
}

fn handle_report(engine: &Engine, config: &Config, cmd: ReportCommand) -> anyhow::Result<()> {
    match cmd {
        ReportCommand::Submit {
            location,
            crime_type,
            description,
            address,
            voice,
        } => {
            let voice_handle = voice
                .map(|path| store_file(config, &path))
                .transpose()?
                .map(|handle| handle.as_str().to_string());
            let report = engine.reports().submit(
                location.coordinate()?,
                ReportDraft {
                    description,
                    voice_handle,
                    address,
                    crime_type,
                },
            )?;
            println!(
                "Filed {} report #{} ({})",
                report.crime_type, report.id, report.anonymous_id
            );
        }
        ReportCommand::List { limit, json } => {
            let list = engine.reports().list(limit)?;
            if json {
                print_json(&list)?;
            } else if list.is_empty() {
                println!("No reports.");
            } else {
                for report in &list {
                    println!(
                        "#{:<5} {:<12} {}  ({}){}",
                        report.id,
                        report.crime_type,
                        report.reported_at.format("%Y-%m-%d %H:%M"),
                        report.location,
                        if report.synced { "  [synced]" } else { "" }
                    );
                }
            }
        }
        ReportCommand::Voice { report_id, out } => {
            let report = engine.reports().get(report_id)?;
            let Some(voice) = report.voice_handle else {
                anyhow::bail!("report #{report_id} has no voice note");
            };
            write_blob(config, &PayloadHandle::new(voice)?, out.as_deref())?;
        }
    }
    Ok(())
}

async fn handle_sync(engine: &Engine, cmd: SyncCommand) -> anyhow::Result<()> {
    let SyncCommand::Apply {
        file,
        subject,
        json,
    } = cmd;

    let raw = if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?
    };
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&raw).context("batch must be a JSON array")?;

    let result = engine.sync().apply_raw_batch(subject, entries).await?;

    if json {
        print_json(&result)?;
    } else {
        println!(
            "Applied {} operation(s), {} failed",
            result.applied_count, result.failed_count
        );
        for error in &result.per_operation_errors {
            println!("  [{}] {}: {}", error.index, error.kind, error.message);
        }
    }
    Ok(())
}

fn handle_stats(engine: &Engine, json: bool) -> anyhow::Result<()> {
    let storage = engine.storage();
    let stats = storage.dashboard_stats()?;
    let crime_types = storage.crime_type_distribution()?;
    let response = storage.response_times()?;
    let zones = storage.zone_effectiveness()?;

    if json {
        return print_json(&serde_json::json!({
            "stats": stats,
            "crimeTypes": crime_types,
            "hourlyTrend": storage.hourly_report_trend()?,
            "monthlyTrend": storage.monthly_report_trend()?,
            "responseTimes": response,
            "zoneEffectiveness": zones,
            "areaDensity": storage.area_density()?,
        }));
    }

    println!("suraksha dashboard");
    println!("------------------");
    println!("Alerts:          {} ({} active)", stats.total_alerts, stats.active_alerts);
    println!("Reports:         {}", stats.total_reports);
    println!("Active zones:    {}", stats.active_zones);
    println!("Evidence items:  {}", stats.total_evidence);
    println!("Avg response:    {} min", response.average_minutes);
    if !crime_types.is_empty() {
        println!();
        println!("[Crime types]");
        for entry in &crime_types {
            println!("  {:<16} {}", entry.crime_type, entry.count);
        }
    }
    if !zones.is_empty() {
        println!();
        println!("[Alerts per zone]");
        for entry in &zones {
            println!("  {:<24} {}", entry.zone_name, entry.alert_count);
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                print_json(config)?;
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Blob directory:     {}", config.blob_dir().display());
                println!();
                println!("[Notification]");
                println!("  Signature:          {}", config.notification.signature);
                println!(
                    "  Recipient pattern:  {}",
                    config.notification.recipient_pattern
                );
                println!("  Max contacts:       {}", config.notification.max_contacts);
                println!();
                println!("[Sync]");
                println!("  Max batch size:     {}", config.sync.max_batch_size);
                println!("  Dedup tokens:       {}", config.sync.dedup_tokens);
                println!("  Claim timeout:      {}s", config.sync.claim_timeout_secs);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
