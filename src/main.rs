//! wardwatch - vitals schedule monitoring for hospital wards
//!
//! ## Usage
//!
//! ```bash
//! # Register a ward and an admission, then schedule vitals every 4 hours
//! wardwatch ward add 1 "Ward A"
//! wardwatch admit 10 --ward 1 --bed A-1 --patient "Ada Lovelace"
//! wardwatch schedule set 10 240 --staff 7
//!
//! # Run the escalation clock until Ctrl-C
//! wardwatch serve
//!
//! # Watch a ward and ring the terminal bell on new alerts
//! wardwatch watch --ward 1
//!
//! # Record vitals, which completes the open alert
//! wardwatch record 10
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use wardwatch_alerts::{
    AlertFeed, AlertLifecycleManager, EscalationClock, FeedScope, FeedSnapshot,
    LifecycleSettings, RecordingOutcome,
};
use wardwatch_core::due::format_interval;
use wardwatch_core::{
    AdmissionId, AlertId, AlertStatus, LogGuard, ScheduleId, StaffId, WardError, WardId,
    WardwatchConfig, init_logging,
};
use wardwatch_notify::{
    AlertPreferences, DisplaySettings, LocalFeedSource, Notification, NotificationDispatcher,
    PreferenceStore, SoundType, TerminalBell, run_poller,
};
use wardwatch_store::VitalsDatabase;

/// Vitals schedule monitoring and alert escalation
#[derive(Parser, Debug)]
#[command(name = "wardwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to ~/.wardwatch/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory for log files (defaults to ~/.wardwatch/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage wards
    #[command(subcommand)]
    Ward(WardCommand),

    /// Register an admitted patient
    Admit {
        admission_id: AdmissionId,
        #[arg(long)]
        ward: WardId,
        #[arg(long)]
        bed: String,
        #[arg(long, default_value = "")]
        patient: String,
    },

    /// Move an admission to another ward or bed
    Transfer {
        admission_id: AdmissionId,
        #[arg(long)]
        ward: WardId,
        #[arg(long)]
        bed: String,
    },

    /// Discharge an admission and stop its monitoring
    Discharge { admission_id: AdmissionId },

    /// Manage vitals schedules
    #[command(subcommand)]
    Schedule(ScheduleCommand),

    /// Record a vitals observation for an admission
    Record {
        admission_id: AdmissionId,
        /// Observation time (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Acknowledge an alert (it stays open until vitals are recorded)
    Ack {
        alert_id: AlertId,
        #[arg(long)]
        staff: StaffId,
    },

    /// Dismiss an alert without a recording
    Dismiss {
        alert_id: AlertId,
        #[arg(long)]
        staff: StaffId,
    },

    /// Show every alert raised for a schedule
    History { schedule_id: ScheduleId },

    /// Show the ranked alert feed
    Feed {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one escalation tick and exit
    Tick,

    /// Run the escalation clock until Ctrl-C
    Serve,

    /// Poll the feed and notify on new alerts until Ctrl-C
    Watch {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Local alert sound preferences
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

#[derive(Subcommand, Debug)]
enum WardCommand {
    /// Register or rename a ward
    Add { ward_id: WardId, name: String },
    /// List wards
    List,
}

#[derive(Subcommand, Debug)]
enum ScheduleCommand {
    /// Create a schedule or change its interval
    Set {
        admission_id: AdmissionId,
        interval_minutes: i64,
        #[arg(long)]
        staff: StaffId,
    },
    /// Deactivate a schedule
    Cancel { schedule_id: ScheduleId },
    /// Show an admission's schedule and whether vitals are due
    Show { admission_id: AdmissionId },
}

#[derive(Subcommand, Debug)]
enum PrefsCommand {
    /// Show current preferences
    Show,
    /// Change preferences
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        volume: Option<f32>,
        #[arg(long)]
        sound: Option<SoundType>,
    },
    /// Play the preferred sound once
    Test,
}

#[derive(Args, Debug, Clone, Copy)]
#[group(multiple = false)]
struct ScopeArgs {
    /// Only alerts on this ward
    #[arg(long)]
    ward: Option<WardId>,
    /// Only alerts for this admission
    #[arg(long)]
    admission: Option<AdmissionId>,
}

impl ScopeArgs {
    fn scope(&self) -> FeedScope {
        match (self.ward, self.admission) {
            (Some(ward_id), _) => FeedScope::Ward(ward_id),
            (None, Some(admission_id)) => FeedScope::Admission(admission_id),
            (None, None) => FeedScope::All,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}

/// Map a failure to an exit code, printing guidance for rejected requests.
fn report_error(e: &anyhow::Error) -> ExitCode {
    match e.downcast_ref::<WardError>() {
        Some(ward) if ward.is_benign() => {
            info!(error = %ward, "Nothing to do");
            println!("Nothing changed: {ward}");
            ExitCode::SUCCESS
        }
        Some(ward) if ward.is_rejection() => {
            eprintln!("Rejected: {ward}");
            if let Some(hint) = ward.guidance() {
                eprintln!("  {hint}");
            }
            ExitCode::from(2)
        }
        _ => {
            error!("wardwatch error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> wardwatch_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

fn load_config(cli: &Cli) -> anyhow::Result<WardwatchConfig> {
    let mut config = match &cli.config {
        Some(path) => WardwatchConfig::load_from(path)?,
        None => WardwatchConfig::load()?,
    };
    if let Some(db) = &cli.db {
        config.database_path = Some(db.clone());
    }
    Ok(config)
}

struct Services {
    config: WardwatchConfig,
    lifecycle: AlertLifecycleManager,
    feed: AlertFeed,
}

impl Services {
    fn open(config: WardwatchConfig) -> anyhow::Result<Self> {
        let settings = LifecycleSettings::from_config(&config)?;
        let path = config.database_path()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let db = VitalsDatabase::open(&path).map_err(WardError::from)?;
        info!(path = %path.display(), "Opened vitals database");

        Ok(Self {
            feed: AlertFeed::new(db.clone(), settings.grace_period),
            lifecycle: AlertLifecycleManager::new(db, settings),
            config,
        })
    }

    fn clock(&self) -> EscalationClock {
        EscalationClock::with_interval(
            self.lifecycle.clone(),
            self.config.escalation.tick_interval(),
        )
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    if let Command::Prefs(command) = &cli.command {
        return run_prefs(&config, command);
    }

    let services = Services::open(config)?;
    let lifecycle = &services.lifecycle;
    let now = Utc::now();

    match cli.command {
        Command::Ward(WardCommand::Add { ward_id, name }) => {
            let ward = lifecycle.register_ward(ward_id, &name, now)?;
            println!("Ward {} registered: {}", ward.id, ward.name);
        }
        Command::Ward(WardCommand::List) => {
            for ward in lifecycle.database().list_wards().map_err(WardError::from)? {
                println!("{:>6}  {}", ward.id, ward.name);
            }
        }
        Command::Admit {
            admission_id,
            ward,
            bed,
            patient,
        } => {
            let admission = lifecycle.register_admission(admission_id, ward, &bed, &patient, now)?;
            println!(
                "Admission {} on ward {}, bed {} ({})",
                admission.id, admission.ward_id, admission.bed_label, admission.status
            );
        }
        Command::Transfer {
            admission_id,
            ward,
            bed,
        } => {
            let admission = lifecycle.transfer_admission(admission_id, ward, &bed, now)?;
            println!(
                "Admission {} moved to ward {}, bed {}",
                admission.id, admission.ward_id, admission.bed_label
            );
        }
        Command::Discharge { admission_id } => {
            let dismissal = lifecycle.discharge_admission(admission_id, now)?;
            println!(
                "Admission {} discharged ({} schedule(s) stopped, {} alert(s) dismissed)",
                admission_id,
                dismissal.deactivated_schedules.len(),
                dismissal.dismissed_alerts.len()
            );
        }
        Command::Schedule(ScheduleCommand::Set {
            admission_id,
            interval_minutes,
            staff,
        }) => {
            let schedule = lifecycle.set_schedule(admission_id, interval_minutes, staff, now)?;
            println!(
                "Schedule {}: vitals {}, next due {}",
                schedule.id,
                format_interval(schedule.interval_minutes),
                schedule.next_due_at.to_rfc3339()
            );
        }
        Command::Schedule(ScheduleCommand::Cancel { schedule_id }) => {
            let dismissed = lifecycle.deactivate_schedule(schedule_id, now)?;
            println!(
                "Schedule {} inactive ({} alert(s) dismissed)",
                schedule_id,
                dismissed.len()
            );
        }
        Command::Schedule(ScheduleCommand::Show { admission_id }) => {
            match lifecycle.schedule_status(admission_id, now)? {
                Some((schedule, status)) => {
                    println!(
                        "Schedule {}: vitals {}",
                        schedule.id,
                        format_interval(schedule.interval_minutes)
                    );
                    println!("  next due {} ({})", status.next_due_at.to_rfc3339(), status.state);
                    if let Some(recorded) = schedule.last_recorded_at {
                        println!("  last recorded {}", recorded.to_rfc3339());
                    }
                }
                None => println!("Admission {admission_id} has no active vitals schedule"),
            }
        }
        Command::Record { admission_id, at } => {
            let recorded_at = at.unwrap_or(now);
            match lifecycle.resolve_by_recording(admission_id, recorded_at, now)? {
                RecordingOutcome::Resolved {
                    schedule,
                    completed_alert,
                } => {
                    if let Some(alert_id) = completed_alert {
                        println!("Alert {alert_id} completed");
                    }
                    println!("Next vitals due {}", schedule.next_due_at.to_rfc3339());
                }
                RecordingOutcome::Stale { schedule } => {
                    println!(
                        "Recording at {} predates the current cycle (started {}); next vitals still due {}",
                        recorded_at.to_rfc3339(),
                        schedule.anchored_at.to_rfc3339(),
                        schedule.next_due_at.to_rfc3339()
                    );
                }
                RecordingOutcome::NoSchedule => {
                    println!("Recorded; admission {admission_id} has no active schedule");
                }
            }
        }
        Command::Ack { alert_id, staff } => {
            let alert = lifecycle.acknowledge(alert_id, staff, now)?;
            println!("Alert {} acknowledged ({})", alert.id, alert.status);
        }
        Command::Dismiss { alert_id, staff } => {
            let alert = lifecycle.dismiss(alert_id, staff, now)?;
            println!("Alert {} dismissed", alert.id);
        }
        Command::History { schedule_id } => {
            for alert in lifecycle.alert_history(schedule_id)? {
                println!(
                    "{:>6}  {:<9}  due {}  notified {}x",
                    alert.id,
                    alert.status.as_str(),
                    alert.due_at.to_rfc3339(),
                    alert.notify_count
                );
            }
        }
        Command::Feed { scope, json } => {
            let snapshot = services.feed.query(scope.scope(), now)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
        }
        Command::Tick => {
            let report = services.clock().tick(now)?;
            println!(
                "created {}, advanced {}, renotified {} ({} conflicts, {} failures)",
                report.created,
                report.advanced,
                report.renotified,
                report.conflicts,
                report.failures
            );
        }
        Command::Serve => serve(&services)?,
        Command::Watch { scope } => watch_feed(&services, scope.scope())?,
        Command::Prefs(_) => {}
    }

    Ok(())
}

/// Watch channel flipped to `true` on Ctrl-C.
async fn ctrl_c_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        let _ = tx.send(true);
    });
    rx
}

fn serve(services: &Services) -> anyhow::Result<()> {
    let clock = services.clock();
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(async move {
        let shutdown = ctrl_c_shutdown().await;
        println!(
            "Escalation clock running every {}s, Ctrl-C to stop",
            clock.interval().as_secs()
        );
        clock.start(shutdown).await.context("escalation clock task")??;
        Ok::<(), anyhow::Error>(())
    })
}

fn watch_feed(services: &Services, scope: FeedScope) -> anyhow::Result<()> {
    let prefs_path = services.config.preferences_path()?;
    let preferences = PreferenceStore::new(prefs_path).load();
    let mut dispatcher = NotificationDispatcher::new(
        TerminalBell::stdout(),
        preferences,
        DisplaySettings::from_config(&services.config.client),
    );
    let source = LocalFeedSource::new(services.feed.clone());
    let interval = services.config.client.poll_interval();

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let stats = runtime.block_on(async {
        let shutdown = ctrl_c_shutdown().await;
        println!("Watching {scope}, Ctrl-C to stop");
        run_poller(&source, scope, &mut dispatcher, interval, shutdown, print_notification)
            .await
    })?;

    println!(
        "{} poll(s), {} notification(s), {} failed poll(s)",
        stats.polls, stats.notifications, stats.failures
    );
    Ok(())
}

fn run_prefs(config: &WardwatchConfig, command: &PrefsCommand) -> anyhow::Result<()> {
    let store = PreferenceStore::new(config.preferences_path()?);
    match command {
        PrefsCommand::Show => print_preferences(&store.load()),
        PrefsCommand::Set {
            enabled,
            volume,
            sound,
        } => {
            let prefs = store.update(|prefs| {
                if let Some(enabled) = enabled {
                    prefs.enabled = *enabled;
                }
                if let Some(volume) = volume {
                    *prefs = prefs.with_volume(*volume);
                }
                if let Some(sound) = sound {
                    prefs.sound_type = *sound;
                }
            })?;
            print_preferences(&prefs);
        }
        PrefsCommand::Test => {
            let mut dispatcher = NotificationDispatcher::new(
                TerminalBell::stdout(),
                store.load(),
                DisplaySettings::from_config(&config.client),
            );
            match dispatcher.preview() {
                Ok(()) => println!("Played {} sound", dispatcher.preferences().sound_type),
                Err(e) => println!("Sound unavailable: {e}"),
            }
        }
    }
    Ok(())
}

fn print_preferences(prefs: &AlertPreferences) {
    println!("enabled: {}", prefs.enabled);
    println!("volume:  {:.2}", prefs.volume);
    println!("sound:   {}", prefs.sound_type);
}

fn print_notification(notification: &Notification) {
    println!(
        "[{}] {}",
        notification.shown_at.format("%H:%M:%S"),
        notification.message()
    );
}

fn print_snapshot(snapshot: &FeedSnapshot) {
    println!("{}: {}", snapshot.scope, snapshot.summary.format_header());
    for entry in &snapshot.entries {
        let label = match entry.status {
            AlertStatus::Overdue => "OVERDUE",
            AlertStatus::Due => "DUE",
            _ => "upcoming",
        };
        let overdue = entry
            .minutes_overdue
            .map(|m| format!(" ({m} min overdue)"))
            .unwrap_or_default();
        let ack = if entry.acknowledged { " [ack]" } else { "" };
        println!(
            "  #{:<5} {:<8} {:<20} {:<10} {:<12} due {}{}{}",
            entry.alert_id,
            label,
            entry.patient_name,
            entry.bed_label,
            entry.ward_name,
            entry.due_at.format("%H:%M"),
            overdue,
            ack
        );
    }
}
