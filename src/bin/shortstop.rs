//! shortstop CLI - query and control the shortstop daemon
//!
//! Talks to `shortstopd` over its Unix socket with the same messages the
//! browser bridge uses.
//!
//! # Usage
//!
//! ```text
//! shortstop today                 # Today's watched/skipped counts
//! shortstop week                  # Seven-day series
//! shortstop export -o stats.json  # Full export document
//! shortstop reset                 # Delete the last seven days
//! shortstop session-time          # Live session watch time
//! shortstop test-notification     # Fire a synthetic intervention
//! shortstop settings --threshold 10 --redirect on
//! shortstop watch                 # Print badge/intervention broadcasts
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use shortstop_core::{
    DayKey, ExportDocument, Settings, SettingsUpdate, SystemClock, TodaySummary, WeeklySeries,
};
use shortstop_protocol::{DaemonMessage, MessageType};
use shortstopd::client::{is_broadcast, DaemonClient};
use shortstopd::config::DaemonConfig;

// ============================================================================
// CLI Arguments
// ============================================================================

/// shortstop - short-form viewing tracker
#[derive(Parser, Debug)]
#[command(name = "shortstop")]
#[command(about = "Query and control the shortstop daemon")]
#[command(version)]
struct Args {
    /// Daemon socket (defaults to the configured socket)
    #[arg(long, short = 's', global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show today's counts and the live session
    Today,
    /// Show the last seven days
    Week,
    /// Write every recorded day to a JSON file
    Export {
        /// Output file (defaults to youtube-shorts-stats-<date>.json)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Print to stdout instead of writing a file
        #[arg(long)]
        stdout: bool,
    },
    /// Delete statistics for the last seven days
    Reset,
    /// Zero the live session counters
    ResetSession,
    /// Show the live session watch time
    SessionTime,
    /// Fire a synthetic intervention through notifications and the popup
    TestNotification,
    /// Show or change redirect settings
    Settings {
        /// Redirect after the session count threshold
        #[arg(long)]
        redirect: Option<Toggle>,
        /// Session item count that triggers a redirect
        #[arg(long)]
        threshold: Option<i64>,
        /// Redirect after three minutes of watch time
        #[arg(long)]
        time_redirect: Option<Toggle>,
        /// Custom redirect destination
        #[arg(long, conflicts_with = "reset_url")]
        url: Option<String>,
        /// Restore the default redirect destination
        #[arg(long)]
        reset_url: bool,
    },
    /// Print badge, intervention and stats broadcasts as they happen
    Watch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> Self {
        matches!(toggle, Toggle::On)
    }
}

// ============================================================================
// Output
// ============================================================================

fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let secs = seconds % 60;
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m {secs:02}s")
    }
}

fn print_today(summary: &TodaySummary) {
    if let Some(day) = summary.day {
        println!("{} ({day})", day.export_label());
    }
    println!("Watched:       {}", summary.watched);
    println!("Skipped:       {}", summary.skipped);
    println!("Watch time:    {}", format_duration(summary.watch_time_seconds));
    println!("Session items: {}", summary.session_item_count);
    println!(
        "Session time:  {}",
        format_duration(summary.session_time_seconds)
    );
}

fn print_weekly(series: &WeeklySeries) {
    let peak = series.watched.iter().copied().max().unwrap_or(0).max(1);
    let rows = series
        .labels
        .iter()
        .zip(&series.watched)
        .zip(&series.skipped)
        .zip(&series.watch_time_seconds);
    for (((label, watched), skipped), seconds) in rows {
        let width = usize::try_from(watched * 30 / peak).unwrap_or(30);
        println!(
            "{label:>6}  {:<30} {watched:>4} watched {skipped:>4} skipped {:>9}",
            "#".repeat(width),
            format_duration(*seconds),
        );
    }

    let busiest = series
        .sessions_by_hour
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by_key(|(_, count)| **count);
    if let Some((hour, count)) = busiest {
        println!("Busiest hour: {hour:02}:00 ({count} sessions)");
    }
}

fn print_settings(settings: &Settings, rejected: &[String]) {
    let on_off = |enabled: bool| if enabled { "on" } else { "off" };
    println!("Redirect:      {}", on_off(settings.redirect_enabled));
    println!("Threshold:     {}", settings.redirect_threshold);
    println!(
        "Time redirect: {}",
        on_off(settings.time_based_redirect_enabled)
    );
    println!("Redirect URL:  {}", settings.redirect_url());
    if let Some(day) = settings.last_active_date {
        println!("Last active:   {day}");
    }
    for reason in rejected {
        eprintln!("Not applied: {reason}");
    }
}

fn print_broadcast(msg: &DaemonMessage) -> Result<()> {
    println!("{}", serde_json::to_string(msg)?);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn unexpected(reply: DaemonMessage) -> anyhow::Error {
    anyhow::anyhow!("unexpected reply from daemon: {reply:?}")
}

async fn export(client: &mut DaemonClient, output: Option<PathBuf>, stdout: bool) -> Result<()> {
    let document = match client.request(MessageType::ExportStats).await? {
        DaemonMessage::Export { document } => document,
        other => return Err(unexpected(other)),
    };
    let json = serde_json::to_string_pretty(&document)?;

    if stdout {
        println!("{json}");
        return Ok(());
    }

    let path = output.unwrap_or_else(|| {
        PathBuf::from(ExportDocument::file_name(DayKey::today(&SystemClock)))
    });
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "Exported {} days to {}",
        document.metadata.total_days,
        path.display()
    );
    Ok(())
}

async fn watch(client: &mut DaemonClient) -> Result<()> {
    match client.request(MessageType::Subscribe).await? {
        DaemonMessage::Today { summary } => print_today(&summary),
        other => return Err(unexpected(other)),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, leaving watch");
                return Ok(());
            }
            result = client.next_message() => {
                let msg = match result {
                    Ok(msg) => msg,
                    // Idle waits are normal while watching
                    Err(shortstopd::client::ClientError::Timeout) => continue,
                    Err(e) => return Err(e.into()),
                };
                if is_broadcast(&msg) {
                    print_broadcast(&msg)?;
                }
            }
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let socket = match args.socket {
        Some(path) => path,
        None => DaemonConfig::load()?.socket_path,
    };
    debug!(socket = %socket.display(), "Connecting to daemon");

    let mut client = DaemonClient::connect(&socket, None)
        .await
        .context("Is shortstopd running? Start it with 'shortstopd start -d'")?;

    match args.command {
        Command::Today => match client.request(MessageType::GetToday).await? {
            DaemonMessage::Today { summary } => print_today(&summary),
            other => return Err(unexpected(other)),
        },
        Command::Week => match client.request(MessageType::GetWeekly).await? {
            DaemonMessage::Weekly { series } => print_weekly(&series),
            other => return Err(unexpected(other)),
        },
        Command::Export { output, stdout } => export(&mut client, output, stdout).await?,
        Command::Reset => match client.request(MessageType::ResetRecentStats).await? {
            DaemonMessage::Reset { removed } => {
                println!("Deleted {removed} entries from the last seven days.");
            }
            other => return Err(unexpected(other)),
        },
        Command::ResetSession => match client.request(MessageType::ResetCurrentSession).await? {
            DaemonMessage::Ack => println!("Session counters cleared."),
            other => return Err(unexpected(other)),
        },
        Command::SessionTime => match client.request(MessageType::GetSessionTime).await? {
            DaemonMessage::SessionTime { session_time } => {
                println!("{}", format_duration(session_time));
            }
            other => return Err(unexpected(other)),
        },
        Command::TestNotification => {
            match client.request(MessageType::TestNotification).await? {
                DaemonMessage::Ack => println!("Test notification sent."),
                other => return Err(unexpected(other)),
            }
        }
        Command::Settings {
            redirect,
            threshold,
            time_redirect,
            url,
            reset_url,
        } => {
            let update = SettingsUpdate {
                redirect_enabled: redirect.map(bool::from),
                redirect_threshold: threshold,
                time_based_redirect_enabled: time_redirect.map(bool::from),
                custom_redirect_url: url,
                reset_url,
            };
            let request = if update.is_empty() {
                MessageType::GetSettings
            } else {
                MessageType::UpdateSettings { update }
            };
            match client.request(request).await? {
                DaemonMessage::Settings { settings, rejected } => {
                    print_settings(&settings, &rejected);
                    if !rejected.is_empty() {
                        bail!("{} setting(s) were not applied", rejected.len());
                    }
                }
                other => return Err(unexpected(other)),
            }
        }
        Command::Watch => watch(&mut client).await?,
    }

    // Best effort; the daemon also cleans up on EOF
    let _ = client.disconnect().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m 00s");
        assert_eq!(format_duration(185), "3m 05s");
        assert_eq!(format_duration(3_660), "1h 01m");
    }

    #[test]
    fn test_toggle_into_bool() {
        assert!(bool::from(Toggle::On));
        assert!(!bool::from(Toggle::Off));
    }

    #[test]
    fn test_args_parse_settings() {
        let args = Args::try_parse_from([
            "shortstop",
            "settings",
            "--redirect",
            "on",
            "--threshold",
            "12",
        ])
        .unwrap();
        match args.command {
            Command::Settings {
                redirect,
                threshold,
                ..
            } => {
                assert!(matches!(redirect, Some(Toggle::On)));
                assert_eq!(threshold, Some(12));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_url_conflicts_with_reset_url() {
        let result = Args::try_parse_from([
            "shortstop",
            "settings",
            "--url",
            "https://example.com",
            "--reset-url",
        ]);
        assert!(result.is_err());
    }
}
