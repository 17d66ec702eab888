//! Line-oriented operator console on stdin.
//!
//! One command per line; multi-field arguments are separated by `|` so names
//! may contain spaces, e.g. `commit 5|Ana Maria|ana@example.com|Staff`.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::warn;

use verifynger_core::{ControllerEvent, ControllerHandle, EnrollmentForm};
use verifynger_shared::constants::DEFAULT_LOG_LIMIT;
use verifynger_shared::{Mode, Sensor};
use verifynger_store::{AttendanceLogEntry, BrokerSettings, LogDateFilter};

pub const HELP: &str = "\
commands:
  connect [HOST|PORT]          connect (defaults to the configured broker)
  disconnect
  mode presensi|daftar         ask the node to switch mode
  sensor [next|FPM10A|AS608|ZW101|0|1|2]
  enroll NAME[|EMAIL|POSITION] start a scan
  commit ID[|NAME|EMAIL|POSITION]  blank fields default to the enroll form
  abandon
  users                        list enrolled users
  user ID                      look up an id
  edit ID|NAME[|EMAIL|POSITION]
  delete ID
  logs [KEYWORD]               newest first
  logs-date [YYYY][-MM][-DD]   e.g. 2024-03 or --15
  clear-logs
  unlock [MILLIS]
  lock
  metrics
  status
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect(Option<(String, String)>),
    Disconnect,
    Mode(Mode),
    SensorNext,
    Sensor(Sensor),
    Enroll(EnrollmentForm),
    Commit {
        id: i64,
        name: String,
        email: Option<String>,
        position: Option<String>,
    },
    Abandon,
    Users,
    User(i64),
    Edit {
        id: i64,
        name: String,
        email: Option<String>,
        position: Option<String>,
    },
    Delete(i64),
    Logs(Option<String>),
    LogsByDate(LogDateFilter),
    ClearLogs,
    Unlock(Option<u64>),
    Lock,
    Metrics,
    Status,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "connect" => {
            if rest.is_empty() {
                ConsoleCommand::Connect(None)
            } else {
                let fields = split_fields(rest);
                let host = fields.first().cloned().unwrap_or_default();
                let port = fields.get(1).cloned().ok_or("usage: connect HOST|PORT")?;
                ConsoleCommand::Connect(Some((host, port)))
            }
        }
        "disconnect" => ConsoleCommand::Disconnect,
        "mode" => ConsoleCommand::Mode(rest.parse::<Mode>().map_err(|e| e.to_string())?),
        "sensor" => match rest {
            "" | "next" => ConsoleCommand::SensorNext,
            name => match name.parse::<u8>() {
                Ok(index) => ConsoleCommand::Sensor(
                    Sensor::from_index(index).ok_or(format!("no sensor at index {index}"))?,
                ),
                Err(_) => ConsoleCommand::Sensor(name.parse::<Sensor>().map_err(|e| e.to_string())?),
            },
        },
        "enroll" => {
            let fields = split_fields(rest);
            ConsoleCommand::Enroll(EnrollmentForm {
                name: fields.first().cloned().unwrap_or_default(),
                email: optional(&fields, 1),
                position: optional(&fields, 2),
            })
        }
        "commit" | "edit" => {
            let fields = split_fields(rest);
            let id = parse_id(fields.first().map(String::as_str).unwrap_or(""))?;
            let name = fields.get(1).cloned().unwrap_or_default();
            let (email, position) = (optional(&fields, 2), optional(&fields, 3));
            if word.eq_ignore_ascii_case("commit") {
                ConsoleCommand::Commit {
                    id,
                    name,
                    email,
                    position,
                }
            } else {
                ConsoleCommand::Edit {
                    id,
                    name,
                    email,
                    position,
                }
            }
        }
        "abandon" => ConsoleCommand::Abandon,
        "users" => ConsoleCommand::Users,
        "user" => ConsoleCommand::User(parse_id(rest)?),
        "delete" => ConsoleCommand::Delete(parse_id(rest)?),
        "logs" => ConsoleCommand::Logs(Some(rest.to_string()).filter(|k| !k.is_empty())),
        "logs-date" => ConsoleCommand::LogsByDate(parse_date_filter(rest)?),
        "clear-logs" => ConsoleCommand::ClearLogs,
        "unlock" => {
            if rest.is_empty() {
                ConsoleCommand::Unlock(None)
            } else {
                let ms = rest
                    .parse::<u64>()
                    .map_err(|_| format!("not a duration in ms: {rest}"))?;
                ConsoleCommand::Unlock(Some(ms))
            }
        }
        "lock" => ConsoleCommand::Lock,
        "metrics" => ConsoleCommand::Metrics,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        "" => return Err("empty command".to_string()),
        other => return Err(format!("unknown command: {other} (try help)")),
    };
    Ok(cmd)
}

fn split_fields(rest: &str) -> Vec<String> {
    rest.split('|').map(|f| f.trim().to_string()).collect()
}

fn optional(fields: &[String], idx: usize) -> Option<String> {
    fields.get(idx).filter(|f| !f.is_empty()).cloned()
}

fn parse_id(raw: &str) -> Result<i64, String> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| format!("not a user id: {raw:?}"))
}

/// `YYYY`, `YYYY-MM`, `YYYY-MM-DD`; empty components are wildcards
/// (`-03` is every March, `--15` every 15th).
fn parse_date_filter(raw: &str) -> Result<LogDateFilter, String> {
    let mut parts = raw.trim().splitn(3, '-');
    let mut next = || parts.next().map(str::trim).filter(|p| !p.is_empty());
    let bad = || format!("bad date filter: {raw:?}");

    let year = next().map(|y| y.parse::<i32>()).transpose().map_err(|_| bad())?;
    let month = next().map(|m| m.parse::<u32>()).transpose().map_err(|_| bad())?;
    let day = next().map(|d| d.parse::<u32>()).transpose().map_err(|_| bad())?;

    if month.is_some_and(|m| !(1..=12).contains(&m)) || day.is_some_and(|d| !(1..=31).contains(&d)) {
        return Err(bad());
    }
    Ok(LogDateFilter { year, month, day })
}

/// Run one command, printing its result or error.
pub async fn execute(handle: &ControllerHandle, cmd: ConsoleCommand, default_broker: &BrokerSettings) {
    let outcome: verifynger_core::Result<()> = async {
        match cmd {
            ConsoleCommand::Connect(target) => {
                let (host, port) = target.unwrap_or_else(|| {
                    (default_broker.host.clone(), default_broker.port.to_string())
                });
                println!("connecting to {host}:{port} ...");
                handle.connect(host, port).await?;
            }
            ConsoleCommand::Disconnect => handle.disconnect().await?,
            ConsoleCommand::Mode(mode) => {
                if handle.request_mode_change(mode).await? {
                    println!("mode {mode} requested, waiting for the node");
                } else {
                    println!("already in {mode}");
                }
            }
            ConsoleCommand::SensorNext => {
                let sensor = handle.cycle_sensor().await?;
                println!("switching to {sensor}");
            }
            ConsoleCommand::Sensor(sensor) => {
                handle.select_sensor(sensor).await?;
                println!("switching to {sensor}");
            }
            ConsoleCommand::Enroll(form) => {
                handle.start_enrollment(form).await?;
                println!("place the finger on the sensor");
            }
            ConsoleCommand::Commit {
                id,
                name,
                email,
                position,
            } => {
                let (name, email, position) =
                    fill_from_form(name, email, position, handle.enrollment_form().await?);
                let user = handle.commit_enrollment(id, name, email, position).await?;
                println!("saved {} (id {}) with {}", user.name, user.id_user, user.fingerprint_hash);
            }
            ConsoleCommand::Abandon => handle.abandon_enrollment().await?,
            ConsoleCommand::Users => {
                for u in handle.list_users().await? {
                    println!(
                        "{:>3}  {:<24} {:<12} {}",
                        u.id_user,
                        u.name,
                        u.fingerprint_hash,
                        u.position.unwrap_or_default()
                    );
                }
            }
            ConsoleCommand::User(id) => match handle.lookup_user_id(id).await? {
                Some(u) => println!("id {id} belongs to {}", u.name),
                None => println!("id {id} is free"),
            },
            ConsoleCommand::Edit {
                id,
                name,
                email,
                position,
            } => {
                let user = handle.edit_user(id, name, email, position).await?;
                println!("updated {} (id {})", user.name, user.id_user);
            }
            ConsoleCommand::Delete(id) => {
                handle.delete_user(id).await?;
                println!("deleted user {id} and their logs");
            }
            ConsoleCommand::Logs(keyword) => {
                let logs = match keyword {
                    Some(k) => handle.search_logs(k, DEFAULT_LOG_LIMIT).await?,
                    None => handle.recent_logs(DEFAULT_LOG_LIMIT).await?,
                };
                print_logs(&logs);
            }
            ConsoleCommand::LogsByDate(filter) => {
                print_logs(&handle.logs_by_date(filter, DEFAULT_LOG_LIMIT).await?);
            }
            ConsoleCommand::ClearLogs => {
                let removed = handle.clear_logs().await?;
                println!("removed {removed} log rows");
            }
            ConsoleCommand::Unlock(ms) => handle.unlock_door(ms).await?,
            ConsoleCommand::Lock => handle.lock_door().await?,
            ConsoleCommand::Metrics => {
                for m in handle.metrics().await? {
                    println!(
                        "{:<7} used {:>3}/{:<3} ({:>5.1}%)  ok {:>4}  fail {:>4}  conf {:>5.1}  resp {}",
                        m.sensor,
                        m.used,
                        m.capacity,
                        m.usage_percent,
                        m.success_count,
                        m.fail_count,
                        m.avg_confidence,
                        m.avg_response_time
                            .map(|t| format!("{t:.0} ms"))
                            .unwrap_or_else(|| "n/a".to_string()),
                    );
                }
            }
            ConsoleCommand::Status => {
                let s = handle.status().await?;
                let (state, hash) = handle.enrollment_state().await?;
                println!(
                    "connected: {}  mode: {}  sensor: {}{}  enrollment: {:?}{}",
                    s.connected,
                    s.mode,
                    s.active_sensor,
                    if s.sensor_confirmed { "" } else { " (unconfirmed)" },
                    state,
                    hash.map(|h| format!(" [{h}]")).unwrap_or_default(),
                );
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }
    .await;

    if let Err(e) = outcome {
        println!("error: {e}");
    }
}

fn print_logs(logs: &[AttendanceLogEntry]) {
    if logs.is_empty() {
        println!("no attendance logs");
    }
    for l in logs {
        println!(
            "{:>5}  {}  {:>3}  {:<24} {}",
            l.log_id,
            l.check_in_time,
            l.user_id,
            l.user_name,
            l.match_score.map(|s| s.to_string()).unwrap_or_default()
        );
    }
}

/// Read commands from stdin until EOF or `quit`.
pub async fn run(handle: ControllerHandle, default_broker: BrokerSettings) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Ok(ConsoleCommand::Quit) => break,
            Ok(cmd) => execute(&handle, cmd, &default_broker).await,
            Err(msg) => println!("{msg}"),
        }
    }
}

/// Print controller notifications as they happen.
pub async fn print_events(mut events: broadcast::Receiver<ControllerEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Console fell behind on events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &ControllerEvent) {
    match event {
        ControllerEvent::ConnectionChanged {
            connected: true,
            broker,
            port,
            ..
        } => println!(
            "* connected to {}:{}",
            broker.as_deref().unwrap_or("?"),
            port.map(|p| p.to_string()).unwrap_or_default()
        ),
        ControllerEvent::ConnectionChanged { reason, .. } => {
            println!("* disconnected ({})", reason.as_deref().unwrap_or("unknown"))
        }
        ControllerEvent::ConnectionFailed { reason } => println!("* connection failed: {reason}"),
        ControllerEvent::ModeChanged { mode } => println!("* mode is now {mode}"),
        ControllerEvent::SensorChanged {
            sensor,
            confirmed: true,
        } => println!("* active sensor {sensor}"),
        ControllerEvent::EnrollmentChanged {
            state,
            fingerprint_hash,
        } => match fingerprint_hash {
            Some(h) => println!("* enrollment {state:?}: {h}, ready to commit"),
            None => println!("* enrollment {state:?}"),
        },
        ControllerEvent::AttendanceRecorded { entry, sensor } => println!(
            "* check-in {} (id {}) score {} on {sensor}",
            entry.user_name,
            entry.user_id,
            entry.match_score.unwrap_or_default()
        ),
        ControllerEvent::VerificationFailed {
            fingerprint_hash,
            sensor,
        } => println!("* unknown fingerprint {fingerprint_hash} on {sensor}"),
        ControllerEvent::PeerError {
            code,
            name,
            message,
        } => println!(
            "* node error {} {}: {message}",
            code.map(|c| c.to_string()).unwrap_or_default(),
            name.unwrap_or("")
        ),
        ControllerEvent::Health { report, uptime } => println!(
            "* node {} on {}, rssi {} dBm, relay {}, up {uptime}",
            report.state,
            report.sensor,
            report.wifi_rssi,
            report.relay_display()
        ),
        ControllerEvent::Warning { message } => println!("! {message}"),
        // Frequent or internal: available as JSON at trace level.
        other => {
            if let Ok(json) = serde_json::to_string(other) {
                tracing::trace!(event = %json, "Controller event");
            }
        }
    }
}

/// Fields left blank at commit fall back to what was typed at `enroll`.
fn fill_from_form(
    name: String,
    email: Option<String>,
    position: Option<String>,
    form: Option<EnrollmentForm>,
) -> (String, Option<String>, Option<String>) {
    let Some(form) = form else {
        return (name, email, position);
    };
    let name = if name.trim().is_empty() { form.name } else { name };
    (name, email.or(form.email), position.or(form.position))
}
