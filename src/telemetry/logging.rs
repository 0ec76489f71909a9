use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

static INITIALIZED: OnceLock<()> = OnceLock::new();

const LOG_FILE: &str = "game.log";
const HEADER_LINE: &str = "-------------------------------------------------------------------------------";
const HEADER_TITLE: &str = "Tibia - Graphical Multi-User-Dungeon";

const WEEKDAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Opens `<root>/log/game.log` and routes every tracing event there.
/// `RUST_LOG` takes precedence over `level`.
pub fn init(root: &Path, level: &str) -> Result<(), String> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }
    let log_dir = root.join("log");
    std::fs::create_dir_all(&log_dir)
        .map_err(|err| format!("log directory create failed: {}", err))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))
        .map_err(|err| format!("open log {} failed: {}", LOG_FILE, err))?;
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        write_header(&mut file, LOG_FILE, unix_timestamp())?;
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|err| format!("invalid log level '{}': {}", level, err))?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .map_err(|err| format!("log system init failed: {}", err))?;
    let _ = INITIALIZED.set(());
    Ok(())
}

pub fn log_game(message: &str) {
    tracing::info!(target: "game", "{message}");
}

pub fn log_error(message: &str) {
    tracing::error!(target: "error", "{message}");
}

pub fn log_lag(message: &str) {
    tracing::warn!(target: "lag", "{message}");
}

fn write_header(file: &mut File, name: &str, timestamp: i64) -> Result<(), String> {
    let started = format_header_timestamp(timestamp);
    writeln!(file, "{HEADER_LINE}\n{HEADER_TITLE}\n{name} - gestartet {started}")
        .map_err(|err| format!("header write failed: {}", err))
}

fn format_header_timestamp(ts: i64) -> String {
    let secs = ts.max(0);
    let days = secs / 86_400;
    let seconds_of_day = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    let weekday = WEEKDAYS[(days % 7) as usize];
    let month_name = MONTHS[(month as usize).saturating_sub(1).min(11)];
    format!(
        "{weekday} {month_name} {:>2} {:02}:{:02}:{:02} {}",
        day,
        seconds_of_day / 3_600,
        (seconds_of_day % 3_600) / 60,
        seconds_of_day % 60,
        year
    )
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = (yoe + era * 400 + i64::from(month <= 2)) as i32;
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_timestamp_uses_the_server_layout() {
        assert_eq!(format_header_timestamp(0), "Thu Jan  1 00:00:00 1970");
        assert_eq!(format_header_timestamp(951_782_400), "Tue Feb 29 00:00:00 2000");
    }

    #[test]
    fn header_names_the_log_file() {
        let dir = std::env::temp_dir().join(format!("tibia-core-log-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("header.log");
        let mut file = File::create(&path).expect("create");
        write_header(&mut file, "header.log", 0).expect("header");
        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![HEADER_LINE, HEADER_TITLE, "header.log - gestartet Thu Jan  1 00:00:00 1970"]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
