//! File logging for the chat client.
//!
//! Stdout carries the REPL, so every log line goes to `chat.log` in the data
//! directory. Each start shifts the previous logs down one generation.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

const LOG_NAME: &str = "chat.log";
const GENERATIONS: u32 = 3;

/// Install the global subscriber and return the path of the live log.
///
/// `RUST_LOG` takes precedence over the built-in filter. `verbose` lowers the
/// crate's own level to debug.
pub fn init_tracing(verbose: bool) -> io::Result<PathBuf> {
    let log_dir = crate::data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(LOG_NAME);
    let shifted = shift_generations(&log_path, GENERATIONS)?;
    let file = open_log(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    // `File` writes are unbuffered, so each event reaches disk as it is
    // formatted. The mutex serializes events from different threads.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        log_file = %log_path.display(),
        previous_logs = shifted,
        "lance-chat starting"
    );

    Ok(log_path)
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "lance_chat=debug,info"
    } else {
        "lance_chat=info,warn"
    }
}

fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `chat.log` with generation `n` appended: `chat.log.2`.
fn generation_path(base: &Path, n: u32) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Move `base` to generation 1, 1 to 2, and so on up to `keep`. Whatever sat
/// in generation `keep` is overwritten. Returns how many files moved.
///
/// Gaps in the chain are fine. Any error other than a missing file aborts.
fn shift_generations(base: &Path, keep: u32) -> io::Result<usize> {
    if keep == 0 {
        return Ok(0);
    }

    let mut moved = 0;
    let sources = (1..keep)
        .rev()
        .map(|n| (generation_path(base, n), generation_path(base, n + 1)))
        .chain(std::iter::once((base.to_path_buf(), generation_path(base, 1))));

    for (from, to) in sources {
        match std::fs::rename(&from, &to) {
            Ok(()) => moved += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(moved)
}
