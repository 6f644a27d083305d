use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const LOG_PREFIX: &str = "server_aggregator_";

pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<()> {
    fs::create_dir_all(log_dir).with_context(|| format!("cannot create log directory {}", log_dir.display()))?;

    // The previous run's log is kept next to the new one.
    let pruned = prune_previous_logs(log_dir, 1)?;

    let log_file_name = format!("{LOG_PREFIX}{}.log", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    for (path, removed) in pruned {
        match removed {
            Ok(()) => log::debug!("Removed old log {}", path.display()),
            Err(e) => log::warn!("Could not remove old log {}: {}", path.display(), e),
        }
    }
    log::info!("Logging to {}", log_path.display());
    Ok(())
}

fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}

/// Removes this server's logs in `log_dir` except the `keep` most recent and
/// reports each removal. File names carry a sortable timestamp.
fn prune_previous_logs(log_dir: &Path, keep: usize) -> Result<Vec<(PathBuf, io::Result<()>)>> {
    let mut logs: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_server_log(path))
        .collect();
    logs.sort_unstable();
    let stale = logs.len().saturating_sub(keep);

    Ok(logs
        .into_iter()
        .take(stale)
        .map(|path| {
            let removed = fs::remove_file(&path);
            (path, removed)
        })
        .collect())
}

fn is_server_log(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "log")
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level("fatal"), log::LevelFilter::Info);
    }

    #[test]
    fn only_the_latest_server_log_survives() {
        let dir = tempfile::tempdir().unwrap();
        let names = [
            "server_aggregator_2026-03-01_08-00-00.log",
            "server_aggregator_2026-01-15_23-59-59.log",
            "server_aggregator_2026-02-01_00-00-00.log",
            "other_service.log",
            "notes.txt",
        ];
        for name in names {
            fs::write(dir.path().join(name), name).unwrap();
        }

        let pruned = prune_previous_logs(dir.path(), 1).unwrap();

        assert_eq!(pruned.len(), 2);
        assert!(pruned.iter().all(|(_, removed)| removed.is_ok()));
        let mut left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(left, vec!["notes.txt", "other_service.log", "server_aggregator_2026-03-01_08-00-00.log"]);
    }
}
