//! Reads one cycle's flashlists from a directory of recorded LAS payloads.
//!
//! Every `<NAME>.json` file is one flashlist; the file stem is the flashlist
//! name (short report name or full `urn:xdaq-flashlist:` name). Files are read
//! concurrently. A payload that cannot be read or parsed becomes an
//! unavailable flashlist so the cycle still runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lib_aggregator::Flashlist;
use tokio::task::JoinSet;

/// Payload files in `dir`, sorted by name.
pub async fn payload_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot list flashlist directory {}", dir.display()))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Reads and parses every payload of `dir`. The result keeps directory order.
pub async fn read_flashlists(dir: &Path) -> Result<Vec<Flashlist>> {
    let files = payload_files(dir).await?;
    let mut in_flight = JoinSet::new();
    for (position, path) in files.into_iter().enumerate() {
        in_flight.spawn(async move { (position, read_one(&path).await) });
    }

    let mut flashlists = Vec::with_capacity(in_flight.len());
    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok(read) => flashlists.push(read),
            Err(e) => log::error!("Flashlist reader task failed: {}", e),
        }
    }
    flashlists.sort_by_key(|(position, _)| *position);
    Ok(flashlists.into_iter().map(|(_, flashlist)| flashlist).collect())
}

async fn read_one(path: &Path) -> Flashlist {
    let name = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
    let payload = match tokio::fs::read_to_string(path).await {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("Cannot read {}: {}", path.display(), e);
            return Flashlist::unavailable(&name);
        }
    };
    match Flashlist::from_las_json(&name, &payload) {
        Ok(flashlist) => {
            if flashlist.flashlist_type.is_none() {
                log::debug!("{} is not a flashlist the aggregator knows", name);
            }
            flashlist
        }
        Err(e) => {
            log::warn!("{}", e);
            Flashlist::unavailable(&name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_aggregator::FlashlistType;

    #[tokio::test]
    async fn reads_payloads_and_marks_broken_ones_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("BU.json"), r#"{"table": {"definition": [], "rows": [{"context": "x"}]}}"#)
            .unwrap();
        std::fs::write(dir.path().join("RU.json"), "{ truncated").unwrap();
        std::fs::write(dir.path().join("README.txt"), "ignored").unwrap();

        let flashlists = read_flashlists(dir.path()).await.unwrap();

        assert_eq!(flashlists.len(), 2);
        assert_eq!(flashlists[0].flashlist_type, Some(FlashlistType::Bu));
        assert_eq!(flashlists[0].rows.len(), 1);
        assert_eq!(flashlists[1].flashlist_type, Some(FlashlistType::Ru));
        assert!(!flashlists[1].available);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_flashlists(&dir.path().join("absent")).await.is_err());
    }
}
