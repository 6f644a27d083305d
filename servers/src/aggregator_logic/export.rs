use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use lib_aggregator::Daq;
use tokio::sync::watch;

/// Writes one completed graph as `snapshot_<last update>.json` and returns its path.
pub async fn write_snapshot(output_dir: &Path, daq: &Daq) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("cannot create output directory {}", output_dir.display()))?;
    let path = output_dir.join(format!("snapshot_{}.json", daq.run.last_update));
    let json = serde_json::to_vec_pretty(daq).context("cannot serialize snapshot")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

/// Writes every graph published on `receiver` until the aggregator is dropped.
pub async fn run(mut receiver: watch::Receiver<Option<Arc<Daq>>>, output_dir: PathBuf) {
    while receiver.changed().await.is_ok() {
        let Some(daq) = receiver.borrow_and_update().clone() else {
            continue;
        };
        match write_snapshot(&output_dir, &daq).await {
            Ok(path) => log::debug!("Snapshot written to {}", path.display()),
            Err(e) => log::error!("Snapshot export failed: {:#}", e),
        }
    }
    log::info!("Aggregator closed, snapshot export stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_aggregator::{Aggregator, SessionContext, TopologySpec, UidAllocator};

    #[tokio::test]
    async fn every_published_cycle_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let daq = TopologySpec::default().build(&mut UidAllocator::new()).unwrap();
        let mut aggregator = Aggregator::new(daq, SessionContext::new("toppro"));
        let exporter = tokio::spawn(run(aggregator.subscribe(), dir.path().to_path_buf()));

        aggregator.run_cycle(Vec::new(), 1000);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        drop(aggregator);
        exporter.await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("snapshot_1000.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["run"]["lastUpdate"], 1000);
    }
}
