use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

use crate::client::Row;
use crate::stage::ExitGate;

const OUTPUT_BUFFER_BYTES: usize = 8192;

/// Persists the rows of one query to `<source>.output`, one raw row per line.
///
/// Batches are handed to a background task through a channel, so draining the
/// query never waits on disk. Batches of one query are written strictly in
/// the order they were received; separate queries use separate writers. The
/// task is tracked by the run's exit gate and flushes the file once the
/// writer is dropped.
pub struct OutputWriter {
    tx: mpsc::UnboundedSender<Vec<Row>>,
}

impl OutputWriter {
    pub async fn create(path: PathBuf, exit: &ExitGate) -> std::io::Result<Self> {
        let file = tokio::fs::File::create(&path).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        exit.spawn(write_batches(path, BufWriter::with_capacity(OUTPUT_BUFFER_BYTES, file), rx));
        Ok(Self { tx })
    }

    pub fn write(&self, rows: Vec<Row>) {
        // The task only stops early after a write error it already reported.
        let _ = self.tx.send(rows);
    }
}

async fn write_batches(
    path: PathBuf,
    mut out: BufWriter<tokio::fs::File>,
    mut rx: mpsc::UnboundedReceiver<Vec<Row>>,
) {
    while let Some(rows) = rx.recv().await {
        if let Err(err) = write_rows(&mut out, &rows).await {
            tracing::warn!(path = %path.display(), error = %err, "failed to write query result");
            return;
        }
    }
    match out.shutdown().await {
        Ok(()) => tracing::debug!(path = %path.display(), "query data saved successfully"),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to write query result")
        }
    }
}

async fn write_rows(out: &mut BufWriter<tokio::fs::File>, rows: &[Row]) -> std::io::Result<()> {
    for row in rows {
        out.write_all(row.get().as_bytes()).await?;
        out.write_all(b"\n").await?;
    }
    Ok(())
}

pub fn output_path(dir: &Path, source: &str) -> PathBuf {
    dir.join(format!("{source}.output"))
}
