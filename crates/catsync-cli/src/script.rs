//! `script` command: offline rendering of a feed into guarded SQL.

use std::io::Write;
use std::path::Path;

use anyhow::Context;

use crate::sync::read_feed;

/// Renders the feed at `feed` and writes it to `output`, or stdout.
pub(crate) fn run_script(feed: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let records = read_feed(feed)?;
    let script = catsync_core::render_feed_script(&records);

    match output {
        Some(path) => {
            std::fs::write(path, &script)
                .with_context(|| format!("failed to write script {}", path.display()))?;
            tracing::info!(
                records = records.len(),
                output = %path.display(),
                "script written"
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(script.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
