use anyhow::{Context, Result};
use terrasync::{EntryKind, Mirror};
use terrasync_http::{Downloader, DownloaderConfig, probe_root};
use tokio_util::sync::CancellationToken;

pub async fn run(url: &str, downloader: &DownloaderConfig) -> Result<()> {
    let downloader = Downloader::new(downloader).context("failed to build HTTP client")?;
    let mirror = Mirror::new(url, 100);
    let (kind, manifest) = probe_root(&downloader, &mirror, &CancellationToken::new())
        .await
        .with_context(|| format!("failed to probe {url}"))?;

    if manifest.is_empty() {
        println!("{url} published no manifest");
        return Ok(());
    }

    println!("{url}: {kind:?} root");
    for entry in manifest.entries().iter().filter(|e| e.kind == EntryKind::Directory) {
        println!("  {}/", entry.name);
    }
    Ok(())
}
