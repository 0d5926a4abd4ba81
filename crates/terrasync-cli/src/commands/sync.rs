use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use terrasync::{DirectoryType, MirrorSource, Progress, Root, RunReport, SyncEvent, SyncTarget, TileName};
use terrasync_http::Scheduler;

use super::format;
use crate::config::AppConfig;

/// Parse a command-line target: a tile name, `models`, `airports[:ICAO]` or `navdata`.
///
/// Bulk targets land in the first enabled root that carries their directory type.
pub fn parse_target(arg: &str, roots: &[Root]) -> Result<SyncTarget> {
    let (kind, qualifier) = match arg.split_once(':') {
        Some((kind, qualifier)) => (kind, Some(qualifier)),
        None => (arg, None),
    };

    match (kind.to_ascii_lowercase().as_str(), qualifier) {
        ("models", None) => Ok(SyncTarget::Models {
            base_path: bulk_base(roots, DirectoryType::Models)?,
        }),
        ("navdata", None) => Ok(SyncTarget::NavData {
            base_path: bulk_base(roots, DirectoryType::Navdata)?,
        }),
        ("airports", icao) => {
            let icao_prefix = match icao {
                Some(code) if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) => {
                    bail!("invalid ICAO code: {code:?}")
                }
                Some(code) => Some(code.to_ascii_uppercase()),
                None => None,
            };
            Ok(SyncTarget::Airports {
                base_path: bulk_base(roots, DirectoryType::Airports)?,
                icao_prefix,
            })
        }
        (_, None) => {
            let tile: TileName = arg
                .parse()
                .with_context(|| format!("not a tile name or known target: {arg}"))?;
            Ok(SyncTarget::Tile(tile))
        }
        (_, Some(_)) => bail!("unknown target: {arg}"),
    }
}

fn bulk_base(roots: &[Root], ty: DirectoryType) -> Result<PathBuf> {
    roots
        .iter()
        .find(|root| root.enables(ty))
        .map(|root| root.local_dir.clone())
        .with_context(|| format!("no enabled root provides {ty}"))
}

pub async fn run(config: &AppConfig, args: &[String], age_check: bool, json: bool) -> Result<()> {
    let scheduler_config = config.scheduler_config();
    if scheduler_config.roots.is_empty() {
        bail!("no roots are enabled in the configuration");
    }
    let targets = args
        .iter()
        .map(|arg| parse_target(arg, &scheduler_config.roots))
        .collect::<Result<Vec<_>>>()?;

    let source: Arc<dyn MirrorSource> = Arc::new(config.mirror_source());
    let (scheduler, mut events) =
        Scheduler::start(scheduler_config, source).context("failed to start the sync worker")?;
    let scheduler = Arc::new(scheduler);

    scheduler.enqueue(targets, age_check);

    let interrupt = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling sync");
                scheduler.cancel();
            }
        })
    };

    let report = consume_events(&mut events).await;
    interrupt.abort();

    scheduler.quit();
    let worker = Arc::clone(&scheduler);
    tokio::task::spawn_blocking(move || worker.join())
        .await
        .context("failed to wait for the sync worker")?;

    let report = report.context("sync worker stopped before finishing")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        format::print_report(&report);
    }

    if report.cancelled {
        bail!("sync was cancelled");
    }
    Ok(())
}

/// Show progress on stderr until the worker reports the end of its pass.
async fn consume_events(events: &mut tokio::sync::mpsc::UnboundedReceiver<SyncEvent>) -> Option<RunReport> {
    let mut progress = Progress::default();
    let mut stderr = std::io::stderr();

    while let Some(event) = events.recv().await {
        progress.apply(&event);
        match event {
            SyncEvent::Finished(report) => {
                let _ = writeln!(stderr);
                return Some(report);
            }
            SyncEvent::Advance(_) => {
                let _ = write!(stderr, "\r{}/{} entries", progress.done, progress.total);
                let _ = stderr.flush();
            }
            SyncEvent::Started | SyncEvent::Extend(_) => {}
        }
    }
    None
}
