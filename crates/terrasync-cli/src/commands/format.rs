use terrasync::{DirectoryType, MirrorStats, Root, RunReport, TileMap};

const MAX_URL_WIDTH: usize = 48;

pub fn print_report(report: &RunReport) {
    let status = if report.cancelled { "cancelled" } else { "finished" };
    println!(
        "Sync {status}: {} targets, {} updates, {} downloads ({}), {} unchanged",
        report.targets,
        report.updates,
        report.total_downloads(),
        human_bytes(report.total_bytes()),
        report.total_unchanged(),
    );

    if report.mirrors.is_empty() {
        return;
    }

    let url_width = report
        .mirrors
        .iter()
        .map(|m| m.url.chars().count())
        .max()
        .unwrap_or(0)
        .min(MAX_URL_WIDTH);

    println!();
    for mirror in &report.mirrors {
        println!("  {}", mirror_row(mirror, url_width));
    }

    for mirror in report.demoted() {
        if let Some(error) = &mirror.last_error {
            println!("\n{} was demoted: {error}", mirror.url);
        }
    }
}

fn mirror_row(stats: &MirrorStats, url_width: usize) -> String {
    let url = truncate(&stats.url, url_width);
    let rate = stats
        .throughput()
        .map(|bps| format!("{}/s", human_bytes(bps as u64)))
        .unwrap_or_else(|| "-".to_owned());
    let flag = if stats.demoted { "  demoted" } else { "" };
    format!(
        "{:<width$}  w{:<4} {:>5} dl {:>10} {:>12} {:>5} err {:>5} same{flag}",
        url,
        stats.weight,
        stats.downloads,
        human_bytes(stats.bytes),
        rate,
        stats.errors,
        stats.unchanged,
        width = url_width
    )
}

/// One row per tile: name, the abbreviations of its layers, and whether any
/// enabled layer is missing.
pub fn print_tile_table(tiles: &TileMap, roots: &[Root]) {
    if tiles.is_empty() {
        println!("No tiles found");
        return;
    }

    let mut partial = 0usize;
    for (tile, data) in tiles.iter() {
        let complete = roots.iter().all(|root| data.has_all(root));
        if !complete {
            partial += 1;
        }
        let flag = if complete { "" } else { "  (partial)" };
        println!("  {:<8} {}{flag}", tile.to_string(), layer_list(data.types()));
    }
    println!("\n{} tiles, {partial} partial", tiles.len());
}

pub fn layer_list(types: impl Iterator<Item = DirectoryType>) -> String {
    let mut types: Vec<DirectoryType> = types.collect();
    types.sort();
    types.dedup();
    types
        .iter()
        .map(DirectoryType::abbreviation)
        .collect::<Vec<_>>()
        .join(" ")
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.1} {unit}")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}
