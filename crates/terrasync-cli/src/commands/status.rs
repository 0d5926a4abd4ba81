use anyhow::Result;
use serde::Serialize;
use terrasync::{Root, TileMap};

use super::format;

#[derive(Debug, Serialize)]
struct TileRow {
    tile: String,
    types: Vec<String>,
    complete: bool,
}

pub fn run(roots: &[Root], json: bool) -> Result<()> {
    let tiles = TileMap::scan(roots);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows(&tiles, roots))?);
    } else {
        format::print_tile_table(&tiles, roots);
    }
    Ok(())
}

fn rows(tiles: &TileMap, roots: &[Root]) -> Vec<TileRow> {
    tiles
        .iter()
        .map(|(tile, data)| {
            let mut types: Vec<_> = data.types().collect();
            types.sort();
            types.dedup();
            TileRow {
                tile: tile.to_string(),
                types: types.iter().map(ToString::to_string).collect(),
                complete: roots.iter().all(|root| data.has_all(root)),
            }
        })
        .collect()
}
