use anyhow::{Context, Result};
use terrasync::{Root, TileMap, TileName};

pub fn run(roots: &[Root], args: &[String]) -> Result<()> {
    let tiles = args
        .iter()
        .map(|arg| {
            arg.parse::<TileName>()
                .with_context(|| format!("not a tile name: {arg}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut map = TileMap::scan(roots);
    for tile in &tiles {
        let removed = map
            .delete(tile)
            .with_context(|| format!("failed to delete {tile}"))?;
        if removed {
            println!("Deleted {tile}");
        } else {
            println!("{tile} is not present locally");
        }
    }
    Ok(())
}
