//! One-shot terrain producers consumed at startup.

use colony_core::{AntPlacement, Cell, Material, Pheromone};

/// Air above, packed dirt below, a full food cache at the surface's right
/// edge and a waiting egg at its left.
pub fn split_in_half(rows: usize, columns: usize, food_full: i32) -> Vec<Vec<Cell>> {
    let mut blocks = vec![vec![Cell::of(Material::Air); columns]; rows];
    for row in blocks.iter_mut().skip(rows / 2) {
        for cell in row.iter_mut() {
            cell.material = Material::Dirt;
        }
    }

    let surface = rows / 2 - 1;
    blocks[surface][columns - 1] = Cell {
        material: Material::Food,
        stock: food_full,
        ..Cell::default()
    };
    blocks[surface][0].material = Material::Egg;

    blocks
}

/// A starting crew of diggers lined up on the surface.
pub fn starting_diggers(count: usize, cell_height: f32) -> Vec<AntPlacement> {
    (0..count)
        .map(|i| AntPlacement {
            x: -10.0 * i as f32,
            y: -cell_height,
            following: Pheromone::MoveDirt,
        })
        .collect()
}
