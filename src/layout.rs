//! Cell to world-position mapping for the two grid shapes maps are painted on.

use serde::{Deserialize, Serialize};

use crate::constants::CELL_SIZE;
use crate::types::{Cell, WorldPos};

const SQRT_3: f32 = 1.732_050_8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GridLayout {
    Square {
        #[serde(rename = "cellSize")]
        cell_size: f32,
    },
    /// Flat-top hexes in offset columns; `even_offset` pushes even columns down half a row.
    FlatTopHex {
        #[serde(rename = "cellSize")]
        cell_size: f32,
        #[serde(rename = "evenOffset")]
        even_offset: bool,
    },
}

impl Default for GridLayout {
    fn default() -> Self {
        Self::Square {
            cell_size: CELL_SIZE,
        }
    }
}

impl GridLayout {
    pub fn cell_center(&self, cell: Cell) -> WorldPos {
        match *self {
            Self::Square { cell_size } => WorldPos {
                x: (cell.x as f32 + 0.5) * cell_size,
                y: (cell.y as f32 + 0.5) * cell_size,
            },
            Self::FlatTopHex {
                cell_size,
                even_offset,
            } => {
                let shifted = (cell.x.rem_euclid(2) == 0) == even_offset;
                let row_offset = if shifted { 0.5 } else { 0.0 };
                WorldPos {
                    x: cell.x as f32 * cell_size * 1.5,
                    y: (cell.y as f32 + row_offset) * cell_size * SQRT_3,
                }
            }
        }
    }

    /// Mean of the cell centers; the origin for an empty list.
    pub fn centroid(&self, cells: &[Cell]) -> WorldPos {
        if cells.is_empty() {
            return WorldPos::ORIGIN;
        }
        let (sum_x, sum_y) = cells.iter().fold((0.0f32, 0.0f32), |(sx, sy), cell| {
            let world = self.cell_center(*cell);
            (sx + world.x, sy + world.y)
        });
        let count = cells.len() as f32;
        WorldPos {
            x: sum_x / count,
            y: sum_y / count,
        }
    }
}
