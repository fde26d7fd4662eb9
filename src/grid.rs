/// One grid coordinate. Row-major: `row` is the vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cell {
    pub row: u32,
    pub column: u32,
}

impl Cell {
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Manhattan distance between two cells.
    pub fn taxicab(self, other: Cell) -> u32 {
        self.row.abs_diff(other.row) + self.column.abs_diff(other.column)
    }

    /// True if `other` is one King move away (orthogonal or diagonal).
    pub fn is_adjacent(self, other: Cell) -> bool {
        let dr = self.row.abs_diff(other.row);
        let dc = self.column.abs_diff(other.column);
        dr <= 1 && dc <= 1 && (dr + dc) > 0
    }
}

/// Occupancy tag. An empty cell has no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Spawn cell of a walker that has not moved yet.
    Start,
    /// Interior of a trail.
    Path,
    /// Current tip of a trail. Merging walkers may step onto it.
    End,
}

/// Occupancy for every cell of one simulation run.
///
/// Row-major, one slot per cell. Owned by a single run and dropped with it.
pub struct GridState {
    num_rows: u32,
    num_columns: u32,
    cells: Vec<Option<Tag>>,
}

impl GridState {
    pub fn new(num_rows: u32, num_columns: u32) -> Self {
        Self {
            num_rows,
            num_columns,
            cells: vec![None; num_rows as usize * num_columns as usize],
        }
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    pub fn num_columns(&self) -> u32 {
        self.num_columns
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.num_rows && cell.column < self.num_columns
    }

    fn index(&self, cell: Cell) -> usize {
        debug_assert!(self.contains(cell), "cell {cell:?} out of bounds");
        cell.row as usize * self.num_columns as usize + cell.column as usize
    }

    /// Overwrite the tag at `cell`. Caller guarantees `cell` is in bounds.
    pub fn set(&mut self, cell: Cell, tag: Tag) {
        let idx = self.index(cell);
        self.cells[idx] = Some(tag);
    }

    pub fn get(&self, cell: Cell) -> Option<Tag> {
        if !self.contains(cell) {
            return None;
        }
        self.cells[self.index(cell)]
    }

    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.get(cell).is_some()
    }

    /// Would a step `from -> to` cross an existing path?
    ///
    /// Only diagonal steps can cross. The step crosses if either flanking
    /// cell (same row as one end, same column as the other) is occupied.
    pub fn crosses(&self, from: Cell, to: Cell) -> bool {
        if from.row == to.row || from.column == to.column {
            return false;
        }
        self.is_occupied(Cell::new(to.row, from.column))
            || self.is_occupied(Cell::new(from.row, to.column))
    }

    /// Collect the King-move neighbours of `cell` into `out`, clipped to the grid.
    ///
    /// Scan order is row-major (top-left first). Selection tie-breaks rely on it.
    pub fn neighbours(&self, cell: Cell, out: &mut Vec<Cell>) {
        out.clear();
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let r = cell.row as i64 + dr;
                let c = cell.column as i64 + dc;
                if r < 0 || c < 0 || r >= self.num_rows as i64 || c >= self.num_columns as i64 {
                    continue;
                }
                out.push(Cell::new(r as u32, c as u32));
            }
        }
    }

    /// Twice the taxicab distance from `cell` to the geometric grid centre.
    ///
    /// The centre sits at (rows/2, columns/2) and may fall on a half cell,
    /// so distances are kept in half-cell units to stay exact.
    pub fn center_distance_x2(&self, cell: Cell) -> u32 {
        (2 * cell.row).abs_diff(self.num_rows) + (2 * cell.column).abs_diff(self.num_columns)
    }
}
