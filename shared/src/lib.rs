//! Shared data model for the sea battle client.
//!
//! Everything in this crate is pure data: the 10x10 board, the two coordinate
//! spaces (local row/col vs. the server's x/y) and ship placements. All I/O
//! and state mutation lives in the `client` crate; this crate only converts
//! and validates.

pub mod protocol;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BOARD_SIZE: usize = 10;

/// State of a single board cell as the client tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Empty,
    Ship,
    Hit,
    Miss,
}

impl Cell {
    /// Maps a raw server cell tag to a local cell. Unknown tags read as
    /// empty, and `SHIP` is only honored when `reveal_ships` is set, so an
    /// opponent board can never leak ship positions from a careless payload.
    pub fn from_server_tag(tag: &str, reveal_ships: bool) -> Cell {
        match tag {
            "HIT" => Cell::Hit,
            "MISS" => Cell::Miss,
            "SHIP" if reveal_ships => Cell::Ship,
            _ => Cell::Empty,
        }
    }
}

/// Board coordinate in local convention: (row, col), both in `0..BOARD_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(&self) -> bool {
        self.row < BOARD_SIZE && self.col < BOARD_SIZE
    }
}

/// Transport-space coordinate. The server speaks (x, y) where x is the
/// column and y is the row; the swap between the two spaces happens through
/// these `From` impls and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCoord {
    pub x: usize,
    pub y: usize,
}

impl From<Coord> for WireCoord {
    fn from(c: Coord) -> Self {
        WireCoord { x: c.col, y: c.row }
    }
}

impl From<WireCoord> for Coord {
    fn from(w: WireCoord) -> Self {
        Coord { row: w.y, col: w.x }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("server board data is not a 10x10 grid")]
    MalformedBoardData,
    #[error("coordinate ({}, {}) is outside the board", .0.row, .0.col)]
    CoordinateOutOfBounds(Coord),
}

/// A ship placement in local coordinates: origin cell, length and
/// orientation. Legality (overlap, bounds) is the server's call; the client
/// only mirrors placements the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ship {
    pub origin: Coord,
    pub length: usize,
    pub horizontal: bool,
}

impl Ship {
    pub fn new(origin: Coord, length: usize, horizontal: bool) -> Self {
        Self {
            origin,
            length,
            horizontal,
        }
    }

    /// Cells the ship occupies, in placement order.
    pub fn cells(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..self.length).map(move |i| {
            if self.horizontal {
                Coord::new(self.origin.row, self.origin.col + i)
            } else {
                Coord::new(self.origin.row + i, self.origin.col)
            }
        })
    }
}

/// Fixed 10x10 grid of cells, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
}

impl Default for Board {
    fn default() -> Self {
        Board::empty()
    }
}

impl Board {
    pub fn empty() -> Self {
        Board {
            cells: [[Cell::Empty; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    pub fn get(&self, coord: Coord) -> Option<Cell> {
        if coord.in_bounds() {
            Some(self.cells[coord.row][coord.col])
        } else {
            None
        }
    }

    /// Sets one cell. An out-of-range coordinate leaves the board unchanged.
    pub fn set(&mut self, coord: Coord, cell: Cell) -> Result<(), BoardError> {
        if !coord.in_bounds() {
            return Err(BoardError::CoordinateOutOfBounds(coord));
        }
        self.cells[coord.row][coord.col] = cell;
        Ok(())
    }

    /// Builds a board from the server's raw cell tags. Anything that is not
    /// a well-formed 10x10 grid is rejected whole; the caller keeps whatever
    /// board it already had.
    pub fn from_server(raw: &[Vec<String>], reveal_ships: bool) -> Result<Board, BoardError> {
        if raw.len() != BOARD_SIZE {
            return Err(BoardError::MalformedBoardData);
        }
        let mut board = Board::empty();
        for (r, row) in raw.iter().enumerate() {
            if row.len() != BOARD_SIZE {
                return Err(BoardError::MalformedBoardData);
            }
            for (c, tag) in row.iter().enumerate() {
                board.cells[r][c] = Cell::from_server_tag(tag, reveal_ships);
            }
        }
        Ok(board)
    }

    /// Stamps `ship` cells for every placement. Used for the own board only;
    /// cells outside the grid are skipped, mirroring how the original client
    /// clips display data instead of failing on it.
    pub fn from_ships(ships: &[Ship]) -> Board {
        let mut board = Board::empty();
        for ship in ships {
            for coord in ship.cells() {
                if coord.in_bounds() {
                    board.cells[coord.row][coord.col] = Cell::Ship;
                }
            }
        }
        board
    }

    pub fn count(&self, cell: Cell) -> usize {
        self.cells
            .iter()
            .flat_map(|row| row.iter())
            .filter(|c| **c == cell)
            .count()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell; BOARD_SIZE]> {
        self.cells.iter()
    }
}
