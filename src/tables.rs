//! # Constant Tables
//!
//! The 24 rotation maps of the cube and the list of winning lines. Both are
//! plain-text, whitespace-separated integer files loaded once at startup and
//! shared read-only for the whole run.
//!
//! Loading is strict: a table that does not have exactly the expected shape is
//! a configuration error raised before any board is processed.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use cube_shared::{CELLS, ROTATIONS};

use crate::board::{PackedBoard, Player};
use crate::error::{Error, Result};

/// The 24 proper rotations of the cube as cell permutations.
///
/// Row `r`, column `i` is the index cell `i` moves to under rotation `r`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationTable {
    maps: Vec<[u8; CELLS]>,
}

impl RotationTable {
    /// Loads and validates a rotation table file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io("read rotation table", path, e))?;
        Self::parse(&text, path)
    }

    /// Parses rotation table text; `origin` is only used in error messages.
    pub fn parse(text: &str, origin: impl AsRef<Path>) -> Result<Self> {
        let origin = origin.as_ref();
        let rows = parse_rows(text, "rotation", origin, CELLS)?;
        let maps = rows
            .into_iter()
            .map(|row| {
                let mut map = [0u8; CELLS];
                for (slot, v) in map.iter_mut().zip(row) {
                    *slot = v as u8;
                }
                map
            })
            .collect();
        Self::from_maps(maps, origin)
    }

    /// Validates an in-memory table.
    ///
    /// Requires exactly 24 rows, each a permutation of `0..27`, and closure
    /// under composition (so the set is a group and orbit minima are stable).
    pub fn from_maps(maps: Vec<[u8; CELLS]>, origin: impl AsRef<Path>) -> Result<Self> {
        let malformed = |message: String| Error::Table {
            table: "rotation",
            path: origin.as_ref().to_path_buf(),
            message,
        };
        if maps.len() != ROTATIONS {
            return Err(malformed(format!("expected {ROTATIONS} rows, found {}", maps.len())));
        }
        for (r, map) in maps.iter().enumerate() {
            let mut seen = 0u32;
            for &target in map {
                if target as usize >= CELLS {
                    return Err(malformed(format!("row {} maps to cell {target}", r + 1)));
                }
                seen |= 1 << target;
            }
            if seen != cube_shared::CELL_MASK {
                return Err(malformed(format!("row {} is not a permutation of 0..27", r + 1)));
            }
        }
        let members: HashSet<[u8; CELLS]> = maps.iter().copied().collect();
        for a in &maps {
            for b in &maps {
                if !members.contains(&compose(a, b)) {
                    return Err(malformed("rows are not closed under composition".to_string()));
                }
            }
        }
        Ok(RotationTable { maps })
    }

    /// Derives the 24 proper rotations from every orthonormal (up, front) axis pair.
    ///
    /// The identity comes first.
    pub fn generate() -> Self {
        const AXES: [[i32; 3]; 6] = [
            [0, 0, 1],
            [0, 0, -1],
            [0, 1, 0],
            [0, -1, 0],
            [1, 0, 0],
            [-1, 0, 0],
        ];
        let mut maps = Vec::with_capacity(ROTATIONS);
        for up in AXES {
            for front in AXES {
                if dot(up, front) != 0 {
                    continue;
                }
                // Columns (right, front, up) with right = front x up keep det = +1.
                let right = cross(front, up);
                let mut map = [0u8; CELLS];
                for (cell, slot) in map.iter_mut().enumerate() {
                    let [x, y, z] = cube_shared::coords(cell);
                    let c = [x - 1, y - 1, z - 1];
                    let n: [i32; 3] =
                        std::array::from_fn(|k| right[k] * c[0] + front[k] * c[1] + up[k] * c[2] + 1);
                    *slot = cube_shared::cell_at(n[0], n[1], n[2]) as u8;
                }
                maps.push(map);
            }
        }
        RotationTable { maps }
    }

    pub fn maps(&self) -> &[[u8; CELLS]] {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Image of `code` under rotation `index`
    pub fn apply(&self, index: usize, code: u64) -> u64 {
        cube_shared::remap_code(code, &self.maps[index])
    }

    /// Numerically smallest image of `code` over the whole group.
    pub fn canonical_key(&self, code: u64) -> u64 {
        self.maps
            .iter()
            .map(|map| cube_shared::remap_code(code, map))
            .min()
            .unwrap_or(code)
    }

    pub fn canonical_board(&self, board: PackedBoard) -> PackedBoard {
        PackedBoard::from_raw_unchecked(self.canonical_key(board.raw()))
    }

    /// Row-major copy for device upload
    pub fn flattened(&self) -> Vec<u32> {
        self.maps.iter().flat_map(|m| m.iter().map(|&v| v as u32)).collect()
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let rows: Vec<Vec<u32>> = self.maps.iter().map(|m| m.iter().map(|&v| v as u32).collect()).collect();
        write_rows(path.as_ref(), &rows, "write rotation table")
    }
}

/// Winning lines: triples of cells on one straight 3-cell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinLineTable {
    lines: Vec<[u8; 3]>,
    masks: Vec<u32>,
}

impl WinLineTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io("read win-line table", path, e))?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, origin: impl AsRef<Path>) -> Result<Self> {
        let origin = origin.as_ref();
        let rows = parse_rows(text, "win-line", origin, 3)?;
        let lines = rows.into_iter().map(|r| [r[0] as u8, r[1] as u8, r[2] as u8]).collect();
        Self::from_lines(lines, origin)
    }

    pub fn from_lines(lines: Vec<[u8; 3]>, origin: impl AsRef<Path>) -> Result<Self> {
        let malformed = |message: String| Error::Table {
            table: "win-line",
            path: origin.as_ref().to_path_buf(),
            message,
        };
        if lines.is_empty() {
            return Err(malformed("no lines".to_string()));
        }
        for (i, line) in lines.iter().enumerate() {
            if line.iter().any(|&c| c as usize >= CELLS) {
                return Err(malformed(format!("line {} has a cell outside 0..27", i + 1)));
            }
            if line[0] == line[1] || line[1] == line[2] || line[0] == line[2] {
                return Err(malformed(format!("line {} repeats a cell", i + 1)));
            }
        }
        let masks = lines.iter().map(|&l| cube_shared::line_mask(l)).collect();
        Ok(WinLineTable { lines, masks })
    }

    /// Every straight 3-cell line except the four space diagonals (45 lines).
    pub fn generate() -> Self {
        let mut lines = Vec::new();
        for cell in 0..CELLS {
            let [x, y, z] = cube_shared::coords(cell);
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let direction = [dx, dy, dz];
                        if direction == [0, 0, 0] || (dx != 0 && dy != 0 && dz != 0) {
                            continue;
                        }
                        // One orientation per line: first non-zero component positive.
                        let first = direction.iter().copied().find(|&d| d != 0).unwrap_or(0);
                        if first < 0 {
                            continue;
                        }
                        let end = [x + 2 * dx, y + 2 * dy, z + 2 * dz];
                        if end.iter().any(|&v| !(0..3).contains(&v)) {
                            continue;
                        }
                        lines.push([
                            cell as u8,
                            cube_shared::cell_at(x + dx, y + dy, z + dz) as u8,
                            cube_shared::cell_at(end[0], end[1], end[2]) as u8,
                        ]);
                    }
                }
            }
        }
        let masks = lines.iter().map(|&l| cube_shared::line_mask(l)).collect();
        WinLineTable { lines, masks }
    }

    pub fn lines(&self) -> &[[u8; 3]] {
        &self.lines
    }

    pub fn masks(&self) -> &[u32] {
        &self.masks
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// First player found owning a complete line, X checked before O.
    pub fn winner(&self, board: PackedBoard) -> Option<Player> {
        let (x, o) = (board.x_mask(), board.o_mask());
        if self.masks.iter().any(|&m| cube_shared::owns_line(x, m)) {
            Some(Player::X)
        } else if self.masks.iter().any(|&m| cube_shared::owns_line(o, m)) {
            Some(Player::O)
        } else {
            None
        }
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let rows: Vec<Vec<u32>> = self.lines.iter().map(|l| l.iter().map(|&v| v as u32).collect()).collect();
        write_rows(path.as_ref(), &rows, "write win-line table")
    }
}

/// Both tables, loaded once and shared read-only.
#[derive(Debug, Clone)]
pub struct ConstantTables {
    pub rotations: RotationTable,
    pub win_lines: WinLineTable,
}

impl ConstantTables {
    pub fn load(rotations: impl AsRef<Path>, win_lines: impl AsRef<Path>) -> Result<Self> {
        Ok(ConstantTables {
            rotations: RotationTable::load(rotations)?,
            win_lines: WinLineTable::load(win_lines)?,
        })
    }

    pub fn generated() -> Self {
        ConstantTables {
            rotations: RotationTable::generate(),
            win_lines: WinLineTable::generate(),
        }
    }

    /// Writes `rotationMaps.txt` and `winLines.txt` into `dir`.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| Error::io("create table directory", dir, e))?;
        let rotations = dir.join("rotationMaps.txt");
        let win_lines = dir.join("winLines.txt");
        self.rotations.write_to(&rotations)?;
        self.win_lines.write_to(&win_lines)?;
        Ok((rotations, win_lines))
    }
}

/// `a` after `b`: cell `i` goes to `a[b[i]]`.
fn compose(a: &[u8; CELLS], b: &[u8; CELLS]) -> [u8; CELLS] {
    let mut out = [0u8; CELLS];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = a[b[i] as usize];
    }
    out
}

fn dot(a: [i32; 3], b: [i32; 3]) -> i32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [i32; 3], b: [i32; 3]) -> [i32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn parse_rows(text: &str, table: &'static str, origin: &Path, columns: usize) -> Result<Vec<Vec<u32>>> {
    let malformed = |message: String| Error::Table {
        table,
        path: origin.to_path_buf(),
        message,
    };
    let mut rows = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<u32>()
                    .map_err(|_| malformed(format!("line {}: '{tok}' is not a cell index", n + 1)))
            })
            .collect::<Result<Vec<_>>>()?;
        if row.len() != columns {
            return Err(malformed(format!(
                "line {}: expected {columns} columns, found {}",
                n + 1,
                row.len()
            )));
        }
        if let Some(v) = row.iter().find(|&&v| v as usize >= CELLS) {
            return Err(malformed(format!("line {}: cell {v} is outside 0..27", n + 1)));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn write_rows(path: &Path, rows: &[Vec<u32>], operation: &'static str) -> Result<()> {
    let mut text = String::new();
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&line.join(" "));
        text.push('\n');
    }
    fs::write(path, text).map_err(|e| Error::io(operation, path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_rotations_form_a_group_with_identity_first() {
        let table = RotationTable::generate();
        assert_eq!(table.len(), 24);
        let identity: Vec<u8> = (0..27).collect();
        assert_eq!(table.maps()[0].to_vec(), identity);
        // Validation also checks closure.
        RotationTable::from_maps(table.maps().to_vec(), "generated").unwrap();
        // Centre cell is fixed by every rotation.
        assert!(table.maps().iter().all(|m| m[13] == 13));
    }

    #[test]
    fn generated_win_lines_exclude_space_diagonals() {
        let lines = WinLineTable::generate();
        assert_eq!(lines.len(), 45);
        assert!(lines.lines().contains(&[0, 1, 2]));
        assert!(lines.lines().contains(&[0, 4, 8]));
        assert!(!lines.lines().contains(&[0, 13, 26]));
        assert!(!lines.lines().contains(&[2, 13, 24]));
    }

    #[test]
    fn rotations_preserve_the_win_line_set() {
        let tables = ConstantTables::generated();
        let masks: HashSet<u32> = tables.win_lines.masks().iter().copied().collect();
        for map in tables.rotations.maps() {
            for &m in tables.win_lines.masks() {
                assert!(masks.contains(&cube_shared::remap_mask(m, map)));
            }
        }
    }

    #[test]
    fn rejects_wrong_shapes() {
        let generated = RotationTable::generate();
        let mut text = String::new();
        for map in generated.maps().iter().take(23) {
            let row: Vec<String> = map.iter().map(|v| v.to_string()).collect();
            text.push_str(&row.join(" "));
            text.push('\n');
        }
        let err = RotationTable::parse(&text, "short.txt").unwrap_err();
        assert!(err.to_string().contains("expected 24 rows"));

        let err = RotationTable::parse("0 1 2\n", "narrow.txt").unwrap_err();
        assert!(err.to_string().contains("expected 27 columns"));

        assert!(WinLineTable::parse("0 1\n", "w.txt").is_err());
        assert!(WinLineTable::parse("0 1 27\n", "w.txt").is_err());
        assert!(WinLineTable::parse("0 0 1\n", "w.txt").is_err());
        assert!(WinLineTable::parse("\n\n", "w.txt").is_err());
        assert!(WinLineTable::parse("0 one 2\n", "w.txt").is_err());
    }

    #[test]
    fn rejects_tables_that_are_not_a_group() {
        let mut maps = RotationTable::generate().maps().to_vec();
        let mut swap: [u8; CELLS] = std::array::from_fn(|i| i as u8);
        swap.swap(0, 1);
        maps[5] = swap;
        let err = RotationTable::from_maps(maps, "broken").unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tables = ConstantTables::generated();
        let (rot, win) = tables.write_to_dir(dir.path()).unwrap();
        let loaded = ConstantTables::load(rot, win).unwrap();
        assert_eq!(loaded.rotations, tables.rotations);
        assert_eq!(loaded.win_lines, tables.win_lines);
    }

    #[test]
    fn winner_prefers_x() {
        let lines = WinLineTable::generate();
        let board = PackedBoard::from_masks(0b111, 0b111 << 9).unwrap();
        assert_eq!(lines.winner(board), Some(Player::X));
        let board = PackedBoard::from_masks(0b101, 0b111 << 9).unwrap();
        assert_eq!(lines.winner(board), Some(Player::O));
        assert_eq!(lines.winner(PackedBoard::EMPTY), None);
    }
}
