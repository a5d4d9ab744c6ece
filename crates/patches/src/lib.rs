use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Half-open raster rectangle: columns `[px, pw)`, rows `[py, ph)`.
///
/// `pw` and `ph` are exclusive end coordinates, not extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Patch {
    pub px: u32,
    pub py: u32,
    pub pw: u32,
    pub ph: u32,
}

impl Patch {
    pub const fn new(px: u32, py: u32, pw: u32, ph: u32) -> Self {
        Self { px, py, pw, ph }
    }

    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub const fn width(&self) -> u32 {
        self.pw - self.px
    }

    pub const fn height(&self) -> u32 {
        self.ph - self.py
    }

    pub const fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub const fn is_empty(&self) -> bool {
        self.pw <= self.px || self.ph <= self.py
    }

    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.px && x < self.pw && y >= self.py && y < self.ph
    }

    /// Bounds containment; a degenerate patch is contained when its edges lie inside.
    pub const fn contains_patch(&self, other: &Patch) -> bool {
        other.px >= self.px && other.pw <= self.pw && other.py >= self.py && other.ph <= self.ph
    }

    pub const fn intersects(&self, other: &Patch) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.px < other.pw
            && other.px < self.pw
            && self.py < other.ph
            && other.py < self.ph
    }

    /// Row-major pixel coordinates inside the patch.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> {
        let (px, pw) = (self.px, self.pw);
        (self.py..self.ph).flat_map(move |y| (px..pw).map(move |x| (x, y)))
    }

    fn offset(self, dx: u32, dy: u32) -> Self {
        Self::new(self.px + dx, self.py + dy, self.pw + dx, self.ph + dy)
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})x[{},{})", self.px, self.pw, self.py, self.ph)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionStrategy {
    Rows,
    Cols,
    Blocks,
}

type Splitter = fn(u32, u32, u32, u32) -> Patch;

impl PartitionStrategy {
    /// `rows` and `cols` select their strategy; every other label selects blocks.
    pub fn from_label(label: &str) -> Self {
        match label {
            "rows" => Self::Rows,
            "cols" => Self::Cols,
            _ => Self::Blocks,
        }
    }

    /// Canonical name; unrecognised input parsed as blocks labels as `blocks`.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rows => "rows",
            Self::Cols => "cols",
            Self::Blocks => "blocks",
        }
    }

    const fn splitter(self) -> Splitter {
        match self {
            Self::Rows => split_rows,
            Self::Cols => split_cols,
            Self::Blocks => split_blocks,
        }
    }
}

impl FromStr for PartitionStrategy {
    type Err = Infallible;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_label(label))
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("cannot partition a region into zero patches")]
    ZeroCount,
    #[error("patch index {index} is out of range for {count} patches")]
    IndexOutOfRange { index: u32, count: u32 },
}

/// Patch `index` of `count` over `[0, width) x [0, height)`.
pub fn partition(
    width: u32,
    height: u32,
    count: u32,
    index: u32,
    strategy: PartitionStrategy,
) -> Result<Patch, PartitionError> {
    check_index(count, index)?;
    if count == 1 {
        return Ok(Patch::full(width, height));
    }
    Ok((strategy.splitter())(width, height, count, index))
}

/// Patch `index` of `count` over `outer`, in the same global coordinates as `outer`.
pub fn subdivide(
    outer: Patch,
    count: u32,
    index: u32,
    strategy: PartitionStrategy,
) -> Result<Patch, PartitionError> {
    let local = partition(outer.width(), outer.height(), count, index, strategy)?;
    Ok(local.offset(outer.px, outer.py))
}

fn check_index(count: u32, index: u32) -> Result<(), PartitionError> {
    if count == 0 {
        return Err(PartitionError::ZeroCount);
    }
    if index >= count {
        return Err(PartitionError::IndexOutOfRange { index, count });
    }
    Ok(())
}

/// Start and length of band `index` when `extent` is cut into `count` bands.
/// The first `extent % count` bands are one unit longer.
fn band(extent: u32, count: u32, index: u32) -> (u32, u32) {
    let base = extent / count;
    let extra = extent % count;
    let start = index * base + index.min(extra);
    let len = base + u32::from(index < extra);
    (start, len)
}

fn split_rows(width: u32, height: u32, count: u32, index: u32) -> Patch {
    let (start, len) = band(height, count, index);
    Patch::new(0, start, width, start + len)
}

fn split_cols(width: u32, height: u32, count: u32, index: u32) -> Patch {
    let (start, len) = band(width, count, index);
    Patch::new(start, 0, start + len, height)
}

/// Grid shape for `count` blocks: `(rows, cols_per_row)`.
fn block_grid(count: u32) -> (u32, u32) {
    let mut rows = (count as f64).sqrt().floor() as u32;
    if count >= 2 {
        rows = rows.max(2);
    }
    let rows = rows.min(count).max(1);
    (rows, count.div_ceil(rows))
}

fn split_blocks(width: u32, height: u32, count: u32, index: u32) -> Patch {
    let (rows, cols_per_row) = block_grid(count);
    let row = index / cols_per_row;
    let col = index % cols_per_row;
    // The last grid row absorbs the shortfall.
    let cols_in_row = if row + 1 < rows {
        cols_per_row
    } else {
        count - cols_per_row * (rows - 1)
    };

    let (py, h) = band(height, rows, row);
    let (px, w) = band(width, cols_in_row, col);
    Patch::new(px, py, px + w, py + h)
}

/// Per-unit patch assignment for one frame group, indexed by local unit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTable {
    region: Patch,
    patches: Vec<Patch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TilingError {
    #[error("patch {index} {patch} leaves the region {region}")]
    OutOfRegion {
        index: usize,
        patch: Patch,
        region: Patch,
    },
    #[error("patches {first} and {second} overlap")]
    Overlap { first: usize, second: usize },
    #[error("patches cover {covered} of {expected} pixels")]
    Coverage { covered: u64, expected: u64 },
}

impl PatchTable {
    pub fn partition(
        width: u32,
        height: u32,
        count: u32,
        strategy: PartitionStrategy,
    ) -> Result<Self, PartitionError> {
        Self::subdivide(Patch::full(width, height), count, strategy)
    }

    pub fn subdivide(
        region: Patch,
        count: u32,
        strategy: PartitionStrategy,
    ) -> Result<Self, PartitionError> {
        let patches = (0..count)
            .map(|index| subdivide(region, count, index, strategy))
            .collect::<Result<Vec<_>, _>>()?;
        if patches.is_empty() {
            return Err(PartitionError::ZeroCount);
        }
        Ok(Self { region, patches })
    }

    pub fn region(&self) -> Patch {
        self.region
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn get(&self, local_id: usize) -> Option<Patch> {
        self.patches.get(local_id).copied()
    }

    pub fn as_slice(&self) -> &[Patch] {
        &self.patches
    }

    /// Checks that the patches tile the region exactly once.
    pub fn verify_tiling(&self) -> Result<(), TilingError> {
        for (index, patch) in self.patches.iter().enumerate() {
            if !self.region.contains_patch(patch) {
                return Err(TilingError::OutOfRegion {
                    index,
                    patch: *patch,
                    region: self.region,
                });
            }
        }
        for (first, a) in self.patches.iter().enumerate() {
            for (offset, b) in self.patches[first + 1..].iter().enumerate() {
                if a.intersects(b) {
                    return Err(TilingError::Overlap {
                        first,
                        second: first + 1 + offset,
                    });
                }
            }
        }
        // Disjoint and contained, so equal area means exact cover.
        let covered: u64 = self.patches.iter().map(Patch::area).sum();
        let expected = self.region.area();
        if covered != expected {
            return Err(TilingError::Coverage { covered, expected });
        }
        Ok(())
    }
}
