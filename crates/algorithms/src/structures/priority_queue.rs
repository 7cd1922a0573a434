//! Indexed priority queue for priority-flood sweeps

/// A grid cell as queue payload.
///
/// `flat_index` is the tie-breaker ordinal assigned when the cell is pushed;
/// it rides in the low digits of the priority key so cells of equal
/// elevation drain in FIFO order across flats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub flat_index: usize,
}

impl GridCell {
    pub fn new(row: usize, col: usize, flat_index: usize) -> Self {
        Self {
            row,
            col,
            flat_index,
        }
    }
}

/// Scales elevations into the integer priority-key range.
///
/// The key compresses the elevation into eight decimal digits so the
/// tie-breaker can live in the low five (`flat_index mod 100_000`), keeping
/// keys monotonic in elevation and FIFO across ties.
#[derive(Debug, Clone, Copy)]
pub struct ElevationScale {
    multiplier: f64,
}

const TIE_MULT: i64 = 100_000;
const STREAM_TIE_MULT: i64 = 10_000;
const NON_STREAM_BASE: i64 = 10_000_000_000_000;

impl ElevationScale {
    /// Derive the scale from the elevation range of a grid.
    pub fn from_range(min: f64, max: f64) -> Self {
        let digits = format!("{}", (max - min).ceil().max(0.0) as i64).len() as i32;
        Self {
            multiplier: 10f64.powi(8 - digits),
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// The smallest representable elevation increment under this scale.
    pub fn increment(&self) -> f64 {
        1.0 / self.multiplier
    }

    /// Priority key for a cell at elevation `z` with tie-break `flat_index`.
    pub fn key(&self, z: f64, flat_index: usize) -> i64 {
        (z * self.multiplier) as i64 * TIE_MULT + (flat_index as i64 % TIE_MULT)
    }

    /// Priority key for stream-aware breaching: stream cells always sort
    /// before non-stream cells of any elevation.
    pub fn stream_key(&self, z: f64, is_stream: bool) -> i64 {
        let scaled = (z * self.multiplier) as i64 * STREAM_TIE_MULT;
        if is_stream {
            scaled
        } else {
            NON_STREAM_BASE + scaled
        }
    }
}

/// Min-heap of grid cells keyed by an integer priority.
///
/// Flat binary heap with `swim`/`sink` on the key alone; the tie-break is
/// already embedded in the key. Popping an empty queue is a programmer
/// error and panics: callers guard with a length check.
#[derive(Debug, Default)]
pub struct IndexedPriorityQueue {
    items: Vec<(i64, GridCell)>,
}

impl IndexedPriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, cell: GridCell, priority: i64) {
        self.items.push((priority, cell));
        self.swim(self.items.len() - 1);
    }

    /// Remove and return the least-priority cell.
    ///
    /// # Panics
    /// Panics when the queue is empty.
    pub fn pop(&mut self) -> GridCell {
        assert!(!self.items.is_empty(), "pop from empty priority queue");
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let (_, cell) = self.items.pop().expect("guarded above");
        if !self.items.is_empty() {
            self.sink(0);
        }
        cell
    }

    fn swim(&mut self, mut k: usize) {
        while k > 0 {
            let parent = (k - 1) / 2;
            if self.items[parent].0 <= self.items[k].0 {
                break;
            }
            self.items.swap(parent, k);
            k = parent;
        }
    }

    fn sink(&mut self, mut k: usize) {
        let n = self.items.len();
        loop {
            let mut j = 2 * k + 1;
            if j >= n {
                break;
            }
            if j + 1 < n && self.items[j + 1].0 < self.items[j].0 {
                j += 1;
            }
            if self.items[k].0 <= self.items[j].0 {
                break;
            }
            self.items.swap(k, j);
            k = j;
        }
    }
}
