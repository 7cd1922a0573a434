//! D8 flow pointer and accumulation
//!
//! Every cell drains to its steepest-descent neighbour (drop over distance,
//! diagonals weighted by the cell diagonal). Accumulation then runs a
//! topological sweep: cells with no inflow seed a FIFO and push their
//! contributing area downslope, enqueueing a receiver once its last
//! tributary has reported. Totals are in contributing-cell counts, each
//! valid cell starting at one.

use hydrogrid_core::grid::{DX, DY};
use hydrogrid_core::{Error, Grid, ProgressReporter, Result};
use ndarray::Array2;

use crate::structures::CellQueue;

/// Parameters for D8 flow accumulation
#[derive(Debug, Clone, Default)]
pub struct D8Params {
    /// Natural-log transform the output for display.
    pub ln_transform: bool,
}

/// Result of a D8 run
#[derive(Debug)]
pub struct D8Outcome {
    /// Contributing area per cell, in cells
    pub accumulation: Grid,
    /// Flow pointer: direction codes 1..8, 0 for pits and outlets
    pub pointer: Grid,
}

/// Compute the D8 flow pointer and flow accumulation of a DEM.
///
/// The DEM is expected to be depressionless; interior cells without a lower
/// neighbour keep pointer 0 and swallow their accumulation.
pub fn d8_flow_accumulation(
    dem: &Grid,
    params: &D8Params,
    progress: &ProgressReporter,
) -> Result<D8Outcome> {
    let (rows, columns) = dem.shape();
    let nodata = dem.nodata();
    let cell_size_x = dem.cell_size_x();
    let cell_size_y = dem.cell_size_y();
    let diag = (cell_size_x * cell_size_x + cell_size_y * cell_size_y).sqrt();
    // distances follow the neighbour order of DX/DY
    let dist = [
        diag,
        cell_size_x,
        diag,
        cell_size_y,
        diag,
        cell_size_x,
        diag,
        cell_size_y,
    ];

    let mut flowdir = Array2::<u8>::zeros((rows + 2, columns + 2));
    let mut inflow = Array2::<i8>::zeros((rows + 2, columns + 2));

    // Pass 1: steepest-descent pointer, counting inflows at the receiver.
    for row in 0..rows {
        progress.checkpoint()?;
        for col in 0..columns {
            let z = dem.value(row as isize, col as isize);
            if dem.is_nodata(z) {
                continue;
            }
            let mut max_slope = f64::NEG_INFINITY;
            let mut dir = 0u8;
            for n in 0..8 {
                let zn = dem.value(row as isize + DY[n], col as isize + DX[n]);
                if dem.is_nodata(zn) {
                    continue;
                }
                let slope = (z - zn) / dist[n];
                if slope > max_slope {
                    max_slope = slope;
                    dir = n as u8 + 1;
                }
            }
            if max_slope > 0.0 {
                flowdir[(row + 1, col + 1)] = dir;
                let rn = (row as isize + DY[(dir - 1) as usize] + 1) as usize;
                let cn = (col as isize + DX[(dir - 1) as usize] + 1) as usize;
                inflow[(rn, cn)] += 1;
            }
        }
        progress.update(row + 1, rows);
    }

    // Pass 2: seed the queue with the no-inflow cells.
    let mut queue = CellQueue::with_capacity(rows.max(columns));
    let mut accumulation = dem.like(nodata);
    let mut num_solved_cells = 0usize;
    for row in 0..rows {
        for col in 0..columns {
            if dem.is_nodata(dem.value(row as isize, col as isize)) {
                num_solved_cells += 1;
                continue;
            }
            accumulation.set_value(row as isize, col as isize, 1.0);
            if inflow[(row + 1, col + 1)] == 0 {
                queue.push(row, col);
            }
        }
    }

    // Pass 3: topological sweep downslope.
    let num_cells_total = rows * columns;
    let mut enqueued = 0usize;
    while let Some((row, col)) = queue.pop() {
        progress.checkpoint()?;
        enqueued += 1;
        let dir = flowdir[(row + 1, col + 1)];
        if dir > 0 {
            let rn = row as isize + DY[(dir - 1) as usize];
            let cn = col as isize + DX[(dir - 1) as usize];
            let z = accumulation.value(row as isize, col as isize);
            let zn = accumulation.value(rn, cn);
            accumulation.set_value(rn, cn, zn + z);
            let (bi, bj) = ((rn + 1) as usize, (cn + 1) as usize);
            inflow[(bi, bj)] -= 1;
            if inflow[(bi, bj)] == 0 {
                queue.push(rn as usize, cn as usize);
            }
        }
        num_solved_cells += 1;
        progress.update(num_solved_cells, num_cells_total);
    }

    // a cycle would leave cells unvisited; a depressionless DEM has none
    if enqueued + dem.num_cells() - dem.num_valid_cells() != num_cells_total {
        return Err(Error::NumericDomain(
            "flow graph contains a cycle; run depression removal first".to_string(),
        ));
    }

    if params.ln_transform {
        ln_transform(&mut accumulation);
    }

    Ok(D8Outcome {
        accumulation,
        pointer: pointer_grid(dem, &flowdir),
    })
}

pub(crate) fn ln_transform(grid: &mut Grid) {
    let nodata = grid.nodata();
    grid.data_mut().mapv_inplace(|v| {
        if v.to_bits() == nodata.to_bits() {
            v
        } else {
            v.ln()
        }
    });
}

fn pointer_grid(dem: &Grid, flowdir: &Array2<u8>) -> Grid {
    let mut pointer = dem.like(dem.nodata());
    for row in 0..dem.rows() {
        for col in 0..dem.columns() {
            if !dem.is_nodata(dem.value(row as isize, col as isize)) {
                pointer.set_value(
                    row as isize,
                    col as isize,
                    f64::from(flowdir[(row + 1, col + 1)]),
                );
            }
        }
    }
    pointer
}
