//! FD8 multiple-flow-direction accumulation
//!
//! Each cell spreads its accumulation over every strictly lower
//! 8-neighbour, weighted by drop^p (p = 2 by default). The sweep mirrors
//! the D8 topological queue, but a cell's inflow count is the number of
//! strictly higher valid neighbours.
//!
//! The parallel variant partitions the rows across one worker per logical
//! CPU. Every worker owns one FIFO: it seeds the FIFO from its own row
//! block, pops from it alone, and re-enqueues any cell whose shared atomic
//! inflow count it decremented to zero. The accumulation grid is a flat
//! array of atomic u64 cells carrying f64 bits; the enqueued set is
//! identical to the sequential sweep, only the visit order varies.

use hydrogrid_core::grid::{DX, DY};
use hydrogrid_core::{Grid, ProgressReporter, Result};
use ndarray::Array2;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::hydrology::d8::ln_transform;
use crate::structures::{CellQueue, QueueGroup};

/// Parameters for FD8 flow accumulation
#[derive(Debug, Clone)]
pub struct Fd8Params {
    /// Flow-partition exponent on the drop.
    pub power: f64,
    /// Natural-log transform the output for display.
    pub ln_transform: bool,
    /// Run the work-queue-group variant across all logical CPUs.
    pub parallel: bool,
}

impl Default for Fd8Params {
    fn default() -> Self {
        Self {
            power: 2.0,
            ln_transform: false,
            parallel: false,
        }
    }
}

/// Compute FD8 flow accumulation over a depressionless DEM.
pub fn fd8_flow_accumulation(
    dem: &Grid,
    params: &Fd8Params,
    progress: &ProgressReporter,
) -> Result<Grid> {
    let workers = if params.parallel {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        1
    };

    let mut accumulation = if workers > 1 {
        fd8_parallel(dem, params, workers, progress)?
    } else {
        fd8_sequential(dem, params, progress)?
    };

    if params.ln_transform {
        ln_transform(&mut accumulation);
    }
    Ok(accumulation)
}

/// Weights toward every strictly lower valid neighbour of `(row, col)`.
#[inline]
fn downslope_weights(dem: &Grid, row: isize, col: isize, z: f64, power: f64) -> ([f64; 8], f64) {
    let mut weights = [0.0f64; 8];
    let mut total = 0.0;
    for n in 0..8 {
        let zn = dem.value(row + DY[n], col + DX[n]);
        if !dem.is_nodata(zn) && zn < z {
            weights[n] = (z - zn).powf(power);
            total += weights[n];
        }
    }
    (weights, total)
}

fn fd8_sequential(dem: &Grid, params: &Fd8Params, progress: &ProgressReporter) -> Result<Grid> {
    let (rows, columns) = dem.shape();
    let nodata = dem.nodata();

    let mut inflow = Array2::<u8>::zeros((rows, columns));
    let mut accumulation = dem.like(nodata);
    let mut queue = CellQueue::new();
    let num_cells_total = rows * columns;
    let mut num_solved_cells = 0usize;

    for row in 0..rows {
        progress.checkpoint()?;
        for col in 0..columns {
            let z = dem.value(row as isize, col as isize);
            if dem.is_nodata(z) {
                num_solved_cells += 1;
                continue;
            }
            let mut higher = 0u8;
            for n in 0..8 {
                let zn = dem.value(row as isize + DY[n], col as isize + DX[n]);
                if !dem.is_nodata(zn) && zn > z {
                    higher += 1;
                }
            }
            inflow[(row, col)] = higher;
            if higher == 0 {
                queue.push(row, col);
            }
            accumulation.set_value(row as isize, col as isize, 1.0);
        }
        progress.update(row + 1, rows);
    }

    while let Some((row, col)) = queue.pop() {
        progress.checkpoint()?;
        let z = dem.value(row as isize, col as isize);
        let fa = accumulation.value(row as isize, col as isize);
        let (weights, total) = downslope_weights(dem, row as isize, col as isize, z, params.power);

        if total > 0.0 {
            for n in 0..8 {
                if weights[n] == 0.0 {
                    continue;
                }
                let rn = row as isize + DY[n];
                let cn = col as isize + DX[n];
                let share = fa * (weights[n] / total);
                let current = accumulation.value(rn, cn);
                accumulation.set_value(rn, cn, current + share);
                let (ri, ci) = (rn as usize, cn as usize);
                inflow[(ri, ci)] -= 1;
                if inflow[(ri, ci)] == 0 {
                    queue.push(ri, ci);
                }
            }
        }
        num_solved_cells += 1;
        progress.update(num_solved_cells, num_cells_total);
    }

    Ok(accumulation)
}

/// Add onto an atomic f64 carried in u64 bits.
#[inline]
fn atomic_add_f64(cell: &AtomicU64, add: f64) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let next = (f64::from_bits(current) + add).to_bits();
        match cell.compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

fn fd8_parallel(
    dem: &Grid,
    params: &Fd8Params,
    workers: usize,
    progress: &ProgressReporter,
) -> Result<Grid> {
    let (rows, columns) = dem.shape();
    let nodata = dem.nodata();
    let power = params.power;

    let accumulation: Vec<AtomicU64> = (0..rows * columns)
        .map(|_| AtomicU64::new(0f64.to_bits()))
        .collect();
    let inflow: Vec<AtomicU8> = (0..rows * columns).map(|_| AtomicU8::new(0)).collect();

    // Row blocks, one per worker; the tail block absorbs the remainder.
    let block = rows.div_ceil(workers);
    let ranges: Vec<(usize, usize)> = (0..workers)
        .map(|k| (k * block, ((k + 1) * block).min(rows)))
        .filter(|(start, end)| start < end)
        .collect();

    let mut seeded = QueueGroup::new(ranges.len());

    // Pass 1: inflow counts and per-worker seeds. Row blocks are disjoint,
    // so plain stores through the atomics suffice.
    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for (k, &(row_start, row_end)) in ranges.iter().enumerate() {
            let accumulation = &accumulation;
            let inflow = &inflow;
            let progress = progress.clone();
            handles.push(scope.spawn(move || {
                let mut seeds = CellQueue::new();
                for row in row_start..row_end {
                    if progress.is_cancelled() {
                        break;
                    }
                    for col in 0..columns {
                        let idx = row * columns + col;
                        let z = dem.value(row as isize, col as isize);
                        if dem.is_nodata(z) {
                            accumulation[idx].store(nodata.to_bits(), Ordering::Relaxed);
                            continue;
                        }
                        accumulation[idx].store(1f64.to_bits(), Ordering::Relaxed);
                        let mut higher = 0u8;
                        for n in 0..8 {
                            let zn = dem.value(row as isize + DY[n], col as isize + DX[n]);
                            if !dem.is_nodata(zn) && zn > z {
                                higher += 1;
                            }
                        }
                        inflow[idx].store(higher, Ordering::Relaxed);
                        if higher == 0 {
                            seeds.push(row, col);
                        }
                    }
                }
                (k, seeds)
            }));
        }
        for handle in handles {
            let (k, seeds) = handle.join().expect("fd8 seed worker panicked");
            let mut queue = seeds;
            while let Some((row, col)) = queue.pop() {
                seeded.push(row, col, k);
            }
        }
    });
    progress.checkpoint()?;

    // Pass 2: the accumulation sweep. Workers drain their own FIFO;
    // increments and the decrement-to-zero handoff go through the shared
    // atomic grids.
    std::thread::scope(|scope| {
        for mut queue in seeded.into_queues() {
            let accumulation = &accumulation;
            let inflow = &inflow;
            let progress = progress.clone();
            scope.spawn(move || {
                while let Some((row, col)) = queue.pop() {
                    if progress.is_cancelled() {
                        return;
                    }
                    let z = dem.value(row as isize, col as isize);
                    let idx = row * columns + col;
                    let fa = f64::from_bits(accumulation[idx].load(Ordering::SeqCst));
                    let (weights, total) =
                        downslope_weights(dem, row as isize, col as isize, z, power);
                    if total <= 0.0 {
                        continue;
                    }
                    for n in 0..8 {
                        if weights[n] == 0.0 {
                            continue;
                        }
                        let rn = (row as isize + DY[n]) as usize;
                        let cn = (col as isize + DX[n]) as usize;
                        let n_idx = rn * columns + cn;
                        atomic_add_f64(&accumulation[n_idx], fa * (weights[n] / total));
                        // the previous value tells us who reached zero
                        if inflow[n_idx].fetch_sub(1, Ordering::SeqCst) == 1 {
                            queue.push(rn, cn);
                        }
                    }
                }
            });
        }
    });
    progress.checkpoint()?;

    let values: Vec<f64> = accumulation
        .into_iter()
        .map(|cell| f64::from_bits(cell.into_inner()))
        .collect();
    let mut out = Grid::from_vec(values, rows, columns, nodata)?;
    out.set_envelope(dem.envelope());
    out.set_pixel_is_area(dem.pixel_is_area());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::breach::tests::grid_from;

    #[test]
    fn test_fd8_split_three_ways() {
        // cell (1,1) has three equal drops to the southern row; each of the
        // bottom cells receives one third of its load plus its own unit
        let dem = grid_from(
            &[
                3.0, 3.0, 3.0, //
                3.0, 2.0, 3.0, //
                1.0, 1.0, 1.0,
            ],
            3,
            3,
        );
        let acc =
            fd8_flow_accumulation(&dem, &Fd8Params::default(), &ProgressReporter::silent())
                .unwrap();

        let centre_share = acc.value(1, 1) / 3.0;
        for col in 0..3 {
            let v = acc.value(2, col);
            let expected_min = 1.0 + centre_share;
            assert!(
                v >= expected_min - 1e-9,
                "bottom cell {col} should receive a third of the centre, got {v}"
            );
        }
        // symmetric corners give the flanking bottom cells equal totals
        assert!((acc.value(2, 0) - acc.value(2, 2)).abs() < 1e-12);
    }

    #[test]
    fn test_fd8_staircase_matches_d8() {
        // a 1-D staircase has a single downslope neighbour per cell, so
        // FD8 degenerates to D8
        let dem = grid_from(&[5.0, 4.0, 3.0, 2.0, 1.0], 1, 5);
        let acc =
            fd8_flow_accumulation(&dem, &Fd8Params::default(), &ProgressReporter::silent())
                .unwrap();
        for col in 0..5 {
            assert!((acc.value(0, col) - (col + 1) as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn test_fd8_parallel_matches_sequential() {
        // pseudo-random depressionless surface: strictly decreasing to the
        // south-east plus jitter small enough to keep it monotone
        let mut values = Vec::new();
        for row in 0..24 {
            for col in 0..24 {
                let jitter = ((row * 7919 + col * 104729) % 97) as f64 / 1000.0;
                values.push(200.0 - (row + col) as f64 + jitter);
            }
        }
        let dem = grid_from(&values, 24, 24);

        let sequential =
            fd8_flow_accumulation(&dem, &Fd8Params::default(), &ProgressReporter::silent())
                .unwrap();
        let parallel = fd8_flow_accumulation(
            &dem,
            &Fd8Params {
                parallel: true,
                ..Default::default()
            },
            &ProgressReporter::silent(),
        )
        .unwrap();

        let mut max_diff = 0.0f64;
        for r in 0..24 {
            for c in 0..24 {
                max_diff = max_diff.max((sequential.value(r, c) - parallel.value(r, c)).abs());
            }
        }
        // identical modulo floating-point summation order
        assert!(
            max_diff < 1e-6,
            "parallel and sequential FD8 diverged by {max_diff}"
        );
    }

    #[test]
    fn test_fd8_power_shapes_partition() {
        // with a huge exponent nearly everything follows the steepest drop
        let dem = grid_from(
            &[
                5.0, 5.0, 5.0, //
                5.0, 4.0, 5.0, //
                1.0, 3.9, 1.0,
            ],
            3,
            3,
        );
        let even = fd8_flow_accumulation(
            &dem,
            &Fd8Params {
                power: 1.0,
                ..Default::default()
            },
            &ProgressReporter::silent(),
        )
        .unwrap();
        let sharp = fd8_flow_accumulation(
            &dem,
            &Fd8Params {
                power: 10.0,
                ..Default::default()
            },
            &ProgressReporter::silent(),
        )
        .unwrap();
        // the steep corners keep more of the centre's load as p grows
        assert!(sharp.value(2, 0) > even.value(2, 0));
        // the shallow middle drop keeps less
        assert!(sharp.value(2, 1) < even.value(2, 1));
    }
}
