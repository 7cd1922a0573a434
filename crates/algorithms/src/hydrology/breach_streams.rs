//! Stream-aware depression breaching
//!
//! Breaches a DEM with a companion stream mask. Stream cells always drain
//! ahead of non-stream cells at any elevation, so carved channels follow
//! the mapped network, and while a trace walks back along a stream it keeps
//! the channel below the lowest adjacent bank so flow cannot leave the
//! stream sideways. A stream pit without a lower stream neighbour and
//! without a non-stream outlet is left unbreached and counted unresolved.

use hydrogrid_core::grid::{BACKLINK, DX, DY};
use hydrogrid_core::{Error, Grid, ProgressReporter, Result};
use ndarray::Array2;

use crate::hydrology::breach::BreachOutcome;
use crate::structures::{ElevationScale, GridCell, IndexedPriorityQueue};

/// Breach depressions along a stream network.
///
/// `streams` must be conformant to `dem`; a cell is a stream cell when its
/// mask value is valid and positive.
pub fn breach_streams(
    dem: &Grid,
    streams: &Grid,
    progress: &ProgressReporter,
) -> Result<BreachOutcome> {
    let (rows, columns) = dem.shape();
    if streams.shape() != (rows, columns) {
        return Err(Error::DimensionMismatch {
            er: rows,
            ec: columns,
            ar: streams.rows(),
            ac: streams.columns(),
        });
    }

    let nodata = dem.nodata();
    let (min, max) = dem
        .min_max()
        .ok_or_else(|| Error::NumericDomain("DEM holds no valid cells".to_string()))?;
    let scale = ElevationScale::from_range(min, max);
    let small_num = scale.increment() * 10.0;

    let is_stream = |row: isize, col: isize| -> bool {
        let s = streams.value(row, col);
        !streams.is_nodata(s) && s > 0.0
    };

    let mut output = Array2::from_elem((rows + 2, columns + 2), nodata);
    let mut pits = Array2::from_elem((rows + 2, columns + 2), false);
    let mut in_queue = Array2::from_elem((rows + 2, columns + 2), false);
    let mut flowdir = Array2::<u8>::zeros((rows + 2, columns + 2));
    let mut queue = IndexedPriorityQueue::new();

    let mut num_pits = 0usize;
    let mut num_pits_solved = 0usize;
    let num_cells_total = rows * columns;
    let mut num_solved_cells = 0usize;

    // Pit and edge scan. A stream cell only stops being a pit when it has
    // a lower *stream* neighbour; for bank cells any lower neighbour does.
    for row in 0..rows {
        progress.checkpoint()?;
        for col in 0..columns {
            let z = dem.value(row as isize, col as isize);
            output[(row + 1, col + 1)] = z;
            if dem.is_nodata(z) {
                num_solved_cells += 1;
                continue;
            }
            let on_stream = is_stream(row as isize, col as isize);
            let mut is_pit = true;
            let mut is_edge = false;
            let mut lowest_neighbour = f64::INFINITY;
            for n in 0..8 {
                let rn = row as isize + DY[n];
                let cn = col as isize + DX[n];
                let zn = dem.value(rn, cn);
                if dem.is_nodata(zn) {
                    is_edge = true;
                } else if zn < z {
                    if !on_stream || is_stream(rn, cn) {
                        is_pit = false;
                    } else if zn < lowest_neighbour {
                        lowest_neighbour = zn;
                    }
                } else if zn < lowest_neighbour {
                    lowest_neighbour = zn;
                }
            }

            if is_edge {
                queue.push(
                    GridCell::new(row + 1, col + 1, 0),
                    scale.stream_key(z, on_stream),
                );
                in_queue[(row + 1, col + 1)] = true;
            }
            if is_pit {
                if !is_edge {
                    pits[(row + 1, col + 1)] = true;
                    num_pits += 1;
                }
                // pit pre-lowering stays off the stream so carved channels
                // keep their mapped elevations as anchors
                if lowest_neighbour.is_finite() && !on_stream {
                    output[(row + 1, col + 1)] = lowest_neighbour - small_num;
                }
            }
        }
        progress.update(row + 1, rows);
    }

    let nd_bits = nodata.to_bits();
    while num_pits_solved < num_pits && !queue.is_empty() {
        progress.checkpoint()?;
        let gc = queue.pop();
        for n in 0..8 {
            let rn = (gc.row as isize + DY[n]) as usize;
            let cn = (gc.col as isize + DX[n]) as usize;
            let zn = output[(rn, cn)];
            if zn.to_bits() == nd_bits || in_queue[(rn, cn)] {
                continue;
            }
            flowdir[(rn, cn)] = BACKLINK[n];
            if pits[(rn, cn)] {
                num_pits_solved += 1;

                // trace backward, holding the channel under the banks while
                // it runs along the stream
                let mut z_test = zn;
                let (mut r, mut c) = (rn, cn);
                loop {
                    z_test -= small_num;
                    if is_stream(r as isize - 1, c as isize - 1) {
                        let mut lowest_bank = f64::INFINITY;
                        for m in 0..8 {
                            let rb = (r as isize + DY[m]) as usize;
                            let cb = (c as isize + DX[m]) as usize;
                            let zb = output[(rb, cb)];
                            if !is_stream(rb as isize - 1, cb as isize - 1)
                                && zb.to_bits() != nd_bits
                                && zb < lowest_bank
                            {
                                lowest_bank = zb;
                            }
                        }
                        if lowest_bank < z_test {
                            z_test = lowest_bank - small_num;
                        }
                    }
                    let dir = flowdir[(r, c)];
                    if dir == 0 {
                        break;
                    }
                    r = (r as isize + DY[(dir - 1) as usize]) as usize;
                    c = (c as isize + DX[(dir - 1) as usize]) as usize;
                    let z = output[(r, c)];
                    if z <= z_test || z.to_bits() == nd_bits {
                        break;
                    }
                    output[(r, c)] = z_test;
                }
            }
            num_solved_cells += 1;
            let flat = if pits[(rn, cn)] {
                gc.flat_index + 1
            } else {
                0
            };
            let stream_cell = is_stream(rn as isize - 1, cn as isize - 1);
            queue.push(
                GridCell::new(rn, cn, flat),
                scale.stream_key(zn, stream_cell) + (flat as i64 % 10_000),
            );
            in_queue[(rn, cn)] = true;
        }
        progress.update(num_solved_cells, num_cells_total);
    }

    // pits the queue could not reach stay unresolved
    let num_unsolved_pits = num_pits - num_pits_solved;

    let mut out = dem.like(nodata);
    for row in 0..rows {
        for col in 0..columns {
            out.set_value(row as isize, col as isize, output[(row + 1, col + 1)]);
        }
    }
    Ok(BreachOutcome {
        dem: out,
        num_pits,
        num_pits_solved,
        num_unsolved_pits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::breach::tests::{assert_depressionless, grid_from, NODATA};

    fn stream_mask(values: &[f64], rows: usize, columns: usize) -> Grid {
        let mut mask = Grid::from_vec(values.to_vec(), rows, columns, NODATA).unwrap();
        mask.set_nodata(NODATA);
        mask
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let dem = grid_from(&[1.0; 9], 3, 3);
        let streams = stream_mask(&[0.0; 4], 2, 2);
        assert!(matches!(
            breach_streams(&dem, &streams, &ProgressReporter::silent()),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_stream_pit_breached_along_stream() {
        // a stream runs down the middle column with a pit halfway
        let dem = grid_from(
            &[
                9.0, 5.0, 9.0, //
                9.0, 2.0, 9.0, // pit on the stream
                9.0, 4.0, 9.0, //
                9.0, 3.0, 9.0, //
                9.0, 1.0, 9.0,
            ],
            5,
            3,
        );
        let streams = stream_mask(
            &[
                0.0, 1.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 1.0, 0.0,
            ],
            5,
            3,
        );

        let outcome = breach_streams(&dem, &streams, &ProgressReporter::silent()).unwrap();
        assert_eq!(outcome.num_pits, 1);
        assert_eq!(outcome.num_pits_solved, 1);
        // the blocking stream cell at (2,1) is carved below the pit
        assert!(
            outcome.dem.value(2, 1) < 2.0,
            "stream channel not carved: {}",
            outcome.dem.value(2, 1)
        );
        assert_depressionless(&outcome.dem);
    }

    #[test]
    fn test_off_stream_behaviour_matches_plain_breach() {
        // with an empty mask the variant reduces to ordinary breaching
        let dem = grid_from(
            &[
                9.0, 9.0, 9.0, 9.0, 9.0, //
                9.0, 5.0, 5.0, 5.0, 9.0, //
                9.0, 5.0, 1.0, 5.0, 9.0, //
                9.0, 5.0, 5.0, 5.0, 9.0, //
                9.0, 9.0, 9.0, 9.0, 9.0,
            ],
            5,
            5,
        );
        let streams = stream_mask(&[0.0; 25], 5, 5);
        let outcome = breach_streams(&dem, &streams, &ProgressReporter::silent()).unwrap();
        assert_eq!(outcome.num_pits_solved, outcome.num_pits);
        assert_depressionless(&outcome.dem);
    }
}
