//! Contiguous row-range partitioning for multi-worker runs.
//!
//! Each worker owns a contiguous block of a mode's rows, computes its local
//! precision/mean contributions and reduces them with the other workers once
//! per mode per sweep. The assignment is a pure function of the row count and
//! the worker count so it can be tested without any distributed runtime.

/// Split `total_rows` into `num_workers` contiguous, near-equal block sizes.
///
/// The remainder is handed to the *first* workers: `partition(11, 5)` is
/// `[3, 2, 2, 2, 2]`, never `[2, 2, 2, 2, 3]`. Block sizes always sum to
/// `total_rows`; workers beyond `total_rows` receive empty blocks.
///
/// # Panics
///
/// Panics if `num_workers` is zero.
///
/// # Examples
///
/// ```
/// use gibbsmf_core::partition;
///
/// assert_eq!(partition(96, 3), vec![32, 32, 32]);
/// assert_eq!(partition(97, 3), vec![33, 32, 32]);
/// ```
pub fn partition(total_rows: usize, num_workers: usize) -> Vec<usize> {
    assert!(num_workers > 0, "cannot partition over zero workers");
    let base = total_rows / num_workers;
    let remainder = total_rows % num_workers;
    (0..num_workers)
        .map(|w| if w < remainder { base + 1 } else { base })
        .collect()
}

/// Starting row offset of every worker's block, plus a trailing `total_rows`
/// sentinel, so worker `w` owns `offsets[w]..offsets[w + 1]`.
pub fn partition_offsets(total_rows: usize, num_workers: usize) -> Vec<usize> {
    let sizes = partition(total_rows, num_workers);
    let mut offsets = Vec::with_capacity(num_workers + 1);
    let mut acc = 0;
    offsets.push(0);
    for s in sizes {
        acc += s;
        offsets.push(acc);
    }
    offsets
}
