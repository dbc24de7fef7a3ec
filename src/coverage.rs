//! Unique base-pair coverage of a set of possibly overlapping intervals.

/// Total number of unique positions covered by half-open `(start, end)`
/// intervals. Order of the input does not matter.
pub fn unique_coverage(intervals: &[(u64, u64)]) -> u64 {
    let mut sorted = intervals.to_vec();
    sorted.sort_unstable_by_key(|&(start, _)| start);

    let mut iter = sorted.into_iter();
    let Some((mut cur_start, mut cur_end)) = iter.next() else {
        return 0;
    };

    let mut total = 0;
    for (start, end) in iter {
        if start < cur_end {
            cur_end = cur_end.max(end);
        } else {
            total += cur_end.saturating_sub(cur_start);
            cur_start = start;
            cur_end = end;
        }
    }
    total + cur_end.saturating_sub(cur_start)
}

/// Percentage of `query_len` covered, rounded to two decimals.
pub fn coverage_pct(covered: u64, query_len: u64) -> f64 {
    if query_len == 0 {
        return 0.0;
    }
    let pct = covered as f64 / query_len as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
