use tokio_util::sync::CancellationToken;

/// Calls between two cancellation checks in [`fibonacci_until`]
const CHECK_INTERVAL: u32 = 1 << 16;

/// Compute the nth Fibonacci number with the naive recursion.
///
/// Deliberately exponential: this is the work the cache saves. Inputs below 2
/// (negatives included) are returned as is; results past `F(92)` wrap.
pub fn fibonacci(n: i64) -> i64 {
    if n <= 1 {
        return n;
    }
    fibonacci(n - 1).wrapping_add(fibonacci(n - 2))
}

/// Same as [`fibonacci`], but gives up once `cancel` fires.
///
/// Returns `None` when the computation was abandoned.
pub fn fibonacci_until(n: i64, cancel: &CancellationToken) -> Option<i64> {
    let mut budget = CHECK_INTERVAL;
    walk(n, cancel, &mut budget)
}

fn walk(n: i64, cancel: &CancellationToken, budget: &mut u32) -> Option<i64> {
    *budget -= 1;
    if *budget == 0 {
        if cancel.is_cancelled() {
            return None;
        }
        *budget = CHECK_INTERVAL;
    }

    if n <= 1 {
        return Some(n);
    }
    let a = walk(n - 1, cancel, budget)?;
    let b = walk(n - 2, cancel, budget)?;
    Some(a.wrapping_add(b))
}
