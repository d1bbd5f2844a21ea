//! Fraction-complete reporting for long sweeps

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts completed work units and forwards the completed fraction to a
/// callback.
///
/// Workers bump an atomic counter. Reporting takes a lock that covers only the
/// last reported count and the callback, and a count that is not a new maximum
/// is dropped, so the fractions a callback sees strictly increase.
pub struct ProgressCounter<'a> {
    done: AtomicUsize,
    reported: Mutex<usize>,
    total: usize,
    callback: &'a (dyn Fn(f64) + Sync),
}

impl<'a> ProgressCounter<'a> {
    pub fn new(total: usize, callback: &'a (dyn Fn(f64) + Sync)) -> Self {
        Self {
            done: AtomicUsize::new(0),
            reported: Mutex::new(0),
            total,
            callback,
        }
    }

    /// Mark one unit complete and report the new fraction
    pub fn increment(&self) {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        let mut reported = self.reported.lock().unwrap_or_else(|e| e.into_inner());
        if done > *reported {
            *reported = done;
            (self.callback)(self.fraction_of(done));
        }
    }

    /// Units completed so far
    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }

    /// Fraction complete in [0, 1]
    pub fn fraction(&self) -> f64 {
        self.fraction_of(self.completed())
    }

    fn fraction_of(&self, done: usize) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (done as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Progress callback that discards updates
pub fn ignore_progress(_fraction: f64) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParallelStrategy, ProcessingMode};
    use std::sync::Mutex;

    #[test]
    fn test_progress_reaches_one() {
        let seen = Mutex::new(Vec::new());
        let cb = |f: f64| seen.lock().unwrap().push(f);
        let counter = ProgressCounter::new(64, &cb);
        ProcessingMode::Parallel.par_for_each(0..64, |_| counter.increment());

        assert_eq!(counter.completed(), 64);
        assert!((counter.fraction() - 1.0).abs() < 1e-12);
        let seen = seen.into_inner().unwrap();
        assert!(!seen.is_empty() && seen.len() <= 64);
        assert!(seen.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn test_reports_never_decrease() {
        for _ in 0..20 {
            let seen = Mutex::new(Vec::new());
            let cb = |f: f64| seen.lock().unwrap().push(f);
            let counter = ProgressCounter::new(256, &cb);
            ProcessingMode::Parallel.par_for_each(0..256, |_| counter.increment());

            let seen = seen.into_inner().unwrap();
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "fractions went backwards: {:?}", seen);
            assert_eq!(seen.last().copied(), Some(1.0));
        }
    }

    #[test]
    fn test_empty_total() {
        let counter = ProgressCounter::new(0, &ignore_progress);
        assert_eq!(counter.fraction(), 1.0);
    }
}
