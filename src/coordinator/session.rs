//! Render session: the shared row cursor and cancellation flag.

use crate::worker::SceneDimensions;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Ephemeral state of one render.
///
/// Drivers run on separate threads, so the row cursor is an atomic and a
/// claim is a single `fetch_sub`: no two drivers can get the same row.
/// Cancelling swaps the cursor below zero, so no claim can succeed once
/// [`cancel`](Self::cancel) has returned.
#[derive(Debug)]
pub struct RenderSession {
    dimensions: SceneDimensions,
    next_row: AtomicI64,
    /// Rows still unclaimed when the cursor was taken away.
    abandoned: AtomicU32,
    cancelled: AtomicBool,
    started_at: Instant,
}

impl RenderSession {
    /// Start a session at the top row.
    pub fn new(dimensions: SceneDimensions) -> Self {
        Self {
            dimensions,
            next_row: AtomicI64::from(i64::from(dimensions.height) - 1),
            abandoned: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            started_at: Instant::now(),
        }
    }

    /// Dimensions of the scene being rendered.
    pub const fn dimensions(&self) -> SceneDimensions {
        self.dimensions
    }

    /// Number of rows in the scene.
    pub const fn total_rows(&self) -> u32 {
        self.dimensions.height
    }

    /// Claim the next row, highest first. `None` once all are claimed.
    pub fn claim_row(&self) -> Option<u32> {
        let row = self.next_row.fetch_sub(1, Ordering::AcqRel);
        u32::try_from(row).ok()
    }

    /// Rows not yet claimed. After a cancel, the rows that were left
    /// unclaimed at that moment.
    pub fn rows_remaining(&self) -> u32 {
        if self.is_cancelled() {
            return self.abandoned.load(Ordering::Acquire);
        }
        Self::unclaimed(self.next_row.load(Ordering::Acquire))
    }

    fn unclaimed(cursor: i64) -> u32 {
        u32::try_from(cursor + 1).unwrap_or(0)
    }

    /// Stop handing out rows. Rows claimed before this call stay claimed.
    pub fn cancel(&self) {
        let cursor = self.next_row.swap(-1, Ordering::AcqRel);
        self.abandoned.fetch_max(Self::unclaimed(cursor), Ordering::AcqRel);
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_claims_descend_to_zero() {
        let session = RenderSession::new(SceneDimensions::new(1, 4));
        let rows: Vec<_> = std::iter::from_fn(|| session.claim_row()).collect();
        assert_eq!(rows, vec![3, 2, 1, 0]);
        assert_eq!(session.claim_row(), None);
        assert_eq!(session.rows_remaining(), 0);
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let session = Arc::new(RenderSession::new(SceneDimensions::new(1, 10_000)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || std::iter::from_fn(|| session.claim_row()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for row in handle.join().unwrap() {
                assert!(seen.insert(row), "row {row} claimed twice");
            }
        }
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_cancel_flag() {
        let session = RenderSession::new(SceneDimensions::new(4, 4));
        assert!(!session.is_cancelled());
        session.cancel();
        assert!(session.is_cancelled());
        assert_eq!(session.rows_remaining(), 4);
        assert_eq!(session.total_rows(), 4);
    }

    #[test]
    fn test_no_claim_after_cancel() {
        let session = RenderSession::new(SceneDimensions::new(1, 100));
        assert_eq!(session.claim_row(), Some(99));
        // A driver that checked the flag just before the cancel landed.
        assert!(!session.is_cancelled());
        session.cancel();

        assert_eq!(session.claim_row(), None);
        assert_eq!(session.claim_row(), None);
        assert_eq!(session.rows_remaining(), 99);
    }

    #[test]
    fn test_second_cancel_keeps_abandoned_count() {
        let session = RenderSession::new(SceneDimensions::new(1, 10));
        session.claim_row();
        session.cancel();
        session.cancel();
        assert_eq!(session.rows_remaining(), 9);
    }

    #[test]
    fn test_cancel_after_last_claim_leaves_nothing() {
        let session = RenderSession::new(SceneDimensions::new(1, 2));
        while session.claim_row().is_some() {}
        session.cancel();
        assert!(session.is_cancelled());
        assert_eq!(session.rows_remaining(), 0);
    }

    #[test]
    fn test_concurrent_cancel_stops_every_claimer() {
        let session = Arc::new(RenderSession::new(SceneDimensions::new(1, 1_000_000)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || std::iter::from_fn(|| session.claim_row()).count())
            })
            .collect();
        session.cancel();
        let abandoned = session.rows_remaining();

        let claimed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(claimed + abandoned as usize, 1_000_000);
        assert_eq!(session.claim_row(), None);
    }
}
