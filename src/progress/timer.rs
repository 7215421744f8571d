use crate::core::error::PersistenceError;
use crate::models::progress::{lesson_id, LessonProgress, LessonStatus, TimerState};
use crate::stores::record_store::{tables, RecordStore};
use crate::utils::time::Clock;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Per-lesson study timer.
///
/// Each lesson is either stopped or running; the running start time is
/// transient and never persisted. Cumulative `timeSpent` lives on the
/// LessonProgress record and only ever grows.
pub struct TimerTracker {
    store: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
    active: DashMap<String, i64>,
}

impl TimerTracker {
    pub fn new(store: Arc<RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            active: DashMap::new(),
        }
    }

    fn load_progress(
        &self,
        week: u32,
        day: u32,
        index: u32,
    ) -> Result<LessonProgress, PersistenceError> {
        let id = lesson_id(week, day, index);
        let record = self.store.find_one(tables::LESSON_PROGRESS, |r| {
            r.get("lessonId").and_then(Value::as_str) == Some(id.as_str())
        })?;

        Ok(record
            .as_ref()
            .and_then(LessonProgress::from_record)
            .unwrap_or_else(|| LessonProgress::new(week, day, index)))
    }

    fn persist_progress(&self, progress: &LessonProgress) -> Result<(), PersistenceError> {
        self.store
            .save(tables::LESSON_PROGRESS, progress.to_record())
            .map(|_| ())
    }

    /// Start the lesson timer. Warns and leaves everything unchanged when
    /// the timer is already running.
    pub fn start(&self, week: u32, day: u32, index: u32) -> Result<TimerState, PersistenceError> {
        let id = lesson_id(week, day, index);

        if let Some(start_time) = self.active.get(&id) {
            warn!(lesson = %id, "Timer already running, start ignored");
            return Ok(TimerState::running(*start_time));
        }

        let now = self.clock.now_millis();

        let mut progress = self.load_progress(week, day, index)?;
        if progress.status == LessonStatus::NotStarted {
            progress.status = LessonStatus::InProgress;
        }
        if progress.started_at.is_none() {
            progress.started_at = Some(now);
        }
        // Cumulative time is untouched by start
        self.persist_progress(&progress)?;

        self.active.insert(id, now);
        Ok(TimerState::running(now))
    }

    /// Stop the lesson timer, folding the elapsed session into the
    /// cumulative total. Warns and leaves `timeSpent` unchanged when no
    /// timer is running.
    pub fn stop(&self, week: u32, day: u32, index: u32) -> Result<TimerState, PersistenceError> {
        let id = lesson_id(week, day, index);

        let Some((_, start_time)) = self.active.remove(&id) else {
            warn!(lesson = %id, "Timer not running, stop ignored");
            return Ok(TimerState::stopped());
        };

        let now = self.clock.now_millis();
        // A clock that moved backwards must not shrink the total
        let session_delta = (now - start_time).max(0);

        let mut progress = self.load_progress(week, day, index)?;
        progress.time_spent += session_delta;
        self.persist_progress(&progress)?;

        Ok(TimerState::stopped())
    }

    pub fn state(&self, week: u32, day: u32, index: u32) -> TimerState {
        let id = lesson_id(week, day, index);
        match self.active.get(&id) {
            Some(start_time) => TimerState::running(*start_time),
            None => TimerState::stopped(),
        }
    }

    /// Drop all transient timer state. Called when the store scope changes
    /// so one user's running timers never bleed into another's records.
    pub fn reset(&self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::FakeClock;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        clock: Arc<FakeClock>,
        tracker: TimerTracker,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(1_000_000));
        let store = Arc::new(
            RecordStore::new(dir.path().to_path_buf(), clock.clone()).unwrap(),
        );
        let tracker = TimerTracker::new(store, clock.clone());

        Fixture {
            _dir: dir,
            clock,
            tracker,
        }
    }

    #[test]
    fn test_start_then_stop_accumulates() {
        let f = fixture();

        let state = f.tracker.start(1, 2, 0).unwrap();
        assert!(state.is_active);
        assert_eq!(state.start_time, Some(1_000_000));

        f.clock.advance(45_000);
        let state = f.tracker.stop(1, 2, 0).unwrap();
        assert!(!state.is_active);

        let progress = f.tracker.load_progress(1, 2, 0).unwrap();
        assert_eq!(progress.time_spent, 45_000);
        assert_eq!(progress.status, LessonStatus::InProgress);
        assert_eq!(progress.started_at, Some(1_000_000));
    }

    #[test]
    fn test_time_spent_accumulates_across_sessions() {
        let f = fixture();

        f.tracker.start(1, 1, 0).unwrap();
        f.clock.advance(10_000);
        f.tracker.stop(1, 1, 0).unwrap();

        f.clock.advance(60_000);

        f.tracker.start(1, 1, 0).unwrap();
        f.clock.advance(5_000);
        f.tracker.stop(1, 1, 0).unwrap();

        let progress = f.tracker.load_progress(1, 1, 0).unwrap();
        assert_eq!(progress.time_spent, 15_000);
    }

    #[test]
    fn test_double_start_keeps_original_start_time() {
        let f = fixture();

        f.tracker.start(1, 1, 0).unwrap();
        f.clock.advance(5_000);

        // Second start is a warned no-op
        let state = f.tracker.start(1, 1, 0).unwrap();
        assert_eq!(state.start_time, Some(1_000_000));

        f.clock.advance(5_000);
        f.tracker.stop(1, 1, 0).unwrap();

        let progress = f.tracker.load_progress(1, 1, 0).unwrap();
        assert_eq!(progress.time_spent, 10_000);
    }

    #[test]
    fn test_stop_without_start_is_a_no_op() {
        let f = fixture();

        f.tracker.start(1, 1, 0).unwrap();
        f.clock.advance(1_000);
        f.tracker.stop(1, 1, 0).unwrap();

        // Stopping again must not change the total
        let state = f.tracker.stop(1, 1, 0).unwrap();
        assert!(!state.is_active);

        let progress = f.tracker.load_progress(1, 1, 0).unwrap();
        assert_eq!(progress.time_spent, 1_000);
    }

    #[test]
    fn test_immediate_stop_adds_non_negative_delta() {
        let f = fixture();

        f.tracker.start(1, 1, 0).unwrap();
        f.tracker.stop(1, 1, 0).unwrap();

        let progress = f.tracker.load_progress(1, 1, 0).unwrap();
        assert_eq!(progress.time_spent, 0);
    }

    #[test]
    fn test_backwards_clock_never_shrinks_total() {
        let f = fixture();

        f.tracker.start(1, 1, 0).unwrap();
        f.clock.set(999_000);
        f.tracker.stop(1, 1, 0).unwrap();

        let progress = f.tracker.load_progress(1, 1, 0).unwrap();
        assert_eq!(progress.time_spent, 0);
    }

    #[test]
    fn test_timers_are_per_lesson() {
        let f = fixture();

        f.tracker.start(1, 1, 0).unwrap();
        f.clock.advance(10_000);
        f.tracker.start(1, 1, 1).unwrap();
        f.clock.advance(10_000);

        f.tracker.stop(1, 1, 0).unwrap();
        f.tracker.stop(1, 1, 1).unwrap();

        assert_eq!(f.tracker.load_progress(1, 1, 0).unwrap().time_spent, 20_000);
        assert_eq!(f.tracker.load_progress(1, 1, 1).unwrap().time_spent, 10_000);
    }

    #[test]
    fn test_reset_discards_running_timers() {
        let f = fixture();

        f.tracker.start(1, 1, 0).unwrap();
        f.tracker.reset();

        assert!(!f.tracker.state(1, 1, 0).is_active);

        // Stop after reset is the not-running no-op
        f.clock.advance(5_000);
        f.tracker.stop(1, 1, 0).unwrap();
        assert_eq!(f.tracker.load_progress(1, 1, 0).unwrap().time_spent, 0);
    }
}
