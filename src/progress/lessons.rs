use crate::core::error::{EngineError, SessionError};
use crate::core::state::Engine;
use crate::models::progress::{lesson_id, LessonProgress, LessonStatus, TimerState};
use crate::stores::record_store::tables;
use serde_json::Value;
use tracing::debug;

impl Engine {
    fn require_login(&self) -> Result<(), EngineError> {
        if self.current_session().is_none() {
            return Err(SessionError::NotLoggedIn.into());
        }
        Ok(())
    }

    fn find_progress(&self, id: &str) -> Result<Option<LessonProgress>, EngineError> {
        let record = self.store.find_one(tables::LESSON_PROGRESS, |r| {
            r.get("lessonId").and_then(Value::as_str) == Some(id)
        })?;
        Ok(record.as_ref().and_then(LessonProgress::from_record))
    }

    pub fn get_progress(&self, week: u32, day: u32, index: u32) -> Result<Option<LessonProgress>, EngineError> {
        self.find_progress(&lesson_id(week, day, index))
    }

    pub fn all_progress(&self) -> Result<Vec<LessonProgress>, EngineError> {
        let records = self.store.get_all(tables::LESSON_PROGRESS)?;
        Ok(records
            .iter()
            .filter_map(LessonProgress::from_record)
            .collect())
    }

    /// Upsert a lesson's progress outright. Cumulative time never shrinks:
    /// the stored value is the maximum of the existing and provided totals.
    pub fn save_progress(
        &self,
        week: u32,
        day: u32,
        index: u32,
        status: LessonStatus,
        time_spent: i64,
    ) -> Result<LessonProgress, EngineError> {
        self.require_login()?;

        let id = lesson_id(week, day, index);
        let now = self.clock.now_millis();

        let mut progress = self
            .find_progress(&id)?
            .unwrap_or_else(|| LessonProgress::new(week, day, index));

        progress.status = status;
        progress.time_spent = progress.time_spent.max(time_spent.max(0));

        match status {
            LessonStatus::NotStarted => {
                progress.completed_at = None;
            }
            LessonStatus::InProgress => {
                progress.completed_at = None;
                if progress.started_at.is_none() {
                    progress.started_at = Some(now);
                }
            }
            LessonStatus::Completed => {
                if progress.started_at.is_none() {
                    progress.started_at = Some(now);
                }
                if progress.completed_at.is_none() {
                    progress.completed_at = Some(now);
                }
            }
        }

        self.store
            .save(tables::LESSON_PROGRESS, progress.to_record())?;

        Ok(progress)
    }

    /// Flip a lesson between completed and its prior state. Toggling twice
    /// restores the original status: a lesson that had been started falls
    /// back to in-progress, an untouched one to not-started.
    pub fn toggle_lesson(
        &self,
        week: u32,
        day: u32,
        index: u32,
    ) -> Result<LessonProgress, EngineError> {
        self.require_login()?;

        let id = lesson_id(week, day, index);
        let now = self.clock.now_millis();

        let mut progress = self
            .find_progress(&id)?
            .unwrap_or_else(|| LessonProgress::new(week, day, index));

        match progress.status {
            LessonStatus::Completed => {
                progress.status = if progress.started_at.is_some() {
                    LessonStatus::InProgress
                } else {
                    LessonStatus::NotStarted
                };
                progress.completed_at = None;
            }
            LessonStatus::NotStarted | LessonStatus::InProgress => {
                progress.status = LessonStatus::Completed;
                progress.completed_at = Some(now);
            }
        }

        self.store
            .save(tables::LESSON_PROGRESS, progress.to_record())?;
        debug!(lesson = %id, status = ?progress.status, "Toggled lesson");

        Ok(progress)
    }

    /// Start the study timer for a lesson. No-op when already running.
    pub fn start_timer(&self, week: u32, day: u32, index: u32) -> Result<TimerState, EngineError> {
        self.require_login()?;
        Ok(self.timers.start(week, day, index)?)
    }

    /// Stop the study timer, folding the elapsed time into the total.
    /// No-op when not running.
    pub fn stop_timer(&self, week: u32, day: u32, index: u32) -> Result<TimerState, EngineError> {
        self.require_login()?;
        Ok(self.timers.stop(week, day, index)?)
    }

    pub fn timer_state(&self, week: u32, day: u32, index: u32) -> TimerState {
        self.timers.state(week, day, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::fingerprint::{EnvironmentSignals, FixedFingerprintSource};
    use crate::core::config::Config;
    use crate::models::user::Role;
    use crate::sync::remote::testing::MemoryRemoteStore;
    use crate::sync::remote::RemoteStore;
    use crate::utils::time::FakeClock;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        clock: Arc<FakeClock>,
        remote: Arc<MemoryRemoteStore>,
        engine: Arc<Engine>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = Config::for_data_dir(dir.path().to_path_buf());
        config.sync.enabled = true;

        let clock = Arc::new(FakeClock::new(1_000_000));
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = Engine::with_parts(
            config,
            clock.clone(),
            Arc::new(FixedFingerprintSource(EnvironmentSignals {
                surface: "800x600x24".to_string(),
                locale: "en_US".to_string(),
                timezone_offset_minutes: 0,
                agent: "TestAgent/1.0".to_string(),
            })),
            remote.clone(),
        )
        .unwrap();

        engine.register("alice", "pw1234", Role::User);
        engine.login("alice", "pw1234");

        Fixture {
            _dir: dir,
            clock,
            remote,
            engine,
        }
    }

    #[test]
    fn test_save_then_get_round_trip() {
        let f = fixture();

        f.engine
            .save_progress(2, 3, 1, LessonStatus::Completed, 1_200)
            .unwrap();

        let progress = f.engine.get_progress(2, 3, 1).unwrap().unwrap();
        assert_eq!(progress.status, LessonStatus::Completed);
        assert_eq!(progress.time_spent, 1_200);
        assert!(progress.completed_at.is_some());
    }

    #[test]
    fn test_upsert_is_idempotent_per_lesson() {
        let f = fixture();

        f.engine
            .save_progress(1, 1, 0, LessonStatus::InProgress, 100)
            .unwrap();
        f.engine
            .save_progress(1, 1, 0, LessonStatus::Completed, 500)
            .unwrap();

        // Still a single record for the composite key
        assert_eq!(f.engine.all_progress().unwrap().len(), 1);
        let progress = f.engine.get_progress(1, 1, 0).unwrap().unwrap();
        assert_eq!(progress.status, LessonStatus::Completed);
        assert_eq!(progress.time_spent, 500);
    }

    #[test]
    fn test_time_spent_never_decreases() {
        let f = fixture();

        f.engine
            .save_progress(1, 1, 0, LessonStatus::InProgress, 900)
            .unwrap();
        let progress = f.engine
            .save_progress(1, 1, 0, LessonStatus::InProgress, 300)
            .unwrap();

        assert_eq!(progress.time_spent, 900);
    }

    #[test]
    fn test_double_toggle_restores_status() {
        let f = fixture();

        // From untouched
        f.engine.toggle_lesson(1, 1, 0).unwrap();
        let progress = f.engine.toggle_lesson(1, 1, 0).unwrap();
        assert_eq!(progress.status, LessonStatus::NotStarted);
        assert!(progress.completed_at.is_none());

        // From in-progress
        f.engine
            .save_progress(1, 1, 1, LessonStatus::InProgress, 0)
            .unwrap();
        f.engine.toggle_lesson(1, 1, 1).unwrap();
        let progress = f.engine.toggle_lesson(1, 1, 1).unwrap();
        assert_eq!(progress.status, LessonStatus::InProgress);
    }

    #[test]
    fn test_toggle_stamps_completed_at() {
        let f = fixture();

        f.clock.advance(5_000);
        let progress = f.engine.toggle_lesson(1, 2, 0).unwrap();
        assert_eq!(progress.status, LessonStatus::Completed);
        assert_eq!(progress.completed_at, Some(1_005_000));
    }

    #[test]
    fn test_timer_flows_through_engine() {
        let f = fixture();

        f.engine.start_timer(1, 1, 0).unwrap();
        assert!(f.engine.timer_state(1, 1, 0).is_active);

        f.clock.advance(30_000);
        f.engine.stop_timer(1, 1, 0).unwrap();

        let progress = f.engine.get_progress(1, 1, 0).unwrap().unwrap();
        assert_eq!(progress.time_spent, 30_000);
        assert_eq!(progress.status, LessonStatus::InProgress);
    }

    #[test]
    fn test_progress_is_scoped_per_user() {
        let f = fixture();

        f.engine
            .save_progress(1, 1, 0, LessonStatus::Completed, 100)
            .unwrap();

        // A different user sees an empty progress table
        f.engine.logout();
        f.engine.register("bob", "pw1234", Role::User);
        f.engine.login("bob", "pw1234");
        assert!(f.engine.all_progress().unwrap().is_empty());

        // Alice's record is still there when she returns
        f.engine.logout();
        f.engine.login("alice", "pw1234");
        assert_eq!(f.engine.all_progress().unwrap().len(), 1);
    }

    #[test]
    fn test_mutations_require_login() {
        let f = fixture();
        f.engine.logout();

        assert!(matches!(
            f.engine.save_progress(1, 1, 0, LessonStatus::Completed, 0),
            Err(EngineError::Session(SessionError::NotLoggedIn))
        ));
        assert!(matches!(
            f.engine.toggle_lesson(1, 1, 0),
            Err(EngineError::Session(SessionError::NotLoggedIn))
        ));
        assert!(matches!(
            f.engine.start_timer(1, 1, 0),
            Err(EngineError::Session(SessionError::NotLoggedIn))
        ));
    }

    #[tokio::test]
    async fn test_progress_replicates_under_scoped_key() {
        let f = fixture();

        f.engine
            .save_progress(1, 1, 0, LessonStatus::Completed, 100)
            .unwrap();
        f.engine.sync().flush().await;

        let doc = f
            .remote
            .get("lesson_progress__alice", "1-1-0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["status"], "completed");
    }
}
