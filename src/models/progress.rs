use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl Default for LessonStatus {
    fn default() -> Self {
        LessonStatus::NotStarted
    }
}

/// Deterministic composite key for a lesson: week, day, lesson index.
pub fn lesson_id(week: u32, day: u32, index: u32) -> String {
    format!("{}-{}-{}", week, day, index)
}

/// Cumulative progress for one lesson. At most one record per lesson id;
/// writes are idempotent upserts keyed by the composite id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub lesson_id: String,
    pub week: u32,
    pub day: u32,
    pub lesson_index: u32,
    #[serde(default)]
    pub status: LessonStatus,
    /// Milliseconds, monotonically non-decreasing
    #[serde(default)]
    pub time_spent: i64,
    pub started_at: Option<i64>,
    /// Set only when status is Completed
    pub completed_at: Option<i64>,
}

impl LessonProgress {
    pub fn new(week: u32, day: u32, lesson_index: u32) -> Self {
        Self {
            lesson_id: lesson_id(week, day, lesson_index),
            week,
            day,
            lesson_index,
            status: LessonStatus::NotStarted,
            time_spent: 0,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn to_record(&self) -> Value {
        let mut doc = serde_json::to_value(self).expect("LessonProgress serializes to an object");
        doc["id"] = Value::String(self.lesson_id.clone());
        doc
    }

    pub fn from_record(doc: &Value) -> Option<Self> {
        serde_json::from_value(doc.clone()).ok()
    }
}

/// Derived view over a lesson's progress plus the transient timer fields.
/// `is_active == true` implies `start_time.is_some()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub is_active: bool,
    pub start_time: Option<i64>,
}

impl TimerState {
    pub fn stopped() -> Self {
        Self {
            is_active: false,
            start_time: None,
        }
    }

    pub fn running(start_time: i64) -> Self {
        Self {
            is_active: true,
            start_time: Some(start_time),
        }
    }
}
