//! Repository for per-student progress, assessment history and badge counters.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Assessment, CounterChange, StudentCounters, StudentKey, StudentProgress};

/// Storage operations for progress tracking, scoped by tenant and student.
///
/// Implementations must make `record_assessment` and `apply_counter_change`
/// atomic per student: two concurrent assessments of the same skill must
/// both count towards `attempts`.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Create or replace the progress record for one skill and append the
    /// assessment to the history. Returns the stored record.
    async fn record_assessment(
        &self,
        key: &StudentKey,
        skill_id: &str,
        level: u8,
        coach_notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<StudentProgress>;

    async fn get_progress(&self, key: &StudentKey, skill_id: &str)
        -> Result<Option<StudentProgress>>;

    async fn list_progress(&self, key: &StudentKey) -> Result<Vec<StudentProgress>>;

    /// Newest first.
    async fn recent_assessments(&self, key: &StudentKey, limit: usize) -> Result<Vec<Assessment>>;

    /// Counters for the student, created with zeroed defaults on first access.
    async fn get_or_create_counters(&self, key: &StudentKey) -> Result<StudentCounters>;

    async fn apply_counter_change(
        &self,
        key: &StudentKey,
        change: &CounterChange,
    ) -> Result<StudentCounters>;

    /// Returns true when the badge was not already earned.
    async fn add_earned_badge(&self, key: &StudentKey, badge_id: &str) -> Result<bool>;
}

#[derive(Default)]
struct MemoryState {
    progress: HashMap<(StudentKey, String), StudentProgress>,
    assessments: HashMap<StudentKey, Vec<Assessment>>,
    counters: HashMap<StudentKey, StudentCounters>,
}

/// Process-local store for tests and single-process use.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn record_assessment(
        &self,
        key: &StudentKey,
        skill_id: &str,
        level: u8,
        coach_notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<StudentProgress> {
        let mut state = self.state.lock().await;
        let notes = coach_notes.map(str::to_string);

        let record = state
            .progress
            .entry((key.clone(), skill_id.to_string()))
            .and_modify(|existing| {
                existing.current_level = level;
                existing.attempts += 1;
                existing.last_assessed = at;
                existing.coach_notes = notes.clone();
            })
            .or_insert_with(|| StudentProgress {
                student_id: key.student.clone(),
                skill_id: skill_id.to_string(),
                current_level: level,
                attempts: 1,
                last_assessed: at,
                coach_notes: notes.clone(),
            })
            .clone();

        state
            .assessments
            .entry(key.clone())
            .or_default()
            .push(Assessment {
                id: Uuid::new_v4(),
                student_id: key.student.clone(),
                skill_id: skill_id.to_string(),
                level,
                coach_notes: notes,
                assessed_at: at,
            });

        Ok(record)
    }

    async fn get_progress(
        &self,
        key: &StudentKey,
        skill_id: &str,
    ) -> Result<Option<StudentProgress>> {
        let state = self.state.lock().await;
        Ok(state
            .progress
            .get(&(key.clone(), skill_id.to_string()))
            .cloned())
    }

    async fn list_progress(&self, key: &StudentKey) -> Result<Vec<StudentProgress>> {
        let state = self.state.lock().await;
        let mut records: Vec<StudentProgress> = state
            .progress
            .iter()
            .filter(|((owner, _), _)| owner == key)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        Ok(records)
    }

    async fn recent_assessments(&self, key: &StudentKey, limit: usize) -> Result<Vec<Assessment>> {
        let state = self.state.lock().await;
        let mut history = state.assessments.get(key).cloned().unwrap_or_default();
        // Stable sort keeps insertion order for equal timestamps; reverse puts newest first.
        history.sort_by(|a, b| a.assessed_at.cmp(&b.assessed_at));
        history.reverse();
        history.truncate(limit);
        Ok(history)
    }

    async fn get_or_create_counters(&self, key: &StudentKey) -> Result<StudentCounters> {
        let mut state = self.state.lock().await;
        Ok(state.counters.entry(key.clone()).or_default().clone())
    }

    async fn apply_counter_change(
        &self,
        key: &StudentKey,
        change: &CounterChange,
    ) -> Result<StudentCounters> {
        let mut state = self.state.lock().await;
        let counters = state.counters.entry(key.clone()).or_default();
        change.apply(counters);
        Ok(counters.clone())
    }

    async fn add_earned_badge(&self, key: &StudentKey, badge_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .counters
            .entry(key.clone())
            .or_default()
            .badges_earned
            .insert(badge_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;

    fn key(student: &str) -> StudentKey {
        StudentKey::new("riverside", student)
    }

    #[test]
    fn store_is_object_safe() {
        fn _takes_boxed(_: Box<dyn ProgressStore>) {}
    }

    #[tokio::test]
    async fn repeat_assessment_replaces_in_place() {
        let store = MemoryStore::new();
        let first = Utc::now() - Duration::minutes(5);
        let second = Utc::now();

        store
            .record_assessment(&key("mia"), "ws-treading", 2, Some("needs work"), first)
            .await
            .unwrap();
        let updated = store
            .record_assessment(&key("mia"), "ws-treading", 3, None, second)
            .await
            .unwrap();

        assert_eq!(updated.attempts, 2);
        assert_eq!(updated.current_level, 3);
        assert_eq!(updated.last_assessed, second);
        assert_eq!(updated.coach_notes, None);
        assert_eq!(store.list_progress(&key("mia")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tenants_do_not_share_records() {
        let store = MemoryStore::new();
        store
            .record_assessment(&key("mia"), "en-25m", 4, None, Utc::now())
            .await
            .unwrap();

        let other = StudentKey::new("lakeside", "mia");
        assert!(store.get_progress(&other, "en-25m").await.unwrap().is_none());
        assert!(store.get_progress(&key("mia"), "en-25m").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_assessments_all_count() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for level in 1..=5u8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .record_assessment(&key("leo"), "st-backstroke", level, None, Utc::now())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store
            .get_progress(&key("leo"), "st-backstroke")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.attempts, 5);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let store = MemoryStore::new();
        let base = Utc::now();
        for (offset, skill) in ["dv-sitting", "dv-kneeling", "dv-standing"].iter().enumerate() {
            store
                .record_assessment(
                    &key("ava"),
                    skill,
                    2,
                    None,
                    base + Duration::minutes(offset as i64),
                )
                .await
                .unwrap();
        }

        let recent = store.recent_assessments(&key("ava"), 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].skill_id, "dv-standing");
        assert_eq!(recent[1].skill_id, "dv-kneeling");
    }

    #[tokio::test]
    async fn counters_default_on_first_access() {
        let store = MemoryStore::new();
        let counters = store.get_or_create_counters(&key("new")).await.unwrap();
        assert_eq!(counters, StudentCounters::default());
    }

    #[tokio::test]
    async fn earned_badges_are_idempotent() {
        let store = MemoryStore::new();
        assert!(store.add_earned_badge(&key("ava"), "first_splash").await.unwrap());
        assert!(!store.add_earned_badge(&key("ava"), "first_splash").await.unwrap());

        let counters = store.get_or_create_counters(&key("ava")).await.unwrap();
        assert_eq!(counters.badges_earned.len(), 1);
    }
}
