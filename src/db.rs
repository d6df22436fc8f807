use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Assessment, CounterChange, CounterPatch, StudentCounters, StudentKey, StudentProgress,
};
use crate::store::ProgressStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed [`ProgressStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn level_from_db(value: i16) -> u8 {
    u8::try_from(value).unwrap_or(0)
}

fn count_from_db(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn count_to_db(value: u32) -> i64 {
    i64::from(value)
}

fn progress_from_row(row: &sqlx::postgres::PgRow) -> StudentProgress {
    StudentProgress {
        student_id: row.get("student_id"),
        skill_id: row.get("skill_id"),
        current_level: level_from_db(row.get("current_level")),
        attempts: count_from_db(row.get("attempts")),
        last_assessed: row.get("last_assessed"),
        coach_notes: row.get("coach_notes"),
    }
}

async fn ensure_counters(conn: &mut PgConnection, key: &StudentKey) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO swim_progress.student_counters (tenant_id, student_id)
        VALUES ($1, $2)
        ON CONFLICT (tenant_id, student_id) DO NOTHING
        "#,
    )
    .bind(&key.tenant)
    .bind(&key.student)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_counters(
    conn: &mut PgConnection,
    key: &StudentKey,
    for_update: bool,
) -> Result<StudentCounters> {
    let mut query = String::from(
        "SELECT lessons_attended_count, consecutive_weeks_present, stroke_levels, \
         total_distance_meters, early_check_ins, lessons_scheduled_this_week, \
         lessons_attended_this_week, referral_count, equipment_purchases \
         FROM swim_progress.student_counters \
         WHERE tenant_id = $1 AND student_id = $2",
    );
    if for_update {
        query.push_str(" FOR UPDATE");
    }

    let row = sqlx::query(&query)
        .bind(&key.tenant)
        .bind(&key.student)
        .fetch_one(&mut *conn)
        .await?;

    let badges: BTreeSet<String> = sqlx::query(
        "SELECT badge_id FROM swim_progress.earned_badges WHERE tenant_id = $1 AND student_id = $2",
    )
    .bind(&key.tenant)
    .bind(&key.student)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(|row| row.get("badge_id"))
    .collect();

    let levels: Json<BTreeMap<String, u8>> = row.get("stroke_levels");

    Ok(StudentCounters {
        lessons_attended_count: count_from_db(row.get("lessons_attended_count")),
        consecutive_weeks_present: count_from_db(row.get("consecutive_weeks_present")),
        level: levels.0,
        total_distance_meters: count_from_db(row.get("total_distance_meters")),
        early_check_ins: count_from_db(row.get("early_check_ins")),
        lessons_scheduled_this_week: count_from_db(row.get("lessons_scheduled_this_week")),
        lessons_attended_this_week: count_from_db(row.get("lessons_attended_this_week")),
        referral_count: count_from_db(row.get("referral_count")),
        equipment_purchases: count_from_db(row.get("equipment_purchases")),
        badges_earned: badges,
    })
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn record_assessment(
        &self,
        key: &StudentKey,
        skill_id: &str,
        level: u8,
        coach_notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<StudentProgress> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO swim_progress.skill_progress
            (tenant_id, student_id, skill_id, current_level, attempts, last_assessed, coach_notes)
            VALUES ($1, $2, $3, $4, 1, $5, $6)
            ON CONFLICT (tenant_id, student_id, skill_id) DO UPDATE
            SET current_level = EXCLUDED.current_level,
                attempts = swim_progress.skill_progress.attempts + 1,
                last_assessed = EXCLUDED.last_assessed,
                coach_notes = EXCLUDED.coach_notes
            RETURNING student_id, skill_id, current_level, attempts, last_assessed, coach_notes
            "#,
        )
        .bind(&key.tenant)
        .bind(&key.student)
        .bind(skill_id)
        .bind(i16::from(level))
        .bind(at)
        .bind(coach_notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO swim_progress.assessments
            (id, tenant_id, student_id, skill_id, level, coach_notes, assessed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&key.tenant)
        .bind(&key.student)
        .bind(skill_id)
        .bind(i16::from(level))
        .bind(coach_notes)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(progress_from_row(&row))
    }

    async fn get_progress(
        &self,
        key: &StudentKey,
        skill_id: &str,
    ) -> Result<Option<StudentProgress>> {
        let row = sqlx::query(
            r#"
            SELECT student_id, skill_id, current_level, attempts, last_assessed, coach_notes
            FROM swim_progress.skill_progress
            WHERE tenant_id = $1 AND student_id = $2 AND skill_id = $3
            "#,
        )
        .bind(&key.tenant)
        .bind(&key.student)
        .bind(skill_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(progress_from_row))
    }

    async fn list_progress(&self, key: &StudentKey) -> Result<Vec<StudentProgress>> {
        let rows = sqlx::query(
            r#"
            SELECT student_id, skill_id, current_level, attempts, last_assessed, coach_notes
            FROM swim_progress.skill_progress
            WHERE tenant_id = $1 AND student_id = $2
            ORDER BY skill_id
            "#,
        )
        .bind(&key.tenant)
        .bind(&key.student)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(progress_from_row).collect())
    }

    async fn recent_assessments(&self, key: &StudentKey, limit: usize) -> Result<Vec<Assessment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, skill_id, level, coach_notes, assessed_at
            FROM swim_progress.assessments
            WHERE tenant_id = $1 AND student_id = $2
            ORDER BY assessed_at DESC
            LIMIT $3
            "#,
        )
        .bind(&key.tenant)
        .bind(&key.student)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Assessment {
                id: row.get("id"),
                student_id: row.get("student_id"),
                skill_id: row.get("skill_id"),
                level: level_from_db(row.get("level")),
                coach_notes: row.get("coach_notes"),
                assessed_at: row.get("assessed_at"),
            })
            .collect())
    }

    async fn get_or_create_counters(&self, key: &StudentKey) -> Result<StudentCounters> {
        let mut conn = self.pool.acquire().await?;
        ensure_counters(&mut conn, key).await?;
        fetch_counters(&mut conn, key, false).await
    }

    async fn apply_counter_change(
        &self,
        key: &StudentKey,
        change: &CounterChange,
    ) -> Result<StudentCounters> {
        let mut tx = self.pool.begin().await?;
        ensure_counters(&mut tx, key).await?;
        let mut counters = fetch_counters(&mut tx, key, true).await?;
        change.apply(&mut counters);

        sqlx::query(
            r#"
            UPDATE swim_progress.student_counters
            SET lessons_attended_count = $3,
                consecutive_weeks_present = $4,
                stroke_levels = $5,
                total_distance_meters = $6,
                early_check_ins = $7,
                lessons_scheduled_this_week = $8,
                lessons_attended_this_week = $9,
                referral_count = $10,
                equipment_purchases = $11
            WHERE tenant_id = $1 AND student_id = $2
            "#,
        )
        .bind(&key.tenant)
        .bind(&key.student)
        .bind(count_to_db(counters.lessons_attended_count))
        .bind(count_to_db(counters.consecutive_weeks_present))
        .bind(Json(&counters.level))
        .bind(count_to_db(counters.total_distance_meters))
        .bind(count_to_db(counters.early_check_ins))
        .bind(count_to_db(counters.lessons_scheduled_this_week))
        .bind(count_to_db(counters.lessons_attended_this_week))
        .bind(count_to_db(counters.referral_count))
        .bind(count_to_db(counters.equipment_purchases))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(counters)
    }

    async fn add_earned_badge(&self, key: &StudentKey, badge_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO swim_progress.earned_badges (tenant_id, student_id, badge_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, student_id, badge_id) DO NOTHING
            "#,
        )
        .bind(&key.tenant)
        .bind(&key.student)
        .bind(badge_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Load a small demo roster into `tenant`. Students that already have
/// progress records are left alone, so re-running is a no-op.
pub async fn seed(store: &dyn ProgressStore, tenant: &str) -> anyhow::Result<()> {
    let assessed_at = Utc
        .with_ymd_and_hms(2026, 9, 14, 16, 30, 0)
        .single()
        .context("invalid seed timestamp")?;

    let mut pending = HashSet::new();
    for student in ["mia-chen", "leo-garcia"] {
        let key = StudentKey::new(tenant, student);
        if store.list_progress(&key).await?.is_empty() {
            pending.insert(student);
        } else {
            info!(student = %key, "student already seeded, skipping");
        }
    }

    let assessments = vec![
        ("mia-chen", "ws-water-entry", 5, "Confident entry from the steps"),
        ("mia-chen", "ws-submerge", 4, "Good bubbles"),
        ("mia-chen", "ws-front-float", 3, "Hips still drop after 3s"),
        ("leo-garcia", "ws-water-entry", 5, "Ready for deep end"),
        ("leo-garcia", "ws-submerge", 5, "Fully comfortable"),
        ("leo-garcia", "ws-front-float", 4, "Solid"),
        ("leo-garcia", "ws-back-float", 4, "Relaxed"),
        ("leo-garcia", "ws-treading", 4, "30s with eggbeater"),
        ("leo-garcia", "ws-reach-throw", 4, "Good judgement"),
        ("leo-garcia", "st-flutter-kick", 3, "Knees bending"),
    ];

    for (student, skill, level, note) in assessments {
        if !pending.contains(student) {
            continue;
        }
        let key = StudentKey::new(tenant, student);
        store
            .record_assessment(&key, skill, level, Some(note), assessed_at)
            .await?;
    }

    if pending.contains("leo-garcia") {
        let mut patch = CounterPatch {
            lessons_attended_count: Some(12),
            consecutive_weeks_present: Some(5),
            total_distance_meters: Some(1_450),
            early_check_ins: Some(3),
            lessons_scheduled_this_week: Some(2),
            lessons_attended_this_week: Some(2),
            ..CounterPatch::default()
        };
        patch.stroke_levels.insert("freestyle".to_string(), 3);
        patch.stroke_levels.insert("backstroke".to_string(), 2);
        store
            .apply_counter_change(
                &StudentKey::new(tenant, "leo-garcia"),
                &CounterChange::Patch(patch),
            )
            .await?;
    }

    if pending.contains("mia-chen") {
        store
            .apply_counter_change(
                &StudentKey::new(tenant, "mia-chen"),
                &CounterChange::Attendance {
                    early_check_in: true,
                    distance_meters: 100,
                },
            )
            .await?;
    }

    info!(tenant, seeded = pending.len(), "seeded demo students");
    Ok(())
}
