use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::error::{ProgressError, Result};
use crate::models::{OverallStats, SkillMatrixItem, SkillStatus, StudentKey, StudentProgress};
use crate::store::ProgressStore;

/// Record a coach assessment of one skill.
pub async fn update_skill_progress(
    store: &dyn ProgressStore,
    catalog: &Catalog,
    key: &StudentKey,
    skill_id: &str,
    level: u8,
    coach_notes: Option<&str>,
    at: DateTime<Utc>,
) -> Result<StudentProgress> {
    if catalog.skill(skill_id).is_none() {
        return Err(ProgressError::UnknownSkill(skill_id.to_string()));
    }
    if !(1..=5).contains(&level) {
        return Err(ProgressError::InvalidLevel(level));
    }

    let record = store
        .record_assessment(key, skill_id, level, coach_notes, at)
        .await?;
    info!(
        student = %key,
        skill = skill_id,
        level,
        attempts = record.attempts,
        "recorded assessment"
    );
    Ok(record)
}

/// One item per catalog skill, in catalog order.
pub fn build_skill_matrix(catalog: &Catalog, records: Vec<StudentProgress>) -> Vec<SkillMatrixItem> {
    let mut by_skill: HashMap<String, StudentProgress> = records
        .into_iter()
        .map(|record| (record.skill_id.clone(), record))
        .collect();

    catalog
        .skills
        .iter()
        .map(|skill| {
            let progress = by_skill.remove(&skill.id);
            SkillMatrixItem {
                status: SkillStatus::classify(progress.as_ref()),
                skill: skill.clone(),
                progress,
            }
        })
        .collect()
}

pub async fn get_student_skill_matrix(
    store: &dyn ProgressStore,
    catalog: &Catalog,
    key: &StudentKey,
) -> Result<Vec<SkillMatrixItem>> {
    let records = store.list_progress(key).await?;
    debug!(student = %key, records = records.len(), "building skill matrix");
    Ok(build_skill_matrix(catalog, records))
}

/// Skills without progress still count toward the total, so the percentage
/// only reaches 100 once every catalog skill is at level 5.
pub fn overall_stats(matrix: &[SkillMatrixItem]) -> OverallStats {
    let total: u32 = matrix.iter().map(|item| u32::from(item.skill.level)).sum();
    let earned: f64 = matrix
        .iter()
        .filter_map(|item| {
            item.progress.as_ref().map(|progress| {
                f64::from(progress.current_level) / 5.0 * f64::from(item.skill.level)
            })
        })
        .sum();

    let percentage = if total == 0 {
        0
    } else {
        (earned / f64::from(total) * 100.0).round() as u32
    };

    OverallStats {
        total_levels: total,
        earned_levels: earned.floor() as u32,
        overall_percentage: percentage,
        suggested_level: suggested_level(percentage),
    }
}

pub fn suggested_level(percentage: u32) -> u8 {
    if percentage >= 90 {
        5
    } else if percentage >= 70 {
        4
    } else if percentage >= 50 {
        3
    } else if percentage >= 30 {
        2
    } else {
        1
    }
}

pub async fn calculate_overall_level(
    store: &dyn ProgressStore,
    catalog: &Catalog,
    key: &StudentKey,
) -> Result<OverallStats> {
    let matrix = get_student_skill_matrix(store, catalog, key).await?;
    Ok(overall_stats(&matrix))
}

#[derive(Debug, Deserialize)]
struct AssessmentRow {
    student_id: String,
    skill_id: String,
    level: i64,
    coach_notes: Option<String>,
    assessed_at: Option<DateTime<Utc>>,
}

/// Apply assessments from a CSV file. Malformed rows and rows with an unknown
/// skill or a level outside 1-5 are skipped; returns the number of applied
/// rows. Only read failures abort the import.
pub async fn import_assessments(
    store: &dyn ProgressStore,
    catalog: &Catalog,
    tenant: &str,
    csv_path: &Path,
) -> Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut applied = 0usize;

    for (index, result) in reader.deserialize::<AssessmentRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                warn!(row = index + 1, error = %err, "skipping malformed assessment row");
                continue;
            }
        };
        let Ok(level) = u8::try_from(row.level) else {
            warn!(
                row = index + 1,
                level = row.level,
                "skipping assessment row with level outside 1-5"
            );
            continue;
        };
        let key = StudentKey::new(tenant, row.student_id);
        let notes = row.coach_notes.as_deref().filter(|notes| !notes.is_empty());
        let at = row.assessed_at.unwrap_or_else(Utc::now);

        match update_skill_progress(store, catalog, &key, &row.skill_id, level, notes, at).await
        {
            Ok(_) => applied += 1,
            Err(err @ (ProgressError::UnknownSkill(_) | ProgressError::InvalidLevel(_))) => {
                warn!(row = index + 1, error = %err, "skipping assessment row");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(applied)
}
