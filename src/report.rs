use std::fmt::Write;

use crate::catalog::Catalog;
use crate::models::{
    Assessment, OverallStats, Skill, SkillCategory, SkillMatrixItem, SkillStatus, StudentCounters,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    pub category: SkillCategory,
    pub total: usize,
    pub mastered: usize,
    pub in_progress: usize,
}

pub fn summarize_by_category(matrix: &[SkillMatrixItem]) -> Vec<CategorySummary> {
    SkillCategory::ALL
        .iter()
        .map(|&category| {
            let items: Vec<&SkillMatrixItem> = matrix
                .iter()
                .filter(|item| item.skill.category == category)
                .collect();
            CategorySummary {
                category,
                total: items.len(),
                mastered: items
                    .iter()
                    .filter(|item| item.status == SkillStatus::Mastered)
                    .count(),
                in_progress: items
                    .iter()
                    .filter(|item| item.status == SkillStatus::InProgress)
                    .count(),
            }
        })
        .filter(|summary| summary.total > 0)
        .collect()
}

pub struct ReportInput<'a> {
    pub student: &'a str,
    pub catalog: &'a Catalog,
    pub matrix: &'a [SkillMatrixItem],
    pub stats: &'a OverallStats,
    pub recommendations: &'a [Skill],
    pub counters: &'a StudentCounters,
    pub recent: &'a [Assessment],
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Swim Progress Report: {}", input.student);
    let _ = writeln!(
        output,
        "Suggested level {} ({}% of catalog, {} of {} levels earned)",
        input.stats.suggested_level,
        input.stats.overall_percentage,
        input.stats.earned_levels,
        input.stats.total_levels
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Skills by Category");

    for summary in summarize_by_category(input.matrix) {
        let _ = writeln!(
            output,
            "- {}: {} mastered, {} in progress, {} total",
            summary.category.label(),
            summary.mastered,
            summary.in_progress,
            summary.total
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Next Focus");

    if input.recommendations.is_empty() {
        let _ = writeln!(output, "Every skill in the catalog is mastered.");
    } else {
        for skill in input.recommendations {
            let _ = writeln!(
                output,
                "- {} ({}, level {}): {}",
                skill.name,
                skill.category.label(),
                skill.level,
                skill.description
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Badges");

    let earned: Vec<_> = input
        .catalog
        .badges
        .iter()
        .filter(|badge| input.counters.has_badge(&badge.id))
        .collect();
    if earned.is_empty() {
        let _ = writeln!(output, "No badges earned yet.");
    } else {
        for badge in earned {
            let _ = writeln!(output, "- {} {}: {}", badge.icon, badge.name, badge.description);
        }
    }
    let _ = writeln!(
        output,
        "Lessons attended: {}, distance swum: {}m",
        input.counters.lessons_attended_count, input.counters.total_distance_meters
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Coach Notes");

    let notes: Vec<&Assessment> = input
        .recent
        .iter()
        .filter(|assessment| assessment.coach_notes.is_some())
        .take(5)
        .collect();
    if notes.is_empty() {
        let _ = writeln!(output, "No coach notes recorded.");
    } else {
        for assessment in notes {
            let skill_name = input
                .catalog
                .skill(&assessment.skill_id)
                .map(|skill| skill.name.as_str())
                .unwrap_or(assessment.skill_id.as_str());
            let _ = writeln!(
                output,
                "- {} (level {}) on {}: {}",
                skill_name,
                assessment.level,
                assessment.assessed_at.date_naive(),
                assessment.coach_notes.as_deref().unwrap_or_default()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::StudentProgress;
    use crate::progress::{build_skill_matrix, overall_stats};
    use crate::recommend::recommend_from_matrix;

    fn record(skill_id: &str, level: u8) -> StudentProgress {
        StudentProgress {
            student_id: "mia".to_string(),
            skill_id: skill_id.to_string(),
            current_level: level,
            attempts: 1,
            last_assessed: Utc::now(),
            coach_notes: None,
        }
    }

    #[test]
    fn category_summary_counts_statuses() {
        let catalog = Catalog::builtin().unwrap();
        let matrix = build_skill_matrix(
            &catalog,
            vec![record("ws-submerge", 5), record("ws-treading", 2)],
        );

        let summaries = summarize_by_category(&matrix);
        assert_eq!(summaries.len(), 5);
        assert_eq!(
            summaries[0],
            CategorySummary {
                category: SkillCategory::WaterSafety,
                total: 6,
                mastered: 1,
                in_progress: 1,
            }
        );
        assert_eq!(summaries[1].mastered, 0);
    }

    #[test]
    fn report_lists_focus_badges_and_notes() {
        let catalog = Catalog::builtin().unwrap();
        let matrix = build_skill_matrix(&catalog, vec![record("ws-submerge", 5)]);
        let stats = overall_stats(&matrix);
        let recommendations = recommend_from_matrix(&matrix);
        let mut counters = StudentCounters {
            lessons_attended_count: 3,
            total_distance_meters: 150,
            ..StudentCounters::default()
        };
        counters.badges_earned.insert("first_splash".to_string());
        let recent = vec![Assessment {
            id: Uuid::new_v4(),
            student_id: "mia".to_string(),
            skill_id: "ws-submerge".to_string(),
            level: 5,
            coach_notes: Some("Blows bubbles for ten seconds".to_string()),
            assessed_at: Utc.with_ymd_and_hms(2026, 9, 14, 16, 0, 0).unwrap(),
        }];

        let report = build_report(&ReportInput {
            student: "mia",
            catalog: &catalog,
            matrix: &matrix,
            stats: &stats,
            recommendations: &recommendations,
            counters: &counters,
            recent: &recent,
        });

        assert!(report.starts_with("# Swim Progress Report: mia"));
        assert!(report.contains("- Water Safety: 1 mastered, 0 in progress, 6 total"));
        assert!(report.contains("- Safe Water Entry (Water Safety, level 1)"));
        assert!(report.contains("First Splash"));
        assert!(report.contains("Lessons attended: 3, distance swum: 150m"));
        assert!(report.contains(
            "- Submerge and Blow Bubbles (level 5) on 2026-09-14: Blows bubbles for ten seconds"
        ));
    }

    #[test]
    fn empty_sections_have_placeholders() {
        let catalog = Catalog::builtin().unwrap();
        let matrix = build_skill_matrix(&catalog, Vec::new());
        let stats = overall_stats(&matrix);

        let report = build_report(&ReportInput {
            student: "nobody",
            catalog: &catalog,
            matrix: &matrix,
            stats: &stats,
            recommendations: &[],
            counters: &StudentCounters::default(),
            recent: &[],
        });

        assert!(report.contains("Suggested level 1 (0% of catalog"));
        assert!(report.contains("No badges earned yet."));
        assert!(report.contains("No coach notes recorded."));
    }
}
