//! Next-focus skill recommendations.
//!
//! Rules run in order. A terminal rule that selects anything ends the
//! cascade with its own picks; the remaining rules each contribute to a
//! shared list capped at [`MAX_RECOMMENDATIONS`]. Water safety gates strokes,
//! and strokes gate endurance and competitive work.

use tracing::debug;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::models::{Skill, SkillCategory, SkillMatrixItem, SkillStatus, StudentKey};
use crate::progress::get_student_skill_matrix;
use crate::store::ProgressStore;

pub const MAX_RECOMMENDATIONS: usize = 3;

struct Rule {
    name: &'static str,
    terminal: bool,
    select: fn(&[SkillMatrixItem]) -> Vec<Skill>,
}

const RULES: &[Rule] = &[
    Rule {
        name: "water-safety-first",
        terminal: true,
        select: unmastered_water_safety,
    },
    Rule {
        name: "introduce-strokes",
        terminal: true,
        select: unstarted_strokes,
    },
    Rule {
        name: "refine-weakest-stroke",
        terminal: false,
        select: weakest_stroke_in_progress,
    },
    Rule {
        name: "build-endurance",
        terminal: false,
        select: next_endurance,
    },
    Rule {
        name: "try-competitive",
        terminal: false,
        select: first_unstarted_competitive,
    },
];

fn in_category(
    matrix: &[SkillMatrixItem],
    category: SkillCategory,
) -> impl Iterator<Item = &SkillMatrixItem> {
    matrix
        .iter()
        .filter(move |item| item.skill.category == category)
}

/// Up to two, easiest first.
fn unmastered_water_safety(matrix: &[SkillMatrixItem]) -> Vec<Skill> {
    let mut skills: Vec<&Skill> = in_category(matrix, SkillCategory::WaterSafety)
        .filter(|item| item.status != SkillStatus::Mastered)
        .map(|item| &item.skill)
        .collect();
    skills.sort_by_key(|skill| skill.level);
    skills.into_iter().take(2).cloned().collect()
}

fn unstarted_strokes(matrix: &[SkillMatrixItem]) -> Vec<Skill> {
    in_category(matrix, SkillCategory::StrokeTechnique)
        .filter(|item| item.status == SkillStatus::NotStarted)
        .take(MAX_RECOMMENDATIONS)
        .map(|item| item.skill.clone())
        .collect()
}

fn weakest_stroke_in_progress(matrix: &[SkillMatrixItem]) -> Vec<Skill> {
    in_category(matrix, SkillCategory::StrokeTechnique)
        .filter(|item| item.status == SkillStatus::InProgress)
        .min_by_key(|item| item.skill.level)
        .map(|item| item.skill.clone())
        .into_iter()
        .collect()
}

fn next_endurance(matrix: &[SkillMatrixItem]) -> Vec<Skill> {
    in_category(matrix, SkillCategory::Endurance)
        .find(|item| item.status != SkillStatus::Mastered)
        .map(|item| item.skill.clone())
        .into_iter()
        .collect()
}

fn first_unstarted_competitive(matrix: &[SkillMatrixItem]) -> Vec<Skill> {
    in_category(matrix, SkillCategory::Competitive)
        .find(|item| item.status == SkillStatus::NotStarted)
        .map(|item| item.skill.clone())
        .into_iter()
        .collect()
}

pub fn recommend_from_matrix(matrix: &[SkillMatrixItem]) -> Vec<Skill> {
    let mut picks: Vec<Skill> = Vec::new();

    for rule in RULES {
        if picks.len() >= MAX_RECOMMENDATIONS {
            break;
        }

        let selected = (rule.select)(matrix);
        if selected.is_empty() {
            continue;
        }
        debug!(rule = rule.name, selected = selected.len(), "recommendation rule matched");

        if rule.terminal {
            return selected.into_iter().take(MAX_RECOMMENDATIONS).collect();
        }

        let room = MAX_RECOMMENDATIONS - picks.len();
        picks.extend(selected.into_iter().take(room));
    }

    picks
}

pub async fn get_skill_recommendations(
    store: &dyn ProgressStore,
    catalog: &Catalog,
    key: &StudentKey,
) -> Result<Vec<Skill>> {
    let matrix = get_student_skill_matrix(store, catalog, key).await?;
    Ok(recommend_from_matrix(&matrix))
}
