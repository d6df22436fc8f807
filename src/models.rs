use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one student inside one tenant (swim school).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StudentKey {
    pub tenant: String,
    pub student: String,
}

impl StudentKey {
    pub fn new(tenant: impl Into<String>, student: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            student: student.into(),
        }
    }
}

impl fmt::Display for StudentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.student)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkillCategory {
    WaterSafety,
    StrokeTechnique,
    Endurance,
    Diving,
    Competitive,
}

impl SkillCategory {
    pub const ALL: [SkillCategory; 5] = [
        SkillCategory::WaterSafety,
        SkillCategory::StrokeTechnique,
        SkillCategory::Endurance,
        SkillCategory::Diving,
        SkillCategory::Competitive,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SkillCategory::WaterSafety => "Water Safety",
            SkillCategory::StrokeTechnique => "Stroke Technique",
            SkillCategory::Endurance => "Endurance",
            SkillCategory::Diving => "Diving",
            SkillCategory::Competitive => "Competitive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub category: SkillCategory,
    /// Difficulty tier of the skill itself, 1-5.
    pub level: u8,
    pub description: String,
}

/// A student's demonstrated level on a single skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProgress {
    pub student_id: String,
    pub skill_id: String,
    pub current_level: u8,
    pub attempts: u32,
    pub last_assessed: DateTime<Utc>,
    pub coach_notes: Option<String>,
}

/// One entry in the assessment history kept alongside the progress records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub student_id: String,
    pub skill_id: String,
    pub level: u8,
    pub coach_notes: Option<String>,
    pub assessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillStatus {
    NotStarted,
    InProgress,
    Mastered,
}

pub const MASTERY_LEVEL: u8 = 4;

impl SkillStatus {
    pub fn classify(progress: Option<&StudentProgress>) -> Self {
        match progress {
            None => SkillStatus::NotStarted,
            Some(p) if p.current_level >= MASTERY_LEVEL => SkillStatus::Mastered,
            Some(_) => SkillStatus::InProgress,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SkillStatus::NotStarted => "not started",
            SkillStatus::InProgress => "in progress",
            SkillStatus::Mastered => "mastered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillMatrixItem {
    pub skill: Skill,
    pub progress: Option<StudentProgress>,
    pub status: SkillStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverallStats {
    pub total_levels: u32,
    pub earned_levels: u32,
    pub overall_percentage: u32,
    pub suggested_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeCategory {
    Attendance,
    Skill,
    Consistency,
    Milestone,
    Social,
}

/// Code-defined eligibility predicates; the catalog selects and parameterizes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BadgeRule {
    LessonsAttended { at_least: u32 },
    ConsecutiveWeeks { at_least: u32 },
    StrokeLevel { stroke: String, at_least: u8 },
    TotalDistance { meters: u32 },
    EarlyCheckIns { at_least: u32 },
    PerfectWeek,
    Referrals { at_least: u32 },
    EquipmentPurchases { at_least: u32 },
    AllOtherBadges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub category: BadgeCategory,
    /// Human-readable; the evaluated rule is `rule`.
    pub requirement: String,
    pub rule: BadgeRule,
}

/// Per-student aggregate used only for badge eligibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentCounters {
    pub lessons_attended_count: u32,
    pub consecutive_weeks_present: u32,
    /// Stroke name to demonstrated level.
    pub level: BTreeMap<String, u8>,
    pub total_distance_meters: u32,
    pub early_check_ins: u32,
    pub lessons_scheduled_this_week: u32,
    pub lessons_attended_this_week: u32,
    pub referral_count: u32,
    pub equipment_purchases: u32,
    pub badges_earned: BTreeSet<String>,
}

impl StudentCounters {
    pub fn stroke_level(&self, stroke: &str) -> u8 {
        self.level.get(stroke).copied().unwrap_or(0)
    }

    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.badges_earned.contains(badge_id)
    }
}

/// Partial update of the counters; unset fields are left untouched and
/// stroke levels are merged into the existing map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterPatch {
    pub lessons_attended_count: Option<u32>,
    pub consecutive_weeks_present: Option<u32>,
    pub stroke_levels: BTreeMap<String, u8>,
    pub total_distance_meters: Option<u32>,
    pub early_check_ins: Option<u32>,
    pub lessons_scheduled_this_week: Option<u32>,
    pub lessons_attended_this_week: Option<u32>,
    pub referral_count: Option<u32>,
    pub equipment_purchases: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterChange {
    Patch(CounterPatch),
    Attendance {
        early_check_in: bool,
        distance_meters: u32,
    },
    StartWeek {
        scheduled: u32,
    },
}

impl CounterChange {
    pub fn apply(&self, counters: &mut StudentCounters) {
        match self {
            CounterChange::Patch(patch) => {
                fn set(slot: &mut u32, value: Option<u32>) {
                    if let Some(value) = value {
                        *slot = value;
                    }
                }
                set(&mut counters.lessons_attended_count, patch.lessons_attended_count);
                set(
                    &mut counters.consecutive_weeks_present,
                    patch.consecutive_weeks_present,
                );
                set(&mut counters.total_distance_meters, patch.total_distance_meters);
                set(&mut counters.early_check_ins, patch.early_check_ins);
                set(
                    &mut counters.lessons_scheduled_this_week,
                    patch.lessons_scheduled_this_week,
                );
                set(
                    &mut counters.lessons_attended_this_week,
                    patch.lessons_attended_this_week,
                );
                set(&mut counters.referral_count, patch.referral_count);
                set(&mut counters.equipment_purchases, patch.equipment_purchases);
                for (stroke, level) in &patch.stroke_levels {
                    counters.level.insert(stroke.clone(), *level);
                }
            }
            CounterChange::Attendance {
                early_check_in,
                distance_meters,
            } => {
                counters.lessons_attended_count = counters.lessons_attended_count.saturating_add(1);
                counters.lessons_attended_this_week =
                    counters.lessons_attended_this_week.saturating_add(1);
                if *early_check_in {
                    counters.early_check_ins = counters.early_check_ins.saturating_add(1);
                }
                counters.total_distance_meters =
                    counters.total_distance_meters.saturating_add(*distance_meters);
            }
            CounterChange::StartWeek { scheduled } => {
                counters.consecutive_weeks_present = if counters.lessons_attended_this_week > 0 {
                    counters.consecutive_weeks_present.saturating_add(1)
                } else {
                    0
                };
                counters.lessons_scheduled_this_week = *scheduled;
                counters.lessons_attended_this_week = 0;
            }
        }
    }
}
