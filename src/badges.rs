use std::collections::HashSet;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::{ProgressError, Result};
use crate::models::{Badge, BadgeRule, StudentCounters, StudentKey};
use crate::store::ProgressStore;

/// Evaluate a badge rule against a counters snapshot. Earned state of the
/// badge itself is not considered here.
pub fn rule_satisfied(
    catalog: &Catalog,
    badge_id: &str,
    rule: &BadgeRule,
    counters: &StudentCounters,
) -> bool {
    match rule {
        BadgeRule::LessonsAttended { at_least } => counters.lessons_attended_count >= *at_least,
        BadgeRule::ConsecutiveWeeks { at_least } => {
            counters.consecutive_weeks_present >= *at_least
        }
        BadgeRule::StrokeLevel { stroke, at_least } => counters.stroke_level(stroke) >= *at_least,
        BadgeRule::TotalDistance { meters } => counters.total_distance_meters >= *meters,
        BadgeRule::EarlyCheckIns { at_least } => counters.early_check_ins >= *at_least,
        BadgeRule::PerfectWeek => {
            counters.lessons_scheduled_this_week > 0
                && counters.lessons_attended_this_week >= counters.lessons_scheduled_this_week
        }
        BadgeRule::Referrals { at_least } => counters.referral_count >= *at_least,
        BadgeRule::EquipmentPurchases { at_least } => counters.equipment_purchases >= *at_least,
        BadgeRule::AllOtherBadges => catalog
            .badges
            .iter()
            .filter(|badge| badge.id != badge_id)
            .all(|badge| counters.has_badge(&badge.id)),
    }
}

/// False for unknown or already earned badges.
pub async fn check_badge_eligibility(
    store: &dyn ProgressStore,
    catalog: &Catalog,
    key: &StudentKey,
    badge_id: &str,
) -> Result<bool> {
    let Some(badge) = catalog.badge(badge_id) else {
        debug!(student = %key, badge = badge_id, "eligibility check for unknown badge");
        return Ok(false);
    };

    let counters = store.get_or_create_counters(key).await?;
    if counters.has_badge(badge_id) {
        return Ok(false);
    }

    Ok(rule_satisfied(catalog, &badge.id, &badge.rule, &counters))
}

/// Returns true when the badge was newly awarded. Awarding an earned badge
/// is a no-op.
pub async fn award_badge(
    store: &dyn ProgressStore,
    catalog: &Catalog,
    key: &StudentKey,
    badge_id: &str,
) -> Result<bool> {
    if catalog.badge(badge_id).is_none() {
        return Err(ProgressError::UnknownBadge(badge_id.to_string()));
    }

    let inserted = store.add_earned_badge(key, badge_id).await?;
    if inserted {
        info!(student = %key, badge = badge_id, "awarded badge");
    }
    Ok(inserted)
}

/// Award every badge the student currently qualifies for and return the new
/// ones in catalog order. Badges that depend on other badges are checked
/// last so they can be earned in the same pass.
pub async fn evaluate_badges(
    store: &dyn ProgressStore,
    catalog: &Catalog,
    key: &StudentKey,
) -> Result<Vec<Badge>> {
    let mut counters = store.get_or_create_counters(key).await?;
    let (dependent, independent): (Vec<&Badge>, Vec<&Badge>) = catalog
        .badges
        .iter()
        .partition(|badge| badge.rule == BadgeRule::AllOtherBadges);

    let mut awarded = HashSet::new();
    for badge in independent.into_iter().chain(dependent) {
        if counters.has_badge(&badge.id)
            || !rule_satisfied(catalog, &badge.id, &badge.rule, &counters)
        {
            continue;
        }
        if award_badge(store, catalog, key, &badge.id).await? {
            awarded.insert(badge.id.clone());
        }
        counters.badges_earned.insert(badge.id.clone());
    }

    Ok(catalog
        .badges
        .iter()
        .filter(|badge| awarded.contains(&badge.id))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CounterChange, CounterPatch};
    use crate::store::MemoryStore;

    fn key() -> StudentKey {
        StudentKey::new("riverside", "mia")
    }

    async fn attend(store: &MemoryStore) {
        store
            .apply_counter_change(
                &key(),
                &CounterChange::Attendance {
                    early_check_in: false,
                    distance_meters: 50,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_splash_after_first_lesson() {
        let catalog = Catalog::builtin().unwrap();
        let store = MemoryStore::new();

        assert!(!check_badge_eligibility(&store, &catalog, &key(), "first_splash")
            .await
            .unwrap());
        attend(&store).await;
        assert!(check_badge_eligibility(&store, &catalog, &key(), "first_splash")
            .await
            .unwrap());

        assert!(award_badge(&store, &catalog, &key(), "first_splash").await.unwrap());
        assert!(!check_badge_eligibility(&store, &catalog, &key(), "first_splash")
            .await
            .unwrap());
        assert!(!award_badge(&store, &catalog, &key(), "first_splash").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_badge_is_never_eligible() {
        let catalog = Catalog::builtin().unwrap();
        let store = MemoryStore::new();
        attend(&store).await;

        assert!(!check_badge_eligibility(&store, &catalog, &key(), "moon_walker")
            .await
            .unwrap());
        assert!(matches!(
            award_badge(&store, &catalog, &key(), "moon_walker").await,
            Err(ProgressError::UnknownBadge(_))
        ));
    }

    #[tokio::test]
    async fn stroke_badges_read_unset_strokes_as_zero() {
        let catalog = Catalog::builtin().unwrap();
        let store = MemoryStore::new();
        assert!(!check_badge_eligibility(&store, &catalog, &key(), "freestyle_star")
            .await
            .unwrap());

        let mut patch = CounterPatch::default();
        patch.stroke_levels.insert("freestyle".to_string(), 3);
        store
            .apply_counter_change(&key(), &CounterChange::Patch(patch))
            .await
            .unwrap();
        assert!(check_badge_eligibility(&store, &catalog, &key(), "freestyle_star")
            .await
            .unwrap());
        assert!(!check_badge_eligibility(&store, &catalog, &key(), "backstroke_boss")
            .await
            .unwrap());
    }

    #[test]
    fn perfect_week_needs_a_schedule() {
        let catalog = Catalog::builtin().unwrap();
        let empty_week = StudentCounters::default();
        assert!(!rule_satisfied(&catalog, "perfect_week", &BadgeRule::PerfectWeek, &empty_week));

        let full_week = StudentCounters {
            lessons_scheduled_this_week: 2,
            lessons_attended_this_week: 2,
            ..StudentCounters::default()
        };
        assert!(rule_satisfied(&catalog, "perfect_week", &BadgeRule::PerfectWeek, &full_week));
    }

    #[tokio::test]
    async fn legend_requires_every_other_badge() {
        let catalog = Catalog::builtin().unwrap();
        let store = MemoryStore::new();

        let others: Vec<&Badge> = catalog.badges.iter().filter(|b| b.id != "legend").collect();
        for badge in others.iter().skip(1) {
            award_badge(&store, &catalog, &key(), &badge.id).await.unwrap();
        }
        assert!(!check_badge_eligibility(&store, &catalog, &key(), "legend")
            .await
            .unwrap());

        award_badge(&store, &catalog, &key(), &others[0].id).await.unwrap();
        assert!(check_badge_eligibility(&store, &catalog, &key(), "legend")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn evaluate_awards_in_one_pass() {
        let catalog = Catalog::builtin().unwrap();
        let store = MemoryStore::new();
        attend(&store).await;
        store
            .apply_counter_change(
                &key(),
                &CounterChange::Patch(CounterPatch {
                    referral_count: Some(1),
                    ..CounterPatch::default()
                }),
            )
            .await
            .unwrap();

        let awarded = evaluate_badges(&store, &catalog, &key()).await.unwrap();
        let ids: Vec<&str> = awarded.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["first_splash", "social_butterfly"]);

        assert!(evaluate_badges(&store, &catalog, &key()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn evaluate_reaches_legend_when_everything_else_qualifies() {
        let catalog = Catalog::builtin().unwrap();
        let store = MemoryStore::new();
        let mut patch = CounterPatch {
            lessons_attended_count: Some(50),
            consecutive_weeks_present: Some(12),
            total_distance_meters: Some(10_000),
            early_check_ins: Some(5),
            lessons_scheduled_this_week: Some(2),
            lessons_attended_this_week: Some(2),
            referral_count: Some(1),
            equipment_purchases: Some(1),
            ..CounterPatch::default()
        };
        for stroke in ["freestyle", "backstroke", "breaststroke"] {
            patch.stroke_levels.insert(stroke.to_string(), 3);
        }
        store
            .apply_counter_change(&key(), &CounterChange::Patch(patch))
            .await
            .unwrap();

        let awarded = evaluate_badges(&store, &catalog, &key()).await.unwrap();
        assert_eq!(awarded.len(), catalog.badges.len());
        assert_eq!(awarded.last().map(|b| b.id.as_str()), Some("legend"));
    }
}
