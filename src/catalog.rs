//! Skill and badge catalog.
//!
//! The catalog is versioned data rather than code: an embedded default ships
//! with the binary and a TOML file can replace it at startup. File order is
//! catalog order.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{ProgressError, Result};
use crate::models::{Badge, BadgeRule, Skill, SkillCategory};

const DEFAULT_CATALOG: &str = include_str!("../catalog/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub version: u32,
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub badges: Vec<Badge>,
}

impl Catalog {
    pub fn builtin() -> Result<Self> {
        parse_catalog(DEFAULT_CATALOG)
    }

    /// Load from `path` when given, otherwise the embedded default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => load_catalog_from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn skill(&self, id: &str) -> Option<&Skill> {
        self.skills.iter().find(|skill| skill.id == id)
    }

    pub fn badge(&self, id: &str) -> Option<&Badge> {
        self.badges.iter().find(|badge| badge.id == id)
    }

    pub fn skills_in(&self, category: SkillCategory) -> impl Iterator<Item = &Skill> {
        self.skills
            .iter()
            .filter(move |skill| skill.category == category)
    }
}

pub fn load_catalog_from_file(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)?;
    let catalog = parse_catalog(&content)?;
    info!(
        path = %path.display(),
        version = catalog.version,
        skills = catalog.skills.len(),
        badges = catalog.badges.len(),
        "loaded catalog"
    );
    Ok(catalog)
}

pub fn parse_catalog(content: &str) -> Result<Catalog> {
    let catalog: Catalog = toml::from_str(content)
        .map_err(|e| ProgressError::Catalog(format!("invalid catalog TOML: {e}")))?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

pub fn validate_catalog(catalog: &Catalog) -> Result<()> {
    if catalog.skills.is_empty() {
        return Err(ProgressError::Catalog("catalog has no skills".into()));
    }

    let mut seen = HashSet::new();
    for skill in &catalog.skills {
        if skill.id.trim().is_empty() {
            return Err(ProgressError::Catalog("skill with empty id".into()));
        }
        if !seen.insert(skill.id.as_str()) {
            return Err(ProgressError::Catalog(format!("duplicate skill id {}", skill.id)));
        }
        if !(1..=5).contains(&skill.level) {
            return Err(ProgressError::Catalog(format!(
                "skill {} has level {} outside 1-5",
                skill.id, skill.level
            )));
        }
    }

    let mut seen = HashSet::new();
    for badge in &catalog.badges {
        if badge.id.trim().is_empty() {
            return Err(ProgressError::Catalog("badge with empty id".into()));
        }
        if !seen.insert(badge.id.as_str()) {
            return Err(ProgressError::Catalog(format!("duplicate badge id {}", badge.id)));
        }
        if let BadgeRule::StrokeLevel { at_least, .. } = badge.rule {
            if !(1..=5).contains(&at_least) {
                return Err(ProgressError::Catalog(format!(
                    "badge {} requires stroke level {} outside 1-5",
                    badge.id, at_least
                )));
            }
        }
        if badge.rule == BadgeRule::AllOtherBadges && catalog.badges.len() < 2 {
            return Err(ProgressError::Catalog(format!(
                "badge {} requires all other badges but the catalog has none",
                badge.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::models::BadgeCategory;

    #[test]
    fn builtin_catalog_has_expected_shape() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.skills.len(), 27);
        assert_eq!(catalog.badges.len(), 15);
        for category in SkillCategory::ALL {
            assert!(catalog.skills_in(category).count() > 0, "{category:?} empty");
        }
        assert_eq!(catalog.skills_in(SkillCategory::WaterSafety).count(), 6);
        assert_eq!(catalog.skills_in(SkillCategory::StrokeTechnique).count(), 8);
    }

    #[test]
    fn builtin_badges_parse_rules() {
        let catalog = Catalog::builtin().unwrap();
        let first = catalog.badge("first_splash").unwrap();
        assert_eq!(first.category, BadgeCategory::Attendance);
        assert_eq!(first.rule, BadgeRule::LessonsAttended { at_least: 1 });
        assert_eq!(
            catalog.badge("freestyle_star").unwrap().rule,
            BadgeRule::StrokeLevel {
                stroke: "freestyle".to_string(),
                at_least: 3
            }
        );
        assert_eq!(catalog.badge("legend").unwrap().rule, BadgeRule::AllOtherBadges);
        assert!(catalog.badge("nope").is_none());
    }

    #[test]
    fn rejects_duplicate_skill_ids() {
        let toml = r#"
version = 1

[[skills]]
id = "a"
name = "A"
category = "diving"
level = 1
description = ""

[[skills]]
id = "a"
name = "A again"
category = "diving"
level = 2
description = ""
"#;
        let err = parse_catalog(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate skill id a"));
    }

    #[test]
    fn rejects_out_of_range_skill_level() {
        let toml = r#"
version = 1

[[skills]]
id = "a"
name = "A"
category = "endurance"
level = 6
description = ""
"#;
        assert!(matches!(parse_catalog(toml), Err(ProgressError::Catalog(_))));
    }

    #[test]
    fn rejects_empty_skill_list() {
        assert!(parse_catalog("version = 2\nskills = []\n").is_err());
    }

    #[test]
    fn loads_override_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
version = 7

[[skills]]
id = "ws-only"
name = "Only"
category = "water-safety"
level = 1
description = "single skill"
"#
        )
        .unwrap();

        let catalog = Catalog::load(Some(file.path())).unwrap();
        assert_eq!(catalog.version, 7);
        assert_eq!(catalog.skills.len(), 1);
        assert!(catalog.badges.is_empty());
    }

    #[test]
    fn rejects_all_other_badges_without_other_badges() {
        let toml = r#"
version = 1

[[skills]]
id = "a"
name = "A"
category = "diving"
level = 1
description = ""

[[badges]]
id = "legend"
name = "Legend"
description = "Earned every other badge."
icon = "👑"
category = "milestone"
requirement = "Earn all other badges"
rule = { type = "all_other_badges" }
"#;
        let err = parse_catalog(toml).unwrap_err();
        assert!(err.to_string().contains("badge legend requires all other badges"));
    }
}
