//! Section roles and the fixed page-break policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Section roles
// ────────────────────────────────────────────────────────────────────────────

/// Semantic tag assigned to each classified section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionRole {
    ExperienceEntry,
    EducationEntry,
    ProjectEntry,
    SkillsList,
    AchievementsList,
    ContactInfo,
    SummarySection,
    Generic,
}

/// Hint keyword → role. Checked in order; the first keyword found wins.
const ROLE_KEYWORDS: [(&str, SectionRole); 10] = [
    ("experience", SectionRole::ExperienceEntry),
    ("education", SectionRole::EducationEntry),
    ("project", SectionRole::ProjectEntry),
    ("skill", SectionRole::SkillsList),
    ("achievement", SectionRole::AchievementsList),
    ("contact", SectionRole::ContactInfo),
    ("info", SectionRole::ContactInfo),
    ("summary", SectionRole::SummarySection),
    ("objective", SectionRole::SummarySection),
    ("about", SectionRole::SummarySection),
];

impl SectionRole {
    pub const ALL: [SectionRole; 8] = [
        SectionRole::ExperienceEntry,
        SectionRole::EducationEntry,
        SectionRole::ProjectEntry,
        SectionRole::SkillsList,
        SectionRole::AchievementsList,
        SectionRole::ContactInfo,
        SectionRole::SummarySection,
        SectionRole::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionRole::ExperienceEntry => "experience-entry",
            SectionRole::EducationEntry => "education-entry",
            SectionRole::ProjectEntry => "project-entry",
            SectionRole::SkillsList => "skills-list",
            SectionRole::AchievementsList => "achievements-list",
            SectionRole::ContactInfo => "contact-info",
            SectionRole::SummarySection => "summary-section",
            SectionRole::Generic => "generic",
        }
    }

    /// Matches a free-form hint (class list, attribute, heading text) against the
    /// role lookup. Returns `None` when nothing matches so callers can try the next hint.
    pub fn from_hint(hint: &str) -> Option<SectionRole> {
        let hint = hint.to_lowercase();
        ROLE_KEYWORDS
            .iter()
            .find(|(keyword, _)| hint.contains(keyword))
            .map(|(_, role)| *role)
    }
}

impl fmt::Display for SectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        SectionRole::ALL
            .into_iter()
            .find(|role| role.as_str() == wanted)
            .ok_or_else(|| format!("unknown section role '{s}'"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page-break policy
// ────────────────────────────────────────────────────────────────────────────

/// Fixed pagination policy. Built once at startup; never edited at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBreakConfig {
    /// Master switch. When off, everything lands on page 1.
    pub enable_smart_breaks: bool,
    /// Soft lower bound on sections per page. Diagnostics only.
    pub min_content_per_page: usize,
    /// Soft upper bound on sections per page. Diagnostics only.
    pub max_content_per_page: usize,
    /// Roles that must never be split across pages.
    pub avoid_breaking_sections: Vec<SectionRole>,
    /// Roles after which export always starts a new page.
    pub force_break_after: Vec<SectionRole>,
    /// Heading keywords (lower case) after whose section export starts a new page.
    pub force_break_after_titles: Vec<String>,
}

/// Grouped "Experience" and "Education" sections each end their page in export.
pub const DEFAULT_FORCED_BREAK_TITLES: [&str; 2] = ["experience", "education"];

impl Default for PageBreakConfig {
    fn default() -> Self {
        Self {
            enable_smart_breaks: true,
            min_content_per_page: 2,
            max_content_per_page: 8,
            avoid_breaking_sections: vec![
                SectionRole::ExperienceEntry,
                SectionRole::EducationEntry,
                SectionRole::ProjectEntry,
                SectionRole::SkillsList,
                SectionRole::AchievementsList,
                SectionRole::ContactInfo,
                SectionRole::SummarySection,
            ],
            force_break_after: Vec::new(),
            force_break_after_titles: DEFAULT_FORCED_BREAK_TITLES
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
        }
    }
}

impl PageBreakConfig {
    pub fn is_indivisible(&self, role: SectionRole) -> bool {
        self.avoid_breaking_sections.contains(&role)
    }

    pub fn forces_break_after(&self, role: SectionRole) -> bool {
        self.force_break_after.contains(&role)
    }

    /// True if the section heading contains one of the forced-break keywords.
    pub fn forces_break_after_title(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.force_break_after_titles
            .iter()
            .any(|keyword| !keyword.is_empty() && title.contains(keyword.as_str()))
    }
}

/// Parses a comma-separated keyword list, lower-cased. An empty string yields no keywords.
pub fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses a comma-separated role list such as `experience-entry, education-entry`.
pub fn parse_role_list(raw: &str) -> Result<Vec<SectionRole>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SectionRole::from_str)
        .collect()
}
