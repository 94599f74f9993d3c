use crate::errors::{AppError, AppResult};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

pub const TEAM_SIZE: usize = 4;
pub const EIDOLON_RANGE: RangeInclusive<u8> = 0..=6;
pub const SUPERIMPOSE_RANGE: RangeInclusive<u8> = 1..=5;
pub const LEVEL_RANGE: RangeInclusive<u8> = 1..=80;

/// Prefix shared by every metadata key of the legacy mapping formats.
pub const RESERVED_PREFIX: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Content {
    ForgottenHall,
    PureFiction,
    ApocalypticShadow,
}

impl Content {
    pub const ALL: [Content; 3] = [Self::ForgottenHall, Self::PureFiction, Self::ApocalypticShadow];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForgottenHall => "忘却の庭",
            Self::PureFiction => "虚構叙事",
            Self::ApocalypticShadow => "末日の幻影",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|content| content.as_str() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    FirstHalf,
    SecondHalf,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Self::FirstHalf, Self::SecondHalf];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstHalf => "前半",
            Self::SecondHalf => "後半",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|phase| phase.as_str() == label)
    }
}

/// Relic slot carrying a main stat. `ALL` is the packing order of the text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelicSlot {
    Body,
    Feet,
    Rope,
    Sphere,
}

impl RelicSlot {
    pub const ALL: [RelicSlot; 4] = [Self::Body, Self::Feet, Self::Rope, Self::Sphere];

    /// Key used by the legacy mapping formats.
    pub fn key(self) -> &'static str {
        match self {
            Self::Body => "胴",
            Self::Feet => "脚",
            Self::Rope => "縄",
            Self::Sphere => "球",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Body => 0,
            Self::Feet => 1,
            Self::Rope => 2,
            Self::Sphere => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MainStat {
    #[default]
    HpPercent,
    AtkPercent,
    DefPercent,
    CritRate,
    CritDamage,
    BreakEffect,
    EnergyRegen,
    ElementalDamage,
}

impl MainStat {
    pub const ALL: [MainStat; 8] = [
        Self::HpPercent,
        Self::AtkPercent,
        Self::DefPercent,
        Self::CritRate,
        Self::CritDamage,
        Self::BreakEffect,
        Self::EnergyRegen,
        Self::ElementalDamage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HpPercent => "HP%",
            Self::AtkPercent => "攻撃%",
            Self::DefPercent => "防御%",
            Self::CritRate => "会心率",
            Self::CritDamage => "会心DMG",
            Self::BreakEffect => "撃破",
            Self::EnergyRegen => "回復効率",
            Self::ElementalDamage => "属性DMG",
        }
    }

    /// Unknown labels fall back to the default stat instead of failing.
    pub fn from_label_or_default(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|stat| stat.as_str() == label)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MainStats([MainStat; TEAM_SIZE]);

impl MainStats {
    pub fn get(&self, slot: RelicSlot) -> MainStat {
        self.0[slot.index()]
    }

    pub fn set(&mut self, slot: RelicSlot, stat: MainStat) {
        self.0[slot.index()] = stat;
    }

    pub fn iter(&self) -> impl Iterator<Item = (RelicSlot, MainStat)> + '_ {
        RelicSlot::ALL.into_iter().map(|slot| (slot, self.get(slot)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterEntry {
    pub name: String,
    pub eidolon: u8,
    pub superimpose: u8,
    pub level: u8,
    pub lightcone: String,
    pub main_stats: MainStats,
    pub memo: String,
    pub detail_shown: bool,
}

impl Default for CharacterEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            eidolon: *EIDOLON_RANGE.start(),
            superimpose: *SUPERIMPOSE_RANGE.start(),
            level: *LEVEL_RANGE.end(),
            lightcone: String::new(),
            main_stats: MainStats::default(),
            memo: String::new(),
            detail_shown: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamEntry {
    pub row_id: u32,
    pub score: String,
    pub characters: [CharacterEntry; TEAM_SIZE],
}

impl TeamEntry {
    pub fn new(row_id: u32) -> Self {
        Self {
            row_id,
            score: String::new(),
            characters: Default::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionData {
    pub content: Option<Content>,
    pub phase: Option<Phase>,
    pub teams: Vec<TeamEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    pub sections: IndexMap<String, SectionData>,
    pub last_active_section: Option<String>,
}

impl AppState {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Drops a last-active name that no longer refers to a section.
    pub fn normalize_last_section(&mut self) {
        if let Some(name) = &self.last_active_section {
            if !self.sections.contains_key(name) {
                tracing::debug!(section = %name, "last active section does not exist; clearing");
                self.last_active_section = None;
            }
        }
    }
}

pub fn validate_section_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::InvalidName("Section name cannot be empty".to_string()));
    }
    if name.contains(['\n', '\r']) {
        return Err(AppError::InvalidName(format!(
            "Section name cannot contain line breaks: {:?}",
            name
        )));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(AppError::InvalidName(format!(
            "Section name cannot start with '{}': {}",
            RESERVED_PREFIX, name
        )));
    }
    Ok(())
}

pub fn clamp_into(value: i64, range: &RangeInclusive<u8>) -> u8 {
    value.clamp(i64::from(*range.start()), i64::from(*range.end())) as u8
}

/// First row id at or after `start` that is not in `taken`. Wraps from
/// `u32::MAX` back to 1; zero is never returned.
pub fn next_free_row_id(start: u32, taken: &BTreeSet<u32>) -> u32 {
    let mut candidate = start.max(1);
    while taken.contains(&candidate) {
        candidate = candidate.checked_add(1).unwrap_or(1);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_row_id_skips_taken_and_wraps_past_max() {
        let taken = BTreeSet::from([1, 2, 4]);
        assert_eq!(next_free_row_id(1, &taken), 3);
        assert_eq!(next_free_row_id(0, &taken), 3);
        assert_eq!(next_free_row_id(4, &taken), 5);

        let at_limit = BTreeSet::from([1, u32::MAX]);
        assert_eq!(next_free_row_id(u32::MAX, &at_limit), 2);
    }

    #[test]
    fn character_defaults_match_fresh_slot() {
        let character = CharacterEntry::default();
        assert_eq!(character.eidolon, 0);
        assert_eq!(character.superimpose, 1);
        assert_eq!(character.level, 80);
        assert!(character.main_stats.iter().all(|(_, stat)| stat == MainStat::HpPercent));
    }

    #[test]
    fn unknown_main_stat_falls_back_to_hp() {
        assert_eq!(MainStat::from_label_or_default("会心率"), MainStat::CritRate);
        assert_eq!(MainStat::from_label_or_default("speed"), MainStat::HpPercent);
    }

    #[test]
    fn clamps_out_of_range_values() {
        assert_eq!(clamp_into(9, &EIDOLON_RANGE), 6);
        assert_eq!(clamp_into(0, &SUPERIMPOSE_RANGE), 1);
        assert_eq!(clamp_into(-3, &LEVEL_RANGE), 1);
    }

    #[test]
    fn rejects_reserved_and_blank_names() {
        assert!(validate_section_name("Raid").is_ok());
        assert!(matches!(validate_section_name(""), Err(AppError::InvalidName(_))));
        assert!(matches!(validate_section_name("_last_section"), Err(AppError::InvalidName(_))));
        assert!(matches!(validate_section_name("a\nb"), Err(AppError::InvalidName(_))));
    }

    #[test]
    fn normalize_clears_dangling_last_section() {
        let mut state = AppState {
            last_active_section: Some("gone".to_string()),
            ..AppState::default()
        };
        state.normalize_last_section();
        assert_eq!(state.last_active_section, None);
    }
}
