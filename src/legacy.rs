//! Conversion of the two legacy settings files into an [`AppState`].
//!
//! Both files hold the same generic mapping: section name to a nested
//! dictionary, plus `_`-prefixed metadata keys. Nothing is validated
//! structurally; fields that are missing or of the wrong type take their
//! defaults.

use crate::errors::AppResult;
use crate::models::{
    clamp_into, next_free_row_id, validate_section_name, AppState, CharacterEntry, Content, MainStat, MainStats, Phase, RelicSlot,
    SectionData, TeamEntry, EIDOLON_RANGE, LEVEL_RANGE, SUPERIMPOSE_RANGE, TEAM_SIZE,
};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

pub const LAST_SECTION_KEY: &str = "_last_section";
pub const WINDOW_GEOMETRY_KEY: &str = "_window_geometry";

/// A top-level value: anything JSON can represent, or an opaque payload
/// (raw bytes, non-string dictionary keys) that is carried but never read.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LegacyValue {
    Json(Value),
    Opaque(serde::de::IgnoredAny),
}

pub type LegacyDocument = IndexMap<String, LegacyValue>;

pub fn read_binary(bytes: &[u8]) -> AppResult<AppState> {
    let options = serde_pickle::DeOptions::new().replace_unresolved_globals();
    let document: LegacyDocument = serde_pickle::from_slice(bytes, options)?;
    Ok(state_from_document(document))
}

pub fn read_text(text: &str) -> AppResult<AppState> {
    let document: LegacyDocument = serde_json::from_str(text)?;
    Ok(state_from_document(document))
}

pub fn state_from_document(document: LegacyDocument) -> AppState {
    let mut state = AppState::default();
    for (key, value) in document {
        if key == LAST_SECTION_KEY {
            state.last_active_section = match value {
                LegacyValue::Json(Value::String(name)) => Some(name),
                _ => None,
            };
            continue;
        }
        if key == WINDOW_GEOMETRY_KEY {
            continue;
        }
        if let Err(error) = validate_section_name(&key) {
            tracing::warn!(key = %key, error = %error, "skipping legacy entry that is not a section");
            continue;
        }
        match value {
            LegacyValue::Json(value) => {
                state.sections.insert(key, section_from_value(&value));
            }
            LegacyValue::Opaque(_) => {
                tracing::warn!(section = %key, "skipping legacy section with unreadable payload");
            }
        }
    }
    state.normalize_last_section();
    state
}

fn section_from_value(value: &Value) -> SectionData {
    let teams = value
        .get("teams")
        .and_then(Value::as_array)
        .map(|teams| {
            teams
                .iter()
                .map(|team| (row_id_from_value(team), team_from_value(team)))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    SectionData {
        content: str_field(value, "content").and_then(Content::from_label),
        phase: str_field(value, "phase").and_then(Phase::from_label),
        teams: assign_row_ids(teams),
    }
}

fn row_id_from_value(value: &Value) -> Option<u32> {
    value
        .get("row_id")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .filter(|id| *id > 0)
}

/// Keeps usable ids in order and hands the rest fresh ids above the maximum,
/// wrapping to the lowest free id when the maximum is `u32::MAX`.
fn assign_row_ids(teams: Vec<(Option<u32>, TeamEntry)>) -> Vec<TeamEntry> {
    let mut taken: BTreeSet<u32> = teams.iter().filter_map(|(id, _)| *id).collect();
    let mut next = taken.last().and_then(|max| max.checked_add(1)).unwrap_or(1);
    let mut used = BTreeSet::new();
    teams
        .into_iter()
        .map(|(id, mut team)| {
            team.row_id = match id {
                Some(id) if used.insert(id) => id,
                _ => {
                    let fresh = next_free_row_id(next, &taken);
                    taken.insert(fresh);
                    used.insert(fresh);
                    next = fresh.checked_add(1).unwrap_or(1);
                    fresh
                }
            };
            team
        })
        .collect()
}

fn team_from_value(value: &Value) -> TeamEntry {
    let mut team = TeamEntry::new(1);
    team.score = str_field(value, "score").unwrap_or_default().to_string();
    if let Some(characters) = value.get("characters").and_then(Value::as_array) {
        for (slot, character) in characters.iter().take(TEAM_SIZE).enumerate() {
            team.characters[slot] = character_from_value(character);
        }
    }
    team
}

fn character_from_value(value: &Value) -> CharacterEntry {
    let defaults = CharacterEntry::default();
    CharacterEntry {
        name: str_field(value, "name").unwrap_or_default().to_string(),
        eidolon: int_field(value, "eidolon", &EIDOLON_RANGE).unwrap_or(defaults.eidolon),
        superimpose: int_field(value, "superimpose", &SUPERIMPOSE_RANGE).unwrap_or(defaults.superimpose),
        level: int_field(value, "level", &LEVEL_RANGE).unwrap_or(defaults.level),
        lightcone: str_field(value, "lightcone").unwrap_or_default().to_string(),
        main_stats: main_stats_from_value(value.get("main_stats")),
        memo: str_field(value, "memo").unwrap_or_default().to_string(),
        detail_shown: value.get("detail_shown").and_then(Value::as_bool).unwrap_or(defaults.detail_shown),
    }
}

fn main_stats_from_value(value: Option<&Value>) -> MainStats {
    let mut stats = MainStats::default();
    let Some(map) = value.and_then(Value::as_object) else {
        return stats;
    };
    for slot in RelicSlot::ALL {
        if let Some(label) = map.get(slot.key()).and_then(Value::as_str) {
            stats.set(slot, MainStat::from_label_or_default(label));
        }
    }
    stats
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn int_field(value: &Value, key: &str, range: &RangeInclusive<u8>) -> Option<u8> {
    value.get(key).and_then(Value::as_i64).map(|raw| clamp_into(raw, range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_json() -> Value {
        json!({
            "_window_geometry": "AdnQywADAAAAAAAA",
            "Raid": {
                "content": "末日の幻影",
                "phase": "前半",
                "teams": [
                    {
                        "row_id": 4,
                        "score": "3 cycles",
                        "characters": [
                            {
                                "name": "Kafka",
                                "eidolon": 2,
                                "superimpose": 9,
                                "main_stats": {"胴": "攻撃%", "球": "属性DMG", "縄": "unknown"},
                                "memo": "dot\nteam",
                                "detail_shown": true
                            }
                        ]
                    },
                    {"score": "", "characters": []}
                ]
            },
            "_last_section": "Raid",
            "Empty": {}
        })
    }

    #[test]
    fn converts_json_mapping_and_strips_reserved_keys() {
        let state = read_text(&legacy_json().to_string()).expect("legacy json");
        assert_eq!(state.sections.keys().collect::<Vec<_>>(), vec!["Raid", "Empty"]);
        assert_eq!(state.last_active_section.as_deref(), Some("Raid"));

        let raid = &state.sections["Raid"];
        assert_eq!(raid.content, Some(Content::ApocalypticShadow));
        assert_eq!(raid.phase, Some(Phase::FirstHalf));
        assert_eq!(raid.teams.len(), 2);

        let kafka = &raid.teams[0].characters[0];
        assert_eq!(kafka.name, "Kafka");
        assert_eq!(kafka.eidolon, 2);
        assert_eq!(kafka.superimpose, 5);
        assert_eq!(kafka.level, 80);
        assert_eq!(kafka.memo, "dot\nteam");
        assert!(kafka.detail_shown);
        assert_eq!(kafka.main_stats.get(RelicSlot::Body), MainStat::AtkPercent);
        assert_eq!(kafka.main_stats.get(RelicSlot::Feet), MainStat::HpPercent);
        assert_eq!(kafka.main_stats.get(RelicSlot::Rope), MainStat::HpPercent);
        assert_eq!(kafka.main_stats.get(RelicSlot::Sphere), MainStat::ElementalDamage);
        assert_eq!(raid.teams[0].characters[3], CharacterEntry::default());

        assert_eq!(state.sections["Empty"], SectionData::default());
    }

    #[test]
    fn missing_and_duplicate_row_ids_get_fresh_ids() {
        let teams = vec![
            (Some(2), TeamEntry::new(1)),
            (None, TeamEntry::new(1)),
            (Some(2), TeamEntry::new(1)),
            (Some(5), TeamEntry::new(1)),
        ];
        let ids = assign_row_ids(teams).iter().map(|team| team.row_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 6, 7, 5]);
    }

    #[test]
    fn max_valued_row_id_does_not_overflow() {
        let state = read_text(r#"{"A": {"teams": [{"row_id": 4294967295}, {}, {"row_id": 1}]}}"#)
            .expect("legacy json");
        let ids = state.sections["A"].teams.iter().map(|team| team.row_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![u32::MAX, 2, 1]);
    }

    #[test]
    fn non_mapping_documents_are_rejected() {
        assert!(read_text("[1, 2, 3]").is_err());
        assert!(read_text("not json").is_err());
    }

    #[test]
    fn converts_pickled_mapping() {
        let bytes = serde_pickle::to_vec(&legacy_json(), serde_pickle::SerOptions::new()).expect("pickle fixture");
        let state = read_binary(&bytes).expect("legacy pickle");
        assert_eq!(state.sections.len(), 2);
        assert_eq!(state.sections["Raid"].teams[0].row_id, 4);
        assert_eq!(state.sections["Raid"].teams[1].row_id, 5);
    }

    #[test]
    fn reserved_prefixed_keys_are_not_sections() {
        let state = read_text(r#"{"_other": {"teams": []}, "A": {"teams": []}}"#).expect("legacy json");
        assert_eq!(state.sections.keys().collect::<Vec<_>>(), vec!["A"]);
    }
}
