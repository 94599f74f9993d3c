//! Canonical settings text format.
//!
//! The document is line oriented: metadata lines, then one block per section
//! holding `[TEAM_n]` blocks that each hold four `[CHAR_n]` blocks. Indentation
//! is written for readability and ignored when reading. Unknown lines are
//! skipped; a malformed integer or a block opened outside its parent aborts
//! the decode.
//!
//! Free-text values are written verbatim. The main-stat delimiter `|` and the
//! memo newline escape `\n` are not themselves escaped, so names, scores and
//! light cones containing a line break cannot be stored, and a memo that
//! contains a literal backslash-n reads back as a line break. Lines are read
//! with either `\n` or `\r\n` endings, so a value ending in a carriage return
//! loses it.

use crate::errors::{AppError, AppResult};
use crate::models::{
    clamp_into, validate_section_name, AppState, CharacterEntry, Content, MainStat, MainStats, Phase, RelicSlot,
    SectionData, TeamEntry, EIDOLON_RANGE, LEVEL_RANGE, SUPERIMPOSE_RANGE, TEAM_SIZE,
};
use once_cell::sync::Lazy;
use regex::Regex;

pub const HEADER: &str = "=== STARRAI MEMO SETTINGS ===";
const BANNER_PREFIX: &str = "===";
const NONE_LABEL: &str = "None";
const STAT_DELIMITER: char = '|';
const MEMO_NEWLINE_ESCAPE: &str = "\\n";
const TEAM_INDENT: &str = "  ";
const CHARACTER_INDENT: &str = "    ";

static TEAM_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[TEAM_(\d+)\]$").expect("valid team header regex"));
static CHARACTER_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[CHAR_(\d+)\]$").expect("valid character header regex"));
static FIELD_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z_]*$").expect("valid field key regex"));

pub fn encode(state: &AppState) -> String {
    let mut out = String::new();
    push_line(&mut out, "", HEADER);
    push_line(
        &mut out,
        "",
        &format!("LAST_SECTION: {}", state.last_active_section.as_deref().unwrap_or(NONE_LABEL)),
    );
    push_line(&mut out, "", &format!("SECTIONS_COUNT: {}", state.sections.len()));
    out.push('\n');

    for (name, section) in &state.sections {
        encode_section(&mut out, name, section);
        out.push('\n');
    }
    out
}

fn encode_section(out: &mut String, name: &str, section: &SectionData) {
    push_line(out, "", &format!("[SECTION: {}]", name));
    push_line(
        out,
        "",
        &format!("CONTENT: {}", section.content.map(Content::as_str).unwrap_or(NONE_LABEL)),
    );
    push_line(
        out,
        "",
        &format!("PHASE: {}", section.phase.map(Phase::as_str).unwrap_or(NONE_LABEL)),
    );
    push_line(out, "", &format!("TEAMS_COUNT: {}", section.teams.len()));

    for (index, team) in section.teams.iter().enumerate() {
        push_line(out, TEAM_INDENT, &format!("[TEAM_{}]", index + 1));
        push_line(out, TEAM_INDENT, &format!("ROW_ID: {}", team.row_id));
        push_line(out, TEAM_INDENT, &format!("SCORE: {}", team.score));
        for (slot, character) in team.characters.iter().enumerate() {
            encode_character(out, slot, character);
        }
    }
}

fn encode_character(out: &mut String, slot: usize, character: &CharacterEntry) {
    push_line(out, CHARACTER_INDENT, &format!("[CHAR_{}]", slot + 1));
    push_line(out, CHARACTER_INDENT, &format!("NAME: {}", character.name));
    push_line(out, CHARACTER_INDENT, &format!("EIDOLON: {}", character.eidolon));
    push_line(out, CHARACTER_INDENT, &format!("SUPERIMPOSE: {}", character.superimpose));
    push_line(out, CHARACTER_INDENT, &format!("LEVEL: {}", character.level));
    push_line(out, CHARACTER_INDENT, &format!("LIGHTCONE: {}", character.lightcone));
    push_line(
        out,
        CHARACTER_INDENT,
        &format!("MEMO: {}", character.memo.replace('\n', MEMO_NEWLINE_ESCAPE)),
    );
    push_line(
        out,
        CHARACTER_INDENT,
        &format!("DETAIL_SHOWN: {}", if character.detail_shown { "True" } else { "False" }),
    );
    let packed = character
        .main_stats
        .iter()
        .map(|(_, stat)| stat.as_str())
        .collect::<Vec<_>>()
        .join(&STAT_DELIMITER.to_string());
    push_line(out, CHARACTER_INDENT, &format!("MAIN_STATS: {}", packed));
}

fn push_line(out: &mut String, indent: &str, text: &str) {
    out.push_str(indent);
    out.push_str(text);
    out.push('\n');
}

pub fn decode(text: &str) -> AppResult<AppState> {
    text.lines()
        .enumerate()
        .try_fold(DecodeContext::new(), |context, (index, line)| context.apply(index + 1, line))
        .map(DecodeContext::finish)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line<'a> {
    Skip,
    Section(&'a str),
    Team,
    Character,
    Field { key: &'a str, value: &'a str },
}

fn classify(raw: &str) -> Line<'_> {
    let body = raw.trim_start();
    let trimmed = body.trim_end();
    if trimmed.is_empty() || trimmed.starts_with(BANNER_PREFIX) {
        return Line::Skip;
    }
    if let Some(name) = trimmed.strip_prefix("[SECTION:").and_then(|rest| rest.strip_suffix(']')) {
        return Line::Section(name.strip_prefix(' ').unwrap_or(name));
    }
    if TEAM_HEADER_RE.is_match(trimmed) {
        return Line::Team;
    }
    if CHARACTER_HEADER_RE.is_match(trimmed) {
        return Line::Character;
    }
    match body.split_once(':') {
        Some((key, value)) if FIELD_KEY_RE.is_match(key) => Line::Field {
            key,
            value: value.strip_prefix(' ').unwrap_or(value),
        },
        _ => Line::Skip,
    }
}

/// Decoder state: the document built so far plus the open section, team and
/// character. Each line is applied as `(context, line) -> context`.
#[derive(Debug, Default)]
pub struct DecodeContext {
    state: AppState,
    section: Option<String>,
    team: Option<usize>,
    character: Option<usize>,
    next_character: usize,
    declared_sections: Option<usize>,
    declared_teams: Vec<(String, usize)>,
    /// Inside a section block whose name was rejected.
    skipping: bool,
}

impl DecodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn apply(mut self, line_no: usize, raw: &str) -> AppResult<Self> {
        match classify(raw) {
            Line::Skip => {}
            Line::Section(name) => self.open_section(line_no, name),
            Line::Team | Line::Character if self.skipping => {}
            Line::Team => self.open_team(line_no)?,
            Line::Character => self.open_character(line_no)?,
            Line::Field { key, value } => self.set_field(line_no, key, value)?,
        }
        Ok(self)
    }

    pub fn finish(mut self) -> AppState {
        if let Some(declared) = self.declared_sections {
            if declared != self.state.sections.len() {
                tracing::warn!(
                    declared,
                    decoded = self.state.sections.len(),
                    "section count does not match SECTIONS_COUNT"
                );
            }
        }
        for (name, declared) in &self.declared_teams {
            let decoded = self.state.sections.get(name).map_or(0, |section| section.teams.len());
            if *declared != decoded {
                tracing::warn!(section = %name, declared, decoded, "team count does not match TEAMS_COUNT");
            }
        }
        self.state.normalize_last_section();
        self.state
    }

    fn open_section(&mut self, line_no: usize, name: &str) {
        self.team = None;
        self.character = None;
        if let Err(error) = validate_section_name(name) {
            tracing::warn!(line = line_no, error = %error, "skipping section block with invalid name");
            self.section = None;
            self.skipping = true;
            return;
        }
        self.skipping = false;
        self.state.sections.insert(name.to_string(), SectionData::default());
        self.declared_teams.retain(|(declared, _)| declared != name);
        self.section = Some(name.to_string());
    }

    fn open_team(&mut self, line_no: usize) -> AppResult<()> {
        let Some(section) = self.current_section() else {
            return Err(AppError::decode(line_no, "team block outside a section"));
        };
        section.teams.push(TeamEntry::new(1));
        let index = section.teams.len() - 1;
        self.team = Some(index);
        self.character = None;
        self.next_character = 0;
        Ok(())
    }

    fn open_character(&mut self, line_no: usize) -> AppResult<()> {
        if self.current_team().is_none() {
            return Err(AppError::decode(line_no, "character block outside a team"));
        }
        if self.next_character < TEAM_SIZE {
            self.character = Some(self.next_character);
            self.next_character += 1;
        } else {
            tracing::warn!(line = line_no, "ignoring character block beyond the fourth slot");
            self.character = None;
        }
        Ok(())
    }

    fn set_field(&mut self, line_no: usize, key: &str, value: &str) -> AppResult<()> {
        match key {
            "LAST_SECTION" => {
                self.state.last_active_section = none_or(value).map(ToString::to_string);
            }
            "SECTIONS_COUNT" => {
                self.declared_sections = value.trim().parse().ok();
            }
            "CONTENT" => {
                if let Some(section) = self.current_section() {
                    section.content = none_or(value).and_then(|label| Content::from_label(label.trim()));
                }
            }
            "PHASE" => {
                if let Some(section) = self.current_section() {
                    section.phase = none_or(value).and_then(|label| Phase::from_label(label.trim()));
                }
            }
            "TEAMS_COUNT" => {
                if let (Some(name), Ok(count)) = (self.section.clone(), value.trim().parse()) {
                    self.declared_teams.push((name, count));
                }
            }
            "ROW_ID" => {
                if let Some(team) = self.current_team() {
                    let row_id = parse_int(line_no, key, value)?;
                    team.row_id = u32::try_from(row_id)
                        .ok()
                        .filter(|id| *id > 0)
                        .ok_or_else(|| AppError::decode(line_no, format!("ROW_ID must be positive: {}", row_id)))?;
                }
            }
            "SCORE" => {
                if let Some(team) = self.current_team() {
                    team.score = value.to_string();
                }
            }
            _ => self.set_character_field(line_no, key, value)?,
        }
        Ok(())
    }

    fn set_character_field(&mut self, line_no: usize, key: &str, value: &str) -> AppResult<()> {
        let Some(character) = self.current_character() else {
            return Ok(());
        };
        match key {
            "NAME" => character.name = value.to_string(),
            "EIDOLON" => character.eidolon = clamp_into(parse_int(line_no, key, value)?, &EIDOLON_RANGE),
            "SUPERIMPOSE" => {
                character.superimpose = clamp_into(parse_int(line_no, key, value)?, &SUPERIMPOSE_RANGE)
            }
            "LEVEL" => character.level = clamp_into(parse_int(line_no, key, value)?, &LEVEL_RANGE),
            "LIGHTCONE" => character.lightcone = value.to_string(),
            "MEMO" => character.memo = value.replace(MEMO_NEWLINE_ESCAPE, "\n"),
            "DETAIL_SHOWN" => character.detail_shown = value.trim().eq_ignore_ascii_case("true"),
            "MAIN_STATS" => {
                if let Some(stats) = unpack_main_stats(value) {
                    character.main_stats = stats;
                }
            }
            _ => tracing::trace!(line = line_no, key, "skipping unknown field"),
        }
        Ok(())
    }

    fn current_section(&mut self) -> Option<&mut SectionData> {
        let name = self.section.as_ref()?;
        self.state.sections.get_mut(name)
    }

    fn current_team(&mut self) -> Option<&mut TeamEntry> {
        let index = self.team?;
        self.current_section()?.teams.get_mut(index)
    }

    fn current_character(&mut self) -> Option<&mut CharacterEntry> {
        let slot = self.character?;
        self.current_team()?.characters.get_mut(slot)
    }
}

fn none_or(value: &str) -> Option<&str> {
    if value == NONE_LABEL || value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_int(line_no: usize, key: &str, value: &str) -> AppResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| AppError::decode(line_no, format!("{} is not an integer: {:?}", key, value)))
}

/// Fewer than four packed values leaves the defaults untouched.
fn unpack_main_stats(value: &str) -> Option<MainStats> {
    let parts = value.trim().split(STAT_DELIMITER).collect::<Vec<_>>();
    if parts.len() < TEAM_SIZE {
        return None;
    }
    let mut stats = MainStats::default();
    for (slot, part) in RelicSlot::ALL.into_iter().zip(parts) {
        stats.set(slot, MainStat::from_label_or_default(part));
    }
    Some(stats)
}
