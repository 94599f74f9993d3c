use crate::models::{next_free_row_id, CharacterEntry, Content, Phase, TeamEntry};
use std::collections::BTreeSet;

/// View-side state of one section. The lifecycle controller reads and writes
/// team data only through this seam.
pub trait SectionView: Send + 'static {
    /// Live team rows, in display order.
    fn team_data(&self) -> Vec<TeamEntry>;
    /// Replaces every row with `teams`.
    fn set_team_data(&mut self, teams: &[TeamEntry]);
    fn team_count(&self) -> usize;
    /// Appends an empty row and returns its id.
    fn add_team_row(&mut self) -> u32;
    fn show_classification(&mut self, content: Option<Content>, phase: Option<Phase>);
}

/// In-memory team rows for one section, with its own row-id counter.
#[derive(Debug, Clone)]
pub struct TeamBoard {
    rows: Vec<TeamEntry>,
    next_row_id: u32,
    content: Option<Content>,
    phase: Option<Phase>,
}

impl Default for TeamBoard {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_row_id: 1,
            content: None,
            phase: None,
        }
    }
}

impl TeamBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[TeamEntry] {
        &self.rows
    }

    pub fn next_row_id(&self) -> u32 {
        self.next_row_id
    }

    pub fn content(&self) -> Option<Content> {
        self.content
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn delete_team_row(&mut self, row_id: u32) -> bool {
        let Some(index) = self.rows.iter().position(|row| row.row_id == row_id) else {
            return false;
        };
        self.rows.remove(index);
        true
    }

    pub fn row_mut(&mut self, row_id: u32) -> Option<&mut TeamEntry> {
        self.rows.iter_mut().find(|row| row.row_id == row_id)
    }

    pub fn character_mut(&mut self, row_id: u32, slot: usize) -> Option<&mut CharacterEntry> {
        self.row_mut(row_id)?.characters.get_mut(slot)
    }

    pub fn set_score(&mut self, row_id: u32, score: impl Into<String>) -> bool {
        match self.row_mut(row_id) {
            Some(row) => {
                row.score = score.into();
                true
            }
            None => false,
        }
    }

    fn allocate_row_id(&mut self, taken: &BTreeSet<u32>) -> u32 {
        let row_id = next_free_row_id(self.next_row_id, taken);
        self.next_row_id = row_id.checked_add(1).unwrap_or(1);
        row_id
    }
}

impl SectionView for TeamBoard {
    fn team_data(&self) -> Vec<TeamEntry> {
        self.rows.clone()
    }

    fn set_team_data(&mut self, teams: &[TeamEntry]) {
        self.rows.clear();
        let mut taken: BTreeSet<u32> = teams.iter().map(|team| team.row_id).collect();
        let mut used = BTreeSet::new();
        if let Some(next) = taken.last().and_then(|max| max.checked_add(1)) {
            self.next_row_id = self.next_row_id.max(next);
        }
        for team in teams {
            let mut row = team.clone();
            if row.row_id == 0 || !used.insert(row.row_id) {
                row.row_id = self.allocate_row_id(&taken);
                taken.insert(row.row_id);
                used.insert(row.row_id);
                tracing::debug!(row_id = row.row_id, "reassigned duplicate team row id");
            }
            self.rows.push(row);
        }
    }

    fn team_count(&self) -> usize {
        self.rows.len()
    }

    fn add_team_row(&mut self) -> u32 {
        let taken: BTreeSet<u32> = self.rows.iter().map(|row| row.row_id).collect();
        let row_id = self.allocate_row_id(&taken);
        self.rows.push(TeamEntry::new(row_id));
        row_id
    }

    fn show_classification(&mut self, content: Option<Content>, phase: Option<Phase>) {
        self.content = content;
        self.phase = phase;
    }
}
