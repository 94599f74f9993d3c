//! Section lifecycle: create, switch, rename, remove and classify sections,
//! keeping each section's view and stored data in step and driving saves.
//!
//! Ordering on a switch is fixed: live view values are flushed into the data
//! model, then the target becomes visible, then its stored data is restored
//! into its view after a short deferral.

use crate::board::{SectionView, TeamBoard};
use crate::config::{MemoConfig, Timings};
use crate::errors::{AppError, AppResult};
use crate::models::{validate_section_name, AppState, Content, Phase, SectionData};
use crate::scheduler::SaveScheduler;
use crate::store::{LoadOutcome, LoadSource, SettingsStore, StorePaths};
use indexmap::IndexMap;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

const GENERATED_NAME_PREFIX: &str = "セクション";

struct Section<V> {
    data: SectionData,
    view: V,
    /// Set once the view has received the stored data; only hydrated views are flushed.
    hydrated: bool,
}

impl<V: SectionView> Section<V> {
    fn new(data: SectionData, hydrated: bool) -> Self
    where
        V: Default,
    {
        Self {
            data,
            view: V::default(),
            hydrated,
        }
    }

    fn flush(&mut self) {
        if self.hydrated {
            self.data.teams = self.view.team_data();
        }
    }

    fn restore(&mut self) {
        self.flush();
        self.view.show_classification(self.data.content, self.data.phase);
        if !self.data.teams.is_empty() {
            self.view.set_team_data(&self.data.teams);
            self.data.teams = self.view.team_data();
        }
        self.hydrated = true;
    }
}

struct ControllerState<V> {
    sections: IndexMap<String, Section<V>>,
    visible: Option<String>,
}

impl<V: SectionView> ControllerState<V> {
    fn flush_all(&mut self) {
        for section in self.sections.values_mut() {
            section.flush();
        }
    }

    fn snapshot(&self) -> AppState {
        AppState {
            sections: self
                .sections
                .iter()
                .map(|(name, section)| (name.clone(), section.data.clone()))
                .collect(),
            last_active_section: self.visible.clone(),
        }
    }
}

#[derive(Debug)]
enum Deferred {
    Restore(String),
    EnsureMinimumTeams(String),
}

pub struct SectionController<V: SectionView = TeamBoard> {
    inner: Arc<Mutex<ControllerState<V>>>,
    scheduler: SaveScheduler,
    store: Arc<SettingsStore>,
    timings: Timings,
    default_section_name: String,
}

impl<V: SectionView> Clone for SectionController<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scheduler: self.scheduler.clone(),
            store: self.store.clone(),
            timings: self.timings,
            default_section_name: self.default_section_name.clone(),
        }
    }
}

impl<V: SectionView + Default> SectionController<V> {
    pub fn new(config: &MemoConfig) -> Self {
        Self::with_store(
            SettingsStore::new(StorePaths::from_config(config)),
            config.timings(),
            config.default_section_name.clone(),
        )
    }

    pub fn with_store(store: SettingsStore, timings: Timings, default_section_name: String) -> Self {
        let inner = Arc::new(Mutex::new(ControllerState {
            sections: IndexMap::new(),
            visible: None,
        }));
        let store = Arc::new(store);
        let scheduler = SaveScheduler::new(timings.debounce);

        let weak = Arc::downgrade(&inner);
        let writer = store.clone();
        scheduler.set_executor(Arc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            let state = {
                let mut guard = inner.lock().expect("section controller lock");
                guard.flush_all();
                guard.snapshot()
            };
            writer.save(&state)
        }));

        Self {
            inner,
            scheduler,
            store,
            timings,
            default_section_name,
        }
    }

    /// Loads stored settings, builds a view per section and enters the ready
    /// phase. Must run inside a tokio runtime.
    pub fn startup(&self) -> LoadSource {
        let LoadOutcome { mut state, source } = self.store.load();
        tracing::info!(source = source.as_str(), sections = state.sections.len(), "restoring sections");

        let first_run = state.is_empty();
        let last_active = state.last_active_section.take();
        if first_run {
            state
                .sections
                .insert(self.default_section_name.clone(), SectionData::default());
        }

        {
            let mut inner = self.lock();
            for (name, data) in &state.sections {
                inner.sections.insert(name.clone(), Section::new(data.clone(), first_run));
            }
        }
        for name in state.sections.keys() {
            let task = if first_run {
                Deferred::EnsureMinimumTeams(name.clone())
            } else {
                Deferred::Restore(name.clone())
            };
            self.defer(self.timings.startup_restore_delay, task);
        }

        let target = last_active
            .filter(|name| state.sections.contains_key(name))
            .or_else(|| state.sections.keys().next().cloned());
        if let Some(target) = target {
            self.switch_to(&target);
        }

        self.scheduler.mark_ready();
        self.scheduler.start();
        source
    }

    /// Creates a section and makes it visible. `None` picks the next free
    /// generated name.
    pub fn add_section(&self, name: Option<&str>) -> AppResult<String> {
        let name = {
            let mut inner = self.lock();
            let name = match name {
                Some(name) => name.to_string(),
                None => generated_name(&inner.sections),
            };
            validate_section_name(&name)?;
            if inner.sections.contains_key(&name) {
                return Err(AppError::NameCollision(format!("Section already exists: {}", name)));
            }
            inner.sections.insert(name.clone(), Section::new(SectionData::default(), true));
            inner.visible = Some(name.clone());
            name
        };
        tracing::info!(section = %name, "section added");
        self.defer(
            self.timings.startup_restore_delay,
            Deferred::EnsureMinimumTeams(name.clone()),
        );
        self.scheduler.request_debounced_save();
        Ok(name)
    }

    pub fn switch_to(&self, name: &str) -> bool {
        {
            let mut inner = self.lock();
            if !inner.sections.contains_key(name) {
                return false;
            }
            inner.flush_all();
            inner.visible = Some(name.to_string());
        }
        self.defer(self.timings.switch_restore_delay, Deferred::Restore(name.to_string()));
        true
    }

    /// Deferred steps still queued under the old name no longer find the
    /// section, so a section whose view was not yet restored is restored here.
    pub fn rename_section(&self, old: &str, new: &str) -> AppResult<()> {
        if old == new {
            return Ok(());
        }
        validate_section_name(new)?;
        {
            let mut inner = self.lock();
            if inner.sections.contains_key(new) {
                return Err(AppError::NameCollision(format!("Section already exists: {}", new)));
            }
            let Some((index, _, mut section)) = inner.sections.shift_remove_full(old) else {
                return Err(AppError::NotFound(format!("No section named {}", old)));
            };
            if !section.hydrated {
                section.restore();
            }
            inner.sections.shift_insert(index, new.to_string(), section);
            if inner.visible.as_deref() == Some(old) {
                inner.visible = Some(new.to_string());
            }
        }
        tracing::info!(from = %old, to = %new, "section renamed");
        let _ = self.scheduler.save_now();
        Ok(())
    }

    pub fn remove_section(&self, name: &str) -> bool {
        {
            let mut inner = self.lock();
            let Some((index, _, _)) = inner.sections.shift_remove_full(name) else {
                return false;
            };
            if inner.visible.as_deref() == Some(name) {
                let neighbour = index.min(inner.sections.len().saturating_sub(1));
                inner.visible = inner.sections.get_index(neighbour).map(|(key, _)| key.clone());
            }
        }
        tracing::info!(section = %name, "section removed");
        let _ = self.scheduler.save_now();
        true
    }

    pub fn select_content(&self, name: &str, content: Content) -> bool {
        self.select(name, |data| data.content = Some(content))
    }

    pub fn select_phase(&self, name: &str, phase: Phase) -> bool {
        self.select(name, |data| data.phase = Some(phase))
    }

    /// Field-level edit from the view layer; schedules a debounced save.
    pub fn edit_section<R>(&self, name: &str, edit: impl FnOnce(&mut V) -> R) -> Option<R> {
        let result = {
            let mut inner = self.lock();
            let section = inner.sections.get_mut(name)?;
            if !section.hydrated {
                section.restore();
            }
            edit(&mut section.view)
        };
        self.scheduler.request_debounced_save();
        Some(result)
    }

    pub fn with_view<R>(&self, name: &str, read: impl FnOnce(&V) -> R) -> Option<R> {
        let inner = self.lock();
        inner.sections.get(name).map(|section| read(&section.view))
    }

    /// Pulls live values out of every hydrated view.
    pub fn flush_all(&self) {
        self.lock().flush_all();
    }

    /// Flushes every section and writes the final state.
    pub fn close(&self) -> AppResult<()> {
        self.flush_all();
        let result = self.scheduler.save_now();
        if result.is_ok() {
            tracing::info!("settings saved on close");
        }
        result
    }

    pub fn snapshot(&self) -> AppState {
        let mut inner = self.lock();
        inner.flush_all();
        inner.snapshot()
    }

    pub fn section_data(&self, name: &str) -> Option<SectionData> {
        let mut inner = self.lock();
        let section = inner.sections.get_mut(name)?;
        section.flush();
        Some(section.data.clone())
    }

    pub fn section_names(&self) -> Vec<String> {
        self.lock().sections.keys().cloned().collect()
    }

    pub fn visible_section(&self) -> Option<String> {
        self.lock().visible.clone()
    }

    pub fn scheduler(&self) -> &SaveScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn restore_section(&self, name: &str) {
        let mut inner = self.lock();
        match inner.sections.get_mut(name) {
            Some(section) => section.restore(),
            None => tracing::warn!(section = %name, "cannot restore missing section"),
        }
    }

    pub fn ensure_minimum_teams(&self, name: &str) {
        let mut inner = self.lock();
        let Some(section) = inner.sections.get_mut(name) else {
            return;
        };
        if section.view.team_count() == 0 {
            let row_id = section.view.add_team_row();
            tracing::debug!(section = %name, row_id, "added default team row");
        }
    }

    fn select(&self, name: &str, apply: impl FnOnce(&mut SectionData)) -> bool {
        {
            let mut inner = self.lock();
            inner.flush_all();
            let Some(section) = inner.sections.get_mut(name) else {
                return false;
            };
            apply(&mut section.data);
            section.view.show_classification(section.data.content, section.data.phase);
        }
        let _ = self.scheduler.save_now();
        true
    }

    fn defer(&self, delay: Duration, task: Deferred) {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match task {
                Deferred::Restore(name) => controller.restore_section(&name),
                Deferred::EnsureMinimumTeams(name) => controller.ensure_minimum_teams(&name),
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerState<V>> {
        self.inner.lock().expect("section controller lock")
    }
}

fn generated_name<V>(sections: &IndexMap<String, Section<V>>) -> String {
    let mut index = sections.len() + 1;
    loop {
        let candidate = format!("{} {}", GENERATED_NAME_PREFIX, index);
        if !sections.contains_key(&candidate) {
            return candidate;
        }
        index += 1;
    }
}
