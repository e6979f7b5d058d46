use crate::diary_entry::{Diary, DiaryEntry, Id};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Error,
}

/// A blocking notification. The UI shows it on top of everything until a
/// key is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
    pub level: AlertLevel,
}

impl Alert {
    pub fn new(message: impl Into<String>, level: AlertLevel) -> Self {
        Alert {
            message: message.into(),
            level,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Alert::new(message, AlertLevel::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Alert::new(message, AlertLevel::Error)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorState {
    pub currently_editing: Option<DiaryEntry>,
    pub can_edit: bool,
    pub active_diary_id: Option<Id>,
    /// Bumped on every `SetCurrentlyEditing`, even when the entry is equal to
    /// the previous one. Consumers holding a draft resync when it moves.
    pub entry_revision: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiaryState {
    pub editor: EditorState,
    pub diaries: Vec<Diary>,
    pub entries: Vec<DiaryEntry>,
    pub alert: Option<Alert>,
}

#[derive(Debug, Clone)]
pub enum Action {
    SetCurrentlyEditing(Option<DiaryEntry>),
    SetCanEdit(bool),
    UpdateDiary(Diary),
    UpdateEntry(DiaryEntry),
    ShowAlert(Alert),
    DismissAlert,
}

impl DiaryState {
    pub fn new(active_diary_id: Option<Id>) -> Self {
        DiaryState {
            editor: EditorState {
                active_diary_id,
                ..EditorState::default()
            },
            ..DiaryState::default()
        }
    }

    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::SetCurrentlyEditing(entry) => {
                self.editor.currently_editing = entry;
                self.editor.entry_revision += 1;
            }
            Action::SetCanEdit(can_edit) => self.editor.can_edit = can_edit,
            Action::UpdateDiary(diary) => {
                match self.diaries.iter_mut().find(|d| d.id == diary.id) {
                    Some(existing) => *existing = diary,
                    None => self.diaries.push(diary),
                }
            }
            Action::UpdateEntry(entry) => {
                match self.entries.iter_mut().find(|e| e.id == entry.id) {
                    Some(existing) => *existing = entry,
                    None => self.entries.push(entry),
                }
            }
            Action::ShowAlert(alert) => self.alert = Some(alert),
            Action::DismissAlert => self.alert = None,
        }
    }
}

/// Shared application state. Every update goes through [`Store::dispatch`],
/// which applies it under the channel's lock and wakes all subscribers.
#[derive(Clone)]
pub struct Store {
    tx: Arc<watch::Sender<DiaryState>>,
}

impl Store {
    pub fn new(state: DiaryState) -> Self {
        let (tx, _) = watch::channel(state);
        Store { tx: Arc::new(tx) }
    }

    pub fn dispatch(&self, action: Action) {
        debug!(?action, "dispatch");
        self.tx.send_modify(|state| state.reduce(action));
    }

    pub fn snapshot(&self) -> DiaryState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DiaryState> {
        self.tx.subscribe()
    }

    pub fn show_alert(&self, alert: Alert) {
        self.dispatch(Action::ShowAlert(alert));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diary(id: &str, entry_ids: &[&str]) -> Diary {
        Diary {
            id: Id::from(id),
            title: format!("Diary {id}"),
            kind: None,
            entry_ids: entry_ids.iter().map(|e| Id::from(*e)).collect(),
        }
    }

    #[test]
    fn setting_the_same_entry_still_moves_the_revision() {
        let mut state = DiaryState::new(None);
        let entry = DiaryEntry::new("1", "A", "B");

        state.reduce(Action::SetCurrentlyEditing(Some(entry.clone())));
        let first = state.editor.entry_revision;
        state.reduce(Action::SetCurrentlyEditing(Some(entry)));

        assert_eq!(state.editor.entry_revision, first + 1);
    }

    #[test]
    fn update_diary_replaces_or_appends() {
        let mut state = DiaryState::new(None);
        state.reduce(Action::UpdateDiary(diary("d1", &[])));
        state.reduce(Action::UpdateDiary(diary("d2", &[])));
        state.reduce(Action::UpdateDiary(diary("d1", &["e1"])));

        assert_eq!(state.diaries.len(), 2);
        assert_eq!(state.diaries[0].entry_ids, vec![Id::from("e1")]);
    }

    #[test]
    fn update_entry_replaces_or_appends() {
        let mut state = DiaryState::new(None);
        state.reduce(Action::UpdateEntry(DiaryEntry::new("1", "A", "B")));
        state.reduce(Action::UpdateEntry(DiaryEntry::new("2", "X", "Y")));
        state.reduce(Action::UpdateEntry(DiaryEntry::new("1", "A2", "B2")));

        assert_eq!(
            state.entries,
            vec![DiaryEntry::new("1", "A2", "B2"), DiaryEntry::new("2", "X", "Y")]
        );
    }

    #[tokio::test]
    async fn subscribers_see_dispatched_changes() {
        let store = Store::new(DiaryState::new(Some(Id::from("d1"))));
        let mut rx = store.subscribe();

        store.dispatch(Action::SetCanEdit(true));

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().editor.can_edit);
        assert_eq!(
            store.snapshot().editor.active_diary_id,
            Some(Id::from("d1"))
        );
    }

    #[test]
    fn alerts_are_shown_and_dismissed() {
        let store = Store::new(DiaryState::default());

        store.show_alert(Alert::warning("Please select a diary."));
        assert_eq!(
            store.snapshot().alert.map(|a| a.level),
            Some(AlertLevel::Warning)
        );

        store.dispatch(Action::DismissAlert);
        assert!(store.snapshot().alert.is_none());
    }
}
