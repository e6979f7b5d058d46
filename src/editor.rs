use crate::api::DiaryApi;
use crate::diary_entry::Draft;
use crate::diary_state::{Action, Alert, EditorState, Store};
use crate::markdown;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::text::Text;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Content,
}

/// What the editor shows for a given store state and draft.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorView<'a> {
    Reading {
        title: &'a str,
        content: Text<'static>,
    },
    Editing {
        title: &'a str,
        content: &'a str,
        enabled: bool,
        focus: Field,
        cursor: usize,
    },
}

/// Something the editor wants done that goes beyond its own draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    BeginEdit,
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    Ignored,
    Request(Intent),
}

pub fn view<'a>(
    state: &'a EditorState,
    draft: Option<&'a Draft>,
    focus: Field,
    cursor: usize,
) -> EditorView<'a> {
    match &state.currently_editing {
        Some(entry) if !state.can_edit => EditorView::Reading {
            title: &entry.title,
            content: markdown::render(&entry.content),
        },
        _ => EditorView::Editing {
            title: draft.map(|d| d.title.as_str()).unwrap_or(""),
            content: draft.map(|d| d.content.as_str()).unwrap_or(""),
            enabled: state.can_edit,
            focus,
            cursor,
        },
    }
}

pub struct Editor {
    draft: Option<Draft>,
    focus: Field,
    cursor_position: usize,
    seen_revision: Option<u64>,
}

impl Editor {
    pub fn new() -> Self {
        Editor {
            draft: None,
            focus: Field::Title,
            cursor_position: 0,
            seen_revision: None,
        }
    }

    /// Replaces the draft with the committed entry whenever the store has
    /// handed out a new one since the last call. Unsaved edits are dropped.
    pub fn sync(&mut self, state: &EditorState) {
        if self.seen_revision == Some(state.entry_revision) {
            return;
        }
        self.seen_revision = Some(state.entry_revision);
        self.draft = state.currently_editing.as_ref().map(Draft::from);
        self.focus = Field::Title;
        self.cursor_position = self.field_text().len();
    }

    pub fn view<'a>(&'a self, state: &'a EditorState) -> EditorView<'a> {
        view(state, self.draft.as_ref(), self.focus, self.cursor_position)
    }

    pub fn set_title(&mut self, title: String) {
        match &mut self.draft {
            Some(draft) => draft.title = title,
            None => self.draft = Some(Draft::new(title, "")),
        }
    }

    pub fn set_content(&mut self, content: String) {
        match &mut self.draft {
            Some(draft) => draft.content = content,
            None => self.draft = Some(Draft::new("", content)),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, state: &EditorState) -> KeyOutcome {
        let reading = state.currently_editing.is_some() && !state.can_edit;
        if reading {
            return match key.code {
                KeyCode::Char('e') if key.modifiers.is_empty() => {
                    KeyOutcome::Request(Intent::BeginEdit)
                }
                _ => KeyOutcome::Ignored,
            };
        }
        if !state.can_edit {
            return KeyOutcome::Ignored;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('s') => KeyOutcome::Request(Intent::Save),
                _ => KeyOutcome::Ignored,
            };
        }

        let mut text = self.field_text().to_string();
        let mut cursor = self.cursor_position.min(text.len());
        let mut changed = false;

        match key.code {
            KeyCode::Tab | KeyCode::BackTab => {
                self.switch_focus();
                return KeyOutcome::Handled;
            }
            KeyCode::Enter if self.focus == Field::Title => {
                self.switch_focus();
                return KeyOutcome::Handled;
            }
            KeyCode::Enter => {
                text.insert(cursor, '\n');
                cursor += 1;
                changed = true;
            }
            KeyCode::Char(c) => {
                text.insert(cursor, c);
                cursor += c.len_utf8();
                changed = true;
            }
            KeyCode::Backspace => {
                if let Some(prev) = prev_boundary(&text, cursor) {
                    text.replace_range(prev..cursor, "");
                    cursor = prev;
                    changed = true;
                }
            }
            KeyCode::Delete => {
                if let Some(next) = next_boundary(&text, cursor) {
                    text.replace_range(cursor..next, "");
                    changed = true;
                }
            }
            KeyCode::Left => cursor = prev_boundary(&text, cursor).unwrap_or(cursor),
            KeyCode::Right => cursor = next_boundary(&text, cursor).unwrap_or(cursor),
            KeyCode::Home => cursor = line_start(&text, cursor),
            KeyCode::End => cursor = line_end(&text, cursor),
            KeyCode::Up => cursor = line_above(&text, cursor),
            KeyCode::Down => cursor = line_below(&text, cursor),
            _ => return KeyOutcome::Ignored,
        }

        if changed {
            match self.focus {
                Field::Title => self.set_title(text),
                Field::Content => self.set_content(text),
            }
        }
        self.cursor_position = cursor;
        KeyOutcome::Handled
    }

    /// The Edit control. Only an entry that is actually loaded can be edited
    /// this way; starting a new one goes through [`Editor::begin_new_entry`].
    pub fn begin_edit(&self, store: &Store) {
        if store.snapshot().editor.currently_editing.is_some() {
            store.dispatch(Action::SetCanEdit(true));
        }
    }

    /// Clears the loaded entry and opens an empty form. When no entry is
    /// loaded the current draft is kept, which is how an unsaved new entry
    /// is picked up again.
    pub fn begin_new_entry(&self, store: &Store) {
        if store.snapshot().editor.currently_editing.is_some() {
            store.dispatch(Action::SetCurrentlyEditing(None));
        }
        store.dispatch(Action::SetCanEdit(true));
    }

    /// Issues the create or update request for the current draft and leaves
    /// edit mode right away, before the request has resolved. Returns the
    /// request task, or `None` when nothing was sent.
    pub fn save(&self, store: &Store, api: Arc<dyn DiaryApi>) -> Option<JoinHandle<Result<()>>> {
        let state = store.snapshot().editor;
        let Some(diary_id) = state.active_diary_id else {
            store.show_alert(Alert::warning("Please select a diary."));
            return None;
        };

        let draft = self.draft.clone().unwrap_or_default();
        let task_store = store.clone();
        let task = match state.currently_editing {
            None => tokio::spawn(async move {
                match api.create_entry(&diary_id, &draft).await? {
                    Some(created) => {
                        info!(diary = %diary_id, entry = %created.entry.id, "entry created");
                        task_store.dispatch(Action::SetCurrentlyEditing(Some(created.entry)));
                        task_store.dispatch(Action::UpdateDiary(created.diary));
                    }
                    None => warn!(diary = %diary_id, "new entry was not saved"),
                }
                Ok(())
            }),
            Some(entry) => tokio::spawn(async move {
                match api.update_entry(&entry.id, &draft).await? {
                    Some(updated) => {
                        info!(entry = %updated.id, "entry updated");
                        task_store.dispatch(Action::SetCurrentlyEditing(Some(updated.clone())));
                        task_store.dispatch(Action::UpdateEntry(updated));
                    }
                    None => warn!(entry = %entry.id, "entry was not saved"),
                }
                Ok(())
            }),
        };

        store.dispatch(Action::SetCanEdit(false));
        Some(task)
    }

    fn field_text(&self) -> &str {
        match (&self.draft, self.focus) {
            (Some(draft), Field::Title) => &draft.title,
            (Some(draft), Field::Content) => &draft.content,
            (None, _) => "",
        }
    }

    fn switch_focus(&mut self) {
        self.focus = match self.focus {
            Field::Title => Field::Content,
            Field::Content => Field::Title,
        };
        self.cursor_position = self.field_text().len();
    }
}

fn prev_boundary(text: &str, cursor: usize) -> Option<usize> {
    text[..cursor].char_indices().next_back().map(|(i, _)| i)
}

fn next_boundary(text: &str, cursor: usize) -> Option<usize> {
    text[cursor..].chars().next().map(|c| cursor + c.len_utf8())
}

fn line_start(text: &str, cursor: usize) -> usize {
    text[..cursor].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn line_end(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .find('\n')
        .map(|i| cursor + i)
        .unwrap_or(text.len())
}

/// Byte offset of the char `column` chars into the line starting at `start`,
/// clamped to that line's end.
fn offset_in_line(text: &str, start: usize, column: usize) -> usize {
    let end = line_end(text, start);
    text[start..end]
        .char_indices()
        .nth(column)
        .map(|(i, _)| start + i)
        .unwrap_or(end)
}

fn line_above(text: &str, cursor: usize) -> usize {
    let current_line_start = line_start(text, cursor);
    if current_line_start == 0 {
        return cursor;
    }
    let column = text[current_line_start..cursor].chars().count();
    let prev_line_start = line_start(text, current_line_start - 1);
    offset_in_line(text, prev_line_start, column)
}

fn line_below(text: &str, cursor: usize) -> usize {
    let current_line_end = line_end(text, cursor);
    if current_line_end == text.len() {
        return cursor;
    }
    let column = text[line_start(text, cursor)..cursor].chars().count();
    offset_in_line(text, current_line_end + 1, column)
}
