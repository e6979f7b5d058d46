use crate::api::DiaryApi;
use crate::diary_state::{Action, Alert, AlertLevel, DiaryState, Store};
use crate::editor::{Editor, EditorView, Field, Intent, KeyOutcome};
use color_eyre::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use std::{
    io::{stdout, Stdout},
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{error, info};
use unicode_width::UnicodeWidthStr;

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

type SaveTask = JoinHandle<Result<()>>;

pub struct UI {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl UI {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        stdout().execute(EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout());
        let terminal = Terminal::new(backend)?;

        Ok(UI { terminal })
    }

    pub async fn run(&mut self, store: Store, api: Arc<dyn DiaryApi>) -> Result<()> {
        let mut editor = Editor::new();
        let mut updates = store.subscribe();
        let mut events = EventStream::new();
        let mut tick = tokio::time::interval(Duration::from_millis(250));
        let mut saves: Vec<SaveTask> = Vec::new();

        loop {
            let state = store.snapshot();
            editor.sync(&state.editor);
            self.display(&state, &editor)?;

            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = events.next() => match event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        let flow = handle_key(key, &mut editor, &store, &api, &mut saves);
                        if flow == Flow::Quit {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                },
                _ = tick.tick() => {}
            }

            reap(&mut saves, &store).await;
        }

        if !saves.is_empty() {
            info!(pending = saves.len(), "quitting with saves still in flight");
        }
        Ok(())
    }

    fn display(&mut self, state: &DiaryState, editor: &Editor) -> Result<()> {
        self.terminal.draw(|f| draw(f, state, editor))?;
        Ok(())
    }
}

impl Drop for UI {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    }
}

/// Acts on a key against the store as it is now, not as it was when the
/// screen was last drawn.
fn handle_key(
    key: KeyEvent,
    editor: &mut Editor,
    store: &Store,
    api: &Arc<dyn DiaryApi>,
    saves: &mut Vec<SaveTask>,
) -> Flow {
    let state = store.snapshot();
    editor.sync(&state.editor);
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Flow::Quit;
    }
    if state.alert.is_some() {
        store.dispatch(Action::DismissAlert);
        return Flow::Continue;
    }

    match editor.handle_key(key, &state.editor) {
        KeyOutcome::Handled => {}
        KeyOutcome::Request(Intent::BeginEdit) => editor.begin_edit(store),
        KeyOutcome::Request(Intent::Save) => {
            if let Some(task) = editor.save(store, api.clone()) {
                saves.push(task);
            }
        }
        KeyOutcome::Ignored => match key.code {
            KeyCode::Esc if state.editor.can_edit => store.dispatch(Action::SetCanEdit(false)),
            KeyCode::Char('n') if !state.editor.can_edit => editor.begin_new_entry(store),
            KeyCode::Char('q') if !state.editor.can_edit => return Flow::Quit,
            _ => {}
        },
    }
    Flow::Continue
}

/// Collects finished save tasks. A task only fails when the request never
/// reached the server; that is reported here since nothing else catches it.
async fn reap(saves: &mut Vec<SaveTask>, store: &Store) {
    let (done, pending): (Vec<_>, Vec<_>) = saves.drain(..).partition(|t| t.is_finished());
    *saves = pending;

    for task in done {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("save failed: {e:#}");
                store.show_alert(Alert::error(format!(
                    "Could not reach the diary server: {e}"
                )));
            }
            Err(e) => error!("save task did not complete: {e}"),
        }
    }
}

fn draw(f: &mut Frame, state: &DiaryState, editor: &Editor) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, chunks[0], state);

    let view = editor.view(&state.editor);
    draw_editor(f, chunks[1], &view);

    let controls = Paragraph::new(controls(state.alert.is_some(), &view))
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(controls, chunks[2]);

    if let Some(alert) = &state.alert {
        draw_alert(f, alert);
    }
}

fn draw_header(f: &mut Frame, area: Rect, state: &DiaryState) {
    let diary = match &state.editor.active_diary_id {
        Some(id) => state
            .diaries
            .iter()
            .find(|d| &d.id == id)
            .map(|d| match &d.kind {
                Some(kind) => format!("{} ({kind}, {} entries)", d.title, d.entry_ids.len()),
                None => format!("{} ({} entries)", d.title, d.entry_ids.len()),
            })
            .unwrap_or_else(|| format!("Diary {id}")),
        None => "No diary selected".to_string(),
    };
    let saved = state
        .editor
        .currently_editing
        .as_ref()
        .and_then(|e| e.updated_at.or(e.created_at))
        .map(|t| format!(" · saved {}", t.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();

    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            "Diary Editor",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("{diary}{saved}"),
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .alignment(Alignment::Center);
    f.render_widget(header, area);
}

fn draw_editor(f: &mut Frame, area: Rect, view: &EditorView<'_>) {
    match view {
        EditorView::Reading { title, content } => {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(2), Constraint::Min(0)])
                .split(area);

            let heading = Paragraph::new(Line::from(vec![
                Span::styled(
                    title.to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::styled("[e] Edit", Style::default().fg(Color::Yellow)),
            ]))
            .block(Block::default().borders(Borders::BOTTOM));
            f.render_widget(heading, chunks[0]);

            let body = Paragraph::new(content.clone()).wrap(Wrap { trim: false });
            f.render_widget(body, chunks[1]);
        }
        EditorView::Editing {
            title,
            content,
            enabled,
            focus,
            cursor,
        } => {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(3),
                    Constraint::Length(1),
                ])
                .split(area);

            let field_style = |field: Field| {
                if !enabled {
                    Style::default().fg(Color::DarkGray)
                } else if *focus == field {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default()
                }
            };

            let title_input = Paragraph::new(title.to_string()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Title")
                    .border_style(field_style(Field::Title)),
            );
            f.render_widget(title_input, chunks[0]);

            let content_block = Block::default()
                .borders(Borders::ALL)
                .title("Content")
                .border_style(field_style(Field::Content));
            let visible_lines = content_block.inner(chunks[1]).height;
            let scroll = if *enabled && *focus == Field::Content {
                let (_, line) = cursor_offset(content, *cursor);
                line.saturating_sub(visible_lines.saturating_sub(1))
            } else {
                0
            };
            let content_input = if content.is_empty() {
                Paragraph::new(Span::styled(
                    "Supports markdown!",
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                ))
            } else {
                Paragraph::new(content.to_string()).scroll((scroll, 0))
            };
            f.render_widget(content_input.block(content_block), chunks[1]);

            let save_style = if *enabled {
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            f.render_widget(
                Paragraph::new(Span::styled("[ Save ]", save_style)).alignment(Alignment::Right),
                chunks[2],
            );

            if *enabled {
                let (text, field_area, scroll) = match focus {
                    Field::Title => (*title, chunks[0], 0),
                    Field::Content => (*content, chunks[1], scroll),
                };
                let (x, y) = cursor_offset(text, *cursor);
                let inner = Block::default().borders(Borders::ALL).inner(field_area);
                let x = (inner.x + x).min(inner.right().saturating_sub(1));
                let y = (inner.y + y.saturating_sub(scroll)).min(inner.bottom().saturating_sub(1));
                f.set_cursor_position((x, y));
            }
        }
    }
}

/// Column (display width) and line of a byte cursor within `text`.
fn cursor_offset(text: &str, cursor: usize) -> (u16, u16) {
    let before = text.get(..cursor).unwrap_or(text);
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = before.matches('\n').count();
    let column = before[line_start..].width();
    (
        u16::try_from(column).unwrap_or(u16::MAX),
        u16::try_from(line).unwrap_or(u16::MAX),
    )
}

fn controls(alert: bool, view: &EditorView<'_>) -> Line<'static> {
    let keys: &[(&str, &str)] = match view {
        _ if alert => &[("any key", "dismiss")],
        EditorView::Reading { .. } => &[("e", "edit"), ("n", "new entry"), ("q", "quit")],
        EditorView::Editing { enabled: true, .. } => &[
            ("Ctrl-S", "save"),
            ("Tab", "switch field"),
            ("Esc", "stop editing"),
            ("Ctrl-C", "quit"),
        ],
        EditorView::Editing { .. } => &[("n", "new entry"), ("q", "quit")],
    };

    let mut spans = vec![Span::raw("Press ")];
    for (i, (key, what)) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(", "));
        }
        spans.push(Span::styled(
            key.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(format!(" to {what}")));
    }
    Line::from(spans)
}

fn draw_alert(f: &mut Frame, alert: &Alert) {
    let (title, color) = match alert.level {
        AlertLevel::Warning => ("Warning", Color::Yellow),
        AlertLevel::Error => ("Error", Color::Red),
    };
    let area = centered(f.area(), 50, 5);

    let popup = Paragraph::new(alert.message.clone())
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(color).add_modifier(Modifier::BOLD)),
        );
    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

fn centered(area: Rect, percent_x: u16, height: u16) -> Rect {
    let scaled = u32::from(area.width) * u32::from(percent_x) / 100;
    let width = u16::try_from(scaled).unwrap_or(u16::MAX).max(20).min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CreatedEntry;
    use crate::diary_entry::{Diary, DiaryEntry, Draft, Id};
    use async_trait::async_trait;
    use ratatui::backend::TestBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingApi {
        requests: AtomicUsize,
    }

    #[async_trait]
    impl DiaryApi for CountingApi {
        async fn create_entry(&self, _: &Id, _: &Draft) -> Result<Option<CreatedEntry>> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn update_entry(&self, _: &Id, _: &Draft) -> Result<Option<DiaryEntry>> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    fn render(state: &DiaryState, editor: &mut Editor) -> String {
        editor.sync(&state.editor);
        let mut terminal = Terminal::new(TestBackend::new(70, 20)).unwrap();
        terminal.draw(|f| draw(f, state, editor)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn store_with(entry: Option<DiaryEntry>, can_edit: bool, diary: Option<&str>) -> Store {
        let store = Store::new(DiaryState::new(diary.map(Id::from)));
        store.dispatch(Action::SetCurrentlyEditing(entry));
        store.dispatch(Action::SetCanEdit(can_edit));
        store
    }

    #[test]
    fn reading_view_shows_formatted_content() {
        let store = store_with(Some(DiaryEntry::new("1", "Monday", "**bold**")), false, Some("d1"));

        let screen = render(&store.snapshot(), &mut Editor::new());

        assert!(screen.contains("Monday"));
        assert!(screen.contains("[e] Edit"));
        assert!(screen.contains("bold"));
        assert!(!screen.contains("**"));
    }

    #[test]
    fn empty_form_is_disabled_with_placeholder() {
        let store = store_with(None, false, None);

        let screen = render(&store.snapshot(), &mut Editor::new());

        assert!(screen.contains("Title"));
        assert!(screen.contains("Supports markdown!"));
        assert!(screen.contains("[ Save ]"));
        assert!(screen.contains("No diary selected"));
    }

    #[test]
    fn header_names_the_active_diary() {
        let store = store_with(None, false, Some("d1"));
        store.dispatch(Action::UpdateDiary(Diary {
            id: Id::from("d1"),
            title: "Travel".into(),
            kind: Some("private".into()),
            entry_ids: vec![Id::from("e1"), Id::from("e2")],
        }));

        let screen = render(&store.snapshot(), &mut Editor::new());

        assert!(screen.contains("Travel (private, 2 entries)"));
    }

    #[test]
    fn alert_is_drawn_over_the_editor() {
        let store = store_with(None, true, None);
        store.show_alert(Alert::warning("Please select a diary."));

        let screen = render(&store.snapshot(), &mut Editor::new());

        assert!(screen.contains("Warning"));
        assert!(screen.contains("Please select a diary."));
    }

    #[test]
    fn any_key_dismisses_an_alert_first() {
        let store = store_with(None, false, None);
        store.show_alert(Alert::warning("Please select a diary."));
        let api: Arc<dyn DiaryApi> = Arc::new(CountingApi::default());
        let mut editor = Editor::new();
        let mut saves = Vec::new();

        let flow = handle_key(press(KeyCode::Char('q')), &mut editor, &store, &api, &mut saves);

        assert_eq!(flow, Flow::Continue);
        assert!(store.snapshot().alert.is_none());
    }

    #[test]
    fn keys_see_changes_made_after_the_last_draw() {
        let store = store_with(Some(DiaryEntry::new("1", "A", "B")), false, None);
        let api: Arc<dyn DiaryApi> = Arc::new(CountingApi::default());
        let mut editor = Editor::new();
        let mut saves = Vec::new();
        render(&store.snapshot(), &mut editor);

        store.show_alert(Alert::error("Entry not found"));
        let flow = handle_key(press(KeyCode::Char('q')), &mut editor, &store, &api, &mut saves);

        assert_eq!(flow, Flow::Continue);
        assert!(store.snapshot().alert.is_none());
    }

    #[test]
    fn centered_popup_fits_very_wide_terminals() {
        let area = Rect {
            x: 0,
            y: 0,
            width: 4000,
            height: 50,
        };

        let popup = centered(area, 50, 5);

        assert_eq!(popup.width, 2000);
        assert_eq!(popup.x, 1000);
        assert_eq!(popup.height, 5);
    }

    #[test]
    fn quit_only_when_not_typing() {
        let api: Arc<dyn DiaryApi> = Arc::new(CountingApi::default());
        let mut saves = Vec::new();

        let reading = store_with(Some(DiaryEntry::new("1", "A", "B")), false, None);
        let mut editor = Editor::new();
        editor.sync(&reading.snapshot().editor);
        let flow = handle_key(press(KeyCode::Char('q')), &mut editor, &reading, &api, &mut saves);
        assert_eq!(flow, Flow::Quit);

        let editing = store_with(None, true, None);
        let mut editor = Editor::new();
        editor.sync(&editing.snapshot().editor);
        let flow = handle_key(press(KeyCode::Char('q')), &mut editor, &editing, &api, &mut saves);
        assert_eq!(flow, Flow::Continue);

        let flow = handle_key(ctrl('c'), &mut editor, &editing, &api, &mut saves);
        assert_eq!(flow, Flow::Quit);
    }

    #[test]
    fn edit_and_escape_toggle_edit_mode() {
        let store = store_with(Some(DiaryEntry::new("1", "A", "B")), false, Some("d1"));
        let api: Arc<dyn DiaryApi> = Arc::new(CountingApi::default());
        let mut editor = Editor::new();
        let mut saves = Vec::new();
        editor.sync(&store.snapshot().editor);

        handle_key(press(KeyCode::Char('e')), &mut editor, &store, &api, &mut saves);
        assert!(store.snapshot().editor.can_edit);

        handle_key(press(KeyCode::Esc), &mut editor, &store, &api, &mut saves);
        assert!(!store.snapshot().editor.can_edit);
    }

    #[test]
    fn ctrl_s_without_a_diary_warns() {
        let store = store_with(None, true, None);
        let api = Arc::new(CountingApi::default());
        let dyn_api: Arc<dyn DiaryApi> = api.clone();
        let mut editor = Editor::new();
        let mut saves = Vec::new();
        editor.sync(&store.snapshot().editor);

        handle_key(ctrl('s'), &mut editor, &store, &dyn_api, &mut saves);

        assert!(saves.is_empty());
        assert_eq!(api.requests.load(Ordering::SeqCst), 0);
        assert_eq!(
            store.snapshot().alert.map(|a| a.level),
            Some(AlertLevel::Warning)
        );
    }

    #[tokio::test]
    async fn ctrl_s_sends_one_request_and_leaves_edit_mode() {
        let store = store_with(Some(DiaryEntry::new("7", "A", "B")), true, Some("d1"));
        let api = Arc::new(CountingApi::default());
        let dyn_api: Arc<dyn DiaryApi> = api.clone();
        let mut editor = Editor::new();
        let mut saves = Vec::new();
        editor.sync(&store.snapshot().editor);

        handle_key(ctrl('s'), &mut editor, &store, &dyn_api, &mut saves);
        assert!(!store.snapshot().editor.can_edit);

        for task in saves.drain(..) {
            task.await.unwrap().unwrap();
        }
        assert_eq!(api.requests.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.snapshot().editor.currently_editing,
            Some(DiaryEntry::new("7", "A", "B"))
        );
    }

    #[tokio::test]
    async fn failed_save_task_raises_an_error_alert() {
        let store = Store::new(DiaryState::default());
        let mut saves: Vec<SaveTask> = vec![tokio::spawn(async {
            Err::<(), _>(color_eyre::eyre::eyre!("connection refused"))
        })];
        while !saves[0].is_finished() {
            tokio::task::yield_now().await;
        }

        reap(&mut saves, &store).await;

        assert!(saves.is_empty());
        assert_eq!(
            store.snapshot().alert.map(|a| a.level),
            Some(AlertLevel::Error)
        );
    }

    #[test]
    fn cursor_offset_counts_display_width() {
        assert_eq!(cursor_offset("abc", 2), (2, 0));
        assert_eq!(cursor_offset("ab\ncd", 4), (1, 1));
        assert_eq!(cursor_offset("日本", "日本".len()), (4, 0));
    }
}
