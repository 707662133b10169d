use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use askql_core::assistant::{self, AssistantBackend, ConnectReply, QueryReply};
use askql_core::connection_form::FormField;
use askql_core::error::BackendError;
use askql_core::feedback::FeedbackEvent;
use askql_core::provider_policy::{next_selector, previous_selector, ProviderPolicy};
use askql_core::session::{
    Completion, ConnectRequest, ConnectTicket, QueryRequest, QueryTicket, Session, SessionState,
};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, info};

const TICK_RATE: Duration = Duration::from_millis(120);

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    ConnectionForm,
    Question,
    Schema,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Self::ConnectionForm => Self::Question,
            Self::Question => Self::Schema,
            Self::Schema => Self::ConnectionForm,
        }
    }

    fn previous(self) -> Self {
        match self {
            Self::ConnectionForm => Self::Schema,
            Self::Question => Self::ConnectionForm,
            Self::Schema => Self::Question,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::ConnectionForm => "Database Connection",
            Self::Question => "Question",
            Self::Schema => "Database Schema",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    NextPane,
    PreviousPane,
    Submit,
    Input(char),
    Backspace,
    Navigate(DirectionKey),
    Feedback { positive: bool },
}

/// Work the event loop hands to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Effect {
    Connect(ConnectRequest),
    Query(QueryRequest),
    Feedback(FeedbackEvent),
}

/// Backend outcomes reported back to the event loop.
#[derive(Debug)]
enum WorkflowEvent {
    Connected {
        ticket: ConnectTicket,
        outcome: Result<ConnectReply, BackendError>,
    },
    Answered {
        ticket: QueryTicket,
        outcome: Result<QueryReply, BackendError>,
    },
}

#[derive(Debug)]
struct TuiApp {
    session: Session,
    pane: Pane,
    active_field: usize,
    schema_scroll: u16,
    show_help: bool,
    should_quit: bool,
    status_line: String,
}

impl TuiApp {
    fn new(session: Session) -> Self {
        Self {
            session,
            pane: Pane::ConnectionForm,
            active_field: 0,
            schema_scroll: 0,
            show_help: false,
            should_quit: false,
            status_line: "Fill in the connection form and press Enter to connect".to_string(),
        }
    }

    fn handle(&mut self, msg: Msg) -> Option<Effect> {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::NextPane => self.pane = self.pane.next(),
            Msg::PreviousPane => self.pane = self.pane.previous(),
            Msg::Submit => return self.submit(),
            Msg::Input(character) => self.edit(|value| value.push(character)),
            Msg::Backspace => self.edit(|value| {
                value.pop();
            }),
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::Feedback { positive } => return self.feedback(positive),
        }
        None
    }

    fn active_form_field(&self) -> FormField {
        let fields = self.session.config().visible_fields();
        fields[self.active_field.min(fields.len() - 1)]
    }

    fn edit(&mut self, apply: impl FnOnce(&mut String)) {
        match self.pane {
            Pane::ConnectionForm => {
                let field = self.active_form_field();
                // The selector only cycles through known providers.
                if field == FormField::ModelSelector {
                    self.status_line = "Use Left/Right to change the LLM type".to_string();
                    return;
                }
                let mut value = self.session.config().value(field).to_string();
                apply(&mut value);
                self.session.update_field(field, value);
                self.clamp_active_field();
            }
            Pane::Question => {
                let mut question = self.session.question().to_string();
                apply(&mut question);
                self.session.set_question(question);
            }
            Pane::Schema => {}
        }
    }

    fn navigate(&mut self, direction: DirectionKey) {
        match (self.pane, direction) {
            (Pane::ConnectionForm, DirectionKey::Up) => {
                self.active_field = self.active_field.saturating_sub(1);
            }
            (Pane::ConnectionForm, DirectionKey::Down) => {
                let last = self.session.config().visible_fields().len() - 1;
                self.active_field = (self.active_field + 1).min(last);
            }
            (Pane::ConnectionForm, DirectionKey::Left | DirectionKey::Right) => {
                if self.active_form_field() != FormField::ModelSelector {
                    return;
                }
                let current = self.session.config().model_selector.clone();
                let selector = if direction == DirectionKey::Left {
                    previous_selector(&current)
                } else {
                    next_selector(&current)
                };
                self.session.update_field(FormField::ModelSelector, selector);
                self.clamp_active_field();
                self.status_line = format!("LLM Type: {selector}");
            }
            (Pane::Schema, DirectionKey::Up) => {
                self.schema_scroll = self.schema_scroll.saturating_sub(1);
            }
            (Pane::Schema, DirectionKey::Down) => {
                self.schema_scroll = self.schema_scroll.saturating_add(1);
            }
            _ => {}
        }
    }

    /// Switching providers can hide the field under the cursor.
    fn clamp_active_field(&mut self) {
        let last = self.session.config().visible_fields().len() - 1;
        self.active_field = self.active_field.min(last);
    }

    fn submit(&mut self) -> Option<Effect> {
        match self.pane {
            Pane::ConnectionForm => match self.session.begin_connect() {
                Ok(request) => {
                    self.schema_scroll = 0;
                    self.status_line = "Connecting...".to_string();
                    Some(Effect::Connect(request))
                }
                Err(error) => {
                    self.status_line = error.to_string();
                    None
                }
            },
            Pane::Question => match self.session.begin_query() {
                Ok(request) => {
                    self.status_line = "Asking the assistant...".to_string();
                    Some(Effect::Query(request))
                }
                Err(error) => {
                    self.status_line = error.to_string();
                    None
                }
            },
            Pane::Schema => {
                self.status_line = "Nothing to submit in this view".to_string();
                None
            }
        }
    }

    fn feedback(&mut self, positive: bool) -> Option<Effect> {
        let event = self.session.feedback_event(positive);
        self.status_line = match (&event, positive) {
            (Some(_), true) => "Thanks! Marked the query as useful".to_string(),
            (Some(_), false) => "Thanks! Marked the query as not useful".to_string(),
            (None, _) if self.session.result().generated_query.is_empty() => {
                "No generated query to rate yet".to_string()
            }
            (None, _) => "Feedback noted".to_string(),
        };
        event.map(Effect::Feedback)
    }

    fn apply(&mut self, event: WorkflowEvent) {
        match event {
            WorkflowEvent::Connected { ticket, outcome } => {
                match self.session.complete_connect(ticket, outcome) {
                    Completion::Applied(Ok(_)) => {
                        self.status_line = "Connected to database".to_string();
                        self.pane = Pane::Question;
                    }
                    Completion::Applied(Err(error)) => self.status_line = error.to_string(),
                    Completion::Discarded => {}
                }
            }
            WorkflowEvent::Answered { ticket, outcome } => {
                match self.session.complete_query(ticket, outcome) {
                    Completion::Applied(Ok(_)) => {
                        self.status_line = "Answer received".to_string();
                    }
                    Completion::Applied(Err(error)) => self.status_line = error.to_string(),
                    Completion::Discarded => {}
                }
            }
        }
    }
}

/// Spawns the backend call for `effect`; the outcome comes back on `events`.
fn dispatch<B>(
    runtime: &Handle,
    backend: &Arc<B>,
    events: &UnboundedSender<WorkflowEvent>,
    effect: Effect,
) where
    B: AssistantBackend + 'static,
{
    let backend = Arc::clone(backend);
    let events = events.clone();
    match effect {
        Effect::Connect(request) => {
            runtime.spawn(async move {
                let outcome = backend.connect(&request.config).await;
                let _ = events.send(WorkflowEvent::Connected {
                    ticket: request.ticket,
                    outcome,
                });
            });
        }
        Effect::Query(request) => {
            runtime.spawn(async move {
                let outcome = backend.query(&request.config, &request.question).await;
                let _ = events.send(WorkflowEvent::Answered {
                    ticket: request.ticket,
                    outcome,
                });
            });
        }
        Effect::Feedback(event) => {
            runtime.spawn(async move {
                assistant::deliver_feedback(backend.as_ref(), event).await;
            });
        }
    }
}

pub fn run<B>(backend: Arc<B>, session: Session) -> Result<(), TuiError>
where
    B: AssistantBackend + 'static,
{
    let runtime = Runtime::new()?;
    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, runtime.handle(), &backend, session);
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<B>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    runtime: &Handle,
    backend: &Arc<B>,
    session: Session,
) -> Result<(), TuiError>
where
    B: AssistantBackend + 'static,
{
    let mut app = TuiApp::new(session);
    let (events_tx, mut events_rx) = unbounded_channel::<WorkflowEvent>();
    info!("assistant session started");

    loop {
        terminal.draw(|frame| render(frame, &app))?;

        if event::poll(TICK_RATE)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(effect) = map_key_event(key).and_then(|msg| app.handle(msg)) {
                        dispatch(runtime, backend, &events_tx, effect);
                    }
                }
            }
        }

        while let Ok(event) = events_rx.try_recv() {
            debug!(?event, "workflow event received");
            app.apply(event);
        }

        if app.should_quit {
            break;
        }
    }

    info!("assistant session closed");
    Ok(())
}

fn render(frame: &mut Frame<'_>, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(4),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(chunks[1]);
    render_form(frame, app, columns[0]);

    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(50),
            Constraint::Length(3),
            Constraint::Min(5),
        ])
        .split(columns[1]);
    render_schema(frame, app, main[0]);
    render_question(frame, app, main[1]);
    render_result(frame, app, main[2]);

    let footer = Paragraph::new(vec![
        Line::from(
            "Tab: switch pane | Enter: connect/ask | \u{2190}/\u{2192}: LLM type | \
             Ctrl+Y/Ctrl+N: rate query | F1: help | Esc: quit",
        ),
        Line::from(format!("Status: {}", app.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Keys"));
    frame.render_widget(footer, chunks[2]);

    if app.show_help {
        render_help_popup(frame);
    }
}

fn pane_block(app: &TuiApp, pane: Pane) -> Block<'static> {
    let block = Block::default().borders(Borders::ALL).title(pane.name());
    if app.pane == pane {
        block.border_style(Style::default().fg(Color::Yellow))
    } else {
        block
    }
}

fn render_header(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let (state_label, state_color) = match app.session.state() {
        SessionState::Disconnected => ("not connected", Color::Gray),
        SessionState::Connecting => ("connecting...", Color::Yellow),
        SessionState::Connected => ("Connected to database", Color::Green),
        SessionState::ConnectionFailed => ("connection failed", Color::Red),
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" Pane: {} ", app.pane.name()),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(state_label, Style::default().fg(state_color)),
        Span::raw(" | "),
        Span::raw(llm_label(app.session.config().model_selector.as_str())),
        Span::raw(" | "),
        Span::raw(format!(
            "Query: {}",
            if app.session.is_query_running() {
                "running"
            } else {
                "idle"
            }
        )),
    ]))
    .block(Block::default().borders(Borders::ALL).title("SQL Assistant"));
    frame.render_widget(header, area);
}

fn llm_label(selector: &str) -> String {
    if ProviderPolicy::is_known(selector) {
        format!("LLM: {selector} ({})", ProviderPolicy::lookup(selector).provider)
    } else {
        format!("LLM: {selector} (no credentials required)")
    }
}

fn render_form(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let config = app.session.config();
    let mut lines = Vec::new();
    for (index, field) in config.visible_fields().into_iter().enumerate() {
        let marker = if app.pane == Pane::ConnectionForm && index == app.active_field {
            ">"
        } else {
            " "
        };
        let value = config.value(field);
        let shown = if field.is_credential() {
            "*".repeat(value.chars().count())
        } else {
            value.to_string()
        };
        let label_style = if value.is_empty() {
            Style::default().fg(Color::Red)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        };
        lines.push(Line::from(vec![
            Span::raw(format!("{marker} ")),
            Span::styled(format!("{}*", config.label(field)), label_style),
        ]));
        lines.push(Line::from(format!("    {shown}")));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(if app.session.is_connecting() {
        "[ Connecting... ]"
    } else {
        "[ Connect ]"
    }));

    let form = Paragraph::new(lines)
        .block(pane_block(app, Pane::ConnectionForm))
        .wrap(Wrap { trim: false });
    frame.render_widget(form, area);
}

fn render_schema(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let session = &app.session;
    let body = if session.is_connecting() {
        Paragraph::new("Loading schema...")
    } else if let Some(error) = session.error() {
        Paragraph::new(error.to_string()).style(Style::default().fg(Color::Red))
    } else if !session.schema().is_empty() {
        Paragraph::new(session.schema().to_string())
            .style(Style::default().fg(Color::Green))
            .scroll((app.schema_scroll, 0))
    } else {
        Paragraph::new("No schema available. Please connect to a database first.")
    };
    frame.render_widget(
        body.block(pane_block(app, Pane::Schema))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_question(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let question = app.session.question();
    let text = if question.is_empty() && app.pane != Pane::Question {
        Line::styled(
            "Ask a question about your database",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Line::from(question.to_string())
    };
    frame.render_widget(
        Paragraph::new(text).block(pane_block(app, Pane::Question)),
        area,
    );
}

fn render_result(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let result = app.session.result();
    let mut lines = Vec::new();
    if !result.generated_query.is_empty() {
        lines.push(Line::styled(
            "Generated SQL Query:",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        lines.extend(
            result
                .generated_query
                .lines()
                .map(|line| Line::styled(line.to_string(), Style::default().fg(Color::Green))),
        );
        lines.push(Line::from(""));
    }
    if !result.answer.is_empty() {
        lines.push(Line::styled(
            "Answer:",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        lines.extend(result.answer.lines().map(|line| Line::from(line.to_string())));
    }
    if result.is_empty() && app.session.is_query_running() {
        lines.push(Line::from("Waiting for the assistant..."));
    }

    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Result"))
        .wrap(Wrap { trim: false });
    frame.render_widget(widget, area);
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Global keymap"),
        Line::from("Esc / Ctrl+C: quit"),
        Line::from("F1: toggle help"),
        Line::from("Tab / Shift+Tab: cycle panes"),
        Line::from("Enter: connect (form) or ask (question)"),
        Line::from("Up/Down: move between form fields, scroll schema"),
        Line::from("Left/Right on LLM Type: switch provider"),
        Line::from("Ctrl+Y: generated query was useful"),
        Line::from("Ctrl+N: generated query was not useful"),
    ])
    .alignment(Alignment::Left)
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn map_key_event(key: KeyEvent) -> Option<Msg> {
    match (key.modifiers, key.code) {
        (_, KeyCode::Esc) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => Some(Msg::Quit),
        (KeyModifiers::CONTROL, KeyCode::Char('y')) => Some(Msg::Feedback { positive: true }),
        (KeyModifiers::CONTROL, KeyCode::Char('n')) => Some(Msg::Feedback { positive: false }),
        (_, KeyCode::F(1)) => Some(Msg::ToggleHelp),
        (_, KeyCode::Tab) => Some(Msg::NextPane),
        (_, KeyCode::BackTab) => Some(Msg::PreviousPane),
        (_, KeyCode::Enter) => Some(Msg::Submit),
        (_, KeyCode::Backspace) => Some(Msg::Backspace),
        (_, KeyCode::Up) => Some(Msg::Navigate(DirectionKey::Up)),
        (_, KeyCode::Down) => Some(Msg::Navigate(DirectionKey::Down)),
        (_, KeyCode::Left) => Some(Msg::Navigate(DirectionKey::Left)),
        (_, KeyCode::Right) => Some(Msg::Navigate(DirectionKey::Right)),
        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(character)) => {
            Some(Msg::Input(character))
        }
        _ => None,
    }
}
