use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::ai::ResearchProvider;
use crate::db::Database;
use crate::mail;
use crate::models::{Contact, OutreachResult, Profile, RunOutcome, Status};
use crate::pipeline::{Pipeline, PipelineError, RunReport, StopFlag};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

enum WorkerEvent {
    Published(usize, OutreachResult),
    Finished(Result<RunReport, PipelineError>),
}

/// A batch running on a worker thread while the UI watches it.
struct LiveRun {
    run_id: i64,
    total: usize,
    contacts: Vec<Contact>,
    stop: StopFlag,
    rx: Receiver<WorkerEvent>,
    handle: Option<JoinHandle<()>>,
    done: bool,
}

struct AppState {
    results: Vec<OutreachResult>,
    selected: usize,
    scroll_offset: u16,
    quota_halted: bool,
    preserved: usize,
    message: Option<String>,
}

impl AppState {
    fn new(results: Vec<OutreachResult>) -> Self {
        Self {
            results,
            selected: 0,
            scroll_offset: 0,
            quota_halted: false,
            preserved: 0,
            message: None,
        }
    }

    fn current(&self) -> Option<&OutreachResult> {
        self.results.get(self.selected)
    }

    /// Place a published result at its run position.
    fn upsert(&mut self, position: usize, result: OutreachResult) {
        if position < self.results.len() {
            self.results[position] = result;
        } else {
            self.results.push(result);
        }
    }

    fn next(&mut self) {
        if !self.results.is_empty() && self.selected < self.results.len() - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn copy_current(&mut self) {
        let Some(result) = self.current() else { return };
        if result.status != Status::Completed {
            self.message = Some("No draft to copy for this contact".to_string());
            return;
        }
        self.message = Some(match mail::copy_to_clipboard(&result.drafted_email) {
            Ok(()) => "Draft copied to clipboard!".to_string(),
            Err(e) => e.to_string(),
        });
    }

    fn mail_current(&mut self) {
        let Some(result) = self.current() else { return };
        if result.status != Status::Completed {
            self.message = Some("No draft to open for this contact".to_string());
            return;
        }
        self.message = Some(
            match mail::compose(&result.email, mail::DEFAULT_SUBJECT, &result.drafted_email) {
                Ok(()) => mail::ATTACH_REMINDER.to_string(),
                Err(e) => e.to_string(),
            },
        );
    }
}

pub fn run_browse(db: &mut Database) -> Result<()> {
    let Some(run) = db.latest_run()? else {
        println!("No runs yet.");
        return Ok(());
    };
    let results = db.list_results(run.id, None)?;
    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    let mut state = AppState::new(results);
    state.quota_halted = run.outcome == RunOutcome::QuotaExhausted;
    state.preserved = db.pending_contacts()?.len();

    with_terminal(|terminal| run_loop(terminal, &mut state, db, None))
}

/// Run a batch on a worker thread and show results as they arrive.
pub fn run_live(
    db: &mut Database,
    provider: Box<dyn ResearchProvider + Send>,
    profile: Profile,
    contacts: Vec<Contact>,
) -> Result<()> {
    let run_id = db.start_run(provider.model_name())?;
    let stop = StopFlag::new();
    let (tx, rx) = mpsc::channel();

    let worker_stop = stop.clone();
    let worker_contacts = contacts.clone();
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let pipeline = Pipeline::new(provider.as_ref(), worker_stop);
        let _ = ready_tx.send(());
        let events = tx.clone();
        let mut observer = |position: usize, result: &OutreachResult| {
            let _ = events.send(WorkerEvent::Published(position, result.clone()));
        };
        let report = pipeline.run(&profile, &worker_contacts, &mut observer);
        let _ = tx.send(WorkerEvent::Finished(report));
    });

    // The pipeline clears the stop flag when built; the `s` key must come after
    let _ = ready_rx.recv();

    let mut live = LiveRun {
        run_id,
        total: contacts.len(),
        contacts,
        stop,
        rx,
        handle: Some(handle),
        done: false,
    };
    let mut state = AppState::new(Vec::new());

    let result = with_terminal(|terminal| run_loop(terminal, &mut state, db, Some(&mut live)));

    if !live.done {
        println!("Finishing the current contact...");
        live.stop.request();
        while !live.done {
            match live.rx.recv() {
                Ok(event) => apply_event(db, &mut state, &mut live, event)?,
                Err(_) => break,
            }
        }
    }
    if let Some(handle) = live.handle.take() {
        let _ = handle.join();
    }

    if let Some(message) = &state.message {
        println!("{}", message);
    }
    result
}

fn with_terminal<F>(body: F) -> Result<()>
where
    F: FnOnce(&mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()>,
{
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = body(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn apply_event(db: &mut Database, state: &mut AppState, live: &mut LiveRun, event: WorkerEvent) -> Result<()> {
    match event {
        WorkerEvent::Published(position, result) => {
            if let Err(e) = db.save_result(live.run_id, position, &result) {
                tracing::warn!(email = %result.email, error = %e, "failed to save result");
            }
            state.upsert(position, result);
        }
        WorkerEvent::Finished(Ok(report)) => {
            let unprocessed = report.resumable();
            db.record_outcome(live.run_id, report.outcome, &unprocessed)?;
            state.preserved = unprocessed.len();
            state.quota_halted = report.outcome == RunOutcome::QuotaExhausted;
            state.message = Some(match report.outcome {
                RunOutcome::QuotaExhausted => format!(
                    "API quota reached. {} contact(s) preserved for 'coffeechat resume'.",
                    unprocessed.len()
                ),
                RunOutcome::Cancelled => format!(
                    "Stopped. {} contact(s) preserved for 'coffeechat resume'.",
                    unprocessed.len()
                ),
                _ => format!("Done. {} contact(s) processed.", report.results.len()),
            });
            live.done = true;
        }
        WorkerEvent::Finished(Err(e)) => {
            db.record_outcome(live.run_id, RunOutcome::Cancelled, &live.contacts)?;
            state.message = Some(e.to_string());
            live.done = true;
        }
    }
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    db: &mut Database,
    mut live: Option<&mut LiveRun>,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        if let Some(run) = live.as_deref_mut() {
            while !run.done {
                match run.rx.try_recv() {
                    Ok(event) => apply_event(db, state, run, event)?,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::warn!("worker exited without a report");
                        break;
                    }
                }
            }
        }

        let progress = live.as_deref().map(|run| (run.total, run.done));
        terminal.draw(|frame| draw(frame, state, &mut list_state, progress))?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let prev_selected = state.selected;
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Char('y') => state.copy_current(),
                KeyCode::Char('m') => state.mail_current(),
                KeyCode::Char('s') => {
                    if let Some(run) = live.as_deref() {
                        if !run.done {
                            run.stop.request();
                            state.message = Some("Stopping after the current contact...".to_string());
                        }
                    }
                }
                _ => {}
            }
            if state.selected != prev_selected {
                list_state.select(Some(state.selected));
            }
        }
    }
    Ok(())
}

fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Pending => " ",
        Status::Processing => "~",
        Status::Completed => "+",
        Status::Error => "x",
    }
}

fn status_style(status: Status) -> Style {
    match status {
        Status::Pending => Style::default().fg(Color::DarkGray),
        Status::Processing => Style::default().fg(Color::Yellow),
        Status::Completed => Style::default().fg(Color::Green),
        Status::Error => Style::default().fg(Color::Red),
    }
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState, progress: Option<(usize, bool)>) {
    let banner_height = if state.quota_halted { 1 } else { 0 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(banner_height),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    if state.quota_halted {
        let banner = Paragraph::new(format!(
            " API quota reached. Processing halted; {} contact(s) preserved for 'coffeechat resume'.",
            state.preserved
        ))
        .style(Style::default().fg(Color::White).bg(Color::Red).add_modifier(Modifier::BOLD));
        frame.render_widget(banner, rows[0]);
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[1]);

    // Left panel: contact list
    let items: Vec<ListItem> = state
        .results
        .iter()
        .map(|result| {
            ListItem::new(format!(
                "{} {} | {}",
                status_icon(result.status),
                result.email,
                result.company_name
            ))
        })
        .collect();

    let title = match progress {
        Some((total, false)) => format!(" Contacts ({}/{}) running ", state.results.len(), total),
        _ => format!(" Contacts ({}) ", state.results.len()),
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: research detail
    let detail_widget = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    // Footer: last message, or help
    let footer = match &state.message {
        Some(message) => Paragraph::new(format!(" {}", message)).style(Style::default().fg(Color::Yellow)),
        None => {
            let stop = if matches!(progress, Some((_, false))) { "  s:stop" } else { "" };
            Paragraph::new(format!(
                " j/k:navigate  J/K:scroll  y:copy draft  m:open in mail{}  q:quit",
                stop
            ))
            .style(Style::default().fg(Color::DarkGray))
        }
    };
    frame.render_widget(footer, rows[2]);
}

fn build_detail(state: &AppState) -> Text<'_> {
    let Some(result) = state.current() else {
        return Text::raw("Waiting for the first contact...");
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        &result.email,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", result.company_name)));
    lines.push(Line::from(Span::styled(
        format!("Status: {}", result.status),
        status_style(result.status),
    )));
    lines.push(Line::from(""));

    match result.status {
        Status::Pending | Status::Processing => {
            lines.push(Line::from(Span::styled(
                "Researching company and drafting email...",
                Style::default().fg(Color::DarkGray),
            )));
        }
        Status::Error => {
            let error = result.error.as_deref().unwrap_or("Unknown error");
            lines.push(Line::from(Span::styled(
                format!("Error: {}", error),
                Style::default().fg(Color::Red),
            )));
        }
        Status::Completed => {
            lines.push(Line::from(Span::styled(
                "Drafted Email",
                Style::default().add_modifier(Modifier::BOLD),
            )));
            for line in textwrap::fill(&result.drafted_email, 72).lines() {
                lines.push(Line::from(format!("  {}", line)));
            }
            lines.push(Line::from(""));

            lines.push(Line::from(Span::styled(
                "Strategic Context",
                Style::default().add_modifier(Modifier::BOLD),
            )));
            for line in result.research.lines() {
                lines.push(Line::from(line.to_string()));
            }

            if !result.sources.is_empty() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    "Sources",
                    Style::default().fg(Color::Cyan),
                )));
                for source in &result.sources {
                    lines.push(Line::from(format!("  {} <{}>", source.title, source.uri)));
                }
            }
        }
    }

    Text::from(lines)
}
