mod clipboard;
mod help;
mod state;

use crate::model::{RunEvent, RunState};
use crate::orchestrator::{self, LaunchPlan, UiCommand};
use anyhow::{Context, Result};
use clipboard::copy_to_clipboard;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use help::draw_help;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use state::{push_wrapped_status_kv, LineKind, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const PAGE: usize = 20;

pub async fn run(plan: LaunchPlan) -> Result<()> {
    // Unbounded channels keep the relay from ever waiting on the UI.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(event_rx, cmd_tx));

    let res = orchestrator::run_controller(&plan, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut event_rx: UnboundedReceiver<RunEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only.
    let mut state = UiState::default();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('r')) => {
                        if state.is_running() {
                            state.info = "Run in progress; rerun once it finishes".into();
                        } else {
                            state.info = "Rerun requested…".into();
                            let _ = cmd_tx.send(UiCommand::Rerun);
                        }
                    }
                    (_, KeyCode::Char('y')) => {
                        let lines = state.output.len();
                        state.info = match copy_to_clipboard(&state.transcript()) {
                            Ok(()) => format!("Copied {lines} line(s) to clipboard"),
                            Err(e) => format!("Clipboard copy failed: {e:#}"),
                        };
                    }
                    (_, KeyCode::Tab) => {
                        state.tab = (state.tab + 1) % 2;
                    }
                    (_, KeyCode::Char('?')) => {
                        state.tab = 1;
                    }
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) => state.scroll_up(1),
                    (_, KeyCode::Down) | (_, KeyCode::Char('j')) => state.scroll_down(1),
                    (_, KeyCode::PageUp) => state.scroll_up(PAGE),
                    (_, KeyCode::PageDown) => state.scroll_down(PAGE),
                    (_, KeyCode::Char('g')) | (_, KeyCode::Home) => state.scroll_top(),
                    (_, KeyCode::Char('G')) | (_, KeyCode::End) => state.scroll_bottom(),
                    (_, KeyCode::Char('f')) => {
                        state.toggle_follow();
                        state.info = if state.follow {
                            "Following output".into()
                        } else {
                            "Follow paused".into()
                        };
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    if state.is_running() {
        eprintln!("Waiting for the solver to finish…");
    }
    res
}

fn apply_event(state: &mut UiState, ev: RunEvent) {
    match ev {
        RunEvent::Launched { invocation } => {
            state.begin_run(invocation.display());
            state.info = "Launching…".into();
        }
        RunEvent::State(s) => {
            state.run_state = s;
            state.info = match s {
                RunState::Streaming => "Solver running".into(),
                RunState::Completed => "Solver finished".into(),
                RunState::Failed => "Run failed".into(),
                _ => state.info.clone(),
            };
        }
        RunEvent::OutputLine(line) => state.push_line(LineKind::Stdout, line),
        RunEvent::ErrorText(text) => state.push_error_text(&text),
        RunEvent::Info(msg) => state.info = msg,
        RunEvent::RunCompleted { summary } => {
            let lines = crate::text_summary::build_text_summary(&summary).lines;
            if let Some(first) = lines.first() {
                state.info = first.clone();
            }
            for line in lines {
                state.push_line(LineKind::Notice, line);
            }
            state.run_state = summary.state;
            state.last_summary = Some(*summary);
        }
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Output"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("solver-launcher"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_output(chunks[1], f, state),
        _ => draw_help(chunks[1], f),
    }
}

fn draw_output(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(0)].as_ref())
        .split(area);

    let mut status: Vec<Line<'static>> = Vec::new();
    if let Some(cmd) = state.command.as_deref() {
        push_wrapped_status_kv(&mut status, "Command", cmd, main[0].width);
    }
    let elapsed = state
        .elapsed()
        .map(|d| humantime::format_duration(Duration::from_secs(d.as_secs())).to_string())
        .unwrap_or_else(|| "-".into());
    let exit = state
        .last_summary
        .as_ref()
        .and_then(|s| s.exit_code)
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".into());
    status.push(Line::from(vec![
        Span::styled("State: ", Style::default().fg(Color::Gray)),
        Span::styled(state.run_state.label(), state_style(state.run_state)),
        Span::styled("  Elapsed: ", Style::default().fg(Color::Gray)),
        Span::raw(elapsed),
        Span::styled("  Exit: ", Style::default().fg(Color::Gray)),
        Span::raw(exit),
    ]));
    push_wrapped_status_kv(&mut status, "Info", &state.info, main[0].width);
    let p = Paragraph::new(status).block(Block::default().borders(Borders::ALL).title("Run"));
    f.render_widget(p, main[0]);

    let height = main[1].height.saturating_sub(2) as usize;
    let range = state.visible_range(height);
    let lines: Vec<Line> = state.output[range.clone()]
        .iter()
        .map(|e| match e.kind {
            LineKind::Stdout => Line::from(e.text.as_str()),
            LineKind::Stderr => Line::styled(e.text.as_str(), Style::default().fg(Color::Red)),
            LineKind::Notice => Line::styled(
                e.text.as_str(),
                Style::default()
                    .fg(Color::Gray)
                    .add_modifier(Modifier::ITALIC),
            ),
        })
        .collect();

    let mut title = if state.follow {
        format!("Output ({} lines, following)", state.output.len())
    } else {
        format!(
            "Output (lines {}-{} of {})",
            range.start + 1,
            range.end,
            state.output.len()
        )
    };
    if state.dropped_lines > 0 {
        title.push_str(&format!(", {} older dropped", state.dropped_lines));
    }
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, main[1]);
}

fn state_style(s: RunState) -> Style {
    match s {
        RunState::Streaming | RunState::Starting => Style::default().fg(Color::Cyan),
        RunState::Completed => Style::default().fg(Color::Green),
        RunState::Failed => Style::default().fg(Color::Red),
        RunState::Idle => Style::default().fg(Color::Gray),
    }
}
