use crate::model::{RunState, RunSummary};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::ops::Range;
use std::time::{Duration, Instant};

/// Lines kept in the output pane; older lines are dropped first.
const MAX_OUTPUT_LINES: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Stdout,
    Stderr,
    /// Launcher messages mixed into the pane (run separators and the like).
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    pub kind: LineKind,
    pub text: String,
}

pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub command: Option<String>,
    pub run_state: RunState,
    pub run_start: Option<Instant>,
    pub last_summary: Option<RunSummary>,

    pub output: Vec<OutputEntry>,
    pub dropped_lines: usize,
    /// Lines between the bottom of the buffer and the bottom of the view.
    pub scroll_from_bottom: usize,
    /// Keep the view pinned to the newest line.
    pub follow: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            info: String::new(),
            command: None,
            run_state: RunState::Idle,
            run_start: None,
            last_summary: None,
            output: Vec::new(),
            dropped_lines: 0,
            scroll_from_bottom: 0,
            follow: true,
        }
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Borders take 2 columns on each side.
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let take = remaining.len().min(line_width as usize);
        let (chunk, rest) = remaining.split_at(take);
        let chunk: String = chunk.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(chunk),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(chunk)]));
        }

        remaining = rest;
    }
}

impl UiState {
    /// Clear the pane for a fresh run of `command`.
    pub fn begin_run(&mut self, command: String) {
        self.output.clear();
        self.dropped_lines = 0;
        self.scroll_from_bottom = 0;
        self.follow = true;
        self.run_state = RunState::Idle;
        self.run_start = Some(Instant::now());
        self.last_summary = None;
        self.push_line(LineKind::Notice, format!("$ {command}"));
        self.command = Some(command);
    }

    pub fn push_line(&mut self, kind: LineKind, text: String) {
        self.output.push(OutputEntry { kind, text });
        if !self.follow {
            // Keep the lines the user is reading in place.
            self.scroll_from_bottom += 1;
        }
        if self.output.len() > MAX_OUTPUT_LINES {
            let excess = self.output.len() - MAX_OUTPUT_LINES;
            let _ = self.output.drain(0..excess);
            self.dropped_lines += excess;
        }
        self.clamp_scroll();
    }

    /// Split a stderr block or failure message into pane lines.
    pub fn push_error_text(&mut self, text: &str) {
        for line in text.lines() {
            self.push_line(LineKind::Stderr, line.to_string());
        }
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.follow = false;
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(n);
        self.clamp_scroll();
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(n);
        if self.scroll_from_bottom == 0 {
            self.follow = true;
        }
    }

    pub fn scroll_top(&mut self) {
        self.follow = false;
        self.scroll_from_bottom = usize::MAX;
        self.clamp_scroll();
    }

    pub fn scroll_bottom(&mut self) {
        self.scroll_from_bottom = 0;
        self.follow = true;
    }

    pub fn toggle_follow(&mut self) {
        if self.follow {
            self.follow = false;
        } else {
            self.scroll_bottom();
        }
    }

    /// Indices of `output` that fit a pane `height` lines tall.
    pub fn visible_range(&self, height: usize) -> Range<usize> {
        let bottom = self.output.len().saturating_sub(self.scroll_from_bottom);
        let bottom = bottom.max(height.min(self.output.len()));
        bottom.saturating_sub(height)..bottom
    }

    pub fn transcript(&self) -> String {
        self.output
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Time since the run started, frozen at the reported duration once it ends.
    pub fn elapsed(&self) -> Option<Duration> {
        if let Some(summary) = &self.last_summary {
            return Some(Duration::from_millis(summary.duration_ms));
        }
        self.run_start.map(|t| t.elapsed())
    }

    pub fn is_running(&self) -> bool {
        self.run_start.is_some() && self.last_summary.is_none()
    }

    fn clamp_scroll(&mut self) {
        let max = self.output.len().saturating_sub(1);
        if self.scroll_from_bottom > max {
            self.scroll_from_bottom = max;
        }
    }
}
