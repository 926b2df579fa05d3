use std::collections::VecDeque;

use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

const DEBUG_HISTORY: usize = 5;

/// Bottom-of-screen status area: one transient, dismissible error line
/// plus, in debug mode, a numbered ring of recent diagnostics. Nothing
/// rendered here is ever fatal to the session.
pub struct LogPane {
    error: Option<String>,
    debug_lines: VecDeque<String>,
    debug_active: bool,
    count: usize,
}

impl LogPane {
    pub fn new(debug_active: bool) -> Self {
        Self {
            error: None,
            debug_lines: VecDeque::new(),
            debug_active,
            count: 0,
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !message.trim().is_empty() {
            self.error = Some(message);
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.count += 1;
        if !self.debug_active {
            return;
        }
        self.debug_lines
            .push_back(format!("{}: {}", self.count, message.into()));
        while self.debug_lines.len() > DEBUG_HISTORY {
            self.debug_lines.pop_front();
        }
    }

    pub fn height(&self) -> u16 {
        if self.debug_active {
            1 + DEBUG_HISTORY as u16
        } else {
            1
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(match &self.error {
            Some(err) => Line::styled(err.clone(), Style::default().fg(Color::Red)),
            None => Line::raw(""),
        });
        if self.debug_active {
            for entry in &self.debug_lines {
                lines.push(Line::styled(
                    entry.clone(),
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        frame.render_widget(Paragraph::new(lines), area);
    }

    #[cfg(test)]
    pub(crate) fn current_error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_ring_is_bounded_and_numbered() {
        let mut log = LogPane::new(true);
        for i in 0..8 {
            log.debug(format!("event {i}"));
        }
        assert_eq!(log.debug_lines.len(), DEBUG_HISTORY);
        assert_eq!(log.debug_lines.front().unwrap(), "4: event 3");
        assert_eq!(log.debug_lines.back().unwrap(), "8: event 7");
    }

    #[test]
    fn debug_is_dropped_when_inactive_but_errors_stick() {
        let mut log = LogPane::new(false);
        log.debug("hidden");
        assert!(log.debug_lines.is_empty());
        log.error("boom");
        assert_eq!(log.current_error(), Some("boom"));
        log.clear_error();
        assert_eq!(log.current_error(), None);
    }

    #[test]
    fn blank_errors_are_ignored() {
        let mut log = LogPane::new(false);
        log.error("  \n");
        assert_eq!(log.current_error(), None);
    }
}
