//! Projects parsed hosts into selectable display rows with a live,
//! case-insensitive substring filter.

use crossterm::event::Event;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, HighlightSpacing, Paragraph, Row, Table, TableState};
use unicode_width::UnicodeWidthStr;

use crate::input::InputBuffer;
use crate::sshconfig::{Config, Host, TAG_KEY};

const FILTER_PROMPT: &str = "Search: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Inactive,
    /// Filter box focused; printable keys land in the filter text.
    Editing,
    /// Filter text submitted; the list stays narrowed.
    Applied,
}

/// One display row: the host alias plus a best-effort
/// `[user@]hostname[:port]` description and an optional tag label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRow {
    pub name: String,
    pub desc: String,
    pub tag: String,
}

impl HostRow {
    pub fn from_host(host: &Host) -> Self {
        let user = host.option("user");
        let hostname = host.option("hostname");
        let port = host.option("port");

        let mut desc = String::new();
        if !user.is_empty() {
            desc.push_str(user);
            desc.push('@');
        }
        desc.push_str(hostname);
        if !port.is_empty() && port != "22" {
            desc.push(':');
            desc.push_str(port);
        }
        if desc.is_empty() {
            // no recognizable connection options
            desc = host.name.clone();
        }
        Self {
            name: host.name.clone(),
            desc,
            tag: host.option(TAG_KEY).to_string(),
        }
    }

    fn haystack(&self) -> String {
        if self.tag.is_empty() {
            format!("{} {}", self.name, self.desc)
        } else {
            format!("{} {} #{}", self.name, self.desc, self.tag)
        }
    }
}

/// The filterable, single-selection host list.
pub struct HostList {
    rows: Vec<HostRow>,
    visible: Vec<usize>,
    state: TableState,
    filter: InputBuffer,
    filter_state: FilterState,
    longest_name: u16,
    page: usize,
}

impl HostList {
    pub fn new(config: &Config, initial_filter: Option<&str>) -> Self {
        let initial = initial_filter.unwrap_or("").trim().to_string();
        let filter_state = if initial.is_empty() {
            FilterState::Inactive
        } else {
            FilterState::Applied
        };
        let mut list = Self {
            rows: Vec::new(),
            visible: Vec::new(),
            state: TableState::default(),
            filter: InputBuffer::with_value(FILTER_PROMPT.to_string(), initial),
            filter_state,
            longest_name: 0,
            page: 10,
        };
        list.rebuild(config);
        list
    }

    /// Replaces the rows from a freshly parsed config. Filter text
    /// survives, and the previous selection is re-found by name when the
    /// host still exists; otherwise the cursor clamps into range.
    pub fn rebuild(&mut self, config: &Config) {
        let previous = self.selected().map(|row| row.name.clone());
        self.rows = config.hosts.iter().map(HostRow::from_host).collect();
        self.longest_name = self
            .rows
            .iter()
            .map(|row| UnicodeWidthStr::width(row.name.as_str()))
            .max()
            .unwrap_or(0) as u16;
        self.refresh_visible();
        match previous.and_then(|name| self.position_of(&name)) {
            Some(pos) => self.state.select(Some(pos)),
            None => self.clamp_cursor(),
        }
    }

    fn refresh_visible(&mut self) {
        let needle = fold(self.filter.input.value());
        self.visible = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| needle.is_empty() || fold(&row.haystack()).contains(&needle))
            .map(|(i, _)| i)
            .collect();
        self.clamp_cursor();
    }

    fn clamp_cursor(&mut self) {
        if self.visible.is_empty() {
            self.state.select(None);
        } else {
            let i = self.state.selected().unwrap_or(0);
            self.state.select(Some(i.min(self.visible.len() - 1)));
        }
    }

    fn position_of(&self, name: &str) -> Option<usize> {
        self.visible
            .iter()
            .position(|&i| self.rows[i].name == name)
    }

    pub fn selected(&self) -> Option<&HostRow> {
        let pos = self.state.selected()?;
        self.visible.get(pos).map(|&i| &self.rows[i])
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn up(&mut self) {
        self.move_cursor(|i, len| if i == 0 { len - 1 } else { i - 1 });
    }

    pub fn down(&mut self) {
        self.move_cursor(|i, len| if i + 1 >= len { 0 } else { i + 1 });
    }

    pub fn page_up(&mut self) {
        let page = self.page;
        self.move_cursor(|i, _| i.saturating_sub(page));
    }

    pub fn page_down(&mut self) {
        let page = self.page;
        self.move_cursor(|i, len| (i + page).min(len - 1));
    }

    pub fn half_page_up(&mut self) {
        let half = (self.page / 2).max(1);
        self.move_cursor(|i, _| i.saturating_sub(half));
    }

    pub fn half_page_down(&mut self) {
        let half = (self.page / 2).max(1);
        self.move_cursor(|i, len| (i + half).min(len - 1));
    }

    fn move_cursor(&mut self, step: impl Fn(usize, usize) -> usize) {
        if self.visible.is_empty() {
            return;
        }
        let len = self.visible.len();
        let next = match self.state.selected() {
            Some(i) => step(i.min(len - 1), len),
            None => 0,
        };
        self.state.select(Some(next));
    }

    pub fn begin_filter(&mut self) {
        self.filter.input.reset();
        self.filter_state = FilterState::Editing;
        self.refresh_visible();
    }

    /// Empty submission resets the filter instead of applying a
    /// match-nothing state.
    pub fn submit_filter(&mut self) {
        if self.filter.input.value().trim().is_empty() {
            self.reset_filter();
        } else {
            self.filter_state = FilterState::Applied;
        }
    }

    pub fn reset_filter(&mut self) {
        self.filter.input.reset();
        self.filter_state = FilterState::Inactive;
        self.refresh_visible();
    }

    pub fn handle_filter_event(&mut self, event: Event) {
        self.filter.handle_event(event);
        self.refresh_visible();
    }

    pub fn filter_state(&self) -> FilterState {
        self.filter_state
    }

    pub fn is_editing_filter(&self) -> bool {
        self.filter_state == FilterState::Editing
    }

    pub fn is_filter_active(&self) -> bool {
        self.filter_state != FilterState::Inactive
    }

    pub fn filter_text(&self) -> &str {
        self.filter.input.value()
    }

    /// Draws the table and, while the filter box is focused, the filter
    /// input line with its cursor.
    pub fn render(&mut self, frame: &mut Frame, area: Rect, title: &str, status: &str) {
        let areas = if self.is_editing_filter() {
            Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).split(area)
        } else {
            Layout::vertical([Constraint::Min(3)]).split(area)
        };

        // borders + header
        self.page = areas[0].height.saturating_sub(3).max(1) as usize;

        let needle = self.filter.input.value().to_string();
        let rows: Vec<Row> = self
            .visible
            .iter()
            .map(|&i| {
                let row = &self.rows[i];
                let mut desc = highlight_spans(&row.desc, &needle);
                if !row.tag.is_empty() {
                    desc.push(Span::styled(
                        format!(" #{}", row.tag),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
                Row::new(vec![
                    Cell::from(Line::from(highlight_spans(&row.name, &needle))),
                    Cell::from(Line::from(desc)),
                ])
            })
            .collect();

        let header = Row::new(vec![
            Cell::from("Host").style(Style::default().add_modifier(Modifier::UNDERLINED)),
            Cell::from("Description").style(Style::default().add_modifier(Modifier::UNDERLINED)),
        ])
        .style(Style::default().add_modifier(Modifier::BOLD));

        let table = Table::new(
            rows,
            [
                Constraint::Length(self.longest_name + 2),
                Constraint::Min(10),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string())
                .title(
                    ratatui::widgets::block::Title::from(status.to_string())
                        .alignment(Alignment::Right),
                ),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_spacing(HighlightSpacing::Always);

        frame.render_stateful_widget(table, areas[0], &mut self.state);

        if self.is_editing_filter() {
            let input = Paragraph::new(
                Text::from(self.filter.value()).style(Style::default().fg(Color::Cyan)),
            )
            .block(Block::default().borders(Borders::ALL));
            input.render(areas[1], frame.buffer_mut());
            frame.set_cursor(
                areas[1].x + 1 + self.filter.visual_cursor() as u16,
                areas[1].y + 1,
            );
        }
    }
}

// Per-char case folding keeps char indices aligned between the folded
// and original strings, which the highlighter relies on.
fn fold(input: &str) -> String {
    input
        .chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

/// Splits `text` into spans with the first case-insensitive occurrence
/// of `needle` highlighted.
fn highlight_spans<'a>(text: &str, needle: &str) -> Vec<Span<'a>> {
    let raw = |s: String| Span::raw(s);
    if needle.trim().is_empty() {
        return vec![raw(text.to_string())];
    }
    let folded = fold(text);
    let folded_needle = fold(needle);
    let Some(byte_start) = folded.find(&folded_needle) else {
        return vec![raw(text.to_string())];
    };
    let start = folded[..byte_start].chars().count();
    let len = folded_needle.chars().count();

    let chars: Vec<char> = text.chars().collect();
    let head: String = chars[..start].iter().collect();
    let matched: String = chars[start..start + len].iter().collect();
    let tail: String = chars[start + len..].iter().collect();

    let highlight = Style::default()
        .fg(Color::Black)
        .bg(Color::Yellow)
        .add_modifier(Modifier::BOLD);

    let mut spans = Vec::new();
    if !head.is_empty() {
        spans.push(raw(head));
    }
    spans.push(Span::styled(matched, highlight));
    if !tail.is_empty() {
        spans.push(raw(tail));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sshconfig::Config;
    use std::fs;
    use tempfile::tempdir;

    fn config_from(content: &str) -> Config {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, content).unwrap();
        Config::parse(&path).unwrap()
    }

    #[test]
    fn description_combines_user_hostname_and_port() {
        let config = config_from(
            "Host web1\n  HostName 10.0.0.1\n  User ops\n  Port 2222\nHost web2\n  HostName 10.0.0.2\n  Port 22\n",
        );
        let rows: Vec<HostRow> = config.hosts.iter().map(HostRow::from_host).collect();
        assert_eq!(rows[0].desc, "ops@10.0.0.1:2222");
        // default port is elided
        assert_eq!(rows[1].desc, "10.0.0.2");
    }

    #[test]
    fn description_falls_back_to_the_bare_name() {
        let config = config_from("Host jump\n  ForwardAgent yes\n");
        let row = HostRow::from_host(&config.hosts[0]);
        assert_eq!(row.desc, "jump");
    }

    #[test]
    fn tag_is_carried_on_the_row() {
        let config = config_from("Host db\n  HostName 10.0.0.3\n  #tag: prod\n");
        let row = HostRow::from_host(&config.hosts[0]);
        assert_eq!(row.tag, "prod");
        assert!(row.haystack().contains("#prod"));
    }

    #[test]
    fn launch_filter_narrows_to_a_single_row() {
        let config = config_from(
            "Host web1\n  HostName 10.0.0.1\n  User ops\nHost web2\n  HostName 10.0.0.2\n",
        );
        let list = HostList::new(&config, Some("web1"));
        assert_eq!(list.visible_len(), 1);
        let row = list.selected().unwrap();
        assert_eq!(row.name, "web1");
        assert_eq!(row.desc, "ops@10.0.0.1");
        assert!(list.is_filter_active());
    }

    #[test]
    fn filter_is_case_insensitive_substring_over_name_and_desc() {
        let config = config_from(
            "Host Alpha\n  HostName prod.example.com\nHost beta\n  HostName 10.0.0.2\n",
        );
        let mut list = HostList::new(&config, None);
        list.begin_filter();
        list.filter.input = "PROD".to_string().into();
        list.refresh_visible();
        assert_eq!(list.visible_len(), 1);
        assert_eq!(list.selected().unwrap().name, "Alpha");
    }

    #[test]
    fn empty_submit_resets_the_filter() {
        let config = config_from("Host a\n  HostName 1\nHost b\n  HostName 2\n");
        let mut list = HostList::new(&config, None);
        list.begin_filter();
        assert!(list.is_editing_filter());
        list.submit_filter();
        assert!(!list.is_filter_active());
        assert_eq!(list.visible_len(), 2);
    }

    #[test]
    fn rebuild_preserves_selection_by_name() {
        let first = config_from("Host a\n  HostName 1\nHost b\n  HostName 2\nHost c\n  HostName 3\n");
        let mut list = HostList::new(&first, None);
        list.down();
        list.down();
        assert_eq!(list.selected().unwrap().name, "c");

        // `c` moves up a slot in the new config
        let second = config_from("Host a\n  HostName 1\nHost c\n  HostName 3\nHost d\n  HostName 4\n");
        list.rebuild(&second);
        assert_eq!(list.selected().unwrap().name, "c");
    }

    #[test]
    fn rebuild_clamps_when_the_selected_host_is_gone() {
        let first = config_from("Host a\n  HostName 1\nHost b\n  HostName 2\n");
        let mut list = HostList::new(&first, None);
        list.down();
        assert_eq!(list.selected().unwrap().name, "b");

        let second = config_from("Host a\n  HostName 1\n");
        list.rebuild(&second);
        assert_eq!(list.selected().unwrap().name, "a");
    }

    #[test]
    fn rebuild_keeps_filter_text() {
        let first = config_from("Host web1\n  HostName 1\nHost db\n  HostName 2\n");
        let mut list = HostList::new(&first, Some("web"));
        assert_eq!(list.visible_len(), 1);
        let second =
            config_from("Host web1\n  HostName 1\nHost web2\n  HostName 2\nHost db\n  HostName 3\n");
        list.rebuild(&second);
        assert_eq!(list.filter_text(), "web");
        assert_eq!(list.visible_len(), 2);
    }

    #[test]
    fn cursor_wraps_at_both_ends() {
        let config = config_from("Host a\n  HostName 1\nHost b\n  HostName 2\n");
        let mut list = HostList::new(&config, None);
        list.up();
        assert_eq!(list.selected().unwrap().name, "b");
        list.down();
        assert_eq!(list.selected().unwrap().name, "a");
    }

    #[test]
    fn highlight_marks_the_matched_substring() {
        let spans = highlight_spans("ops@10.0.0.1", "10.0");
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].content.as_ref(), "ops@");
        assert_eq!(spans[1].content.as_ref(), "10.0");
        assert_eq!(spans[2].content.as_ref(), ".0.1");
    }
}
