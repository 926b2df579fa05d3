//! The interaction state machine: owns the live config, the host list,
//! the watcher and the sub-modes, and runs the single-threaded event
//! loop. Background work (file watching, remote commands) reports back
//! exclusively through the `Msg` channel; every state mutation happens
//! inside one loop step.

use std::io::Stdout;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::hostlist::{HostList, HostRow};
use crate::logpane::LogPane;
use crate::runcmd::{self, CommandPane};
use crate::sshconfig::Config;
use crate::syscmd::{self, Client, LaunchError};
use crate::terminal::Terminal;
use crate::watcher::ConfigWatcher;

/// Messages from background contexts into the event loop.
#[derive(Debug)]
pub enum Msg {
    FileChanged(Vec<std::path::PathBuf>),
    WatchFailed(String),
    CommandOutput(Result<String, String>),
    CommandCancelled,
    Status(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browsing,
    RunningCommand,
    Exiting,
}

/// Startup toggles, fixed before the first render.
#[derive(Debug, Default, Clone)]
pub struct AppOptions {
    pub filter: Option<String>,
    pub exit_on_connect: bool,
    pub show_detail: bool,
    pub debug: bool,
}

pub struct App {
    config: Config,
    list: HostList,
    mode: Mode,
    show_detail: bool,
    client: Client,
    log: LogPane,
    cmd_pane: Option<CommandPane>,
    exit_on_connect: bool,
    exit_host: Option<String>,
    watcher: ConfigWatcher,
    rt: Runtime,
    tx: UnboundedSender<Msg>,
    rx: UnboundedReceiver<Msg>,
}

impl App {
    pub fn new(config: Config, opts: AppOptions) -> anyhow::Result<Self> {
        let (tx, rx) = unbounded_channel();
        let mut watcher = ConfigWatcher::new(tx.clone())?;
        let mut log = LogPane::new(opts.debug);
        if let Err(err) = watcher.sync(config.watch_set()) {
            log.error(format!("file watch failed: {err}"));
        }
        let list = HostList::new(&config, opts.filter.as_deref());
        if opts.exit_on_connect {
            log.debug("exit-on-connect enabled");
        }
        Ok(Self {
            config,
            list,
            mode: Mode::Browsing,
            show_detail: opts.show_detail,
            client: Client::Ssh,
            log,
            cmd_pane: None,
            exit_on_connect: opts.exit_on_connect,
            exit_host: None,
            watcher,
            rt: Runtime::new()?,
            tx,
            rx,
        })
    }

    /// Client selected when the loop ended; the exec handoff uses it.
    pub fn client(&self) -> Client {
        self.client
    }

    /// Runs the event loop until quit or an exit-on-connect selection.
    /// Returns the host to hand the process over to, if any.
    pub fn run(&mut self, terminal: &mut Terminal<Stdout>) -> anyhow::Result<Option<String>> {
        loop {
            terminal.draw(|frame| self.ui(frame))?;

            while let Ok(msg) = self.rx.try_recv() {
                self.handle_msg(msg);
            }
            if self.mode == Mode::Exiting {
                break;
            }

            if event::poll(Duration::from_millis(80))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        self.handle_key(key, terminal)?;
                    }
                    _ => {}
                }
            }
            if self.mode == Mode::Exiting {
                break;
            }
        }
        Ok(self.exit_host.take())
    }

    fn handle_msg(&mut self, msg: Msg) {
        match msg {
            Msg::FileChanged(paths) => {
                for path in &paths {
                    self.watcher.rearm(path);
                }
                self.reload();
            }
            Msg::WatchFailed(err) => self.log.error(format!("watcher error: {err}")),
            Msg::CommandOutput(result) => {
                if let Some(pane) = self.cmd_pane.as_mut() {
                    pane.finish(result);
                }
            }
            Msg::CommandCancelled => {
                if let Some(pane) = self.cmd_pane.as_mut() {
                    pane.finish_cancelled();
                }
            }
            Msg::Status(text) => self.log.debug(text),
        }
    }

    /// Re-parses the top-level file and swaps in the result. A failed
    /// parse (an editor mid-save, say) keeps the previous config
    /// authoritative.
    fn reload(&mut self) {
        match Config::parse(self.config.path()) {
            Ok(config) => {
                if let Err(err) = self.watcher.sync(config.watch_set()) {
                    self.log.error(format!("file watch failed: {err}"));
                }
                self.config = config;
                self.list.rebuild(&self.config);
                self.log.debug("config reloaded");
            }
            Err(err) => {
                self.log
                    .error(format!("reload failed, keeping previous hosts: {err}"));
            }
        }
    }

    fn handle_key(
        &mut self,
        key: KeyEvent,
        terminal: &mut Terminal<Stdout>,
    ) -> anyhow::Result<()> {
        match self.mode {
            Mode::RunningCommand => self.handle_command_key(key),
            Mode::Browsing => self.handle_browsing_key(key, terminal)?,
            Mode::Exiting => {}
        }
        Ok(())
    }

    fn handle_browsing_key(
        &mut self,
        key: KeyEvent,
        terminal: &mut Terminal<Stdout>,
    ) -> anyhow::Result<()> {
        self.log.clear_error();

        if key.modifiers == KeyModifiers::CONTROL {
            match key.code {
                KeyCode::Char('p') => self.list.up(),
                KeyCode::Char('n') => self.list.down(),
                KeyCode::Char('b') => self.list.page_up(),
                KeyCode::Char('f') => self.list.page_down(),
                KeyCode::Char('u') => self.list.half_page_up(),
                KeyCode::Char('d') => self.list.half_page_down(),
                KeyCode::Char('e') => self.edit(terminal)?,
                KeyCode::Char('v') => self.show_detail = !self.show_detail,
                KeyCode::Char('r') => self.enter_command_mode(),
                KeyCode::Char('c') => self.mode = Mode::Exiting,
                code => {
                    self.log.error(format!(
                        "that's an interesting key combo! ctrl+{}",
                        describe_key(code)
                    ));
                }
            }
            return Ok(());
        }

        // filter-text entry wins while the filter box is focused
        if self.list.is_editing_filter() {
            match key.code {
                KeyCode::Esc => self.list.reset_filter(),
                KeyCode::Enter => self.list.submit_filter(),
                KeyCode::Up => self.list.up(),
                KeyCode::Down => self.list.down(),
                _ => self.list.handle_filter_event(Event::Key(key)),
            }
            return Ok(());
        }

        match key.code {
            KeyCode::Up => self.list.up(),
            KeyCode::Down => self.list.down(),
            KeyCode::PageUp => self.list.page_up(),
            KeyCode::PageDown => self.list.page_down(),
            KeyCode::Tab => {
                self.client = self.client.toggle();
                self.log.debug(format!("client switched to {}", self.client.name()));
            }
            KeyCode::Enter => self.connect(terminal)?,
            KeyCode::Char('/') => self.list.begin_filter(),
            KeyCode::Backspace => {
                if self.list.is_filter_active() {
                    self.list.reset_filter();
                }
            }
            KeyCode::Char('q') => self.mode = Mode::Exiting,
            KeyCode::Esc => {
                if self.list.is_filter_active() {
                    self.list.reset_filter();
                } else {
                    self.mode = Mode::Exiting;
                }
            }
            code => self
                .log
                .debug(format!("unhandled key: {}", describe_key(code))),
        }
        Ok(())
    }

    fn handle_command_key(&mut self, key: KeyEvent) {
        let Some(pane) = self.cmd_pane.as_mut() else {
            self.mode = Mode::Browsing;
            return;
        };
        if key.modifiers == KeyModifiers::CONTROL {
            match key.code {
                KeyCode::Char('c') => pane.cancel(),
                KeyCode::Char('l') => pane.clear(),
                KeyCode::Char('u') => pane.scroll_up(pane.half_page()),
                KeyCode::Char('d') => pane.scroll_down(pane.half_page()),
                code => self.log.error(format!(
                    "that's an interesting key combo! ctrl+{}",
                    describe_key(code)
                )),
            }
            return;
        }
        match key.code {
            KeyCode::Esc => {
                if pane.is_running() {
                    pane.cancel();
                }
                self.cmd_pane = None;
                self.mode = Mode::Browsing;
            }
            KeyCode::Enter => {
                if let Some(line) = pane.take_line() {
                    let host = pane.host.clone();
                    match syscmd::lookup("ssh") {
                        Some(program) => {
                            let args =
                                syscmd::remote_command_args(self.config.path(), &host, &line);
                            let cancel = runcmd::spawn_remote(
                                self.rt.handle(),
                                self.tx.clone(),
                                program,
                                args,
                            );
                            pane.set_cancel(cancel);
                        }
                        None => {
                            pane.finish(Err(LaunchError::ClientNotFound("ssh".into()).to_string()))
                        }
                    }
                }
            }
            KeyCode::PageUp => pane.scroll_up(pane.page()),
            KeyCode::PageDown => pane.scroll_down(pane.page()),
            KeyCode::Up => pane.scroll_up(1),
            KeyCode::Down => pane.scroll_down(1),
            _ => pane.handle_input_event(Event::Key(key)),
        }
    }

    fn enter_command_mode(&mut self) {
        match self.list.selected() {
            Some(row) => {
                self.cmd_pane = Some(CommandPane::new(row.name.clone()));
                self.mode = Mode::RunningCommand;
            }
            None => self.log.error("no host selected"),
        }
    }

    fn connect(&mut self, terminal: &mut Terminal<Stdout>) -> anyhow::Result<()> {
        let Some(row) = self.list.selected() else {
            // the list reported a row we cannot resolve: a defect, not
            // a user error
            self.log
                .error("unable to resolve the selected row: please open a bug report");
            return Ok(());
        };
        let host = row.name.clone();

        if self.exit_on_connect {
            self.exit_host = Some(host);
            self.mode = Mode::Exiting;
            return Ok(());
        }

        let Some(program) = syscmd::lookup(self.client.name()) else {
            self.log
                .error(LaunchError::ClientNotFound(self.client.name().into()).to_string());
            return Ok(());
        };
        let args = self.client.connect_args(self.config.path(), &host);
        match syscmd::run_attached(terminal, &program, &args, None) {
            Ok((status, stderr)) => {
                self.log.debug(format!("connection closed: {host}, {status}"));
                if !status.success() {
                    let tail = stderr.lines().last().unwrap_or("").trim();
                    self.log
                        .error(format!("connection to {host} closed: {status} {tail}"));
                }
            }
            Err(err) => {
                self.log
                    .error(format!("failed to launch {}: {err}", self.client.name()));
            }
        }
        Ok(())
    }

    fn edit(&mut self, terminal: &mut Terminal<Stdout>) -> anyhow::Result<()> {
        let editor = match syscmd::find_editor() {
            Ok(editor) => editor,
            Err(err) => {
                self.log.error(err.to_string());
                return Ok(());
            }
        };
        let config_path = self.config.path().to_path_buf();
        let cwd = config_path.parent().map(std::path::Path::to_path_buf);
        let args = vec![config_path.to_string_lossy().into_owned()];
        match syscmd::run_attached(terminal, &editor, &args, cwd.as_deref()) {
            Ok((status, stderr)) if !status.success() => {
                let tail = stderr.lines().last().unwrap_or("").trim();
                self.log
                    .error(format!("editor exited with {status} {tail}"));
            }
            Ok(_) => {}
            Err(err) => self.log.error(format!("failed to launch editor: {err}")),
        }
        // the file may have changed regardless of how the editor exited
        self.reload();
        Ok(())
    }

    fn ui(&mut self, frame: &mut Frame) {
        if self.mode == Mode::RunningCommand {
            if let Some(pane) = self.cmd_pane.as_mut() {
                let desc = HostRow::from_host(&self.config.host(&pane.host)).desc;
                pane.render(frame, frame.size(), &desc);
            }
            return;
        }

        let rows = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(self.log.height()),
        ])
        .split(frame.size());

        let title = format!(
            "SSH servers ({}) - {}",
            self.list.visible_len(),
            self.config.path().display()
        );
        let status = format!("[{}]", self.client.name());

        if self.show_detail {
            let cols =
                Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
                    .split(rows[0]);
            self.list.render(frame, cols[0], &title, &status);
            self.render_detail(frame, cols[1]);
        } else {
            self.list.render(frame, rows[0], &title, &status);
        }
        self.log.render(frame, rows[1]);
    }

    // Side pane: every option of the selected host, in original file
    // order, keys styled apart from values.
    fn render_detail(&mut self, frame: &mut Frame, area: Rect) {
        let key_style = Style::default().fg(Color::LightBlue);
        let lines: Vec<Line> = match self.list.selected() {
            Some(row) => {
                let host = self.config.host(&row.name);
                host.options()
                    .map(|(k, v)| {
                        Line::from(vec![
                            Span::styled(k.to_string(), key_style),
                            Span::raw(" "),
                            Span::raw(v.to_string()),
                        ])
                    })
                    .collect()
            }
            None => vec![Line::raw("no host selected")],
        };
        let pane = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Host options"),
        );
        frame.render_widget(pane, area);
    }
}

/// Renders a key code for diagnostics; plain characters stay bare.
fn describe_key(code: KeyCode) -> String {
    match code {
        KeyCode::Char(c) => c.to_string(),
        code => format!("{code:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_diagnostics_render_plain_characters() {
        assert_eq!(describe_key(KeyCode::Char('x')), "x");
        assert_eq!(describe_key(KeyCode::F(5)), "F(5)");
        assert_eq!(describe_key(KeyCode::Home), "Home");
    }
}
