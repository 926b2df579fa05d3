//! Run-command sub-mode: every submitted line is executed as a one-shot
//! non-interactive remote command against the selected host, with
//! combined output collected into a scrollable transcript.

use std::path::PathBuf;
use std::process::Stdio;

use crossterm::event::Event;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc::UnboundedSender, oneshot};

use crate::app::Msg;
use crate::input::InputBuffer;

const PROMPT: &str = "> ";
const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub struct CommandPane {
    /// Host alias the commands run against, fixed at sub-mode entry.
    pub host: String,
    input: InputBuffer,
    transcript: Vec<String>,
    scroll: u16,
    follow: bool,
    view_height: u16,
    running: bool,
    spinner_frame: usize,
    cancel: Option<oneshot::Sender<()>>,
}

impl CommandPane {
    pub fn new(host: String) -> Self {
        Self {
            host,
            input: InputBuffer::new(PROMPT.to_string()),
            transcript: Vec::new(),
            scroll: 0,
            follow: true,
            view_height: 10,
            running: false,
            spinner_frame: 0,
            cancel: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Takes the submitted line, echoes it into the transcript and marks
    /// the pane busy. Returns `None` on an empty line or while a command
    /// is still in flight.
    pub fn take_line(&mut self) -> Option<String> {
        if self.running {
            return None;
        }
        let line = self.input.input.value().trim().to_string();
        if line.is_empty() {
            return None;
        }
        self.input.input.reset();
        self.append(format!("$ {line}"));
        self.running = true;
        Some(line)
    }

    pub fn set_cancel(&mut self, cancel: oneshot::Sender<()>) {
        self.cancel = Some(cancel);
    }

    /// Kills the in-flight command, if any. The confirmation line lands
    /// when the runner reports back.
    pub fn cancel(&mut self) {
        match self.cancel.take() {
            Some(tx) => {
                let _ = tx.send(());
            }
            None => self.append("[no running command to cancel]".to_string()),
        }
    }

    pub fn finish(&mut self, result: Result<String, String>) {
        match result {
            Ok(output) => self.append(output),
            Err(err) => self.append(err),
        }
        self.running = false;
        self.cancel = None;
    }

    pub fn finish_cancelled(&mut self) {
        self.append("[command cancelled]".to_string());
        self.running = false;
        self.cancel = None;
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
        self.scroll = 0;
        self.follow = true;
    }

    pub fn handle_input_event(&mut self, event: Event) {
        if !self.running {
            self.input.handle_event(event);
        }
    }

    fn append(&mut self, entry: String) {
        let entry = entry.trim_end().to_string();
        if !entry.is_empty() {
            self.transcript.push(entry);
        }
        self.follow = true;
    }

    fn total_lines(&self) -> u16 {
        let total: usize = self.transcript.iter().map(|e| e.lines().count().max(1)).sum();
        total.min(u16::MAX as usize) as u16
    }

    fn max_scroll(&self) -> u16 {
        self.total_lines().saturating_sub(self.view_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow = false;
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = (self.scroll + lines).min(self.max_scroll());
        self.follow = self.scroll == self.max_scroll();
    }

    pub fn page(&self) -> u16 {
        self.view_height.max(1)
    }

    pub fn half_page(&self) -> u16 {
        (self.view_height / 2).max(1)
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect, host_desc: &str) {
        let areas = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Min(1),
        ])
        .split(area);

        self.view_height = areas[2].height.saturating_sub(2);
        if self.follow {
            self.scroll = self.max_scroll();
        }

        let scroll_pct = if self.max_scroll() == 0 {
            100
        } else {
            (u32::from(self.scroll) * 100 / u32::from(self.max_scroll())) as u16
        };
        let bar = Line::from(vec![
            Span::styled(
                " Run Command ",
                Style::default().fg(Color::Black).bg(Color::Cyan),
            ),
            Span::styled(
                format!(" {} - {} ", self.host, host_desc),
                Style::default().fg(Color::White).bg(Color::DarkGray),
            ),
            Span::styled(
                format!(" {scroll_pct:>3}% "),
                Style::default().fg(Color::Black).bg(Color::Blue),
            ),
        ]);
        frame.render_widget(Paragraph::new(bar), areas[0]);

        let prompt_line = if self.running {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER.len();
            format!("{} {}", SPINNER[self.spinner_frame], self.input.value())
        } else {
            self.input.value()
        };
        let input = Paragraph::new(Text::from(prompt_line).style(Style::default().fg(Color::Cyan)))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(input, areas[1]);
        if !self.running {
            frame.set_cursor(
                areas[1].x + 1 + self.input.visual_cursor() as u16,
                areas[1].y + 1,
            );
        }

        let body = if self.transcript.is_empty() {
            Text::from("(no output) ...")
        } else {
            Text::from(self.transcript.join("\n"))
        };
        let transcript = Paragraph::new(body)
            .wrap(Wrap { trim: false })
            .scroll((self.scroll, 0))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("(Esc) back | (Ctrl+C) cancel | (Ctrl+L) clear"),
            );
        frame.render_widget(transcript, areas[2]);
    }
}

/// Runs one remote command on the shared runtime, reporting the combined
/// output (or cancellation) back through the message channel. The
/// returned sender kills the child when fired; no timeout is imposed.
pub fn spawn_remote(
    handle: &Handle,
    tx: UnboundedSender<Msg>,
    program: PathBuf,
    args: Vec<String>,
) -> oneshot::Sender<()> {
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
    handle.spawn(async move {
        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let _ = tx.send(Msg::CommandOutput(Err(format!(
                    "failed to run {}: {err}",
                    program.display()
                ))));
                return;
            }
        };
        let _ = tx.send(Msg::Status(format!(
            "running {} {}",
            program.display(),
            args.join(" ")
        )));
        let mut stdout = child.stdout.take().expect("stdout is piped");
        let mut stderr = child.stderr.take().expect("stderr is piped");
        let mut out = Vec::new();
        let mut err = Vec::new();

        // completing the select drops the wait future, releasing its
        // borrow of the child so a cancel can still kill it
        let finished = tokio::select! {
            status = async {
                let _ = tokio::join!(
                    stdout.read_to_end(&mut out),
                    stderr.read_to_end(&mut err),
                );
                child.wait().await
            } => Some(status),
            _ = &mut cancel_rx => None,
        };

        let msg = match finished {
            Some(status) => {
                let mut text = String::from_utf8_lossy(&out).into_owned();
                text.push_str(String::from_utf8_lossy(&err).as_ref());
                match status {
                    Ok(status) if status.success() => Msg::CommandOutput(Ok(text)),
                    Ok(status) => Msg::CommandOutput(Err(format!("{status}\n{text}"))),
                    Err(e) => Msg::CommandOutput(Err(format!("wait failed: {e}\n{text}"))),
                }
            }
            None => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Msg::CommandCancelled
            }
        };
        let _ = tx.send(msg);
    });
    cancel_tx
}
