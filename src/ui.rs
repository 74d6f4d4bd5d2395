use crate::command::{Command, Keymap};
use crate::state::{AppMode, SharedState};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal;
use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const INPUT_POLL: Duration = Duration::from_millis(100);

pub fn format_interactive(
    prediction: Option<(&str, f32)>,
    sentence: &str,
    suggestions: &[String],
) -> String {
    let label = match prediction {
        Some((label, confidence)) => format!("\x1b[33m[{} {:.2}]\x1b[0m", label, confidence),
        None => "\x1b[90m[ - ]\x1b[0m".to_string(),
    };
    let mut line = format!("{} {}\x1b[90m▏\x1b[0m", label, sentence);
    if !suggestions.is_empty() {
        let numbered: Vec<String> = suggestions
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}:{}", i + 1, s))
            .collect();
        line.push_str(&format!("  \x1b[31m{}\x1b[0m", numbered.join(" ")));
    }
    line
}

pub fn format_collect(frame: u64, hand: bool, collected: u64) -> String {
    let spinner = SPINNER[(frame as usize) % SPINNER.len()];
    let hand = if hand {
        "\x1b[32mhand\x1b[0m"
    } else {
        "\x1b[90mno hand\x1b[0m"
    };
    format!("\x1b[90m{}\x1b[0m {}  Images collected: {}", spinner, hand, collected)
}

/// Single status line redrawn in place
#[derive(Default)]
pub struct StatusLine {
    last: String,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, line: &str) {
        if line == self.last {
            return;
        }
        print!("\r\x1b[K{}", line);
        io::stdout().flush().ok();
        self.last = line.to_string();
    }

    pub fn finish(&mut self) {
        print!("\r\n");
        io::stdout().flush().ok();
        self.last.clear();
    }
}

pub fn print_help(mode: AppMode, keymap: &Keymap) {
    println!("{} mode. Keys:", mode);
    for (key, command) in keymap.describe() {
        let relevant = match command {
            Command::SaveCanvas => mode == AppMode::Collect,
            Command::Terminate => true,
            _ => mode == AppMode::Interactive,
        };
        if relevant {
            println!("  {:<10} {}", key, command);
        }
    }
    println!();
}

/// Raw terminal mode for the lifetime of the guard
pub struct RawMode;

impl RawMode {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Read key presses, translate them through `keymap` and forward commands
/// until the loop stops or the receiver goes away
pub fn spawn_input(keymap: Keymap, tx: flume::Sender<Command>, state: SharedState) -> JoinHandle<()> {
    thread::spawn(move || {
        while state.is_running() {
            match event::poll(INPUT_POLL) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("terminal input failed: {}", e);
                    break;
                }
            }
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if let Some(command) = keymap.lookup(&key) {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("terminal input failed: {}", e);
                    break;
                }
            }
        }
    })
}
