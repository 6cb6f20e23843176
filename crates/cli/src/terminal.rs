use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use distill_llm::{Message, Role, TurnUsage};
use distill_summarize::{ChunkSummary, UsageRecord};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const ASSISTANT_TEXT: Color = Color::Cyan;
    const CHUNK: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// One line of REPL input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Exit,
    History,
    Tokens,
    Empty,
    Text(String),
}

impl ReplInput {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => ReplInput::Empty,
            "exit" | "quit" | "/exit" | "/quit" => ReplInput::Exit,
            "history" | "/history" => ReplInput::History,
            "tokens" | "/tokens" => ReplInput::Tokens,
            _ => ReplInput::Text(trimmed.to_string()),
        }
    }
}

/// Terminal I/O for the interactive loop and command output.
#[derive(Debug, Default)]
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the startup banner.
    pub fn print_banner(&self, mode: &str, provider: &str, model: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("distill"),
            ResetColor,
            Print(format!(" - {}\n", mode)),
            SetForegroundColor(Colors::DIM),
            Print(format!("Provider: {} | Model: {}\n", provider, model)),
            Print("Commands: 'history' shows the conversation, 'tokens' shows token usage,\n"),
            Print("'exit' or 'quit' ends the session.\n"),
            Print(format!("{}\n", "=".repeat(60))),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Read and classify one line of user input. EOF counts as exit.
    pub fn read_input(&self) -> Result<ReplInput> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::USER_PROMPT),
            Print("you> "),
            ResetColor,
        )?;
        stdout.flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(ReplInput::Exit);
        }
        Ok(ReplInput::parse(&input))
    }

    /// Print an assistant reply.
    pub fn print_assistant(&self, text: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::ASSISTANT_TEXT),
            Print("assistant> "),
            ResetColor,
            Print(format!("{}\n", text)),
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print per-chunk summaries under a header each.
    pub fn print_chunk_summaries(&self, summaries: &[ChunkSummary]) -> Result<()> {
        let mut stdout = io::stdout();
        for summary in summaries {
            execute!(
                stdout,
                SetForegroundColor(Colors::CHUNK),
                Print(format!("--- chunk {} ---\n", summary.index)),
                ResetColor,
                Print(format!("{}\n\n", summary.text)),
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Print the conversation history, one block per message.
    pub fn print_history(&self, messages: &[Message]) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("Conversation history:\n"),
            ResetColor,
        )?;
        for message in messages {
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print(format!("role: {}\n", role)),
                ResetColor,
                Print(format!("content: {}\n\n", message.content)),
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Print token usage of chat turns.
    pub fn print_turn_usage(&self, log: &[TurnUsage]) -> Result<()> {
        let rows: Vec<(String, String)> = log
            .iter()
            .map(|t| (truncate(&t.user_query, 60), t.usage.to_string()))
            .collect();
        self.print_usage_rows("user query", &rows)
    }

    /// Print token usage of summary requests.
    pub fn print_usage_records(&self, records: &[UsageRecord]) -> Result<()> {
        let rows: Vec<(String, String)> = records
            .iter()
            .map(|r| (r.scope.to_string(), r.usage.to_string()))
            .collect();
        self.print_usage_rows("request", &rows)
    }

    fn print_usage_rows(&self, label: &str, rows: &[(String, String)]) -> Result<()> {
        let mut stdout = io::stdout();
        if rows.is_empty() {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print("No token usage recorded yet.\n"),
                ResetColor,
            )?;
            return Ok(());
        }

        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("Token usage:\n"),
            ResetColor,
        )?;
        for (what, usage) in rows {
            execute!(
                stdout,
                Print(format!("{}: {}\n", label, what)),
                SetForegroundColor(Colors::DIM),
                Print(format!("model consumption: {}\n\n", usage)),
                ResetColor,
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Show a spinner while a request is running. Drop the handle to stop it.
    ///
    /// The spinner draws on stderr and only when stderr is a terminal, so
    /// results written to stdout stay clean when redirected.
    pub fn start_spinner(&self, message: &str) -> Result<SpinnerHandle> {
        let running = Arc::new(AtomicBool::new(true));
        if !io::stderr().is_terminal() {
            return Ok(SpinnerHandle {
                running,
                thread: None,
            });
        }

        let message = message.to_string();
        let running_clone = running.clone();

        let handle = std::thread::spawn(move || {
            let mut tick = 0;
            while running_clone.load(Ordering::SeqCst) {
                let mut stderr = io::stderr();
                execute!(
                    stderr,
                    SetForegroundColor(Colors::DIM),
                    Print(spinner_line(&message, tick)),
                    ResetColor,
                )
                .ok();
                stderr.flush().ok();
                tick += 1;
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            let mut stderr = io::stderr();
            execute!(stderr, Print(clear_line(&message))).ok();
            stderr.flush().ok();
        });

        Ok(SpinnerHandle {
            running,
            thread: Some(handle),
        })
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

/// Handle to a running spinner. Dropping it stops and clears the spinner.
pub struct SpinnerHandle {
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Drop for SpinnerHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Wait so the cleared line is not interleaved with the next print.
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];

fn spinner_line(message: &str, tick: usize) -> String {
    format!("\r{} {}", message, SPINNER_FRAMES[tick % SPINNER_FRAMES.len()])
}

/// Blank out everything `spinner_line` drew for `message`.
fn clear_line(message: &str) -> String {
    let width = message.chars().count() + 2;
    format!("\r{}\r", " ".repeat(width))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars - 3).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repl_commands_are_case_insensitive() {
        assert_eq!(ReplInput::parse("  QUIT \n"), ReplInput::Exit);
        assert_eq!(ReplInput::parse("exit"), ReplInput::Exit);
        assert_eq!(ReplInput::parse("History"), ReplInput::History);
        assert_eq!(ReplInput::parse("/tokens"), ReplInput::Tokens);
        assert_eq!(ReplInput::parse("   \n"), ReplInput::Empty);
    }

    #[test]
    fn other_input_is_text_trimmed() {
        assert_eq!(
            ReplInput::parse("  What is a gerund?\n"),
            ReplInput::Text("What is a gerund?".into())
        );
    }

    #[test]
    fn spinner_clear_covers_whole_line() {
        let message = "Summarizing...";
        let drawn = spinner_line(message, 3);
        assert_eq!(drawn, "\rSummarizing... \\");

        let clear = clear_line(message);
        let blanks = clear.trim_matches('\r');
        assert!(blanks.chars().all(|c| c == ' '));
        assert_eq!(blanks.chars().count(), drawn.trim_start_matches('\r').chars().count());
    }

    #[test]
    fn default_terminal_matches_new() {
        let terminal: Terminal = Default::default();
        assert_eq!(format!("{terminal:?}"), format!("{:?}", Terminal::new()));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 8), "ééééé...");
    }
}
