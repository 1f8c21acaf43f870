//! Interactive chat loop
//!
//! Reads commands from stdin, runs round trips, and prints the assistant's
//! text as it streams in by diffing successive session snapshots.

use std::future::Future;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::watch;

use citechat_core::{
    ChatBackend, ChatError, ChatSession, SessionSnapshot, Timeline, TimelineDriver, TurnRole,
};

const HELP: &str = "\
Commands:
  <text>                 send a message
  /edit <id> <text>      keep turns up to <id>, then send <text>
  /edit - <text>         start over with <text>
  /retry                 regenerate the last answer
  /history               show the conversation with turn ids
  /sources               show citations of the last answer
  /help                  show this help
  /quit                  exit
";

/// One line of user input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Blank line
    Empty,
    /// Send a new message
    Send(String),
    /// Rewrite the conversation after `parent`
    Edit {
        /// Last turn to keep; `None` starts over
        parent: Option<String>,
        /// Replacement message
        text: String,
    },
    /// Regenerate the last answer
    Retry,
    /// Print the timeline
    History,
    /// Print the last answer's citations
    Sources,
    /// Print help
    Help,
    /// Leave the loop
    Quit,
    /// Unusable input, with a hint
    Invalid(String),
}

/// Parse one input line
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Send(line.to_string());
    }

    let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match name {
        "/edit" => {
            let Some((target, text)) = rest.split_once(char::is_whitespace) else {
                return Command::Invalid("usage: /edit <id|-> <text>".to_string());
            };
            let text = text.trim();
            if text.is_empty() {
                return Command::Invalid("usage: /edit <id|-> <text>".to_string());
            }
            let parent = (target != "-").then(|| target.to_string());
            Command::Edit {
                parent,
                text: text.to_string(),
            }
        }
        "/retry" => Command::Retry,
        "/history" => Command::History,
        "/sources" => Command::Sources,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command {other}; try /help")),
    }
}

/// Tracks how much of the streaming turn has been printed
#[derive(Debug, Default)]
pub struct Renderer {
    turn: Option<u32>,
    printed: usize,
}

impl Renderer {
    /// Text of the last assistant turn not yet printed
    pub fn delta(&mut self, snapshot: &SessionSnapshot) -> Option<String> {
        let last = snapshot.turns.last()?;
        if last.role != TurnRole::Assistant {
            return None;
        }

        if self.turn != Some(last.sort_order) || last.content.len() < self.printed {
            self.turn = Some(last.sort_order);
            self.printed = 0;
        }

        let fresh = last.content.get(self.printed..)?;
        if fresh.is_empty() {
            return None;
        }
        self.printed = last.content.len();
        Some(fresh.to_string())
    }
}

/// Format the whole timeline with turn ids
pub fn format_history(timeline: &Timeline) -> String {
    if timeline.is_empty() {
        return "(no messages yet)\n".to_string();
    }

    let mut out = String::new();
    for turn in timeline.turns() {
        let sources = match turn.citations {
            Some(ref citations) if !citations.is_empty() => {
                format!(" [{} sources]", citations.len())
            }
            _ => String::new(),
        };
        out.push_str(&format!(
            "#{} {}{}: {}\n",
            turn.id(),
            turn.role,
            sources,
            turn.content
        ));
    }
    out
}

/// Format the citations of the last turn
pub fn format_sources(timeline: &Timeline) -> String {
    let citations = timeline
        .last()
        .and_then(|turn| turn.citations.as_deref())
        .unwrap_or_default();
    if citations.is_empty() {
        return "(no sources)\n".to_string();
    }

    let mut out = String::new();
    for (i, citation) in citations.iter().enumerate() {
        out.push_str(&format!("[{}] {}", i + 1, citation.label()));
        if let Some(ref link) = citation.link {
            if citation.label() != link {
                out.push_str(&format!(" <{link}>"));
            }
        }
        out.push('\n');
    }
    out
}

/// Async stdout writer
struct Output {
    stdout: Stdout,
}

impl Output {
    fn new() -> Self {
        Self {
            stdout: tokio::io::stdout(),
        }
    }

    async fn write(&mut self, text: &str) -> std::io::Result<()> {
        self.stdout.write_all(text.as_bytes()).await?;
        self.stdout.flush().await
    }
}

/// Run the loop until `/quit`, end of input, or Ctrl-C at the prompt
pub async fn run<B: ChatBackend>(
    driver: &TimelineDriver<B>,
    mut session: ChatSession,
) -> Result<()> {
    let mut out = Output::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    match session.topic() {
        Some(topic) => {
            out.write(&format!("Resumed topic {}\n", topic.id)).await?;
            out.write(&format_history(session.timeline())).await?;
        }
        None => out.write("New conversation. /help for commands.\n").await?,
    }

    loop {
        out.write("> ").await?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                out.write("\n").await?;
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match parse_command(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => out.write(HELP).await?,
            Command::History => out.write(&format_history(session.timeline())).await?,
            Command::Sources => out.write(&format_sources(session.timeline())).await?,
            Command::Invalid(hint) => out.write(&format!("{hint}\n")).await?,
            Command::Send(text) => {
                let had_title = session.title().is_some();
                let updates = session.subscribe();
                render_round_trip(&mut out, updates, driver.append(&mut session, &text)).await?;
                if let (false, Some(title)) = (had_title, session.title()) {
                    out.write(&format!("(topic: {title})\n")).await?;
                }
            }
            Command::Edit { parent, text } => {
                let updates = session.subscribe();
                let op = driver.edit_at(&mut session, &text, parent.as_deref());
                render_round_trip(&mut out, updates, op).await?;
            }
            Command::Retry => {
                let updates = session.subscribe();
                render_round_trip(&mut out, updates, driver.regenerate_last(&mut session)).await?;
            }
        }
    }

    Ok(())
}

/// Drive one round trip, printing new answer text after every published change
///
/// Ctrl-C drops the round trip, which releases the connection and leaves
/// the partial answer in the timeline.
async fn render_round_trip<F>(
    out: &mut Output,
    mut updates: watch::Receiver<SessionSnapshot>,
    op: F,
) -> Result<()>
where
    F: Future<Output = Result<(), ChatError>>,
{
    let mut renderer = Renderer::default();
    let mut op = Box::pin(op);
    updates.mark_unchanged();

    let outcome = loop {
        tokio::select! {
            result = &mut op => break Some(result),
            Ok(()) = updates.changed() => {
                let snapshot = updates.borrow_and_update().clone();
                if let Some(text) = renderer.delta(&snapshot) {
                    out.write(&text).await?;
                }
            }
            _ = tokio::signal::ctrl_c() => break None,
        }
    };
    drop(op);

    let snapshot = updates.borrow_and_update().clone();
    if let Some(text) = renderer.delta(&snapshot) {
        out.write(&text).await?;
    }

    match outcome {
        Some(Ok(())) => out.write("\n").await?,
        Some(Err(e)) => {
            tracing::debug!(error = %e, "Round trip failed");
            out.write(&format!("\n[error: {e}]\n")).await?;
        }
        None => out.write("\n[cancelled]\n").await?,
    }
    Ok(())
}
