#[cfg(test)]
#[path = "console_test.rs"]
mod tests;

use std::collections::HashSet;

use anyhow::anyhow;
use anyhow::Result;
use owo_colors::OwoColorize;
use owo_colors::Stream;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendName;
use crate::domain::models::Conversation;
use crate::domain::models::Event;
use crate::domain::models::FeedError;
use crate::domain::models::LoadResult;
use crate::domain::models::Message;
use crate::domain::models::ScrollInstruction;
use crate::domain::models::SlashCommand;
use crate::domain::services::ConversationFeed;
use crate::domain::services::FeedSettings;
use crate::infrastructure::backends::BackendManager;

pub fn help_text() -> String {
    let text = r#"
COMMANDS:
- /older (/o) - Loads the next page of older messages.
- /read (/r) - Marks the conversation as read.
- /bottom (/b) - Tells the feed you are looking at the newest message again.
- /away (/a) - Tells the feed you scrolled up, holding back automatic scrolls.
- /quit /exit (/q) - Exit.
- /help (/h) - Provides this help menu.

Anything else you type is sent as a message.
        "#;

    return text.trim().to_string();
}

pub enum ConsoleAction {
    Print(Vec<String>),
    Quit,
}

/// Turns feed events into printable lines, remembering what was already shown.
#[derive(Default)]
pub struct ConsoleView {
    printed: HashSet<String>,
    loading: bool,
    last_error: Option<String>,
}

impl ConsoleView {
    fn format_message(message: &Message, older: bool) -> String {
        let marker = if older { "^" } else { " " };
        let time = message.timestamp.format("%Y-%m-%d %H:%M");
        let sender = message.sender.to_string();
        let sender = if message.is_from_trainer() {
            sender
                .if_supports_color(Stream::Stdout, |text| return text.cyan())
                .to_string()
        } else {
            sender
                .if_supports_color(Stream::Stdout, |text| return text.magenta())
                .to_string()
        };

        return format!("{marker} [{time}] {sender}: {text}", text = message.text);
    }

    fn format_scroll(instruction: &ScrollInstruction) -> String {
        let text = format!("  (scroll {instruction})");
        return text
            .if_supports_color(Stream::Stdout, |text| return text.dimmed())
            .to_string();
    }

    pub fn render(&mut self, event: &Event) -> Vec<String> {
        let mut lines = vec![];

        match event {
            Event::StateChanged(state) => {
                if state.is_loading_older && !self.loading {
                    lines.push("Loading older messages...".to_string());
                }
                self.loading = state.is_loading_older;

                let newest_printed = state
                    .messages
                    .iter()
                    .rev()
                    .find(|message| return self.printed.contains(&message.id))
                    .map(|message| return message.timestamp);

                for message in state.messages.iter() {
                    if !self.printed.insert(message.id.clone()) {
                        continue;
                    }

                    let older = newest_printed
                        .map(|newest| return message.timestamp < newest)
                        .unwrap_or(false);
                    lines.push(ConsoleView::format_message(message, older));
                }

                if state.last_error != self.last_error {
                    if let Some(err) = &state.last_error {
                        lines.push(
                            format!("Error: {err}")
                                .if_supports_color(Stream::Stdout, |text| return text.red())
                                .to_string(),
                        );
                    }
                    self.last_error = state.last_error.clone();
                }
            }
            Event::Scroll(instruction) => {
                lines.push(ConsoleView::format_scroll(instruction));
            }
        }

        return lines;
    }
}

fn describe_load(res: LoadResult) -> String {
    match res {
        LoadResult::Loaded {
            inserted,
            has_more_older,
        } => {
            if has_more_older {
                return format!("Loaded {inserted} older messages.");
            }
            return format!("Loaded {inserted} older messages. This is the start of the conversation.");
        }
        LoadResult::Skipped(reason) => {
            return format!("Not loading older messages: {reason}.");
        }
        LoadResult::Failed(err) => {
            return format!("Loading older messages failed, try /older again. {err}");
        }
        LoadResult::Cancelled => {
            return "Conversation is closed.".to_string();
        }
    }
}

pub async fn handle_input(feed: &ConversationFeed, input: &str) -> ConsoleAction {
    if let Some(command) = SlashCommand::parse(input) {
        if command.is_quit() {
            return ConsoleAction::Quit;
        }

        if command.is_help() {
            return ConsoleAction::Print(
                help_text()
                    .split('\n')
                    .map(|line| return line.to_string())
                    .collect(),
            );
        }

        if command.is_load_older() {
            return ConsoleAction::Print(vec![describe_load(feed.load_older().await)]);
        }

        if command.is_mark_read() {
            let line = match feed.mark_as_read().await {
                Ok(true) => "Marked conversation as read.".to_string(),
                Ok(false) => "Nothing unread.".to_string(),
                Err(err) => format!("Error: {err}"),
            };
            return ConsoleAction::Print(vec![line]);
        }

        if command.is_near_bottom() || command.is_away_from_bottom() {
            feed.report_viewport(command.is_near_bottom()).await;
            return ConsoleAction::Print(vec![]);
        }
    }

    match feed.send_message(input).await {
        Ok(()) | Err(FeedError::EmptyMessage) => return ConsoleAction::Print(vec![]),
        Err(err) => return ConsoleAction::Print(vec![format!("Error: {err}")]),
    }
}

async fn open_feed(tx: mpsc::UnboundedSender<Event>) -> Result<ConversationFeed> {
    let backend_name = Config::get(ConfigKey::Backend);
    let backend_name = BackendName::parse(backend_name.to_string())
        .ok_or_else(|| return anyhow!(format!("No backend implemented for {backend_name}")))?;
    let backend = BackendManager::get(backend_name).await?;

    let conversation = Conversation {
        unread_count: Config::get(ConfigKey::UnreadCount).parse::<u32>()?,
        ..Conversation::new(&Config::get(ConfigKey::ConversationID))
    };

    return ConversationFeed::open(conversation, backend, FeedSettings::from_config()?, tx).await;
}

pub async fn start() -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let feed = open_feed(tx).await?;
    let mut view = ConsoleView::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Conversation {} as {}. Type /help for commands.",
        feed.conversation().id,
        feed.settings().role
    );

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                for line in view.render(&event) {
                    println!("{line}");
                }
            }
            input = lines.next_line() => {
                let Some(input) = input? else {
                    break;
                };
                match handle_input(&feed, &input).await {
                    ConsoleAction::Print(output) => {
                        for line in output {
                            println!("{line}");
                        }
                    }
                    ConsoleAction::Quit => break,
                }
            }
        }
    }

    feed.close().await;

    return Ok(());
}
