//! Terminal input for training mode.

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use swipetrainer_core::swipe::{Geomatch, SwipeAction};
use swipetrainer_core::training::{Command, StepInput};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const HELP: &str = "l = like, d = dislike, s = superlike, enter = swipe in the browser, q = quit";

/// Map one input line to a command. `None` for anything unrecognised.
pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "" | "w" | "wait" => Some(Command::Wait),
        "l" | "like" => Some(Command::Swipe(SwipeAction::Like)),
        "d" | "p" | "dislike" | "pass" => Some(Command::Swipe(SwipeAction::Dislike)),
        "s" | "superlike" => Some(Command::Swipe(SwipeAction::Superlike)),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

pub struct TerminalInput {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalInput {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Next line, or `None` at end of input.
    async fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }
}

#[async_trait]
impl StepInput for TerminalInput {
    async fn next_command(&mut self, current: &Geomatch) -> Result<Command> {
        println!(
            "{} {} ({} photos)",
            "▶".cyan(),
            current.display_name().bold(),
            current.image_urls.len()
        );
        loop {
            println!("{}", HELP.dimmed());
            let Some(line) = self.read_line().await? else {
                return Ok(Command::Quit);
            };
            match parse_command(&line) {
                Some(command) => return Ok(command),
                None => println!("{} {}", "unknown command:".yellow(), line.trim()),
            }
        }
    }

    async fn retry_unavailable(&mut self, reason: &str) -> Result<bool> {
        println!("{} {}", "no usable profile:".red(), reason);
        println!("{}", "press enter to try again, q to quit".dimmed());
        let Some(line) = self.read_line().await? else {
            return Ok(false);
        };
        Ok(parse_command(&line) != Some(Command::Quit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("l"), Some(Command::Swipe(SwipeAction::Like)));
        assert_eq!(parse_command(" Pass "), Some(Command::Swipe(SwipeAction::Dislike)));
        assert_eq!(parse_command("s"), Some(Command::Swipe(SwipeAction::Superlike)));
        assert_eq!(parse_command(""), Some(Command::Wait));
        assert_eq!(parse_command("q"), Some(Command::Quit));
        assert_eq!(parse_command("maybe"), None);
    }
}
