//! Command-line interface and REPL
//!
//! The prompt runs on its own thread (rustyline blocks) and hands parsed
//! commands to the event loop, which owns the router.

use anyhow::{anyhow, bail, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

use crate::midi::Channel;
use crate::router::{ChannelFilter, SustainMode};

pub const HELP: &str = "\
Commands:
  in any|<1-16>       input channel filter
  out <1-16>          output channel
  latch on|off        latched (on) or momentary (off, recommended) sustain
  status              show routing state
  panic               release every held note now
  save                write the current settings to the config file
  help                show this help
  quit                stop routing and exit";

/// Operator command for the running router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetInputFilter(ChannelFilter),
    SetOutputChannel(Channel),
    SetSustainMode(SustainMode),
    Status,
    Panic,
    Save,
    Help,
    Quit,
}

fn parse_channel(arg: &str) -> Result<Channel> {
    arg.parse::<u8>()
        .ok()
        .and_then(Channel::from_one_based)
        .ok_or_else(|| anyhow!("invalid channel '{}' (expected 1-16)", arg))
}

/// Parse one prompt line
pub fn parse_command(line: &str) -> Result<Command> {
    let words: Vec<String> = line.split_whitespace().map(str::to_lowercase).collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();

    let command = match words.as_slice() {
        ["in", "any"] => Command::SetInputFilter(ChannelFilter::Any),
        ["in", channel] => Command::SetInputFilter(ChannelFilter::Only(parse_channel(channel)?)),
        ["out", channel] => Command::SetOutputChannel(parse_channel(channel)?),
        ["latch", "on"] => Command::SetSustainMode(SustainMode::Latched),
        ["latch", "off"] => Command::SetSustainMode(SustainMode::Momentary),
        ["status"] => Command::Status,
        ["panic"] => Command::Panic,
        ["save"] => Command::Save,
        ["help"] | ["?"] => Command::Help,
        ["quit"] | ["exit"] => Command::Quit,
        [] => bail!("empty command"),
        _ => bail!("unknown command '{}' (type 'help')", line.trim()),
    };

    Ok(command)
}

/// Read commands until `quit` or end of input, forwarding them to `tx`
pub fn run_repl(tx: mpsc::Sender<Command>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("{}", HELP);

    loop {
        match rl.readline("sustain> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                match parse_command(&line) {
                    Ok(Command::Help) => println!("{}", HELP),
                    Ok(command) => {
                        if tx.blocking_send(command).is_err() || command == Command::Quit {
                            break;
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                let _ = tx.blocking_send(Command::Quit);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_commands() {
        assert_eq!(parse_command("in any").unwrap(), Command::SetInputFilter(ChannelFilter::Any));
        assert_eq!(
            parse_command("IN 16").unwrap(),
            Command::SetInputFilter(ChannelFilter::Only(Channel::new(15).unwrap()))
        );
        assert_eq!(
            parse_command("  out   10 ").unwrap(),
            Command::SetOutputChannel(Channel::new(9).unwrap())
        );
    }

    #[test]
    fn test_parse_latch_commands() {
        assert_eq!(parse_command("latch on").unwrap(), Command::SetSustainMode(SustainMode::Latched));
        assert_eq!(parse_command("latch off").unwrap(), Command::SetSustainMode(SustainMode::Momentary));
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("status").unwrap(), Command::Status);
        assert_eq!(parse_command("panic").unwrap(), Command::Panic);
        assert_eq!(parse_command("SAVE").unwrap(), Command::Save);
        assert_eq!(parse_command("?").unwrap(), Command::Help);
        assert_eq!(parse_command("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("").is_err());
        assert!(parse_command("out 0").is_err());
        assert!(parse_command("out 17").is_err());
        assert!(parse_command("in none").is_err());
        assert!(parse_command("latch maybe").is_err());
        assert!(parse_command("transpose 12").is_err());
        assert!(parse_command("save as").is_err());
    }
}
