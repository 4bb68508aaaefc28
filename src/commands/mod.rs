mod ask;
mod config;
mod manage;

use crate::state::Session;

pub const HELP_TEXT: &str = "\
Available commands:
  help                     Show this help message
  quit / exit              Exit the program
  set_dataset <path>       Load a new CSV and create a new AutoML runner
  reset                    Reset the conversation state but keep current dataset
  show_state               Print internal conversation state summary
  config [param value]     Show or set max_iterations | temp_dir
  <any other text>         Will be treated as a natural-language AutoML question
";

/// One line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Help,
    Quit,
    SetDataset(Option<String>),
    Reset,
    ShowState,
    Config {
        param: Option<String>,
        value: Option<String>,
    },
    Ask(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        match (head.to_lowercase().as_str(), arg.is_some()) {
            ("quit" | "exit", false) => Command::Quit,
            ("help", false) => Command::Help,
            ("reset", false) => Command::Reset,
            ("show_state", false) => Command::ShowState,
            ("set_dataset", _) => Command::SetDataset(arg),
            ("config", _) => {
                let mut parts = rest.split_whitespace();
                Command::Config {
                    param: parts.next().map(str::to_string),
                    value: parts.next().map(str::to_string),
                }
            }
            _ => Command::Ask(line.to_string()),
        }
    }
}

/// What the shell should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    Silent,
    Quit,
}

/// Run one line of input against the session.
pub async fn dispatch(session: &mut Session, line: &str) -> Outcome {
    match Command::parse(line) {
        Command::Empty => Outcome::Silent,
        Command::Quit => Outcome::Quit,
        Command::Help => Outcome::Reply(HELP_TEXT.to_string()),
        Command::SetDataset(path) => Outcome::Reply(manage::set_dataset(session, path.as_deref())),
        Command::Reset => Outcome::Reply(manage::reset(session)),
        Command::ShowState => Outcome::Reply(manage::show_state(session)),
        Command::Config { param, value } => {
            Outcome::Reply(config::config(session, param.as_deref(), value.as_deref()))
        }
        Command::Ask(question) => Outcome::Reply(ask::ask(session, &question).await),
    }
}
