//! Terminal input parsing.
//!
//! Lines starting with `/` are commands; anything else is a chat message.
//! A leading `//` sends a literal message that starts with `/`.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Token(String),
    Var { name: String, value: String },
    Upload(PathBuf),
    Image(PathBuf),
    Deployment(String),
    Deployments,
    Reset,
    Status,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '/{0}', try /help")]
    Unknown(String),
    #[error("/{command} needs {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },
    #[error("expected /var <name>=<value>")]
    MalformedVariable,
}

pub const HELP: &str = "\
Commands:
  /token <token>        set the API token
  /var <name>=<value>   bind a deployment variable
  /upload <path>        attach a document (pdf, txt, docx, csv, xls)
  /image <path>         attach an image to the next message (png, jpg)
  /deployment <name>    switch deployment
  /deployments          list configured deployments
  /reset                clear the conversation
  /status               show session state
  /quit                 exit
Anything else is sent as a message.";

pub fn parse(line: &str) -> Result<Command, CommandError> {
    if let Some(literal) = line.strip_prefix("//") {
        return Ok(Command::Say(format!("/{literal}")));
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "token" => required(arg, "token", "a token").map(Command::Token),
        "var" => {
            let (var, value) = arg.split_once('=').ok_or(CommandError::MalformedVariable)?;
            let var = var.trim();
            if var.is_empty() {
                return Err(CommandError::MalformedVariable);
            }
            Ok(Command::Var {
                name: var.to_string(),
                value: value.trim().to_string(),
            })
        }
        "upload" => required(arg, "upload", "a file path").map(|p| Command::Upload(p.into())),
        "image" => required(arg, "image", "a file path").map(|p| Command::Image(p.into())),
        "deployment" => required(arg, "deployment", "a deployment name").map(Command::Deployment),
        "deployments" => Ok(Command::Deployments),
        "reset" => Ok(Command::Reset),
        "status" => Ok(Command::Status),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn required(arg: &str, command: &'static str, what: &'static str) -> Result<String, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument { command, what })
    } else {
        Ok(arg.to_string())
    }
}
