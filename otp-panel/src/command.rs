use std::str::FromStr;

use crate::error::{UnknownField, UnknownTab};
use crate::state::{FormField, Tab};

pub const HELP: &str = "\
Comandos:
  tab <devices|users|logs|registro>   cambiar de pestaña
  refresh                             recargar ahora
  add <nombre>                        agregar dispositivo
  toggle <dispositivo>                activar/bloquear dispositivo (nombre o id)
  delete <dispositivo>                eliminar dispositivo (pide confirmación)
  user <user_id>                      activar/bloquear usuario
  qr <user_id>                        mostrar QR de un usuario
  set <campo> <valor>                 llenar formulario de registro
                                      (user_id, full_name, email, cedula)
  submit                              registrar usuario
  help                                esta ayuda
  quit                                salir";

/// One line typed into the interactive console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tab(Tab),
    Refresh,
    Add(String),
    Toggle(String),
    Delete(String),
    /// Answer to a pending confirmation.
    Confirm(bool),
    ToggleUser(String),
    Qr(String),
    Set(FormField, String),
    Submit,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    Tab(#[from] UnknownTab),

    #[error(transparent)]
    Field(#[from] UnknownField),
}

fn argument(rest: &str, usage: &'static str) -> Result<String, CommandError> {
    if rest.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(rest.to_owned())
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }

        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match verb.to_lowercase().as_str() {
            "tab" => Command::Tab(argument(rest, "tab <devices|users|logs|registro>")?.parse()?),
            "refresh" | "r" => Command::Refresh,
            "add" => Command::Add(argument(rest, "add <nombre>")?),
            "toggle" => Command::Toggle(argument(rest, "toggle <dispositivo>")?),
            "delete" | "del" => Command::Delete(argument(rest, "delete <dispositivo>")?),
            "y" | "yes" | "s" | "si" | "sí" => Command::Confirm(true),
            "n" | "no" => Command::Confirm(false),
            "user" => Command::ToggleUser(argument(rest, "user <user_id>")?),
            "qr" => Command::Qr(argument(rest, "qr <user_id>")?),
            "set" => {
                let usage = "set <user_id|full_name|email|cedula> <valor>";
                let (field, value) = argument(rest, usage)?
                    .split_once(char::is_whitespace)
                    .map(|(f, v)| (f.to_owned(), v.trim().to_owned()))
                    .ok_or(CommandError::Usage(usage))?;
                Command::Set(field.parse()?, value)
            }
            "submit" => Command::Submit,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => return Err(CommandError::Unknown(verb.to_owned())),
        };
        Ok(command)
    }
}
