//! Chat command parsing.

pub const HELP: &str = "Comandos: /rec grava, /stop envia o áudio, /cancel descarta, \
/end <nota 1-5> [comentário] encerra, /quit sai. Qualquer outro texto é enviado como mensagem.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Text(String),
    StartRecording,
    StopRecording,
    CancelRecording,
    End { rating: u8, comment: Option<String> },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Comando desconhecido: /{0}")]
    UnknownCommand(String),
    #[error("Uso: /end <nota 1-5> [comentário]")]
    MissingRating,
    #[error("Nota inválida: {0}")]
    InvalidRating(String),
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<Command, ParseError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Ok(Command::Text(line.to_string())));
    };

    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let command = match name {
        "rec" => Ok(Command::StartRecording),
        "stop" => Ok(Command::StopRecording),
        "cancel" => Ok(Command::CancelRecording),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "end" => parse_end(args),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    };
    Some(command)
}

fn parse_end(args: &str) -> Result<Command, ParseError> {
    let args = args.trim();
    let (rating, comment) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    if rating.is_empty() {
        return Err(ParseError::MissingRating);
    }
    let rating = rating
        .parse::<u8>()
        .map_err(|_| ParseError::InvalidRating(rating.to_string()))?;
    let comment = Some(comment.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Ok(Command::End { rating, comment })
}
