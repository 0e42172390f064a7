//! `/imgupload` command and its flags.

use std::fmt;

use teloxide::utils::command::BotCommands;

use crate::transfer::TransferOptions;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Forward chat images to the file storage.")]
pub enum Command {
    #[command(description = "show this help.")]
    Help,
    #[command(description = "upload images: [url] [-f folder] [-t wait_ms] [-g] [-c]. Reply to a picture to upload it.")]
    Imgupload(String),
}

/// Flags plus whatever free text is left over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    pub options: TransferOptions,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgError {
    MissingValue(&'static str),
    InvalidWait(String),
    UnknownFlag(String),
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingValue(flag) => write!(f, "option {flag} needs a value"),
            Self::InvalidWait(v) => write!(f, "wait time must be a number of milliseconds, got '{v}'"),
            Self::UnknownFlag(flag) => write!(f, "unknown option {flag}"),
        }
    }
}

impl std::error::Error for ArgError {}

/// Parse `[url] [-f folder] [-t ms] [-g] [-c]` in any order.
pub fn parse_args(args: &str) -> Result<ParsedArgs, ArgError> {
    let mut parsed = ParsedArgs::default();
    let mut rest = Vec::new();
    let mut tokens = args.split_whitespace();

    while let Some(token) = tokens.next() {
        match token {
            "-f" | "--folder" => {
                let value = tokens.next().ok_or(ArgError::MissingValue("-f"))?;
                parsed.options.folder = Some(value.to_string());
            }
            "-t" | "--time" => {
                let value = tokens.next().ok_or(ArgError::MissingValue("-t"))?;
                let ms = value.parse::<u64>().map_err(|_| ArgError::InvalidWait(value.to_string()))?;
                parsed.options.wait_ms = Some(ms);
            }
            "-g" | "--gif" => parsed.options.gif = true,
            "-c" | "--coiled" => parsed.options.continuous = true,
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(ArgError::UnknownFlag(flag.to_string()));
            }
            other => rest.push(other),
        }
    }

    if !rest.is_empty() {
        parsed.argument = Some(rest.join(" "));
    }
    Ok(parsed)
}
