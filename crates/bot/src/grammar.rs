//! Command grammar.
//!
//! Input is matched by keyword prefix, not tokenized: the longest keyword the
//! text starts with decides the command, and whatever follows (trimmed) is the
//! argument. Chinese keywords may be glued to a numeric argument
//! (`漫画下载350234`) but not to other text; ASCII keywords must be followed by
//! whitespace or the end of the text and match case-insensitively. A leading
//! `/` is accepted and ignored.
//!
//! Text that matches no keyword is not an error, it is simply not a command.
//! The one exception is an explicit `/something` that names nothing we know.

use thiserror::Error;

/// Recognized command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Help,
    Fetch,
    Deliver,
    List,
    Exists,
    Version,
    Progress,
    /// Diagnostic: report the learned self identifier.
    SelfId,
    /// Diagnostic: deliver a generated file.
    TestFile,
}

impl CommandKind {
    /// Whether the command needs an identifier argument.
    pub fn takes_identifier(self) -> bool {
        matches!(self, Self::Fetch | Self::Deliver | Self::Exists)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Fetch => "fetch",
            Self::Deliver => "deliver",
            Self::List => "list",
            Self::Exists => "exists",
            Self::Version => "version",
            Self::Progress => "progress",
            Self::SelfId => "test_id",
            Self::TestFile => "test_file",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const KEYWORDS: &[(&str, CommandKind)] = &[
    ("漫画帮助", CommandKind::Help),
    ("帮助", CommandKind::Help),
    ("help", CommandKind::Help),
    ("漫画下载", CommandKind::Fetch),
    ("下载", CommandKind::Fetch),
    ("download", CommandKind::Fetch),
    ("发送", CommandKind::Deliver),
    ("send", CommandKind::Deliver),
    ("漫画列表", CommandKind::List),
    ("list", CommandKind::List),
    ("查询漫画", CommandKind::Exists),
    ("查询", CommandKind::Exists),
    ("query", CommandKind::Exists),
    ("漫画版本", CommandKind::Version),
    ("version", CommandKind::Version),
    ("下载进度", CommandKind::Progress),
    ("进度", CommandKind::Progress),
    ("progress", CommandKind::Progress),
    ("test_id", CommandKind::SelfId),
    ("test_file", CommandKind::TestFile),
];

/// Maximum identifier length accepted.
const MAX_IDENTIFIER_LEN: usize = 16;

/// A recognized command, before argument validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub kind: CommandKind,
    pub argument: Option<String>,
}

/// Input that looks like a command but is not one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command: /{0}")]
    UnknownCommand(String),
}

/// A recognized command whose argument does not have the required shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid argument for {kind}: {message}")]
pub struct ValidationError {
    pub kind: CommandKind,
    pub message: &'static str,
}

/// A fully validated command, ready to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Fetch { album_id: String },
    Deliver { album_id: String },
    List,
    Exists { album_id: String },
    Version,
    Progress,
    SelfId,
    TestFile,
}

impl ParsedCommand {
    /// Validate the argument and produce a typed [`Command`].
    pub fn into_command(self) -> Result<Command, ValidationError> {
        if !validate(self.kind, self.argument.as_deref()) {
            return Err(ValidationError {
                kind: self.kind,
                message: error_message(self.kind),
            });
        }
        let album_id = || self.argument.clone().unwrap_or_default();
        Ok(match self.kind {
            CommandKind::Help => Command::Help,
            CommandKind::Fetch => Command::Fetch {
                album_id: album_id(),
            },
            CommandKind::Deliver => Command::Deliver {
                album_id: album_id(),
            },
            CommandKind::List => Command::List,
            CommandKind::Exists => Command::Exists {
                album_id: album_id(),
            },
            CommandKind::Version => Command::Version,
            CommandKind::Progress => Command::Progress,
            CommandKind::SelfId => Command::SelfId,
            CommandKind::TestFile => Command::TestFile,
        })
    }
}

/// Parse free text into a command.
///
/// Returns `Ok(None)` when the text is not a command at all.
pub fn parse(text: &str) -> Result<Option<ParsedCommand>, ParseError> {
    let trimmed = text.trim();
    let (body, slashed) = match trimmed.strip_prefix('/') {
        Some(rest) => (rest.trim_start(), true),
        None => (trimmed, false),
    };
    if body.is_empty() && !slashed {
        return Ok(None);
    }

    let matched = KEYWORDS
        .iter()
        .filter(|(keyword, _)| keyword_matches(body, keyword))
        .max_by_key(|(keyword, _)| keyword.len());

    match matched {
        Some((keyword, kind)) => {
            let rest = body[keyword.len()..].trim();
            Ok(Some(ParsedCommand {
                kind: *kind,
                argument: (!rest.is_empty()).then(|| rest.to_string()),
            }))
        },
        None if slashed => {
            let name = body.split_whitespace().next().unwrap_or_default();
            Err(ParseError::UnknownCommand(name.to_string()))
        },
        None => Ok(None),
    }
}

fn keyword_matches(text: &str, keyword: &str) -> bool {
    let Some(head) = text.get(..keyword.len()) else {
        return false;
    };
    let next = text[keyword.len()..].chars().next();
    if !keyword.is_ascii() {
        // Glued identifiers (`漫画下载350234`) are fine, glued words are not.
        return head == keyword
            && next.is_none_or(|c| c.is_whitespace() || c.is_ascii_digit());
    }
    head.eq_ignore_ascii_case(keyword) && next.is_none_or(char::is_whitespace)
}

/// Does `argument` have the shape `kind` requires?
///
/// Identifier commands need 1 to 16 ASCII digits; every other command accepts
/// and ignores whatever follows it.
pub fn validate(kind: CommandKind, argument: Option<&str>) -> bool {
    if !kind.takes_identifier() {
        return true;
    }
    argument.is_some_and(is_identifier)
}

pub fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_IDENTIFIER_LEN
        && value.bytes().all(|b| b.is_ascii_digit())
}

/// User-facing message for a failed [`validate`].
pub fn error_message(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Fetch => "❌ 请输入正确的漫画ID（纯数字）\n例如：漫画下载 350234",
        CommandKind::Deliver => "❌ 请输入正确的漫画ID（纯数字）\n例如：发送 350234",
        CommandKind::Exists => "❌ 请输入正确的漫画ID（纯数字）\n例如：查询漫画 350234",
        _ => "❌ 命令格式错误\n发送'漫画帮助'查看可用命令",
    }
}
