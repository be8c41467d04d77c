use bogbot_core::domain::user::UserId;
use bogbot_core::policy::CommandKind;

/// One row of the command grammar. A `bare` command takes no arguments, so
/// trailing words turn the message back into conversation (`bits are great`).
/// Argument counts for the other commands are checked by their handlers,
/// which know the corrective reply for each missing piece.
#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    pub prefix: &'static [&'static str],
    pub kind: CommandKind,
    pub bare: bool,
}

const fn bare(prefix: &'static [&'static str], kind: CommandKind) -> CommandSpec {
    CommandSpec { prefix, kind, bare: true }
}

const fn with_args(prefix: &'static [&'static str], kind: CommandKind) -> CommandSpec {
    CommandSpec { prefix, kind, bare: false }
}

pub const COMMAND_TABLE: &[CommandSpec] = &[
    bare(&["help"], CommandKind::Help),
    bare(&["help", "exec"], CommandKind::HelpExec),
    bare(&["bits"], CommandKind::Bits),
    bare(&["profile"], CommandKind::Profile),
    bare(&["teams"], CommandKind::Teams),
    bare(&["set", "team"], CommandKind::SetTeam),
    with_args(&["checkin"], CommandKind::Checkin),
    with_args(&["set", "password"], CommandKind::SetPassword),
    with_args(&["set", "form"], CommandKind::SetForm),
    with_args(&["remove", "form"], CommandKind::RemoveForm),
    with_args(&["add", "teams"], CommandKind::AddTeams),
    with_args(&["remove", "teams"], CommandKind::RemoveTeams),
    with_args(&["set", "role"], CommandKind::SetRole),
    with_args(&["give", "bits"], CommandKind::GiveBits),
    with_args(&["give", "team_bits"], CommandKind::GiveTeamBits),
    with_args(&["leaderboard"], CommandKind::Leaderboard),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub kind: CommandKind,
    pub args: Vec<String>,
}

impl ParsedCommand {
    pub fn new(kind: CommandKind, args: Vec<String>) -> Self {
        Self { kind, args }
    }
}

/// Matches `text` against the command table. The longest matching prefix
/// wins. Returns `None` for ordinary conversation, including a no-argument
/// command followed by extra words.
pub fn classify(text: &str) -> Option<ParsedCommand> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let spec = COMMAND_TABLE
        .iter()
        .filter(|spec| {
            spec.prefix.len() <= tokens.len()
                && spec
                    .prefix
                    .iter()
                    .zip(&tokens)
                    .all(|(expected, token)| token.eq_ignore_ascii_case(expected))
        })
        .max_by_key(|spec| spec.prefix.len())?;

    let args: Vec<String> = tokens[spec.prefix.len()..].iter().map(|arg| arg.to_string()).collect();
    if spec.bare && !args.is_empty() {
        return None;
    }

    Some(ParsedCommand::new(spec.kind, args))
}

/// A resolved `give bits` recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    User(UserId),
    Channel,
}

/// Parses one token of mention markup. A token may hold several mentions
/// glued together (`<@U1><@U2|bob>`). Returns `None` when any part of the
/// token is not a mention.
pub fn parse_mentions(token: &str) -> Option<Vec<Target>> {
    if token.eq_ignore_ascii_case("channel") || token.eq_ignore_ascii_case("@channel") {
        return Some(vec![Target::Channel]);
    }

    let mut targets = Vec::new();
    let mut rest = token;
    while !rest.is_empty() {
        let special = rest.starts_with("<!");
        if !special && !rest.starts_with("<@") {
            return None;
        }
        let close = rest.find('>')?;
        let id = rest[2..close].split('|').next().unwrap_or_default();
        if id.is_empty() {
            return None;
        }

        if special {
            if id != "channel" {
                return None;
            }
            targets.push(Target::Channel);
        } else {
            targets.push(Target::User(UserId::new(id)));
        }
        rest = &rest[close + 1..];
    }

    if targets.is_empty() {
        None
    } else {
        Some(targets)
    }
}

/// Returns the single user named by `token`, if it is exactly one user mention.
pub fn parse_single_user(token: &str) -> Option<UserId> {
    match parse_mentions(token)?.as_slice() {
        [Target::User(id)] => Some(id.clone()),
        _ => None,
    }
}

/// Largest grant or deduction a single command may apply.
pub const MAX_GRANT: i64 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmountError {
    NotAnInteger,
    OutOfRange,
}

/// A non-zero whole number of bits within `MAX_GRANT` either way.
pub fn parse_amount(token: &str) -> Result<i64, AmountError> {
    let digits = token.strip_prefix(|c| c == '-' || c == '+').unwrap_or(token);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AmountError::NotAnInteger);
    }
    match token.parse::<i64>() {
        Ok(0) => Err(AmountError::NotAnInteger),
        Ok(amount) if (-MAX_GRANT..=MAX_GRANT).contains(&amount) => Ok(amount),
        _ => Err(AmountError::OutOfRange),
    }
}

/// A positive leaderboard length.
pub fn parse_limit(token: &str) -> Option<u32> {
    token.parse::<u32>().ok().filter(|limit| *limit > 0)
}

/// Strips Slack link markup (`<https://x|label>`) down to the bare URL.
pub fn parse_link(token: &str) -> String {
    match token.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
        Some(inner) => inner.split('|').next().unwrap_or(inner).to_owned(),
        None => token.to_owned(),
    }
}
