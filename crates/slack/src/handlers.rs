use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use bogbot_core::domain::settings::{FormDocument, PasswordDocument};
use bogbot_core::domain::user::{Role, UserId};
use bogbot_core::errors::ApplicationError;
use bogbot_core::policy::{authorize, Authorization, CommandKind};
use bogbot_core::secrets::SecretHasher;
use bogbot_db::{RepositoryError, SettingsRepository, UserRepository};

use crate::blocks::{self, MessageTemplate};
use crate::commands::{
    parse_amount, parse_limit, parse_link, parse_mentions, parse_single_user, AmountError,
    ParsedCommand, Target, MAX_GRANT,
};
use crate::events::EventContext;

pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 10;

const INSUFFICIENT_PERMISSIONS: &str = "Insufficient permissions. Contact exec if you need access.";
const PROVIDE_USER: &str = "Please provide a user. Remember to use @username.";
const PROVIDE_AMOUNT: &str = "Please provide the amount of bits.";
const INTEGER_AMOUNT: &str = "Please provide an integer amount.";

fn amount_or_reply(token: &str) -> Result<i64, CommandError> {
    parse_amount(token).map_err(|error| match error {
        AmountError::NotAnInteger => CommandError::input(INTEGER_AMOUNT),
        AmountError::OutOfRange => CommandError::input(format!(
            "Amount is too large. Grants are limited to {MAX_GRANT} bits either way."
        )),
    })
}
const NO_TEAMS: &str = "No teams have been set.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub user_id: UserId,
    pub channel_id: String,
    pub command: ParsedCommand,
}

/// Why a command stopped before completing. Everything except
/// `Application` is answered with a corrective reply and leaves the store
/// untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    UserInput(String),
    #[error("`{}` requires exec; caller is {role}", .command.as_str())]
    Unauthorized { command: CommandKind, role: Role },
    #[error("{0}")]
    NotConfigured(String),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl CommandError {
    fn input(message: impl Into<String>) -> Self {
        Self::UserInput(message.into())
    }

    /// The conversational reply for a locally recovered failure.
    pub fn reply_text(&self) -> Option<String> {
        match self {
            Self::UserInput(message) | Self::NotConfigured(message) => Some(message.clone()),
            Self::Unauthorized { .. } => Some(INSUFFICIENT_PERMISSIONS.to_owned()),
            Self::Application(_) => None,
        }
    }
}

impl From<RepositoryError> for CommandError {
    fn from(value: RepositoryError) -> Self {
        Self::Application(value.into())
    }
}

impl From<bogbot_core::secrets::SecretError> for CommandError {
    fn from(value: bogbot_core::secrets::SecretError) -> Self {
        Self::Application(value.into())
    }
}

/// Resolves a conversation to the ids of its members.
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    async fn channel_members(&self, channel_id: &str) -> Result<Vec<UserId>, ApplicationError>;
}

#[async_trait]
pub trait ChatCommandService: Send + Sync {
    async fn execute(
        &self,
        invocation: &CommandInvocation,
        ctx: &EventContext,
    ) -> Result<Vec<MessageTemplate>, ApplicationError>;

    /// Applies a team-picker selection.
    async fn select_team(
        &self,
        user_id: &UserId,
        team: &str,
        ctx: &EventContext,
    ) -> Result<Vec<MessageTemplate>, ApplicationError>;
}

#[async_trait]
impl<T> ChatCommandService for Arc<T>
where
    T: ChatCommandService + ?Sized,
{
    async fn execute(
        &self,
        invocation: &CommandInvocation,
        ctx: &EventContext,
    ) -> Result<Vec<MessageTemplate>, ApplicationError> {
        (**self).execute(invocation, ctx).await
    }

    async fn select_team(
        &self,
        user_id: &UserId,
        team: &str,
        ctx: &EventContext,
    ) -> Result<Vec<MessageTemplate>, ApplicationError> {
        (**self).select_team(user_id, team, ctx).await
    }
}

/// Runs commands against the user and settings stores.
pub struct StoreCommandService {
    users: Arc<dyn UserRepository>,
    settings: Arc<dyn SettingsRepository>,
    hasher: Arc<dyn SecretHasher>,
    membership: Arc<dyn MembershipLookup>,
}

impl StoreCommandService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        settings: Arc<dyn SettingsRepository>,
        hasher: Arc<dyn SecretHasher>,
        membership: Arc<dyn MembershipLookup>,
    ) -> Self {
        Self { users, settings, hasher, membership }
    }

    async fn run(
        &self,
        invocation: &CommandInvocation,
        ctx: &EventContext,
    ) -> Result<Vec<MessageTemplate>, CommandError> {
        let kind = invocation.command.kind;
        if kind.is_privileged() {
            let invoker = self.users.get_or_create(&invocation.user_id).await?;
            if let Authorization::Deny { .. } = authorize(invoker.role, kind) {
                return Err(CommandError::Unauthorized { command: kind, role: invoker.role });
            }
        }

        let args = invocation.command.args.as_slice();
        let user_id = &invocation.user_id;
        match kind {
            CommandKind::Help => Ok(vec![blocks::help_message()]),
            CommandKind::HelpExec => Ok(vec![blocks::help_exec_message()]),
            CommandKind::Bits => self.bits(user_id).await,
            CommandKind::Profile => self.profile(user_id).await,
            CommandKind::Teams => self.teams().await,
            CommandKind::SetTeam => self.team_picker().await,
            CommandKind::Checkin => self.checkin(user_id, args, ctx).await,
            CommandKind::SetPassword => self.set_password(args).await,
            CommandKind::SetForm => self.set_form(args).await,
            CommandKind::RemoveForm => self.remove_form().await,
            CommandKind::AddTeams => self.add_teams(args).await,
            CommandKind::RemoveTeams => self.remove_teams(args).await,
            CommandKind::SetRole => self.set_role(user_id, args).await,
            CommandKind::GiveBits => self.give_bits(&invocation.channel_id, args, ctx).await,
            CommandKind::GiveTeamBits => self.give_team_bits(args).await,
            CommandKind::Leaderboard => self.leaderboard(args).await,
        }
    }

    async fn bits(&self, user_id: &UserId) -> Result<Vec<MessageTemplate>, CommandError> {
        let user = self.users.get_or_create(user_id).await?;
        Ok(vec![MessageTemplate::text(format!("You have {} bits!", user.bits))])
    }

    async fn profile(&self, user_id: &UserId) -> Result<Vec<MessageTemplate>, CommandError> {
        let user = self.users.get_or_create(user_id).await?;
        Ok(vec![MessageTemplate::text(format!(
            "Profile for {}\nRole: {}\nBits: {}\nTeam: {}",
            user.id.mention(),
            user.role,
            user.bits,
            user.team
        ))])
    }

    async fn teams(&self) -> Result<Vec<MessageTemplate>, CommandError> {
        let roster = self.settings.roster().await?;
        if roster.is_empty() {
            return Ok(vec![MessageTemplate::text(NO_TEAMS)]);
        }
        Ok(vec![MessageTemplate::text(format!("Teams: {}", roster.teams.join(", ")))])
    }

    async fn team_picker(&self) -> Result<Vec<MessageTemplate>, CommandError> {
        let roster = self.settings.roster().await?;
        if roster.is_empty() {
            return Err(CommandError::NotConfigured(format!(
                "{NO_TEAMS} Ask an exec to add teams first."
            )));
        }
        Ok(vec![blocks::team_picker_message(&roster)])
    }

    async fn checkin(
        &self,
        user_id: &UserId,
        args: &[String],
        ctx: &EventContext,
    ) -> Result<Vec<MessageTemplate>, CommandError> {
        let [secret] = args else {
            return Err(CommandError::input("Please provide a password."));
        };
        let Some(password) = self.settings.password().await? else {
            return Err(CommandError::NotConfigured(
                "Check-in is not open yet. Ask an exec to set a password.".to_owned(),
            ));
        };
        if !self.hasher.verify(secret, &password.password_hash)? {
            return Err(CommandError::input("Incorrect password."));
        }

        let user = self.users.get_or_create(user_id).await?;
        if user.is_checked_in(&password.password_hash) {
            return Ok(vec![MessageTemplate::text("Already checked in.")]);
        }
        let Some(bits) = self.users.record_checkin(user_id, &password.password_hash).await? else {
            return Ok(vec![MessageTemplate::text("Already checked in.")]);
        };

        info!(
            event_name = "command.checkin_recorded",
            correlation_id = %ctx.correlation_id,
            user_id = %user_id,
            bits,
            "attendance recorded"
        );

        let mut replies = vec![MessageTemplate::text(format!("Checked in. You now have {bits} bits!"))];
        if let Some(form) = self.settings.form().await? {
            replies.push(MessageTemplate::text(format!(
                "Please visit {} to fill out today's form.",
                form.url
            )));
        }
        Ok(replies)
    }

    async fn set_password(&self, args: &[String]) -> Result<Vec<MessageTemplate>, CommandError> {
        let [secret] = args else {
            return Err(CommandError::input("Please provide a password."));
        };
        let password_hash = self.hasher.hash(secret)?;
        self.settings.replace_password(PasswordDocument { password_hash }).await?;
        Ok(vec![MessageTemplate::text("Updated password.")])
    }

    async fn set_form(&self, args: &[String]) -> Result<Vec<MessageTemplate>, CommandError> {
        let [link] = args else {
            return Err(CommandError::input("Please provide a url to the form."));
        };
        self.settings.replace_form(FormDocument { url: parse_link(link) }).await?;
        Ok(vec![MessageTemplate::text("Updated form.")])
    }

    async fn remove_form(&self) -> Result<Vec<MessageTemplate>, CommandError> {
        self.settings.delete_form().await?;
        Ok(vec![MessageTemplate::text("Removed form.")])
    }

    async fn add_teams(&self, args: &[String]) -> Result<Vec<MessageTemplate>, CommandError> {
        if args.is_empty() {
            return Err(CommandError::input("Please provide at least one team."));
        }
        self.settings.append_teams(args).await?;
        Ok(vec![MessageTemplate::text("Added teams.")])
    }

    async fn remove_teams(&self, args: &[String]) -> Result<Vec<MessageTemplate>, CommandError> {
        if args.is_empty() {
            return Err(CommandError::input("Please provide at least one team."));
        }
        self.settings.remove_teams(args).await?;
        Ok(vec![MessageTemplate::text("Removed teams.")])
    }

    async fn set_role(
        &self,
        invoker: &UserId,
        args: &[String],
    ) -> Result<Vec<MessageTemplate>, CommandError> {
        let Some(target) = args.first().and_then(|token| parse_single_user(token)) else {
            return Err(CommandError::input(PROVIDE_USER));
        };
        let [_, role] = args else {
            return Err(CommandError::input(format!(
                "Please provide a role. Available roles are {}.",
                Role::valid_values()
            )));
        };
        let Some(role) = Role::parse(role) else {
            return Err(CommandError::input(format!(
                "Incorrect role. Available roles are {}.",
                Role::valid_values()
            )));
        };
        if &target == invoker {
            return Err(CommandError::input("You cannot change your own role."));
        }

        self.users.get_or_create(&target).await?;
        self.users.set_role(&target, role).await?;
        Ok(vec![MessageTemplate::text(format!("Updated {}'s role.", target.mention()))])
    }

    async fn give_bits(
        &self,
        channel_id: &str,
        args: &[String],
        ctx: &EventContext,
    ) -> Result<Vec<MessageTemplate>, CommandError> {
        let Some((amount, target_tokens)) = args.split_last() else {
            return Err(CommandError::input(PROVIDE_USER));
        };
        if target_tokens.is_empty() {
            let message = if parse_mentions(amount).is_some() { PROVIDE_AMOUNT } else { PROVIDE_USER };
            return Err(CommandError::input(message));
        }

        let mut targets = Vec::new();
        for token in target_tokens {
            let Some(parsed) = parse_mentions(token) else {
                return Err(CommandError::input(PROVIDE_USER));
            };
            targets.extend(parsed);
        }
        let amount = amount_or_reply(amount)?;

        let mut recipients = Vec::new();
        let mut seen = HashSet::new();
        for target in targets {
            let resolved = match target {
                Target::User(id) => vec![id],
                Target::Channel => self.membership.channel_members(channel_id).await?,
            };
            for id in resolved {
                if seen.insert(id.clone()) {
                    recipients.push(id);
                }
            }
        }

        self.users.get_or_create_many(&recipients).await?;
        let touched = self.users.add_bits(&recipients, amount).await?;
        info!(
            event_name = "command.bits_granted",
            correlation_id = %ctx.correlation_id,
            recipients = recipients.len(),
            touched,
            amount,
            "bits granted"
        );

        let reply = match recipients.as_slice() {
            [single] => format!("Updated {}'s bits.", single.mention()),
            many => format!("Updated bits for {} users.", many.len()),
        };
        Ok(vec![MessageTemplate::text(reply)])
    }

    async fn give_team_bits(&self, args: &[String]) -> Result<Vec<MessageTemplate>, CommandError> {
        let Some(team) = args.first() else {
            return Err(CommandError::input("Please provide a team. Check the team list with `teams`."));
        };
        let [_, amount] = args else {
            return Err(CommandError::input(PROVIDE_AMOUNT));
        };
        if !self.settings.roster().await?.contains(team) {
            return Err(CommandError::input("Not a valid team."));
        }
        let amount = amount_or_reply(amount)?;

        self.users.add_bits_to_team(team, amount).await?;
        Ok(vec![MessageTemplate::text(format!("Updated team {team}'s bits."))])
    }

    async fn leaderboard(&self, args: &[String]) -> Result<Vec<MessageTemplate>, CommandError> {
        let limit = match args {
            [] => DEFAULT_LEADERBOARD_LIMIT,
            [token] => parse_limit(token)
                .ok_or_else(|| CommandError::input("Please provide an integer limit."))?,
            _ => return Err(CommandError::input("Please provide an integer limit.")),
        };

        let ranked = self.users.leaderboard(limit).await?;
        let body = if ranked.is_empty() {
            "Nobody has any bits yet.".to_owned()
        } else {
            ranked
                .iter()
                .enumerate()
                .map(|(index, user)| format!("{}. {}: {} bits", index + 1, user.id.mention(), user.bits))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Ok(vec![MessageTemplate::text("Current Leaderboard:"), MessageTemplate::text(body)])
    }
}

#[async_trait]
impl ChatCommandService for StoreCommandService {
    async fn execute(
        &self,
        invocation: &CommandInvocation,
        ctx: &EventContext,
    ) -> Result<Vec<MessageTemplate>, ApplicationError> {
        info!(
            event_name = "command.classified",
            correlation_id = %ctx.correlation_id,
            command = invocation.command.kind.as_str(),
            user_id = %invocation.user_id,
            "command classified"
        );

        match self.run(invocation, ctx).await {
            Ok(replies) => Ok(replies),
            Err(CommandError::Application(error)) => Err(error),
            Err(error) => {
                if let CommandError::Unauthorized { command, role } = &error {
                    warn!(
                        event_name = "command.denied",
                        correlation_id = %ctx.correlation_id,
                        command = command.as_str(),
                        role = role.as_str(),
                        user_id = %invocation.user_id,
                        "command denied"
                    );
                }
                Ok(error.reply_text().map(MessageTemplate::text).into_iter().collect())
            }
        }
    }

    async fn select_team(
        &self,
        user_id: &UserId,
        team: &str,
        ctx: &EventContext,
    ) -> Result<Vec<MessageTemplate>, ApplicationError> {
        let roster = self.settings.roster().await.map_err(ApplicationError::from)?;
        if !roster.contains(team) {
            return Ok(vec![MessageTemplate::text("Not a valid team.")]);
        }

        self.users.set_team(user_id, team).await.map_err(ApplicationError::from)?;
        info!(
            event_name = "command.team_changed",
            correlation_id = %ctx.correlation_id,
            user_id = %user_id,
            team,
            "team changed"
        );
        Ok(vec![MessageTemplate::text("Team changed!")])
    }
}
