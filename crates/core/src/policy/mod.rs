use serde::{Deserialize, Serialize};

use crate::domain::user::Role;

/// Every chat command the bot understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Help,
    HelpExec,
    Bits,
    Profile,
    Teams,
    SetTeam,
    Checkin,
    SetPassword,
    SetForm,
    RemoveForm,
    AddTeams,
    RemoveTeams,
    SetRole,
    GiveBits,
    GiveTeamBits,
    Leaderboard,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::HelpExec => "help exec",
            Self::Bits => "bits",
            Self::Profile => "profile",
            Self::Teams => "teams",
            Self::SetTeam => "set team",
            Self::Checkin => "checkin",
            Self::SetPassword => "set password",
            Self::SetForm => "set form",
            Self::RemoveForm => "remove form",
            Self::AddTeams => "add teams",
            Self::RemoveTeams => "remove teams",
            Self::SetRole => "set role",
            Self::GiveBits => "give bits",
            Self::GiveTeamBits => "give team_bits",
            Self::Leaderboard => "leaderboard",
        }
    }

    /// Minimum role allowed to run the command.
    pub fn required_role(&self) -> Role {
        match self {
            Self::SetPassword
            | Self::SetForm
            | Self::RemoveForm
            | Self::AddTeams
            | Self::RemoveTeams
            | Self::SetRole
            | Self::GiveBits
            | Self::GiveTeamBits => Role::Exec,
            Self::Help
            | Self::HelpExec
            | Self::Bits
            | Self::Profile
            | Self::Teams
            | Self::SetTeam
            | Self::Checkin
            | Self::Leaderboard => Role::Member,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.required_role() > Role::Member
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    Deny { required: Role },
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

pub fn authorize(role: Role, command: CommandKind) -> Authorization {
    let required = command.required_role();
    if role >= required {
        Authorization::Allow
    } else {
        Authorization::Deny { required }
    }
}

#[cfg(test)]
mod tests {
    use super::{authorize, Authorization, CommandKind};
    use crate::domain::user::Role;

    const EXEC_ONLY: [CommandKind; 8] = [
        CommandKind::SetPassword,
        CommandKind::SetForm,
        CommandKind::RemoveForm,
        CommandKind::AddTeams,
        CommandKind::RemoveTeams,
        CommandKind::SetRole,
        CommandKind::GiveBits,
        CommandKind::GiveTeamBits,
    ];

    const SELF_SERVICE: [CommandKind; 8] = [
        CommandKind::Help,
        CommandKind::HelpExec,
        CommandKind::Bits,
        CommandKind::Profile,
        CommandKind::Teams,
        CommandKind::SetTeam,
        CommandKind::Checkin,
        CommandKind::Leaderboard,
    ];

    #[test]
    fn exec_only_commands_deny_members_and_leaders() {
        for command in EXEC_ONLY {
            for role in [Role::Member, Role::Leader] {
                assert_eq!(
                    authorize(role, command),
                    Authorization::Deny { required: Role::Exec },
                    "{role} should not run `{}`",
                    command.as_str()
                );
            }
            assert!(authorize(Role::Exec, command).is_allowed());
            assert!(command.is_privileged());
        }
    }

    #[test]
    fn self_service_commands_allow_every_role() {
        for command in SELF_SERVICE {
            for role in Role::ALL {
                assert!(authorize(role, command).is_allowed());
            }
            assert!(!command.is_privileged());
        }
    }
}
