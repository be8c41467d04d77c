use serde::{Deserialize, Serialize};

/// Names of the singleton settings documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingName {
    Password,
    Form,
    Roster,
}

impl SettingName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Form => "form",
            Self::Roster => "roster",
        }
    }
}

/// Holds the hash of the current attendance password, never the plaintext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordDocument {
    pub password_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDocument {
    pub url: String,
}

/// Ordered team list. Duplicates are kept as entered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub teams: Vec<String>,
}

impl Roster {
    pub fn new(teams: Vec<String>) -> Self {
        Self { teams }
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn contains(&self, team: &str) -> bool {
        self.teams.iter().any(|candidate| candidate == team)
    }

    pub fn append<I, S>(&mut self, teams: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.teams.extend(teams.into_iter().map(Into::into));
    }

    /// Removes the first occurrence of each named team. Names that are not on
    /// the roster are ignored.
    pub fn remove_first_occurrences<I, S>(&mut self, teams: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for team in teams {
            if let Some(index) = self.teams.iter().position(|candidate| candidate == team.as_ref())
            {
                self.teams.remove(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Roster;

    fn roster(teams: &[&str]) -> Roster {
        Roster::new(teams.iter().map(|team| team.to_string()).collect())
    }

    #[test]
    fn removal_takes_only_the_first_occurrence() {
        let mut teams = roster(&["A", "B", "A"]);
        teams.remove_first_occurrences(["A"]);
        assert_eq!(teams, roster(&["B", "A"]));
    }

    #[test]
    fn removing_a_name_twice_removes_two_occurrences() {
        let mut teams = roster(&["A", "B", "A"]);
        teams.remove_first_occurrences(["A", "A"]);
        assert_eq!(teams, roster(&["B"]));
    }

    #[test]
    fn unknown_names_are_ignored() {
        let mut teams = roster(&["A", "B"]);
        teams.remove_first_occurrences(["Z"]);
        assert_eq!(teams, roster(&["A", "B"]));
    }

    #[test]
    fn append_keeps_duplicates_in_order() {
        let mut teams = roster(&["A"]);
        teams.append(["B", "A"]);
        assert_eq!(teams, roster(&["A", "B", "A"]));
        assert!(teams.contains("B"));
        assert!(!teams.contains("b"));
    }
}
