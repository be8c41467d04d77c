use serde::Serialize;

use bogbot_core::domain::settings::Roster;
use bogbot_core::errors::InterfaceError;

pub const CHANGE_TEAM_ACTION_ID: &str = "change_team";
pub const TEAM_PICKER_BLOCK_ID: &str = "team_picker";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub text: TextObject,
    pub value: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self { text: TextObject::plain(value.clone()), value }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    StaticSelect { action_id: String, placeholder: TextObject, options: Vec<SelectOption> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<Element> },
    Context { block_id: String, elements: Vec<TextObject> },
}

/// A reply payload. Plain-text replies carry no blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn text(text: impl Into<String>) -> Self {
        Self { fallback_text: text.into(), blocks: Vec::new() }
    }

    pub fn is_plain(&self) -> bool {
        self.blocks.is_empty()
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<Element>,
}

impl ActionsBuilder {
    pub fn static_select<I>(
        &mut self,
        action_id: impl Into<String>,
        placeholder: impl Into<String>,
        options: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = SelectOption>,
    {
        self.elements.push(Element::StaticSelect {
            action_id: action_id.into(),
            placeholder: TextObject::plain(placeholder),
            options: options.into_iter().collect(),
        });
        self
    }

    fn build(self) -> Vec<Element> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

const HELP_TEXT: &str = "```Available commands:\n\
help [exec]                   See this command. Add exec for exec commands.\n\
checkin {password}            Attendance at General/Team Meetings + office hours!\n\
bits                          See your current bit count.\n\
profile                       See your role, bits and team.\n\
teams                         See the team list.\n\
set team                      Set your current team.\n\
leaderboard [amt]             See the current bit leaderboard. Optional param for length.\n```";

const HELP_EXEC_TEXT: &str = "```Available commands:\n\
help [exec]                     See this command. Add exec for exec commands.\n\
set password {password}         Set attendance password.\n\
set form {form_link}            Set attendance form link.\n\
remove form                     Removes form link. Only necessary if there is no form.\n\
add teams {team1 team2...}      Add teams to the team list.\n\
remove teams {team1 team2...}   Remove teams from the team list.\n\
set role {user} {role}          Set a user's role. Options are exec, leader, member.\n\
give bits {users|channel} {amt} Give users bits. Use @username or channel.\n\
give team_bits {team} {amt}     Give a team bits. Check the team list with teams.\n```";

pub fn help_message() -> MessageTemplate {
    MessageTemplate::text(HELP_TEXT)
}

pub fn help_exec_message() -> MessageTemplate {
    MessageTemplate::text(HELP_EXEC_TEXT)
}

/// Static-select picker listing every roster entry once, in roster order.
pub fn team_picker_message(roster: &Roster) -> MessageTemplate {
    let mut seen = Vec::new();
    for team in &roster.teams {
        if !seen.contains(team) {
            seen.push(team.clone());
        }
    }

    MessageBuilder::new("Team Picker")
        .actions(TEAM_PICKER_BLOCK_ID, |actions| {
            actions.static_select(
                CHANGE_TEAM_ACTION_ID,
                "Pick your team",
                seen.into_iter().map(SelectOption::new),
            );
        })
        .build()
}

/// Reply for a failed event. Carries the reference id, never the error detail.
pub fn internal_error_message(error: &InterfaceError) -> MessageTemplate {
    let summary = error.user_message();
    MessageBuilder::new(summary)
        .section("bogbot.error.summary", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("bogbot.error.context", |context| {
            context.plain(format!("Reference: {}", error.correlation_id()));
        })
        .build()
}

#[cfg(test)]
mod tests {
    use bogbot_core::domain::settings::Roster;
    use bogbot_core::errors::{FailureClass, InterfaceError};
    use serde_json::json;

    use super::{
        help_exec_message, help_message, internal_error_message, team_picker_message, Block,
        Element, MessageBuilder, TextObject, CHANGE_TEAM_ACTION_ID,
    };

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .section("summary", |section| {
                section.mrkdwn("*Summary*");
            })
            .context("summary.context", |context| {
                context.plain("details");
            })
            .build();

        assert_eq!(message.blocks.len(), 2);
        assert!(!message.is_plain());
        assert!(matches!(
            &message.blocks[0],
            Block::Section { block_id, text: TextObject::Mrkdwn { .. } } if block_id == "summary"
        ));
    }

    #[test]
    fn team_picker_is_a_static_select_with_unique_options() {
        let roster =
            Roster::new(vec!["Red".to_owned(), "Blue".to_owned(), "Red".to_owned()]);
        let message = team_picker_message(&roster);

        let Block::Actions { elements, .. } = &message.blocks[0] else {
            panic!("expected actions block");
        };
        let Element::StaticSelect { action_id, options, .. } = &elements[0];
        assert_eq!(action_id, CHANGE_TEAM_ACTION_ID);
        let values: Vec<_> = options.iter().map(|option| option.value.as_str()).collect();
        assert_eq!(values, vec!["Red", "Blue"]);
    }

    #[test]
    fn picker_serializes_to_block_kit_shape() {
        let message = team_picker_message(&Roster::new(vec!["Red".to_owned()]));
        let blocks = serde_json::to_value(&message.blocks).expect("serialize");

        assert_eq!(
            blocks,
            json!([{
                "type": "actions",
                "block_id": "team_picker",
                "elements": [{
                    "type": "static_select",
                    "action_id": "change_team",
                    "placeholder": { "type": "plain_text", "text": "Pick your team" },
                    "options": [{ "text": { "type": "plain_text", "text": "Red" }, "value": "Red" }]
                }]
            }])
        );
    }

    #[test]
    fn help_texts_list_their_commands() {
        assert!(help_message().fallback_text.contains("checkin {password}"));
        assert!(help_message().is_plain());
        assert!(help_exec_message().fallback_text.contains("give team_bits"));
        assert!(!help_message().fallback_text.contains("set password"));
    }

    #[test]
    fn internal_error_carries_reference_not_details() {
        let error = InterfaceError::new(FailureClass::Unavailable, "database is locked", "env-9");
        let message = internal_error_message(&error);
        assert!(!message.fallback_text.contains("locked"));
        assert!(matches!(
            &message.blocks[1],
            Block::Context { elements, .. }
                if elements == &vec![TextObject::plain("Reference: env-9")]
        ));
    }
}
