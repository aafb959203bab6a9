use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(BotId, i64);
id_newtype!(UserId, i64);
id_newtype!(GroupId, i64);
id_newtype!(
    /// Sender-chosen random id attached to every wire-level message.
    InternalId,
    i32
);
id_newtype!(
    /// Server-assigned id of a delivered message.
    SequenceId,
    i32
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Friend,
    Group,
    GroupTemp,
    Stranger,
}

impl ContactKind {
    pub fn is_group(self) -> bool {
        matches!(self, ContactKind::Group)
    }
}

/// Where a message came from or is going to, as seen by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Friend,
    Group,
    Temp,
    Stranger,
}

impl From<ContactKind> for SourceKind {
    fn from(kind: ContactKind) -> Self {
        match kind {
            ContactKind::Friend => SourceKind::Friend,
            ContactKind::Group => SourceKind::Group,
            ContactKind::GroupTemp => SourceKind::Temp,
            ContactKind::Stranger => SourceKind::Stranger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    pub kind: ContactKind,
    pub id: i64,
    /// Group the temp session goes through; only set for `GroupTemp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_group: Option<GroupId>,
    /// Display name of the bot inside this contact (group card), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_name_card: Option<String>,
}

impl Contact {
    pub fn friend(id: i64) -> Self {
        Self {
            kind: ContactKind::Friend,
            id,
            via_group: None,
            bot_name_card: None,
        }
    }

    pub fn group(id: i64) -> Self {
        Self {
            kind: ContactKind::Group,
            id,
            via_group: None,
            bot_name_card: None,
        }
    }

    pub fn group_temp(id: i64, via_group: GroupId) -> Self {
        Self {
            kind: ContactKind::GroupTemp,
            id,
            via_group: Some(via_group),
            bot_name_card: None,
        }
    }

    pub fn stranger(id: i64) -> Self {
        Self {
            kind: ContactKind::Stranger,
            id,
            via_group: None,
            bot_name_card: None,
        }
    }

    pub fn with_bot_name_card(mut self, name_card: impl Into<String>) -> Self {
        self.bot_name_card = Some(name_card.into());
        self
    }

    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    pub fn source_kind(&self) -> SourceKind {
        self.kind.into()
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ContactKind::Friend => write!(f, "Friend({})", self.id),
            ContactKind::Group => write!(f, "Group({})", self.id),
            ContactKind::GroupTemp => write!(f, "GroupTemp({})", self.id),
            ContactKind::Stranger => write!(f, "Stranger({})", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotProfile {
    pub id: BotId,
    pub nick: String,
}

impl BotProfile {
    pub fn new(id: i64, nick: impl Into<String>) -> Self {
        Self {
            id: BotId(id),
            nick: nick.into(),
        }
    }

    /// Name the bot is shown with inside `contact`.
    pub fn name_in(&self, contact: &Contact) -> String {
        contact
            .bot_name_card
            .clone()
            .filter(|card| !card.is_empty())
            .unwrap_or_else(|| self.nick.clone())
    }
}
