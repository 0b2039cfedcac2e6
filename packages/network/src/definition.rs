//! Communicator definitions.
//!
//! A communicator is authored as a [`CommunicatorSource`]: a structural table
//! (a `Value`) plus the actions bound to its channels. The table has two
//! optional sub-tables:
//!
//! ```json
//! {
//!     "requests": { "remotes": ["Buy", "Price"] },
//!     "fires":    { "remotes": ["Purchased"] }
//! }
//! ```
//!
//! Registration parses each source into a typed [`CommunicatorDefinition`]
//! and rejects anything that does not conform.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use trellis_core::{json, BoxError, EntryKind, Error, Name, Result, Value};

use crate::caller::Caller;

/// Request/response or fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Request,
    Fire,
}

impl ChannelKind {
    /// Key of the structural table that declares channels of this kind.
    pub fn table_key(self) -> &'static str {
        match self {
            ChannelKind::Request => "requests",
            ChannelKind::Fire => "fires",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Request => write!(f, "request"),
            ChannelKind::Fire => write!(f, "fire"),
        }
    }
}

/// A handler bound to a channel.
///
/// Receives the caller and the invocation arguments. For request channels the
/// returned value is the response; for fire channels it is discarded.
pub type Action =
    Arc<dyn Fn(&Caller, Vec<Value>) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// One declared channel.
#[derive(Clone)]
pub struct ChannelSpec {
    name: String,
    kind: ChannelKind,
    action: Option<Action>,
}

impl ChannelSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }
}

impl fmt::Debug for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// A validated communicator: its request and fire channels in declaration
/// order. Channel names are unique across both lists.
#[derive(Clone, Debug)]
pub struct CommunicatorDefinition {
    name: String,
    requests: Vec<ChannelSpec>,
    fires: Vec<ChannelSpec>,
}

impl CommunicatorDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requests(&self) -> &[ChannelSpec] {
        &self.requests
    }

    pub fn fires(&self) -> &[ChannelSpec] {
        &self.fires
    }

    /// All channels, requests first.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.requests.iter().chain(self.fires.iter())
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels().find(|spec| spec.name == name)
    }
}

/// The authored form of a communicator, as found in a container.
#[derive(Clone)]
pub struct CommunicatorSource {
    table: Value,
    actions: Vec<(ChannelKind, String, Action)>,
}

impl CommunicatorSource {
    /// An empty communicator.
    pub fn new() -> Self {
        Self::from_value(Value::map())
    }

    /// Start from a structural table.
    pub fn from_value(table: Value) -> Self {
        Self {
            table,
            actions: Vec::new(),
        }
    }

    /// Start from a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self::from_value(json::parse(text)?))
    }

    /// Declare a request channel.
    #[must_use]
    pub fn request(self, name: &str) -> Self {
        self.declare(ChannelKind::Request, name)
    }

    /// Declare a fire channel.
    #[must_use]
    pub fn fire(self, name: &str) -> Self {
        self.declare(ChannelKind::Fire, name)
    }

    /// Bind an action to a request channel.
    #[must_use]
    pub fn on_request<F>(self, name: &str, action: F) -> Self
    where
        F: Fn(&Caller, Vec<Value>) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.bind(ChannelKind::Request, name, Arc::new(action))
    }

    /// Bind an action to a fire channel.
    #[must_use]
    pub fn on_fire<F>(self, name: &str, action: F) -> Self
    where
        F: Fn(&Caller, Vec<Value>) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.bind(ChannelKind::Fire, name, Arc::new(action))
    }

    /// Bind a shared action.
    #[must_use]
    pub fn bind(mut self, kind: ChannelKind, name: &str, action: Action) -> Self {
        self.actions.push((kind, name.to_string(), action));
        self
    }

    /// The structural table as authored.
    pub fn table(&self) -> &Value {
        &self.table
    }

    fn declare(mut self, kind: ChannelKind, name: &str) -> Self {
        // A table that is not a map is reported when the source is parsed.
        if let Some(table) = self.table.table_mut(kind.table_key()) {
            match table
                .entry("remotes".to_string())
                .or_insert_with(Value::array)
            {
                Value::Array(remotes) => remotes.push(Value::from(name)),
                other => *other = Value::from(vec![name]),
            }
        }
        self
    }

    /// Validate and convert into a definition named `name`.
    pub fn parse(&self, name: &str) -> Result<CommunicatorDefinition> {
        Name::validate(name)?;

        let table = self
            .table
            .as_map()
            .ok_or_else(|| Error::malformed(name, format!("expected a table, found {}", self.table.type_name())))?;
        if let Some(key) = table
            .keys()
            .find(|k| *k != "requests" && *k != "fires")
        {
            return Err(Error::malformed(name, format!("unknown key '{}'", key)));
        }

        let mut seen = BTreeSet::new();
        let mut requests = parse_remotes(name, ChannelKind::Request, &self.table, &mut seen)?;
        let mut fires = parse_remotes(name, ChannelKind::Fire, &self.table, &mut seen)?;

        for (kind, channel, action) in &self.actions {
            let specs = match kind {
                ChannelKind::Request => &mut requests,
                ChannelKind::Fire => &mut fires,
            };
            let spec = specs
                .iter_mut()
                .find(|spec| spec.name == *channel)
                .ok_or_else(|| {
                    Error::malformed(
                        name,
                        format!("action '{}' has no matching {} remote", channel, kind),
                    )
                })?;
            if spec.action.is_some() {
                return Err(Error::malformed(
                    name,
                    format!("action '{}' is bound twice", channel),
                ));
            }
            spec.action = Some(action.clone());
        }

        Ok(CommunicatorDefinition {
            name: name.to_string(),
            requests,
            fires,
        })
    }
}

impl Default for CommunicatorSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommunicatorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<_> = self
            .actions
            .iter()
            .map(|(kind, name, _)| format!("{}:{}", kind, name))
            .collect();
        f.debug_struct("CommunicatorSource")
            .field("table", &self.table)
            .field("actions", &actions)
            .finish()
    }
}

fn parse_remotes(
    communicator: &str,
    kind: ChannelKind,
    table: &Value,
    seen: &mut BTreeSet<String>,
) -> Result<Vec<ChannelSpec>> {
    let key = kind.table_key();
    let Some(section) = table.get(key) else {
        return Ok(Vec::new());
    };
    let section = section.as_map().ok_or_else(|| {
        Error::malformed(
            communicator,
            format!("'{}' must be a table, found {}", key, section.type_name()),
        )
    })?;
    if let Some(other) = section.keys().find(|k| *k != "remotes") {
        return Err(Error::malformed(
            communicator,
            format!("unknown key '{}.{}'", key, other),
        ));
    }

    let remotes = match section.get("remotes") {
        None => return Ok(Vec::new()),
        Some(value) => value.as_array().ok_or_else(|| {
            Error::malformed(
                communicator,
                format!("'{}.remotes' must be a list, found {}", key, value.type_name()),
            )
        })?,
    };

    let mut specs = Vec::with_capacity(remotes.len());
    for remote in remotes {
        let channel = remote.as_str().ok_or_else(|| {
            Error::malformed(
                communicator,
                format!("'{}.remotes' entries must be strings, found {}", key, remote.type_name()),
            )
        })?;
        Name::validate(channel)?;
        if !seen.insert(channel.to_string()) {
            return Err(Error::duplicate(
                EntryKind::Channel,
                format!("{}.{}", communicator, channel),
            ));
        }
        specs.push(ChannelSpec {
            name: channel.to_string(),
            kind,
            action: None,
        });
    }
    Ok(specs)
}
