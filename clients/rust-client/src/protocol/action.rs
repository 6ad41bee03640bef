use bson::{doc, Bson, Document};
use url::Url;

use super::codec::{decode_command_binary, encode_command_binary};
use super::error::ProtocolError;

/// Names of every action the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Connect,
    Reconnect,
    Databases,
    Tables,
    Views,
    MaterializedViews,
    TableInfo,
    DeleteRows,
    UpdateItems,
    RunCommand,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Connect,
        ActionKind::Reconnect,
        ActionKind::Databases,
        ActionKind::Tables,
        ActionKind::Views,
        ActionKind::MaterializedViews,
        ActionKind::TableInfo,
        ActionKind::DeleteRows,
        ActionKind::UpdateItems,
        ActionKind::RunCommand,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Connect => "connect",
            ActionKind::Reconnect => "reconnect",
            ActionKind::Databases => "databases",
            ActionKind::Tables => "tables",
            ActionKind::Views => "views",
            ActionKind::MaterializedViews => "materializedViews",
            ActionKind::TableInfo => "tableInfo",
            ActionKind::DeleteRows => "deleteRows",
            ActionKind::UpdateItems => "updateItems",
            ActionKind::RunCommand => "runCommand",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Payload of `runCommand`: raw SQL text, or a command document that
/// travels as BSON-encoded binary.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    Sql(String),
    Document(Document),
}

/// One entry of an `updateItems` request.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItem {
    pub key: Document,
    pub update: Document,
}

/// A validated action with its required fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Connect { url: Url },
    Reconnect { database: String },
    Databases,
    Tables,
    Views,
    MaterializedViews,
    TableInfo { table: String },
    DeleteRows { table: String, keys: Vec<Document> },
    UpdateItems { table: String, items: Vec<UpdateItem> },
    RunCommand { command: CommandPayload },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Connect { .. } => ActionKind::Connect,
            Action::Reconnect { .. } => ActionKind::Reconnect,
            Action::Databases => ActionKind::Databases,
            Action::Tables => ActionKind::Tables,
            Action::Views => ActionKind::Views,
            Action::MaterializedViews => ActionKind::MaterializedViews,
            Action::TableInfo { .. } => ActionKind::TableInfo,
            Action::DeleteRows { .. } => ActionKind::DeleteRows,
            Action::UpdateItems { .. } => ActionKind::UpdateItems,
            Action::RunCommand { .. } => ActionKind::RunCommand,
        }
    }

    /// Validate the fields an action of `kind` requires.
    pub fn parse(kind: ActionKind, message: &Document) -> Result<Self, ProtocolError> {
        let action = match kind {
            ActionKind::Connect => {
                let url = message
                    .get_str("url")
                    .ok()
                    .and_then(|url| Url::parse(url).ok())
                    .ok_or(ProtocolError::InvalidUrl)?;
                Action::Connect { url }
            }
            ActionKind::Reconnect => Action::Reconnect {
                database: required_str(message, "database")?,
            },
            ActionKind::Databases => Action::Databases,
            ActionKind::Tables => Action::Tables,
            ActionKind::Views => Action::Views,
            ActionKind::MaterializedViews => Action::MaterializedViews,
            ActionKind::TableInfo => Action::TableInfo {
                table: required_str(message, "table")?,
            },
            ActionKind::DeleteRows => {
                let table = required_str(message, "table")?;
                let keys: Vec<Document> = message
                    .get_array("delete")
                    .map_err(|_| ProtocolError::InvalidCommand)?
                    .iter()
                    .map(|item| item.as_document().cloned())
                    .collect::<Option<_>>()
                    .ok_or(ProtocolError::InvalidCommand)?;
                if keys.is_empty() || keys.iter().any(Document::is_empty) {
                    return Err(ProtocolError::InvalidCommand);
                }
                Action::DeleteRows { table, keys }
            }
            ActionKind::UpdateItems => {
                let table = required_str(message, "table")?;
                let items = message
                    .get_array("update")
                    .map_err(|_| ProtocolError::InvalidCommand)?
                    .iter()
                    .map(|item| {
                        let item = item.as_document();
                        let field = |name: &str| {
                            item.and_then(|item| item.get_document(name).ok())
                                .cloned()
                                .unwrap_or_default()
                        };
                        UpdateItem {
                            key: field("key"),
                            update: field("update"),
                        }
                    })
                    .collect::<Vec<_>>();
                if items.iter().any(|item| item.key.is_empty() || item.update.is_empty()) {
                    return Err(ProtocolError::InvalidCommand);
                }
                Action::UpdateItems { table, items }
            }
            ActionKind::RunCommand => {
                let command = match message.get("command") {
                    Some(Bson::String(sql)) => CommandPayload::Sql(sql.clone()),
                    Some(Bson::Binary(binary)) => CommandPayload::Document(
                        decode_command_binary(&binary.bytes)
                            .map_err(|_| ProtocolError::InvalidCommand)?,
                    ),
                    _ => return Err(ProtocolError::InvalidCommand),
                };
                Action::RunCommand { command }
            }
        };
        Ok(action)
    }

    /// Render the action as a request payload, without a token.
    pub fn to_document(&self) -> Result<Document, ProtocolError> {
        let mut message = doc! { "action": self.kind().name() };
        match self {
            Action::Connect { url } => {
                message.insert("url", url.as_str());
            }
            Action::Reconnect { database } => {
                message.insert("database", database.as_str());
            }
            Action::Databases | Action::Tables | Action::Views | Action::MaterializedViews => {}
            Action::TableInfo { table } => {
                message.insert("table", table.as_str());
            }
            Action::DeleteRows { table, keys } => {
                message.insert("table", table.as_str());
                message.insert(
                    "delete",
                    keys.iter().cloned().map(Bson::Document).collect::<Vec<_>>(),
                );
            }
            Action::UpdateItems { table, items } => {
                message.insert("table", table.as_str());
                message.insert(
                    "update",
                    items
                        .iter()
                        .map(|item| Bson::Document(doc! { "key": item.key.clone(), "update": item.update.clone() }))
                        .collect::<Vec<_>>(),
                );
            }
            Action::RunCommand { command } => {
                let command = match command {
                    CommandPayload::Sql(sql) => Bson::String(sql.clone()),
                    CommandPayload::Document(command) => encode_command_binary(command)?,
                };
                message.insert("command", command);
            }
        }
        Ok(message)
    }
}

fn required_str(message: &Document, field: &str) -> Result<String, ProtocolError> {
    message
        .get_str(field)
        .map(str::to_string)
        .map_err(|_| ProtocolError::InvalidCommand)
}

/// A request as the relay sees it after decoding a frame.
///
/// The token and the action name are read eagerly so the dispatcher can
/// answer gating failures (unknown action, no connection) before reporting
/// field validation errors.
#[derive(Debug, Clone)]
pub struct Request {
    pub token: String,
    pub kind: Option<ActionKind>,
    pub action: Result<Action, ProtocolError>,
}

impl Request {
    pub fn from_document(message: &Document) -> Result<Self, ProtocolError> {
        let token = message
            .get_str("token")
            .map_err(|_| ProtocolError::MissingToken)?
            .to_string();
        let name = message.get_str("action").unwrap_or_default();
        let kind = ActionKind::from_name(name);
        let action = match kind {
            Some(kind) => Action::parse(kind, message),
            None => Err(ProtocolError::UnknownAction(name.to_string())),
        };
        Ok(Self { token, kind, action })
    }
}
