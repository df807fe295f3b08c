//! Typed slash-command arguments parsed from an interaction's option list.

use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};
use crate::snowflake;

pub const SUB_COMMAND: u8 = 1;
pub const SUB_COMMAND_GROUP: u8 = 2;
pub const STRING: u8 = 3;
pub const INTEGER: u8 = 4;
pub const BOOLEAN: u8 = 5;
pub const USER: u8 = 6;
pub const CHANNEL: u8 = 7;
pub const ROLE: u8 = 8;
pub const MENTIONABLE: u8 = 9;
pub const NUMBER: u8 = 10;
pub const ATTACHMENT: u8 = 11;

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    User(u64),
    Channel(u64),
    Role(u64),
    Mentionable(u64),
    Number(f64),
    Attachment(u64),
    SubCommand(CommandArgs),
    SubCommandGroup(CommandArgs),
    /// Option type this bridge does not know about, kept untouched.
    Raw(Value),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<u64> {
        match self {
            OptionValue::User(id)
            | OptionValue::Channel(id)
            | OptionValue::Role(id)
            | OptionValue::Mentionable(id)
            | OptionValue::Attachment(id) => Some(*id),
            _ => None,
        }
    }
}

/// Arguments in the order Discord sent them, addressable by name or position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    entries: Vec<(String, OptionValue)>,
}

impl CommandArgs {
    pub fn parse(options: &[Value]) -> BridgeResult<Self> {
        let entries = options
            .iter()
            .map(parse_option)
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn from_strings<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), OptionValue::String(v.to_string())))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn positional(&self, index: usize) -> Option<&OptionValue> {
        self.entries.get(index).map(|(_, v)| v)
    }

    /// String argument by name, falling back to its position.
    pub fn string(&self, name: &str, index: usize) -> Option<&str> {
        self.get(name)
            .or_else(|| self.positional(index))
            .and_then(OptionValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

fn parse_option(option: &Value) -> BridgeResult<(String, OptionValue)> {
    let name = option
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Payload("option without a name".into()))?
        .to_string();
    let value = option.get("value").cloned().unwrap_or(Value::Null);
    let nested = || -> BridgeResult<CommandArgs> {
        let options = option
            .get("options")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        CommandArgs::parse(options)
    };
    let mismatch = |expected: &str| {
        BridgeError::Payload(format!(
            "option '{}' should hold {} but got {}",
            name, expected, value
        ))
    };

    let kind = option
        .get("type")
        .and_then(Value::as_u64)
        // Out-of-range types land on 0, which no option type uses, and stay raw.
        .map(|k| u8::try_from(k).unwrap_or(0))
        .unwrap_or_else(|| infer_kind(option, &value));

    let parsed = match kind {
        SUB_COMMAND => OptionValue::SubCommand(nested()?),
        SUB_COMMAND_GROUP => OptionValue::SubCommandGroup(nested()?),
        STRING => OptionValue::String(
            value.as_str().ok_or_else(|| mismatch("a string"))?.to_string(),
        ),
        INTEGER => OptionValue::Integer(
            value
                .as_i64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| mismatch("an integer"))?,
        ),
        BOOLEAN => OptionValue::Boolean(value.as_bool().ok_or_else(|| mismatch("a boolean"))?),
        NUMBER => OptionValue::Number(value.as_f64().ok_or_else(|| mismatch("a number"))?),
        USER | CHANNEL | ROLE | MENTIONABLE | ATTACHMENT => {
            let id = snowflake::from_value(&value).ok_or_else(|| mismatch("a snowflake"))?;
            match kind {
                USER => OptionValue::User(id),
                CHANNEL => OptionValue::Channel(id),
                ROLE => OptionValue::Role(id),
                MENTIONABLE => OptionValue::Mentionable(id),
                _ => OptionValue::Attachment(id),
            }
        }
        _ => OptionValue::Raw(value.clone()),
    };
    Ok((name, parsed))
}

fn infer_kind(option: &Value, value: &Value) -> u8 {
    match value {
        Value::String(_) => STRING,
        Value::Bool(_) => BOOLEAN,
        Value::Number(n) if n.is_i64() || n.is_u64() => INTEGER,
        Value::Number(_) => NUMBER,
        Value::Null if option.get("options").is_some() => SUB_COMMAND,
        _ => 0,
    }
}
