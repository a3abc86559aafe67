//! Plugin option parsing and validation
//!
//! Options arrive as raw JSON from the application's config:
//!
//! ```json
//! [
//!   { "settings": "redis://localhost:6379/0", "decorate": "cache" },
//!   { "settings": { "host": "sessions.internal", "db": 1 }, "decorate": "sessions" }
//! ]
//! ```
//!
//! `settings` is a `redis://` URL, a structured settings object, or absent/null
//! for the default target. `decorate` is `true`, a non-empty name, or absent.
//! Mixing decorate kinds across entries is rejected.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde_json::{Map, Value};

use crate::error::{FieldError, RedisPluginError};
use crate::target::{ConnectionTarget, StructuredSettings};

const SETTINGS_KEY: &str = "settings";
const DECORATE_KEY: &str = "decorate";

/// Where a connection's settings came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSettings {
    Default,
    Url(String),
    Structured(StructuredSettings),
}

/// Decoration policy of one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoration {
    /// `decorate: true`: the whole bundle under the fixed global name
    Global,
    /// `decorate: "<name>"`: this connection's bundle under `name`
    Named(String),
    /// No `decorate`: only the plugin's exposed state
    ExposeOnly,
}

impl Decoration {
    pub fn kind(&self) -> DecorationKind {
        match self {
            Decoration::Global => DecorationKind::Global,
            Decoration::Named(_) => DecorationKind::Named,
            Decoration::ExposeOnly => DecorationKind::ExposeOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecorationKind {
    Global,
    Named,
    ExposeOnly,
}

impl fmt::Display for DecorationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecorationKind::Global => write!(f, "boolean"),
            DecorationKind::Named => write!(f, "string"),
            DecorationKind::ExposeOnly => write!(f, "absent"),
        }
    }
}

/// One validated connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub settings: ConnectionSettings,
    pub decorate: Decoration,
    /// Target resolved from `settings`
    pub target: ConnectionTarget,
}

impl ConnectionOptions {
    pub fn new(
        settings: ConnectionSettings,
        decorate: Decoration,
    ) -> Result<Self, RedisPluginError> {
        let target = match &settings {
            ConnectionSettings::Default => ConnectionTarget::default(),
            ConnectionSettings::Url(url) => ConnectionTarget::parse_url(url).map_err(|e| {
                RedisPluginError::Validation {
                    fields: vec![FieldError::new(SETTINGS_KEY, e.to_string())],
                }
            })?,
            ConnectionSettings::Structured(structured) => {
                ConnectionTarget::from_settings(structured)
            }
        };

        Ok(Self {
            settings,
            decorate,
            target,
        })
    }
}

/// Validate raw plugin options into a non-empty list of connection configurations
///
/// A bare object is treated as a one-element list and `null` as a single
/// default entry. Every offending field is reported, not just the first.
pub fn validate(raw: &Value) -> Result<Vec<ConnectionOptions>, RedisPluginError> {
    let default_entry = Value::Object(Map::new());
    let entries: Vec<&Value> = match raw {
        Value::Null => vec![&default_entry],
        Value::Object(_) => vec![raw],
        Value::Array(items) if items.is_empty() => {
            return Err(RedisPluginError::Validation {
                fields: vec![FieldError::new("", "must contain at least 1 item")],
            });
        }
        Value::Array(items) => items.iter().collect(),
        _ => {
            return Err(RedisPluginError::Validation {
                fields: vec![FieldError::new("", "must be an object or an array of objects")],
            });
        }
    };

    let mut fields = Vec::new();
    let mut configs = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        if let Some(config) = validate_entry(index, entry, &mut fields) {
            configs.push((index, config));
        }
    }

    check_unique_names(&configs, &mut fields);

    if !fields.is_empty() {
        return Err(RedisPluginError::Validation { fields });
    }

    Ok(configs.into_iter().map(|(_, config)| config).collect())
}

/// The single decoration kind shared by every configuration
///
/// Runs before any connection is opened.
pub fn check_decoration_consistency(
    configs: &[ConnectionOptions],
) -> Result<DecorationKind, RedisPluginError> {
    let kinds: BTreeSet<DecorationKind> = configs.iter().map(|c| c.decorate.kind()).collect();

    let mut iter = kinds.iter();
    match (iter.next(), iter.next()) {
        (Some(kind), None) => Ok(*kind),
        (None, _) => Err(RedisPluginError::Validation {
            fields: vec![FieldError::new("", "must contain at least 1 item")],
        }),
        _ => Err(RedisPluginError::Consistency {
            kinds: kinds.into_iter().collect(),
        }),
    }
}

fn validate_entry(
    index: usize,
    entry: &Value,
    fields: &mut Vec<FieldError>,
) -> Option<ConnectionOptions> {
    let path = |key: &str| format!("[{}].{}", index, key);

    let Some(object) = entry.as_object() else {
        fields.push(FieldError::new(format!("[{}]", index), "must be an object"));
        return None;
    };

    let mut valid = true;

    for key in object.keys() {
        if key != SETTINGS_KEY && key != DECORATE_KEY {
            fields.push(FieldError::new(path(key), "is not allowed"));
            valid = false;
        }
    }

    let settings = match object.get(SETTINGS_KEY) {
        None | Some(Value::Null) => Some(ConnectionSettings::Default),
        Some(Value::String(url)) => Some(ConnectionSettings::Url(url.clone())),
        Some(value @ Value::Object(_)) => {
            match serde_json::from_value::<StructuredSettings>(value.clone()) {
                Ok(structured) => Some(ConnectionSettings::Structured(structured)),
                Err(e) => {
                    fields.push(FieldError::new(path(SETTINGS_KEY), e.to_string()));
                    None
                }
            }
        }
        Some(_) => {
            fields.push(FieldError::new(
                path(SETTINGS_KEY),
                "must be a redis URL, a settings object or null",
            ));
            None
        }
    };

    let decorate = match object.get(DECORATE_KEY) {
        None => Some(Decoration::ExposeOnly),
        Some(Value::Bool(true)) => Some(Decoration::Global),
        Some(Value::String(name)) if !name.is_empty() => Some(Decoration::Named(name.clone())),
        Some(Value::String(_)) => {
            fields.push(FieldError::new(path(DECORATE_KEY), "must not be empty"));
            None
        }
        Some(_) => {
            fields.push(FieldError::new(
                path(DECORATE_KEY),
                "must be true or a non-empty string",
            ));
            None
        }
    };

    let (Some(settings), Some(decorate)) = (settings, decorate) else {
        return None;
    };

    match ConnectionOptions::new(settings, decorate) {
        Ok(config) if valid => Some(config),
        Ok(_) => None,
        Err(err) => {
            fields.extend(err.fields().iter().map(|f| FieldError::new(path(&f.path), &f.message)));
            None
        }
    }
}

fn check_unique_names(configs: &[(usize, ConnectionOptions)], fields: &mut Vec<FieldError>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (index, config) in configs {
        if let Decoration::Named(name) = &config.decorate {
            if let Some(first) = seen.insert(name.as_str(), *index) {
                fields.push(FieldError::new(
                    format!("[{}].{}", index, DECORATE_KEY),
                    format!("duplicates the name '{}' of entry [{}]", name, first),
                ));
            }
        }
    }
}
