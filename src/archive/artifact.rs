//! Document classification and artifact resolution
//!
//! A data file holds one of three shapes:
//! - a bundle object with `rules`/`laws`, `guard_rules`/`sentinel_rules`,
//!   `references` and an optional `version`
//! - a bare list of artifact objects
//! - a single artifact object

use crate::model::{GuardRule, Reference, Rule};
use serde::Deserialize;
use serde_json::{Map, Value};

/// A single decoded governance artifact
#[derive(Debug, Clone)]
pub enum Artifact {
    Rule(Rule),
    GuardRule(GuardRule),
    Reference(Reference),
}

impl Artifact {
    pub fn id(&self) -> &str {
        match self {
            Artifact::Rule(r) => &r.id,
            Artifact::GuardRule(g) => &g.id,
            Artifact::Reference(r) => &r.id,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Artifact::Rule(r) => r.validate(),
            Artifact::GuardRule(g) => g.validate(),
            Artifact::Reference(r) => r.validate(),
        }
    }
}

/// On-disk bundle layout
#[derive(Debug, Default, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, alias = "laws")]
    pub rules: Vec<Rule>,
    #[serde(default, alias = "sentinel_rules")]
    pub guard_rules: Vec<GuardRule>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

const BUNDLE_KEYS: [&str; 6] = [
    "version",
    "rules",
    "laws",
    "guard_rules",
    "sentinel_rules",
    "references",
];

/// Everything one document contributed
#[derive(Debug, Default)]
pub struct Document {
    pub version: Option<String>,
    pub artifacts: Vec<Artifact>,
}

/// Classify a parsed document and decode every artifact in it
pub fn decode_document(value: Value) -> Result<Document, String> {
    match value {
        Value::Object(map) if is_bundle(&map) => decode_bundle(map),
        Value::Object(map) => Ok(Document {
            version: None,
            artifacts: vec![resolve(map)?],
        }),
        Value::Array(items) => {
            let mut artifacts = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(map) => {
                        artifacts.push(resolve(map).map_err(|e| format!("item {}: {}", index, e))?)
                    }
                    other => {
                        return Err(format!(
                            "item {}: expected an object, found {}",
                            index,
                            type_name(&other)
                        ))
                    }
                }
            }
            Ok(Document {
                version: None,
                artifacts,
            })
        }
        Value::Null => Ok(Document::default()),
        other => Err(format!(
            "expected a bundle, a list or an object, found {}",
            type_name(&other)
        )),
    }
}

fn is_bundle(map: &Map<String, Value>) -> bool {
    BUNDLE_KEYS.iter().any(|key| map.contains_key(*key))
        && !map.contains_key("id")
}

fn decode_bundle(map: Map<String, Value>) -> Result<Document, String> {
    let bundle: Bundle =
        serde_json::from_value(Value::Object(map)).map_err(|e| format!("invalid bundle: {}", e))?;

    let mut artifacts = Vec::new();
    artifacts.extend(bundle.rules.into_iter().map(Artifact::Rule));
    artifacts.extend(bundle.guard_rules.into_iter().map(Artifact::GuardRule));
    artifacts.extend(bundle.references.into_iter().map(Artifact::Reference));
    for artifact in &artifacts {
        artifact.validate()?;
    }

    Ok(Document {
        version: bundle.version,
        artifacts,
    })
}

/// Resolve a free-standing object to exactly one artifact kind
///
/// `pattern` + `description` wins over `category` + `text`, which wins over
/// `id` + `text`. An object matching none of these is rejected.
pub fn resolve(map: Map<String, Value>) -> Result<Artifact, String> {
    let has = |key: &str| map.contains_key(key);

    let artifact = if has("pattern") && has("description") {
        serde_json::from_value(Value::Object(map))
            .map(Artifact::GuardRule)
            .map_err(|e| format!("invalid guard rule: {}", e))?
    } else if has("category") && has("text") {
        serde_json::from_value(Value::Object(map))
            .map(Artifact::Rule)
            .map_err(|e| format!("invalid rule: {}", e))?
    } else if has("id") && has("text") {
        serde_json::from_value(Value::Object(map))
            .map(Artifact::Reference)
            .map_err(|e| format!("invalid reference: {}", e))?
    } else {
        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        return Err(format!(
            "object does not match any artifact schema (keys: {})",
            keys.join(", ")
        ));
    };

    artifact.validate()?;
    Ok(artifact)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
