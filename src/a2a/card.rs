//! Agent card negotiation
//!
//! Peers publish capability documents in several historical shapes. Decoding
//! always succeeds for well-formed JSON: the `capabilities` value is classified
//! into one [`CapabilityShape`], canonical data goes into [`Capabilities`], and
//! legacy encodings are preserved under `metadata.legacyCapabilities`.

use crate::error::{Result, ShakerError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Metadata key holding legacy capability pairs
pub const LEGACY_CAPABILITIES_KEY: &str = "legacyCapabilities";

/// Canonical capability block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a2a_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_message_parts: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub supports_push_notifications: bool,
}

impl Capabilities {
    pub fn is_empty(&self) -> bool {
        self == &Capabilities::default()
    }
}

/// Legacy `{type, description}` capability pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCapability {
    #[serde(rename = "type")]
    pub capability_type: String,
    #[serde(default)]
    pub description: String,
}

impl LegacyCapability {
    pub fn new(capability_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            capability_type: capability_type.into(),
            description: description.into(),
        }
    }
}

/// Classification of a raw `capabilities` value
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityShape {
    /// Current schema, or nothing at all
    Canonical(Capabilities),
    /// `[{type, description}, ...]`
    LegacyArray(Vec<LegacyCapability>),
    /// `{name: value, ...}` with values coerced to strings
    LegacyMap(Vec<LegacyCapability>),
    /// Anything else; treated as empty
    Unparseable(Value),
}

impl CapabilityShape {
    /// Classify a raw value, trying each shape in a fixed order
    pub fn classify(raw: Option<Value>) -> Self {
        let value = match raw {
            None | Some(Value::Null) => return CapabilityShape::Canonical(Capabilities::default()),
            Some(value) => value,
        };

        if let Value::Object(map) = &value {
            if map.is_empty() {
                return CapabilityShape::Canonical(Capabilities::default());
            }
            if map.contains_key("a2aVersion") || map.contains_key("mcpVersion") {
                if let Ok(canonical) = serde_json::from_value::<Capabilities>(value.clone()) {
                    return CapabilityShape::Canonical(canonical);
                }
            }
        }

        if value.is_array() {
            if let Ok(pairs) = serde_json::from_value::<Vec<LegacyCapability>>(value.clone()) {
                return CapabilityShape::LegacyArray(pairs);
            }
        }

        if let Value::Object(map) = &value {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let pairs = sorted
                .into_iter()
                .map(|(key, value)| LegacyCapability::new(key.clone(), display_string(value)))
                .collect();
            return CapabilityShape::LegacyMap(pairs);
        }

        CapabilityShape::Unparseable(value)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CapabilityShape::Canonical(_) => "canonical",
            CapabilityShape::LegacyArray(_) => "legacy_array",
            CapabilityShape::LegacyMap(_) => "legacy_map",
            CapabilityShape::Unparseable(_) => "unparseable",
        }
    }
}

fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub support_contact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthScheme {
    pub scheme: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Legacy endpoint listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
}

/// Normalized agent card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireAgentCard")]
pub struct AgentCard {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_readable_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    pub capabilities: Capabilities,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub auth_schemes: Vec<AuthScheme>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<Skill>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    // Legacy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// Unrecognized top-level keys, kept verbatim
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

/// Card as it arrives on the wire, before capability classification
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAgentCard {
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(default)]
    human_readable_id: Option<String>,
    #[serde(default)]
    agent_version: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    provider: Option<Provider>,
    #[serde(default)]
    capabilities: Option<Value>,
    #[serde(default)]
    auth_schemes: Option<Vec<AuthScheme>>,
    #[serde(default)]
    skills: Option<Vec<Skill>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    privacy_policy_url: Option<String>,
    #[serde(default)]
    terms_of_service_url: Option<String>,
    #[serde(default)]
    icon_url: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    endpoints: Option<Vec<Endpoint>>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
    #[serde(flatten)]
    extensions: Map<String, Value>,
}

impl From<WireAgentCard> for AgentCard {
    fn from(wire: WireAgentCard) -> Self {
        let shape = CapabilityShape::classify(wire.capabilities);
        tracing::debug!("Agent card capabilities classified as {}", shape.name());

        let mut metadata = wire.metadata.unwrap_or_default();
        let capabilities = match shape {
            CapabilityShape::Canonical(capabilities) => capabilities,
            CapabilityShape::LegacyArray(pairs) | CapabilityShape::LegacyMap(pairs) => {
                let pairs = pairs
                    .into_iter()
                    .map(|pair| {
                        serde_json::json!({
                            "type": pair.capability_type,
                            "description": pair.description,
                        })
                    })
                    .collect();
                metadata.insert(LEGACY_CAPABILITIES_KEY.to_string(), Value::Array(pairs));
                Capabilities::default()
            }
            CapabilityShape::Unparseable(raw) => {
                tracing::warn!("Ignoring unparseable agent card capabilities: {}", raw);
                Capabilities::default()
            }
        };

        Self {
            schema_version: wire.schema_version,
            human_readable_id: wire.human_readable_id,
            agent_version: wire.agent_version,
            name: wire.name,
            description: wire.description,
            url: wire.url,
            provider: wire.provider,
            capabilities,
            auth_schemes: wire.auth_schemes.unwrap_or_default(),
            skills: wire.skills.unwrap_or_default(),
            tags: wire.tags.unwrap_or_default(),
            privacy_policy_url: wire.privacy_policy_url,
            terms_of_service_url: wire.terms_of_service_url,
            icon_url: wire.icon_url,
            version: wire.version,
            endpoints: wire.endpoints.unwrap_or_default(),
            metadata,
            extensions: wire.extensions,
        }
    }
}

/// A canonical-required field absent from a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingField(pub &'static str);

impl std::fmt::Display for MissingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent card missing required field: {}", self.0)
    }
}

impl AgentCard {
    /// Decode any well-formed card JSON
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ShakerError::InvalidAgentCard(e.to_string()))
    }

    /// Canonical JSON
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Report each canonical-required field that is absent
    pub fn validate(&self) -> Vec<MissingField> {
        let present = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.is_empty());

        let checks = [
            ("schemaVersion", present(&self.schema_version)),
            ("humanReadableId", present(&self.human_readable_id)),
            ("agentVersion", present(&self.agent_version)),
            ("name", present(&self.name)),
            ("description", present(&self.description)),
            ("url", present(&self.url)),
            ("provider", self.provider.is_some()),
            ("capabilities", !self.capabilities.is_empty()),
            ("authSchemes", !self.auth_schemes.is_empty()),
        ];

        checks
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| MissingField(name))
            .collect()
    }

    /// Legacy capability pairs preserved in metadata
    pub fn legacy_capabilities(&self) -> Vec<LegacyCapability> {
        self.metadata
            .get(LEGACY_CAPABILITIES_KEY)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Whether the card advertises a capability, canonical or legacy
    pub fn has_capability(&self, capability_type: &str) -> bool {
        self.capabilities
            .supported_message_parts
            .iter()
            .any(|part| part == capability_type)
            || self
                .legacy_capabilities()
                .iter()
                .any(|pair| pair.capability_type == capability_type)
    }

    /// Find a legacy endpoint by path and method (method is case-insensitive)
    pub fn find_endpoint(&self, path: &str, method: &str) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.path == path && endpoint.method.eq_ignore_ascii_case(method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> AgentCard {
        AgentCard::decode(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_legacy_map_coerces_values() {
        let card = decode(json!({"capabilities": {"streaming": true, "task": "desc"}}));

        assert!(card.capabilities.is_empty());
        assert_eq!(
            card.legacy_capabilities(),
            vec![
                LegacyCapability::new("streaming", "true"),
                LegacyCapability::new("task", "desc"),
            ]
        );
    }

    #[test]
    fn test_legacy_array_survives_reencode() {
        let card = decode(json!({
            "name": "old agent",
            "version": "0.9",
            "capabilities": [
                {"type": "task", "description": "Runs tasks"},
                {"type": "streaming", "description": "SSE updates"}
            ]
        }));

        let encoded: Value = serde_json::from_slice(&card.encode().unwrap()).unwrap();
        assert_eq!(encoded["capabilities"], json!({}));
        assert_eq!(
            encoded["metadata"]["legacyCapabilities"],
            json!([
                {"type": "task", "description": "Runs tasks"},
                {"type": "streaming", "description": "SSE updates"}
            ])
        );

        let again = AgentCard::decode(&card.encode().unwrap()).unwrap();
        assert_eq!(again, card);
    }

    #[test]
    fn test_canonical_capabilities() {
        let card = decode(json!({
            "capabilities": {
                "a2aVersion": "1.0",
                "supportedMessageParts": ["text", "data"],
                "supportsPushNotifications": true
            }
        }));

        assert_eq!(card.capabilities.a2a_version.as_deref(), Some("1.0"));
        assert!(card.capabilities.supports_push_notifications);
        assert!(card.metadata.get(LEGACY_CAPABILITIES_KEY).is_none());
        assert!(card.has_capability("data"));
        assert!(!card.has_capability("file"));
    }

    #[test]
    fn test_classification_order() {
        assert!(matches!(
            CapabilityShape::classify(None),
            CapabilityShape::Canonical(_)
        ));
        assert!(matches!(
            CapabilityShape::classify(Some(json!({}))),
            CapabilityShape::Canonical(_)
        ));
        // A version key with a wrongly typed value is read as a legacy map
        assert!(matches!(
            CapabilityShape::classify(Some(json!({"a2aVersion": 1}))),
            CapabilityShape::LegacyMap(_)
        ));
        assert!(matches!(
            CapabilityShape::classify(Some(json!([1, 2]))),
            CapabilityShape::Unparseable(_)
        ));
        assert!(matches!(
            CapabilityShape::classify(Some(json!("streaming"))),
            CapabilityShape::Unparseable(_)
        ));
    }

    #[test]
    fn test_unparseable_capabilities_are_non_fatal() {
        let card = decode(json!({"name": "odd", "capabilities": 42}));
        assert!(card.capabilities.is_empty());
        assert!(card.legacy_capabilities().is_empty());
        assert_eq!(card.name.as_deref(), Some("odd"));
    }

    #[test]
    fn test_existing_metadata_and_extensions_preserved() {
        let card = decode(json!({
            "capabilities": {"artifacts": {"max": 3}},
            "metadata": {"contact": "ops@example.com"},
            "x-region": "eu-west"
        }));

        assert_eq!(card.metadata["contact"], "ops@example.com");
        assert_eq!(
            card.legacy_capabilities(),
            vec![LegacyCapability::new("artifacts", r#"{"max":3}"#)]
        );
        assert_eq!(card.extensions["x-region"], "eu-west");

        let encoded: Value = serde_json::from_slice(&card.encode().unwrap()).unwrap();
        assert_eq!(encoded["x-region"], "eu-west");
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let legacy = decode(json!({"name": "old", "capabilities": [{"type": "task"}]}));
        let missing: Vec<&str> = legacy.validate().into_iter().map(|m| m.0).collect();
        assert_eq!(
            missing,
            vec![
                "schemaVersion",
                "humanReadableId",
                "agentVersion",
                "description",
                "url",
                "provider",
                "capabilities",
                "authSchemes"
            ]
        );

        let complete = decode(json!({
            "schemaVersion": "1.0",
            "humanReadableId": "acme/agent",
            "agentVersion": "1.2.0",
            "name": "Agent",
            "description": "Does things",
            "url": "https://agent.example/a2a/v1",
            "provider": {"name": "acme"},
            "capabilities": {"a2aVersion": "1.0"},
            "authSchemes": [{"scheme": "none"}]
        }));
        assert!(complete.validate().is_empty());
    }

    #[test]
    fn test_find_endpoint() {
        let card = decode(json!({
            "endpoints": [
                {"path": "/a2a/v1/message", "method": "POST", "description": "send", "protocol": "A2A"}
            ]
        }));

        assert!(card.find_endpoint("/a2a/v1/message", "post").is_some());
        assert!(card.find_endpoint("/a2a/v1/message", "GET").is_none());
    }

    #[test]
    fn test_malformed_json_is_invalid_card() {
        let err = AgentCard::decode(b"{ nope").unwrap_err();
        assert!(matches!(err, ShakerError::InvalidAgentCard(_)));
    }
}
