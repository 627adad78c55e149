//! JSON Schema validation of capability documents.
//!
//! The prober treats validation as a pure function behind
//! [`SchemaValidator`]; [`CapabilitySchema`] is the built-in implementation
//! compiled from [`capability_schema`].

use crate::error::{DiscoveryError, Result};
use jsonschema::{Draft, Validator};
use serde::Serialize;
use serde_json::{json, Value};

/// Outcome of validating one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }
}

/// Validates a parsed capability document.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &Value) -> Validation;
}

/// The capability-metadata schema (draft 2020-12).
///
/// `name` has no length constraint here; the scanner rejects empty and
/// unsafe names itself so they surface as a distinct failure.
pub fn capability_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["schemaVersion", "name", "version", "description"],
        "properties": {
            "schemaVersion": { "type": "string", "minLength": 1 },
            "name": { "type": "string" },
            "version": { "type": "string" },
            "description": { "type": "string" },
            "commands": {
                "type": "object",
                "additionalProperties": { "$ref": "#/$defs/command" }
            },
            "trust": { "$ref": "#/$defs/trust" }
        },
        "$defs": {
            "command": {
                "type": "object",
                "properties": {
                    "description": { "type": "string" },
                    "arguments": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["name"],
                            "properties": {
                                "name": { "type": "string" },
                                "description": { "type": "string" },
                                "required": { "type": "boolean" },
                                "type": { "type": "string" },
                                "variadic": { "type": "boolean" }
                            }
                        }
                    },
                    "options": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["name"],
                            "properties": {
                                "name": { "type": "string" },
                                "short": { "type": "string" },
                                "description": { "type": "string" },
                                "type": { "type": "string" },
                                "required": { "type": "boolean" }
                            }
                        }
                    },
                    "effects": {
                        "type": "object",
                        "properties": {
                            "destructive": { "type": "boolean" },
                            "reversible": { "type": "boolean" },
                            "idempotent": { "type": "boolean" },
                            "network": { "type": "boolean" },
                            "filesystem": { "enum": ["none", "read", "write", "read-write"] }
                        }
                    },
                    "commands": {
                        "type": "object",
                        "additionalProperties": { "$ref": "#/$defs/command" }
                    }
                }
            },
            "trust": {
                "type": "object",
                "properties": {
                    "source": { "type": "string" },
                    "verified": { "type": "boolean" },
                    "integrity": {
                        "type": "object",
                        "properties": {
                            "checksum": { "type": "string" },
                            "signature": {
                                "type": "object",
                                "required": ["type", "identity", "issuer"],
                                "properties": {
                                    "type": { "type": "string" },
                                    "identity": { "type": "string" },
                                    "issuer": { "type": "string" },
                                    "bundle": { "type": "string" }
                                }
                            }
                        }
                    },
                    "provenance": {
                        "type": "object",
                        "required": ["url", "format", "slsaLevel"],
                        "properties": {
                            "url": { "type": "string" },
                            "format": { "type": "string" },
                            "slsaLevel": { "type": "integer", "minimum": 0, "maximum": 4 },
                            "builder": { "type": "string" }
                        }
                    }
                }
            }
        }
    })
}

/// Compiled [`capability_schema`].
pub struct CapabilitySchema {
    validator: Validator,
}

impl CapabilitySchema {
    /// Compiles the built-in schema.
    pub fn new() -> Result<Self> {
        Self::from_schema(&capability_schema())
    }

    /// Compiles a caller-supplied schema.
    pub fn from_schema(schema: &Value) -> Result<Self> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .map_err(|e| DiscoveryError::Config(format!("capability schema: {e}")))?;
        Ok(Self { validator })
    }
}

impl SchemaValidator for CapabilitySchema {
    fn validate(&self, document: &Value) -> Validation {
        let errors: Vec<String> = self
            .validator
            .iter_errors(document)
            .map(|e| {
                let at = e.instance_path.to_string();
                if at.is_empty() {
                    e.to_string()
                } else {
                    format!("{at}: {e}")
                }
            })
            .collect();
        Validation {
            valid: errors.is_empty(),
            errors,
        }
    }
}
