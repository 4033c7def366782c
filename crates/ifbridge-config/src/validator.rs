use jsonschema::Validator;
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

/// JSON Schema (2020-12) for device configuration documents.
pub const DEVICE_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "$id": "https://ifbridge.dev/schemas/device.schema.json",
  "title": "ifbridge device configuration",
  "type": "object",
  "required": ["name"],
  "properties": {
    "name": { "type": "string", "minLength": 1, "maxLength": 128 },
    "timeouts": {
      "type": "object",
      "properties": {
        "identifyMs": { "type": "integer", "minimum": 1 },
        "configureMs": { "type": "integer", "minimum": 1 },
        "pingMs": { "type": "integer", "minimum": 1 }
      }
    },
    "system": {
      "type": "array",
      "items": { "$ref": "#/$defs/directive" }
    },
    "interfaces": {
      "type": "array",
      "maxItems": 255,
      "items": { "$ref": "#/$defs/interface" }
    }
  },
  "$defs": {
    "byte": { "type": "integer", "minimum": 0, "maximum": 255 },
    "word": { "type": "integer", "minimum": 0, "maximum": 4294967295 },
    "interface": {
      "type": "object",
      "required": ["name", "kind"],
      "properties": {
        "name": { "type": "string", "minLength": 1, "maxLength": 64 },
        "kind": { "enum": ["gpio", "uart", "spi", "custom"] },
        "type": { "$ref": "#/$defs/byte" },
        "unit": { "$ref": "#/$defs/byte" },
        "parity": { "enum": ["even", "odd"] },
        "checksum": { "type": "boolean" },
        "sequence": {
          "type": "array",
          "items": { "$ref": "#/$defs/directive" }
        }
      },
      "if": { "properties": { "kind": { "const": "custom" } } },
      "then": { "required": ["type"] }
    },
    "directive": {
      "type": "object",
      "required": ["command"],
      "properties": {
        "command": { "enum": ["enable", "config", "write", "registerInt"] },
        "unit": { "$ref": "#/$defs/byte" },
        "mask": { "$ref": "#/$defs/word" },
        "value": { "$ref": "#/$defs/word" }
      },
      "if": { "properties": { "command": { "const": "registerInt" } } },
      "then": {
        "required": ["mask"],
        "properties": {
          "edge": { "enum": ["rising", "falling", "both"] },
          "debounceMs": { "$ref": "#/$defs/word" }
        }
      }
    }
  }
}"##;

/// Compiled device-configuration schema.
pub struct DeviceSchema {
    validator: Validator,
}

impl DeviceSchema {
    /// Compile the embedded schema.
    ///
    /// In strict mode the device, timeouts and interface objects reject
    /// properties the schema does not name. Directives always accept extra
    /// fields because `config`/`write` settings are interface-specific.
    pub fn compile(strict_mode: bool) -> Result<Self> {
        let mut schema: Value = serde_json::from_str(DEVICE_SCHEMA)?;
        if strict_mode {
            apply_strict_mode(&mut schema);
        }

        let validator = jsonschema::validator_for(&schema)
            .map_err(|err| ConfigError::CompileFailed(err.to_string()))?;
        Ok(Self { validator })
    }

    /// Validate a parsed document, reporting up to four violations.
    pub fn validate(&self, document: &Value) -> Result<()> {
        let mut errors = self.validator.iter_errors(document);
        if let Some(first) = errors.next() {
            let mut message = first.to_string();
            for err in errors.take(3) {
                message.push_str("; ");
                message.push_str(&err.to_string());
            }
            return Err(ConfigError::ValidationFailed { message });
        }

        Ok(())
    }

    /// True if the document satisfies the schema.
    pub fn is_valid(&self, document: &Value) -> bool {
        self.validator.is_valid(document)
    }
}

fn apply_strict_mode(schema: &mut Value) {
    let Value::Object(root) = schema else {
        return;
    };
    close_object(root);

    if let Some(Value::Object(properties)) = root.get_mut("properties") {
        if let Some(Value::Object(timeouts)) = properties.get_mut("timeouts") {
            close_object(timeouts);
        }
    }
    if let Some(Value::Object(defs)) = root.get_mut("$defs") {
        if let Some(Value::Object(interface)) = defs.get_mut("interface") {
            close_object(interface);
        }
    }
}

fn close_object(map: &mut Map<String, Value>) {
    if !map.contains_key("additionalProperties") {
        map.insert("additionalProperties".to_string(), Value::Bool(false));
    }
}
