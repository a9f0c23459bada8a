use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types usable as OpenAI structured output.
///
/// Blanket-implemented for any `JsonSchema + DeserializeOwned` type. The
/// generated schema is rewritten for strict mode: every object gets
/// `additionalProperties: false`, every property is listed in `required`
/// (nullable ones included) and `$ref`s are inlined.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn openai_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        close_objects(&mut value);
        inline_refs(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                let keys = match map.get("properties") {
                    Some(Value::Object(props)) => Some(
                        props
                            .keys()
                            .map(|k| Value::String(k.clone()))
                            .collect::<Vec<_>>(),
                    ),
                    _ => None,
                };
                if let Some(keys) = keys {
                    map.insert("required".to_string(), Value::Array(keys));
                }
            }

            for (_, v) in map.iter_mut() {
                close_objects(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = match value {
        Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_with(value, &defs);
    }
}

fn inline_refs_with(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(path)) = map.get("$ref").cloned() {
                if let Some(def) = path
                    .strip_prefix("#/definitions/")
                    .and_then(|name| definitions.get(name))
                {
                    *value = def.clone();
                    inline_refs_with(value, definitions);
                    return;
                }
            }

            // schemars wraps referenced enums as `allOf: [{$ref}]`.
            if let Some(Value::Array(all_of)) = map.get("allOf").cloned() {
                if let [single] = all_of.as_slice() {
                    *value = single.clone();
                    inline_refs_with(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_with(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs_with(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    #[allow(dead_code)]
    enum Level {
        Low,
        High,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Assessment {
        level: Level,
        confidence: f32,
        summary: Option<String>,
    }

    #[test]
    fn every_property_is_required() {
        let schema = Assessment::openai_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        assert!(required.contains(&"level"));
        assert!(required.contains(&"confidence"));
        assert!(required.contains(&"summary"));
        assert_eq!(schema["additionalProperties"], Value::Bool(false));
    }

    #[test]
    fn referenced_enum_is_inlined() {
        let schema = Assessment::openai_schema();
        let obj = schema.as_object().unwrap();

        assert!(!obj.contains_key("definitions"));
        assert!(!obj.contains_key("$schema"));

        let level = &schema["properties"]["level"];
        assert!(level.get("$ref").is_none());
        assert!(level.get("allOf").is_none());
        let rendered = level.to_string();
        assert!(rendered.contains("LOW") && rendered.contains("HIGH"));
    }
}
