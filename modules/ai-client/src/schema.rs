//! Strict JSON-schema preparation for structured output.
//!
//! Providers that enforce schemas require:
//! 1. `additionalProperties: false` on every object schema
//! 2. every property listed in `required`, nullable ones included
//! 3. fully inlined schemas (no `$ref`)
//!
//! `strict_schema` rewrites a `schemars`-generated schema in place to meet
//! all three, so classifier structs stay plain derive types.

use schemars::{schema_for as schemars_schema_for, JsonSchema};

/// Generate the strict schema for a `JsonSchema` type.
pub fn schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars_schema_for!(T);
    let value = serde_json::to_value(schema).unwrap_or_default();
    strict_schema(value)
}

/// Apply the strict-output rewrite to an arbitrary schema value.
pub fn strict_schema(mut value: serde_json::Value) -> serde_json::Value {
    close_objects(&mut value);
    inline_refs(&mut value);

    if let serde_json::Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$defs");
        map.remove("$schema");
    }

    value
}

fn close_objects(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );

                if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<serde_json::Value> = props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect();
                    map.insert("required".to_string(), serde_json::Value::Array(all_keys));
                }
            }

            for (_, v) in map.iter_mut() {
                close_objects(v);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                close_objects(item);
            }
        }
        _ => {}
    }
}

fn inline_refs(value: &mut serde_json::Value) {
    let definitions = if let serde_json::Value::Object(map) = value {
        map.get("definitions")
            .or_else(|| map.get("$defs"))
            .cloned()
    } else {
        None
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                let type_name = ref_path
                    .strip_prefix("#/definitions/")
                    .or_else(|| ref_path.strip_prefix("#/$defs/"));
                if let Some(type_name) = type_name {
                    if let Some(def) = definitions.get(type_name) {
                        *value = def.clone();
                        inline_refs_recursive(value, definitions);
                        return;
                    }
                }
            }

            // schemars wraps single refs in allOf; unwrap before recursing.
            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    *value = all_of.into_iter().next().unwrap();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}
