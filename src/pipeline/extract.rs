use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::AutomlError;
use crate::llm::CallSite;

/// Extract the first well-formed JSON object from free text.
///
/// Surrounding prose and code fences are ignored. Candidate objects are found
/// by brace counting that skips braces inside string literals; the first one
/// that parses wins.
pub fn extract_object(site: CallSite, input: &str) -> Result<Map<String, Value>, AutomlError> {
    let mut from = 0;
    while let Some(offset) = input[from..].find('{') {
        let start = from + offset;
        if let Some(end) = balanced_end(&input[start..]) {
            let candidate = &input[start..start + end];
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
                return Ok(map);
            }
        }
        from = start + 1;
    }
    Err(AutomlError::Payload {
        site: site.to_string(),
        detail: if input.trim().is_empty() {
            "empty response".to_string()
        } else {
            "no well-formed JSON object in response".to_string()
        },
    })
}

/// Extract and deserialize into `T`. A well-formed object with the wrong
/// shape is a payload error too.
pub fn extract<T: DeserializeOwned>(site: CallSite, input: &str) -> Result<T, AutomlError> {
    let map = extract_object(site, input)?;
    serde_json::from_value(Value::Object(map)).map_err(|e| AutomlError::Payload {
        site: site.to_string(),
        detail: format!("unexpected payload shape: {}", e),
    })
}

/// Field deserializer that reads an explicit `null` as the default value.
/// Pair with `#[serde(default)]` so an absent field defaults too.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Byte length of the brace-balanced prefix starting at `{`.
fn balanced_end(input: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in input.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
