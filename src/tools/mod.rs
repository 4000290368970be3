pub mod expenses;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::AppError;

/// MCP tool result with a single text block.
pub fn text_content(text: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": text.into() }],
        "isError": false,
    })
}

pub(crate) fn parse_arguments<T: DeserializeOwned>(arguments: &Value) -> Result<T, AppError> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments)
        .map_err(|e| AppError::bad_request("INVALID_ARGUMENTS", e.to_string()))
}
