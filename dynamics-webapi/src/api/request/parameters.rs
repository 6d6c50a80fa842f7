//! Parameter aliases for Web API function calls
//!
//! `WhoAmI()` takes nothing; `RetrieveTotalRecordCount(EntityNames=@p1)?@p1=[...]`
//! passes values through aliases so they do not need escaping inside the path.

use serde_json::{Map, Value};

use crate::api::utility::{extract_uuid, is_uuid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionParameters {
    /// `(name=@p1,other=@p2)` appended to the function name
    pub signature: String,
    /// `@p1=value` pairs, already encoded, for `query_params`
    pub aliases: Vec<String>,
}

/// Build the alias signature and alias values for a function call
///
/// Strings are single-quoted unless they are GUIDs or enum literals
/// (`Microsoft.Dynamics.CRM.*`); objects and arrays are JSON-encoded.
/// Null parameters are skipped.
pub fn build_function_parameters(parameters: Option<&Map<String, Value>>) -> FunctionParameters {
    let Some(parameters) = parameters else {
        return FunctionParameters {
            signature: "()".to_string(),
            aliases: Vec::new(),
        };
    };

    let mut names = Vec::new();
    let mut aliases = Vec::new();

    for (index, (name, value)) in parameters.iter().enumerate() {
        let literal = match value {
            Value::Null => continue,
            Value::String(s) if is_uuid(s) => extract_uuid(s).unwrap_or_else(|| s.clone()),
            Value::String(s) if s.starts_with("Microsoft.Dynamics.CRM") => s.clone(),
            Value::String(s) => format!("'{}'", s),
            Value::Array(_) | Value::Object(_) => value.to_string(),
            other => other.to_string(),
        };

        let alias = format!("@p{}", index + 1);
        names.push(format!("{}={}", name, alias));
        aliases.push(format!("{}={}", alias, urlencoding::encode(&literal)));
    }

    FunctionParameters {
        signature: format!("({})", names.join(",")),
        aliases,
    }
}
