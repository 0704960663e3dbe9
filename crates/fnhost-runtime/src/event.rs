//! Invocation input types.
//!
//! One [`Event`] and one [`Context`] are built per request by the HTTP
//! dispatcher and passed by value into the engine. Handlers see them as
//! plain JSON-shaped data: a Lua handler receives tables, an exec handler
//! receives them inside the stdin envelope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A query parameter value. A key appearing once stays scalar; repeated
/// keys become an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
  One(String),
  Many(Vec<String>),
}

impl QueryValue {
  /// Fold another occurrence of the same key into this value.
  pub fn push(&mut self, value: String) {
    match self {
      QueryValue::One(first) => {
        *self = QueryValue::Many(vec![std::mem::take(first), value]);
      }
      QueryValue::Many(values) => values.push(value),
    }
  }
}

/// Structured representation of one inbound HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
  pub method: String,
  pub path: String,
  #[serde(default)]
  pub query: HashMap<String, QueryValue>,
  #[serde(default)]
  pub headers: HashMap<String, String>,
  #[serde(default)]
  pub body: String,
}

/// Per-invocation metadata passed alongside the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
  /// The function being invoked. Serialized as `function`, matching what
  /// handlers index into.
  #[serde(rename = "function")]
  pub function_name: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn query_value_folds_repeats_into_a_list() {
    let mut value = QueryValue::One("a".to_string());
    value.push("b".to_string());
    value.push("c".to_string());
    assert_eq!(
      value,
      QueryValue::Many(vec!["a".to_string(), "b".to_string(), "c".to_string()])
    );
  }

  #[test]
  fn scalar_query_value_serializes_as_plain_string() {
    let mut query = HashMap::new();
    query.insert("name".to_string(), QueryValue::One("dev".to_string()));
    let json = serde_json::to_value(&query).unwrap();
    assert_eq!(json, serde_json::json!({"name": "dev"}));
  }

  #[test]
  fn context_serializes_function_key() {
    let ctx = Context {
      function_name: "hello".to_string(),
    };
    let json = serde_json::to_value(&ctx).unwrap();
    assert_eq!(json, serde_json::json!({"function": "hello"}));
  }
}
