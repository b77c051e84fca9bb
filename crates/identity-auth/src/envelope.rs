//! Result envelope surfaced to UI-facing callers
//!
//! No transport error crosses into the application layer. Every identity
//! operation resolves to an `Outcome`: either success with optional data,
//! or failure with a flat list of human-readable messages.
//!
//! Identity servers report validation failures as problem documents:
//! `{"title": "...", "errors": {"Password": ["too short", "needs a digit"]}}`.
//! `flatten_problem` turns that into `["too short", "needs a digit"]`, and
//! falls back to `title` when there is no `errors` map.

use serde::{Deserialize, Serialize};

/// Success/failure envelope for identity operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            errors,
        }
    }
}

/// Problem document returned by the identity server on errors.
#[derive(Debug, Default, Deserialize)]
pub struct ApiProblem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub errors: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ApiProblem {
    /// Flatten into a list of messages: every entry of every field in
    /// `errors`, otherwise `title`, otherwise nothing.
    pub fn messages(&self) -> Vec<String> {
        if let Some(errors) = &self.errors {
            let mut messages = Vec::new();
            for value in errors.values() {
                match value {
                    serde_json::Value::Array(items) => {
                        messages.extend(items.iter().map(value_message));
                    }
                    other => messages.push(value_message(other)),
                }
            }
            return messages;
        }
        self.title.iter().cloned().collect()
    }
}

fn value_message(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse an error response body and flatten it. Bodies that are not a
/// problem document yield no messages.
pub fn flatten_problem(body: &str) -> Vec<String> {
    serde_json::from_str::<ApiProblem>(body)
        .map(|problem| problem.messages())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_field_errors() {
        let body = r#"{
            "title": "One or more validation errors occurred.",
            "errors": {
                "DuplicateUserName": ["Username 'a@example.com' is already taken."],
                "PasswordTooShort": ["Passwords must be at least 6 characters.", "Passwords must have a digit."]
            }
        }"#;
        assert_eq!(
            flatten_problem(body),
            vec![
                "Username 'a@example.com' is already taken.",
                "Passwords must be at least 6 characters.",
                "Passwords must have a digit.",
            ]
        );
    }

    #[test]
    fn keeps_server_field_order() {
        let body = r#"{"errors":{"Password":["Password too short"],"Email":["Email is invalid"]}}"#;
        assert_eq!(
            flatten_problem(body),
            vec!["Password too short", "Email is invalid"]
        );
    }

    #[test]
    fn falls_back_to_title() {
        let body = r#"{"title":"Unauthorized","status":401}"#;
        assert_eq!(flatten_problem(body), vec!["Unauthorized"]);
    }

    #[test]
    fn non_problem_body_yields_nothing() {
        assert!(flatten_problem("").is_empty());
        assert!(flatten_problem("<html>bad gateway</html>").is_empty());
        assert!(flatten_problem("{}").is_empty());
    }

    #[test]
    fn scalar_field_error_is_kept() {
        let body = r#"{"errors":{"code":"Invalid code"}}"#;
        assert_eq!(flatten_problem(body), vec!["Invalid code"]);
    }

    #[test]
    fn outcome_serializes_without_empty_fields() {
        let ok = serde_json::to_value(Outcome::ok(serde_json::json!({"email":"a@example.com"})))
            .unwrap();
        assert_eq!(
            ok,
            serde_json::json!({"success": true, "data": {"email": "a@example.com"}})
        );

        let failed = serde_json::to_value(Outcome::<()>::failed(vec!["nope".into()])).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"success": false, "errors": ["nope"]})
        );
    }
}
