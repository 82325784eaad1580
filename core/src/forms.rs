//! Join-form schema and answers.
//!
//! The schema is supplied by the form-schema collaborator. The engine's only
//! contract is that every `required` field carries a non-empty answer;
//! type-specific formatting is the collaborator's concern.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input type of a form field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single-line text
    Text,
    /// Multi-line text
    Textarea,
    /// Numeric input
    Number,
    /// Checkbox
    Checkbox,
    /// One option out of `options`
    Select,
    /// Any subset of `options`
    MultiSelect,
}

/// One question of a join form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Stable key answers are stored under
    pub id: String,
    /// Question shown to the user
    pub label: String,
    /// Whether an answer is mandatory
    pub required: bool,
    /// Input type
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Choices for select inputs
    #[serde(default)]
    pub options: Vec<String>,
}

/// A typed answer or attribute value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Free text
    Text(String),
    /// Number
    Number(f64),
    /// Yes/no
    Boolean(bool),
    /// Selected options
    Choices(Vec<String>),
}

impl FieldValue {
    /// Blank text and empty selections do not count as answers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Choices(choices) => choices.iter().all(|c| c.trim().is_empty()),
            Self::Number(n) => n.is_nan(),
            Self::Boolean(_) => false,
        }
    }
}

/// Answers keyed by field id
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormAnswers(BTreeMap<String, FieldValue>);

impl FormAnswers {
    /// Empty answer set
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds an answer, builder style
    #[must_use]
    pub fn with(mut self, field_id: impl Into<String>, value: FieldValue) -> Self {
        self.0.insert(field_id.into(), value);
        self
    }

    /// Answer for a field
    #[must_use]
    pub fn get(&self, field_id: &str) -> Option<&FieldValue> {
        self.0.get(field_id)
    }

    /// Number of answers
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no answers were given
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for FormAnswers {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-participation attribute overrides, stored verbatim.
pub type AttributeOverrides = BTreeMap<String, FieldValue>;

/// Fails with `MissingFormAnswers` listing the labels of every required field
/// without a non-empty answer.
///
/// # Errors
///
/// Returns [`EngineError::MissingFormAnswers`] when at least one required
/// field is unanswered.
pub fn validate_required(fields: &[FormField], answers: Option<&FormAnswers>) -> Result<()> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|field| field.required)
        .filter(|field| {
            answers
                .and_then(|a| a.get(&field.id))
                .is_none_or(FieldValue::is_empty)
        })
        .map(|field| field.label.clone())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::MissingFormAnswers { fields: missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str, required: bool) -> FormField {
        FormField {
            id: id.to_string(),
            label: format!("Label {id}"),
            required,
            kind: FieldKind::Text,
            options: Vec::new(),
        }
    }

    #[test]
    fn test_no_schema_accepts_anything() {
        assert!(validate_required(&[], None).is_ok());
    }

    #[test]
    fn test_optional_fields_may_be_missing() {
        assert!(validate_required(&[field("notes", false)], None).is_ok());
    }

    #[test]
    fn test_required_field_missing() {
        let fields = [field("size", true), field("notes", false)];
        let err = validate_required(&fields, Some(&FormAnswers::new())).unwrap_err();
        assert_eq!(
            err,
            EngineError::MissingFormAnswers {
                fields: vec!["Label size".into()]
            }
        );
    }

    #[test]
    fn test_blank_answers_count_as_missing() {
        let fields = [field("size", true), field("tags", true)];
        let answers = FormAnswers::new()
            .with("size", FieldValue::Text("   ".into()))
            .with("tags", FieldValue::Choices(vec![]));
        let err = validate_required(&fields, Some(&answers)).unwrap_err();
        assert!(matches!(err, EngineError::MissingFormAnswers { fields } if fields.len() == 2));
    }

    #[test]
    fn test_all_required_answered() {
        let fields = [field("size", true), field("agree", true)];
        let answers = FormAnswers::new()
            .with("size", FieldValue::Text("M".into()))
            .with("agree", FieldValue::Boolean(false));
        assert!(validate_required(&fields, Some(&answers)).is_ok());
    }

    #[test]
    fn test_answers_serialize_as_tagged_map() {
        let answers = FormAnswers::new().with("size", FieldValue::Text("L".into()));
        let json = serde_json::to_value(&answers).unwrap_or_default();
        assert_eq!(json, serde_json::json!({"size": {"type": "text", "value": "L"}}));
    }
}
