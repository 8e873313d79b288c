use serde_json::Value;

use crate::models::InitialNotes;

/// Minimal shape a stage's parsed output must have.
///
/// Only required keys and container types are checked; extra keys pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSchema {
    /// Object with the eight note categories, each an array of strings
    InitialNotes,
    /// Array of strings
    ExperientialStatements,
    /// Array of {theme_title, description, extracts, analytic_comments}
    PersonalThemes,
    /// Array of {theme_title, description, subthemes: [...]}
    GroupThemes,
}

impl StageSchema {
    /// Check a parsed value, returning a path-qualified reason on mismatch
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::InitialNotes => validate_initial_notes(value),
            Self::ExperientialStatements => expect_string_array(value, "$"),
            Self::PersonalThemes => expect_records(value, "$", validate_personal_theme),
            Self::GroupThemes => expect_records(value, "$", validate_group_theme),
        }
    }
}

fn validate_initial_notes(value: &Value) -> Result<(), String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("$: expected object, found {}", kind(value)))?;

    for field in InitialNotes::FIELDS {
        let path = format!("$.{}", field);
        let notes = object
            .get(field)
            .ok_or_else(|| format!("{}: missing required key", path))?;
        expect_string_array(notes, &path)?;
    }

    Ok(())
}

fn validate_personal_theme(record: &Value, path: &str) -> Result<(), String> {
    expect_string_field(record, path, "theme_title")?;
    expect_string_field(record, path, "description")?;
    expect_string_array_field(record, path, "extracts")?;
    expect_string_array_field(record, path, "analytic_comments")
}

fn validate_group_theme(record: &Value, path: &str) -> Result<(), String> {
    expect_string_field(record, path, "theme_title")?;
    expect_string_field(record, path, "description")?;
    let subthemes = required(record, path, "subthemes")?;
    expect_records(subthemes, &format!("{}.subthemes", path), validate_subtheme)
}

fn validate_subtheme(record: &Value, path: &str) -> Result<(), String> {
    expect_string_field(record, path, "subtheme_title")?;
    expect_string_field(record, path, "description")?;
    let contributions = required(record, path, "participant_contributions")?;
    expect_records(
        contributions,
        &format!("{}.participant_contributions", path),
        validate_contribution,
    )
}

fn validate_contribution(record: &Value, path: &str) -> Result<(), String> {
    expect_string_field(record, path, "participant_id")?;
    expect_string_array_field(record, path, "extracts")?;
    expect_string_array_field(record, path, "analytic_comments")
}

/// Array whose every element is an object satisfying `check`
fn expect_records(
    value: &Value,
    path: &str,
    check: fn(&Value, &str) -> Result<(), String>,
) -> Result<(), String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("{}: expected array, found {}", path, kind(value)))?;

    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);
        if !item.is_object() {
            return Err(format!("{}: expected object, found {}", item_path, kind(item)));
        }
        check(item, &item_path)?;
    }

    Ok(())
}

fn required<'a>(record: &'a Value, path: &str, key: &str) -> Result<&'a Value, String> {
    record
        .get(key)
        .ok_or_else(|| format!("{}.{}: missing required key", path, key))
}

fn expect_string_field(record: &Value, path: &str, key: &str) -> Result<(), String> {
    let value = required(record, path, key)?;
    if value.is_string() {
        Ok(())
    } else {
        Err(format!("{}.{}: expected string, found {}", path, key, kind(value)))
    }
}

fn expect_string_array_field(record: &Value, path: &str, key: &str) -> Result<(), String> {
    let value = required(record, path, key)?;
    expect_string_array(value, &format!("{}.{}", path, key))
}

fn expect_string_array(value: &Value, path: &str) -> Result<(), String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("{}: expected array, found {}", path, kind(value)))?;

    match items.iter().position(|item| !item.is_string()) {
        Some(i) => Err(format!(
            "{}[{}]: expected string, found {}",
            path,
            i,
            kind(&items[i])
        )),
        None => Ok(()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
