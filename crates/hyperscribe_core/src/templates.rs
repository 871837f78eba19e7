//! Note templates with `[VARIABLE]` substitution.
//!
//! Built-in templates ship with the crate; custom templates live in the
//! persisted document (`customTemplates`) and are edited through the store.

use crate::error::AppError;
use crate::text::normalize_optional_nonempty;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A reusable starting point for a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_custom: bool,
}

fn default_icon() -> String {
    "📄".to_string()
}

fn builtin(id: &str, name: &str, description: &str, icon: &str, content: &str) -> Template {
    Template {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        content: content.to_string(),
        is_custom: false,
    }
}

/// Templates bundled with the popup.
pub fn builtin_templates() -> Vec<Template> {
    vec![
        builtin("blank", "Blank", "Start with an empty note", "📄", ""),
        builtin(
            "meeting-notes",
            "Meeting Notes",
            "Structured meeting notes template",
            "📝",
            "# Meeting Notes - [DATE]\n\n## Attendees\n- \n\n## Agenda\n1. \n\n## Discussion\n- \n\n## Action Items\n- [ ] \n\n## Next Steps\n- \n\n## Notes\n",
        ),
        builtin(
            "todo-list",
            "Todo List",
            "Organized task list with priorities",
            "✅",
            "# Todo List - [DATE]\n\n## High Priority\n- [ ] \n\n## Medium Priority\n- [ ] \n\n## Low Priority\n- [ ] \n\n## Completed\n- [x] \n",
        ),
        builtin(
            "daily-journal",
            "Daily Journal",
            "Daily reflection and planning",
            "📔",
            "# Journal - [DATE]\n\n## Today's Goals\n- \n\n## Gratitude\n- \n\n## Reflections\n\n## Tomorrow\n- \n",
        ),
        builtin(
            "brainstorm",
            "Brainstorm",
            "Free-form brainstorming template",
            "💡",
            "# Brainstorm Session - [DATE]\n\n## Topic\nWhat are we brainstorming?\n\n## Ideas\n- \n- \n- \n\n## Questions\n- \n- \n\n## Next Actions\n- [ ] \n",
        ),
        builtin(
            "code-snippet",
            "Code Snippet",
            "Code with documentation",
            "💻",
            "# Code Snippet - [DATE]\n\n## Description\n\n## Language\n\n## Code\n```\n// Your code here\n```\n\n## Usage\n\n## Notes\n",
        ),
    ]
}

/// `true` when `id` names a bundled template.
pub fn is_builtin(id: &str) -> bool {
    builtin_templates().iter().any(|template| template.id == id)
}

/// Look up a template among built-ins and `custom`.
pub fn find_template(custom: &[Template], id: &str) -> Option<Template> {
    builtin_templates()
        .into_iter()
        .find(|template| template.id == id)
        .or_else(|| custom.iter().find(|template| template.id == id).cloned())
}

/// Render template content, replacing `[DATE]`, `[TIME]`, `[DATETIME]`,
/// `[PROJECT_NAME]` and any caller-provided `[KEY]` placeholders.
///
/// Caller variables override the defaults.
pub fn render(content: &str, at: DateTime<Local>, variables: &BTreeMap<String, String>) -> String {
    let mut vars = BTreeMap::new();
    vars.insert("DATE".to_string(), at.format("%Y-%m-%d").to_string());
    vars.insert("TIME".to_string(), at.format("%H:%M").to_string());
    vars.insert("DATETIME".to_string(), at.format("%Y-%m-%d %H:%M").to_string());
    vars.insert("PROJECT_NAME".to_string(), String::new());
    for (key, value) in variables {
        vars.insert(key.clone(), value.clone());
    }

    let mut rendered = content.to_string();
    for (key, value) in &vars {
        rendered = rendered.replace(&format!("[{}]", key), value);
    }
    rendered
}

/// Apply the template `id` at the current local time.
///
/// # Errors
/// [`AppError::NotFound`] when no template has that id.
pub fn apply_template(
    custom: &[Template],
    id: &str,
    variables: &BTreeMap<String, String>,
) -> Result<String, AppError> {
    let template = find_template(custom, id)
        .ok_or_else(|| AppError::NotFound(format!("template '{}'", id)))?;
    Ok(render(&template.content, Local::now(), variables))
}

/// Validate and append a custom template, returning the updated list.
///
/// # Errors
/// [`AppError::Validation`] when id or name is blank, or the id is taken.
pub fn add_custom_template(
    custom: &[Template],
    template: Template,
) -> Result<Vec<Template>, AppError> {
    let id = normalize_optional_nonempty(Some(template.id))
        .ok_or_else(|| AppError::Validation("template id is required".to_string()))?;
    let name = normalize_optional_nonempty(Some(template.name))
        .ok_or_else(|| AppError::Validation("template name is required".to_string()))?;
    if find_template(custom, &id).is_some() {
        return Err(AppError::Validation(format!(
            "template with id '{}' already exists",
            id
        )));
    }

    let mut updated = custom.to_vec();
    updated.push(Template {
        id,
        name,
        is_custom: true,
        ..template
    });
    Ok(updated)
}

/// Remove a custom template, returning the updated list.
///
/// # Errors
/// [`AppError::Validation`] for built-ins, [`AppError::NotFound`] for unknown ids.
pub fn remove_custom_template(custom: &[Template], id: &str) -> Result<Vec<Template>, AppError> {
    if is_builtin(id) {
        return Err(AppError::Validation(format!(
            "cannot remove built-in template '{}'",
            id
        )));
    }
    if !custom.iter().any(|template| template.id == id) {
        return Err(AppError::NotFound(format!("custom template '{}'", id)));
    }
    Ok(custom
        .iter()
        .filter(|template| template.id != id)
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn custom(id: &str) -> Template {
        Template {
            id: id.to_string(),
            name: "Standup".to_string(),
            description: String::new(),
            icon: default_icon(),
            content: "Standup for [PROJECT_NAME] on [DATE]".to_string(),
            is_custom: false,
        }
    }

    #[test]
    fn render_substitutes_defaults_and_overrides() {
        let at = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 0)
            .single()
            .expect("unambiguous local time");
        let mut vars = BTreeMap::new();
        vars.insert("PROJECT_NAME".to_string(), "Atlas".to_string());

        let rendered = render("[PROJECT_NAME] [DATE] [TIME] [DATETIME] [UNKNOWN]", at, &vars);
        assert_eq!(rendered, "Atlas 2024-03-09 07:05 2024-03-09 07:05 [UNKNOWN]");
    }

    #[test]
    fn apply_template_rejects_unknown_id() {
        let err = apply_template(&[], "nope", &BTreeMap::new()).expect_err("unknown");
        assert!(matches!(err, AppError::NotFound(_)));
        let blank = apply_template(&[], "blank", &BTreeMap::new()).expect("blank");
        assert!(blank.is_empty());
    }

    #[test]
    fn add_custom_template_validates_and_marks_custom() {
        let added = add_custom_template(&[], custom("standup")).expect("add");
        assert_eq!(added.len(), 1);
        assert!(added[0].is_custom);

        let dup = add_custom_template(&added, custom("standup")).expect_err("duplicate");
        assert!(matches!(dup, AppError::Validation(ref msg) if msg.contains("already exists")));

        let clash = add_custom_template(&added, custom("todo-list")).expect_err("builtin clash");
        assert!(matches!(clash, AppError::Validation(_)));

        let mut nameless = custom("x");
        nameless.name = "  ".to_string();
        assert!(matches!(
            add_custom_template(&[], nameless),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn remove_custom_template_protects_builtins() {
        let added = add_custom_template(&[], custom("standup")).expect("add");
        assert!(matches!(
            remove_custom_template(&added, "blank"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            remove_custom_template(&added, "ghost"),
            Err(AppError::NotFound(_))
        ));
        assert!(remove_custom_template(&added, "standup")
            .expect("remove")
            .is_empty());
    }
}
