//! `{{variable}}` substitution for template content.

use std::collections::HashMap;

use regex::Regex;

/// Renders template content by replacing `{{name}}` placeholders.
///
/// Unknown placeholders are left untouched, and JSX object literals such as
/// `{{ textAlign: 'center' }}` never match because the name must follow the
/// braces directly.
pub struct TemplateRenderer {
    variable_pattern: Regex,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            variable_pattern: Regex::new(r"\{\{([a-zA-Z_][a-zA-Z0-9_]*)\}\}").unwrap(),
        }
    }

    /// Render content by replacing variables.
    pub fn render_content(&self, content: &str, variables: &HashMap<String, String>) -> String {
        self.variable_pattern
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                variables
                    .get(var_name)
                    .cloned()
                    .unwrap_or_else(|| format!("{{{{{}}}}}", var_name))
            })
            .to_string()
    }

    /// Standard variables for a project: `project_name` and `title`.
    pub fn project_variables(project_name: &str) -> HashMap<String, String> {
        HashMap::from([
            ("project_name".to_string(), project_name.to_string()),
            ("title".to_string(), Self::to_title_case(project_name)),
        ])
    }

    /// `space-shooter_2` becomes `Space Shooter 2`.
    pub fn to_title_case(s: &str) -> String {
        s.split(['-', '_', ' '])
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    None => String::new(),
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
