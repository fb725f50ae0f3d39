// ABOUTME: Endpoint template resolution for api-mode tools
// ABOUTME: Replaces {placeholder} tokens with stored variable values

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

static TEMPLATE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_-]{1,64})\}").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template variable {0:?} is not defined")]
    UndefinedVariable(String),
}

/// Replace every `{placeholder}` in `template` with the matching value from
/// `variables`. A placeholder without a matching variable aborts with the
/// offending name. Duplicate placeholders resolve to the same value.
pub fn resolve_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut missing: Option<String> = None;
    let resolved = TEMPLATE_VAR.replace_all(template, |caps: &regex::Captures| {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) => value.clone(),
            None => {
                if missing.is_none() {
                    missing = Some(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });
    match missing {
        Some(name) => Err(TemplateError::UndefinedVariable(name)),
        None => Ok(resolved.into_owned()),
    }
}

/// Unique placeholder names found in `template`, in encounter order.
pub fn extract_template_vars(template: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut vars = Vec::new();
    for caps in TEMPLATE_VAR.captures_iter(template) {
        let name = caps[1].to_string();
        if seen.insert(name.clone()) {
            vars.push(name);
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn simple_replacement() {
        let got = resolve_template(
            "https://{instance}.atlassian.net/rest/api/3",
            &vars(&[("instance", "mycompany")]),
        )
        .unwrap();
        assert_eq!(got, "https://mycompany.atlassian.net/rest/api/3");
    }

    #[test]
    fn multiple_vars() {
        let got = resolve_template(
            "https://{host}/api/{version}/data",
            &vars(&[("host", "example.com"), ("version", "v2")]),
        )
        .unwrap();
        assert_eq!(got, "https://example.com/api/v2/data");
    }

    #[test]
    fn missing_var_reports_name() {
        let err = resolve_template(
            "https://{instance}.example.com/{path}",
            &vars(&[("instance", "test")]),
        )
        .unwrap_err();
        assert_eq!(err, TemplateError::UndefinedVariable("path".to_string()));
    }

    #[test]
    fn passthrough_without_placeholders() {
        let got = resolve_template("https://api.example.com/v1", &HashMap::new()).unwrap();
        assert_eq!(got, "https://api.example.com/v1");
    }

    #[test]
    fn duplicate_vars_resolved_identically() {
        let got =
            resolve_template("https://{host}/{host}/path", &vars(&[("host", "myhost")])).unwrap();
        assert_eq!(got, "https://myhost/myhost/path");
    }

    #[test]
    fn resolved_output_is_placeholder_free() {
        let template = "https://{a}/{b}/{a}?x={c}";
        let values = vars(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let got = resolve_template(template, &values).unwrap();
        assert!(extract_template_vars(&got).is_empty());
    }

    #[test]
    fn extract_unique_in_encounter_order() {
        let got = extract_template_vars("https://{host}/{version}/{host}/{path}");
        assert_eq!(got, vec!["host", "version", "path"]);
    }

    #[test]
    fn extract_ignores_invalid_names() {
        // Space and over-long names do not match the placeholder syntax.
        assert!(extract_template_vars("https://{bad name}").is_empty());
        let long = format!("https://{{{}}}", "a".repeat(65));
        assert!(extract_template_vars(&long).is_empty());
    }
}
