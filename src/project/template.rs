//! `$name` / `${name}` substitution for user-supplied project templates.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// Replace placeholders in `template` with values from `vars`.
///
/// `$name` and `${name}` are placeholders, `$$` is a literal `$`. Values
/// are inserted as-is and never rescanned. Every unknown name and every
/// malformed `$` is collected and reported in a single TemplateError.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut unresolved = Vec::new();
    let out = expand(template, vars, &mut unresolved);
    unresolved_error(unresolved).map(|()| out)
}

fn unresolved_error(unresolved: Vec<String>) -> Result<()> {
    if unresolved.is_empty() {
        Ok(())
    } else {
        Err(Error::template(format!(
            "unresolved placeholders: {}",
            unresolved.join(", ")
        )))
    }
}

/// Substitute into `template`, appending problems to `unresolved`.
fn expand(template: &str, vars: &BTreeMap<String, String>, unresolved: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let name = match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
                continue;
            }
            Some((start, '{')) => {
                chars.next();
                let rest = &template[start + 1..];
                match rest.find('}') {
                    Some(end)
                        if rest[..end].starts_with(is_ident_start)
                            && rest[..end].chars().all(is_ident_char) =>
                    {
                        let name = &rest[..end];
                        // Skip the name and the closing brace
                        for _ in 0..=name.chars().count() {
                            chars.next();
                        }
                        name
                    }
                    _ => {
                        unresolved.push(format!("invalid placeholder at byte {}", pos));
                        out.push_str("${");
                        continue;
                    }
                }
            }
            Some((start, next)) if is_ident_start(next) => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if !is_ident_char(ch) {
                        break;
                    }
                    end = i + ch.len_utf8();
                    chars.next();
                }
                &template[start..end]
            }
            _ => {
                unresolved.push(format!("invalid placeholder at byte {}", pos));
                out.push('$');
                continue;
            }
        };

        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                let entry = format!("${}", name);
                if !unresolved.contains(&entry) {
                    unresolved.push(entry);
                }
            }
        }
    }

    out
}

fn expand_value(value: &mut Value, vars: &BTreeMap<String, String>, unresolved: &mut Vec<String>) {
    match value {
        Value::String(text) => *text = expand(text, vars, unresolved),
        Value::Array(items) => {
            for item in items {
                expand_value(item, vars, unresolved);
            }
        }
        Value::Object(map) => {
            let entries = std::mem::take(map);
            for (key, mut item) in entries {
                expand_value(&mut item, vars, unresolved);
                map.insert(expand(&key, vars, unresolved), item);
            }
        }
        _ => {}
    }
}

/// Parse `template` as a YAML mapping, then substitute placeholders inside
/// its keys and string values.
///
/// Values are inserted after parsing, so quotes, backslashes or YAML
/// syntax in a value never change the document structure. Placeholders in
/// comments are ignored.
pub fn render_template(template: &str, vars: &BTreeMap<String, String>) -> Result<Value> {
    let mut doc: Value = serde_yaml::from_str(template)
        .map_err(|e| Error::template(format!("template is not valid YAML: {}", e)))?;
    if !doc.is_object() {
        return Err(Error::template("template is not a mapping"));
    }

    let mut unresolved = Vec::new();
    expand_value(&mut doc, vars, &mut unresolved);
    unresolved.dedup();
    unresolved_error(unresolved)?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::lookup;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_both_forms_and_escape() {
        let v = vars(&[("name", "Titanic"), ("slug", "titanic")]);
        let out = substitute("$name costs $$5 at ${slug}-v2", &v).unwrap();
        assert_eq!(out, "Titanic costs $5 at titanic-v2");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let v = vars(&[("a", "$b"), ("b", "nope")]);
        assert_eq!(substitute("x=$a", &v).unwrap(), "x=$b");
    }

    #[test]
    fn test_unresolved_placeholders_are_all_reported() {
        let v = vars(&[("name", "demo")]);
        let err = substitute("$name $missing ${other} $missing", &v).unwrap_err();
        match err {
            Error::Template(msg) => {
                assert!(msg.contains("$missing"));
                assert!(msg.contains("$other"));
                assert!(!msg.contains("$name"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_dollar_is_an_error() {
        let v = vars(&[]);
        assert!(substitute("price: $5", &v).is_err());
        assert!(substitute("bad: ${not closed", &v).is_err());
        assert!(substitute("trailing $", &v).is_err());
    }

    #[test]
    fn test_render_reproduces_every_variable() {
        let template = "\
project:
  name: \"$project_name\"
  kaggle_username: $kaggle_username
kaggle:
  kernel_id: ${kaggle_username}/${kernel_slug}
";
        let v = vars(&[
            ("project_name", "My Project"),
            ("kaggle_username", "alice"),
            ("kernel_slug", "my-project"),
        ]);
        let doc = render_template(template, &v).unwrap();
        assert_eq!(lookup(&doc, "project.name"), Some(&json!("My Project")));
        assert_eq!(lookup(&doc, "project.kaggle_username"), Some(&json!("alice")));
        assert_eq!(lookup(&doc, "kaggle.kernel_id"), Some(&json!("alice/my-project")));
    }

    #[test]
    fn test_render_rejects_bad_yaml_and_scalars() {
        assert!(matches!(
            render_template("key: [unclosed", &vars(&[])),
            Err(Error::Template(_))
        ));
        assert!(matches!(
            render_template("just a string", &vars(&[])),
            Err(Error::Template(_))
        ));
    }

    #[test]
    fn test_render_keeps_yaml_syntax_in_values_literal() {
        let template = "\
project:
  description: \"$project_description\"
  tags: [$tag]
";
        let v = vars(&[
            ("project_description", r#"Predicts "survival" on C:\data"#),
            ("tag", "[unclosed: {"),
        ]);
        let doc = render_template(template, &v).unwrap();
        assert_eq!(
            lookup(&doc, "project.description"),
            Some(&json!(r#"Predicts "survival" on C:\data"#))
        );
        assert_eq!(doc["project"]["tags"], json!(["[unclosed: {"]));
    }

    #[test]
    fn test_render_reports_placeholders_across_the_document() {
        let err = render_template("a: $one\nb:\n  c: $two\n# $ignored\n", &vars(&[])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("$one") && msg.contains("$two"), "{}", msg);
        assert!(!msg.contains("$ignored"), "{}", msg);
    }
}
