//! Template engine (§4.A).
//!
//! Renders `{{ expr }}` substitutions (dotted field lookups with an
//! optional `| filter` chain) against a JSON context, via `minijinja` — the
//! Jinja-family crate whose syntax this subsystem was always describing.
//! Shell mode is implemented as a custom output formatter rather than a
//! filter a template author could forget to apply: every rendered
//! expression passes through it, and only expressions rendered under the
//! `"shell"` custom auto-escape mode get single-quoted. Literal template
//! text never passes through the formatter, so it is never escaped.

use crate::error::{ColophonError, Result};
use minijinja::value::Value as MiniValue;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use once_cell::sync::Lazy;
use std::fmt::Write as _;
use std::sync::Mutex;

/// Escape a string to pass as a shell argument: wrap in single quotes,
/// escaping embedded single quotes as `'\''`.
pub fn escape_shell_arg(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

fn basename(value: String) -> String {
    value.rsplit('/').next().unwrap_or(&value).to_string()
}

/// A template is named `"shell\0<source>"` or `"plain\0<source>"`; the
/// auto-escape callback reads the prefix back off to pick the mode, and
/// `minijinja`'s own named-template store doubles as the compiled-template
/// cache keyed by `(source, shellMode)`.
fn template_name(source: &str, shell: bool) -> String {
    format!("{}\u{0}{source}", if shell { "shell" } else { "plain" })
}

fn build_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_filter("basename", basename);
    env.set_auto_escape_callback(|name: &str| {
        if name.starts_with("shell\u{0}") {
            AutoEscape::Custom("shell")
        } else {
            AutoEscape::None
        }
    });
    env.set_formatter(|out, state, value| {
        let rendered = if value.is_none() {
            String::new()
        } else {
            value.to_string()
        };
        let rendered = if state.auto_escape() == AutoEscape::Custom("shell") {
            escape_shell_arg(&rendered)
        } else {
            rendered
        };
        write!(out, "{rendered}")
            .map_err(|e| minijinja::Error::new(minijinja::ErrorKind::WriteFailure, e.to_string()))
    });
    env
}

static ENV: Lazy<Mutex<Environment<'static>>> = Lazy::new(|| Mutex::new(build_environment()));

/// Render `source` against `context`. `shell` routes every substituted
/// value through the shell-escaping formatter. Compiled templates are
/// cached keyed by `(source, shell)`.
pub fn render_template_string(
    source: &str,
    context: &serde_json::Value,
    shell: bool,
) -> Result<String> {
    let name = template_name(source, shell);
    let mut env = ENV.lock().unwrap();
    if env.get_template(&name).is_err() {
        env.add_template_owned(name.clone(), source.to_string())
            .map_err(|e| ColophonError::TemplateRenderFailure {
                source: source.to_string(),
                message: e.to_string(),
            })?;
    }
    let tmpl = env
        .get_template(&name)
        .map_err(|e| ColophonError::TemplateRenderFailure {
            source: source.to_string(),
            message: e.to_string(),
        })?;
    let ctx = MiniValue::from_serialize(context);
    tmpl.render(ctx)
        .map_err(|e| ColophonError::TemplateRenderFailure {
            source: source.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_substitution() {
        let ctx = json!({"kind": "a"});
        assert_eq!(
            render_template_string("{{ kind }}", &ctx, false).unwrap(),
            "a"
        );
    }

    #[test]
    fn nested_path() {
        let ctx = json!({"file": {"name": "report.pdf"}});
        assert_eq!(
            render_template_string("{{ file.name }}", &ctx, false).unwrap(),
            "report.pdf"
        );
    }

    #[test]
    fn basename_filter() {
        let ctx = json!({"roots": "dir/r0.txt"});
        assert_eq!(
            render_template_string("{{ roots | basename }}.side", &ctx, false).unwrap(),
            "r0.txt.side"
        );
    }

    #[test]
    fn shell_escape_wraps_value() {
        let ctx = json!({"v": "a'b"});
        let rendered = render_template_string("{{ v }}", &ctx, true).unwrap();
        assert_eq!(rendered, "'a'\\''b'");
    }

    #[test]
    fn undefined_name_fails() {
        let ctx = json!({});
        let err = render_template_string("{{ missing }}", &ctx, false).unwrap_err();
        assert!(matches!(err, ColophonError::TemplateRenderFailure { .. }));
    }

    #[test]
    fn literal_printable_shell_escape_round_trip() {
        for v in ["hello", "a b c", "no'quote", "'''"] {
            let ctx = json!({"v": v});
            let rendered = render_template_string("{{ v }}", &ctx, true).unwrap();
            let expected = format!("'{}'", v.replace('\'', "'\\''"));
            assert_eq!(rendered, expected);
        }
    }

    #[test]
    fn null_value_renders_as_empty_string() {
        let ctx = json!({"v": null});
        assert_eq!(
            render_template_string("[{{ v }}]", &ctx, false).unwrap(),
            "[]"
        );
    }
}
