//! `${NAME:-default}` environment placeholders and `{{var}}` scenario variables.

use std::collections::BTreeMap;

use anyhow::Context as _;

/// Expands `${NAME}` and `${NAME:-default}` from `env`.
///
/// A missing variable without a default is an error. `$$` is a literal `$`.
pub(crate) fn expand_env(input: &str, env: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }
        let Some(inner) = after.strip_prefix('{') else {
            out.push('$');
            rest = after;
            continue;
        };

        let end = inner
            .find('}')
            .with_context(|| format!("unterminated `${{` in `{input}`"))?;
        let expr = &inner[..end];
        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };
        if name.is_empty() {
            anyhow::bail!("empty variable name in `{input}`");
        }

        match (env.get(name), default) {
            (Some(value), _) => out.push_str(value),
            (None, Some(default)) => out.push_str(default),
            (None, None) => anyhow::bail!("environment variable `{name}` is not set"),
        }
        rest = &inner[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Replaces every `{{name}}` with `vars[name]`; unknown names are an error.
pub(crate) fn render(input: &str, vars: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find("{{") {
        out.push_str(&rest[..pos]);
        let inner = &rest[pos + 2..];
        let end = inner
            .find("}}")
            .with_context(|| format!("unterminated `{{{{` in `{input}`"))?;
        let name = inner[..end].trim();
        let value = vars
            .get(name)
            .with_context(|| format!("unknown variable `{name}` in `{input}`"))?;
        out.push_str(value);
        rest = &inner[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Renders every string leaf of a JSON document; keys are left alone.
pub(crate) fn render_json(
    value: serde_json::Value,
    vars: &BTreeMap<String, String>,
) -> anyhow::Result<serde_json::Value> {
    use serde_json::Value;

    Ok(match value {
        Value::String(s) => Value::String(render(&s, vars)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| render_json(v, vars))
                .collect::<anyhow::Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| Ok((k, render_json(v, vars)?)))
                .collect::<anyhow::Result<_>>()?,
        ),
        other => other,
    })
}
