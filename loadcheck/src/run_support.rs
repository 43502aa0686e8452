use std::collections::BTreeMap;
use std::ffi::OsString;

use anyhow::Context as _;

pub(crate) type EnvVars = BTreeMap<String, String>;

/// Process env overlaid with `--env KEY=VALUE` overrides.
pub(crate) fn merged_env(overrides: &[String]) -> anyhow::Result<EnvVars> {
    let mut map = utf8_env(std::env::vars_os());

    for raw in overrides {
        let (k, v) = parse_env_override(raw)?;
        map.insert(k, v);
    }

    Ok(map)
}

/// Keeps the variables whose name and value are both UTF-8.
fn utf8_env(vars: impl IntoIterator<Item = (OsString, OsString)>) -> EnvVars {
    vars.into_iter()
        .filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
            (Ok(k), Ok(v)) => Some((k, v)),
            (Ok(k), Err(_)) => {
                tracing::debug!(name = %k, "skipping non UTF-8 environment variable");
                None
            }
            (Err(_), _) => None,
        })
        .collect()
}

fn parse_env_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --env (expected KEY=VALUE): {s}"))?;
    if k.is_empty() {
        anyhow::bail!("invalid --env (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_and_allow_empty_values() -> anyhow::Result<()> {
        let env = merged_env(&[
            "LOADCHECK_TEST_A=1".to_string(),
            "LOADCHECK_TEST_A=2".to_string(),
            "LOADCHECK_TEST_EMPTY=".to_string(),
        ])?;
        assert_eq!(env.get("LOADCHECK_TEST_A").map(String::as_str), Some("2"));
        assert_eq!(env.get("LOADCHECK_TEST_EMPTY").map(String::as_str), Some(""));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt as _;

        let env = utf8_env([
            (OsString::from("BASE_URL"), OsString::from("http://127.0.0.1:8080")),
            (OsString::from("BROKEN"), OsString::from_vec(vec![0x66, 0xff, 0x6f])),
            (OsString::from_vec(vec![0xfe]), OsString::from("x")),
        ]);
        assert_eq!(env.len(), 1);
        assert_eq!(
            env.get("BASE_URL").map(String::as_str),
            Some("http://127.0.0.1:8080")
        );
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        assert!(merged_env(&["NOEQUALS".to_string()]).is_err());
        assert!(merged_env(&["=value".to_string()]).is_err());
    }
}
