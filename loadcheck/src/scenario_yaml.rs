use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use loadcheck_core::{Pause, RunOptions, StartMode, ThresholdSet, TrendMode};
use serde::Deserialize;

mod checks;
mod exec;
mod template;

use checks::{Check, CheckKind};
use exec::{Body, RequestStep, Step};
pub(crate) use exec::YamlScenario;
use template::{expand_env, render, render_json};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioDocYaml {
    #[serde(default)]
    options: OptionsYaml,

    #[serde(default, deserialize_with = "deserialize_vars")]
    vars: BTreeMap<String, String>,

    steps: Vec<StepYaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct OptionsYaml {
    vus: Option<u64>,
    iterations: Option<u64>,
    duration: Option<YamlDuration>,
    pause: Option<PauseYaml>,
    /// Delay between the starts of two consecutive virtual users.
    stagger: Option<YamlDuration>,
    #[serde(default)]
    thresholds: BTreeMap<String, ThresholdExprYaml>,
    #[serde(alias = "trend_mode")]
    trend_mode: Option<String>,
    #[serde(alias = "request_timeout")]
    request_timeout: Option<YamlDuration>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum PauseYaml {
    Fixed(YamlDuration),
    Range { min: YamlDuration, max: YamlDuration },
}

impl From<PauseYaml> for Pause {
    fn from(value: PauseYaml) -> Self {
        match value {
            PauseYaml::Fixed(d) => Pause::Fixed(d.into_inner()),
            PauseYaml::Range { min, max } => Pause::Random {
                min: min.into_inner(),
                max: max.into_inner(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdExprYaml {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StepYaml {
    Group {
        group: String,
        steps: Vec<StepYaml>,
    },
    Request {
        request: RequestYaml,
        #[serde(default)]
        checks: Vec<CheckYaml>,
    },
    Sleep {
        sleep: YamlDuration,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestYaml {
    name: Option<String>,
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    json: Option<serde_yaml::Value>,
    body: Option<String>,
    timeout: Option<YamlDuration>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct CheckYaml {
    name: String,
    #[serde(flatten)]
    kind: CheckKindYaml,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CheckKindYaml {
    Status(u16),
    BodyNotEmpty(bool),
    HasProperty(String),
    FieldEquals {
        field: String,
        value: serde_yaml::Value,
    },
    FieldEqualsRequest(String),
    HeaderPresent(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn deserialize_vars<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => String::new(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "var `{k}` must be a scalar"
                )));
            }
        };
        out.insert(k, s);
    }

    Ok(out)
}

/// A parsed scenario file: run options plus the steps to execute.
#[derive(Debug)]
pub(crate) struct LoadedScenario {
    pub options: RunOptions,
    pub scenario: YamlScenario,
}

pub(crate) async fn load_scenario(
    path: &Path,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<LoadedScenario> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario YAML: {}", path.display()))?;
    let text = std::str::from_utf8(&bytes)
        .with_context(|| format!("scenario YAML is not UTF-8: {}", path.display()))?;
    parse_scenario(text, env).with_context(|| format!("invalid scenario: {}", path.display()))
}

pub(crate) fn parse_scenario(
    yaml: &str,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<LoadedScenario> {
    let doc: ScenarioDocYaml = serde_yaml::from_str(yaml).context("failed to parse YAML")?;

    let vars = doc
        .vars
        .into_iter()
        .map(|(k, v)| {
            let v = expand_env(&v, env).with_context(|| format!("var `{k}`"))?;
            Ok((k, v))
        })
        .collect::<anyhow::Result<BTreeMap<_, _>>>()?;

    if doc.steps.is_empty() {
        anyhow::bail!("scenario has no steps");
    }
    let steps = compile_steps(doc.steps, &vars)?;

    Ok(LoadedScenario {
        options: run_options(doc.options)?,
        scenario: YamlScenario { steps },
    })
}

fn run_options(opts: OptionsYaml) -> anyhow::Result<RunOptions> {
    let trend_mode = opts
        .trend_mode
        .map(|raw| {
            raw.parse::<TrendMode>()
                .map_err(|_| anyhow::anyhow!("invalid trendMode `{raw}` (expected exact or bounded)"))
        })
        .transpose()?;

    Ok(RunOptions {
        vus: opts.vus,
        iterations: opts.iterations,
        duration: opts.duration.map(YamlDuration::into_inner),
        pause: opts.pause.map(Pause::from),
        start: opts
            .stagger
            .map(|d| StartMode::Staggered(d.into_inner())),
        thresholds: parse_thresholds_map(opts.thresholds)?,
        trend_mode,
        request_timeout: opts.request_timeout.map(YamlDuration::into_inner),
    })
}

fn parse_thresholds_map(
    raw: BTreeMap<String, ThresholdExprYaml>,
) -> anyhow::Result<Vec<ThresholdSet>> {
    let mut out = Vec::new();

    for (metric, v) in raw {
        let expressions: Vec<String> = match v {
            ThresholdExprYaml::One(s) => vec![s],
            ThresholdExprYaml::Many(v) => v,
        };

        if expressions.is_empty() {
            anyhow::bail!("invalid thresholds for `{metric}`: empty list");
        }

        out.push(ThresholdSet::new(metric, expressions));
    }

    Ok(out)
}

fn compile_steps(steps: Vec<StepYaml>, vars: &BTreeMap<String, String>) -> anyhow::Result<Vec<Step>> {
    steps
        .into_iter()
        .map(|step| {
            Ok(match step {
                StepYaml::Group { group, steps } => {
                    let steps = compile_steps(steps, vars).with_context(|| format!("group `{group}`"))?;
                    Step::Group { name: group, steps }
                }
                StepYaml::Request { request, checks } => {
                    let label = request.name.clone().unwrap_or_else(|| request.url.clone());
                    Step::Request(
                        compile_request(request, checks, vars)
                            .with_context(|| format!("request `{label}`"))?,
                    )
                }
                StepYaml::Sleep { sleep } => Step::Sleep(sleep.into_inner()),
            })
        })
        .collect()
}

fn compile_request(
    request: RequestYaml,
    checks: Vec<CheckYaml>,
    vars: &BTreeMap<String, String>,
) -> anyhow::Result<RequestStep> {
    let method = http::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method `{}`", request.method))?;

    let headers = request
        .headers
        .into_iter()
        .map(|(k, v)| Ok((k, render(&v, vars)?)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let body = match (request.json, request.body) {
        (Some(_), Some(_)) => anyhow::bail!("`json` and `body` are mutually exclusive"),
        (Some(json), None) => {
            let json = serde_json::to_value(json).context("`json` is not representable as JSON")?;
            Body::Json(render_json(json, vars)?)
        }
        (None, Some(text)) => Body::Raw(render(&text, vars)?),
        (None, None) => Body::Empty,
    };

    let checks = checks
        .into_iter()
        .map(|c| compile_check(c, vars))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(RequestStep {
        name: request.name,
        method,
        url: render(&request.url, vars)?,
        headers,
        body,
        timeout: request.timeout.map(YamlDuration::into_inner),
        checks,
    })
}

fn compile_check(check: CheckYaml, vars: &BTreeMap<String, String>) -> anyhow::Result<Check> {
    let kind = match check.kind {
        CheckKindYaml::Status(code) => CheckKind::Status(code),
        CheckKindYaml::BodyNotEmpty(expected) => CheckKind::BodyNotEmpty(expected),
        CheckKindYaml::HasProperty(path) => CheckKind::HasProperty(path),
        CheckKindYaml::FieldEquals { field, value } => {
            let value = serde_json::to_value(value)
                .with_context(|| format!("check `{}`: value is not representable as JSON", check.name))?;
            CheckKind::FieldEquals {
                field,
                value: render_json(value, vars)?,
            }
        }
        CheckKindYaml::FieldEqualsRequest(field) => CheckKind::FieldEqualsRequest(field),
        CheckKindYaml::HeaderPresent(name) => CheckKind::HeaderPresent(name),
    };
    Ok(Check {
        name: check.name,
        kind,
    })
}
