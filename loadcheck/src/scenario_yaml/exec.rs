use std::time::Duration;

use async_trait::async_trait;
use loadcheck_core::{HttpRequest, IterationContext, Scenario};
use serde_json::Value;

use super::checks::Check;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Body {
    Empty,
    Json(Value),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestStep {
    pub name: Option<String>,
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub timeout: Option<Duration>,
    pub checks: Vec<Check>,
}

impl RequestStep {
    fn build(&self) -> HttpRequest {
        let mut req = HttpRequest::new(self.method.clone(), self.url.clone());
        for (name, value) in &self.headers {
            req = req.header(name.clone(), value.clone());
        }
        req = match &self.body {
            Body::Empty => req,
            Body::Json(payload) => req.json(payload),
            Body::Raw(text) => req.body(text.clone()),
        };
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        req
    }

    fn request_json(&self) -> Option<Value> {
        match &self.body {
            Body::Json(payload) => Some(payload.clone()),
            Body::Raw(text) => serde_json::from_str(text).ok(),
            Body::Empty => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Group { name: String, steps: Vec<Step> },
    Request(RequestStep),
    Sleep(Duration),
}

/// A scenario loaded from YAML; every virtual user walks the same steps.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct YamlScenario {
    pub steps: Vec<Step>,
}

impl YamlScenario {
    pub(crate) fn request_count(&self) -> usize {
        fn count(steps: &[Step]) -> usize {
            steps
                .iter()
                .map(|s| match s {
                    Step::Group { steps, .. } => count(steps),
                    Step::Request(_) => 1,
                    Step::Sleep(_) => 0,
                })
                .sum()
        }
        count(&self.steps)
    }
}

#[async_trait]
impl Scenario for YamlScenario {
    async fn run(&self, ctx: &IterationContext) -> anyhow::Result<()> {
        run_steps(&self.steps, ctx).await;
        Ok(())
    }
}

// Boxed for recursion through nested groups.
fn run_steps<'a>(
    steps: &'a [Step],
    ctx: &'a IterationContext,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        for step in steps {
            match step {
                Step::Group { name, steps } => {
                    let _group = ctx.group(name);
                    run_steps(steps, ctx).await;
                }
                Step::Request(req) => run_request(req, ctx).await,
                Step::Sleep(d) => ctx.sleep(*d).await,
            }
        }
    })
}

async fn run_request(step: &RequestStep, ctx: &IterationContext) {
    let res = ctx.request(step.build()).await;
    if let Some(err) = &res.error {
        tracing::debug!(
            request = step.name.as_deref().unwrap_or(step.url.as_str()),
            error = %err,
            "request failed"
        );
    }

    let request_json = step.request_json();
    for check in &step.checks {
        ctx.check(&check.name, &res, |r| check.kind.evaluate(r, request_json.as_ref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario_yaml::checks::CheckKind;

    #[test]
    fn build_applies_headers_body_and_timeout() {
        let step = RequestStep {
            name: Some("create".to_string()),
            method: http::Method::POST,
            url: "http://x/api/users".to_string(),
            headers: vec![("x-trace".to_string(), "1".to_string())],
            body: Body::Json(serde_json::json!({ "name": "morpheus" })),
            timeout: Some(Duration::from_secs(2)),
            checks: Vec::new(),
        };
        let req = step.build();
        assert_eq!(req.method, http::Method::POST);
        assert_eq!(req.header_value("x-trace"), Some("1"));
        assert_eq!(req.header_value("content-type"), Some("application/json"));
        assert_eq!(req.timeout, Some(Duration::from_secs(2)));
        assert_eq!(req.json_body(), Some(serde_json::json!({ "name": "morpheus" })));
    }

    #[test]
    fn raw_json_bodies_still_feed_request_comparisons() {
        let step = RequestStep {
            name: None,
            method: http::Method::PUT,
            url: "http://x/api/users/2".to_string(),
            headers: Vec::new(),
            body: Body::Raw(r#"{"job":"zion resident"}"#.to_string()),
            timeout: None,
            checks: vec![Check {
                name: "job echoed".to_string(),
                kind: CheckKind::FieldEqualsRequest("job".to_string()),
            }],
        };
        assert_eq!(
            step.request_json(),
            Some(serde_json::json!({ "job": "zion resident" }))
        );
    }
}
