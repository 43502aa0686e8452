use loadcheck_core::RequestOutcome;
use serde_json::Value;

/// Assertion applied to one request outcome.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CheckKind {
    Status(u16),
    /// `true` requires a non-empty body, `false` an empty one.
    BodyNotEmpty(bool),
    HasProperty(String),
    FieldEquals { field: String, value: Value },
    /// The response field equals the same field of the request's JSON payload.
    FieldEqualsRequest(String),
    HeaderPresent(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Check {
    pub name: String,
    pub kind: CheckKind,
}

impl CheckKind {
    /// `Err` explains why the check could not be evaluated; it counts as a failure.
    pub(crate) fn evaluate(
        &self,
        res: &RequestOutcome,
        request_json: Option<&Value>,
    ) -> Result<bool, String> {
        match self {
            CheckKind::Status(expected) => Ok(res.status == *expected),
            CheckKind::BodyNotEmpty(expected) => Ok(!res.body.is_empty() == *expected),
            CheckKind::HeaderPresent(name) => Ok(res.header(name).is_some()),
            CheckKind::HasProperty(path) => {
                let body = response_json(res)?;
                Ok(lookup(&body, path).is_some())
            }
            CheckKind::FieldEquals { field, value } => {
                let body = response_json(res)?;
                Ok(lookup(&body, field) == Some(value))
            }
            CheckKind::FieldEqualsRequest(field) => {
                let body = response_json(res)?;
                let expected = request_json
                    .and_then(|req| lookup(req, field))
                    .ok_or_else(|| format!("request payload has no `{field}`"))?;
                Ok(lookup(&body, field) == Some(expected))
            }
        }
    }
}

fn response_json(res: &RequestOutcome) -> Result<Value, String> {
    serde_json::from_slice(&res.body).map_err(|e| format!("response body is not JSON: {e}"))
}

/// Resolves a dotted path (`data.items.0.id`) inside a JSON document.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |cur, segment| match cur {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn outcome(status: u16, body: &str, headers: &[(&str, &str)]) -> RequestOutcome {
        RequestOutcome {
            method: http::Method::POST,
            url: "http://stub/api/users".to_string(),
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_string().into_bytes().into(),
            elapsed: Duration::from_millis(3),
            bytes_sent: 0,
            bytes_received: 0,
            error: None,
        }
    }

    #[test]
    fn status_and_body_checks() {
        let res = outcome(201, r#"{"id":"100"}"#, &[]);
        assert_eq!(CheckKind::Status(201).evaluate(&res, None), Ok(true));
        assert_eq!(CheckKind::Status(200).evaluate(&res, None), Ok(false));
        assert_eq!(CheckKind::BodyNotEmpty(true).evaluate(&res, None), Ok(true));

        let empty = outcome(204, "", &[]);
        assert_eq!(CheckKind::BodyNotEmpty(true).evaluate(&empty, None), Ok(false));
        assert_eq!(CheckKind::BodyNotEmpty(false).evaluate(&empty, None), Ok(true));
    }

    #[test]
    fn property_checks_follow_dotted_paths() {
        let res = outcome(200, r#"{"data":{"id":2,"tags":["a","b"]}}"#, &[]);
        let has = |p: &str| CheckKind::HasProperty(p.to_string()).evaluate(&res, None);
        assert_eq!(has("data.id"), Ok(true));
        assert_eq!(has("data.tags.1"), Ok(true));
        assert_eq!(has("data.tags.2"), Ok(false));
        assert_eq!(has("id"), Ok(false));
    }

    #[test]
    fn non_json_body_is_an_evaluation_error() {
        let res = outcome(200, "<html>", &[]);
        assert!(CheckKind::HasProperty("id".to_string()).evaluate(&res, None).is_err());
    }

    #[test]
    fn field_equals_compares_json_values() {
        let res = outcome(200, r#"{"data":{"id":2}}"#, &[]);
        let check = |v: Value| {
            CheckKind::FieldEquals {
                field: "data.id".to_string(),
                value: v,
            }
            .evaluate(&res, None)
        };
        assert_eq!(check(json!(2)), Ok(true));
        assert_eq!(check(json!("2")), Ok(false));
    }

    #[test]
    fn field_equals_request_compares_fields_not_serialized_payloads() {
        let payload = json!({ "name": "morpheus", "job": "leader" });
        let res = outcome(
            201,
            r#"{"name":"morpheus","job":"leader","id":"100","createdAt":"2024-01-01T00:00:00Z"}"#,
            &[],
        );
        let name = CheckKind::FieldEqualsRequest("name".to_string());
        assert_eq!(name.evaluate(&res, Some(&payload)), Ok(true));

        // Comparing against the whole serialized payload would never match a single field.
        let serialized = Value::String(payload.to_string());
        assert_ne!(lookup(&json!({"name": "morpheus"}), "name"), Some(&serialized));

        let changed = outcome(201, r#"{"name":"neo","id":"101"}"#, &[]);
        assert_eq!(name.evaluate(&changed, Some(&payload)), Ok(false));
        assert!(
            CheckKind::FieldEqualsRequest("missing".to_string())
                .evaluate(&res, Some(&payload))
                .is_err()
        );
    }

    #[test]
    fn header_present_ignores_case() {
        let res = outcome(200, "{}", &[("content-type", "application/json")]);
        assert_eq!(
            CheckKind::HeaderPresent("Content-Type".to_string()).evaluate(&res, None),
            Ok(true)
        );
        assert_eq!(
            CheckKind::HeaderPresent("x-request-id".to_string()).evaluate(&res, None),
            Ok(false)
        );
    }
}
