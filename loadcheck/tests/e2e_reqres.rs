use std::path::Path;
use std::process::Command;

use anyhow::Context as _;
use loadcheck_testserver::TestServer;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckLine {
    name: String,
    passes: u64,
    fails: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Checks {
    passed: u64,
    failed: u64,
    by_name: Vec<CheckLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryLine {
    verdict: String,
    iterations: u64,
    iteration_errors: u64,
    checks: Checks,
    metrics: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum JsonLine {
    #[serde(rename = "progress")]
    Progress,

    #[serde(rename = "summary")]
    Summary(SummaryLine),
}

#[tokio::test]
async fn reqres_scenario_passes_against_test_server() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let base_url = server.base_url().to_string();

    let scenario = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/scenarios/reqres.yaml");
    let export_dir = tempfile::tempdir()?;
    let export_path = export_dir.path().join("summary.json");
    let export_arg = export_path.clone();
    let exe = env!("CARGO_BIN_EXE_loadcheck");

    let out = tokio::task::spawn_blocking(move || {
        Command::new(exe)
            .arg("run")
            .arg(&scenario)
            .args(["--vus", "2", "--iterations", "4", "--output", "json"])
            .arg("--summary-export")
            .arg(&export_arg)
            .env("BASE_URL", &base_url)
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run loadcheck binary")?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        out.status.code() == Some(0),
        "expected exit code 0, got {:?}\nstdout:\n{stdout}\nstderr:\n{}",
        out.status.code(),
        String::from_utf8_lossy(&out.stderr)
    );

    let mut summary = None;
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let parsed: JsonLine =
            serde_json::from_str(line).with_context(|| format!("bad JSON line: {line}"))?;
        if let JsonLine::Summary(s) = parsed {
            summary = Some(s);
        }
    }
    let summary = summary.context("no summary line on stdout")?;

    assert_eq!(summary.verdict, "pass");
    assert_eq!(summary.iterations, 4);
    assert_eq!(summary.iteration_errors, 0);
    assert_eq!(summary.checks.failed, 0);
    assert_eq!(summary.checks.passed, 4 * 7);
    for check in &summary.checks.by_name {
        assert_eq!((check.passes, check.fails), (4, 0), "{}", check.name);
    }
    assert!(
        summary
            .checks
            .by_name
            .iter()
            .any(|c| c.name == "Reqres.in POST API/'name' value equal to request 'name'")
    );
    assert_eq!(summary.metrics["http_reqs"]["values"]["count"], 8.0);

    assert_eq!(server.stats().users_created(), 4);
    assert_eq!(server.stats().saw_json_content_type(), 4);
    server.shutdown().await;

    let export: serde_json::Value = serde_json::from_slice(&std::fs::read(&export_path)?)?;
    assert_eq!(export["state"]["verdict"], "pass");
    assert_eq!(
        export["metrics"]["http_req_duration"]["thresholds"]["p(95)<2000"]["ok"],
        true
    );
    Ok(())
}
