use churnlens_core::db::{Database, SchemaName, Table};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    events_csv: PathBuf,
    output_dir: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        let events_csv = seed_events_fixture(&base);

        Self {
            output_dir: base.join("output"),
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
            events_csv,
        }
    }

    fn schema_path(&self) -> PathBuf {
        self.xdg_data.join("churnlens/churn/churn_analytics.db")
    }

    fn open_db(&self) -> Database {
        Database::open_path(
            &self.schema_path(),
            SchemaName::parse("churn_analytics").expect("valid schema"),
        )
        .expect("failed to open db")
    }

    fn csv_arg(&self) -> String {
        self.events_csv.to_string_lossy().into_owned()
    }

    fn output_arg(&self) -> String {
        self.output_dir.to_string_lossy().into_owned()
    }
}

fn seed_events_fixture(base: &Path) -> PathBuf {
    let source = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../churnlens-core/tests/fixtures/sample_events.csv");
    let target = base.join("input/events.csv");

    fs::create_dir_all(target.parent().expect("missing fixture parent"))
        .expect("failed to create fixture directory");
    fs::copy(source, &target).expect("failed to copy events fixture");
    target
}

fn command(env: &CliTestEnv, bin_name: &str, args: &[&str]) -> Command {
    let bin_path = match bin_name {
        "churnlens-load" => PathBuf::from(assert_cmd::cargo::cargo_bin!("churnlens-load")),
        "churnlens-events" => PathBuf::from(assert_cmd::cargo::cargo_bin!("churnlens-events")),
        "churnlens-metrics" => PathBuf::from(assert_cmd::cargo::cargo_bin!("churnlens-metrics")),
        "churnlens-metric-qa" => {
            PathBuf::from(assert_cmd::cargo::cargo_bin!("churnlens-metric-qa"))
        }
        "churnlens-dataset" => PathBuf::from(assert_cmd::cargo::cargo_bin!("churnlens-dataset")),
        "churnlens-cleanup" => PathBuf::from(assert_cmd::cargo::cargo_bin!("churnlens-cleanup")),
        _ => panic!("unsupported binary in test harness: {bin_name}"),
    };

    let mut command = Command::new(bin_path);
    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("CHURN_DB")
        .env_remove("CHURN_DB_SCHEMA")
        .env_remove("CHURN_DATA_DIR");
    command
}

fn run_bin(env: &CliTestEnv, bin_name: &str, args: &[&str]) -> Output {
    command(env, bin_name, args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute {bin_name}: {e}"))
}

fn run_bin_with_input(env: &CliTestEnv, bin_name: &str, args: &[&str], input: &str) -> Output {
    let mut child = command(env, bin_name, args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("failed to spawn {bin_name}: {e}"));
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(input.as_bytes())
        .expect("failed to write stdin");
    child
        .wait_with_output()
        .unwrap_or_else(|e| panic!("failed to wait for {bin_name}: {e}"))
}

fn assert_success(bin_name: &str, args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "{bin_name} {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn run_ok(env: &CliTestEnv, bin_name: &str, args: &[&str]) -> String {
    let output = run_bin(env, bin_name, args);
    assert_success(bin_name, args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

const RANGE: [&str; 4] = ["--start-date", "2024-01-01", "--end-date", "2024-01-31"];

fn with_range<'a>(extra: &[&'a str]) -> Vec<&'a str> {
    let mut args: Vec<&str> = RANGE.to_vec();
    args.extend_from_slice(extra);
    args
}

#[test]
fn load_populates_event_store_and_is_rerunnable() {
    let env = CliTestEnv::new();
    let csv = env.csv_arg();

    let stdout = run_ok(&env, "churnlens-load", &[&csv]);
    assert!(
        stdout.contains("Rows inserted:    6"),
        "expected load summary in stdout, got:\n{stdout}"
    );

    let schema_path = env.schema_path();
    assert!(
        schema_path.exists(),
        "schema file should exist at {}",
        schema_path.display()
    );

    let stdout = run_ok(&env, "churnlens-load", &[&csv, "--batch-size", "2"]);
    assert!(stdout.contains("Rows inserted:    0"), "got:\n{stdout}");

    let db = env.open_db();
    assert_eq!(db.count_events().expect("count events"), 6);
    assert_eq!(db.count_event_types().expect("count types"), 3);
}

#[test]
fn load_reports_missing_columns() {
    let env = CliTestEnv::new();
    let bad = env.events_csv.with_file_name("bad.csv");
    fs::write(&bad, "account_id,when\nA,2024-01-01\n").expect("write bad csv");
    let bad_arg = bad.to_string_lossy().into_owned();

    let output = run_bin(&env, "churnlens-load", &[&bad_arg]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("missing required columns"),
        "expected column error, got:\n{stderr}"
    );
}

#[test]
fn full_pipeline_produces_dataset_and_stats() {
    let env = CliTestEnv::new();
    let csv = env.csv_arg();
    let out = env.output_arg();

    run_ok(&env, "churnlens-load", &[&csv]);

    let stdout = run_ok(
        &env,
        "churnlens-events",
        &with_range(&["--output-dir", &out, "--event-type", "login"]),
    );
    assert!(stdout.contains("3 of 3 event types"), "got:\n{stdout}");
    assert!(env
        .output_dir
        .join("events_per_account_per_month.csv")
        .exists());
    assert!(env.output_dir.join("login_events_per_day.csv").exists());

    let stdout = run_ok(&env, "churnlens-metrics", &with_range(&[]));
    assert!(
        stdout.contains("3 of 3 metrics calculated"),
        "got:\n{stdout}"
    );

    let stdout = run_ok(
        &env,
        "churnlens-metric-qa",
        &with_range(&["--output-dir", &out]),
    );
    assert!(stdout.contains("count_login"), "got:\n{stdout}");
    assert!(env.output_dir.join("metric_coverage.csv").exists());
    assert!(env
        .output_dir
        .join("count_login_stats_over_time.csv")
        .exists());

    let stdout = run_ok(&env, "churnlens-dataset", &["--output-dir", &out]);
    assert!(stdout.contains("(3 accounts)"), "got:\n{stdout}");

    let dataset = fs::read_to_string(env.output_dir.join("churn_dataset.csv"))
        .expect("dataset should be written");
    assert!(dataset.starts_with(
        "account_id,last_metric_time,count_login,count_purchase,count_support_ticket\n"
    ));
    assert!(dataset.contains("C,2024-02-01 00:00:00,0,0,1"));

    let stats = fs::read_to_string(env.output_dir.join("churn_dataset_summarystats.csv"))
        .expect("summary stats should be written");
    assert!(stats.starts_with("metric,count,nonzero,mean,std,skew,min,1pct"));
    assert_eq!(stats.lines().count(), 4);
}

#[test]
fn metrics_json_output_lists_runs() {
    let env = CliTestEnv::new();
    let csv = env.csv_arg();
    run_ok(&env, "churnlens-load", &[&csv]);

    let stdout = run_ok(
        &env,
        "churnlens-metrics",
        &with_range(&["--event-type", "login", "--format", "json"]),
    );
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("valid json");
    assert_eq!(report["succeeded"][0]["metric_name"], "count_login");
    assert_eq!(report["succeeded"][0]["rows_inserted"], 4);
    assert_eq!(report["failed"].as_array().map(Vec::len), Some(0));
}

#[test]
fn dataset_before_metrics_fails() {
    let env = CliTestEnv::new();
    let csv = env.csv_arg();
    let out = env.output_arg();
    run_ok(&env, "churnlens-load", &[&csv]);

    let output = run_bin(&env, "churnlens-dataset", &["--output-dir", &out]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("data not available"),
        "expected data availability error, got:\n{stderr}"
    );
}

#[test]
fn cleanup_respects_confirmation() {
    let env = CliTestEnv::new();
    let csv = env.csv_arg();
    let out = env.output_arg();
    run_ok(&env, "churnlens-load", &[&csv]);
    run_ok(&env, "churnlens-events", &with_range(&["--output-dir", &out]));

    let args = ["--output-dir", out.as_str()];
    let output = run_bin_with_input(&env, "churnlens-cleanup", &args, "n\n");
    assert_success("churnlens-cleanup", &args, &output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Cleanup cancelled."));
    assert!(env.open_db().table_exists(Table::Event).expect("table check"));
    assert!(env
        .output_dir
        .join("events_per_account_per_month.csv")
        .exists());

    let stdout = run_ok(&env, "churnlens-cleanup", &["--output-dir", &out, "--yes"]);
    assert!(stdout.contains("Cleanup complete: 2 tables dropped, 1 files removed."), "got:\n{stdout}");
    assert!(!env.open_db().table_exists(Table::Event).expect("table check"));
    assert!(!env.output_dir.exists());
}
