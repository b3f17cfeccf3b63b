use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use txt2sqlite::LoadError;
use txt2sqlite::config::LoadOptions;
use txt2sqlite::ingestion::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionRun, IngestionSeverity,
    IngestionStats,
};

#[derive(Default)]
struct RecordingObserver {
    started: Mutex<Vec<PathBuf>>,
    loaded: Mutex<Vec<usize>>,
    failures: Mutex<Vec<IngestionSeverity>>,
    alerts: Mutex<Vec<IngestionSeverity>>,
}

impl IngestionObserver for RecordingObserver {
    fn on_start(&self, ctx: &IngestionContext) {
        self.started.lock().unwrap().push(ctx.path.clone());
    }

    fn on_success(&self, _ctx: &IngestionContext, stats: &IngestionStats) {
        self.loaded.lock().unwrap().push(stats.rows_imported());
    }

    fn on_failure(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &LoadError) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &LoadError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

fn tmp_file(name: &str, ext: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("txt2sqlite-{name}-{nanos}.{ext}"))
}

#[test]
fn observer_receives_failure_and_alert_on_critical_io_error() {
    let obs = Arc::new(RecordingObserver::default());
    let db = tmp_file("io", "db");
    let run = IngestionRun::new(
        &db,
        vec![PathBuf::from("tests/fixtures/does_not_exist.txt")],
        LoadOptions::default(),
    )
    .with_observer(obs.clone());

    // Missing file -> Io error -> Critical, but the run itself completes.
    let summary = run.run().unwrap();
    assert_eq!(summary.failed.len(), 1);

    assert_eq!(obs.started.lock().unwrap().len(), 1);
    assert_eq!(obs.failures.lock().unwrap().clone(), vec![IngestionSeverity::Critical]);
    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![IngestionSeverity::Critical]);
    let _ = std::fs::remove_file(db);
}

#[test]
fn observer_receives_failure_without_alert_for_non_critical_error() {
    let obs = Arc::new(RecordingObserver::default());
    let db = tmp_file("schema", "db");
    let opts = LoadOptions {
        column_line: 10,
        format_line: 11,
        ..Default::default()
    };
    let run = IngestionRun::new(&db, vec![PathBuf::from("tests/fixtures/no_header.txt")], opts)
        .with_observer(obs.clone());

    // Data before the header -> SchemaMissing -> Error severity (not Critical) -> no alert.
    run.run().unwrap();

    assert_eq!(obs.failures.lock().unwrap().clone(), vec![IngestionSeverity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
    let _ = std::fs::remove_file(db);
}

#[test]
fn unavailable_store_stops_the_run_with_an_alert() {
    let obs = Arc::new(RecordingObserver::default());
    let db = PathBuf::from("/definitely/not/a/dir/txt2sqlite.db");
    let run = IngestionRun::new(
        &db,
        vec![
            PathBuf::from("tests/fixtures/people.txt"),
            PathBuf::from("tests/fixtures/people_more.txt"),
        ],
        LoadOptions::default(),
    )
    .with_observer(obs.clone());

    let err = run.run().unwrap_err();
    assert!(matches!(err, LoadError::StoreUnavailable(_)), "{err}");
    // The second file is never started.
    assert_eq!(obs.started.lock().unwrap().len(), 1);
    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![IngestionSeverity::Critical]);
}

#[test]
fn composite_observer_fans_out_and_file_observer_appends() {
    let recorder = Arc::new(RecordingObserver::default());
    let log = tmp_file("observer", "log");
    let db = tmp_file("observer", "db");
    let observers: Vec<Arc<dyn IngestionObserver>> = vec![recorder.clone(), Arc::new(FileObserver::new(&log))];
    let composite = CompositeObserver::new(observers);

    let run = IngestionRun::new(
        &db,
        vec![
            PathBuf::from("tests/fixtures/people.txt"),
            PathBuf::from("tests/fixtures/does_not_exist.txt"),
        ],
        LoadOptions::default(),
    )
    .with_observer(Arc::new(composite));
    run.run().unwrap();

    assert_eq!(recorder.loaded.lock().unwrap().clone(), vec![3]);
    assert_eq!(recorder.failures.lock().unwrap().len(), 1);

    let written = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 5, "{written}");
    assert!(lines[0].contains(" start "));
    assert!(lines[1].contains(" ok ") && lines[1].contains("imported=3") && lines[1].contains(" batch_s="));
    assert!(lines[2].contains(" start "));
    assert!(lines[3].contains(" fail severity=Critical"));
    assert!(lines[4].contains(" ALERT "));

    let _ = std::fs::remove_file(log);
    let _ = std::fs::remove_file(db);
}
