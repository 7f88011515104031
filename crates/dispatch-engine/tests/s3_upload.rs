//! Object-store pipeline tests: idempotent upload, verification, signaling
//! and auditing over a real directory layout.

use std::sync::Arc;

use dispatch_core::broker::MemoryBroker;
use dispatch_core::object_client::ObjectClient;
use dispatch_core::storage::S3Settings;
use dispatch_engine::config::{AuditSettings, BrokerSettings, RunLabels, S3UploadConfig};
use dispatch_engine::delivery::BrokerDelivery;
use dispatch_engine::outcome::{EXIT_FILES_FAILED, EXIT_OK, FailureReason, FileOutcome, RunReport};
use dispatch_engine::s3_upload::S3UploadPipeline;
use dispatch_test_utils::{
    TicketDir, TracingMemoryBackend, assert_guarded_statements, assert_no_control_files,
    assert_put_count, init_test_logging,
};

fn upload_config(dir: &TicketDir, audit: bool, signaling: Option<BrokerSettings>) -> S3UploadConfig {
    S3UploadConfig {
        labels: RunLabels {
            output_label: "out".into(),
            pod_level: "1".into(),
        },
        batch_dir: dir.source(),
        archive_dir: Some(dir.archive()),
        output_slot: "7".into(),
        s3: S3Settings {
            endpoint_url: "http://minio:9000".into(),
            bucket: "tickets".into(),
            access_key: "a".into(),
            secret_key: "s".into(),
        },
        destination_dir: "incoming".into(),
        audit: audit.then(|| AuditSettings {
            root: dir.audit(),
            scope: "ims".into(),
            label: "DISP".into(),
            timezone: chrono_tz::Europe::Paris,
            rewriter: Default::default(),
        }),
        signaling,
    }
}

fn signal_settings() -> BrokerSettings {
    BrokerSettings {
        bootstrap_servers: "memory".into(),
        client_id: "dispatcher".into(),
        username: None,
        password: None,
        topic: "signals-1".into(),
        partition: Some(1),
        num_partitions: None,
        consumer_group: None,
    }
}

async fn run_once(
    config: &S3UploadConfig,
    storage: &TracingMemoryBackend,
    broker: Option<&MemoryBroker>,
) -> RunReport {
    let objects = ObjectClient::new(Arc::new(storage.clone()));
    let signaling = match (broker, &config.signaling) {
        (Some(broker), Some(settings)) => {
            Some(BrokerDelivery::new(Arc::new(broker.clone()), settings))
        }
        _ => None,
    };
    S3UploadPipeline::new(config, objects, signaling)
        .run()
        .await
        .expect("batch directory listed")
}

#[tokio::test]
async fn uploads_verifies_audits_and_archives() {
    init_test_logging();
    let dir = TicketDir::new();
    dir.write_ticket("batch1.txt", &["t1", "t2", "t3"]);
    let storage = TracingMemoryBackend::new();
    let config = upload_config(&dir, true, None);

    let report = run_once(&config, &storage, None).await;

    assert_eq!(report.exit_code(), EXIT_OK);
    assert_eq!(report.delivered(), 1);
    assert_eq!(
        storage.content("incoming/batch1.txt").as_deref(),
        Some(&b"t1\nt2\nt3\n"[..])
    );
    assert!(dir.source_entries().is_empty());
    assert_eq!(dir.archive_entries(), vec!["batch1.txt"]);

    let log = dir.audit_log("batch1.txt", "DISP").expect("audit log written");
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("DISP_NUM=3"));
    assert!(log.contains("DISP_SLOT=7"));
    assert!(log.contains("SCOPE='ims' and FILE_NAME='batch1.txt'"));
    assert_guarded_statements(&log, "DISP");
}

#[tokio::test]
async fn existing_upload_marker_skips_the_upload() {
    let dir = TicketDir::new();
    let ticket = dir.write_ticket("a.txt", &["x"]);
    std::fs::write(format!("{}.ctrl.doneS3", ticket.display()), "").unwrap();
    let storage = TracingMemoryBackend::new();
    let config = upload_config(&dir, false, None);

    let report = run_once(&config, &storage, None).await;

    assert_eq!(report.delivered(), 1);
    assert_put_count(&storage, 0);
    assert_eq!(dir.archive_entries(), vec!["a.txt"]);
    assert_no_control_files(&dir.source());
}

#[tokio::test]
async fn second_run_never_reuploads() {
    let dir = TicketDir::new();
    dir.write_ticket("a.txt", &["x", "y"]);
    let storage = TracingMemoryBackend::new();
    let broker = MemoryBroker::new().with_topic("signals-1", 2);
    broker.fail_produce_after(0);
    let config = upload_config(&dir, false, Some(signal_settings()));

    let first = run_once(&config, &storage, Some(&broker)).await;
    assert_eq!(first.exit_code(), EXIT_FILES_FAILED);
    assert_eq!(dir.source_entries(), vec!["a.txt", "a.txt.ctrl.doneS3"]);

    broker.clear_failures();
    let second = run_once(&config, &storage, Some(&broker)).await;

    assert_eq!(second.exit_code(), EXIT_OK);
    assert_put_count(&storage, 1);
    assert_eq!(broker.produce_count(), 1);
    assert!(dir.source_entries().is_empty());
    assert_eq!(dir.archive_entries(), vec!["a.txt"]);
}

#[tokio::test]
async fn checksum_mismatch_leaves_file_untouched() {
    let dir = TicketDir::new();
    dir.write_ticket("bad.txt", &["x"]);
    let storage = TracingMemoryBackend::new();
    storage.corrupt_reads("incoming/bad.txt");
    let config = upload_config(&dir, true, None);

    let report = run_once(&config, &storage, None).await;

    assert_eq!(report.exit_code(), EXIT_FILES_FAILED);
    assert!(matches!(
        report.files()[0].outcome,
        FileOutcome::Failed(FailureReason::Integrity { .. })
    ));
    assert_eq!(dir.source_entries(), vec!["bad.txt"]);
    assert!(dir.archive_entries().is_empty());
    assert!(dir.audit_log("bad.txt", "DISP").is_none());
}

#[tokio::test]
async fn store_failure_is_reported_and_retried_next_run() {
    let dir = TicketDir::new();
    dir.write_ticket("a.txt", &["x"]);
    let storage = TracingMemoryBackend::new();
    storage.inject_failure("incoming/");
    let config = upload_config(&dir, false, None);

    let first = run_once(&config, &storage, None).await;
    assert!(matches!(
        first.files()[0].outcome,
        FileOutcome::Failed(FailureReason::Delivery(_))
    ));
    assert_eq!(dir.source_entries(), vec!["a.txt"]);

    storage.clear_failures();
    let second = run_once(&config, &storage, None).await;
    assert_eq!(second.delivered(), 1);
    assert!(dir.source_entries().is_empty());
}

#[tokio::test]
async fn signals_file_name_after_upload() {
    let dir = TicketDir::new();
    dir.write_ticket("b.txt", &["x"]);
    let storage = TracingMemoryBackend::new();
    let broker = MemoryBroker::new().with_topic("signals-1", 2);
    let config = upload_config(&dir, true, Some(signal_settings()));

    let report = run_once(&config, &storage, Some(&broker)).await;

    assert_eq!(report.exit_code(), EXIT_OK);
    let produced = broker.produced();
    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].partition, 1);
    assert_eq!(&produced[0].value[..], br#"{"FilePath":"b.txt"}"#);

    let log = dir.audit_log("b.txt", "DISP").expect("audit log written");
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("DISP_KPART=1"));
    assert!(lines[1].contains("DISP_KIDX=1"));
    assert!(!lines[1].contains("is NULL"));
    assert_no_control_files(&dir.source());
}

#[tokio::test]
async fn files_are_processed_oldest_first() {
    let dir = TicketDir::new();
    dir.write_tickets_in_order(&[("z.txt", &["1"][..]), ("a.txt", &["2"][..])]);
    let storage = TracingMemoryBackend::new();
    let config = upload_config(&dir, false, None);

    let report = run_once(&config, &storage, None).await;

    let order: Vec<String> = report
        .files()
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(order, vec!["z.txt", "a.txt"]);
}

#[tokio::test]
async fn delivered_file_is_deleted_without_archive_dir() {
    let dir = TicketDir::new();
    dir.write_ticket("a.txt", &["x"]);
    let storage = TracingMemoryBackend::new();
    let mut config = upload_config(&dir, false, None);
    config.archive_dir = None;

    let report = run_once(&config, &storage, None).await;

    assert_eq!(report.delivered(), 1);
    assert!(dir.source_entries().is_empty());
    assert!(!dir.archive().exists());
    assert_eq!(storage.paths(), vec!["incoming/a.txt"]);
}
