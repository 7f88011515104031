//! Bulk broker pipeline tests: resumable line cursor, partition routing and
//! finalization.

use std::sync::Arc;

use dispatch_core::broker::MemoryBroker;
use dispatch_engine::config::{AuditSettings, BrokerSettings, KafkaUploadConfig, RunLabels};
use dispatch_engine::delivery::BrokerDelivery;
use dispatch_engine::kafka_upload::KafkaUploadPipeline;
use dispatch_engine::outcome::{EXIT_FILES_FAILED, EXIT_OK, FailureReason, FileOutcome, RunReport};
use dispatch_test_utils::{
    TicketDir, assert_guarded_statements, assert_no_control_files, init_test_logging,
};

fn broker_settings(
    partition: Option<i32>,
    num_partitions: Option<u32>,
    consumer_group: Option<&str>,
) -> BrokerSettings {
    BrokerSettings {
        bootstrap_servers: "memory".into(),
        client_id: "dispatcher".into(),
        username: Some("user".into()),
        password: Some("secret".into()),
        topic: "tickets-2".into(),
        partition,
        num_partitions,
        consumer_group: consumer_group.map(str::to_string),
    }
}

fn bulk_config(dir: &TicketDir, broker: BrokerSettings) -> KafkaUploadConfig {
    KafkaUploadConfig {
        labels: RunLabels {
            output_label: "out".into(),
            pod_level: "1".into(),
        },
        batch_dir: dir.source(),
        archive_dir: Some(dir.archive()),
        output_slot: "4".into(),
        broker,
        audit: Some(AuditSettings {
            root: dir.audit(),
            scope: "ims".into(),
            label: "BULK".into(),
            timezone: chrono_tz::Europe::Paris,
            rewriter: Default::default(),
        }),
    }
}

async fn run_once(config: &KafkaUploadConfig, broker: &MemoryBroker) -> RunReport {
    let delivery = BrokerDelivery::new(Arc::new(broker.clone()), &config.broker);
    KafkaUploadPipeline::new(config, delivery)
        .run()
        .await
        .expect("batch directory listed")
}

fn values(broker: &MemoryBroker) -> Vec<String> {
    broker
        .produced()
        .iter()
        .map(|m| String::from_utf8_lossy(&m.value).into_owned())
        .collect()
}

#[tokio::test]
async fn sends_every_line_and_archives_with_timestamp() {
    init_test_logging();
    let dir = TicketDir::new();
    dir.write_ticket("batch1.txt", &["t1", "t2", "t3"]);
    let broker = MemoryBroker::new().with_topic("tickets-2", 3);
    let config = bulk_config(&dir, broker_settings(Some(2), None, None));

    let report = run_once(&config, &broker).await;

    assert_eq!(report.exit_code(), EXIT_OK);
    assert_eq!(values(&broker), vec!["t1", "t2", "t3"]);
    assert!(broker.produced().iter().all(|m| m.partition == 2));
    assert!(dir.source_entries().is_empty());

    let archived = dir.archive_entries();
    assert_eq!(archived.len(), 1);
    let suffix = archived[0].strip_prefix("batch1.txt.").expect("timestamp suffix");
    assert!(suffix.parse::<u64>().is_ok(), "unexpected archive name {}", archived[0]);

    let log = dir.audit_log("batch1.txt", "BULK").expect("audit log written");
    assert!(log.contains("BULK_NUM=3"));
    assert!(log.contains("BULK_SLOT=4"));
    assert!(log.contains("BULK_KPART=2"));
    assert!(log.contains("BULK_KIDX=2"));
    assert_guarded_statements(&log, "BULK");
}

#[tokio::test]
async fn resumes_after_the_last_acknowledged_line() {
    let dir = TicketDir::new();
    let ticket = dir.write_ticket("bulk.txt", &["l1", "l2", "l3", "l4", "l5"]);
    let broker = MemoryBroker::new().with_topic("tickets-2", 1);
    broker.fail_produce_after(2);
    let config = bulk_config(&dir, broker_settings(Some(0), None, None));

    let first = run_once(&config, &broker).await;
    assert_eq!(first.exit_code(), EXIT_FILES_FAILED);
    assert!(matches!(
        first.files()[0].outcome,
        FileOutcome::Failed(FailureReason::Delivery(_))
    ));
    let cursor = std::fs::read_to_string(format!("{}.ctrl.kafka", ticket.display())).unwrap();
    assert_eq!(cursor.trim(), "2");
    assert!(dir.audit_log("bulk.txt", "BULK").is_none());

    broker.clear_failures();
    let second = run_once(&config, &broker).await;

    assert_eq!(second.exit_code(), EXIT_OK);
    assert_eq!(values(&broker), vec!["l1", "l2", "l3", "l4", "l5"]);
    assert!(dir.source_entries().is_empty());
    assert_no_control_files(&dir.source());
    assert_eq!(dir.archive_entries().len(), 1);

    let log = dir.audit_log("bulk.txt", "BULK").expect("audit log written");
    assert!(log.contains("BULK_NUM=3"));
}

#[tokio::test]
async fn routes_to_least_lagged_partition() {
    let dir = TicketDir::new();
    dir.write_tickets_in_order(&[("a.txt", &["1", "2"][..]), ("b.txt", &["3"][..])]);
    let broker = MemoryBroker::new().with_topic("tickets-2", 3);
    for partition in 0..3 {
        broker.preload("tickets-2", partition, 10);
    }
    broker.commit("ingest", "tickets-2", 0, 2);
    broker.commit("ingest", "tickets-2", 1, 9);
    broker.commit("ingest", "tickets-2", 2, 5);
    let config = bulk_config(&dir, broker_settings(None, Some(3), Some("ingest")));

    let report = run_once(&config, &broker).await;

    assert_eq!(report.delivered(), 2);
    let produced = broker.produced();
    assert_eq!(produced.len(), 3);
    assert!(produced.iter().all(|m| m.partition == 1));
}

#[tokio::test]
async fn falls_back_to_random_partition_without_lag_data() {
    let dir = TicketDir::new();
    dir.write_ticket("a.txt", &["1", "2", "3"]);
    let broker = MemoryBroker::new().with_topic("tickets-2", 3);
    broker.fail_metadata();
    let config = bulk_config(&dir, broker_settings(None, Some(3), Some("ingest")));

    let report = run_once(&config, &broker).await;

    assert_eq!(report.delivered(), 1);
    let produced = broker.produced();
    assert_eq!(produced.len(), 3);
    let first = produced[0].partition;
    assert!((0..3).contains(&first));
    assert!(produced.iter().all(|m| m.partition == first));
}

#[tokio::test]
async fn no_partition_source_fails_the_file() {
    let dir = TicketDir::new();
    dir.write_ticket("a.txt", &["1"]);
    let broker = MemoryBroker::new().with_topic("tickets-2", 3);
    let config = bulk_config(&dir, broker_settings(None, None, None));

    let report = run_once(&config, &broker).await;

    assert_eq!(report.exit_code(), EXIT_FILES_FAILED);
    assert_eq!(broker.produce_count(), 0);
    assert_eq!(dir.source_entries(), vec!["a.txt"]);
}

#[tokio::test]
async fn reading_stops_at_first_empty_line() {
    let dir = TicketDir::new();
    std::fs::write(dir.source().join("gap.txt"), "a\nb\n\nc\n").unwrap();
    let broker = MemoryBroker::new().with_topic("tickets-2", 1);
    let config = bulk_config(&dir, broker_settings(Some(0), None, None));

    let report = run_once(&config, &broker).await;

    assert_eq!(report.delivered(), 1);
    assert_eq!(values(&broker), vec!["a", "b"]);
    assert!(dir.source_entries().is_empty());
}

#[tokio::test]
async fn file_is_deleted_without_archive_dir() {
    let dir = TicketDir::new();
    dir.write_ticket("a.txt", &["1"]);
    let broker = MemoryBroker::new().with_topic("tickets-2", 1);
    let mut config = bulk_config(&dir, broker_settings(Some(0), None, None));
    config.archive_dir = None;
    config.audit = None;

    let report = run_once(&config, &broker).await;

    assert_eq!(report.delivered(), 1);
    assert!(dir.source_entries().is_empty());
    assert!(!dir.archive().exists());
    assert!(dir.audit_log("a.txt", "BULK").is_none());
}
