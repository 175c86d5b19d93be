//! Ticket migration integration tests
//!
//! Exercises the full dependency cascade against real SQLite files: a
//! read-only legacy database on one side, the engine-owned target on the
//! other.

mod common;

use chrono::Utc;
use common::{ts, Fixture};
use ticketport::error::MigrateError;
use ticketport::migrate::report::Reporter;
use ticketport::migrate::ticket::{TicketMigration, TicketMigrator};
use ticketport::models::{Ticket, TicketFilter};
use ticketport::source::SourceDb;
use ticketport::store::RecordKind;
use uuid::Uuid;

const CAP: usize = 4;

fn migrator(fx: &Fixture) -> TicketMigrator<'_> {
    TicketMigrator::new(&fx.source, &fx.store, CAP)
}

#[tokio::test]
async fn migrate_one_cascades_through_classification_and_category() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    fx.seed_ticket(100, 10, "Screen cracked");

    let outcome = migrator(&fx).migrate_one(100).await.unwrap();
    let ticket = match outcome {
        TicketMigration::Migrated(t) => t,
        other => panic!("expected Migrated, got {}", other.status()),
    };

    assert_eq!(ticket.source_ref, Some(100));
    assert_eq!(ticket.title, "Screen cracked");
    assert_eq!(ticket.issue_number.as_deref(), Some("ISS-100"));

    let classification = fx.store.classification_by_ref(10).unwrap().unwrap();
    assert_eq!(ticket.classification_id, classification.id);
    assert_eq!(classification.name, "Broken screen");

    // The legacy type table keeps the human-facing label in its description
    // column; the migrated category surfaces it as the name.
    let category = fx.store.category(&classification.category_id).unwrap().unwrap();
    assert_eq!(category.name, "Hardware");
    assert_eq!(category.description, "hw");
    assert_eq!(category.source_ref, 1);
}

#[tokio::test]
async fn migrate_one_is_idempotent() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    fx.seed_ticket(100, 10, "Screen cracked");

    let m = migrator(&fx);
    let first = m.migrate_one(100).await.unwrap();
    let second = m.migrate_one(100).await.unwrap();

    assert_eq!(first.status(), "migrated");
    assert_eq!(second.status(), "already_exists");
    assert_eq!(
        first.ticket().unwrap().id,
        second.ticket().unwrap().id,
        "re-run must return the original row"
    );
    assert_eq!(fx.store.count(RecordKind::Ticket).unwrap(), 1);
}

#[tokio::test]
async fn migrate_one_reports_missing_source() {
    let fx = Fixture::new();
    let outcome = migrator(&fx).migrate_one(999).await.unwrap();
    assert!(matches!(outcome, TicketMigration::NotFound));
}

#[tokio::test]
async fn disabled_source_fails_fast() {
    let fx = Fixture::with_source_enabled(false);
    let err = migrator(&fx).migrate_one(1).await.unwrap_err();
    assert!(matches!(err, MigrateError::SourceDisabled));
}

#[test]
fn disabled_source_never_opens_the_database() {
    let temp = tempfile::TempDir::new().unwrap();
    // The path does not exist; with the gate off that must not matter.
    let source = SourceDb::open(&temp.path().join("missing.db"), false).unwrap();
    let err = source.ticket(1).unwrap_err();
    assert!(matches!(err, MigrateError::SourceDisabled));
    assert!(!temp.path().join("missing.db").exists());
}

#[tokio::test]
async fn cascade_backfills_sibling_classifications() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    fx.seed_classification(11, "Dead battery", 1);
    fx.seed_classification(12, "Water damage", 1);
    fx.seed_ticket(100, 10, "Screen cracked");

    migrator(&fx).migrate_one(100).await.unwrap();

    assert_eq!(fx.store.count(RecordKind::Classification).unwrap(), 3);
    assert!(fx.store.classification_by_ref(11).unwrap().is_some());
    assert!(fx.store.classification_by_ref(12).unwrap().is_some());
    assert_eq!(fx.store.count(RecordKind::Ticket).unwrap(), 1);
}

#[tokio::test]
async fn batch_migrates_only_missing_tickets() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    for id in 100..106 {
        fx.seed_ticket(id, 10, &format!("ticket {id}"));
    }

    let m = migrator(&fx);
    m.migrate_one(100).await.unwrap();
    m.migrate_one(101).await.unwrap();

    let outcome = m.migrate_batch(&TicketFilter::default()).await.unwrap();
    assert!(outcome.is_clean());
    assert_eq!(outcome.migrated(), 4);
    assert_eq!(fx.store.count(RecordKind::Ticket).unwrap(), 6);
}

#[tokio::test]
async fn batch_isolates_per_ticket_failures() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    for id in 100..104 {
        fx.seed_ticket(id, 10, &format!("ticket {id}"));
    }
    // Dangling classification reference: this row fails, the rest land.
    fx.seed_ticket(104, 99, "orphan");

    let outcome = migrator(&fx)
        .migrate_batch(&TicketFilter::default())
        .await
        .unwrap();

    assert_eq!(outcome.migrated(), 4);
    assert_eq!(outcome.failures(), 1);
    let (failed, err) = &outcome.failed[0];
    assert_eq!(failed.id, 104);
    assert!(matches!(
        err,
        MigrateError::SourceNotFound {
            kind: "classification",
            id: 99
        }
    ));
    assert!(fx.store.ticket_by_ref(104).unwrap().is_none());
}

#[tokio::test]
async fn batch_filter_narrows_selection() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    fx.seed_classification(11, "Dead battery", 1);
    fx.seed_ticket_at(100, 10, "old screen", "2024-01-15T09:00:00+00:00");
    fx.seed_ticket_at(101, 11, "old battery", "2024-02-15T09:00:00+00:00");
    fx.seed_ticket_at(102, 10, "new screen", "2025-06-01T09:00:00+00:00");

    let m = migrator(&fx);

    let by_class = TicketFilter {
        classification_id: Some(11),
        ..Default::default()
    };
    let outcome = m.migrate_batch(&by_class).await.unwrap();
    assert_eq!(outcome.migrated(), 1);
    assert!(fx.store.ticket_by_ref(101).unwrap().is_some());
    assert!(fx.store.ticket_by_ref(100).unwrap().is_none());

    let by_date = TicketFilter {
        date_from: Some(ts("2025-01-01T00:00:00+00:00")),
        ..Default::default()
    };
    let outcome = m.migrate_batch(&by_date).await.unwrap();
    assert_eq!(outcome.migrated(), 1);
    assert!(fx.store.ticket_by_ref(102).unwrap().is_some());
    assert!(fx.store.ticket_by_ref(100).unwrap().is_none());
}

#[test]
fn exclusion_list_can_exceed_bound_variable_limits() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    for id in 100..103 {
        fx.seed_ticket(id, 10, &format!("ticket {id}"));
    }

    // Far beyond SQLite's bound-variable limit; excludes 100 and 102.
    let exclude: Vec<i64> = (0..40_000).filter(|id| *id != 101).collect();
    let rows = fx
        .source
        .tickets_matching(&TicketFilter::default(), &exclude)
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 101);
}

#[tokio::test]
async fn update_one_refreshes_from_source() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    fx.seed_ticket(100, 10, "Screen cracked");

    let m = migrator(&fx);
    let migrated = m.migrate_one(100).await.unwrap();
    let local_id = migrated.ticket().unwrap().id.clone();

    fx.legacy()
        .execute(
            "UPDATE tickets SET title = 'Screen replaced', issue_number = 'ISS-100-R'
             WHERE id = 100",
            [],
        )
        .unwrap();

    let refreshed = m.update_one(&local_id).await.unwrap();
    assert_eq!(refreshed.id, local_id);
    assert_eq!(refreshed.title, "Screen replaced");
    assert_eq!(refreshed.issue_number.as_deref(), Some("ISS-100-R"));

    let stored = fx.store.ticket(&local_id).unwrap().unwrap();
    assert_eq!(stored.title, "Screen replaced");
    assert_eq!(fx.store.count(RecordKind::Ticket).unwrap(), 1);
}

#[tokio::test]
async fn update_one_rejects_unlinked_ticket() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    fx.seed_ticket(100, 10, "Screen cracked");

    let m = migrator(&fx);
    let migrated = m.migrate_one(100).await.unwrap();
    let classification_id = migrated.ticket().unwrap().classification_id.clone();

    // A locally-authored ticket carries no source reference.
    let now = Utc::now();
    let local = Ticket {
        id: Uuid::new_v4().to_string(),
        source_ref: None,
        classification_id,
        title: "local only".into(),
        description: None,
        estimated_date: None,
        classification_date: None,
        issue_number: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    fx.store.insert_ticket(&local).unwrap();

    let err = m.update_one(&local.id).await.unwrap_err();
    assert!(matches!(err, MigrateError::NotLinked { kind: "ticket", .. }));
}

#[tokio::test]
async fn update_one_rejects_unknown_local_id() {
    let fx = Fixture::new();
    let err = migrator(&fx).update_one("no-such-id").await.unwrap_err();
    assert!(matches!(
        err,
        MigrateError::TargetNotFound { kind: "ticket", .. }
    ));
}

#[tokio::test]
async fn reconciliation_counts_pending_work() {
    let fx = Fixture::new();
    fx.seed_category(1, "hw", "Hardware");
    fx.seed_classification(10, "Broken screen", 1);
    for id in 100..103 {
        fx.seed_ticket(id, 10, &format!("ticket {id}"));
    }

    migrator(&fx).migrate_one(100).await.unwrap();

    let report = Reporter::new(&fx.source, &fx.store)
        .reconcile(RecordKind::Ticket)
        .unwrap();
    assert_eq!(report.source_total, 3);
    assert_eq!(report.target_total, 1);
    assert_eq!(report.migrated, 1);
    assert_eq!(report.pending, 2);

    let all = Reporter::new(&fx.source, &fx.store).reconcile_all().unwrap();
    assert_eq!(all.len(), RecordKind::ALL.len());
}
