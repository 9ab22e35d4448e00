//! Event Sourcing Integration Tests
//!
//! The complete local flow through the public API:
//! - Actions recorded, replayed after reopen
//! - Compaction of a long history and equivalence with full replay
//! - Snapshot recovery from backup
//! - Export after compaction, import into a fresh device
//! - Migration from the legacy flat-state format

use std::fs;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use life_ledger::event_store::EventStoreConfig;
use life_ledger::types::{Difficulty, DurationClass, GoalState, ResultTier};
use life_ledger::{
    derive_state, FakeClock, Ledger, LedgerConfig, MemoryAuthority, NewGoal, RemoteAuthority,
    SyncMode, SyncOutcome, SyncService,
};

fn clock() -> FakeClock {
    FakeClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
}

fn open(dir: &TempDir, clock: &FakeClock) -> Ledger {
    let mut config = LedgerConfig::with_data_dir(dir.path());
    config.device = "it-device".to_string();
    Ledger::open_with_clock(config, Arc::new(clock.clone())).expect("open ledger")
}

fn service(ledger: Ledger, authority: &Arc<MemoryAuthority>) -> SyncService {
    let remote: Arc<dyn RemoteAuthority> = authority.clone();
    SyncService::new(ledger.into_shared(), remote)
}

#[test]
fn test_goal_lifecycle_scenarios() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let mut ledger = open(&dir, &clock);

    // Start a goal costing 8 with 10 available
    let novel = ledger
        .start_goal(NewGoal::new("Novel draft", DurationClass::Month, Difficulty::Hard))
        .unwrap();
    assert_eq!(ledger.counters().available, 2);
    assert_eq!(ledger.goal(&novel).unwrap().state, GoalState::Active);

    // Conclude it with the top tier
    clock.advance(Duration::days(25));
    ledger.conclude_goal(&novel, ResultTier::Exceeded).unwrap();
    let counters = ledger.counters();
    assert_eq!(counters.available, 10);
    assert_eq!(counters.capacity, 12);

    // Abandon another goal costing 8
    let marathon = ledger
        .start_goal(NewGoal::new("Marathon", DurationClass::Month, Difficulty::Hard))
        .unwrap();
    ledger.nurture_goal(&marathon, "long run").unwrap();
    clock.advance(Duration::days(1));
    ledger.abandon_goal(&marathon).unwrap();
    assert_eq!(ledger.counters().available, 4);
    let abandoned = ledger.goal(&marathon).unwrap();
    assert_eq!(abandoned.state, GoalState::Abandoned);
    assert_eq!(abandoned.nurtures.len(), 1);

    // Nurture twice in one daily window
    let stretch = ledger
        .start_goal(NewGoal::new("Stretch", DurationClass::Week, Difficulty::Easy))
        .unwrap();
    ledger.nurture_goal(&stretch, "am").unwrap();
    assert!(ledger.nurture_gate(&stretch).is_exhausted());
    ledger.nurture_goal(&stretch, "pm").unwrap();
    assert_eq!(ledger.goal(&stretch).unwrap().nurtures.len(), 2);

    // Everything survives a reopen
    let before = ledger.state();
    ledger.close();
    let ledger = open(&dir, &clock);
    assert_eq!(*ledger.state(), *before);
    assert!(ledger.diagnostics().is_clean());
}

#[tokio::test]
async fn test_long_history_compacts_and_matches_full_replay() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let authority = Arc::new(MemoryAuthority::new());
    let service = service(open(&dir, &clock), &authority);

    {
        let mut ledger = service.ledger().lock();
        let goal = ledger
            .start_goal(NewGoal::new("Daily pages", DurationClass::Year, Difficulty::Easy))
            .unwrap();
        for day in 0..599 {
            ledger.nurture_goal(&goal, format!("page {day}")).unwrap();
            clock.advance(Duration::days(1));
        }
        assert_eq!(ledger.log().len(), 600);
    }

    let SyncOutcome::Completed(report) = service.sync().await.unwrap() else {
        panic!("no other sync was running");
    };
    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.pushed, 600);
    assert!(report.compacted.is_some());

    let ledger = service.ledger().lock();
    let snapshot = ledger.snapshot().expect("compacted");
    assert_eq!(snapshot.compacted_event_count as usize + ledger.log().len(), 600);
    assert!(ledger.log().len() < 500);
    assert_eq!(*ledger.state(), derive_state(&authority.events(), None));
    assert_eq!(ledger.stats().total_events(), 600);

    // Export stays complete after compaction
    let export = ledger.export().unwrap();
    assert_eq!(export.events.len(), 600);
    let rederived = derive_state(&export.events, None);
    assert_eq!(rederived.goals, ledger.state().goals);
    assert_eq!(rederived.counters, ledger.state().counters);
    assert_eq!(rederived.activity_days, ledger.state().activity_days);
}

#[tokio::test]
async fn test_unreadable_snapshot_recovers_through_full_sync() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let authority = Arc::new(MemoryAuthority::new());
    let service = service(open(&dir, &clock), &authority);

    let mut compactions = 0;
    for round in 0..2 {
        {
            let mut ledger = service.ledger().lock();
            for day in 0..30 {
                ledger.record_reflection("health", format!("round {round} day {day}"), None).unwrap();
                clock.advance(Duration::days(1));
            }
        }
        service.sync().await.unwrap();
        if service.ledger().lock().compact_now().unwrap().is_some() {
            compactions += 1;
        }
    }
    assert_eq!(compactions, 2);
    drop(service);

    let config = EventStoreConfig::new(dir.path());
    assert!(config.previous_snapshot_path().exists());
    fs::write(config.snapshot_path(), "{\"version\": 1, \"trunc").unwrap();

    let ledger = open(&dir, &clock);
    assert!(ledger.snapshot().is_some(), "backup loaded");
    assert_eq!(ledger.sync_state().cache_version, None);

    let service = self::service(ledger, &authority);
    let SyncOutcome::Completed(report) = service.sync().await.unwrap() else {
        panic!("no other sync was running");
    };
    assert_eq!(report.mode, SyncMode::Full);

    let ledger = service.ledger().lock();
    assert_eq!(ledger.state().reflections.len(), 60);
    assert_eq!(ledger.state().goals, derive_state(&authority.events(), None).goals);
}

#[test]
fn test_export_import_into_fresh_device() {
    let source_dir = TempDir::new().unwrap();
    let clock = clock();
    let mut source = open(&source_dir, &clock);
    let home = source.create_grouping("Home", None).unwrap();
    let goal = source
        .start_goal(NewGoal::new("Paint fence", DurationClass::Week, Difficulty::Moderate).in_grouping(home.clone()))
        .unwrap();
    source.nurture_goal(&goal, "sanded").unwrap();
    source
        .relabel_node(life_ledger::types::NodeRef::grouping(&home), Some("House".to_string()), None)
        .unwrap();
    let path = source_dir.path().join("export.json");
    source.export_to(&path).unwrap();

    let target_dir = TempDir::new().unwrap();
    let mut target = open(&target_dir, &clock);
    assert_eq!(target.import_from(&path).unwrap(), 4);

    assert_eq!(target.state().goals, source.state().goals);
    assert_eq!(target.state().groupings, source.state().groupings);
    assert_eq!(target.goals_in(Some(home.as_str())).len(), 1);
}

#[test]
fn test_legacy_migration_matches_entity_counts() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let mut ledger = open(&dir, &clock);
    let legacy = json!({
        "version": 1,
        "capacity": 11,
        "available": 5,
        "groupings": [
            {"id": "health", "name": "Health", "createdAt": "2022-03-01T08:00:00Z"},
            {"id": "fitness", "name": "Fitness", "parentId": "health", "createdAt": "2022-03-01T08:05:00Z"}
        ],
        "goals": [
            {"id": "g-run", "title": "Run 5k", "parentId": "fitness", "durationClass": "month",
             "difficulty": "moderate", "status": "completed", "result": "exceeded",
             "createdAt": "2022-03-02T08:00:00Z", "completedAt": "2022-03-28T08:00:00Z",
             "journal": [
                {"date": "2022-03-03T07:00:00Z", "text": "1k"},
                {"date": "2022-03-10T07:00:00Z", "text": "3k"}
             ]},
            {"id": "g-swim", "title": "Swim", "durationClass": "week", "difficulty": "hard",
             "cost": 4, "status": "active", "createdAt": "2022-04-01T08:00:00Z"}
        ],
        "reflections": [
            {"facetId": "body", "text": "stronger", "date": "2022-03-30T20:00:00Z"},
            {"facetId": "mind", "text": "calmer", "date": "2022-04-02T20:00:00Z"}
        ]
    });
    let path = dir.path().join("legacy.json");
    fs::write(&path, legacy.to_string()).unwrap();

    let report = ledger.import_legacy(&path).unwrap();

    assert_eq!(ledger.state().entity_counts(), (2, 2, 2));
    assert_eq!(report.nurtures, 2);
    let run = ledger.goal("g-run").unwrap();
    assert_eq!(run.state, GoalState::Concluded);
    assert_eq!(run.started_at(), Utc.with_ymd_and_hms(2022, 3, 2, 8, 0, 0).unwrap());
    assert_eq!(ledger.log().pending_count(), report.events_created);
}
