//! Contract Test: Zone Update Workflow
//!
//! The engine must:
//! - make no zone writes when every record already matches
//! - only ever write to a freshly cloned zone version
//! - activate the clone only if at least one record was rewritten
//! - report missing and failed records without aborting the others
//! - never touch the zone when providers disagree

mod common;

use common::*;
use dyndns_core::engine::RecordFailure;
use dyndns_core::{
    ConsensusResolver, EngineEvent, Error, ProviderList, UpdateEngine, UpdateOutcome, UpdateReport,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

const EXTERNAL_IP: &str = "203.0.113.7";

fn external_ip() -> Ipv4Addr {
    EXTERNAL_IP.parse().unwrap()
}

/// Three providers that all report `answer`
fn agreeing_source(answer: &str) -> (Arc<FixedSource>, ProviderList) {
    let urls = provider_urls(3);
    let mut source = FixedSource::new();
    for url in &urls {
        source = source.answering(url, answer);
    }
    (Arc::new(source), ProviderList::new(urls))
}

fn engine_with(
    zone: &MockZoneProvider,
    answer: &str,
    names: &[&str],
    dry_run: bool,
) -> (UpdateEngine, mpsc::Receiver<EngineEvent>) {
    let (source, providers) = agreeing_source(answer);
    let config = minimal_config(names);
    let resolver = ConsensusResolver::new(source, resolver_config(2, 20)).unwrap();

    UpdateEngine::new(resolver, providers, Box::new(zone.clone()), &config, dry_run).unwrap()
}

async fn run(engine: &UpdateEngine) -> UpdateReport {
    let mut rng = StdRng::seed_from_u64(99);
    match assert_ok!(engine.run(&mut rng).await) {
        UpdateOutcome::Reconciled(report) => report,
        other => panic!("expected a reconciled zone, got {:?}", other),
    }
}

#[tokio::test]
async fn matching_records_cause_no_writes() {
    let zone = MockZoneProvider::new(vec![
        a_record(1, "home", EXTERNAL_IP),
        a_record(2, "vpn", " 203.0.113.7 "),
    ]);
    let (engine, mut rx) = engine_with(&zone, EXTERNAL_IP, &["home", "vpn"], false);

    let report = run(&engine).await;

    assert_eq!(report.external_ip, external_ip());
    assert_eq!(report.unchanged, vec!["home", "vpn"]);
    assert!(report.updated.is_empty());
    assert!(!report.has_failures());
    assert_eq!(report.activated_version, None);

    assert_eq!(zone.new_version_calls(), 0, "no version may be cloned");
    assert_eq!(zone.update_calls(), 0);
    assert_eq!(zone.activate_calls(), 0);

    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        EngineEvent::ExternalIpResolved { ip: external_ip() }
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, EngineEvent::RecordUnchanged { .. }))
            .count(),
        2
    );
}

#[tokio::test]
async fn stale_record_is_rewritten_in_a_new_version_and_activated() {
    let zone = MockZoneProvider::new(vec![
        a_record(1, "home", "198.51.100.1"),
        a_record(2, "www", "192.0.2.80"),
    ]);
    let (engine, mut rx) = engine_with(&zone, EXTERNAL_IP, &["home"], false);

    let report = run(&engine).await;

    assert_eq!(report.updated, vec!["home"]);
    assert_eq!(report.activated_version, Some(2));
    assert_eq!(zone.active_version(), 2);
    assert_eq!(zone.new_version_calls(), 1);
    assert_eq!(zone.activate_calls(), 1);

    let active = zone.active_records();
    let home = active.iter().find(|r| r.name == "home").unwrap();
    let www = active.iter().find(|r| r.name == "www").unwrap();
    assert_eq!(home.value, EXTERNAL_IP);
    assert_eq!(www.value, "192.0.2.80", "unmanaged records are carried over untouched");

    let events = drain(&mut rx);
    let tail: Vec<_> = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                EngineEvent::ZoneVersionCreated { .. }
                    | EngineEvent::RecordUpdated { .. }
                    | EngineEvent::ZoneVersionActivated { .. }
            )
        })
        .cloned()
        .collect();
    assert_eq!(
        tail,
        vec![
            EngineEvent::ZoneVersionCreated {
                zone_id: 4242,
                version: 2
            },
            EngineEvent::RecordUpdated {
                record_name: "home".to_string(),
                new_ip: external_ip()
            },
            EngineEvent::ZoneVersionActivated {
                zone_id: 4242,
                version: 2
            },
        ]
    );
}

#[tokio::test]
async fn duplicate_names_are_rewritten_once() {
    let zone = MockZoneProvider::new(vec![a_record(1, "home", "198.51.100.1")]);
    let (engine, _rx) = engine_with(&zone, EXTERNAL_IP, &["home", "home"], false);

    let report = run(&engine).await;

    assert_eq!(report.updated, vec!["home"]);
    assert_eq!(zone.update_calls(), 1);
}

#[tokio::test]
async fn record_type_is_matched_case_insensitively() {
    let mut record = a_record(1, "home", "198.51.100.1");
    record.record_type = "a".to_string();
    let zone = MockZoneProvider::new(vec![record]);
    let (engine, _rx) = engine_with(&zone, EXTERNAL_IP, &["home"], false);

    let report = run(&engine).await;

    assert_eq!(report.updated, vec!["home"]);
}

#[tokio::test]
async fn missing_record_is_reported_and_others_still_update() {
    let mut aaaa = a_record(3, "ghost", "2001:db8::1");
    aaaa.record_type = "AAAA".to_string();
    let zone = MockZoneProvider::new(vec![a_record(1, "home", "198.51.100.1"), aaaa]);
    let (engine, mut rx) = engine_with(&zone, EXTERNAL_IP, &["ghost", "home"], false);

    let report = run(&engine).await;

    assert_eq!(report.updated, vec!["home"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "ghost");
    assert!(report.has_failures());
    assert_eq!(report.activated_version, Some(2));

    let events = drain(&mut rx);
    assert!(events.contains(&EngineEvent::RecordMissing {
        record_name: "ghost".to_string()
    }));
}

#[tokio::test]
async fn partial_failure_still_activates() {
    let zone = MockZoneProvider::new(vec![
        a_record(1, "home", "198.51.100.1"),
        a_record(2, "vpn", "198.51.100.1"),
    ])
    .fail_updates_for("vpn");
    let (engine, mut rx) = engine_with(&zone, EXTERNAL_IP, &["home", "vpn"], false);

    let report = run(&engine).await;

    assert_eq!(report.updated, vec!["home"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "vpn");
    assert_eq!(report.activated_version, Some(2));

    let active = zone.active_records();
    assert_eq!(active.iter().find(|r| r.name == "vpn").unwrap().value, "198.51.100.1");

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::RecordUpdateFailed { record_name, retry_count: 0, .. } if record_name == "vpn"
    )));
}

#[tokio::test]
async fn total_failure_leaves_the_live_zone_alone() {
    let zone = MockZoneProvider::new(vec![a_record(1, "home", "198.51.100.1")])
        .fail_updates_for("home");
    let (engine, _rx) = engine_with(&zone, EXTERNAL_IP, &["home"], false);

    let report = run(&engine).await;

    assert!(report.updated.is_empty());
    assert_eq!(
        report.failed,
        vec![RecordFailure {
            name: "home".to_string(),
            reason: "Provider error (mock): cannot update home".to_string(),
        }]
    );
    assert_eq!(report.activated_version, None);

    assert_eq!(zone.new_version_calls(), 1, "the clone was made");
    assert_eq!(zone.activate_calls(), 0, "but never activated");
    assert_eq!(zone.active_version(), 1);
    assert_eq!(zone.active_records()[0].value, "198.51.100.1");
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let zone = MockZoneProvider::new(vec![a_record(1, "home", "198.51.100.1")])
        .fail_next_updates(1);
    let (source, providers) = agreeing_source(EXTERNAL_IP);
    let mut config = minimal_config(&["home"]);
    config.engine.max_retries = 2;
    let resolver = ConsensusResolver::new(source, resolver_config(2, 20)).unwrap();
    let (engine, _rx) =
        UpdateEngine::new(resolver, providers, Box::new(zone.clone()), &config, false).unwrap();

    let report = run(&engine).await;

    assert_eq!(report.updated, vec!["home"]);
    assert_eq!(zone.update_calls(), 2, "one failure, one success");
    assert_eq!(zone.active_records()[0].value, EXTERNAL_IP);
}

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let zone = MockZoneProvider::new(vec![
        a_record(1, "home", "198.51.100.1"),
        a_record(2, "vpn", EXTERNAL_IP),
    ]);
    let (engine, _rx) = engine_with(&zone, EXTERNAL_IP, &["home", "vpn"], true);

    let report = run(&engine).await;

    assert_eq!(report.would_update, vec!["home"]);
    assert_eq!(report.unchanged, vec!["vpn"]);
    assert!(report.updated.is_empty());
    assert_eq!(report.activated_version, None);

    assert_eq!(zone.new_version_calls(), 0);
    assert_eq!(zone.update_calls(), 0);
    assert_eq!(zone.activate_calls(), 0);
}

#[tokio::test]
async fn disagreement_never_touches_the_zone() {
    let urls = provider_urls(3);
    let source = Arc::new(
        FixedSource::new()
            .answering(&urls[0], "198.51.100.1")
            .answering(&urls[1], "198.51.100.2")
            .answering(&urls[2], "198.51.100.3"),
    );
    let zone = MockZoneProvider::new(vec![a_record(1, "home", "198.51.100.1")]);
    let config = minimal_config(&["home"]);
    let resolver = ConsensusResolver::new(source, resolver_config(2, 12)).unwrap();
    let (engine, mut rx) = UpdateEngine::new(
        resolver,
        ProviderList::new(urls),
        Box::new(zone.clone()),
        &config,
        false,
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(5);
    let outcome = engine.run(&mut rng).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Unresolved { attempts: 12 });
    assert_eq!(zone.state.lock().unwrap().zone_lookups, 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn empty_provider_list_is_a_configuration_error() {
    let zone = MockZoneProvider::new(vec![a_record(1, "home", "198.51.100.1")]);
    let config = minimal_config(&["home"]);
    let source = Arc::new(FixedSource::new());
    let resolver = ConsensusResolver::new(source.clone(), resolver_config(2, 12)).unwrap();
    let (engine, _rx) = UpdateEngine::new(
        resolver,
        ProviderList::new(Vec::<String>::new()),
        Box::new(zone.clone()),
        &config,
        false,
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(5);
    let err = engine.run(&mut rng).await.unwrap_err();

    assert!(matches!(err, Error::NoProviders));
    assert!(err.is_config());
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let zone = MockZoneProvider::new(Vec::new());
    let mut config = minimal_config(&["home"]);
    config.names.clear();
    let (source, providers) = agreeing_source(EXTERNAL_IP);
    let resolver = ConsensusResolver::new(source, resolver_config(2, 12)).unwrap();

    let result = UpdateEngine::new(resolver, providers, Box::new(zone), &config, false);

    assert!(matches!(result, Err(Error::Config(_))));
}
