//! Integration tests for live stream sessions.

mod common;

use common::{bus, marker, wait_for_event};
use serde_json::json;
use spliceforge::common::{AdType, MarkerState, SignalEvent, ViewerContext};
use spliceforge::config::{Config, DecisionStrategy};
use spliceforge::media::manifest::{ManifestSegment, Period};
use spliceforge::session::{SessionError, SessionManager};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> Config {
    let mut config = Config::default();
    config.scheduler.tick_interval_ms = 20;
    config
}

#[tokio::test]
async fn fired_break_gets_a_local_decision() {
    let bus = bus();
    let manager = SessionManager::from_config(&Config::default(), bus.clone());
    manager
        .open(
            "live",
            vec![marker("cue-1", 10.0, 30.0, AdType::LocalAd)],
            ViewerContext::default(),
        )
        .unwrap();

    assert!(manager.tick_at("live", 9.0).unwrap().is_empty());
    assert_eq!(manager.tick_at("live", 10.0).unwrap().cue_ids(), vec!["cue-1"]);

    let resolved = wait_for_event(&bus, "live", Duration::from_secs(2), |e| {
        matches!(e, SignalEvent::AdDecisionResolved { .. })
    })
    .await
    .expect("decision published");

    match resolved {
        SignalEvent::AdDecisionResolved { ad_break, decision, .. } => {
            assert_eq!(ad_break.cue_id, "cue-1");
            assert_eq!(decision.ad_id, "ad-cue-1");
            assert_eq!(decision.ad_url, "/ads/local-ad.mp4");
            assert_eq!(decision.duration, 30.0);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn ticker_fires_markers_from_the_wall_clock() {
    let bus = bus();
    let manager = SessionManager::from_config(&fast_config(), bus.clone());
    manager
        .start(
            "live",
            vec![
                marker("now", 0.0, 10.0, AdType::ProviderAd),
                marker("later", 3600.0, 10.0, AdType::ProviderAd),
            ],
            ViewerContext::default(),
        )
        .unwrap();

    let fired = wait_for_event(&bus, "live", Duration::from_secs(2), |e| {
        matches!(e, SignalEvent::MarkerFired { .. })
    })
    .await;
    assert!(fired.is_some(), "ticker never fired the due marker");

    let markers = manager.markers("live").unwrap();
    assert_eq!(markers[0].state, MarkerState::Inserted);
    assert_eq!(markers[1].state, MarkerState::Pending);

    let report = manager.stop("live").unwrap();
    assert_eq!(report.incomplete.len(), 1);
    assert_eq!(report.incomplete[0].cue_id, "later");
    assert!(manager.get("live").is_none());
}

#[tokio::test]
async fn streams_are_independent() {
    let bus = bus();
    let manager = SessionManager::from_config(&Config::default(), bus.clone());
    manager
        .open("a", vec![marker("cue-1", 1.0, 10.0, AdType::NetworkAd)], ViewerContext::default())
        .unwrap();
    manager
        .open("b", vec![marker("cue-1", 1.0, 10.0, AdType::NetworkAd)], ViewerContext::default())
        .unwrap();

    manager.tick_at("a", 5.0).unwrap();

    assert_eq!(manager.markers("a").unwrap()[0].state, MarkerState::Inserted);
    assert_eq!(manager.markers("b").unwrap()[0].state, MarkerState::Pending);
    assert!(bus
        .history_for("b")
        .iter()
        .all(|e| !matches!(e, SignalEvent::MarkerFired { .. })));
}

#[tokio::test]
async fn add_and_remove_through_the_manager() {
    let manager = SessionManager::from_config(&Config::default(), bus());
    manager.open("s", vec![], ViewerContext::default()).unwrap();

    manager.add("s", marker("cue-1", 5.0, 10.0, AdType::LocalAd)).unwrap();
    manager.add("s", marker("cue-2", 6.0, 10.0, AdType::LocalAd)).unwrap();
    assert!(matches!(
        manager.add("s", marker("cue-1", 7.0, 10.0, AdType::LocalAd)),
        Err(SessionError::Scheduling(_))
    ));

    assert!(manager.remove("s", "cue-2").unwrap().is_some());
    manager.tick_at("s", 5.0).unwrap();
    assert!(manager.remove("s", "cue-1").unwrap().is_none());

    let cues: Vec<_> = manager
        .markers("s")
        .unwrap()
        .into_iter()
        .map(|m| m.cue_id)
        .collect();
    assert_eq!(cues, vec!["cue-1"]);
}

#[tokio::test]
async fn manifests_reflect_current_markers() {
    let manager = SessionManager::from_config(&Config::default(), bus());
    manager
        .open(
            "s",
            vec![marker("cue-1", 10.0, 30.0, AdType::ProviderAd)],
            ViewerContext::default(),
        )
        .unwrap();

    let segments = ManifestSegment::uniform(4, 0.0, 6.0, "seg");
    let first = manager.render_hls("s", &segments).unwrap();
    let second = manager.render_hls("s", &segments).unwrap();
    assert_eq!(first.text, second.text);
    assert!(first.text.contains("TIME=4.000"));

    let mpd = manager
        .render_dash("s", &[Period::new("p0", 0.0, 60.0)])
        .unwrap();
    assert!(mpd.text.contains("urn:scte:scte35:2013:xml"));
    assert!(mpd.text.contains("presentationTime=\"900000\""));
}

#[tokio::test]
async fn reseeding_never_refires_a_marker() {
    let bus = bus();
    let manager = SessionManager::from_config(&Config::default(), bus.clone());
    manager
        .open(
            "live",
            vec![marker("cue-1", 10.0, 30.0, AdType::ProviderAd)],
            ViewerContext::default(),
        )
        .unwrap();
    let started_at = manager.get("live").unwrap().started_at();

    assert_eq!(manager.tick_at("live", 10.0).unwrap().cue_ids(), vec!["cue-1"]);

    manager
        .seed(
            "live",
            vec![
                marker("cue-1", 10.0, 30.0, AdType::ProviderAd),
                marker("cue-2", 20.0, 30.0, AdType::ProviderAd),
            ],
        )
        .unwrap();

    assert!(manager.tick_at("live", 10.0).unwrap().is_empty());
    assert_eq!(manager.get("live").unwrap().started_at(), started_at);
    assert_eq!(manager.tick_at("live", 20.0).unwrap().cue_ids(), vec!["cue-2"]);

    let fired_cue_1 = bus
        .history_for("live")
        .iter()
        .filter(|e| matches!(e, SignalEvent::MarkerFired { marker, .. } if marker.cue_id == "cue-1"))
        .count();
    assert_eq!(fired_cue_1, 1);
}

#[tokio::test]
async fn stop_abandons_in_flight_decisions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/decide"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "adId": "slow",
                    "adUrl": "https://cdn.example/slow.mp4",
                    "duration": 30,
                    "adType": "PROVIDER_AD"
                }))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.ad_decision.strategy = DecisionStrategy::Remote;
    config.ad_decision.endpoint = Some(format!("{}/decide", server.uri()));
    config.ad_decision.timeout_ms = 5000;

    let bus = bus();
    let manager = SessionManager::from_config(&config, bus.clone());
    manager
        .open(
            "live",
            vec![marker("cue-1", 1.0, 30.0, AdType::ProviderAd)],
            ViewerContext::default(),
        )
        .unwrap();
    assert_eq!(manager.tick_at("live", 1.0).unwrap().cue_ids(), vec!["cue-1"]);

    // Let the decision request reach the ad server.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let report = manager.stop("live").unwrap();
    assert!(started.elapsed() < Duration::from_millis(100), "stop waited on the decision");
    assert!(report.incomplete.is_empty());

    // Well past the point where the ad server would have answered.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let history = bus.history_for("live");
    assert!(history
        .iter()
        .any(|e| matches!(e, SignalEvent::SessionStopped { .. })));
    assert!(!history
        .iter()
        .any(|e| matches!(e, SignalEvent::AdDecisionResolved { .. })));
}
