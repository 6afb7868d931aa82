//! Show lifecycle: gating, single-flight, load failures, timeouts, retries.

mod common;

use bridge_traits::{AdConfiguration, Placement, ShowEvent, SurfaceType};
use common::*;
use core_ads::{AdErrorKind, AdTicket, SessionState};
use core_runtime::config::EngineFeatures;
use std::sync::Arc;
use tokio::sync::Barrier;

#[tokio::test]
async fn test_missing_configuration_never_contacts_provider() {
    let provider = ScriptedProvider::new(LoadStep::dismissed());
    let h = harness(vec![interstitial("inter-1")], policy(), provider).await;

    assert!(!h.engine.should_show(SurfaceType::Native, Placement::InFeed));

    let callbacks = RecordingCallbacks::new();
    let handle = h
        .engine
        .show(SurfaceType::Native, Placement::InFeed, callbacks.clone());

    assert!(handle.is_none());
    let failed = callbacks.failed.lock();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind(), AdErrorKind::ConfigurationMissing);
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.engine.session_state(SurfaceType::Native), SessionState::Idle);
}

#[tokio::test]
async fn test_load_failure_returns_to_idle_without_counting() {
    let provider = ScriptedProvider::new(LoadStep::fail("network"));
    let h = harness(vec![interstitial("inter-1")], policy(), provider).await;

    let (ticket, callbacks) = AdTicket::channel();
    h.engine
        .show_interstitial(Placement::AfterVideo, callbacks)
        .unwrap()
        .await
        .unwrap();

    let err = ticket.wait().await.unwrap_err();
    assert_eq!(err.kind(), AdErrorKind::ProviderLoadFailed);
    assert_eq!(err.provider_message(), Some("network"));
    assert_eq!(h.engine.counter_for("inter-1"), 0);
    assert_eq!(
        h.engine.session_state(SurfaceType::Interstitial),
        SessionState::Idle
    );
    assert!(h.store.is_empty());
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test]
async fn test_second_show_on_busy_surface_is_rejected() {
    let provider = ScriptedProvider::new(LoadStep::Manual);
    let h = harness(vec![interstitial("inter-1")], policy(), provider).await;

    let first = RecordingCallbacks::new();
    let second = RecordingCallbacks::new();

    let handle = h
        .engine
        .show_interstitial(Placement::AfterVideo, first.clone())
        .unwrap();
    assert!(h
        .engine
        .show_interstitial(Placement::AfterVideo, second.clone())
        .is_none());

    let sender = h.provider.wait_for_sender().await;
    assert_eq!(
        h.engine.session_state(SurfaceType::Interstitial),
        SessionState::Showing
    );
    assert_eq!(
        h.engine
            .check(SurfaceType::Interstitial, Placement::AfterVideo)
            .unwrap_err()
            .kind(),
        AdErrorKind::AlreadyShowing
    );

    sender.unbounded_send(ShowEvent::Showed).unwrap();
    sender.unbounded_send(ShowEvent::Dismissed).unwrap();
    handle.await.unwrap();

    assert_eq!(first.dismissed.lock().len(), 1);
    assert!(first.failed.lock().is_empty());
    assert_eq!(second.failed.lock().len(), 1);
    assert_eq!(second.failed.lock()[0].kind(), AdErrorKind::AlreadyShowing);
    assert_eq!(h.provider.calls(), 1);
    assert_eq!(h.engine.counter_for("inter-1"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_shows_yield_exactly_one_session() {
    let provider = ScriptedProvider::new(LoadStep::Manual);
    let h = harness(vec![interstitial("inter-1")], policy(), provider).await;

    let barrier = Arc::new(Barrier::new(2));
    let callbacks = [RecordingCallbacks::new(), RecordingCallbacks::new()];

    let tasks: Vec<_> = callbacks
        .iter()
        .map(|cb| {
            let engine = h.engine.clone();
            let barrier = Arc::clone(&barrier);
            let cb = Arc::clone(cb);
            tokio::spawn(async move {
                barrier.wait().await;
                engine.show_interstitial(Placement::AfterVideo, cb)
            })
        })
        .collect();

    let mut sessions = Vec::new();
    for task in tasks {
        if let Some(handle) = task.await.unwrap() {
            sessions.push(handle);
        }
    }
    assert_eq!(sessions.len(), 1);

    let sender = h.provider.wait_for_sender().await;
    sender.unbounded_send(ShowEvent::Showed).unwrap();
    sender.unbounded_send(ShowEvent::Dismissed).unwrap();
    for session in sessions {
        session.await.unwrap();
    }

    let dismissed: usize = callbacks.iter().map(|cb| cb.dismissed.lock().len()).sum();
    let busy: usize = callbacks
        .iter()
        .map(|cb| {
            cb.failed
                .lock()
                .iter()
                .filter(|e| e.kind() == AdErrorKind::AlreadyShowing)
                .count()
        })
        .sum();
    assert_eq!(dismissed, 1);
    assert_eq!(busy, 1);
    assert!(callbacks.iter().all(|cb| cb.outcomes() == 1));
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test]
async fn test_surfaces_do_not_block_each_other() {
    let provider = ScriptedProvider::new(LoadStep::Manual);
    let h = harness(
        vec![interstitial("inter-1"), rewarded("reward-1")],
        policy(),
        provider,
    )
    .await;

    let inter = h
        .engine
        .show_interstitial(Placement::AfterVideo, RecordingCallbacks::new())
        .unwrap();
    let reward = h
        .engine
        .show_rewarded(Placement::BeforeVideo, RecordingCallbacks::new())
        .unwrap();

    h.provider.wait_for_senders(2).await;
    assert_eq!(
        h.engine.session_state(SurfaceType::Interstitial),
        SessionState::Showing
    );
    assert_eq!(h.engine.session_state(SurfaceType::Rewarded), SessionState::Showing);

    inter.abort();
    reward.abort();
    let _ = inter.await;
    let _ = reward.await;

    assert_eq!(
        h.engine.session_state(SurfaceType::Interstitial),
        SessionState::Idle
    );
    assert_eq!(h.engine.session_state(SurfaceType::Rewarded), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_releases_surface() {
    let provider = ScriptedProvider::with_script(vec![LoadStep::Hang], LoadStep::dismissed());
    let h = harness(vec![interstitial("inter-1")], policy(), provider).await;

    let (ticket, callbacks) = AdTicket::channel();
    h.engine
        .show_interstitial(Placement::AfterVideo, callbacks)
        .unwrap()
        .await
        .unwrap();

    let err = ticket.wait().await.unwrap_err();
    assert_eq!(err.kind(), AdErrorKind::ProviderLoadFailed);
    assert!(err.to_string().contains("timed out after 1000 ms"));
    assert_eq!(
        h.engine.session_state(SurfaceType::Interstitial),
        SessionState::Idle
    );
    assert_eq!(h.engine.counter_for("inter-1"), 0);

    let (ticket, callbacks) = AdTicket::channel();
    h.engine
        .show_interstitial(Placement::AfterVideo, callbacks)
        .unwrap()
        .await
        .unwrap();
    assert!(ticket.wait().await.is_ok());
    assert_eq!(h.provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_load_holds_surface_until_cancelled() {
    let provider = ScriptedProvider::new(LoadStep::Hang);
    let features = EngineFeatures {
        enforce_load_timeout: false,
        ..EngineFeatures::default()
    };
    let h = harness_with(vec![interstitial("inter-1")], policy(), provider, features).await;

    let (ticket, callbacks) = AdTicket::channel();
    let handle = h
        .engine
        .show_interstitial(Placement::AfterVideo, callbacks)
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    assert_eq!(
        h.engine.session_state(SurfaceType::Interstitial),
        SessionState::Loading
    );

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
    assert_eq!(ticket.wait().await.unwrap_err().kind(), AdErrorKind::Interrupted);
    assert_eq!(
        h.engine.session_state(SurfaceType::Interstitial),
        SessionState::Idle
    );
}

#[tokio::test]
async fn test_retries_honour_policy() {
    let provider = ScriptedProvider::with_script(
        vec![LoadStep::fail("no fill"), LoadStep::fail("no fill")],
        LoadStep::dismissed(),
    );
    let policy = bridge_traits::ManagerPolicy {
        retry_attempts: 2,
        ..policy()
    };
    let h = harness(vec![interstitial("inter-1")], policy, provider).await;

    let (ticket, callbacks) = AdTicket::channel();
    h.engine
        .show_interstitial(Placement::AfterVideo, callbacks)
        .unwrap()
        .await
        .unwrap();

    let completion = ticket.wait().await.unwrap();
    assert_eq!(completion.config_id, "inter-1");
    assert_eq!(h.provider.calls(), 3);
    assert_eq!(h.engine.counter_for("inter-1"), 1);
}

#[tokio::test]
async fn test_retries_exhausted_reports_last_error() {
    let provider = ScriptedProvider::with_script(
        vec![LoadStep::fail("timeout")],
        LoadStep::fail("no fill"),
    );
    let policy = bridge_traits::ManagerPolicy {
        retry_attempts: 1,
        ..policy()
    };
    let h = harness(vec![interstitial("inter-1")], policy, provider).await;

    let (ticket, callbacks) = AdTicket::channel();
    h.engine
        .show_interstitial(Placement::AfterVideo, callbacks)
        .unwrap()
        .await
        .unwrap();

    let err = ticket.wait().await.unwrap_err();
    assert_eq!(err.provider_message(), Some("no fill"));
    assert_eq!(h.provider.calls(), 2);
}

#[tokio::test]
async fn test_show_failure_counts_without_impression() {
    let provider = ScriptedProvider::with_script(
        vec![
            LoadStep::Show(vec![ShowEvent::FailedToShow("creative expired".to_string())]),
            LoadStep::Show(vec![]),
        ],
        LoadStep::Show(vec![ShowEvent::Showed]),
    );
    let h = harness(vec![interstitial("inter-1")], policy(), provider).await;

    for expected in ["creative expired", "Ad closed before it was shown"] {
        let (ticket, callbacks) = AdTicket::channel();
        h.engine
            .show_interstitial(Placement::AfterVideo, callbacks)
            .unwrap()
            .await
            .unwrap();

        let err = ticket.wait().await.unwrap_err();
        assert_eq!(err.kind(), AdErrorKind::ProviderShowFailed);
        assert_eq!(err.provider_message(), Some(expected));
    }
    assert_eq!(h.engine.counter_for("inter-1"), 2);
    assert!(h.store.is_empty());

    // stream closing after Showed counts as a dismissal
    let (ticket, callbacks) = AdTicket::channel();
    h.engine
        .show_interstitial(Placement::AfterVideo, callbacks)
        .unwrap()
        .await
        .unwrap();
    assert!(ticket.wait().await.is_ok());
    assert_eq!(h.engine.counter_for("inter-1"), 3);
}

#[tokio::test]
async fn test_rewarded_session_reports_reward() {
    let provider = ScriptedProvider::new(LoadStep::rewarded("coins", 25));
    let h = harness(vec![rewarded("reward-1")], policy(), provider).await;

    let callbacks = RecordingCallbacks::new();
    h.engine
        .show_rewarded(Placement::BeforeVideo, callbacks.clone())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(*callbacks.shown.lock(), vec!["reward-1".to_string()]);
    let rewards = callbacks.rewards.lock();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].kind, "coins");
    assert_eq!(rewards[0].amount, 25);

    let dismissed = callbacks.dismissed.lock();
    assert_eq!(dismissed.len(), 1);
    assert_eq!(dismissed[0].reward, Some(rewards[0].clone()));
    assert_eq!(dismissed[0].surface_type, SurfaceType::Rewarded);
    assert!(!dismissed[0].preloaded);
}

#[tokio::test]
async fn test_blank_creative_uses_policy_fallback() {
    let provider = ScriptedProvider::new(LoadStep::dismissed());
    let config = AdConfiguration::new("inter-1", SurfaceType::Interstitial, Placement::AfterVideo, "");
    let mut policy = policy();
    policy.test_mode = true;
    policy
        .fallback_creative_ids
        .insert(SurfaceType::Interstitial, "house-unit".to_string());
    let h = harness(vec![config], policy, provider).await;

    let (ticket, callbacks) = AdTicket::channel();
    h.engine
        .show_interstitial(Placement::AfterVideo, callbacks)
        .unwrap()
        .await
        .unwrap();
    ticket.wait().await.unwrap();

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].creative_id, "house-unit");
    assert_eq!(requests[0].placement, Placement::AfterVideo);
    assert!(requests[0].test_mode);
}

#[tokio::test]
async fn test_preloaded_creative_is_reused_once() {
    let provider = ScriptedProvider::new(LoadStep::dismissed());
    let h = harness(vec![interstitial("inter-1")], policy(), provider).await;

    assert!(
        h.engine
            .preload_for(SurfaceType::Interstitial, Placement::AfterVideo)
            .await
    );
    assert_eq!(h.provider.calls(), 1);

    for preloaded in [true, false] {
        let (ticket, callbacks) = AdTicket::channel();
        h.engine
            .show_interstitial(Placement::AfterVideo, callbacks)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(ticket.wait().await.unwrap().preloaded, preloaded);
    }
    assert_eq!(h.provider.calls(), 2);
}
