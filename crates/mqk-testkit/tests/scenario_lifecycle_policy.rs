//! Host lifecycle and deactivation policy, driven by scripted strategies.

use mqk_schemas::{EventSource, HookName, StrategyId};
use mqk_strategy::{HookArgs, HostError, HostSettings, Lifecycle, StrategyHost};
use mqk_testkit::{
    config_from_yaml, host_settings, memory_host, valid_args, ScriptedStrategy, Step,
};
use serde_json::json;
use std::time::Duration;

async fn other(host: &StrategyHost, id: &StrategyId) -> Lifecycle {
    host.invoke(id, "on_other", HookArgs::one(json!({"order": "o-1"})))
        .await
        .unwrap()
        .lifecycle
}

#[tokio::test(flavor = "multi_thread")]
async fn consecutive_captures_deactivate_and_success_resets() {
    let (host, sink) = memory_host(host_settings(2_000, 2));
    let id = StrategyId::new("flaky-1");
    let strategy = ScriptedStrategy::new("flaky")
        .on(HookName::OnOther, [Step::Fail("rejected".to_string())])
        .completing(HookName::OnTick);
    host.register(id.clone(), Box::new(strategy)).await.unwrap();
    host.start(&id).await.unwrap();

    assert_eq!(other(&host, &id).await, Lifecycle::Running);
    let report = host
        .invoke(&id, "on_tick", valid_args(HookName::OnTick))
        .await
        .unwrap();
    assert_eq!(report.consecutive_failures, 0);

    assert_eq!(other(&host, &id).await, Lifecycle::Running);
    assert_eq!(other(&host, &id).await, Lifecycle::Deactivated);

    assert!(matches!(
        host.invoke(&id, "on_other", HookArgs::one(json!(1))).await,
        Err(HostError::InvalidLifecycle {
            lifecycle: Lifecycle::Deactivated,
            ..
        })
    ));

    let status = host.status(&id).await.unwrap();
    assert_eq!(status.captures, 3);
    assert_eq!(status.invocations, 5);
    assert_eq!(sink.len(), 3);

    // Deactivated strategies can be removed.
    host.unregister(&id).await.unwrap();
    assert!(host.list().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_start_can_be_retried_or_stopped() {
    let (host, sink) = memory_host(host_settings(2_000, 3));
    let id = StrategyId::new("cold-1");
    let strategy = ScriptedStrategy::new("cold")
        .on(HookName::OnStart, [Step::Panic("warmup data missing".to_string())]);
    let journal = strategy.journal();
    host.register(id.clone(), Box::new(strategy)).await.unwrap();

    assert_eq!(host.start(&id).await.unwrap().lifecycle, Lifecycle::Failed);
    assert_eq!(host.start(&id).await.unwrap().lifecycle, Lifecycle::Failed);
    assert!(matches!(
        host.invoke(&id, "on_tick", valid_args(HookName::OnTick)).await,
        Err(HostError::InvalidLifecycle { .. })
    ));
    assert_eq!(host.stop(&id).await.unwrap().lifecycle, Lifecycle::Stopped);

    assert_eq!(journal.len(), 2, "on_stop is not provided and records nothing");
    let events = sink.drain();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.hook_name() == HookName::OnStart));
    assert!(events[0].message().contains("warmup data missing"));
}

#[tokio::test(flavor = "multi_thread")]
async fn host_misuse_is_an_error_not_an_event() {
    let (host, sink) = memory_host(host_settings(2_000, 3));
    let id = StrategyId::new("idle-1");
    host.register(id.clone(), Box::new(ScriptedStrategy::new("idle")))
        .await
        .unwrap();

    assert!(matches!(
        host.register(id.clone(), Box::new(ScriptedStrategy::new("idle"))).await,
        Err(HostError::DuplicateStrategy(_))
    ));
    assert!(matches!(
        host.invoke(&id, "on_bar", HookArgs::none()).await,
        Err(HostError::UnknownHook(_))
    ));
    assert!(matches!(
        host.invoke(&StrategyId::new("ghost"), "on_tick", HookArgs::none()).await,
        Err(HostError::UnknownStrategy(_))
    ));

    host.start(&id).await.unwrap();
    assert!(matches!(
        host.unregister(&id).await,
        Err(HostError::StillRunning(_))
    ));
    assert!(sink.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_arguments_are_host_dispatch_captures() {
    let (host, sink) = memory_host(host_settings(2_000, 0));
    let id = StrategyId::new("strict-1");
    let strategy = ScriptedStrategy::new("strict").completing(HookName::OnTick);
    let journal = strategy.journal();
    host.register(id.clone(), Box::new(strategy)).await.unwrap();
    host.start(&id).await.unwrap();

    let wrong_shape = host
        .invoke(&id, "on_tick", HookArgs::one(json!({"symbol": "SPY"})))
        .await
        .unwrap();
    let too_many = host
        .invoke(&id, "on_tick", HookArgs::from(vec![json!(1), json!(2)]))
        .await
        .unwrap();

    for report in [&wrong_shape, &too_many] {
        let captured = report.captured().unwrap();
        assert_eq!(captured.source(), EventSource::HostDispatch);
        assert_eq!(captured.hook(), HookName::OnTick);
    }
    assert!(journal.is_empty(), "strategy code never ran");
    assert_eq!(sink.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_deactivates_even_during_stop() {
    let (host, sink) = memory_host(host_settings(50, 0));
    let id = StrategyId::new("slow-stop-1");
    let strategy = ScriptedStrategy::new("slow_stop")
        .on(HookName::OnStop, [Step::Sleep(Duration::from_millis(300))]);
    host.register(id.clone(), Box::new(strategy)).await.unwrap();
    host.start(&id).await.unwrap();

    let report = host.stop(&id).await.unwrap();
    assert_eq!(report.lifecycle, Lifecycle::Deactivated);
    assert_eq!(
        report.captured().unwrap().source(),
        EventSource::HostDispatch
    );
    assert_eq!(sink.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_caller_still_captures_and_deactivates() {
    let cfg = config_from_yaml(&[
        "host:\n  hook_timeout_ms: 2000\n  max_consecutive_failures: 3\n",
        "host:\n  max_consecutive_failures: 1\n",
    ])
    .unwrap();
    let settings = HostSettings::from_config_json(&cfg.config_json).unwrap();
    assert_eq!(settings.max_consecutive_failures, 1);

    let (host, sink) = memory_host(settings);
    let id = StrategyId::new("slow-1");
    let strategy = ScriptedStrategy::new("slow").completing(HookName::OnStart).on(
        HookName::OnTick,
        [
            Step::Sleep(Duration::from_millis(100)),
            Step::Fail("nil position".to_string()),
        ],
    );
    let journal = strategy.journal();
    host.register(id.clone(), Box::new(strategy)).await.unwrap();
    host.start(&id).await.unwrap();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(10),
        host.invoke(&id, "on_tick", valid_args(HookName::OnTick)),
    )
    .await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let events = sink.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source(), EventSource::StrategyCode);
    assert_eq!(events[0].message(), "nil position");
    assert_eq!(journal.len(), 2);

    let status = host.status(&id).await.unwrap();
    assert_eq!(status.captures, 1);
    assert_eq!(status.lifecycle, Lifecycle::Deactivated);
}
