use mqk_schemas::{CauseKind, EventSource, HookName, Severity, StrategyId};
use mqk_strategy::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// `on_other` sleeps longer than the host is willing to wait.
struct Sleeper {
    nap: Duration,
}

impl Strategy for Sleeper {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new("sleeper")
    }

    fn on_other(&mut self, _cx: &mut HookContext<'_>, _d: &Value) -> HookResult {
        std::thread::sleep(self.nap);
        Ok(HookStatus::Completed)
    }
}

struct Quick;

impl Strategy for Quick {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new("quick")
    }

    fn on_other(&mut self, _cx: &mut HookContext<'_>, _d: &Value) -> HookResult {
        Ok(HookStatus::Completed)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_hung_hook_is_timeout_capture_and_deactivates() {
    let sink = MemorySink::new();
    let settings = HostSettings {
        hook_timeout: Some(Duration::from_millis(50)),
        ..HostSettings::default()
    };
    let host = StrategyHost::new(settings, Arc::new(sink.clone()));

    let slow = StrategyId::new("slow");
    let fast = StrategyId::new("fast");
    host.register(
        slow.clone(),
        Box::new(Sleeper {
            nap: Duration::from_millis(400),
        }),
    )
    .await
    .unwrap();
    host.register(fast.clone(), Box::new(Quick)).await.unwrap();
    host.start(&slow).await.unwrap();
    host.start(&fast).await.unwrap();

    let report = host
        .invoke(&slow, "on_other", HookArgs::one(json!(1)))
        .await
        .unwrap();
    assert_eq!(report.lifecycle, Lifecycle::Deactivated);
    let captured = report.captured().unwrap();
    assert_eq!(captured.source(), EventSource::HostDispatch);
    assert_eq!(captured.severity(), Severity::High);
    assert_eq!(captured.hook(), HookName::OnOther);
    assert_eq!(captured.event().cause().unwrap().kind, CauseKind::Timeout);

    // The other strategy is unaffected.
    let report = host
        .invoke(&fast, "on_other", HookArgs::one(json!(1)))
        .await
        .unwrap();
    assert_eq!(report.outcome, Ok(HookStatus::Completed));
    assert_eq!(report.lifecycle, Lifecycle::Running);

    assert!(matches!(
        host.invoke(&slow, "on_other", HookArgs::one(json!(2))).await,
        Err(HostError::InvalidLifecycle { .. })
    ));
    assert_eq!(sink.len(), 1);
}
