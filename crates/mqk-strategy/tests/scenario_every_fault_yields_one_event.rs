use mqk_schemas::{EventSource, HookName, MarketTick, OrderUpdate, StrategyId};
use mqk_strategy::*;
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug)]
enum Fault {
    Error,
    Panic,
    PanicWithString,
    Misuse,
    ExplicitSeverity,
}

const FAULTS: [Fault; 5] = [
    Fault::Error,
    Fault::Panic,
    Fault::PanicWithString,
    Fault::Misuse,
    Fault::ExplicitSeverity,
];

/// Fails the same way in every hook.
struct Injected(Fault);

impl Injected {
    fn fail(&self, cx: &mut HookContext<'_>) -> HookResult {
        match self.0 {
            Fault::Error => Err(anyhow::anyhow!("nil position for {}", cx.strategy_id())),
            Fault::Panic => panic!("unexpected nil"),
            Fault::PanicWithString => panic!("bad index {}", 3),
            Fault::Misuse => {
                let _ = cx.notifier().notify_medium(&["only one".into()]);
                Ok(HookStatus::Completed)
            }
            Fault::ExplicitSeverity => Err(StrategyFault::low("soft failure").into()),
        }
    }
}

impl Strategy for Injected {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new("injected")
    }

    fn on_start(&mut self, cx: &mut HookContext<'_>) -> HookResult {
        self.fail(cx)
    }

    fn on_stop(&mut self, cx: &mut HookContext<'_>) -> HookResult {
        self.fail(cx)
    }

    fn on_tick(&mut self, cx: &mut HookContext<'_>, _tick: &MarketTick) -> HookResult {
        self.fail(cx)
    }

    fn on_order_update(&mut self, cx: &mut HookContext<'_>, _u: &OrderUpdate) -> HookResult {
        self.fail(cx)
    }

    fn on_callback(&mut self, cx: &mut HookContext<'_>, _p: Option<&Value>) -> HookResult {
        self.fail(cx)
    }

    fn on_other(&mut self, cx: &mut HookContext<'_>, _d: &Value) -> HookResult {
        self.fail(cx)
    }
}

fn args_for(hook: HookName) -> HookArgs {
    match hook {
        HookName::OnTick => HookArgs::one(json!({
            "symbol": "SPY", "price": "501.10", "size": "5", "ts_utc": "2024-06-03T13:30:00Z"
        })),
        HookName::OnOrderUpdate => HookArgs::one(json!({
            "client_order_id": "o-9", "symbol": "SPY", "status": "REJECTED",
            "filled_qty": "0", "leaves_qty": "5"
        })),
        HookName::OnOther => HookArgs::one(json!({"news": "halt"})),
        _ => HookArgs::none(),
    }
}

#[test]
fn scenario_every_fault_in_every_hook_yields_exactly_one_event() {
    let dispatcher = HookDispatcher::default();
    for (n, fault) in FAULTS.into_iter().enumerate() {
        for hook in HookName::ALL {
            let sink = MemorySink::new();
            let id = StrategyId::new(format!("s-{n}"));
            let mut strategy = Injected(fault);

            let captured = dispatcher
                .invoke(&mut strategy, &id, hook, &args_for(hook), &sink)
                .unwrap_err();

            // Captured events are returned, not forwarded; no voluntary events here.
            assert!(sink.is_empty(), "{fault:?}/{hook}");
            let ev = captured.event();
            assert_eq!(ev.strategy_id(), &id);
            assert_eq!(ev.hook_name(), hook);
            assert!(!ev.message().trim().is_empty());
            assert!(serde_json::to_string(ev).is_ok());

            let expected_source = match fault {
                Fault::Misuse => EventSource::NotifierMisuse,
                _ => EventSource::StrategyCode,
            };
            assert_eq!(ev.source(), expected_source, "{fault:?}/{hook}");
        }
    }
}

#[test]
fn scenario_dispatcher_keeps_working_after_captures() {
    let dispatcher = HookDispatcher::default();
    let sink = MemorySink::new();
    let id = StrategyId::new("recovering");
    let mut strategy = Injected(Fault::Panic);

    for _ in 0..3 {
        assert!(dispatcher
            .invoke(&mut strategy, &id, HookName::OnCallback, &HookArgs::none(), &sink)
            .is_err());
    }

    // Same instance, different behavior: the boundary left it usable.
    strategy.0 = Fault::ExplicitSeverity;
    let captured = dispatcher
        .invoke(&mut strategy, &id, HookName::OnCallback, &HookArgs::none(), &sink)
        .unwrap_err();
    assert_eq!(captured.event().message(), "soft failure");
}
