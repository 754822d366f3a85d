use mqk_schemas::{HookName, StrategyId};

use crate::{DiagnosticSink, Notifier, NotifierSignatures};

/// Everything a hook is allowed to touch besides its own state.
///
/// Built by the dispatcher for exactly one invocation and dropped when the
/// hook returns. No broker, DB or host handles live here.
pub struct HookContext<'a> {
    strategy_id: &'a StrategyId,
    hook: HookName,
    notifier: Notifier<'a>,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        strategy_id: &'a StrategyId,
        hook: HookName,
        signatures: &'a NotifierSignatures,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            strategy_id,
            hook,
            notifier: Notifier::new(strategy_id, hook, signatures, sink),
        }
    }

    pub fn strategy_id(&self) -> &StrategyId {
        self.strategy_id
    }

    pub fn hook(&self) -> HookName {
        self.hook
    }

    /// The Severity Notifier capability for this invocation.
    pub fn notifier(&mut self) -> &mut Notifier<'a> {
        &mut self.notifier
    }

    pub(crate) fn into_notifier(self) -> Notifier<'a> {
        self.notifier
    }
}
