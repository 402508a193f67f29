use crate::scheduler::AdBreakNotifier;
use crate::ssai::AdDecisionService;
use spliceforge_common::{AdBreakRequest, EventBus, SignalEvent, ViewerContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Hands every fired ad break to the decision service on its own task.
///
/// The tick only spawns; a decision still in flight when the session stops
/// is abandoned.
pub(crate) struct DecisionDispatcher {
    decisions: Arc<AdDecisionService>,
    bus: Arc<EventBus>,
    viewer: ViewerContext,
    cancel: CancellationToken,
}

impl DecisionDispatcher {
    pub fn new(
        decisions: Arc<AdDecisionService>,
        bus: Arc<EventBus>,
        viewer: ViewerContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            decisions,
            bus,
            viewer,
            cancel,
        }
    }
}

impl AdBreakNotifier for DecisionDispatcher {
    fn notify(&self, request: AdBreakRequest) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                stream_id = %request.stream_id,
                cue_id = %request.cue_id,
                "No async runtime, ad break not decided"
            );
            return;
        };

        let decisions = Arc::clone(&self.decisions);
        let bus = Arc::clone(&self.bus);
        let viewer = self.viewer.clone();
        let cancel = self.cancel.clone();

        handle.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(
                        stream_id = %request.stream_id,
                        cue_id = %request.cue_id,
                        "Session stopped, abandoning ad decision"
                    );
                }
                decision = decisions.resolve(&request, &viewer) => {
                    bus.publish(SignalEvent::AdDecisionResolved {
                        stream_id: request.stream_id.clone(),
                        ad_break: request.clone(),
                        decision,
                    });
                }
            }
        });
    }
}
