use super::{AdDecisionError, DecisionSource};
use spliceforge_common::{AdBreakRequest, AdDecision, AdType, Targeting, ViewerContext};
use std::collections::BTreeMap;

/// Static creative table keyed by ad type.
#[derive(Debug, Clone, Default)]
pub struct LocalAdTable {
    creatives: BTreeMap<AdType, String>,
}

impl LocalAdTable {
    pub fn new(creatives: BTreeMap<AdType, String>) -> Self {
        Self { creatives }
    }

    pub fn creative_for(&self, ad_type: AdType) -> Option<&str> {
        self.creatives.get(&ad_type).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.creatives.is_empty()
    }

    /// Decision for a break, or `None` when the type has no creative.
    pub fn lookup(&self, request: &AdBreakRequest) -> Option<AdDecision> {
        let ad_url = self.creative_for(request.ad_type)?;
        Some(AdDecision {
            ad_id: format!("ad-{}", request.cue_id),
            ad_url: ad_url.to_string(),
            duration: request.duration,
            ad_type: request.ad_type,
            targeting: Some(Targeting {
                demographics: vec!["all".into()],
                content: vec!["live-streaming".into()],
                device: vec!["all".into()],
                ..Default::default()
            }),
            tracking: None,
        })
    }
}

#[async_trait::async_trait]
impl DecisionSource for LocalAdTable {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn decide(
        &self,
        request: &AdBreakRequest,
        _viewer: &ViewerContext,
    ) -> Result<AdDecision, AdDecisionError> {
        self.lookup(request)
            .ok_or(AdDecisionError::NoLocalEntry(request.ad_type))
    }
}
