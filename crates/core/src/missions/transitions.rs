use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::missions::states::{FunnelStage, Mission, MissionAction, MissionStatus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FunnelStage,
    pub to: FunnelStage,
    pub action: MissionAction,
}

impl TransitionOutcome {
    pub fn stage_changed(&self) -> bool {
        self.from != self.to
    }
}

/// Funnel table. `None` means the action leaves the stage unchanged.
pub fn next_stage(current: FunnelStage, action: MissionAction) -> Option<FunnelStage> {
    use FunnelStage::{Arriving, Browsing, Checkout, Comparing, Decided};
    use MissionAction::{AddToCart, Checkout as CheckoutAction, Message, Question};

    match (current, action) {
        (Arriving, Message) => Some(Browsing),
        (Browsing, Question) => Some(Comparing),
        (Arriving | Browsing | Comparing, AddToCart) => Some(Decided),
        (Arriving | Browsing | Comparing | Decided, CheckoutAction) => Some(Checkout),
        _ => None,
    }
}

/// Every `(from, action, to)` edge of the funnel table.
pub fn legal_transitions() -> Vec<(FunnelStage, MissionAction, FunnelStage)> {
    FunnelStage::ALL
        .iter()
        .flat_map(|stage| {
            MissionAction::ALL.iter().filter_map(move |action| {
                next_stage(*stage, *action).map(|next| (*stage, *action, next))
            })
        })
        .collect()
}

fn bump_counters(mission: &mut Mission, action: MissionAction) {
    match action {
        MissionAction::ViewItem => mission.items_viewed += 1,
        MissionAction::AddToCart => mission.items_added += 1,
        MissionAction::Question => mission.questions_asked += 1,
        MissionAction::Message | MissionAction::Checkout => {}
    }
}

/// Applies an observed action: counters, then the funnel table, then activity refresh.
pub fn apply_action(
    mission: &mut Mission,
    action: MissionAction,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    if mission.status != MissionStatus::Active {
        return Err(DomainError::MissionNotActive {
            mission_id: mission.id.0.clone(),
            status: mission.status,
            action,
        });
    }

    let from = mission.funnel_stage;
    bump_counters(mission, action);
    if let Some(to) = next_stage(from, action) {
        mission.funnel_stage = to;
    }
    mission.last_active_at = now;

    Ok(TransitionOutcome { from, to: mission.funnel_stage, action })
}
