pub mod detection;
pub mod service;
pub mod states;
pub mod store;
pub mod transitions;

pub use detection::{detect_mission_type, is_deviation, keyword_tokens, MissionDetection};
pub use service::{MissionInsight, MissionObservation, MissionService};
pub use states::{FunnelStage, Mission, MissionAction, MissionId, MissionStatus, MissionType};
pub use store::{InMemoryMissionStore, MissionStore};
pub use transitions::{apply_action, legal_transitions, next_stage, TransitionOutcome};
