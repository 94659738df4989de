pub mod board;
pub mod clock;
pub mod coordinator;
pub mod delta;
pub mod identity;
pub mod normalize;
pub mod ranker;
pub mod record;
pub mod scheduler;
pub mod source;

pub use board::Board;
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{FetchCoordinator, Refreshed};
pub use delta::{compute_deltas, Direction, RankDelta, RankSnapshot, Transition, TransitionItem};
pub use identity::{signature_of, DisplayKey, DisplayKeyRegistry, IdentitySignature};
pub use normalize::{normalize_row, normalize_rows};
pub use ranker::{RankedEntry, Ranker, UntaggedPolicy};
pub use record::{Category, ParticipantRecord, RawRecord, Submission};
pub use scheduler::{
    ApplyMode, ApplyScheduler, PendingApply, SchedulerEvent, SchedulerSettings, TimerRequest,
    TimerToken, TransitionPlan, ViewPhase,
};
pub use source::{parse_payload, DataSource, SourceError};
