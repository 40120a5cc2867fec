//! meridian-engine — dedup cohort, entry/exit scoring, budget & Kelly
//! sizing, regime classifier, panic monitor, and smart rotation. Pure
//! decision logic: no broker or DB I/O of its own (those live in
//! `meridian-networking`/`meridian-persistence`), wired together by the
//! `meridian-services` binaries.

pub mod add_position;
pub mod budget;
pub mod cohort;
pub mod dedup;
pub mod entry;
pub mod exit;
pub mod kelly;
pub mod panic;
pub mod regime;
pub mod rotation;

pub use add_position::{check_add_position, AddPositionBlock, AddPositionCandidate, AddPositionParams};
pub use cohort::CohortTracker;
pub use dedup::DedupBlock;
pub use entry::{score_entry, EntryScore};
pub use exit::{score_exit, ExitAction, ExitDecision};
pub use panic::PanicMonitor;
pub use regime::{classify_regime, IndexVote, Regime};
pub use rotation::{
    rotation_score, select_preclose_rotation_sells, select_rescue_candidate, select_smart_rotation_candidate,
    RotationCandidate, MAX_SMART_ROTATION_ATTEMPTS, ROTATION_GAP_THRESHOLD,
};
