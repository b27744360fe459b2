// src/analysis/mod.rs
//
// Phase detection modules.
//
// Signal flow:
//   All label files → hand_roles (pre-pass) → HandRoles
//   Non-dominant hand → trajectory → PickUpEvent ─┐
//   Lone visible hand ────────────────────────────┼→ trial_gate → start / end
//   Crop pair → line_signature → action_detector (poke, pen) → stage 0/1/2
//
// Orchestrated by pipeline::phase_engine.

pub mod action_detector;
pub mod hand_roles;
pub mod line_signature;
pub mod trajectory;
pub mod trial_gate;

pub use action_detector::{ActionDetector, ActionStage, ActionTransition};
pub use hand_roles::{resolve_hand_roles, HandRole, HandRoles, HandSide, RoleResolution};
pub use line_signature::{ActionBounds, LineSignature, LineSignatureExtractor, PolarLine};
pub use trajectory::{PickUpEvent, TrajectorySample, TrajectoryTracker};
pub use trial_gate::{GateState, TrialEnd, TrialGate, TrialStart};
