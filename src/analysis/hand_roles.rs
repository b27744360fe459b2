// src/analysis/hand_roles.rs
//
// One-shot pre-pass over the whole detection sequence. The hand that
// leaves the frame more often is the non-dominant one (it fetches objects);
// its usual side relative to the other hand fixes both positions.

use crate::types::Detection;
use serde::Serialize;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for HandSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandRole {
    Dominant,
    NonDominant,
}

impl fmt::Display for HandRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dominant => f.write_str("dominant"),
            Self::NonDominant => f.write_str("non-dominant"),
        }
    }
}

/// Side assignment for the run. Fields are private: once resolved the
/// assignment cannot change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HandRoles {
    dominant: HandSide,
    non_dominant: HandSide,
}

impl Default for HandRoles {
    fn default() -> Self {
        Self::with_dominant(HandSide::Right)
    }
}

impl HandRoles {
    pub fn with_dominant(dominant: HandSide) -> Self {
        Self {
            dominant,
            non_dominant: dominant.opposite(),
        }
    }

    pub fn dominant(&self) -> HandSide {
        self.dominant
    }

    pub fn non_dominant(&self) -> HandSide {
        self.non_dominant
    }

    pub fn side_of(&self, role: HandRole) -> HandSide {
        match role {
            HandRole::Dominant => self.dominant,
            HandRole::NonDominant => self.non_dominant,
        }
    }

    /// Split a two-hand frame into (dominant, non_dominant) by x position.
    pub fn split<'a>(&self, a: &'a Detection, b: &'a Detection) -> (&'a Detection, &'a Detection) {
        let b_is_dominant = match self.dominant {
            HandSide::Right => b.center_x > a.center_x,
            HandSide::Left => b.center_x < a.center_x,
        };
        if b_is_dominant {
            (b, a)
        } else {
            (a, b)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleResolution {
    pub roles: HandRoles,
    pub non_dominant_id: u32,
    pub disappearances: [u32; 2],
    pub non_dominant_left_votes: u32,
    pub non_dominant_right_votes: u32,
}

fn first_x(detections: &[Detection], class_id: u32) -> Option<f64> {
    detections
        .iter()
        .find(|d| d.class_id == class_id)
        .map(|d| d.center_x)
}

pub fn resolve_hand_roles<'a, I>(frames: I, hand_ids: [u32; 2]) -> RoleResolution
where
    I: IntoIterator<Item = &'a [Detection]>,
{
    let frames: Vec<&[Detection]> = frames.into_iter().collect();

    // Pass 1: present -> absent transitions per hand id
    let mut disappearances = [0u32; 2];
    let mut was_present = [false; 2];
    for detections in &frames {
        for (slot, &id) in hand_ids.iter().enumerate() {
            let present = detections.iter().any(|d| d.class_id == id);
            if was_present[slot] && !present {
                disappearances[slot] += 1;
            }
            was_present[slot] = present;
        }
    }

    // Ties go to the first id
    let non_dominant_slot = if disappearances[1] > disappearances[0] { 1 } else { 0 };
    let dominant_slot = 1 - non_dominant_slot;
    let non_dominant_id = hand_ids[non_dominant_slot];
    let dominant_id = hand_ids[dominant_slot];

    // Pass 2: side vote over frames with both hands
    let mut left_votes = 0u32;
    let mut right_votes = 0u32;
    for detections in &frames {
        if let (Some(nd_x), Some(d_x)) = (
            first_x(detections, non_dominant_id),
            first_x(detections, dominant_id),
        ) {
            if nd_x < d_x {
                left_votes += 1;
            } else {
                right_votes += 1;
            }
        }
    }

    let non_dominant_side = if right_votes > left_votes {
        HandSide::Right
    } else {
        HandSide::Left
    };
    let roles = HandRoles::with_dominant(non_dominant_side.opposite());

    info!(
        "✋ Hand roles resolved: dominant={} non-dominant={} (id {} disappeared {}x vs {}x, side votes L{}/R{})",
        roles.dominant(),
        roles.non_dominant(),
        non_dominant_id,
        disappearances[non_dominant_slot],
        disappearances[dominant_slot],
        left_votes,
        right_votes
    );

    RoleResolution {
        roles,
        non_dominant_id,
        disappearances,
        non_dominant_left_votes: left_votes,
        non_dominant_right_votes: right_votes,
    }
}
