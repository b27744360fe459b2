// src/pipeline/phase_engine.rs
//
// Per-frame stage sequence. Image work (cropping, classification, line
// extraction) happens before this point; the engine only sees detections
// and the signatures that were extracted for the frame.
//
//   gate.advance → hand stage → action stage → metrics sample

use super::event_bus::PhaseEvent;
use super::run_context::RunContext;
use crate::analysis::{ActionTransition, HandRole, LineSignature, TrajectorySample};
use crate::types::{ActionKind, Detection, PhaseLabels};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct FrameObservation<'a> {
    pub frame: usize,
    pub detections: &'a [Detection],
    pub poke: Option<LineSignature>,
    pub pen: Option<LineSignature>,
}

impl<'a> FrameObservation<'a> {
    pub fn new(frame: usize, detections: &'a [Detection]) -> Self {
        Self {
            frame,
            detections,
            poke: None,
            pen: None,
        }
    }

    pub fn signature(&self, kind: ActionKind) -> Option<LineSignature> {
        match kind {
            ActionKind::Poke => self.poke,
            ActionKind::Pen => self.pen,
        }
    }

    pub fn set_signature(&mut self, kind: ActionKind, signature: Option<LineSignature>) {
        match kind {
            ActionKind::Poke => self.poke = signature,
            ActionKind::Pen => self.pen = signature,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub labels: PhaseLabels,
    pub events: Vec<PhaseEvent>,
}

pub fn process_frame(ctx: &mut RunContext, obs: &FrameObservation<'_>) -> FrameOutcome {
    resolve_pending_end(ctx, obs.frame);
    hand_stage(ctx, obs);
    action_stage(ctx, obs);

    let labels = ctx.labels();
    ctx.metrics.sample(&labels);
    ctx.frames_processed += 1;

    FrameOutcome {
        labels,
        events: ctx.events.close_frame(),
    }
}

fn resolve_pending_end(ctx: &mut RunContext, frame: usize) {
    if let Some(end) = ctx.gate.advance(frame) {
        ctx.metrics.record_trial(end.duration_frames);
        ctx.close_trial(end.trial, end.end_frame, end.duration_frames);
        ctx.events.publish(PhaseEvent::TrialEnded {
            trial: end.trial,
            end_frame: end.end_frame,
            duration_frames: end.duration_frames,
        });
    }
}

fn hand_stage(ctx: &mut RunContext, obs: &FrameObservation<'_>) {
    let hands = ctx.hands.hands_in(obs.detections);

    match hands.as_slice() {
        [a, b] => {
            ctx.gate.on_both_hands();
            let (dominant, non_dominant) = ctx.roles.split(a, b);
            ctx.last_dominant = Some(dominant.position());

            // Dominant pick-ups are reported but never open a trial
            let sample = TrajectorySample::of(dominant);
            let observed = ctx.tracker_mut(HandRole::Dominant).observe(obs.frame, sample);
            if let Some(pick_up) = observed {
                debug!(
                    "Dominant ({}) hand pick-up at frame {}",
                    ctx.roles.side_of(HandRole::Dominant),
                    pick_up.frame
                );
                ctx.events.publish(PhaseEvent::PickUp {
                    frame: pick_up.frame,
                    role: HandRole::Dominant,
                });
            }

            let sample = TrajectorySample::of(non_dominant);
            let observed = ctx.tracker_mut(HandRole::NonDominant).observe(obs.frame, sample);
            if let Some(pick_up) = observed {
                ctx.pick_up_frames.push(pick_up.frame);
                ctx.events.publish(PhaseEvent::PickUp {
                    frame: pick_up.frame,
                    role: HandRole::NonDominant,
                });

                if let Some(start) = ctx.gate.on_pick_up(pick_up) {
                    ctx.metrics.reset_current();
                    ctx.open_trial(start.trial, start.frame);
                    if ctx.reset_actions_on_start {
                        ctx.poke.reset();
                        ctx.pen.reset();
                    }
                    ctx.events.publish(PhaseEvent::TrialStarted {
                        trial: start.trial,
                        frame: start.frame,
                    });
                }
            }
        }
        [only] => ctx.gate.on_single_hand(obs.frame, only.center_y),
        other => debug!("Frame {}: {} hands visible", obs.frame, other.len()),
    }
}

fn action_stage(ctx: &mut RunContext, obs: &FrameObservation<'_>) {
    let Some(dominant) = ctx.last_dominant else {
        return;
    };

    for kind in ActionKind::ALL {
        let Some(signature) = obs.signature(kind) else {
            continue;
        };
        let event = match ctx.detector_mut(kind).observe(obs.frame, signature, dominant) {
            Some(ActionTransition::Armed) => PhaseEvent::ActionArmed {
                kind,
                frame: obs.frame,
                signature,
            },
            Some(ActionTransition::Confirmed) => PhaseEvent::ActionConfirmed {
                kind,
                frame: obs.frame,
                signature,
            },
            None => continue,
        };
        ctx.events.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{HandRoles, HandSide};
    use crate::types::Config;

    fn hand(class_id: u32, x: f64, y: f64, h: f64) -> Detection {
        Detection {
            class_id,
            center_x: x,
            center_y: y,
            width: 0.2,
            height: h,
        }
    }

    fn context() -> RunContext {
        RunContext::new(&Config::default(), HandRoles::with_dominant(HandSide::Right))
    }

    fn step(ctx: &mut RunContext, frame: usize, detections: &[Detection]) -> FrameOutcome {
        process_frame(ctx, &FrameObservation::new(frame, detections))
    }

    #[test]
    fn test_static_hands_produce_no_events() {
        let mut ctx = context();
        let frame = [hand(0, 0.3, 0.6, 0.2), hand(1, 0.7, 0.6, 0.2)];
        for i in 0..10 {
            let out = step(&mut ctx, i, &frame);
            assert_eq!(out.labels, PhaseLabels::default());
            assert!(out.events.is_empty());
        }
        assert_eq!(ctx.metrics.snapshot().total_trials, 10);
        assert!(ctx.pick_up_frames.is_empty());
    }

    #[test]
    fn test_pick_up_opens_trial_and_single_hand_closes_it() {
        let mut ctx = context();
        let dominant = hand(1, 0.8, 0.5, 0.2);
        let path = [
            (0.30, 0.70, 0.20),
            (0.30, 0.70, 0.20),
            (0.30, 0.70, 0.20),
            (0.30, 0.70, 0.20),
            (0.42, 0.58, 0.20),
            (0.55, 0.45, 0.20),
            (0.59, 0.45, 0.17),
        ];
        for (i, (x, y, h)) in path.iter().enumerate() {
            let out = step(&mut ctx, i, &[hand(0, *x, *y, *h), dominant]);
            if i < 6 {
                assert_eq!(out.labels.start, 0, "frame {i}");
            } else {
                assert_eq!(out.labels.start, 1);
                assert_eq!(
                    out.events,
                    vec![
                        PhaseEvent::PickUp {
                            frame: 6,
                            role: HandRole::NonDominant
                        },
                        PhaseEvent::TrialStarted { trial: 1, frame: 6 },
                    ]
                );
            }
        }
        assert_eq!(ctx.pick_up_frames, vec![6]);

        // Lone hand drifting back down arms the end; it lands one frame later
        step(&mut ctx, 12, &[hand(1, 0.8, 0.40, 0.2)]);
        let armed = step(&mut ctx, 13, &[hand(1, 0.8, 0.45, 0.2)]);
        assert_eq!(armed.labels.end, 0);

        let ended = step(&mut ctx, 14, &[]);
        assert_eq!(ended.labels.end, 1);
        assert_eq!(
            ended.events,
            vec![PhaseEvent::TrialEnded {
                trial: 1,
                end_frame: 14,
                duration_frames: 8
            }]
        );
        assert_eq!(ctx.trials[0].end_frame, Some(14));
        assert_eq!(ctx.metrics.snapshot().mean_duration_frames, 8.0);
    }

    #[test]
    fn test_two_hand_frame_splits_lone_hand_stretches() {
        let mut ctx = context();
        let dominant = hand(1, 0.8, 0.5, 0.2);
        let path = [
            (0.30, 0.70, 0.20),
            (0.30, 0.70, 0.20),
            (0.42, 0.58, 0.20),
            (0.55, 0.45, 0.20),
            (0.59, 0.45, 0.17),
        ];
        for (i, (x, y, h)) in path.iter().enumerate() {
            step(&mut ctx, i, &[hand(0, *x, *y, *h), dominant]);
        }
        assert_eq!(ctx.labels().start, 1);

        step(&mut ctx, 10, &[hand(1, 0.8, 0.40, 0.2)]);
        step(&mut ctx, 11, &[hand(0, 0.59, 0.45, 0.17), dominant]);
        // Lower than frame 10, but frame 11 closed that stretch
        step(&mut ctx, 12, &[hand(1, 0.8, 0.45, 0.2)]);
        let out = step(&mut ctx, 13, &[]);
        assert_eq!(out.labels.end, 0);
        assert_eq!(ctx.gate.y_history_len(), 1);

        step(&mut ctx, 14, &[hand(1, 0.8, 0.50, 0.2)]);
        let ended = step(&mut ctx, 15, &[]);
        assert_eq!(ended.labels.end, 1);
        assert_eq!(ctx.trials[0].end_frame, Some(15));
    }

    #[test]
    fn test_dominant_pick_up_is_reported_without_opening_a_trial() {
        let mut ctx = context();
        let non_dominant = hand(0, 0.3, 0.6, 0.2);
        let path = [
            (0.70, 0.70, 0.20),
            (0.70, 0.70, 0.20),
            (0.58, 0.58, 0.20),
            (0.45, 0.45, 0.20),
            (0.41, 0.45, 0.17),
        ];
        let mut events = Vec::new();
        for (i, (x, y, h)) in path.iter().enumerate() {
            events.extend(step(&mut ctx, i, &[non_dominant, hand(1, *x, *y, *h)]).events);
        }
        assert_eq!(
            events,
            vec![PhaseEvent::PickUp {
                frame: 4,
                role: HandRole::Dominant
            }]
        );
        assert_eq!(ctx.labels().start, 0);
        assert!(ctx.pick_up_frames.is_empty());
    }

    #[test]
    fn test_poke_confirms_across_frames() {
        let mut ctx = context();
        let non_dominant = hand(0, 0.3, 0.6, 0.2);
        let sig = LineSignature::new(31.4, 2.0);

        let obs_at = |ctx: &mut RunContext, frame: usize, x: f64, poke: Option<LineSignature>| {
            let detections = [non_dominant, hand(1, x, 0.5, 0.2)];
            let mut obs = FrameObservation::new(frame, &detections);
            obs.poke = poke;
            process_frame(ctx, &obs)
        };

        assert_eq!(obs_at(&mut ctx, 8, 0.60, Some(sig)).labels.poke, 0);
        assert_eq!(obs_at(&mut ctx, 9, 0.60, None).labels.poke, 0);
        let armed = obs_at(&mut ctx, 10, 0.60, Some(sig));
        assert_eq!(armed.labels.poke, 1);
        assert!(matches!(
            armed.events.as_slice(),
            [PhaseEvent::ActionArmed {
                kind: ActionKind::Poke,
                frame: 10,
                ..
            }]
        ));
        for frame in 11..15 {
            assert_eq!(obs_at(&mut ctx, frame, 0.61, None).labels.poke, 1);
        }
        let confirmed = obs_at(&mut ctx, 15, 0.62, Some(LineSignature::new(31.41, 2.01)));
        assert_eq!(confirmed.labels.poke, 2);
        assert_eq!(confirmed.labels.pen, 0);
    }

    #[test]
    fn test_actions_wait_for_dominant_hand() {
        let mut ctx = context();
        let sig = LineSignature::new(31.4, 2.0);
        for frame in 0..3 {
            let mut obs = FrameObservation::new(frame, &[]);
            obs.poke = Some(sig);
            process_frame(&mut ctx, &obs);
        }
        assert_eq!(ctx.poke.window_len(), 0);
        assert_eq!(ctx.labels().poke, 0);
    }

    #[test]
    fn test_invariants_hold_over_noisy_sequence() {
        let mut ctx = context();
        for frame in 0..200usize {
            let t = frame as f64;
            let detections: Vec<Detection> = match frame % 7 {
                0 | 1 => vec![hand(1, 0.7, 0.3 + (t * 0.37).sin().abs() * 0.5, 0.2)],
                _ => vec![
                    hand(0, 0.2 + (t * 0.11).cos().abs() * 0.3, 0.8 - (frame % 5) as f64 * 0.12, 0.25 - (frame % 3) as f64 * 0.03),
                    hand(1, 0.8, 0.5, 0.2),
                ],
            };
            let out = step(&mut ctx, frame, &detections);
            assert!(out.labels.end <= out.labels.start);
            assert!(ctx.dominant_tracker.len() <= 3);
            assert!(ctx.non_dominant_tracker.len() <= 3);
            assert!(ctx.gate.y_history_len() <= 3);
        }

        let starts: Vec<usize> = ctx.trials.iter().map(|t| t.start_frame).collect();
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] > 4);
        }
    }
}
