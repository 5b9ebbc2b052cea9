use super::{GeneratorPlan, VirtualEvent};
use crate::core::{CanId, Payload};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tokio::time::{Duration, Instant};

/// Stock background patterns for the first five senders
const NOISE_PATTERNS: &[(u16, [u8; 8])] = &[
    (0x100, [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
    (0x200, [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]),
    (0x300, [0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5]),
    (0x400, [0x12, 0x34, 0x56, 0x78, 0x90, 0xAB, 0xCD, 0xEF]),
    (0x500, [0xFE, 0xDC, 0xBA, 0x09, 0x87, 0x65, 0x43, 0x21]),
];

/// Probability that a noise frame gets one nibble mutated
const MUTATION_PROBABILITY: f64 = 0.3;

/// Probability that a tick carries an active event instead of noise
const EVENT_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct VirtualSender {
    pub id: CanId,
    pub base: Payload,
}

/// Deterministic emission schedule and payload source for one plan
pub struct NoiseSchedule {
    senders: Vec<VirtualSender>,
    due: BinaryHeap<Reverse<(Instant, usize)>>,
    period: Duration,
    jitter: f64,
    rng: StdRng,
}

impl NoiseSchedule {
    /// Senders are phase-staggered from `anchor` so that together they emit
    /// at the plan's aggregate rate.
    pub fn new(plan: &GeneratorPlan, anchor: Instant) -> Self {
        let mut rng = StdRng::seed_from_u64(plan.seed);
        let senders = build_senders(plan.sender_count, &mut rng);
        let period = plan.sender_period();

        let count = senders.len() as u32;
        let due = (0..senders.len())
            .map(|idx| Reverse((anchor + period * (idx as u32 + 1) / count, idx)))
            .collect();

        Self {
            senders,
            due,
            period,
            jitter: plan.jitter,
            rng,
        }
    }

    pub fn senders(&self) -> &[VirtualSender] {
        &self.senders
    }

    /// Instant of the earliest scheduled emission
    pub fn next_due(&self) -> Option<Instant> {
        self.due.peek().map(|Reverse((at, _))| *at)
    }

    /// Pop the earliest emission, reschedule its sender, and produce the
    /// frame contents. Active events pre-empt noise on a share of ticks.
    pub fn fire(&mut self, active_events: &[VirtualEvent]) -> Option<(CanId, Payload)> {
        let Reverse((at, idx)) = self.due.pop()?;
        let next = at + self.jittered_period();
        self.due.push(Reverse((next, idx)));

        if !active_events.is_empty() && self.rng.random_bool(EVENT_PROBABILITY) {
            let event = &active_events[self.rng.random_range(0..active_events.len())];
            return Some((event.id, event.on_data));
        }

        let sender = &self.senders[idx];
        let (id, base) = (sender.id, sender.base);
        Some((id, self.mutate(base)))
    }

    fn jittered_period(&mut self) -> Duration {
        if self.jitter == 0.0 {
            return self.period;
        }
        let factor = 1.0 + self.jitter * self.rng.random_range(-1.0..1.0);
        self.period.mul_f64(factor)
    }

    fn mutate(&mut self, base: Payload) -> Payload {
        if base.is_empty() || !self.rng.random_bool(MUTATION_PROBABILITY) {
            return base;
        }
        let mut bytes = base.as_bytes().to_vec();
        let nibble = self.rng.random_range(0..bytes.len() * 2);
        let value: u8 = self.rng.random_range(0..16);
        let byte = &mut bytes[nibble / 2];
        *byte = if nibble % 2 == 0 {
            (*byte & 0x0F) | (value << 4)
        } else {
            (*byte & 0xF0) | value
        };
        Payload::new(&bytes).unwrap_or(base)
    }
}

fn build_senders(count: usize, rng: &mut StdRng) -> Vec<VirtualSender> {
    (0..count)
        .map(|idx| match NOISE_PATTERNS.get(idx) {
            Some((raw, bytes)) => VirtualSender {
                id: CanId::standard(*raw),
                base: Payload::from_array(*bytes),
            },
            None => {
                let mut bytes = [0u8; 8];
                rng.fill(&mut bytes);
                let offset = ((idx - NOISE_PATTERNS.len()) % 0x100) as u16;
                VirtualSender {
                    id: CanId::standard(0x600 + offset),
                    base: Payload::from_array(bytes),
                }
            }
        })
        .collect()
}
