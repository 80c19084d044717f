//! The label ring: a fixed set of minute labels kept in step with time.
//!
//! The ring holds one label per major marker. Their minutes always form one
//! contiguous run with no gaps or duplicates. Once a minute, the oldest label
//! (the one that has just slipped round the back) is handed the next minute
//! nobody shows yet and its geometry is requested from the worker. The old
//! mesh stays up until the new one arrives.

use crate::angle::{angle_for_minute, is_in_hidden_zone, world_angle_for_minute, wrap};
use crate::common::{LabelId, MinuteIndex, RequestId, MS_PER_MINUTE, TAU};
use crate::error::GeometryError;
use crate::factory::{GeometryReply, GeometryRequest, LabelGeometry, StyleParams};
use crate::formatter::TimeFormatter;
use slotmap::SlotMap;
use tracing::{debug, info};

/// The mesh currently installed for a label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMesh {
    /// The request that produced this geometry; `None` for the empty
    /// placeholder a label starts with.
    pub source: Option<RequestId>,
    pub geometry: LabelGeometry,
}

/// A geometry request still waiting on a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_id: RequestId,
    pub minute_index: MinuteIndex,
    pub issued_at_ms: i64,
}

/// One time label on the cylinder.
#[derive(Debug, Clone)]
pub struct Label {
    pub minute_index: MinuteIndex,
    pub display_text: String,
    /// Fixed angle in the co-rotating frame, `[0, 2π)`.
    pub angle: f64,
    pub mesh: LabelMesh,
    pub pending: Option<PendingRequest>,
}

/// Where a major-marker slot starts out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotAssignment {
    pub slot: u32,
    /// Minutes relative to the minute in progress.
    pub offset: i64,
    /// World angle of the slot at seeding time.
    pub world_angle: f64,
}

/// What applying a geometry reply did.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// The new mesh is up and the previous one was disposed.
    Installed {
        label: LabelId,
        minute_index: MinuteIndex,
        request_id: RequestId,
    },
    /// The reply answers an assignment that no longer exists. Nothing changed.
    Superseded {
        minute_index: MinuteIndex,
        request_id: RequestId,
    },
    /// Generation failed; the label keeps its previous mesh.
    Failed(GeometryError),
}

/// Decides which minute each major-marker slot shows when the ring is seeded.
///
/// Slot `j` sits at world angle `2π(j − progress)/N`, where `progress` is the
/// fraction of the current minute already gone. Walking the slots in angular
/// order, the first ones take the current and following minutes. Past the
/// half-way slot, a slot still looks forward only while it is hidden round
/// the back; the first slot that is not turns to the past (`j − N`), and so do
/// all the slots after it, which keeps the run contiguous.
pub fn initial_assignment(num_major_markers: u32, now_ms: i64) -> Vec<SlotAssignment> {
    let n = num_major_markers;
    let progress = now_ms.rem_euclid(MS_PER_MINUTE) as f64 / MS_PER_MINUTE as f64;
    let mut looking_back = false;

    (0..n)
        .map(|j| {
            let world_angle = wrap(TAU * (f64::from(j) - progress) / f64::from(n));
            let forward = !looking_back && (2 * j <= n || is_in_hidden_zone(world_angle));
            looking_back = !forward;
            let offset = if forward {
                i64::from(j)
            } else {
                i64::from(j) - i64::from(n)
            };
            SlotAssignment {
                slot: j,
                offset,
                world_angle,
            }
        })
        .collect()
}

/// Owns every label of one clock.
#[derive(Debug)]
pub struct LabelRing {
    labels: SlotMap<LabelId, Label>,
    /// Label keys in slot (angular) order.
    slots: Vec<LabelId>,
    num_major_markers: u32,
    cycle_duration_ms: i64,
    formatter: TimeFormatter,
    style: StyleParams,
    next_request: u64,
    disposed_meshes: u64,
}

impl LabelRing {
    /// Creates an empty ring. Call [`LabelRing::seed`] before use.
    pub fn new(num_major_markers: u32, formatter: TimeFormatter, style: StyleParams) -> Self {
        Self {
            labels: SlotMap::with_key(),
            slots: Vec::new(),
            num_major_markers,
            cycle_duration_ms: i64::from(num_major_markers) * MS_PER_MINUTE,
            formatter,
            style,
            next_request: 0,
            disposed_meshes: 0,
        }
    }

    /// (Re)builds every label for `now_ms`, disposing whatever was installed.
    ///
    /// Returns one geometry request per label.
    pub fn seed(&mut self, now_ms: i64, rotation: f64) -> Vec<GeometryRequest> {
        self.dispose_all();
        self.labels.clear();
        self.slots.clear();

        let current = MinuteIndex::containing(now_ms);
        let mut requests = Vec::with_capacity(self.num_major_markers as usize);
        for assignment in initial_assignment(self.num_major_markers, now_ms) {
            let minute_index = current.offset(assignment.offset);
            let label = Label {
                minute_index,
                display_text: self.formatter.format_minute(minute_index),
                angle: angle_for_minute(minute_index, self.cycle_duration_ms, now_ms, rotation),
                mesh: LabelMesh::default(),
                pending: None,
            };
            let id = self.labels.insert(label);
            self.slots.push(id);
            requests.push(self.issue_request(id, now_ms));
        }

        info!(
            "Label ring seeded with {} labels: {:?}.",
            self.slots.len(),
            self.minute_indices().iter().map(|m| m.0).collect::<Vec<_>>()
        );
        requests
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_major_markers(&self) -> u32 {
        self.num_major_markers
    }

    pub fn cycle_duration_ms(&self) -> i64 {
        self.cycle_duration_ms
    }

    pub fn formatter(&self) -> &TimeFormatter {
        &self.formatter
    }

    /// Meshes disposed over the ring's lifetime.
    pub fn disposed_meshes(&self) -> u64 {
        self.disposed_meshes
    }

    pub fn get(&self, id: LabelId) -> Option<&Label> {
        self.labels.get(id)
    }

    /// Labels in slot order.
    pub fn labels(&self) -> impl Iterator<Item = (LabelId, &Label)> {
        self.slots
            .iter()
            .filter_map(|&id| self.labels.get(id).map(|label| (id, label)))
    }

    /// Every minute currently shown, sorted.
    pub fn minute_indices(&self) -> Vec<MinuteIndex> {
        let mut minutes: Vec<_> = self.labels.values().map(|l| l.minute_index).collect();
        minutes.sort_unstable();
        minutes
    }

    /// True when the minutes form one run without gaps or duplicates.
    pub fn is_contiguous(&self) -> bool {
        let minutes = self.minute_indices();
        minutes.windows(2).all(|w| w[1].0 == w[0].0 + 1)
    }

    /// The label showing the earliest minute.
    pub fn oldest(&self) -> Option<(LabelId, &Label)> {
        self.labels.iter().min_by_key(|(_, label)| label.minute_index)
    }

    /// Where the oldest label currently appears in the world frame.
    pub fn oldest_world_angle(&self, now_ms: i64) -> Option<f64> {
        self.oldest().map(|(_, label)| {
            world_angle_for_minute(label.minute_index, self.cycle_duration_ms, now_ms)
        })
    }

    pub fn oldest_is_hidden(&self, now_ms: i64) -> bool {
        self.oldest_world_angle(now_ms)
            .is_some_and(is_in_hidden_zone)
    }

    /// Hands the oldest label the next minute not yet shown and asks for its
    /// geometry. The label keeps its current mesh until the reply arrives.
    pub fn advance_oldest(&mut self, now_ms: i64, rotation: f64) -> Option<GeometryRequest> {
        let (id, _) = self.oldest()?;
        let n = i64::from(self.num_major_markers);
        let cycle = self.cycle_duration_ms;
        let formatter = self.formatter;

        let label = self.labels.get_mut(id)?;
        let retired = label.minute_index;
        label.minute_index = retired.offset(n);
        label.display_text = formatter.format_minute(label.minute_index);
        label.angle = angle_for_minute(label.minute_index, cycle, now_ms, rotation);
        debug!(
            "Label {:?}: {} -> {} '{}' at {:.3} rad.",
            id, retired, label.minute_index, label.display_text, label.angle
        );

        Some(self.issue_request(id, now_ms))
    }

    /// Applies a worker reply.
    ///
    /// The reply is only installed if a label still shows its minute AND is
    /// still waiting on exactly this request. Anything else answers an
    /// assignment that has since moved on and is dropped untouched.
    pub fn apply_reply(&mut self, reply: GeometryReply) -> ReplyOutcome {
        let target = self.labels.iter_mut().find(|(_, label)| {
            label.minute_index == reply.minute_index
                && label
                    .pending
                    .is_some_and(|p| p.request_id == reply.request_id)
        });
        let Some((id, label)) = target else {
            debug!(
                "Dropping {} for {}: superseded.",
                reply.request_id, reply.minute_index
            );
            return ReplyOutcome::Superseded {
                minute_index: reply.minute_index,
                request_id: reply.request_id,
            };
        };

        label.pending = None;
        match reply.result {
            Ok(geometry) => {
                let previous = std::mem::replace(
                    &mut label.mesh,
                    LabelMesh {
                        source: Some(reply.request_id),
                        geometry,
                    },
                );
                if previous.source.is_some() {
                    self.disposed_meshes += 1;
                }
                drop(previous);
                ReplyOutcome::Installed {
                    label: id,
                    minute_index: reply.minute_index,
                    request_id: reply.request_id,
                }
            }
            Err(err) => ReplyOutcome::Failed(err),
        }
    }

    /// Re-issues every request that has been pending for longer than
    /// `timeout_ms`. The stale request ids stop matching, so late replies to
    /// them are dropped.
    pub fn reissue_overdue(&mut self, now_ms: i64, timeout_ms: i64) -> Vec<GeometryRequest> {
        let overdue: Vec<LabelId> = self
            .labels
            .iter()
            .filter(|(_, label)| {
                label
                    .pending
                    .is_some_and(|p| now_ms - p.issued_at_ms >= timeout_ms)
            })
            .map(|(id, _)| id)
            .collect();
        overdue
            .into_iter()
            .map(|id| self.issue_request(id, now_ms))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.labels.values().filter(|l| l.pending.is_some()).count()
    }

    /// Disposes every installed mesh and forgets pending requests. Labels
    /// stay, showing nothing. Returns how many meshes were disposed.
    pub fn dispose_all(&mut self) -> u64 {
        let mut disposed = 0;
        for label in self.labels.values_mut() {
            label.pending = None;
            if std::mem::take(&mut label.mesh).source.is_some() {
                disposed += 1;
            }
        }
        self.disposed_meshes += disposed;
        disposed
    }

    fn issue_request(&mut self, id: LabelId, now_ms: i64) -> GeometryRequest {
        self.next_request += 1;
        let request_id = RequestId(self.next_request);
        let style = self.style;
        let label = &mut self.labels[id];
        label.pending = Some(PendingRequest {
            request_id,
            minute_index: label.minute_index,
            issued_at_ms: now_ms,
        });
        GeometryRequest {
            request_id,
            minute_index: label.minute_index,
            display_text: label.display_text.clone(),
            target_angle: label.angle,
            style,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::to_world;
    use crate::formatter::Language;
    use crate::rotation::RotationClock;
    use chrono_tz::Tz;

    const BASE_MINUTE: i64 = 28_400_000;

    fn ring(n: u32) -> LabelRing {
        LabelRing::new(
            n,
            TimeFormatter::new(Language::EnUs, Tz::UTC),
            StyleParams::default(),
        )
    }

    fn seeded(n: u32, now_ms: i64) -> (LabelRing, Vec<GeometryRequest>) {
        let mut ring = ring(n);
        let rotation = RotationClock::new(n).angle_at(now_ms);
        let requests = ring.seed(now_ms, rotation);
        (ring, requests)
    }

    fn geometry_tagged(tag: f32) -> LabelGeometry {
        LabelGeometry {
            positions: vec![tag; 9],
            normals: vec![0.0; 9],
        }
    }

    fn ok_reply(request: &GeometryRequest, tag: f32) -> GeometryReply {
        GeometryReply {
            request_id: request.request_id,
            minute_index: request.minute_index,
            result: Ok(geometry_tagged(tag)),
        }
    }

    fn label_showing(ring: &LabelRing, minute: i64) -> &Label {
        ring.labels()
            .map(|(_, l)| l)
            .find(|l| l.minute_index == MinuteIndex(minute))
            .unwrap()
    }

    #[test]
    fn seeding_covers_a_contiguous_run_around_now() {
        for n in [2, 3, 4, 5, 8, 12] {
            for second in [0, 1, 7, 15, 29, 30, 31, 44, 45, 52, 59] {
                let now = BASE_MINUTE * MS_PER_MINUTE + second * 1_000 + 250;
                let (ring, requests) = seeded(n, now);
                assert_eq!(ring.len(), n as usize);
                assert_eq!(requests.len(), n as usize);
                assert!(ring.is_contiguous(), "n={n} s={second}: {:?}", ring.minute_indices());
                assert!(
                    ring.minute_indices().contains(&MinuteIndex(BASE_MINUTE)),
                    "current minute missing for n={n} s={second}"
                );
            }
        }
    }

    #[test]
    fn seeding_places_labels_where_their_minute_appears() {
        let n = 5;
        let now = BASE_MINUTE * MS_PER_MINUTE + 37_000;
        let (ring, _) = seeded(n, now);
        let rotation = RotationClock::new(n).angle_at(now);
        for (_, label) in ring.labels() {
            let world = world_angle_for_minute(label.minute_index, ring.cycle_duration_ms(), now);
            let shown = to_world(label.angle, rotation);
            let diff = (shown - world).abs();
            assert!(diff < 1e-9 || (TAU - diff) < 1e-9);
        }
    }

    #[test]
    fn slot_offsets_follow_the_round_the_back_rule() {
        // Four markers, a tenth into the minute: slot 3 is at ~1.45π, in view.
        let offsets: Vec<_> = initial_assignment(4, 6_000).iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, -1]);
        // Nine tenths in: slot 3 is at ~1.05π, round the back, so it looks ahead.
        let offsets: Vec<_> = initial_assignment(4, 54_000).iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3]);
    }

    #[test]
    fn contiguity_survives_every_replacement() {
        for n in [2, 3, 4, 5, 8] {
            let clock = RotationClock::new(n);
            let mut now = BASE_MINUTE * MS_PER_MINUTE + 12_345;
            let (mut ring, _) = seeded(n, now);
            for _ in 0..(4 * n) {
                now += MS_PER_MINUTE;
                let before = ring.minute_indices();
                let request = ring.advance_oldest(now, clock.angle_at(now)).unwrap();
                let after = ring.minute_indices();
                assert!(ring.is_contiguous(), "n={n}: {after:?}");
                assert_eq!(after.len(), n as usize);
                assert_eq!(after[0], before[1]);
                assert_eq!(*after.last().unwrap(), before.last().unwrap().offset(1));
                assert_eq!(request.minute_index, *after.last().unwrap());
            }
        }
    }

    #[test]
    fn replacement_targets_the_oldest_label_only() {
        // 11:00 exactly with five markers seeds minutes 10..=14 relative to
        // the base.
        let n = 5;
        let now = (BASE_MINUTE + 11) * MS_PER_MINUTE;
        let (mut ring, _) = seeded(n, now);
        let expected: Vec<_> = (10..=14).map(|m| MinuteIndex(BASE_MINUTE + m)).collect();
        assert_eq!(ring.minute_indices(), expected);

        let snapshot: Vec<_> = ring
            .labels()
            .map(|(id, l)| (id, l.minute_index, l.angle, l.display_text.clone()))
            .collect();
        let (oldest_id, _) = ring.oldest().unwrap();

        let later = now + MS_PER_MINUTE;
        let request = ring
            .advance_oldest(later, RotationClock::new(n).angle_at(later))
            .unwrap();
        assert_eq!(request.minute_index, MinuteIndex(BASE_MINUTE + 15));

        for (id, minute, angle, text) in snapshot {
            let label = ring.get(id).unwrap();
            if id == oldest_id {
                assert_eq!(minute, MinuteIndex(BASE_MINUTE + 10));
                assert_eq!(label.minute_index, MinuteIndex(BASE_MINUTE + 15));
                assert_ne!(label.display_text, text);
                // Same slot: five minutes on is a full turn later.
                let diff = (label.angle - angle).abs();
                assert!(diff < 1e-9 || TAU - diff < 1e-9, "moved by {diff}");
            } else {
                assert_eq!(label.minute_index, minute);
                assert_eq!(label.display_text, text);
            }
        }
    }

    #[test]
    fn late_reply_for_a_superseded_minute_is_dropped() {
        let n = 5;
        let now = (BASE_MINUTE + 11) * MS_PER_MINUTE;
        let (mut ring, requests) = seeded(n, now);
        let for_10 = requests
            .iter()
            .find(|r| r.minute_index == MinuteIndex(BASE_MINUTE + 10))
            .unwrap()
            .clone();

        // Reassigned to 15 before the reply for 10 comes back.
        let later = now + MS_PER_MINUTE;
        let for_15 = ring
            .advance_oldest(later, RotationClock::new(n).angle_at(later))
            .unwrap();
        assert_eq!(for_15.minute_index, MinuteIndex(BASE_MINUTE + 15));

        // 15 resolves first, then the stale 10 limps in.
        let installed = ring.apply_reply(ok_reply(&for_15, 15.0));
        assert!(matches!(installed, ReplyOutcome::Installed { .. }));
        let stale = ring.apply_reply(ok_reply(&for_10, 10.0));
        assert_eq!(
            stale,
            ReplyOutcome::Superseded {
                minute_index: MinuteIndex(BASE_MINUTE + 10),
                request_id: for_10.request_id,
            }
        );

        let label = label_showing(&ring, BASE_MINUTE + 15);
        assert_eq!(label.mesh.source, Some(for_15.request_id));
        assert_eq!(label.mesh.geometry, geometry_tagged(15.0));
        assert!(label.pending.is_none());
    }

    #[test]
    fn stale_reply_arriving_first_does_not_clobber_the_new_assignment() {
        let n = 4;
        let now = BASE_MINUTE * MS_PER_MINUTE + 10_000;
        let (mut ring, requests) = seeded(n, now);
        let (oldest_id, oldest) = ring.oldest().unwrap();
        let old_minute = oldest.minute_index;
        let for_old = requests
            .iter()
            .find(|r| r.minute_index == old_minute)
            .unwrap()
            .clone();

        ring.advance_oldest(now + 1_000, RotationClock::new(n).angle_at(now + 1_000));
        assert!(matches!(
            ring.apply_reply(ok_reply(&for_old, 1.0)),
            ReplyOutcome::Superseded { .. }
        ));
        let label = ring.get(oldest_id).unwrap();
        assert!(label.pending.is_some());
        assert_eq!(label.mesh, LabelMesh::default());
    }

    #[test]
    fn failed_generation_keeps_the_previous_mesh() {
        let n = 4;
        let clock = RotationClock::new(n);
        let now = BASE_MINUTE * MS_PER_MINUTE + 10_000;
        let (mut ring, requests) = seeded(n, now);
        for request in &requests {
            ring.apply_reply(ok_reply(request, request.minute_index.0 as f32));
        }
        let (oldest_id, _) = ring.oldest().unwrap();
        let before = ring.get(oldest_id).unwrap().mesh.clone();

        let request = ring.advance_oldest(now + 60_000, clock.angle_at(now + 60_000)).unwrap();
        let outcome = ring.apply_reply(GeometryReply {
            request_id: request.request_id,
            minute_index: request.minute_index,
            result: Err(GeometryError::new(
                request.request_id,
                request.minute_index,
                "worker fell over",
            )),
        });
        assert!(matches!(outcome, ReplyOutcome::Failed(ref e) if e.request_id == request.request_id));
        let label = ring.get(oldest_id).unwrap();
        assert_eq!(label.mesh, before);
        assert!(label.pending.is_none());
    }

    #[test]
    fn installing_disposes_the_previous_mesh_once() {
        let n = 3;
        let clock = RotationClock::new(n);
        let now = BASE_MINUTE * MS_PER_MINUTE;
        let (mut ring, requests) = seeded(n, now);
        for request in &requests {
            ring.apply_reply(ok_reply(request, 0.0));
        }
        assert_eq!(ring.disposed_meshes(), 0);

        let request = ring.advance_oldest(now + 60_000, clock.angle_at(now + 60_000)).unwrap();
        ring.apply_reply(ok_reply(&request, 1.0));
        assert_eq!(ring.disposed_meshes(), 1);

        // A duplicate delivery matches nothing and disposes nothing.
        ring.apply_reply(ok_reply(&request, 1.0));
        assert_eq!(ring.disposed_meshes(), 1);

        assert_eq!(ring.dispose_all(), 3);
        assert_eq!(ring.dispose_all(), 0);
        assert_eq!(ring.disposed_meshes(), 4);
    }

    #[test]
    fn overdue_requests_are_reissued_under_new_ids() {
        let n = 4;
        let now = BASE_MINUTE * MS_PER_MINUTE;
        let (mut ring, requests) = seeded(n, now);
        ring.apply_reply(ok_reply(&requests[0], 0.0));
        assert_eq!(ring.pending_count(), 3);

        assert!(ring.reissue_overdue(now + 29_999, 30_000).is_empty());
        let reissued = ring.reissue_overdue(now + 30_000, 30_000);
        assert_eq!(reissued.len(), 3);
        for fresh in &reissued {
            let first_try = requests
                .iter()
                .find(|r| r.minute_index == fresh.minute_index)
                .unwrap();
            assert!(fresh.request_id > first_try.request_id);
            assert_eq!(fresh.display_text, first_try.display_text);
            assert!(matches!(
                ring.apply_reply(ok_reply(first_try, 0.0)),
                ReplyOutcome::Superseded { .. }
            ));
        }
        for fresh in &reissued {
            assert!(matches!(
                ring.apply_reply(ok_reply(fresh, 0.0)),
                ReplyOutcome::Installed { .. }
            ));
        }
        assert_eq!(ring.pending_count(), 0);
    }

    #[test]
    fn reseeding_after_a_time_jump_rebuilds_the_run() {
        let n = 4;
        let clock = RotationClock::new(n);
        let now = BASE_MINUTE * MS_PER_MINUTE;
        let (mut ring, requests) = seeded(n, now);
        for request in &requests {
            ring.apply_reply(ok_reply(request, 0.0));
        }
        let jumped = now + 3 * 60 * MS_PER_MINUTE + 20_000;
        let fresh = ring.seed(jumped, clock.angle_at(jumped));
        assert_eq!(fresh.len(), 4);
        assert_eq!(ring.disposed_meshes(), 4);
        assert!(ring.is_contiguous());
        assert!(ring
            .minute_indices()
            .contains(&MinuteIndex::containing(jumped)));
        // Replies to the pre-jump requests no longer match anything.
        assert!(matches!(
            ring.apply_reply(ok_reply(&requests[0], 0.0)),
            ReplyOutcome::Superseded { .. }
        ));
    }
}
