//! Snapshot-diff side effects (chimes and celebrations).
//!
//! Each observed key gets a session record with an explicit `initialized`
//! flag. The first observation only seeds state: an already-complete key is
//! marked as celebrated without firing, so reloading a finished project
//! stays quiet. Fired all-complete effects are remembered per key until
//! [`EffectDispatcher::reset`], which survives releasing and re-observing a
//! key.

use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub type EntityId = i64;

pub const PENDING: &str = "pending";
pub const IN_PROGRESS: &str = "in_progress";
pub const DONE: &str = "done";

/// Entity ids grouped into named status buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySnapshot {
    buckets: BTreeMap<String, BTreeSet<EntityId>>,
}

impl EntitySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot with the three standard feature buckets.
    pub fn from_features(
        pending: impl IntoIterator<Item = EntityId>,
        in_progress: impl IntoIterator<Item = EntityId>,
        done: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        Self::new()
            .with_bucket(PENDING, pending)
            .with_bucket(IN_PROGRESS, in_progress)
            .with_bucket(DONE, done)
    }

    pub fn with_bucket(
        mut self,
        name: impl Into<String>,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        self.buckets
            .entry(name.into())
            .or_default()
            .extend(ids);
        self
    }

    pub fn contains(&self, bucket: &str, id: EntityId) -> bool {
        self.buckets
            .get(bucket)
            .is_some_and(|ids| ids.contains(&id))
    }

    pub fn bucket_len(&self, bucket: &str) -> usize {
        self.buckets.get(bucket).map_or(0, BTreeSet::len)
    }

    pub fn ids(&self, bucket: &str) -> impl Iterator<Item = EntityId> + '_ {
        self.buckets.get(bucket).into_iter().flatten().copied()
    }

    /// Nothing pending or in progress, and at least one entity done.
    pub fn is_all_complete(&self) -> bool {
        self.bucket_len(PENDING) == 0
            && self.bucket_len(IN_PROGRESS) == 0
            && self.bucket_len(DONE) > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// An entity moved from pending to in progress.
    FeatureStarted,
    /// An entity reached done.
    FeatureCompleted,
    /// Every entity of the key is done.
    AllComplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub key: String,
    pub kind: EffectKind,
}

struct TransitionRule {
    effect: EffectKind,
    target: &'static str,
    sources: &'static [&'static str],
}

impl TransitionRule {
    /// Some id sits in `target` now, was absent from it before, and was in
    /// one of `sources` before.
    fn matches(&self, previous: &EntitySnapshot, current: &EntitySnapshot) -> bool {
        current.ids(self.target).any(|id| {
            !previous.contains(self.target, id)
                && self
                    .sources
                    .iter()
                    .any(|source| previous.contains(source, id))
        })
    }
}

const TRANSITION_RULES: &[TransitionRule] = &[
    TransitionRule {
        effect: EffectKind::FeatureStarted,
        target: IN_PROGRESS,
        sources: &[PENDING],
    },
    TransitionRule {
        effect: EffectKind::FeatureCompleted,
        target: DONE,
        sources: &[PENDING, IN_PROGRESS],
    },
];

#[derive(Debug, Default)]
struct KeySession {
    initialized: bool,
    previous: EntitySnapshot,
}

#[derive(Debug, Default)]
pub struct EffectDispatcher {
    sessions: HashMap<String, KeySession>,
    fired: HashSet<(String, EffectKind)>,
}

impl EffectDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `current` against the last snapshot of `key` and return the
    /// effects to fire, transitions first.
    pub fn observe(&mut self, key: &str, current: EntitySnapshot) -> Vec<Effect> {
        let session = self.sessions.entry(key.to_string()).or_default();
        let complete = current.is_all_complete();

        if !session.initialized {
            session.initialized = true;
            session.previous = current;
            if complete {
                self.fired.insert((key.to_string(), EffectKind::AllComplete));
                debug!("key already complete on first observation (key={key})");
            }
            return Vec::new();
        }

        let mut effects: Vec<Effect> = TRANSITION_RULES
            .iter()
            .filter(|rule| rule.matches(&session.previous, &current))
            .map(|rule| Effect {
                key: key.to_string(),
                kind: rule.effect,
            })
            .collect();
        session.previous = current;

        if complete && self.fired.insert((key.to_string(), EffectKind::AllComplete)) {
            info!("all entities complete (key={key})");
            effects.push(Effect {
                key: key.to_string(),
                kind: EffectKind::AllComplete,
            });
        }
        effects
    }

    /// Forget the snapshot for `key`. Fired effects are kept.
    pub fn release(&mut self, key: &str) {
        self.sessions.remove(key);
    }

    pub fn has_fired(&self, key: &str, kind: EffectKind) -> bool {
        self.fired.contains(&(key.to_string(), kind))
    }

    /// Drop every session and fired record.
    pub fn reset(&mut self) {
        self.sessions.clear();
        self.fired.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(effects: &[Effect]) -> Vec<EffectKind> {
        effects.iter().map(|effect| effect.kind).collect()
    }

    #[test]
    fn first_observation_of_complete_key_is_silent() {
        let mut dispatcher = EffectDispatcher::new();
        let done = EntitySnapshot::from_features([], [], [1, 2]);
        assert!(dispatcher.observe("shop", done.clone()).is_empty());
        assert!(dispatcher.has_fired("shop", EffectKind::AllComplete));
        assert!(dispatcher.observe("shop", done).is_empty());
    }

    #[test]
    fn completion_fires_once_per_session() {
        let mut dispatcher = EffectDispatcher::new();
        dispatcher.observe("shop", EntitySnapshot::from_features([], [2], [1]));

        let effects = dispatcher.observe("shop", EntitySnapshot::from_features([], [], [1, 2]));
        assert_eq!(
            kinds(&effects),
            vec![EffectKind::FeatureCompleted, EffectKind::AllComplete]
        );
        assert!(
            dispatcher
                .observe("shop", EntitySnapshot::from_features([], [], [1, 2]))
                .is_empty()
        );
    }

    #[test]
    fn releasing_and_returning_does_not_refire() {
        let mut dispatcher = EffectDispatcher::new();
        dispatcher.observe("shop", EntitySnapshot::from_features([1], [], []));
        dispatcher.observe("shop", EntitySnapshot::from_features([], [], [1]));
        dispatcher.release("shop");

        dispatcher.observe("blog", EntitySnapshot::from_features([4], [], []));
        assert!(
            dispatcher
                .observe("shop", EntitySnapshot::from_features([], [], [1]))
                .is_empty()
        );

        // a regression followed by completion is still the same session
        dispatcher.observe("shop", EntitySnapshot::from_features([], [1], []));
        let effects = dispatcher.observe("shop", EntitySnapshot::from_features([], [], [1]));
        assert_eq!(kinds(&effects), vec![EffectKind::FeatureCompleted]);
    }

    #[test]
    fn reset_clears_fired_records() {
        let mut dispatcher = EffectDispatcher::new();
        dispatcher.observe("shop", EntitySnapshot::from_features([], [], [1]));
        dispatcher.reset();
        assert!(!dispatcher.has_fired("shop", EffectKind::AllComplete));
    }

    #[test]
    fn chimes_fire_once_per_diff() {
        let mut dispatcher = EffectDispatcher::new();
        dispatcher.observe("shop", EntitySnapshot::from_features([1, 2, 3], [], []));

        let effects = dispatcher.observe("shop", EntitySnapshot::from_features([3], [1, 2], []));
        assert_eq!(kinds(&effects), vec![EffectKind::FeatureStarted]);

        let effects = dispatcher.observe("shop", EntitySnapshot::from_features([], [2, 3], [1]));
        assert_eq!(
            kinds(&effects),
            vec![EffectKind::FeatureStarted, EffectKind::FeatureCompleted]
        );
    }

    #[test]
    fn pending_straight_to_done_counts_as_completed() {
        let mut dispatcher = EffectDispatcher::new();
        dispatcher.observe("shop", EntitySnapshot::from_features([1, 2], [], []));
        let effects = dispatcher.observe("shop", EntitySnapshot::from_features([2], [], [1]));
        assert_eq!(kinds(&effects), vec![EffectKind::FeatureCompleted]);
    }

    #[test]
    fn unseen_entities_do_not_chime() {
        let mut dispatcher = EffectDispatcher::new();
        dispatcher.observe("shop", EntitySnapshot::from_features([1], [], []));
        let effects = dispatcher.observe("shop", EntitySnapshot::from_features([1], [7], [8]));
        assert!(effects.is_empty());
    }

    #[test]
    fn empty_project_is_never_complete() {
        let mut dispatcher = EffectDispatcher::new();
        dispatcher.observe("empty", EntitySnapshot::from_features([], [], []));
        assert!(
            dispatcher
                .observe("empty", EntitySnapshot::from_features([], [], []))
                .is_empty()
        );
        assert!(!dispatcher.has_fired("empty", EffectKind::AllComplete));
    }
}
