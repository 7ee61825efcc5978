//! Speaker selection strategies
//!
//! A [`SpeakerSelector`] picks which agent speaks next given the roster, the
//! transcript and the previous speaker. Four interchangeable policies ship
//! with the crate:
//!
//! - [`RoundRobinSelector`]: roster order, deterministic and stateless
//! - [`RandomSelector`]: uniform choice that never repeats the previous speaker
//! - [`ManualSelector`]: a one-shot override set from outside the loop
//! - [`ConstrainedSelector`]: restricts another selector to an allow-list
//!
//! Every selector fails with [`Error::EmptyRoster`] on an empty roster.

use parking_lot::{Mutex, RwLock};
use palaver_ai::Message;
use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    agent::{BoxedAgent, find_agent, position_of},
    error::{Error, Result},
};

/// Policy choosing the next agent to produce a message
pub trait SpeakerSelector: Send + Sync {
    /// Pick the next speaker. `last_speaker` is `None` on the first round.
    fn select_speaker(
        &self,
        roster: &[BoxedAgent],
        transcript: &[Message],
        last_speaker: Option<&BoxedAgent>,
    ) -> Result<BoxedAgent>;

    /// Human-readable description of the policy, for diagnostics only
    fn describe(&self) -> String;
}

/// Type alias for a shared selector
pub type SharedSelector = Arc<dyn SpeakerSelector>;

fn ensure_not_empty(roster: &[BoxedAgent]) -> Result<()> {
    if roster.is_empty() {
        return Err(Error::EmptyRoster);
    }
    Ok(())
}

// --- Round-robin ---

/// Agents speak in roster order, wrapping around.
///
/// A previous speaker that is not in the roster is treated as sitting just
/// before the first entry, so the next speaker is `roster[0]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinSelector;

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self
    }
}

impl SpeakerSelector for RoundRobinSelector {
    fn select_speaker(
        &self,
        roster: &[BoxedAgent],
        _transcript: &[Message],
        last_speaker: Option<&BoxedAgent>,
    ) -> Result<BoxedAgent> {
        ensure_not_empty(roster)?;

        let next = match last_speaker {
            None => 0,
            Some(last) => match position_of(roster, last.name()) {
                Some(idx) => (idx + 1) % roster.len(),
                None => 0,
            },
        };
        Ok(Arc::clone(&roster[next]))
    }

    fn describe(&self) -> String {
        "Round-robin: agents speak in roster order".to_string()
    }
}

// --- Random ---

/// Picks a speaker uniformly at random, excluding the previous speaker
/// whenever the roster has more than one member.
pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl RandomSelector {
    /// Create a selector seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create a selector with a fixed seed for reproducible conversations
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeakerSelector for RandomSelector {
    fn select_speaker(
        &self,
        roster: &[BoxedAgent],
        _transcript: &[Message],
        last_speaker: Option<&BoxedAgent>,
    ) -> Result<BoxedAgent> {
        ensure_not_empty(roster)?;

        let mut candidates: Vec<&BoxedAgent> = match last_speaker {
            Some(last) if roster.len() > 1 => roster
                .iter()
                .filter(|a| a.name() != last.name())
                .collect(),
            _ => roster.iter().collect(),
        };
        // Only reachable when every entry shares the previous speaker's name
        if candidates.is_empty() {
            candidates = roster.iter().collect();
        }

        let mut rng = self.rng.lock();
        candidates
            .choose(&mut *rng)
            .map(|a| Arc::clone(*a))
            .ok_or(Error::EmptyRoster)
    }

    fn describe(&self) -> String {
        "Random: uniformly random speaker, never the same agent twice in a row".to_string()
    }
}

// --- Manual ---

/// Lets a caller decide the next speaker from outside the loop.
///
/// The pending name is a one-shot override: a successful selection clears
/// it. Without an override the first roster member speaks. Setting the
/// override while a selection is in flight is a race the caller must avoid.
#[derive(Debug, Default)]
pub struct ManualSelector {
    pending: Mutex<Option<String>>,
}

impl ManualSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose the agent that speaks at the next selection
    pub fn set_next_speaker(&self, name: impl Into<String>) {
        *self.pending.lock() = Some(name.into());
    }

    /// Drop a pending override without consuming it
    pub fn clear_next_speaker(&self) {
        *self.pending.lock() = None;
    }

    /// The pending override, if any
    pub fn next_speaker(&self) -> Option<String> {
        self.pending.lock().clone()
    }
}

impl SpeakerSelector for ManualSelector {
    fn select_speaker(
        &self,
        roster: &[BoxedAgent],
        _transcript: &[Message],
        _last_speaker: Option<&BoxedAgent>,
    ) -> Result<BoxedAgent> {
        ensure_not_empty(roster)?;

        let mut pending = self.pending.lock();
        let Some(name) = pending.clone() else {
            return Ok(Arc::clone(&roster[0]));
        };

        // A failed lookup leaves the override in place
        let agent = find_agent(roster, &name)
            .cloned()
            .ok_or(Error::UnknownAgent(name))?;
        *pending = None;
        Ok(agent)
    }

    fn describe(&self) -> String {
        match self.next_speaker() {
            Some(name) => format!("Manual: next speaker set to '{}'", name),
            None => "Manual: no override set, defaults to the first agent".to_string(),
        }
    }
}

// --- Constrained ---

/// Restricts a delegate selector to agents whose names are allowed.
///
/// The delegate sees the filtered roster but the unfiltered transcript and
/// previous speaker, even when that speaker was filtered out.
pub struct ConstrainedSelector {
    allowed: RwLock<HashSet<String>>,
    delegate: SharedSelector,
}

impl ConstrainedSelector {
    /// Constrain round-robin selection to the given names
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_delegate(allowed, Arc::new(RoundRobinSelector))
    }

    /// Constrain an arbitrary selector to the given names
    pub fn with_delegate<I, S>(allowed: I, delegate: SharedSelector) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: RwLock::new(allowed.into_iter().map(Into::into).collect()),
            delegate,
        }
    }

    /// Allow another agent
    pub fn allow(&self, name: impl Into<String>) {
        self.allowed.write().insert(name.into());
    }

    /// Stop allowing an agent
    pub fn disallow(&self, name: &str) {
        self.allowed.write().remove(name);
    }

    /// Replace the allow-list
    pub fn set_allowed<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.allowed.write() = names.into_iter().map(Into::into).collect();
    }

    /// Allowed names, sorted
    pub fn allowed(&self) -> Vec<String> {
        let mut names: Vec<String> = self.allowed.read().iter().cloned().collect();
        names.sort();
        names
    }
}

impl SpeakerSelector for ConstrainedSelector {
    fn select_speaker(
        &self,
        roster: &[BoxedAgent],
        transcript: &[Message],
        last_speaker: Option<&BoxedAgent>,
    ) -> Result<BoxedAgent> {
        ensure_not_empty(roster)?;

        let filtered: Vec<BoxedAgent> = {
            let allowed = self.allowed.read();
            roster
                .iter()
                .filter(|a| allowed.contains(a.name()))
                .cloned()
                .collect()
        };
        if filtered.is_empty() {
            return Err(Error::NoAllowedAgents);
        }

        self.delegate
            .select_speaker(&filtered, transcript, last_speaker)
    }

    fn describe(&self) -> String {
        format!(
            "Constrained to [{}] via {}",
            self.allowed().join(", "),
            self.delegate.describe()
        )
    }
}

// --- Config-level strategy names ---

/// Named selection policies, as they appear in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    RoundRobin,
    Random,
    Manual,
}

impl SelectionStrategy {
    /// Instantiate the selector for this policy
    pub fn build(self) -> SharedSelector {
        match self {
            SelectionStrategy::RoundRobin => Arc::new(RoundRobinSelector),
            SelectionStrategy::Random => Arc::new(RandomSelector::new()),
            SelectionStrategy::Manual => Arc::new(ManualSelector::new()),
        }
    }
}

impl std::str::FromStr for SelectionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(SelectionStrategy::RoundRobin),
            "random" => Ok(SelectionStrategy::Random),
            "manual" => Ok(SelectionStrategy::Manual),
            other => Err(Error::InvalidConfig(format!(
                "unknown selection strategy: {}",
                other
            ))),
        }
    }
}
