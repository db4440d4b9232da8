use std::collections::HashSet;

use tracing::{debug, error, trace};

use crate::error::{PetriError, Result};
use crate::net::{Arc, ElementId, Marking, Net, NetChange, Transition};

/// Places whose marking changed by firing a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FireOutcome {
    pub transition: ElementId,
    pub emptied: Vec<ElementId>,
    pub marked: Vec<ElementId>,
}

macro_rules! assert_state {
    ($value:expr, $msg:expr) => {
        if ($value) {
            Ok(())
        } else {
            Err(PetriError::LogicError(format!("{} ({}:{})", $msg, file!(), line!())))
        }
    };
}

impl Net {
    /// Places connected by an arc into the transition, without duplicates.
    pub fn input_places(&self, transition: &str) -> Result<Vec<ElementId>> {
        self.transition(transition)?;
        Ok(self._places_at(self.predecessors(transition)?, Arc::source_id))
    }

    /// Places connected by an arc out of the transition, without duplicates.
    pub fn output_places(&self, transition: &str) -> Result<Vec<ElementId>> {
        self.transition(transition)?;
        Ok(self._places_at(self.successors(transition)?, Arc::target_id))
    }

    /// Recompute whether a transition may fire under the current marking.
    ///
    /// A transition is enabled if it has at least one input and one output place and all input
    /// places are marked. If it otherwise could fire but an output place that is not also an
    /// input place is already marked, the transition is flagged unsafe and `UnsafeState` is
    /// returned instead of `false`.
    pub fn check_enabled(&mut self, transition: &str) -> Result<bool> {
        let inputs = self.input_places(transition)?;
        let outputs = self.output_places(transition)?;

        let enabled = if inputs.is_empty() || outputs.is_empty() {
            false
        } else if inputs.iter().any(|pl| !self._marked(pl)) {
            false
        } else {
            let input_set: HashSet<&ElementId> = inputs.iter().collect();
            let blocked: Vec<ElementId> = outputs
                .iter()
                .filter(|pl| !input_set.contains(pl) && self._marked(pl))
                .cloned()
                .collect();
            if !blocked.is_empty() {
                let tr = self._transition_mut(transition)?;
                tr.enabled = false;
                tr.safe = false;
                self.record(NetChange::TransitionUnsafe(transition.into()));
                debug!(transition, places = blocked.len(), "Transition is unsafe.");
                return Err(PetriError::UnsafeState {
                    transition: transition.into(),
                    places: blocked,
                });
            }
            true
        };

        let tr = self._transition_mut(transition)?;
        let changed = tr.enabled != enabled;
        tr.enabled = enabled;
        tr.safe = true;
        if changed {
            trace!(transition, enabled, "Transition state changed.");
            self.record(if enabled {
                NetChange::TransitionEnabled(transition.into())
            } else {
                NetChange::TransitionDisabled(transition.into())
            });
        }
        Ok(enabled)
    }

    /// Mark the transition as disabled and re-assume it is safe until checked again.
    pub fn reset_enabled(&mut self, transition: &str) -> Result<()> {
        let tr = self._transition_mut(transition)?;
        tr.enabled = false;
        tr.safe = true;
        self.record(NetChange::TransitionReset(transition.into()));
        Ok(())
    }

    /// Fire an enabled transition: empty all input places, then mark all output places.
    ///
    /// All preconditions are verified before any marking changes. A violation means the caller
    /// did not check the transition before firing and is reported as `LogicError`. The
    /// transition's own `enabled` flag is not recomputed.
    pub fn fire(&mut self, transition: &str) -> Result<FireOutcome> {
        let inputs = self.input_places(transition)?;
        let outputs = self.output_places(transition)?;
        if let Err(err) = self._check_fire(transition, &inputs, &outputs) {
            error!(transition, "Refusing to fire: {}", err);
            return Err(err);
        }

        for pl_id in &inputs {
            self._set_place_marking(pl_id, Marking::Empty)?;
            self.record(NetChange::TokenRemoved(pl_id.clone()));
        }
        for pl_id in &outputs {
            self._set_place_marking(pl_id, Marking::Marked)?;
            self.record(NetChange::TokenAdded(pl_id.clone()));
        }
        self.record(NetChange::TransitionFired(transition.into()));
        trace!(transition, inputs = inputs.len(), outputs = outputs.len(), "Fired transition.");
        Ok(FireOutcome { transition: transition.into(), emptied: inputs, marked: outputs })
    }

    /// Check every transition and return the ids of the enabled ones.
    ///
    /// Unsafe transitions are not returned, they are reported through `TransitionUnsafe`.
    pub fn refresh_transitions(&mut self) -> Vec<ElementId> {
        let ids: Vec<ElementId> = self.transitions().map(|tr| tr.id().clone()).collect();
        let mut enabled = Vec::new();
        for id in ids {
            match self.check_enabled(id.as_str()) {
                Ok(true) => enabled.push(id),
                Ok(false) => {}
                Err(err) => trace!(transition = id.as_str(), "{}", err),
            }
        }
        enabled
    }

    fn _check_fire(
        &self,
        transition: &str,
        inputs: &[ElementId],
        outputs: &[ElementId],
    ) -> Result<()> {
        assert_state!(
            self.transition(transition)?.enabled(),
            format!("Transition '{}' is not enabled", transition)
        )?;
        for pl_id in inputs {
            assert_state!(
                self._marked(pl_id),
                format!("Cannot remove a token from empty place '{}'", pl_id)
            )?;
        }
        let input_set: HashSet<&ElementId> = inputs.iter().collect();
        for pl_id in outputs.iter().filter(|pl| !input_set.contains(pl)) {
            assert_state!(
                !self._marked(pl_id),
                format!("Cannot add a token to marked place '{}'", pl_id)
            )?;
        }
        Ok(())
    }

    fn _places_at(
        &self,
        arc_ids: &[ElementId],
        endpoint: impl Fn(&Arc) -> &ElementId,
    ) -> Vec<ElementId> {
        let mut seen = HashSet::new();
        arc_ids
            .iter()
            .filter_map(|arc_id| self.arc(arc_id.as_str()).ok())
            .map(endpoint)
            .filter(|id| self.node(id.as_str()).is_ok_and(|node| node.is_place()))
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }

    fn _marked(&self, place: &ElementId) -> bool {
        self.place(place.as_str()).is_ok_and(|pl| pl.marking().is_marked())
    }

    fn _transition_mut(&mut self, id: &str) -> Result<&mut Transition> {
        self.node_mut(id)?.as_transition_mut().ok_or_else(|| PetriError::NotFound(id.into()))
    }

    fn _set_place_marking(&mut self, id: &ElementId, marking: Marking) -> Result<()> {
        let place = self
            .node_mut(id.as_str())?
            .as_place_mut()
            .ok_or_else(|| PetriError::NotFound(id.clone()))?;
        place.set_marking(marking);
        Ok(())
    }
}
