use std::{
    collections::{HashSet, VecDeque},
    fmt::Display,
};

use tracing::{debug, error, trace};

use crate::error::{join_ids, PetriError, Result};
use crate::net::{Arc, ElementId, Marking, Net};

/// Lower bound for the number of firings during the soundness simulation.
pub const MIN_FIRING_CAP: usize = 16;
pub const DEFAULT_FIRING_CAP_FACTOR: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    EmptyNet,
    NoStartPlace,
    MultipleStartPlaces,
    NoEndPlace,
    MultipleEndPlaces,
    UnreachableFromStart,
    CannotReachEnd,
    UnsafeTransition,
    DidNotTerminate,
    UnsoundFinalMarking,
    SimulationFailed,
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DiagnosticKind::EmptyNet => "net is empty",
            DiagnosticKind::NoStartPlace => "no start place found",
            DiagnosticKind::MultipleStartPlaces => "multiple start-place candidates",
            DiagnosticKind::NoEndPlace => "no end place found",
            DiagnosticKind::MultipleEndPlaces => "multiple end-place candidates",
            DiagnosticKind::UnreachableFromStart => "unreachable node",
            DiagnosticKind::CannotReachEnd => "node cannot reach the end place",
            DiagnosticKind::UnsafeTransition => "unsafe transition",
            DiagnosticKind::DidNotTerminate => "did not terminate",
            DiagnosticKind::UnsoundFinalMarking => "unsound final marking",
            DiagnosticKind::SimulationFailed => "simulation failed",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub node: Option<ElementId>,
    pub kind: DiagnosticKind,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(node: Option<ElementId>, kind: DiagnosticKind, detail: impl Into<String>) -> Self {
        Diagnostic { node, kind, detail: detail.into() }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.node {
            Some(node) => write!(f, "{} '{}': {}", self.kind, node, self.detail),
            None => write!(f, "{}: {}", self.kind, self.detail),
        }
    }
}

/// Findings of one validation run, in the order they were found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
    pub start: Option<ElementId>,
    pub end: Option<ElementId>,
    pub firings: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    fn push(&mut self, node: Option<ElementId>, kind: DiagnosticKind, detail: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(node, kind, detail));
    }
}

/// Result of simulating token flow from the start place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub firings: usize,
    pub marked: Vec<ElementId>,
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Clone, Debug)]
pub struct Validator {
    firing_cap_factor: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Validator { firing_cap_factor: DEFAULT_FIRING_CAP_FACTOR }
    }
}

impl Validator {
    pub fn new(firing_cap_factor: usize) -> Self {
        Validator { firing_cap_factor }
    }

    /// Maximum number of firings the soundness simulation may perform on this net.
    pub fn firing_cap(&self, net: &Net) -> usize {
        self.firing_cap_factor.saturating_mul(net.len()).max(MIN_FIRING_CAP)
    }

    /// Check that the net is a sound workflow net.
    ///
    /// All applicable checks are run and every finding is collected. Reachability from the start
    /// needs a unique start place, reachability of the end a unique end place. The simulation
    /// needs both and is skipped otherwise.
    pub fn validate(&self, net: &Net) -> ValidationReport {
        let mut report = ValidationReport::default();
        if net.is_empty() {
            report.push(None, DiagnosticKind::EmptyNet, "the net has no elements");
            return report;
        }

        let starts: Vec<ElementId> = net
            .places()
            .filter(|pl| net.predecessors(pl.id().as_str()).is_ok_and(|arcs| arcs.is_empty()))
            .map(|pl| pl.id().clone())
            .collect();
        let ends: Vec<ElementId> = net
            .places()
            .filter(|pl| net.successors(pl.id().as_str()).is_ok_and(|arcs| arcs.is_empty()))
            .map(|pl| pl.id().clone())
            .collect();
        let start = Self::_unique(
            &mut report,
            starts,
            DiagnosticKind::NoStartPlace,
            DiagnosticKind::MultipleStartPlaces,
            "no place without incoming arcs",
        );
        let end = Self::_unique(
            &mut report,
            ends,
            DiagnosticKind::NoEndPlace,
            DiagnosticKind::MultipleEndPlaces,
            "no place without outgoing arcs",
        );
        report.start = start.clone();
        report.end = end.clone();

        if let Some(start) = &start {
            let from_start = Self::_reachable(net, start, Direction::Forward);
            for node in net.nodes().filter(|n| !from_start.contains(n.id())) {
                report.push(
                    Some(node.id().clone()),
                    DiagnosticKind::UnreachableFromStart,
                    format!("not reachable from start place '{}'", start),
                );
            }
        }
        if let Some(end) = &end {
            let to_end = Self::_reachable(net, end, Direction::Backward);
            for node in net.nodes().filter(|n| !to_end.contains(n.id())) {
                report.push(
                    Some(node.id().clone()),
                    DiagnosticKind::CannotReachEnd,
                    format!("end place '{}' not reachable", end),
                );
            }
        }

        let (start, end) = match (start, end) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                debug!(diagnostics = report.diagnostics.len(), "No unique start and end place.");
                return report;
            }
        };

        match self.simulate(net, start.as_str()) {
            Ok(outcome) => {
                report.firings = outcome.firings;
                if !outcome.marked.contains(&end) {
                    report.push(
                        Some(end.clone()),
                        DiagnosticKind::UnsoundFinalMarking,
                        "end place holds no token after the simulation",
                    );
                }
                for pl_id in outcome.marked.into_iter().filter(|pl| *pl != end) {
                    report.push(
                        Some(pl_id),
                        DiagnosticKind::UnsoundFinalMarking,
                        "token left after the simulation",
                    );
                }
            }
            Err(PetriError::UnsafeState { transition, places }) => {
                report.push(
                    Some(transition),
                    DiagnosticKind::UnsafeTransition,
                    format!("output place(s) already marked: {}", join_ids(&places)),
                );
            }
            Err(PetriError::ValidationTimeout(firings)) => {
                report.firings = firings;
                report.push(
                    None,
                    DiagnosticKind::DidNotTerminate,
                    format!("simulation stopped after {} firings", firings),
                );
            }
            Err(err) => {
                error!("Soundness simulation failed: {}", err);
                report.push(None, DiagnosticKind::SimulationFailed, err.to_string());
            }
        }
        debug!(
            valid = report.is_valid(),
            diagnostics = report.diagnostics.len(),
            firings = report.firings,
            "Validated net."
        );
        report
    }

    /// Simulate token flow on a copy of the net.
    ///
    /// The start place receives the only token. Enabled transitions are fired in insertion order
    /// until no transition is enabled any more. Fails with `UnsafeState` as soon as a transition
    /// is unsafe and with `ValidationTimeout` when the firing cap is exceeded.
    pub fn simulate(&self, net: &Net, start: &str) -> Result<SimulationOutcome> {
        let mut sim = net.clone();
        let places: Vec<ElementId> = sim.places().map(|pl| pl.id().clone()).collect();
        let transitions: Vec<ElementId> = sim.transitions().map(|tr| tr.id().clone()).collect();
        for pl_id in &places {
            let marking = Marking::from(pl_id.as_str() == start);
            sim.set_marking(pl_id.as_str(), marking)?;
        }
        for tr_id in &transitions {
            sim.reset_enabled(tr_id.as_str())?;
        }

        let cap = self.firing_cap(net);
        let mut firings = 0;
        loop {
            let mut fired = false;
            for tr_id in &transitions {
                if !sim.check_enabled(tr_id.as_str())? {
                    continue;
                }
                if firings >= cap {
                    return Err(PetriError::ValidationTimeout(firings));
                }
                sim.fire(tr_id.as_str())?;
                firings += 1;
                fired = true;
            }
            // nobody listens to the copy
            sim.take_changes();
            if !fired {
                break;
            }
        }

        let marked = places
            .into_iter()
            .filter(|pl| sim.place(pl.as_str()).is_ok_and(|p| p.marking().is_marked()))
            .collect();
        trace!(firings, "Simulation finished.");
        Ok(SimulationOutcome { firings, marked })
    }

    fn _unique(
        report: &mut ValidationReport,
        candidates: Vec<ElementId>,
        none: DiagnosticKind,
        multiple: DiagnosticKind,
        none_detail: &str,
    ) -> Option<ElementId> {
        match candidates.len() {
            0 => {
                report.push(None, none, none_detail);
                None
            }
            1 => candidates.into_iter().next(),
            _ => {
                let detail = format!("candidates: {}", join_ids(&candidates));
                for candidate in candidates {
                    report.push(Some(candidate), multiple, detail.clone());
                }
                None
            }
        }
    }

    fn _reachable(net: &Net, from: &ElementId, direction: Direction) -> HashSet<ElementId> {
        let mut visited = HashSet::from([from.clone()]);
        let mut queue = VecDeque::from([from.clone()]);
        while let Some(node_id) = queue.pop_front() {
            let arcs = match direction {
                Direction::Forward => net.successors(node_id.as_str()),
                Direction::Backward => net.predecessors(node_id.as_str()),
            };
            let Ok(arcs) = arcs else { continue };
            for arc in arcs.iter().filter_map(|id| net.arc(id.as_str()).ok()) {
                let next = match direction {
                    Direction::Forward => Arc::target_id(arc),
                    Direction::Backward => Arc::source_id(arc),
                };
                if visited.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
        visited
    }
}
