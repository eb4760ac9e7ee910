//! Block-diagram reduction.
//!
//! [`Reducer`] turns a [`Diagram`] into one transfer function per
//! (input block, output block) pair. Resolution is a memoized depth-first walk
//! upstream from every Output block: a block's value is computed from the
//! values on its input ports, and each block is computed at most once per
//! call.
//!
//! Values are linear forms over the Input blocks. An Input block contributes
//! its own unit variable and every other block combines the forms on its
//! inputs, so the coefficient of input `u` in output `y` is the transfer
//! function `u -> y` with all other inputs held at zero.
//!
//! # Feedback loops
//!
//! The walk can revisit a block whose resolution is still in progress. If the
//! cycle it closes contains a Sum or Subtract block, the revisited block `x`
//! is treated as an unknown. When `x` finishes, its form reads
//! `x = L + c*x` and is solved as `x = L / (1 - c)`; cached forms that still
//! mention `x` are substituted. A cycle without a summing junction is a
//! [`ReduceError::CyclicDependency`].
//!
//! Blocks with no path to an Output block are never visited.
//!
//! Output blocks are reduced independently: an error on one Output is
//! recorded against it and the others are still reduced. The call only fails
//! when no Output block can be reduced.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::algebra::TransferAlgebra;
use crate::block::{Block, BlockId, BlockKind};
use crate::diagram::Diagram;
use crate::error::ReduceError;

/// Transfer functions into one Output block, keyed by Input block.
pub type SourceMap<V> = IndexMap<BlockId, V>;

/// Outcome for one Output block.
pub type SinkResult<V> = Result<SourceMap<V>, ReduceError>;

/// Result of a reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction<V> {
    /// Outcome for every Output block, keyed by Output id.
    Reduced(IndexMap<BlockId, SinkResult<V>>),
    /// The diagram has no Input block or no Output block: nothing to compute.
    NoInputOutput { has_inputs: bool, has_outputs: bool },
}

impl<V> Reduction<V> {
    /// All transfer functions into `sink`, if it was reduced.
    pub fn sink(&self, sink: BlockId) -> Option<&SourceMap<V>> {
        match self {
            Reduction::Reduced(map) => map.get(&sink)?.as_ref().ok(),
            Reduction::NoInputOutput { .. } => None,
        }
    }

    /// Why `sink` could not be reduced.
    pub fn failure(&self, sink: BlockId) -> Option<&ReduceError> {
        match self {
            Reduction::Reduced(map) => map.get(&sink)?.as_ref().err(),
            Reduction::NoInputOutput { .. } => None,
        }
    }

    /// Transfer function from `source` to `sink`.
    pub fn transfer(&self, source: BlockId, sink: BlockId) -> Option<&V> {
        self.sink(sink)?.get(&source)
    }

    /// The transfer function into `sink` when the diagram has a single input.
    pub fn single(&self, sink: BlockId) -> Option<&V> {
        let sources = self.sink(sink)?;
        if sources.len() != 1 {
            return None;
        }
        sources.values().next()
    }

    pub fn is_reduced(&self) -> bool {
        matches!(self, Reduction::Reduced(_))
    }
}

/// Reduce `diagram` with the given algebra.
pub fn reduce<A: TransferAlgebra>(
    diagram: &Diagram,
    algebra: &A,
) -> Result<Reduction<A::Value>, ReduceError> {
    Reducer::new(diagram, algebra).reduce()
}

/// Reduces a borrowed diagram snapshot. Holds no state between calls.
pub struct Reducer<'a, A: TransferAlgebra> {
    diagram: &'a Diagram,
    algebra: &'a A,
}

impl<'a, A: TransferAlgebra> Reducer<'a, A> {
    pub fn new(diagram: &'a Diagram, algebra: &'a A) -> Self {
        Self { diagram, algebra }
    }

    pub fn reduce(&self) -> Result<Reduction<A::Value>, ReduceError> {
        let sources = self.diagram.sources();
        let sinks = self.diagram.sinks();
        if sources.is_empty() || sinks.is_empty() {
            log::debug!(
                "nothing to reduce: {} input(s), {} output(s)",
                sources.len(),
                sinks.len()
            );
            return Ok(Reduction::NoInputOutput {
                has_inputs: !sources.is_empty(),
                has_outputs: !sinks.is_empty(),
            });
        }

        let mut walk = Walk::new(self.diagram, self.algebra);
        let mut visited = HashSet::new();
        let mut result = IndexMap::new();
        for sink in sinks {
            let outcome: SinkResult<A::Value> = match walk.resolve(sink) {
                Ok(form) => Ok(sources
                    .iter()
                    .map(|src| {
                        let tf = form
                            .coefficient(*src)
                            .cloned()
                            .unwrap_or_else(|| self.algebra.constant(0.0));
                        (*src, tf)
                    })
                    .collect()),
                Err(err) => {
                    log::debug!("output {} cannot be reduced: {}", sink, err);
                    // Cached forms may still mention loops that never closed.
                    visited.extend(walk.cache.keys().copied());
                    walk = Walk::new(self.diagram, self.algebra);
                    Err(err)
                }
            };
            result.insert(sink, outcome);
        }
        visited.extend(walk.cache.keys().copied());

        if !result.values().any(Result::is_ok) {
            if let Some(err) = result.values().find_map(|r| r.as_ref().err()) {
                return Err(err.clone());
            }
        }
        let ignored = self.diagram.block_count().saturating_sub(visited.len());
        if ignored > 0 {
            log::debug!("{} block(s) have no path to an output and were ignored", ignored);
        }
        Ok(Reduction::Reduced(result))
    }
}

/// Linear combination `sum(coeff_i * var_i)` over block variables.
#[derive(Debug, Clone)]
struct LinearForm<V> {
    terms: IndexMap<BlockId, V>,
}

impl<V: Clone> LinearForm<V> {
    fn variable(id: BlockId, one: V) -> Self {
        let mut terms = IndexMap::new();
        terms.insert(id, one);
        Self { terms }
    }

    fn coefficient(&self, id: BlockId) -> Option<&V> {
        self.terms.get(&id)
    }

    fn mentions(&self, id: BlockId) -> bool {
        self.terms.contains_key(&id)
    }

    fn scale<A: TransferAlgebra<Value = V>>(&self, alg: &A, factor: &V) -> Self {
        let terms = self
            .terms
            .iter()
            .map(|(id, c)| (*id, alg.mul(c, factor)))
            .filter(|(_, c)| !alg.is_zero(c))
            .collect();
        Self { terms }
    }

    fn combine<A: TransferAlgebra<Value = V>>(&self, alg: &A, other: &Self, subtract: bool) -> Self {
        let mut terms = self.terms.clone();
        for (id, c) in &other.terms {
            let merged = match terms.get(id) {
                Some(existing) if subtract => alg.sub(existing, c),
                Some(existing) => alg.add(existing, c),
                None if subtract => alg.sub(&alg.constant(0.0), c),
                None => c.clone(),
            };
            terms.insert(*id, merged);
        }
        terms.retain(|_, c| !alg.is_zero(c));
        Self { terms }
    }

    /// Replace variable `id` by `value`.
    fn substitute<A: TransferAlgebra<Value = V>>(&self, alg: &A, id: BlockId, value: &Self) -> Self {
        let Some(c) = self.terms.get(&id) else {
            return self.clone();
        };
        let mut rest = self.clone();
        rest.terms.shift_remove(&id);
        rest.combine(alg, &value.scale(alg, c), false)
    }
}

/// State of one reduction call.
struct Walk<'a, A: TransferAlgebra> {
    diagram: &'a Diagram,
    algebra: &'a A,
    cache: HashMap<BlockId, LinearForm<A::Value>>,
    /// Blocks whose resolution is in progress, outermost first.
    stack: Vec<BlockId>,
    /// In-progress blocks that were revisited and now appear as unknowns.
    unknowns: HashSet<BlockId>,
}

impl<'a, A: TransferAlgebra> Walk<'a, A> {
    fn new(diagram: &'a Diagram, algebra: &'a A) -> Self {
        Self {
            diagram,
            algebra,
            cache: HashMap::new(),
            stack: Vec::new(),
            unknowns: HashSet::new(),
        }
    }

    fn resolve(&mut self, id: BlockId) -> Result<LinearForm<A::Value>, ReduceError> {
        if let Some(form) = self.cache.get(&id) {
            return Ok(form.clone());
        }
        if let Some(pos) = self.stack.iter().position(|b| *b == id) {
            return self.revisit(id, pos);
        }
        let Some(block) = self.diagram.block(id) else {
            // Connections never point at missing blocks; treat as a dangling input.
            return Err(ReduceError::Arity {
                block: id.to_string(),
                expected: 1,
                found: 0,
            });
        };

        self.stack.push(id);
        let evaluated = self.evaluate(block);
        self.stack.pop();
        let mut form = evaluated?;

        if self.unknowns.remove(&id) {
            form = self.close_loop(block, form)?;
        }
        self.cache.insert(id, form.clone());
        Ok(form)
    }

    /// `id` is already being resolved at `stack[pos]`.
    fn revisit(&mut self, id: BlockId, pos: usize) -> Result<LinearForm<A::Value>, ReduceError> {
        let cycle = &self.stack[pos..];
        let through_junction = cycle
            .iter()
            .filter_map(|b| self.diagram.block(*b))
            .any(|b| b.kind.is_junction());
        if through_junction {
            log::debug!("feedback loop closes at {}", id);
            self.unknowns.insert(id);
            return Ok(LinearForm::variable(id, self.algebra.constant(1.0)));
        }

        // The stack runs consumer -> producer; report in signal-flow order.
        let label = |b: &BlockId| {
            self.diagram
                .block(*b)
                .map_or_else(|| b.to_string(), Block::label)
        };
        let mut names = vec![label(&id)];
        names.extend(cycle[1..].iter().rev().map(&label));
        names.push(label(&id));
        Err(ReduceError::CyclicDependency { cycle: names })
    }

    fn evaluate(&mut self, block: &Block) -> Result<LinearForm<A::Value>, ReduceError> {
        let alg = self.algebra;
        match &block.kind {
            BlockKind::Input => Ok(LinearForm::variable(block.id, alg.constant(1.0))),
            BlockKind::Sum | BlockKind::Subtract => {
                let inputs = self.resolve_inputs(block)?;
                let subtract = block.kind == BlockKind::Subtract;
                Ok(inputs[0].combine(alg, &inputs[1], subtract))
            }
            BlockKind::Output => {
                let mut inputs = self.resolve_inputs(block)?;
                Ok(inputs.remove(0))
            }
            BlockKind::Gain { .. } | BlockKind::Integrator | BlockKind::TransferFunction { .. } => {
                let own = block.local_transfer(alg)?;
                let inputs = self.resolve_inputs(block)?;
                Ok(inputs[0].scale(alg, &own))
            }
        }
    }

    /// Resolve every input port of `block`; all must be connected.
    fn resolve_inputs(&mut self, block: &Block) -> Result<Vec<LinearForm<A::Value>>, ReduceError> {
        let feeds: Vec<BlockId> = self
            .diagram
            .incoming(block.id)
            .into_iter()
            .flatten()
            .map(|c| c.source.block)
            .collect();
        let expected = block.kind.input_arity();
        if feeds.len() < expected {
            return Err(ReduceError::Arity {
                block: block.label(),
                expected,
                found: feeds.len(),
            });
        }
        feeds.into_iter().map(|src| self.resolve(src)).collect()
    }

    /// Solve `x = L + c*x` for the block `x` and substitute the solution into
    /// every cached form.
    fn close_loop(
        &mut self,
        block: &Block,
        form: LinearForm<A::Value>,
    ) -> Result<LinearForm<A::Value>, ReduceError> {
        let alg = self.algebra;
        let id = block.id;
        let solution = match form.coefficient(id) {
            Some(c) => {
                let one = alg.constant(1.0);
                let denom = alg.sub(&one, c);
                let singular = || ReduceError::SingularLoop {
                    block: block.label(),
                };
                if alg.is_zero(&denom) {
                    return Err(singular());
                }
                let gain = alg.div(&one, &denom).ok_or_else(singular)?;
                let mut rest = form.clone();
                rest.terms.shift_remove(&id);
                rest.scale(alg, &gain)
            }
            None => form,
        };
        log::debug!(
            "solved loop at {}: depends on {} input(s)",
            block.label(),
            solution.terms.len()
        );

        for cached in self.cache.values_mut() {
            if cached.mentions(id) {
                *cached = cached.substitute(alg, id, &solution);
            }
        }
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::RationalAlgebra;

    #[test]
    fn test_linear_form_substitute() {
        let alg = RationalAlgebra::new();
        let a = BlockId(0);
        let x = BlockId(1);
        // f = 2a + 3x, x = 5a  =>  f = 17a
        let f = LinearForm::variable(a, alg.constant(2.0))
            .combine(&alg, &LinearForm::variable(x, alg.constant(3.0)), false);
        let xs = LinearForm::variable(a, alg.constant(5.0));
        let g = f.substitute(&alg, x, &xs);
        assert!(!g.mentions(x));
        assert_eq!(g.coefficient(a).and_then(|c| c.as_constant()), Some(17.0));
    }

    #[test]
    fn test_combine_drops_cancelled_terms() {
        let alg = RationalAlgebra::new();
        let a = BlockId(0);
        let f = LinearForm::variable(a, alg.constant(2.0));
        let zero = f.combine(&alg, &f, true);
        assert!(zero.terms.is_empty());
    }
}
