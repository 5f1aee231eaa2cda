//! Per-sentence hypothesis storage.

use super::node::{HypId, Hypothesis, SoftAlignment};
use crate::error::{BeamlineError, Result};

/// Append-only store of one sentence's hypotheses.
///
/// Index 0 is always the root. Children are always pushed after their
/// parent, so parent ids are strictly smaller than child ids.
#[derive(Debug, Clone)]
pub struct HypothesisArena {
    nodes: Vec<Hypothesis>,
}

fn next_id(len: usize) -> Result<HypId> {
    u32::try_from(len)
        .map(HypId)
        .map_err(|_| BeamlineError::ArenaFull(len))
}

impl Default for HypothesisArena {
    fn default() -> Self {
        Self::new()
    }
}

impl HypothesisArena {
    /// Create an arena holding only a root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Hypothesis::root()],
        }
    }

    /// Root id.
    pub fn root(&self) -> HypId {
        HypId::ROOT
    }

    /// Number of hypotheses, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is never removed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Store a hypothesis.
    ///
    /// The parent must already be in the arena; see [`Self::try_push`] for
    /// the checked variant.
    pub fn push(&mut self, hyp: Hypothesis) -> HypId {
        debug_assert!(hyp.parent().map_or(true, |p| p.index() < self.nodes.len()));
        debug_assert!(next_id(self.nodes.len()).is_ok(), "arena exceeds u32 ids");
        let id = HypId(self.nodes.len() as u32);
        self.nodes.push(hyp);
        id
    }

    /// Store a hypothesis after checking its parent exists and an id is free.
    pub fn try_push(&mut self, hyp: Hypothesis) -> Result<HypId> {
        if let Some(parent) = hyp.parent() {
            self.get(parent)?;
        }
        let id = next_id(self.nodes.len())?;
        self.nodes.push(hyp);
        Ok(id)
    }

    /// Look up a hypothesis.
    pub fn get(&self, id: HypId) -> Result<&Hypothesis> {
        self.nodes
            .get(id.index())
            .ok_or(BeamlineError::InvalidHypothesis(id.0))
    }

    /// Zero-extend a hypothesis' breakdown to `len` entries.
    ///
    /// Used when a scorer joins the ensemble after the hypothesis was made.
    pub fn extend_breakdown(&mut self, id: HypId, len: usize) -> Result<()> {
        self.nodes
            .get_mut(id.index())
            .ok_or(BeamlineError::InvalidHypothesis(id.0))?
            .extend_breakdown(len);
        Ok(())
    }

    /// Number of ancestors up to the root.
    pub fn depth(&self, id: HypId) -> Result<usize> {
        let mut depth = 0;
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent() {
            depth += 1;
            current = self.get(parent)?;
        }
        Ok(depth)
    }

    /// Lineage from the first emitted hypothesis down to `id`, root excluded.
    pub fn backtrace(&self, id: HypId) -> Result<Vec<HypId>> {
        let mut path = Vec::new();
        let mut current = id;
        loop {
            let hyp = self.get(current)?;
            match hyp.parent() {
                Some(parent) => {
                    path.push(current);
                    current = parent;
                }
                None => break,
            }
        }
        path.reverse();
        Ok(path)
    }

    /// Tokens emitted along the lineage of `id`.
    pub fn tokens(&self, id: HypId) -> Result<Vec<u32>> {
        self.backtrace(id)?
            .into_iter()
            .map(|h| self.get(h).map(Hypothesis::token))
            .collect()
    }

    /// Per-step alignments along the lineage of `id`, if every step captured them.
    pub fn alignments(&self, id: HypId) -> Result<Option<Vec<Vec<SoftAlignment>>>> {
        let mut steps = Vec::new();
        for h in self.backtrace(id)? {
            match self.get(h)?.alignments() {
                Some(a) => steps.push(a.to_vec()),
                None => return Ok(None),
            }
        }
        Ok(Some(steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_arena_holds_root() {
        let arena = HypothesisArena::new();
        assert_eq!(arena.len(), 1);
        assert!(arena.get(arena.root()).unwrap().is_root());
        assert_eq!(arena.depth(arena.root()).unwrap(), 0);
        assert!(arena.backtrace(arena.root()).unwrap().is_empty());
    }

    #[test]
    fn backtrace_walks_parents() {
        let mut arena = HypothesisArena::new();
        let a = arena.push(Hypothesis::new(HypId::ROOT, 5, 0, -0.1));
        let b = arena.push(Hypothesis::new(HypId::ROOT, 6, 0, -0.2));
        let c = arena.push(Hypothesis::new(b, 8, 1, -0.4));

        assert_eq!(arena.backtrace(c).unwrap(), vec![b, c]);
        assert_eq!(arena.tokens(c).unwrap(), vec![6, 8]);
        assert_eq!(arena.tokens(a).unwrap(), vec![5]);
        assert_eq!(arena.depth(c).unwrap(), 2);
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut arena = HypothesisArena::new();
        assert!(matches!(
            arena.get(HypId(9)),
            Err(BeamlineError::InvalidHypothesis(9))
        ));
        assert!(arena
            .try_push(Hypothesis::new(HypId(3), 1, 0, 0.0))
            .is_err());
        assert!(arena.extend_breakdown(HypId(2), 3).is_err());
    }

    #[test]
    fn ids_stop_at_u32_range() {
        assert_eq!(next_id(7).unwrap(), HypId(7));
        assert_eq!(next_id(u32::MAX as usize).unwrap(), HypId(u32::MAX));
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            next_id(u32::MAX as usize + 1),
            Err(BeamlineError::ArenaFull(_))
        ));

        let mut arena = HypothesisArena::new();
        let id = arena.try_push(Hypothesis::new(HypId::ROOT, 4, 0, -0.1)).unwrap();
        assert_eq!(id, HypId(1));
    }

    #[test]
    fn extend_breakdown_backfills_root() {
        let mut arena = HypothesisArena::new();
        arena.extend_breakdown(HypId::ROOT, 3).unwrap();
        assert_eq!(arena.get(HypId::ROOT).unwrap().breakdown(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn alignments_require_every_step() {
        let mut arena = HypothesisArena::new();
        let a = arena.push(Hypothesis::new(HypId::ROOT, 5, 0, -0.1).with_alignments(vec![vec![1.0]]));
        let b = arena.push(Hypothesis::new(a, 6, 0, -0.2).with_alignments(vec![vec![0.5, 0.5]]));
        let c = arena.push(Hypothesis::new(b, 7, 0, -0.3));

        let steps = arena.alignments(b).unwrap().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1][0], vec![0.5, 0.5]);
        assert!(arena.alignments(c).unwrap().is_none());
    }
}
