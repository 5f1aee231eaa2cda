//! Hypothesis node representation.

/// Identifier of a hypothesis inside its sentence's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HypId(pub u32);

impl HypId {
    /// Root hypothesis of every arena.
    pub const ROOT: HypId = HypId(0);

    /// Position in the arena.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Distribution over source positions for one emitted token.
pub type SoftAlignment = Vec<f32>;

/// One partial output: a parent hypothesis extended by one token.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Hypothesis this one extends (None for root).
    parent: Option<HypId>,
    /// Emitted token id.
    token: u32,
    /// Beam slot of the parent in the previous step.
    prev_index: usize,
    /// Cumulative ensemble cost (higher is better).
    cost: f32,
    /// Per-scorer running cost; empty unless n-best is on.
    breakdown: Vec<f32>,
    /// Per-scorer alignment for this token.
    alignments: Option<Vec<SoftAlignment>>,
}

impl Hypothesis {
    /// Create the start-of-sentence root.
    pub fn root() -> Self {
        Self {
            parent: None,
            token: 0,
            prev_index: 0,
            cost: 0.0,
            breakdown: Vec::new(),
            alignments: None,
        }
    }

    /// Create a hypothesis extending `parent` with `token`.
    pub fn new(parent: HypId, token: u32, prev_index: usize, cost: f32) -> Self {
        Self {
            parent: Some(parent),
            token,
            prev_index,
            cost,
            breakdown: Vec::new(),
            alignments: None,
        }
    }

    /// Attach per-scorer alignments.
    pub fn with_alignments(mut self, alignments: Vec<SoftAlignment>) -> Self {
        self.alignments = Some(alignments);
        self
    }

    /// Attach a per-scorer cost breakdown.
    pub fn with_breakdown(mut self, breakdown: Vec<f32>) -> Self {
        self.breakdown = breakdown;
        self
    }

    /// Parent hypothesis.
    pub fn parent(&self) -> Option<HypId> {
        self.parent
    }

    /// Whether this is a root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Emitted token.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// Beam slot of the parent in the previous step.
    pub fn prev_index(&self) -> usize {
        self.prev_index
    }

    /// Cumulative cost.
    pub fn cost(&self) -> f32 {
        self.cost
    }

    /// Per-scorer cost breakdown.
    pub fn breakdown(&self) -> &[f32] {
        &self.breakdown
    }

    /// Per-scorer alignments, if captured.
    pub fn alignments(&self) -> Option<&[SoftAlignment]> {
        self.alignments.as_deref()
    }

    /// Zero-extend the breakdown to `len` entries. Never shrinks.
    pub(crate) fn extend_breakdown(&mut self, len: usize) {
        if self.breakdown.len() < len {
            self.breakdown.resize(len, 0.0);
        }
    }
}
