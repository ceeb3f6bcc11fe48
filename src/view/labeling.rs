/// Pointer events that drive labeling, already resolved to canonical row
/// indices by the owning viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    /// A discrete click, or the start of a drag.
    Press,
    /// The end of a drag.
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerHit {
    pub kind: PointerKind,
    pub index: usize,
    pub subplot: usize,
}

/// Outcome of feeding a pointer event to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelAction {
    None,
    /// A pending anchor was discarded without producing a label.
    Canceled,
    /// An interval is complete. `start <= end` always holds; `discrete`
    /// distinguishes a two-click (or same-index click) interval from a
    /// drag, so the caller can pad a zero-width click interval.
    Create {
        start: usize,
        end: usize,
        subplot: usize,
        discrete: bool,
    },
}

/// Two-event interval builder. The first press anchors one endpoint, the
/// next press or release completes (or cancels) the interval. The anchor
/// remembers which subplot it was placed in so independent-mode callers
/// can scope the resulting label.
#[derive(Debug, Default)]
pub enum LabelEngine {
    #[default]
    Idle,
    Anchored {
        index: usize,
        subplot: usize,
    },
}

impl LabelEngine {
    pub fn is_armed(&self) -> bool {
        matches!(self, LabelEngine::Anchored { .. })
    }

    pub fn anchor(&self) -> Option<(usize, usize)> {
        match self {
            LabelEngine::Anchored { index, subplot } => Some((*index, *subplot)),
            LabelEngine::Idle => None,
        }
    }

    /// Drop any pending anchor. Used when the roster selection or the
    /// current file changes mid-gesture.
    pub fn reset(&mut self) -> LabelAction {
        match std::mem::take(self) {
            LabelEngine::Idle => LabelAction::None,
            LabelEngine::Anchored { .. } => LabelAction::Canceled,
        }
    }

    pub fn handle(&mut self, hit: PointerHit) -> LabelAction {
        match (std::mem::take(self), hit.kind) {
            (LabelEngine::Idle, PointerKind::Press) => {
                *self = LabelEngine::Anchored {
                    index: hit.index,
                    subplot: hit.subplot,
                };
                LabelAction::None
            }
            // A stray release with no anchor carries no information.
            (LabelEngine::Idle, PointerKind::Release) => LabelAction::None,
            (LabelEngine::Anchored { index, subplot }, PointerKind::Press) => {
                LabelAction::Create {
                    start: index.min(hit.index),
                    end: index.max(hit.index),
                    subplot,
                    discrete: true,
                }
            }
            (LabelEngine::Anchored { index, subplot }, PointerKind::Release) => {
                // A drag that never left its start index is a cancel, not
                // a zero-width label.
                if hit.index == index {
                    LabelAction::Canceled
                } else {
                    LabelAction::Create {
                        start: index.min(hit.index),
                        end: index.max(hit.index),
                        subplot,
                        discrete: false,
                    }
                }
            }
        }
    }
}
