//! Attribute families and their recompute rules.
//!
//! | Kind | Local state | Value |
//! |---|---|---|
//! | `LeafVisible` | own `visible` flag | `visible && parent.unwrap_or(false)` |
//! | `RootToggle` | `enabled`, cached ancestry validity | `enabled && ancestry_valid` |
//! | `InertPassthrough` | none | `parent.unwrap_or(false)` |
//! | `ScaleLeaf` | factor from a scale-modifier child (default 1) | `factor * parent.unwrap_or(1.0)` |

use std::fmt;

use crate::host::{NodeChange, NodeClass, TreeHost};

/// Category of a tracked node; fixes its local state and recompute rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    LeafVisible,
    RootToggle,
    InertPassthrough,
    ScaleLeaf,
}

impl Kind {
    /// Whether trackers of this kind subscribe to their parent's tracker.
    pub fn follows_parent(self) -> bool {
        !matches!(self, Kind::RootToggle)
    }
}

/// One derived attribute family. Each family gets its own
/// [`Registry`](super::Registry), so a node can carry several attributes.
pub trait Attribute: Sized + 'static {
    /// The published value.
    type Value: Copy + PartialEq + fmt::Debug + 'static;
    /// Kind-specific cached local state.
    type State: fmt::Debug + 'static;

    /// Family name used in log events.
    const NAME: &'static str;

    /// Class of the child whose [`NodeChange::Scale`] feeds the local state.
    const MODIFIER: Option<NodeClass> = None;

    /// Classify `node` and read its initial local state. `None` means the
    /// node is unsupported by this family.
    fn classify<H: TreeHost>(host: &H, node: H::Node) -> Option<Self::State>;

    /// Kind of a classified node.
    fn kind(state: &Self::State) -> Kind;

    /// Fold a notification into the local state.
    ///
    /// `Scale` changes arriving here come from the modifier child, not from
    /// the node itself.
    fn observe<H: TreeHost>(
        state: &mut Self::State,
        host: &H,
        node: H::Node,
        change: &NodeChange<H::Node>,
    );

    /// The recompute rule. `parent` is `None` when no parent tracker exists.
    fn compute(state: &Self::State, parent: Option<Self::Value>) -> Self::Value;
}

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

/// Effective visibility (`bool`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility;

/// Local state of a visibility tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
    Leaf { visible: bool },
    Root { enabled: bool, ancestry_valid: bool },
    Inert,
}

impl Attribute for Visibility {
    type Value = bool;
    type State = VisibilityState;

    const NAME: &'static str = "visibility";

    fn classify<H: TreeHost>(host: &H, node: H::Node) -> Option<VisibilityState> {
        match host.classify(node)? {
            NodeClass::Element => Some(VisibilityState::Leaf {
                visible: host.visible(node),
            }),
            NodeClass::Layer => Some(VisibilityState::Root {
                enabled: host.enabled(node),
                ancestry_valid: host.ancestry_valid(node),
            }),
            NodeClass::Group => Some(VisibilityState::Inert),
            NodeClass::ScaleModifier | NodeClass::Opaque => None,
        }
    }

    fn kind(state: &VisibilityState) -> Kind {
        match state {
            VisibilityState::Leaf { .. } => Kind::LeafVisible,
            VisibilityState::Root { .. } => Kind::RootToggle,
            VisibilityState::Inert => Kind::InertPassthrough,
        }
    }

    fn observe<H: TreeHost>(
        state: &mut VisibilityState,
        host: &H,
        node: H::Node,
        change: &NodeChange<H::Node>,
    ) {
        match (state, change) {
            (VisibilityState::Leaf { visible }, NodeChange::Visible(value)) => *visible = *value,
            (VisibilityState::Root { enabled, .. }, NodeChange::Enabled(value)) => {
                *enabled = *value
            }
            (
                VisibilityState::Root { ancestry_valid, .. },
                NodeChange::ParentChanged(_) | NodeChange::AncestryChanged,
            ) => *ancestry_valid = host.ancestry_valid(node),
            _ => {}
        }
    }

    fn compute(state: &VisibilityState, parent: Option<bool>) -> bool {
        match *state {
            VisibilityState::Leaf { visible } => visible && parent.unwrap_or(false),
            VisibilityState::Root {
                enabled,
                ancestry_valid,
            } => enabled && ancestry_valid,
            VisibilityState::Inert => parent.unwrap_or(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

/// Effective scale (`f64`): the product of every modifier factor up the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale;

/// Local state of a scale tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleState {
    /// Factor of the discovered modifier child, 1 without one.
    pub factor: f64,
}

impl Attribute for Scale {
    type Value = f64;
    type State = ScaleState;

    const NAME: &'static str = "scale";
    const MODIFIER: Option<NodeClass> = Some(NodeClass::ScaleModifier);

    fn classify<H: TreeHost>(host: &H, node: H::Node) -> Option<ScaleState> {
        match host.classify(node)? {
            NodeClass::Element | NodeClass::Layer | NodeClass::Group => {
                Some(ScaleState { factor: 1.0 })
            }
            NodeClass::ScaleModifier | NodeClass::Opaque => None,
        }
    }

    fn kind(_: &ScaleState) -> Kind {
        Kind::ScaleLeaf
    }

    fn observe<H: TreeHost>(
        state: &mut ScaleState,
        _host: &H,
        _node: H::Node,
        change: &NodeChange<H::Node>,
    ) {
        if let NodeChange::Scale(factor) = change {
            state.factor = *factor;
        }
    }

    fn compute(state: &ScaleState, parent: Option<f64>) -> f64 {
        state.factor * parent.unwrap_or(1.0)
    }
}
