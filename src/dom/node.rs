//! Node types: NodeId, NodeData.

use slotmap::new_key_type;

use crate::host::NodeClass;

new_key_type! {
    /// Unique identifier for a DOM node. Copy, lightweight (u64).
    pub struct NodeId;
}

/// Data associated with a single DOM node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    /// Host category of the node.
    pub class: NodeClass,
    /// Optional name, for debugging.
    pub name: Option<String>,
    /// Own visibility flag (meaningful for [`NodeClass::Element`]).
    pub visible: bool,
    /// Enabled flag (meaningful for [`NodeClass::Layer`]).
    pub enabled: bool,
    /// Scale factor (meaningful for [`NodeClass::ScaleModifier`]).
    pub scale: f64,
}

impl NodeData {
    /// Create a new `NodeData` of the given class: visible, enabled, scale 1.
    pub fn new(class: NodeClass) -> Self {
        Self {
            class,
            name: None,
            visible: true,
            enabled: true,
            scale: 1.0,
        }
    }

    /// Shorthand for an [`NodeClass::Element`].
    pub fn element() -> Self {
        Self::new(NodeClass::Element)
    }

    /// Shorthand for a [`NodeClass::Layer`].
    pub fn layer() -> Self {
        Self::new(NodeClass::Layer)
    }

    /// Shorthand for a [`NodeClass::Group`].
    pub fn group() -> Self {
        Self::new(NodeClass::Group)
    }

    /// Shorthand for a [`NodeClass::ScaleModifier`] with the given factor.
    pub fn scale_modifier(scale: f64) -> Self {
        Self::new(NodeClass::ScaleModifier).scale(scale)
    }

    /// Set the debug name (builder).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the visibility flag (builder).
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Set the enabled flag (builder).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the scale factor (builder).
    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults() {
        let data = NodeData::new(NodeClass::Element);
        assert_eq!(data.class, NodeClass::Element);
        assert!(data.name.is_none());
        assert!(data.visible);
        assert!(data.enabled);
        assert_eq!(data.scale, 1.0);
    }

    #[test]
    fn builder_chain() {
        let data = NodeData::layer().with_name("hud").enabled(false).visible(false);
        assert_eq!(data.class, NodeClass::Layer);
        assert_eq!(data.name.as_deref(), Some("hud"));
        assert!(!data.enabled);
        assert!(!data.visible);
    }

    #[test]
    fn scale_modifier_shorthand() {
        let data = NodeData::scale_modifier(2.5);
        assert_eq!(data.class, NodeClass::ScaleModifier);
        assert_eq!(data.scale, 2.5);
    }

    #[test]
    fn node_id_is_copy() {
        fn assert_copy<T: Copy>() {}
        assert_copy::<NodeId>();
    }
}
