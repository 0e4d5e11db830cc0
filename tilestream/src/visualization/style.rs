//! Style sheet registry.

use std::collections::{BTreeMap, BTreeSet};

/// A style sheet as seen by the engine.
///
/// The engine does not evaluate styles. It only needs to know whether a
/// style is enabled and which layers it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSheet {
    id: String,
    enabled: bool,
    layer_affinity: Option<BTreeSet<String>>,
}

impl StyleSheet {
    /// Creates an enabled style that applies to every layer.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            layer_affinity: None,
        }
    }

    /// Restricts the style to the given layers.
    pub fn with_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layer_affinity = Some(layers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the style has rules for `layer_id`.
    pub fn applies_to(&self, layer_id: &str) -> bool {
        self.layer_affinity
            .as_ref()
            .map(|layers| layers.contains(layer_id))
            .unwrap_or(true)
    }
}

/// Registered styles by id.
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    styles: BTreeMap<String, StyleSheet>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a style, returning the one it replaced.
    pub fn insert(&mut self, style: StyleSheet) -> Option<StyleSheet> {
        self.styles.insert(style.id.clone(), style)
    }

    pub fn remove(&mut self, style_id: &str) -> Option<StyleSheet> {
        self.styles.remove(style_id)
    }

    pub fn get(&self, style_id: &str) -> Option<&StyleSheet> {
        self.styles.get(style_id)
    }

    /// Enables or disables a style.
    ///
    /// # Returns
    ///
    /// `Some(changed)` for known styles, `None` otherwise.
    pub fn set_enabled(&mut self, style_id: &str, enabled: bool) -> Option<bool> {
        let style = self.styles.get_mut(style_id)?;
        let changed = style.enabled != enabled;
        style.enabled = enabled;
        Some(changed)
    }

    pub fn is_enabled(&self, style_id: &str) -> bool {
        self.get(style_id).map(StyleSheet::is_enabled).unwrap_or(false)
    }

    /// Iterates the enabled styles.
    pub fn enabled(&self) -> impl Iterator<Item = &StyleSheet> {
        self.styles.values().filter(|s| s.enabled)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleSheet> {
        self.styles.values()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_affinity() {
        let all = StyleSheet::new("default");
        assert!(all.applies_to("anything"));

        let roads = StyleSheet::new("roads").with_layers(["Road", "Lane"]);
        assert!(roads.applies_to("Lane"));
        assert!(!roads.applies_to("Building"));
    }

    #[test]
    fn test_set_enabled() {
        let mut registry = StyleRegistry::new();
        registry.insert(StyleSheet::new("a"));
        assert_eq!(registry.set_enabled("a", true), Some(false));
        assert_eq!(registry.set_enabled("a", false), Some(true));
        assert_eq!(registry.set_enabled("missing", true), None);
        assert!(!registry.is_enabled("a"));
        assert_eq!(registry.enabled().count(), 0);
    }

    #[test]
    fn test_insert_replaces() {
        let mut registry = StyleRegistry::new();
        assert!(registry.insert(StyleSheet::new("a")).is_none());
        let previous = registry.insert(StyleSheet::new("a").with_enabled(false));
        assert!(previous.unwrap().is_enabled());
        assert_eq!(registry.len(), 1);
    }
}
