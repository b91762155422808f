use serde::{Deserialize, Serialize};

/// Draft/published pair of snapshots for one entity.
///
/// `published` is None until the first publish and afterwards is always a
/// copy of some earlier `unpublished` value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Versioned<T> {
    pub unpublished: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<T>,
}

impl<T: Clone> Versioned<T> {
    /// Fresh content that has never been published.
    pub fn draft(content: T) -> Self {
        Self {
            unpublished: content,
            published: None,
        }
    }

    /// Snapshot the draft into the published slot.
    pub fn publish(&mut self) {
        self.published = Some(self.unpublished.clone());
    }

    pub fn is_published(&self) -> bool {
        self.published.is_some()
    }

    /// The snapshot served in the given mode. Edit mode always has one.
    pub fn view(&self, view_mode: bool) -> Option<&T> {
        if view_mode {
            self.published.as_ref()
        } else {
            Some(&self.unpublished)
        }
    }

    /// Apply the same edit to both snapshots.
    pub fn map_both(&mut self, mut f: impl FnMut(&mut T)) {
        f(&mut self.unpublished);
        if let Some(published) = self.published.as_mut() {
            f(published);
        }
    }
}

/// Entities whose content goes through the publish pipeline.
pub trait Publishable {
    /// Copy unpublished content into the published snapshot.
    fn publish(&mut self);

    fn is_published(&self) -> bool;

    /// Whether the draft was deleted and the next publish retires the entity.
    fn is_pending_delete(&self) -> bool;

    /// Delete the draft only. The published snapshot keeps serving until
    /// the next publish.
    fn mark_pending_delete(&mut self, at: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_copies_without_aliasing() {
        let mut v = Versioned::draft(vec!["a".to_string()]);
        assert!(v.view(true).is_none());
        assert_eq!(v.view(false).unwrap().len(), 1);

        v.publish();
        v.unpublished.push("b".into());
        assert_eq!(v.published.as_ref().unwrap(), &vec!["a".to_string()]);
        assert_eq!(v.unpublished.len(), 2);
    }

    #[test]
    fn map_both_skips_missing_published() {
        let mut v = Versioned::draft(1);
        v.map_both(|x| *x += 1);
        assert_eq!(v.unpublished, 2);
        assert!(v.published.is_none());

        v.publish();
        v.map_both(|x| *x *= 10);
        assert_eq!(v.unpublished, 20);
        assert_eq!(v.published, Some(20));
    }

    #[test]
    fn published_omitted_when_absent() {
        let v = Versioned::draft("x".to_string());
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json, serde_json::json!({"unpublished": "x"}));
    }
}
