//! Tag resolution against an image listing

use crate::error::{DockyardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An image as reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Engine image id (`sha256:...`)
    pub id: String,
    /// Repository tags pointing at this image
    pub tags: Vec<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl ImageDescriptor {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Find the id of the first image carrying exactly `tag`
///
/// No normalization is applied: `web` does not match `web:latest`.
pub fn resolve(images: &[ImageDescriptor], tag: &str) -> Result<String> {
    images
        .iter()
        .find(|image| image.has_tag(tag))
        .map(|image| image.id.clone())
        .ok_or_else(|| DockyardError::ImageNotFound(tag.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: &str, tags: &[&str]) -> ImageDescriptor {
        ImageDescriptor {
            id: id.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created: None,
        }
    }

    #[test]
    fn test_resolve_exact_tag() {
        let images = vec![image("sha256:1", &["a:1"]), image("sha256:2", &["b:2", "c:3"])];
        assert_eq!(resolve(&images, "c:3").unwrap(), "sha256:2");
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let images = vec![image("sha256:1", &["dup"]), image("sha256:2", &["dup"])];
        assert_eq!(resolve(&images, "dup").unwrap(), "sha256:1");
    }

    #[test]
    fn test_resolve_is_not_normalized() {
        let images = vec![image("sha256:1", &["web:latest"])];
        let err = resolve(&images, "web").unwrap_err();
        assert!(matches!(err, DockyardError::ImageNotFound(ref t) if t == "web"));
        assert_eq!(err.to_string(), "Image not found");
    }

    #[test]
    fn test_resolve_empty_listing() {
        assert!(resolve(&[], "anything").is_err());
    }

    #[test]
    fn test_untagged_images_never_match() {
        let images = vec![image("sha256:1", &[]), image("sha256:2", &["<none>:<none>"])];
        assert!(resolve(&images, "").is_err());
    }
}
