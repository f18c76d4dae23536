//! File-level properties.

use std::time::{SystemTime, UNIX_EPOCH};

/// Descriptive header of a DAS file. Exactly one per file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties {
    /// Model name. Omitted from the file when empty.
    pub model: String,
    /// Author. Omitted from the file when empty.
    pub author: String,
    /// Copyright notice. Omitted from the file when empty.
    pub copyright: String,
    /// Modification time, seconds since the Unix epoch.
    pub moddate: u64,
    /// Whether the finished file was passed through the external compression layer.
    pub compression: bool,
}

impl Properties {
    /// Create properties for a model, stamped with the current time.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            moddate: unix_now(),
            ..Self::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_copyright(mut self, copyright: impl Into<String>) -> Self {
        self.copyright = copyright.into();
        self
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_stamped() {
        let p = Properties::new("crate").with_author("A");
        assert_eq!(p.model, "crate");
        assert_eq!(p.author, "A");
        assert!(p.copyright.is_empty());
        assert!(p.moddate > 0);
        assert!(!p.compression);
    }
}
