//! Tag policy
//!
//! Derives the tag set for a release from its revision and date. Every
//! release carries exactly two tags: a versioned tag pinning the revision
//! and date, and the floating "latest". Both resolve to the same image.

/// Floating tag every release also publishes under
pub const FLOATING_TAG: &str = "latest";

/// Length of the shortened revision prefix in versioned tags
const SHORT_REVISION_LEN: usize = 7;

/// The tag pair for one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTags {
    /// Revision-and-date derived tag
    pub versioned: String,
    /// Always "latest"
    pub floating: String,
}

impl ReleaseTags {
    /// Both tags in publish order
    pub fn all(&self) -> [&str; 2] {
        [&self.versioned, &self.floating]
    }
}

/// Compute the tag pair for a revision and a YYYYMMDD date.
///
/// The versioned tag is `{short-revision}-{date}`; with an empty revision
/// it degrades to the date alone.
pub fn tags(revision: &str, date: &str) -> ReleaseTags {
    let short: String = revision.chars().take(SHORT_REVISION_LEN).collect();
    let versioned = if short.is_empty() {
        date.to_string()
    } else {
        format!("{short}-{date}")
    };

    ReleaseTags {
        versioned,
        floating: FLOATING_TAG.to_string(),
    }
}
