//! Email records, categories and sync bookkeeping.

/// Maximum category name length, in characters, after trimming.
pub const CATEGORY_NAME_MAX: usize = 50;
/// Maximum category description length, in characters.
pub const CATEGORY_DESCRIPTION_MAX: usize = 500;

/// A stored email.
///
/// `provider_message_id` is the idempotency key: inserting the same id twice
/// is a no-op.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    /// Mailbox this email was imported from.
    pub account_id: String,
    /// Provider-side unique id.
    pub provider_message_id: String,
    /// Provider thread id.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Subject header.
    #[serde(default)]
    pub subject: String,
    /// From header.
    #[serde(default)]
    pub from: String,
    /// To recipients.
    #[serde(default)]
    pub to: Vec<String>,
    /// All headers, in order.
    #[serde(default)]
    pub raw_headers: Vec<(String, String)>,
    /// Plain text body.
    #[serde(default)]
    pub body_text: Option<String>,
    /// HTML body.
    #[serde(default)]
    pub body_html: Option<String>,
    /// Discovered unsubscribe URL.
    #[serde(default)]
    pub unsubscribe_link: Option<String>,
    /// Assigned category.
    #[serde(default)]
    pub category_id: Option<String>,
    /// Confidence of the category assignment.
    #[serde(default)]
    pub ai_confidence: Option<f32>,
    /// Short summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Read flag.
    #[serde(default)]
    pub is_read: bool,
    /// Receive time, RFC 3339.
    #[serde(default)]
    pub received_at: Option<String>,
}

impl EmailRecord {
    /// Best available body text for prompts.
    pub fn content_for_prompt(&self) -> &str {
        self.body_text
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.body_html.as_deref())
            .unwrap_or_default()
    }

    /// Whether the classification pass still has work on this record.
    pub fn needs_classification(&self, has_categories: bool) -> bool {
        self.summary.is_none() || (has_categories && self.category_id.is_none())
    }
}

/// A user-defined category.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDefinition {
    /// Category id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// What belongs in the category.
    #[serde(default)]
    pub description: String,
    /// `#rrggbb` display color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CategoryDefinition {
    /// Create a category.
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            color: None,
        }
    }

    /// Set the color.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Check name, description and color against the accepted shapes.
    pub fn validate(&self) -> Result<(), CategoryError> {
        validate_category_name(&self.name)?;
        validate_category_description(&self.description)?;
        if let Some(color) = &self.color {
            validate_category_color(color)?;
        }
        Ok(())
    }
}

/// Category validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryError {
    /// Name is blank after trimming.
    EmptyName,
    /// Name is longer than [`CATEGORY_NAME_MAX`] characters.
    NameTooLong(usize),
    /// Description is longer than [`CATEGORY_DESCRIPTION_MAX`] characters.
    DescriptionTooLong(usize),
    /// Color is not a six-digit hex color.
    InvalidColor(String),
}

impl std::fmt::Display for CategoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "category name is required"),
            Self::NameTooLong(n) => {
                write!(f, "category name is {} characters, max {}", n, CATEGORY_NAME_MAX)
            }
            Self::DescriptionTooLong(n) => write!(
                f,
                "category description is {} characters, max {}",
                n, CATEGORY_DESCRIPTION_MAX
            ),
            Self::InvalidColor(c) => write!(f, "invalid color {:?}, expected #rrggbb", c),
        }
    }
}

impl std::error::Error for CategoryError {}

/// Validate a category name: 1..=50 characters after trimming.
pub fn validate_category_name(name: &str) -> Result<(), CategoryError> {
    let len = name.trim().chars().count();
    if len == 0 {
        Err(CategoryError::EmptyName)
    } else if len > CATEGORY_NAME_MAX {
        Err(CategoryError::NameTooLong(len))
    } else {
        Ok(())
    }
}

/// Validate a category description length.
pub fn validate_category_description(description: &str) -> Result<(), CategoryError> {
    let len = description.chars().count();
    if len > CATEGORY_DESCRIPTION_MAX {
        Err(CategoryError::DescriptionTooLong(len))
    } else {
        Ok(())
    }
}

/// Validate a `#rrggbb` color. Three-digit shorthand is rejected.
pub fn validate_category_color(color: &str) -> Result<(), CategoryError> {
    let ok = color.len() == 7
        && color.starts_with('#')
        && color[1..].bytes().all(|b| b.is_ascii_hexdigit());
    if ok {
        Ok(())
    } else {
        Err(CategoryError::InvalidColor(color.to_string()))
    }
}

/// Options for one sync run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    /// Upper bound on message ids listed per account.
    pub max_messages: usize,
    /// Archive imported messages in the mailbox.
    pub archive_after_import: bool,
    /// Provider-side list query.
    pub query: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_messages: 50,
            archive_after_import: false,
            query: "in:inbox".to_string(),
        }
    }
}

impl SyncOptions {
    /// Set the message cap.
    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    /// Toggle archiving.
    pub fn with_archive_after_import(mut self, archive: bool) -> Self {
        self.archive_after_import = archive;
        self
    }

    /// Set the list query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }
}

/// Per-account sync report.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Account id.
    pub account_id: String,
    /// Full messages fetched from the provider.
    pub fetched: usize,
    /// New records stored.
    pub stored: usize,
    /// Ids skipped because they were already stored.
    pub skipped: usize,
    /// Messages archived in the mailbox.
    pub archived: usize,
    /// Records that received a category.
    pub ai_categorized: usize,
    /// Records that received a summary.
    pub summarized: usize,
    /// Errors recorded for this account.
    pub errors: Vec<String>,
}

impl SyncResult {
    /// Empty result for an account.
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Default::default()
        }
    }

    /// Record an error.
    pub fn push_error(&mut self, err: impl std::fmt::Display) {
        self.errors.push(err.to_string());
    }

    /// True when no errors were recorded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_length_boundary() {
        assert!(validate_category_name(&"a".repeat(50)).is_ok());
        assert_eq!(
            validate_category_name(&"a".repeat(51)),
            Err(CategoryError::NameTooLong(51))
        );
        assert_eq!(validate_category_name("   "), Err(CategoryError::EmptyName));
        assert!(validate_category_name(&format!("  {}  ", "b".repeat(50))).is_ok());
    }

    #[test]
    fn test_color_requires_six_digits() {
        assert!(validate_category_color("#1a2b3c").is_ok());
        assert!(validate_category_color("#ABCDEF").is_ok());
        assert!(validate_category_color("#fff").is_err());
        assert!(validate_category_color("1a2b3c0").is_err());
        assert!(validate_category_color("#1a2b3g").is_err());
    }

    #[test]
    fn test_category_validate() {
        let ok = CategoryDefinition::new("c1", "Newsletters", "Weekly digests").with_color("#1a2b3c");
        assert!(ok.validate().is_ok());

        let bad = CategoryDefinition::new("c2", "Promos", "x".repeat(501));
        assert_eq!(bad.validate(), Err(CategoryError::DescriptionTooLong(501)));

        let bad_color = CategoryDefinition::new("c3", "Receipts", "").with_color("#fff");
        assert!(matches!(bad_color.validate(), Err(CategoryError::InvalidColor(_))));
    }

    #[test]
    fn test_needs_classification() {
        let mut record = EmailRecord::default();
        assert!(record.needs_classification(false));
        record.summary = Some("hi".into());
        assert!(!record.needs_classification(false));
        assert!(record.needs_classification(true));
        record.category_id = Some("c1".into());
        assert!(!record.needs_classification(true));
    }

    #[test]
    fn test_prompt_content_prefers_text() {
        let record = EmailRecord {
            body_text: Some("  ".into()),
            body_html: Some("<p>hi</p>".into()),
            ..Default::default()
        };
        assert_eq!(record.content_for_prompt(), "<p>hi</p>");
    }
}
