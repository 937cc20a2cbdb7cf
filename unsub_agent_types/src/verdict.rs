//! Outcome verdicts and per-target results.

/// Classified status of an unsubscribe attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The page confirms the address was removed.
    Unsubscribed,
    /// The address was not (or no longer) on the list.
    AlreadyUnsubscribed,
    /// The page reports a failure.
    Error,
    /// A further step is needed, such as a confirmation email.
    RequiresAction,
    /// Nothing conclusive.
    #[default]
    #[serde(other)]
    Unknown,
}

impl OutcomeStatus {
    /// Statuses that count as a completed opt-out.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Unsubscribed | Self::AlreadyUnsubscribed)
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unsubscribed => "unsubscribed",
            Self::AlreadyUnsubscribed => "already_unsubscribed",
            Self::Error => "error",
            Self::Unknown => "unknown",
            Self::RequiresAction => "requires_action",
        };
        f.write_str(s)
    }
}

/// Terminal verdict for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OutcomeVerdict {
    /// Whether the attempt counts as a success.
    pub succeeded: bool,
    /// Classified status.
    pub status: OutcomeStatus,
    /// Human-readable explanation.
    pub reason: String,
}

impl OutcomeVerdict {
    /// Build a verdict whose success flag follows the status.
    pub fn new(status: OutcomeStatus, reason: impl Into<String>) -> Self {
        Self {
            succeeded: status.is_success(),
            status,
            reason: reason.into(),
        }
    }

    /// An inconclusive verdict.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Unknown, reason)
    }

    /// True when the verdict is inconclusive.
    pub fn is_unknown(&self) -> bool {
        self.status == OutcomeStatus::Unknown
    }
}

/// A single URL believed to lead to an opt-out flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeTarget {
    /// The unsubscribe URL.
    pub url: String,
    /// Address used to autofill forms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email_address: Option<String>,
    /// Provider id of the email the link came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
}

impl UnsubscribeTarget {
    /// Create a target for a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the owner address.
    pub fn with_owner_email(mut self, email: Option<impl Into<String>>) -> Self {
        self.owner_email_address = email.map(Into::into);
        self
    }

    /// Set the source message id.
    pub fn with_source_message(mut self, id: impl Into<String>) -> Self {
        self.source_message_id = Some(id.into());
        self
    }
}

/// A captured screenshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Where the image was written, if persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<std::path::PathBuf>,
    /// Inline base64 PNG for immediate display.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base64: String,
    /// RFC 3339 capture time.
    pub captured_at: String,
}

impl Artifact {
    /// A `data:` URL for the inline image.
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }

    /// Copy without the inline payload, for audit logs.
    pub fn without_inline(&self) -> Self {
        Self {
            path: self.path.clone(),
            base64: String::new(),
            captured_at: self.captured_at.clone(),
        }
    }
}

/// Result for one unsubscribe target.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeOutcome {
    /// Target URL.
    pub url: String,
    /// Whether the opt-out succeeded.
    pub succeeded: bool,
    /// Human-readable summary.
    pub message: String,
    /// Verdict status, when verification ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OutcomeStatus>,
    /// Screenshot before acting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_artifact: Option<Artifact>,
    /// Screenshot after acting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_artifact: Option<Artifact>,
}

impl UnsubscribeOutcome {
    /// A failed outcome.
    pub fn failure(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            succeeded: false,
            message: message.into(),
            ..Default::default()
        }
    }

    /// An outcome built from a verdict.
    pub fn from_verdict(url: impl Into<String>, verdict: &OutcomeVerdict) -> Self {
        Self {
            url: url.into(),
            succeeded: verdict.succeeded,
            message: verdict.reason.clone(),
            status: Some(verdict.status),
            ..Default::default()
        }
    }

    /// Attach the screenshots.
    pub fn with_artifacts(mut self, before: Option<Artifact>, after: Option<Artifact>) -> Self {
        self.before_artifact = before;
        self.after_artifact = after;
        self
    }

    /// Copy suitable for an audit line (no inline images).
    pub fn for_audit(&self) -> Self {
        Self {
            before_artifact: self.before_artifact.as_ref().map(Artifact::without_inline),
            after_artifact: self.after_artifact.as_ref().map(Artifact::without_inline),
            ..self.clone()
        }
    }
}
