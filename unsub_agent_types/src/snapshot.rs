//! Page snapshot types produced by element extraction.

/// A compact, structured view of the actionable parts of a page.
///
/// Produced once per page load and consumed by the intent analyzer. It holds
/// element descriptors rather than full markup so the prompt stays small.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    /// Forms, serialized as their actionable sub-elements only.
    #[serde(default)]
    pub forms: Vec<FormDescriptor>,
    /// Standalone buttons (including submit inputs and `role=button`).
    #[serde(default)]
    pub buttons: Vec<ElementDescriptor>,
    /// Links whose text or target looks relevant.
    #[serde(default)]
    pub links: Vec<ElementDescriptor>,
    /// Sanitized HTML fragments around relevant wording.
    #[serde(default)]
    pub relevant_sections: Vec<String>,
}

impl PageSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every bucket is empty.
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
            && self.buttons.is_empty()
            && self.links.is_empty()
            && self.relevant_sections.is_empty()
    }

    /// Amount of useful text carried by the snapshot.
    ///
    /// Counts the characters of descriptor text, attributes and sections, not
    /// the JSON scaffolding around them.
    pub fn signal_len(&self) -> usize {
        let forms: usize = self
            .forms
            .iter()
            .map(|f| {
                f.action.as_deref().map_or(0, str::len)
                    + f.id.as_deref().map_or(0, str::len)
                    + f.elements.iter().map(ElementDescriptor::signal_len).sum::<usize>()
            })
            .sum();
        let buttons: usize = self.buttons.iter().map(ElementDescriptor::signal_len).sum();
        let links: usize = self.links.iter().map(ElementDescriptor::signal_len).sum();
        let sections: usize = self.relevant_sections.iter().map(|s| s.trim().len()).sum();

        forms + buttons + links + sections
    }

    /// Total number of element descriptors across the buckets.
    pub fn element_count(&self) -> usize {
        self.forms.iter().map(|f| f.elements.len()).sum::<usize>()
            + self.buttons.len()
            + self.links.len()
    }

    /// Render the snapshot as prompt text.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// A form reduced to what is needed to fill and submit it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDescriptor {
    /// CSS selector for the form element.
    #[serde(default)]
    pub selector: String,
    /// Form id attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Form action URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// HTTP method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Visible inputs, selects, textareas and buttons.
    #[serde(default)]
    pub elements: Vec<ElementDescriptor>,
}

/// A single element with the attributes needed to target it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    /// Lower-case tag name.
    pub tag: String,
    /// CSS selector computed in the page.
    #[serde(default)]
    pub selector: String,
    /// `type` attribute.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// `id` attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `class` attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// `name` attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `value` attribute (never populated for password inputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Visible text or label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Link target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Checked state for checkboxes and radios.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    /// Option values for selects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ElementDescriptor {
    /// Create a descriptor for a tag and selector.
    pub fn new(tag: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            selector: selector.into(),
            ..Default::default()
        }
    }

    /// Set the visible text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set the `type` attribute.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the `id` attribute.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the `name` attribute.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the link target.
    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    /// Text that keyword matching is run against.
    pub fn haystack(&self) -> String {
        let mut out = String::with_capacity(self.text.len() + 64);
        for part in [
            Some(self.text.as_str()),
            self.id.as_deref(),
            self.class.as_deref(),
            self.name.as_deref(),
            self.value.as_deref(),
            self.href.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            out.push_str(part);
            out.push(' ');
        }
        out
    }

    /// True for a text-like input that accepts an email address.
    pub fn is_email_input(&self) -> bool {
        if self.tag != "input" {
            return false;
        }
        match self.kind.as_deref() {
            Some("email") => true,
            Some("text") | None => [self.name.as_deref(), self.id.as_deref()]
                .into_iter()
                .flatten()
                .any(|v| v.to_ascii_lowercase().contains("email")),
            _ => false,
        }
    }

    fn signal_len(&self) -> usize {
        self.text.trim().len()
            + self.selector.len()
            + self.id.as_deref().map_or(0, str::len)
            + self.name.as_deref().map_or(0, str::len)
            + self.value.as_deref().map_or(0, str::len)
            + self.href.as_deref().map_or(0, str::len)
    }
}
