//! Action plans produced by page analysis.

/// Placeholder the analyzer uses where the owner's address must be typed.
pub const EMAIL_PLACEHOLDER: &str = "{{EMAIL}}";

/// Selector used when a form needs an email address but the plan names no field.
pub const GENERIC_EMAIL_SELECTOR: &str =
    r#"input[type="email"], input[name*="email" i], input[id*="email" i]"#;

/// What the executor should do next on a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// Click a single button or link.
    ClickButton,
    /// Fill the listed fields, then submit.
    FillForm,
    /// The page already confirms the opt-out.
    AlreadyDone,
    /// The analyzer could not decide.
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClickButton => write!(f, "click_button"),
            Self::FillForm => write!(f, "fill_form"),
            Self::AlreadyDone => write!(f, "already_done"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Kind of form control to fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Email input.
    Email,
    /// Checkbox.
    Checkbox,
    /// Radio button.
    Radio,
    /// Select dropdown.
    Select,
    /// Multi-line text area.
    Textarea,
    /// Plain text input.
    #[default]
    #[serde(other)]
    Text,
}

impl FieldKind {
    /// Checkbox and radio controls are checked rather than typed into.
    pub fn is_checkable(self) -> bool {
        matches!(self, Self::Checkbox | Self::Radio)
    }
}

/// A single form field the plan wants filled.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldToFill {
    /// CSS selector of the control.
    pub selector: String,
    /// Control kind.
    #[serde(default, rename = "type", alias = "fieldKind")]
    pub kind: FieldKind,
    /// Value to enter; may contain [`EMAIL_PLACEHOLDER`].
    #[serde(default)]
    pub value: String,
    /// Why the field is filled.
    #[serde(default)]
    pub purpose: String,
}

impl FieldToFill {
    /// Create a field entry.
    pub fn new(selector: impl Into<String>, kind: FieldKind, value: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            kind,
            value: value.into(),
            purpose: String::new(),
        }
    }

    /// The value with the email placeholder substituted.
    pub fn resolved_value(&self, email: &str) -> String {
        self.value.replace(EMAIL_PLACEHOLDER, email)
    }
}

/// Structured decision about how to opt out on a page.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    /// The page has a clickable unsubscribe control.
    #[serde(default)]
    pub has_button: bool,
    /// Selector of that control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_selector: Option<String>,
    /// The page has a form to fill.
    #[serde(default)]
    pub has_form: bool,
    /// Fields to fill before submitting.
    #[serde(default)]
    pub fields_to_fill: Vec<FieldToFill>,
    /// Selector of the submit control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_selector: Option<String>,
    /// The form needs the subscriber's email address.
    #[serde(default)]
    pub requires_email_input: bool,
    /// Next step.
    #[serde(default)]
    pub next_action: NextAction,
}

impl Default for ActionPlan {
    fn default() -> Self {
        Self::fallback()
    }
}

impl ActionPlan {
    /// The conservative plan used whenever analysis fails: try clicking.
    pub fn fallback() -> Self {
        Self {
            has_button: true,
            button_selector: None,
            has_form: false,
            fields_to_fill: Vec::new(),
            submit_selector: None,
            requires_email_input: false,
            next_action: NextAction::ClickButton,
        }
    }

    /// A plan that reports the page as already done.
    pub fn already_done() -> Self {
        Self {
            has_button: false,
            next_action: NextAction::AlreadyDone,
            ..Self::fallback()
        }
    }

    /// A plan that clicks the given selector.
    pub fn click(selector: impl Into<String>) -> Self {
        Self {
            button_selector: Some(selector.into()),
            ..Self::fallback()
        }
    }

    /// A plan that fills fields and submits.
    pub fn fill(fields: Vec<FieldToFill>, submit_selector: Option<String>) -> Self {
        let requires_email_input = fields.iter().any(|f| f.value.contains(EMAIL_PLACEHOLDER));
        Self {
            has_button: false,
            button_selector: None,
            has_form: true,
            fields_to_fill: fields,
            submit_selector,
            requires_email_input,
            next_action: NextAction::FillForm,
        }
    }

    /// Clean up model output so the plan is internally consistent.
    ///
    /// Blank selectors become `None`, fields without a selector are dropped,
    /// and a fill-form plan that needs an email address but lists no fields
    /// receives a generic email field.
    pub fn normalized(mut self) -> Self {
        self.button_selector = non_blank(self.button_selector.take());
        self.submit_selector = non_blank(self.submit_selector.take());
        self.fields_to_fill.retain(|f| !f.selector.trim().is_empty());

        if self.next_action == NextAction::FillForm
            && self.fields_to_fill.is_empty()
            && self.requires_email_input
        {
            self.fields_to_fill.push(FieldToFill {
                selector: GENERIC_EMAIL_SELECTOR.to_string(),
                kind: FieldKind::Email,
                value: EMAIL_PLACEHOLDER.to_string(),
                purpose: "subscriber email address".to_string(),
            });
        }
        if self.next_action == NextAction::FillForm {
            self.has_form = true;
        }
        self
    }

    /// Tagged view of the plan for the executor.
    pub fn intent(&self) -> PageIntent<'_> {
        match self.next_action {
            NextAction::AlreadyDone => PageIntent::AlreadyDone,
            NextAction::ClickButton => PageIntent::ClickButton {
                selector: self.button_selector.as_deref(),
            },
            NextAction::FillForm => PageIntent::FillForm {
                fields: &self.fields_to_fill,
                submit_selector: self.submit_selector.as_deref(),
                button_selector: self.button_selector.as_deref(),
            },
            NextAction::Unknown => PageIntent::Unknown,
        }
    }
}

/// Borrowed, variant-shaped view of an [`ActionPlan`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageIntent<'a> {
    /// Click a control, starting with the given selector.
    ClickButton {
        /// Selector suggested by the analyzer.
        selector: Option<&'a str>,
    },
    /// Fill fields then submit.
    FillForm {
        /// Fields to fill.
        fields: &'a [FieldToFill],
        /// Explicit submit selector.
        submit_selector: Option<&'a str>,
        /// Button selector, used as a second submit candidate.
        button_selector: Option<&'a str>,
    },
    /// Nothing left to do.
    AlreadyDone,
    /// No usable decision.
    Unknown,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
