//! Turning dispatch requests into subject/body text.
//!
//! `TemplateRenderer` is a small engine: `{{name}}` placeholders
//! and nothing else. Hosts with a real template engine implement
//! `NotificationRenderer` themselves.

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchRequest;
use crate::error::{ConfigError, RenderError};
use crate::storage::RenderConfig;
use crate::tier::NotificationKind;

pub const DEFAULT_BASE_URL: &str = "https://groups.example.com/";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_STANDARD_SUBJECT: &str = "Membership audit for {{group}}";
pub const DEFAULT_STANDARD_BODY: &str = "\
Group {{group}} is being audited.

As an owner of {{group}}, please review its members and confirm who should
keep access before {{ends_at}}.

Start the review here: {{url}}
";
pub const DEFAULT_REMINDER_SUBJECT: &str = "Reminder: membership audit for {{group}}";
pub const DEFAULT_REMINDER_BODY: &str = "\
The membership audit for {{group}} ends on {{ends_at}} ({{days_left}} days left).

If you have not finished reviewing its members, please do so here: {{url}}
";

/// Rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedNotification {
    pub subject: String,
    pub body: String,
}

pub trait NotificationRenderer {
    fn render(&self, request: &DispatchRequest) -> Result<RenderedNotification, RenderError>;
}

/// Subject and body template for one notification kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePair {
    pub subject: String,
    pub body: String,
}

impl TemplatePair {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Check placeholders without rendering.
    pub fn check(&self, kind: NotificationKind) -> Result<(), RenderError> {
        for template in [&self.subject, &self.body] {
            expand(template, |name| {
                variable_allowed(name, kind)?;
                Ok(String::new())
            })?;
        }
        Ok(())
    }
}

/// Rejects chrono format strings containing unknown specifiers.
pub fn validate_date_format(format: &str) -> Result<(), RenderError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(RenderError::InvalidDateFormat(format.to_string()));
    }
    Ok(())
}

fn variable_allowed(name: &str, kind: NotificationKind) -> Result<(), RenderError> {
    match name {
        "group" | "url" | "ends_at" | "tier" => Ok(()),
        "days_left" if kind == NotificationKind::Reminder => Ok(()),
        "days_left" => Err(RenderError::VariableNotAvailable(name.to_string())),
        _ => Err(RenderError::UnknownVariable(name.to_string())),
    }
}

/// Replace every `{{name}}` in `template` with `lookup(name)`.
fn expand(
    template: &str,
    lookup: impl Fn(&str) -> Result<String, RenderError>,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or(RenderError::Unterminated(offset + start))?;
        out.push_str(&lookup(after[..end].trim())?);

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Built-in `{{placeholder}}` renderer with one template pair per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRenderer {
    /// Normalized by `url::Url`.
    base_url: String,
    date_format: String,
    standard: TemplatePair,
    reminder: TemplatePair,
}

impl TemplateRenderer {
    pub fn new(
        base_url: url::Url,
        date_format: impl Into<String>,
        standard: TemplatePair,
        reminder: TemplatePair,
    ) -> Result<Self, RenderError> {
        let date_format = date_format.into();
        validate_date_format(&date_format)?;
        standard.check(NotificationKind::Standard)?;
        reminder.check(NotificationKind::Reminder)?;
        Ok(Self {
            base_url: base_url.into(),
            date_format,
            standard,
            reminder,
        })
    }

    pub fn from_config(config: &RenderConfig) -> Result<Self, ConfigError> {
        let base_url = url::Url::parse(&config.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "render.base_url".into(),
            message: e.to_string(),
        })?;
        Self::new(
            base_url,
            config.date_format.clone(),
            config.standard.clone(),
            config.reminder.clone(),
        )
        .map_err(|e| ConfigError::InvalidValue {
            key: "render".into(),
            message: e.to_string(),
        })
    }

    fn templates(&self, kind: NotificationKind) -> &TemplatePair {
        match kind {
            NotificationKind::Standard => &self.standard,
            NotificationKind::Reminder => &self.reminder,
        }
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            standard: TemplatePair::new(DEFAULT_STANDARD_SUBJECT, DEFAULT_STANDARD_BODY),
            reminder: TemplatePair::new(DEFAULT_REMINDER_SUBJECT, DEFAULT_REMINDER_BODY),
        }
    }
}

impl NotificationRenderer for TemplateRenderer {
    fn render(&self, request: &DispatchRequest) -> Result<RenderedNotification, RenderError> {
        let lookup = |name: &str| -> Result<String, RenderError> {
            variable_allowed(name, request.kind)?;
            Ok(match name {
                "group" => request.group.clone(),
                "url" => self.base_url.clone(),
                "ends_at" => request.ends_at.format(&self.date_format).to_string(),
                "tier" => request.tier.clone(),
                // Overdue notices read "0 days left" rather than a negative count.
                "days_left" => request.days_left.max(0).to_string(),
                other => return Err(RenderError::UnknownVariable(other.to_string())),
            })
        };

        let templates = self.templates(request.kind);
        Ok(RenderedNotification {
            subject: expand(&templates.subject, &lookup)?,
            body: expand(&templates.body, &lookup)?,
        })
    }
}
