//! Process-wide form defaults.
//!
//! One [`FormConfig`] is built at process start and shared by `Arc`
//! into every form instance; there is no mutable global registry. A
//! form can still override the view, per-input views, and view data
//! for itself through its builder.

use std::collections::HashMap;

use formbind_core::{InputKind, ValueMap};
use serde_json::Value;

/// Default view names and view data applied to every new form.
#[derive(Debug, Clone, Default)]
pub struct FormConfig {
    /// View the form template renders with.
    pub view: String,
    /// Per-input-kind field templates.
    pub input_views: HashMap<InputKind, String>,
    /// Data merged under every form's view data.
    pub view_data: ValueMap,
}

impl FormConfig {
    pub fn new(view: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            ..Self::default()
        }
    }

    /// The stock theme: `<theme>/form` plus `<theme>/fields/<input>`
    /// for every input kind.
    pub fn themed(theme: &str) -> Self {
        let mut config = Self::new(format!("{theme}/form"));
        for kind in [
            InputKind::Text,
            InputKind::Textarea,
            InputKind::Number,
            InputKind::Date,
            InputKind::Email,
            InputKind::Radio,
            InputKind::Checkbox,
            InputKind::Select,
            InputKind::SelectMultiple,
            InputKind::File,
            InputKind::Image,
        ] {
            config
                .input_views
                .insert(kind, format!("{theme}/fields/{kind}"));
        }
        config
    }

    pub fn with_input_view(mut self, kind: InputKind, view: impl Into<String>) -> Self {
        self.input_views.insert(kind, view.into());
        self
    }

    pub fn with_view_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.view_data.insert(key.into(), value);
        self
    }

    pub fn input_view(&self, kind: InputKind) -> Option<&str> {
        self.input_views.get(&kind).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn themed_config_covers_every_input_kind() {
        let config = FormConfig::themed("bs3");
        assert_eq!(config.view, "bs3/form");
        assert_eq!(config.input_view(InputKind::Text), Some("bs3/fields/text"));
        assert_eq!(
            config.input_view(InputKind::SelectMultiple),
            Some("bs3/fields/select-multiple")
        );
        assert_eq!(config.input_views.len(), 11);
    }

    #[test]
    fn overrides_replace_themed_defaults() {
        let config = FormConfig::themed("bs3")
            .with_input_view(InputKind::Date, "custom/datepicker")
            .with_view_data("site", json!("admin"));
        assert_eq!(config.input_view(InputKind::Date), Some("custom/datepicker"));
        assert_eq!(config.view_data["site"], json!("admin"));
    }
}
