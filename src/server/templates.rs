//! Template rendering using minijinja with embedded templates.

use minijinja::{Environment, Error as JinjaError, ErrorKind};
use rust_embed::Embed;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::accounts::AccountRecord;
use crate::daemon::DaemonRecord;

/// Embedded HTML templates.
#[derive(Embed)]
#[folder = "templates/"]
pub struct Templates;

/// A template engine for rendering the launcher page.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a new template engine with embedded templates.
    pub fn new() -> Result<Self, JinjaError> {
        let mut env = Environment::new();

        for file in Templates::iter() {
            let filename = file.to_string();
            if let Some(content) = Templates::get(&filename) {
                let template_str = std::str::from_utf8(content.data.as_ref())
                    .map_err(|_| JinjaError::from(ErrorKind::InvalidOperation))?;
                env.add_template_owned(filename, template_str.to_string())?;
            }
        }

        Ok(Self { env })
    }

    /// Render the main page.
    pub fn render_index(&self, view: &IndexView) -> Result<String, JinjaError> {
        let template = self.env.get_template("index.html")?;
        template.render(minijinja::context! { page => view })
    }
}

/// Page timing handed to the client script.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageSettings {
    pub poll_interval_ms: u64,
    pub notification_timeout_ms: u64,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            notification_timeout_ms: crate::config::DEFAULT_NOTIFICATION_TIMEOUT_MS,
        }
    }
}

/// An account row. Tokens never reach the rendered HTML.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub nickname: String,
    pub display_name: String,
}

/// View model for `index.html`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexView {
    pub accounts: Vec<AccountView>,
    pub daemons: Vec<DaemonRecord>,
    pub settings: PageSettings,
}

impl IndexView {
    pub fn new(
        accounts: &BTreeMap<String, AccountRecord>,
        daemons: Vec<DaemonRecord>,
        settings: PageSettings,
    ) -> Self {
        Self {
            accounts: accounts
                .iter()
                .map(|(nickname, record)| AccountView {
                    nickname: nickname.clone(),
                    display_name: record.display_name.clone(),
                })
                .collect(),
            daemons,
            settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> IndexView {
        let mut accounts = BTreeMap::new();
        accounts.insert(
            "main".to_string(),
            AccountRecord::new("c1", "s1", "Zezima").with_tokens("secret-r", "secret-a"),
        );
        let daemons = vec![DaemonRecord::new("pc2", [10, 0, 0, 2].into(), 5001)];
        IndexView::new(&accounts, daemons, PageSettings::default())
    }

    #[test]
    fn test_render_lists_accounts_and_daemons() {
        let engine = TemplateEngine::new().unwrap();
        let html = engine.render_index(&view()).unwrap();

        assert!(html.contains("Zezima"));
        assert!(html.contains("main"));
        assert!(html.contains("pc2"));
        assert!(html.contains("data-notification-timeout=\"3000\""));
    }

    #[test]
    fn test_render_never_includes_tokens() {
        let engine = TemplateEngine::new().unwrap();
        let html = engine.render_index(&view()).unwrap();

        assert!(!html.contains("secret-r"));
        assert!(!html.contains("secret-a"));
    }

    #[test]
    fn test_render_empty_state() {
        let engine = TemplateEngine::new().unwrap();
        let view = IndexView::new(&BTreeMap::new(), Vec::new(), PageSettings::default());
        let html = engine.render_index(&view).unwrap();
        assert!(html.contains("No accounts yet"));
    }
}
