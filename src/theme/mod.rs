//! Theme engine
//!
//! Templates are rendered with Tera. The default theme is compiled into the
//! binary; a theme directory on disk (`<theme.path>/<theme.active>/`) may
//! override any template under `templates/` and any asset under `static/`,
//! file by file.

use anyhow::{Context, Result};
use rust_embed::RustEmbed;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tera::{Context as TeraContext, Tera, Value};

mod error;

pub use error::ThemeError;

/// Templates of the built-in theme
#[derive(RustEmbed)]
#[folder = "themes/default/templates/"]
#[include = "*.html"]
struct DefaultTemplates;

/// Static assets of the built-in theme
#[derive(RustEmbed)]
#[folder = "themes/default/static/"]
struct DefaultAssets;

/// Name of the built-in theme
pub const DEFAULT_THEME: &str = "default";

/// Theme engine for rendering templates
pub struct ThemeEngine {
    tera: Tera,
    themes_path: PathBuf,
    current_theme: String,
}

/// The signed-in user as templates see it
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
}

/// Variables every page template can rely on
#[derive(Debug, Clone, Serialize)]
pub struct StandardTemplateVars {
    pub site_name: String,
    pub request_path: String,
    pub year: i32,
    pub csrf_token: String,
    pub current_user: Option<CurrentUser>,
}

impl ThemeEngine {
    /// Build the engine for `active`, layered over the built-in theme.
    ///
    /// A missing theme directory is not an error: the built-in templates
    /// are used as they are.
    pub fn new(themes_path: &Path, active: &str) -> Result<Self> {
        let mut engine = Self {
            tera: Tera::default(),
            themes_path: themes_path.to_path_buf(),
            current_theme: active.to_string(),
        };
        engine.load_templates()?;
        Ok(engine)
    }

    /// Only the templates compiled into the binary
    pub fn embedded() -> Result<Self> {
        let mut engine = Self {
            tera: Tera::default(),
            themes_path: PathBuf::new(),
            current_theme: DEFAULT_THEME.to_string(),
        };
        engine.load_templates()?;
        Ok(engine)
    }

    fn theme_dir(&self) -> Option<PathBuf> {
        if self.themes_path.as_os_str().is_empty() {
            return None;
        }
        let dir = self.themes_path.join(&self.current_theme);
        dir.is_dir().then_some(dir)
    }

    fn load_templates(&mut self) -> Result<()> {
        let mut templates: HashMap<String, String> = HashMap::new();

        for name in DefaultTemplates::iter() {
            if let Some(file) = DefaultTemplates::get(&name) {
                let content = String::from_utf8(file.data.into_owned())
                    .with_context(|| format!("Embedded template is not UTF-8: {}", name))?;
                templates.insert(name.replace('\\', "/"), content);
            }
        }

        let mut overridden = 0;
        if let Some(dir) = self.theme_dir() {
            let template_dir = dir.join("templates");
            let mut from_disk = Vec::new();
            collect_templates_from_dir(&template_dir, &template_dir, &mut from_disk)?;
            overridden = from_disk.len();
            templates.extend(from_disk);
        } else if self.current_theme != DEFAULT_THEME {
            tracing::warn!(
                "Theme '{}' not found under {:?}, using built-in templates",
                self.current_theme,
                self.themes_path
            );
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| ThemeError::TemplateError(describe_tera_error(&e)))?;
        register_filters(&mut tera);

        if overridden > 0 {
            tracing::info!(
                "Theme '{}' overrides {} template(s)",
                self.current_theme,
                overridden
            );
        }

        self.tera = tera;
        Ok(())
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            ThemeError::TemplateError(format!(
                "Failed to render '{}': {}",
                template,
                describe_tera_error(&e)
            ))
            .into()
        })
    }

    /// Render with the standard page variables merged in
    pub fn render_with_standard_vars(
        &self,
        template: &str,
        context: &TeraContext,
        vars: &StandardTemplateVars,
    ) -> Result<String> {
        let mut full = context.clone();
        full.insert("site_name", &vars.site_name);
        full.insert("request_path", &vars.request_path);
        full.insert("year", &vars.year);
        full.insert("csrf_token", &vars.csrf_token);
        full.insert("current_user", &vars.current_user);
        full.insert("theme_name", &self.current_theme);
        self.render(template, &full)
    }

    /// Render, or fall back to a bare HTML page describing the failure.
    /// Used for error pages, which must never fail themselves.
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext, title: &str) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("{:#}", e);
                simple_error_page(title)
            }
        }
    }

    /// A static asset: the theme directory first, then the built-in copy
    pub fn static_asset(&self, path: &str) -> Option<Cow<'static, [u8]>> {
        let relative = safe_relative_path(path)?;

        if let Some(dir) = self.theme_dir() {
            let on_disk = dir.join("static").join(&relative);
            if on_disk.is_file() {
                match fs::read(&on_disk) {
                    Ok(bytes) => return Some(Cow::Owned(bytes)),
                    Err(e) => tracing::warn!("Failed to read {:?}: {}", on_disk, e),
                }
            }
        }

        let key = relative.to_string_lossy().replace('\\', "/");
        DefaultAssets::get(&key).map(|file| file.data)
    }
}

/// Reject absolute paths and `..` so assets cannot escape the theme
fn safe_relative_path(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let candidate = Path::new(trimmed);
    candidate
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| candidate.to_path_buf())
}

fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<()> {
    if !current_path.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(current_path)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let relative = path
                .strip_prefix(base_path)
                .map_err(|_| ThemeError::TemplateError("Failed to get relative path".to_string()))?;
            let name = relative.to_string_lossy().replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;
            templates.push((name, content));
        }
    }
    Ok(())
}

fn describe_tera_error(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

fn register_filters(tera: &mut Tera) {
    tera.register_filter("linebreaksbr", linebreaksbr);
    tera.register_filter("truncatewords", truncatewords);
    tera.register_filter("or_not_set", or_not_set);
}

/// Escape, then turn newlines into `<br>`
fn linebreaksbr(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = tera::try_get_value!("linebreaksbr", "value", String, value);
    let escaped = tera::escape_html(&text).replace("\r\n", "\n");
    Ok(Value::String(escaped.replace('\n', "<br>")))
}

/// Keep the first `count` words, marking the cut with an ellipsis
fn truncatewords(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = tera::try_get_value!("truncatewords", "value", String, value);
    let count = match args.get("count") {
        Some(v) => tera::try_get_value!("truncatewords", "count", usize, v),
        None => return Err(tera::Error::msg("Filter `truncatewords` expected an arg called `count`")),
    };

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= count {
        return Ok(Value::String(words.join(" ")));
    }
    Ok(Value::String(format!("{} …", words[..count].join(" "))))
}

/// Admin screens show a placeholder for empty values
fn or_not_set(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let empty = match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    Ok(if empty {
        Value::String("Not set".to_string())
    } else {
        value.clone()
    })
}

fn simple_error_page(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>{title}</title></head>
<body><h1>{title}</h1><p><a href="/">Home</a></p></body>
</html>"#,
        title = tera::escape_html(title)
    )
}
