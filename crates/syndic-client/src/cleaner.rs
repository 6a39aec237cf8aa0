use std::sync::Arc;

use htmd::HtmlToMarkdown;
use syndic_core::error::AppError;
use syndic_core::traits::Cleaner;

/// HTML-to-text cleaner using htmd.
///
/// ATS descriptions arrive as HTML fragments; they are converted to
/// Markdown-flavoured text with non-content elements dropped.
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for HtmdCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "noscript", "iframe", "svg", "img", "form", "button",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for HtmdCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        self.converter
            .convert(html)
            .map(|text| text.trim().to_string())
            .map_err(|e| AppError::MalformedResponse(format!("Failed to convert HTML: {e}")))
    }
}
