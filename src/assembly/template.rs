//! `user_info` label templates.

/// Expands a `user_info` template into a label value.
///
/// Implementations must be pure: the same template yields the same value
/// for the duration of a scrape and has no side effects.
pub trait TemplateEngine: Send + Sync {
    /// Returns the expanded template.
    fn substitute(&self, template: &str) -> String;
}

/// Template engine that returns templates unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl TemplateEngine for Verbatim {
    fn substitute(&self, template: &str) -> String {
        template.to_owned()
    }
}

impl<F> TemplateEngine for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn substitute(&self, template: &str) -> String {
        self(template)
    }
}
