//! Deterministic task templates used when no generator is available or the
//! generator keeps failing.

use super::collaborators::{GenerateError, WorkGenerator};
use crate::types::Category;

/// Query templates, in the order they are used.
pub const FALLBACK_TEMPLATES: [&str; 5] = [
    "{category} software vendors in {location}",
    "{category} practice management software {location}",
    "{category} billing software companies near {location}",
    "best {category} EHR systems in {location}",
    "top-rated {category} software solutions {location}",
];

/// Renders a category name for use in natural-language tasks.
///
/// `auto-repair` becomes `auto repair`.
pub fn category_phrase(category: &Category) -> String {
    category.as_str().replace(['-', '_'], " ")
}

/// Returns up to `count` templated tasks for a location.
pub fn fallback_tasks(category: &Category, location: &str, count: usize) -> Vec<String> {
    let phrase = category_phrase(category);
    FALLBACK_TEMPLATES
        .iter()
        .take(count)
        .map(|t| t.replace("{category}", &phrase).replace("{location}", location))
        .collect()
}

/// A generator that only ever returns the templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl WorkGenerator for TemplateGenerator {
    async fn generate(
        &self,
        category: &Category,
        location: &str,
        count: usize,
    ) -> Result<Vec<String>, GenerateError> {
        Ok(fallback_tasks(category, location, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_fills_in_category_and_location() {
        let category = Category::parse("auto-repair").unwrap();
        let tasks = fallback_tasks(&category, "Fresno, CA 93650", 2);
        assert_eq!(
            tasks,
            vec![
                "auto repair software vendors in Fresno, CA 93650",
                "auto repair practice management software Fresno, CA 93650",
            ]
        );
    }

    #[test]
    fn fallback_is_capped_at_template_count() {
        let category = Category::parse("optometry").unwrap();
        assert_eq!(fallback_tasks(&category, "Reno, NV 89501", 12).len(), 5);
        assert!(fallback_tasks(&category, "Reno, NV 89501", 0).is_empty());
    }
}
