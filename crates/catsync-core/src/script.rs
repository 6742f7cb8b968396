//! Offline renderer: turns a [`ReconcilePlan`] into a self-contained SQL script.
//!
//! Every row is written with a guarded insert ("only if no row matches the
//! identity predicate") followed, where the row has feed-controlled columns,
//! by an unconditional update keyed by the same predicate. Running the script
//! any number of times leaves the same rows behind.
//!
//! The script is bracketed by two availability sweeps: a reset of every
//! product to unavailable at the top, and a demotion of every code missing
//! from the feed at the bottom.

use std::collections::HashSet;

use serde_json::Value;

use crate::index::CatalogSnapshot;
use crate::plan::{plan_reconciliation, ProductDecision, ReconcilePlan, RecordDecision, SyncMode};

/// Plans `feed` against an empty catalog and renders the result.
#[must_use]
pub fn render_feed_script(feed: &[Value]) -> String {
    let plan = plan_reconciliation(feed, &CatalogSnapshot::default(), SyncMode::Full);
    render_script(&plan)
}

/// Renders a plan as guarded SQL statements.
///
/// Unchanged decisions are rendered too: the leading reset demotes every
/// product, so each code in the feed has to be re-affirmed.
///
/// Categories are referenced by name and products by code, so the script is
/// valid against any store, including one that diverged from the snapshot the
/// plan was built from.
#[must_use]
pub fn render_script(plan: &ReconcilePlan) -> String {
    let mut renderer = ScriptRenderer::default();
    renderer.line("-- catalog reconciliation script");
    renderer.line(&format!(
        "-- records: {}, codes: {}",
        plan.total,
        plan.feed_codes.len()
    ));
    renderer.blank();
    renderer.line("UPDATE products SET available = FALSE;");

    for decision in &plan.records {
        match decision {
            RecordDecision::Apply(d) => renderer.product(d),
            RecordDecision::Omit(o) => {
                renderer.blank();
                // Free text never goes into comments.
                renderer.line(&format!("-- record {} skipped", o.position));
            }
        }
    }

    renderer.blank();
    if plan.feed_codes.is_empty() {
        renderer.line("UPDATE products SET available = FALSE;");
    } else {
        let codes = plan
            .feed_codes
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        renderer.line(&format!(
            "UPDATE products SET available = FALSE WHERE code NOT IN ({codes});"
        ));
    }

    renderer.out
}

/// Wraps `value` in single quotes, doubling any embedded apostrophe.
#[must_use]
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[derive(Default)]
struct ScriptRenderer {
    out: String,
    categories: HashSet<String>,
    tags: HashSet<String>,
}

impl ScriptRenderer {
    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn product(&mut self, d: &ProductDecision) {
        let r = &d.record;
        let code = quote(&r.code);
        let category = quote(&r.category);
        let title = quote(&r.title);
        let asin = quote(&r.asin);
        let image = quote(&r.image);
        let price = r.price;

        self.blank();
        self.line(&format!("-- record {}", d.position));

        if self.categories.insert(r.category.clone()) {
            self.line(&format!(
                "INSERT INTO categories (name)\n\
                 SELECT {category}\n\
                 WHERE NOT EXISTS (SELECT 1 FROM categories WHERE name = {category});"
            ));
        }

        self.line(&format!(
            "INSERT INTO products (title, price, code, asin, category_id, available, enabled)\n\
             SELECT {title}, {price}, {code}, {asin}, c.id, TRUE, TRUE\n\
             FROM categories c\n\
             WHERE c.name = {category}\n  \
               AND NOT EXISTS (SELECT 1 FROM products WHERE code = {code});\n\
             UPDATE products\n\
             SET title = {title},\n    \
                 price = {price},\n    \
                 asin = {asin},\n    \
                 category_id = (SELECT id FROM categories WHERE name = {category}),\n    \
                 available = TRUE,\n    \
                 enabled = TRUE\n\
             WHERE code = {code};"
        ));

        self.line(&format!(
            "INSERT INTO product_details (product_id, main_image)\n\
             SELECT p.id, {image}\n\
             FROM products p\n\
             WHERE p.code = {code}\n  \
               AND NOT EXISTS (SELECT 1 FROM product_details d WHERE d.product_id = p.id);\n\
             UPDATE product_details\n\
             SET main_image = {image}\n\
             WHERE product_id = (SELECT id FROM products WHERE code = {code});"
        ));

        for tag in &r.tags {
            let name = quote(tag);
            if self.tags.insert(tag.clone()) {
                self.line(&format!(
                    "INSERT INTO tags (name, enabled)\n\
                     SELECT {name}, TRUE\n\
                     WHERE NOT EXISTS (SELECT 1 FROM tags WHERE name = {name});"
                ));
            }
            self.line(&format!(
                "INSERT INTO product_tags (product_id, tag_id)\n\
                 SELECT p.id, t.id\n\
                 FROM products p, tags t\n\
                 WHERE p.code = {code}\n  \
                   AND t.name = {name}\n  \
                   AND NOT EXISTS (\n    \
                     SELECT 1 FROM product_tags pt WHERE pt.product_id = p.id AND pt.tag_id = t.id\n  \
                   );"
            ));
        }
    }
}

#[cfg(test)]
#[path = "script_test.rs"]
mod tests;
