use serde_json::json;

use super::*;

fn widget() -> Value {
    json!({
        "title": "Widget",
        "price": 9.99,
        "code": "W1",
        "category": "Tools",
        "image": "https://cdn.example.com/w1.jpg"
    })
}

/// Every statement in the script, whitespace-collapsed, without comments.
fn statements(script: &str) -> Vec<String> {
    script
        .lines()
        .filter(|l| !l.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join(" ")
        .split(';')
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect()
}

#[test]
fn quote_doubles_apostrophes() {
    assert_eq!(quote("O'Brien's"), "'O''Brien''s'");
    assert_eq!(quote(""), "''");
}

#[test]
fn script_starts_with_reset_and_ends_with_sweep() {
    let script = render_feed_script(&[widget()]);
    let stmts = statements(&script);
    assert_eq!(stmts.first().unwrap(), "UPDATE products SET available = FALSE");
    assert_eq!(
        stmts.last().unwrap(),
        "UPDATE products SET available = FALSE WHERE code NOT IN ('W1')"
    );
}

#[test]
fn empty_feed_still_emits_both_sweeps() {
    let script = render_feed_script(&[]);
    let stmts = statements(&script);
    assert_eq!(
        stmts,
        vec![
            "UPDATE products SET available = FALSE".to_string(),
            "UPDATE products SET available = FALSE".to_string(),
        ]
    );
}

#[test]
fn category_insert_is_guarded() {
    let script = render_feed_script(&[widget()]);
    assert!(statements(&script).contains(
        &"INSERT INTO categories (name) SELECT 'Tools' WHERE NOT EXISTS (SELECT 1 FROM categories WHERE name = 'Tools')"
            .to_string()
    ));
}

#[test]
fn product_has_guarded_insert_and_keyed_update() {
    let script = render_feed_script(&[widget()]);
    let stmts = statements(&script);
    assert!(stmts.contains(
        &"INSERT INTO products (title, price, code, asin, category_id, available, enabled) \
          SELECT 'Widget', 9.99, 'W1', '', c.id, TRUE, TRUE FROM categories c \
          WHERE c.name = 'Tools' AND NOT EXISTS (SELECT 1 FROM products WHERE code = 'W1')"
            .to_string()
    ));
    assert!(stmts.contains(
        &"UPDATE products SET title = 'Widget', price = 9.99, asin = '', \
          category_id = (SELECT id FROM categories WHERE name = 'Tools'), \
          available = TRUE, enabled = TRUE WHERE code = 'W1'"
            .to_string()
    ));
}

#[test]
fn main_image_has_guarded_insert_and_keyed_update() {
    let script = render_feed_script(&[widget()]);
    let stmts = statements(&script);
    assert!(stmts.iter().any(|s| s.starts_with("INSERT INTO product_details")
        && s.contains("'https://cdn.example.com/w1.jpg'")
        && s.contains("NOT EXISTS (SELECT 1 FROM product_details d WHERE d.product_id = p.id)")));
    assert!(stmts.contains(
        &"UPDATE product_details SET main_image = 'https://cdn.example.com/w1.jpg' \
          WHERE product_id = (SELECT id FROM products WHERE code = 'W1')"
            .to_string()
    ));
}

#[test]
fn tags_and_links_are_guarded_and_deduplicated() {
    let mut first = widget();
    first["tags"] = json!("a, B , a");
    let mut second = widget();
    second["code"] = json!("W2");
    second["tags"] = json!(["b"]);
    let script = render_feed_script(&[first, second]);
    let stmts = statements(&script);

    let tag_inserts: Vec<_> = stmts
        .iter()
        .filter(|s| s.starts_with("INSERT INTO tags"))
        .collect();
    assert_eq!(tag_inserts.len(), 2, "each distinct tag is created once");
    assert!(tag_inserts
        .iter()
        .all(|s| s.contains("WHERE NOT EXISTS (SELECT 1 FROM tags WHERE name =")));

    let links = stmts
        .iter()
        .filter(|s| s.starts_with("INSERT INTO product_tags"))
        .count();
    assert_eq!(links, 3, "W1→a, W1→b, W2→b");
}

#[test]
fn category_is_created_once_for_many_products() {
    let mut second = widget();
    second["code"] = json!("W2");
    let script = render_feed_script(&[widget(), second]);
    let count = statements(&script)
        .iter()
        .filter(|s| s.starts_with("INSERT INTO categories"))
        .count();
    assert_eq!(count, 1);
}

#[test]
fn apostrophes_cannot_terminate_literals() {
    let mut raw = widget();
    raw["title"] = json!("Bob's \"best\" widget");
    raw["category"] = json!("Kids' Toys");
    raw["code"] = json!("X'); DROP TABLE products; --");
    raw["tags"] = json!("o'clock");
    let script = render_feed_script(&[raw]);

    assert!(script.contains("'Bob''s \"best\" widget'"));
    assert!(script.contains("'Kids'' Toys'"));
    assert!(script.contains("'X''); DROP TABLE products; --'"));
    assert!(script.contains("'o''clock'"));
    assert!(!script.contains("'X');"));

    // Outside comments, every quote is paired.
    let quotes = script
        .lines()
        .filter(|l| !l.trim_start().starts_with("--"))
        .flat_map(str::chars)
        .filter(|c| *c == '\'')
        .count();
    assert_eq!(quotes % 2, 0);
}

#[test]
fn omitted_records_only_leave_a_positional_comment() {
    let script = render_feed_script(&[json!({"title": "No price", "code": "NP'1", "category": "X"})]);
    assert!(script.contains("-- record 0 skipped"));
    assert!(!script.contains("No price"));
    // The code still counts as present for the closing sweep.
    assert!(script.contains("NOT IN ('NP''1')"));
}

#[test]
fn newlines_in_values_stay_inside_literals() {
    let mut raw = widget();
    raw["title"] = json!("line one\n-- line two");
    let script = render_feed_script(&[raw]);
    assert!(script.contains("'line one\n-- line two'"));
    assert!(!script.lines().any(|l| l.starts_with("-- record") && l.contains("line")));
}

#[test]
fn rendering_is_deterministic() {
    let mut raw = widget();
    raw["tags"] = json!(["z", "y", "x"]);
    let feed = vec![raw, json!({"code": "B"})];
    assert_eq!(render_feed_script(&feed), render_feed_script(&feed));
}
