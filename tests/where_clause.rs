use chrono::NaiveDate;
use macrotrack::MacrotrackError;
use macrotrack::clause::{Conjunction, DEFAULT_ITERATE_THRESHOLD, Where, WhereExpr};
use macrotrack::nutrition::{FOOD, Food, MEAL, Meal};
use rusqlite::types::Value;

fn text(s: &str) -> Value {
    Value::Text(String::from(s))
}

#[test]
fn in_list_at_the_threshold_stays_inline() {
    let filter: Where<Food> = Where::is_in(&FOOD.id, 1..=DEFAULT_ITERATE_THRESHOLD as i64);
    let expr = filter.build().expect("build");
    assert!(!expr.is_iterated());
    assert!(expr.sql().starts_with("WHERE id IN (?, ?, "));
    assert_eq!(expr.sql().matches('?').count(), 200);
    assert_eq!(expr.bind_arguments().len(), 200);
    assert_eq!(expr.bind_batches().len(), 1);
}

#[test]
fn in_list_past_the_threshold_is_iterated() {
    let expr = Where::is_in(&FOOD.id, 1..=201i64).build().expect("build");
    assert!(expr.is_iterated());
    assert_eq!(expr.sql(), "WHERE id = ?");
    assert_eq!(expr.bind_arguments().len(), 201);
    let batches = expr.bind_batches();
    assert_eq!(batches.len(), 201);
    assert_eq!(batches[0], vec![Value::Integer(1)]);
    assert_eq!(batches[200], vec![Value::Integer(201)]);
}

#[test]
fn iteration_can_be_forced_or_tuned() {
    let forced = Where::is_in(&FOOD.id, [4i64, 5]).iterate().build().expect("build");
    assert!(forced.is_iterated());
    assert_eq!(forced.bind_batches(), vec![vec![Value::Integer(4)], vec![Value::Integer(5)]]);

    let tuned = Where::is_in(&FOOD.id, [1i64, 2, 3]).iterate_threshold(2).build().expect("build");
    assert!(tuned.is_iterated());
    let relaxed = Where::is_in(&FOOD.id, [1i64, 2, 3]).iterate_threshold(3).build().expect("build");
    assert!(!relaxed.is_iterated());
}

#[test]
fn suffixes_are_chained_after_the_primary_predicate() {
    let expr = Where::eq(&FOOD.name, String::from("Oats"))
        .and(Where::is_null(&FOOD.brand))
        .build()
        .expect("build");
    assert_eq!(expr.sql(), "WHERE name = ? AND brand IS NULL");
    assert_eq!(expr.bind_arguments(), &[text("Oats")]);

    let expr = Where::eq(&FOOD.name, String::from("Oats"))
        .or(Where::eq(&FOOD.brand, String::from("Acme")).and(Where::is_not_null(&FOOD.notes)))
        .build()
        .expect("build");
    assert_eq!(expr.sql(), "WHERE name = ? OR (brand = ? AND notes IS NOT NULL)");
    assert_eq!(expr.bind_arguments(), &[text("Oats"), text("Acme")]);
}

#[test]
fn like_binds_the_pattern_once_per_column() {
    let columns = [FOOD.name.column_ref(), FOOD.brand.column_ref()];
    let expr = Where::like(&columns, Conjunction::Or, "%oat%").build().expect("build");
    assert_eq!(expr.sql(), "WHERE (name LIKE ?) OR (brand LIKE ?)");
    assert_eq!(expr.bind_arguments(), &[text("%oat%"), text("%oat%")]);

    let expr = Where::like(&columns, Conjunction::And, "%a%")
        .and(Where::is_null(&FOOD.notes))
        .build()
        .expect("build");
    assert_eq!(expr.sql(), "WHERE ((name LIKE ?) AND (brand LIKE ?)) AND notes IS NULL");
}

#[test]
fn iterated_clauses_reject_bound_suffixes() {
    let result = Where::is_in(&FOOD.id, 1..=300i64)
        .and(Where::eq(&FOOD.name, String::from("Oats")))
        .build();
    assert!(matches!(result, Err(MacrotrackError::Invariant(_))));

    let expr = Where::is_in(&FOOD.id, 1..=300i64)
        .and(Where::is_not_null(&FOOD.name))
        .build()
        .expect("suffix without binds");
    assert_eq!(expr.sql(), "WHERE id = ? AND name IS NOT NULL");
    assert_eq!(expr.bind_batches().len(), 300);
}

#[test]
fn suffix_in_lists_stay_inline() {
    let expr = Where::is_null(&FOOD.brand)
        .and(Where::is_in(&FOOD.id, 1..=300i64))
        .build()
        .expect("build");
    assert!(!expr.is_iterated());
    assert_eq!(expr.bind_arguments().len(), 300);
}

#[test]
fn raw_and_empty_clauses() {
    let expr = Where::<Food>::raw("energy > 100").build().expect("build");
    assert_eq!(expr.sql(), "WHERE energy > 100");
    assert!(expr.bind_arguments().is_empty());

    let expr = Where::is_in(&FOOD.id, Vec::<i64>::new()).build().expect("build");
    assert_eq!(expr.sql(), "WHERE id IN ()");
    assert!(!expr.is_iterated());

    let none = WhereExpr::none();
    assert!(none.is_empty());
    assert_eq!(none.bind_batches(), vec![Vec::<Value>::new()]);
}

#[test]
fn placeholders_follow_the_column_type() {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
    let filter: Where<Meal> = Where::eq(&MEAL.day, day);
    let expr = filter.build().expect("build");
    assert_eq!(expr.sql(), "WHERE day = DATE(?)");
    assert_eq!(expr.bind_arguments(), &[text("2024-03-01")]);
}
