use std::collections::HashMap;

use macrotrack::MacrotrackError;
use macrotrack::entity::{Entity, ObjectSource, OtherHasher};
use macrotrack::foreign::{complete_fk_ids, complete_fk_ids_from};
use macrotrack::nutrition::{FOOD, Food, SERVING, Serving};
use macrotrack::persist::{open, Executor, PersistenceMode, Persistor};
use macrotrack::query::Insert;
use macrotrack::rowdata::RowData;
use macrotrack::schema::Schema;

fn serving(food: &str, name: &str) -> Entity<Serving> {
    let mut row = RowData::with_defaults(Serving::table());
    row.put(&SERVING.name, Some(name.to_owned()));
    row.put(&SERVING.quantity, Some(100.0));
    row.make_immutable();
    let mut entity = Entity::new(row, ObjectSource::Import).expect("serving");
    entity.set_fk_parent_key(&SERVING.food_id, &FOOD.index_name, food.to_owned());
    entity
}

fn food(index_name: &str) -> RowData<Food> {
    let mut row = RowData::with_defaults(Food::table());
    row.put(&FOOD.index_name, Some(index_name.to_owned()));
    row.put(&FOOD.name, Some(index_name.to_uppercase()));
    row.make_immutable();
    row
}

#[test]
fn pending_parent_keys_are_recorded_per_column() {
    let entity = serving("oats", "cup");
    assert_eq!(entity.pending_fk_count(), 1);
    assert!(entity.has_fk_parent_key(&SERVING.food_id));
    let key = entity.get_fk_parent_key(&SERVING.food_id).expect("key");
    assert!(key.is_immutable());
    assert_eq!(key.columns().len(), 1);
    assert_eq!(key.get(&FOOD.index_name).as_deref(), Some("oats"));
}

#[test]
fn missing_parent_key_is_an_error() {
    let mut row = RowData::with_defaults(Serving::table());
    row.put(&SERVING.name, Some(String::from("cup")));
    row.put(&SERVING.quantity, Some(80.0));
    row.make_immutable();
    let entity = Entity::new(row, ObjectSource::UserNew).expect("serving");
    assert!(matches!(
        entity.get_fk_parent_key(&SERVING.food_id),
        Err(MacrotrackError::Invariant(_))
    ));
}

#[test]
fn parent_key_can_come_from_the_parent_entity() {
    let oats = Entity::new(food("oats"), ObjectSource::UserNew).expect("food");
    let mut child = serving("rice", "cup");
    child
        .set_fk_parent_key_from(&SERVING.food_id, &FOOD.index_name, &oats)
        .expect("parent has a key");
    let key = child.get_fk_parent_key(&SERVING.food_id).expect("key");
    assert_eq!(key.get(&FOOD.index_name).as_deref(), Some("oats"));
    assert!(child.set_fk_parent_key_from(&SERVING.food_id, &FOOD.brand, &oats).is_err());
}

#[test]
fn completion_fills_matches_and_reports_the_rest() {
    let entities = vec![serving("oats", "cup"), serving("oats", "bowl"), serving("rice", "cup")];
    let mut lookup: HashMap<String, i64, OtherHasher> = HashMap::default();
    lookup.insert(String::from("oats"), 7);
    let completion = complete_fk_ids(entities, &SERVING.food_id, &FOOD.index_name, &lookup).expect("complete");
    assert!(!completion.is_complete());
    assert_eq!(completion.completed.len(), 2);
    for entity in &completion.completed {
        assert_eq!(entity.get(&SERVING.food_id), Some(7));
        assert_eq!(entity.pending_fk_count(), 0);
        assert_eq!(entity.source(), ObjectSource::Import);
        assert!(entity.data().is_immutable());
    }
    assert_eq!(completion.unmatched.len(), 1);
    let unmatched = &completion.unmatched[0];
    assert_eq!(unmatched.get(&SERVING.food_id), None);
    assert_eq!(unmatched.pending_fk_count(), 1);
    assert_eq!(unmatched.get(&SERVING.name).as_deref(), Some("cup"));
}

#[test]
fn entities_without_pending_keys_pass_through() {
    let mut row = RowData::with_defaults(Serving::table());
    row.put(&SERVING.food_id, Some(3));
    row.put(&SERVING.name, Some(String::from("slice")));
    row.put(&SERVING.quantity, Some(30.0));
    row.make_immutable();
    let settled = Entity::new(row, ObjectSource::UserNew).expect("serving");
    let lookup: HashMap<String, i64, OtherHasher> = HashMap::default();
    let completion = complete_fk_ids(vec![settled], &SERVING.food_id, &FOOD.index_name, &lookup).expect("complete");
    assert!(completion.is_complete());
    assert_eq!(completion.completed[0].get(&SERVING.food_id), Some(3));
}

#[test]
fn completion_refuses_a_different_key_column() {
    let lookup: HashMap<String, i64, OtherHasher> = HashMap::default();
    let result = complete_fk_ids(vec![serving("oats", "cup")], &SERVING.food_id, &FOOD.name, &lookup);
    assert!(matches!(result, Err(MacrotrackError::Invariant(_))));
}

#[test]
fn completion_against_stored_parents() {
    let connection = open(&PersistenceMode::InMemory).expect("db");
    let persistor = Persistor::new(&connection);
    persistor.create_table::<Food>().expect("food table");
    persistor.create_table::<Serving>().expect("serving table");
    let insert = Insert::<Food>::without_id().build().expect("insert");
    let ids = persistor.insert(&insert, &[food("oats"), food("rice")]).expect("foods");

    let entities = vec![serving("oats", "cup"), serving("rice", "cup"), serving("barley", "cup")];
    let completion = complete_fk_ids_from(&persistor, entities, &SERVING.food_id, &FOOD.index_name).expect("complete");
    assert_eq!(completion.completed.len(), 2);
    assert_eq!(completion.completed[0].get(&SERVING.food_id), Some(ids[0]));
    assert_eq!(completion.completed[1].get(&SERVING.food_id), Some(ids[1]));
    assert_eq!(completion.unmatched.len(), 1);

    // completed servings satisfy the foreign key constraint
    let rows: Vec<RowData<Serving>> = completion.completed.iter().map(|e| e.data().clone()).collect();
    let insert = Insert::<Serving>::without_id().build().expect("insert");
    assert_eq!(persistor.insert(&insert, &rows).expect("servings").len(), 2);
}

#[test]
fn completion_lookup_iterates_past_the_threshold() {
    let connection = open(&PersistenceMode::InMemory).expect("db");
    let persistor = Persistor::new(&connection).with_iterate_threshold(1);
    persistor.create_table::<Food>().expect("food table");
    let insert = Insert::<Food>::without_id().build().expect("insert");
    persistor.insert(&insert, &[food("oats"), food("rice"), food("corn")]).expect("foods");

    let entities = vec![serving("corn", "cob"), serving("oats", "cup"), serving("rice", "cup")];
    let completion = complete_fk_ids_from(&persistor, entities, &SERVING.food_id, &FOOD.index_name).expect("complete");
    assert!(completion.is_complete());
    assert_eq!(completion.completed.len(), 3);
}

#[test]
fn natural_key_shared_by_several_parents_stays_unmatched() {
    let connection = open(&PersistenceMode::InMemory).expect("db");
    let persistor = Persistor::new(&connection);
    persistor.create_table::<Food>().expect("food table");
    let branded = |index_name: &str, brand: &str| {
        let mut row = food(index_name).copy();
        row.put(&FOOD.brand, Some(brand.to_owned()));
        row
    };
    let insert = Insert::<Food>::without_id().build().expect("insert");
    let ids = persistor
        .insert(&insert, &[branded("oats", "acme"), branded("rice", "acme"), branded("corn", "zest")])
        .expect("foods");

    let by_brand = |brand: &str| {
        let mut entity = serving("unused", "cup");
        entity.set_fk_parent_key(&SERVING.food_id, &FOOD.brand, brand.to_owned());
        entity
    };
    let completion =
        complete_fk_ids_from(&persistor, vec![by_brand("acme"), by_brand("zest")], &SERVING.food_id, &FOOD.brand)
            .expect("complete");
    assert_eq!(completion.completed.len(), 1);
    assert_eq!(completion.completed[0].get(&SERVING.food_id), Some(ids[2]));
    assert_eq!(completion.unmatched.len(), 1);
    let unmatched = &completion.unmatched[0];
    assert_eq!(unmatched.pending_fk_count(), 1);
    let key = unmatched.get_fk_parent_key(&SERVING.food_id).expect("key");
    assert_eq!(key.get(&FOOD.brand).as_deref(), Some("acme"));
}
