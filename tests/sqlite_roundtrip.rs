use chrono::NaiveDate;
use macrotrack::MacrotrackError;
use macrotrack::clause::Where;
use macrotrack::datatype::Timestamp;
use macrotrack::entity::{Entity, ObjectSource};
use macrotrack::nutrition::{create_tables, FOOD, Food, FoodType, MEAL, Meal, SERVING, Serving};
use macrotrack::persist::{open, Executor, PersistenceMode, Persistor};
use macrotrack::query::{AllColumns, Delete, Insert, Order, Select, Update};
use macrotrack::rowdata::RowData;
use macrotrack::schema::Schema;
use rusqlite::Connection;

fn food(index_name: &str) -> RowData<Food> {
    let mut row = RowData::with_defaults(Food::table());
    row.put(&FOOD.index_name, Some(index_name.to_owned()));
    row.put(&FOOD.name, Some(index_name.to_uppercase()));
    row
}

fn food_db() -> Connection {
    let connection = open(&PersistenceMode::InMemory).expect("db");
    Persistor::new(&connection).create_table::<Food>().expect("food table");
    connection
}

fn count_foods(persistor: &Persistor) -> usize {
    let select = Select::single(&FOOD.id).build().expect("select");
    persistor.select(&select).expect("count").len()
}

#[test]
fn insert_returns_generated_ids_in_order() {
    let connection = food_db();
    let persistor = Persistor::new(&connection);
    let insert = Insert::<Food>::without_id().build().expect("insert");
    let ids = persistor
        .insert(&insert, &[food("oats"), food("rice"), food("corn")])
        .expect("insert");
    assert_eq!(ids.len(), 3);
    assert!(ids[0] < ids[1] && ids[1] < ids[2]);

    let select = Select::non_null(&FOOD.index_name)
        .order_by(&FOOD.id, Order::Asc)
        .build()
        .expect("select");
    let names = persistor.select(&select).expect("select");
    assert_eq!(names, vec!["oats", "rice", "corn"]);
}

#[test]
fn insert_with_ids_keeps_them() {
    let connection = food_db();
    let persistor = Persistor::new(&connection);
    let mut row = food("oats");
    row.put(&FOOD.id, Some(42));
    let insert = Insert::<Food>::with_id().build().expect("insert");
    assert_eq!(persistor.insert(&insert, &[row]).expect("insert"), vec![42]);
}

#[test]
fn selected_rows_become_database_entities() {
    let connection = food_db();
    let persistor = Persistor::new(&connection);
    let mut oats = food("oats");
    oats.put(&FOOD.energy, Some(379.0));
    oats.put(&FOOD.food_type, Some(FoodType::Composite));
    let insert = Insert::<Food>::without_id().build().expect("insert");
    let ids = persistor.insert(&insert, &[oats]).expect("insert");

    let select = Select::<Food, AllColumns>::all()
        .filter(Where::eq(&FOOD.id, ids[0]))
        .build()
        .expect("select");
    let rows = persistor.select(&select).expect("select");
    assert_eq!(rows.len(), 1);
    let entity = Entity::new(rows[0].clone(), ObjectSource::Database).expect("entity");
    assert_eq!(entity.id(), Some(ids[0]));
    assert_eq!(entity.get(&FOOD.energy), Some(379.0));
    assert_eq!(entity.get(&FOOD.food_type), Some(FoodType::Composite));
    assert_eq!(entity.get(&FOOD.brand), None);
    assert!(entity.create_time().is_some());
}

#[test]
fn update_changes_rows_and_stamps_modify_time() {
    let connection = food_db();
    let persistor = Persistor::new(&connection);
    let epoch = Timestamp::from_millis(1_000).expect("time");
    let mut row = food("oats");
    row.put(&FOOD.create_time, Some(epoch));
    row.put(&FOOD.modify_time, Some(epoch));
    let insert = Insert::<Food>::without_id().build().expect("insert");
    let ids = persistor.insert(&insert, &[row]).expect("insert");

    let select = Select::<Food, AllColumns>::all().build().expect("select");
    let stored = persistor.select(&select).expect("select").remove(0);
    let mut edited = stored.copy();
    edited.put(&FOOD.name, Some(String::from("Porridge oats")));
    let update = Update::<Food>::builder().build().expect("update");
    assert_eq!(persistor.update(&update, &[edited]).expect("update"), 1);

    let reread = persistor.select(&select).expect("select").remove(0);
    assert_eq!(reread.get(&FOOD.id), Some(ids[0]));
    assert_eq!(reread.get(&FOOD.name).as_deref(), Some("Porridge oats"));
    assert_eq!(reread.get(&FOOD.create_time), Some(epoch));
    assert!(reread.get(&FOOD.modify_time).expect("modify time") > epoch);
}

#[test]
fn iterated_delete_removes_every_listed_row() {
    let connection = food_db();
    let persistor = Persistor::new(&connection);
    let rows: Vec<RowData<Food>> = (0..250).map(|i| food(&format!("food{}", i))).collect();
    let insert = Insert::<Food>::without_id().build().expect("insert");
    let ids = persistor
        .transaction(|p| p.insert(&insert, &rows))
        .expect("insert");
    assert_eq!(count_foods(&persistor), 250);

    let select = Select::single(&FOOD.name)
        .filter(Where::is_in(&FOOD.id, ids.clone()))
        .build()
        .expect("select");
    assert_eq!(persistor.select(&select).expect("select").len(), 250);

    let delete = Delete::builder().filter(Where::is_in(&FOOD.id, ids)).build().expect("delete");
    assert_eq!(persistor.delete(&delete).expect("delete"), 250);
    assert_eq!(count_foods(&persistor), 0);
}

#[test]
fn failed_rows_are_reported_with_their_index() {
    let connection = food_db();
    let persistor = Persistor::new(&connection);
    let insert = Insert::<Food>::without_id().build().expect("insert");
    let result = persistor.insert(&insert, &[food("oats"), food("oats")]);
    match result {
        Err(MacrotrackError::Batch { table, row, data, .. }) => {
            assert_eq!(table, "Food");
            assert_eq!(row, 1);
            assert!(data.contains("index_name=\"oats\""), "{}", data);
        }
        other => panic!("expected a batch error, got {:?}", other),
    }
}

#[test]
fn rows_lacking_template_columns_are_reported_with_their_index() {
    let connection = food_db();
    let persistor = Persistor::new(&connection);
    let mut narrow = RowData::with_columns(Food::table(), &[FOOD.index_name.column_ref()]);
    narrow.put(&FOOD.index_name, Some(String::from("narrow")));
    let insert = Insert::<Food>::without_id().build().expect("insert");
    match persistor.insert(&insert, &[food("a"), food("b"), narrow]) {
        Err(MacrotrackError::Batch { table, row, data, message }) => {
            assert_eq!(table, "Food");
            assert_eq!(row, 2);
            assert!(data.contains("index_name=\"narrow\""), "{}", data);
            assert!(message.contains("lacks statement columns"), "{}", message);
        }
        other => panic!("expected a batch error, got {:?}", other),
    }
    assert_eq!(count_foods(&persistor), 2);

    let select = Select::<Food, AllColumns>::all().order_by(&FOOD.id, Order::Asc).build().expect("select");
    let mut edited = persistor.select(&select).expect("select").remove(0).copy();
    edited.put(&FOOD.name, Some(String::from("Apple")));
    let update = Update::<Food>::builder().build().expect("update");
    match persistor.update(&update, &[edited, food("c")]) {
        Err(MacrotrackError::Batch { row, data, message, .. }) => {
            assert_eq!(row, 1);
            assert!(data.contains("index_name=\"c\""), "{}", data);
            assert!(message.contains("without a value for id"), "{}", message);
        }
        other => panic!("expected a batch error, got {:?}", other),
    }
    let names = persistor.select(&Select::non_null(&FOOD.name).order_by(&FOOD.id, Order::Asc).build().expect("select"));
    assert_eq!(names.expect("names"), vec!["Apple", "B"]);
}

#[test]
fn failed_transactions_roll_back() {
    let connection = food_db();
    let persistor = Persistor::new(&connection);
    let insert = Insert::<Food>::without_id().build().expect("insert");
    let result: macrotrack::Result<()> = persistor.transaction(|p| {
        p.insert(&insert, &[food("oats")])?;
        Err(MacrotrackError::Invariant(String::from("abandon")))
    });
    assert!(result.is_err());
    assert_eq!(count_foods(&persistor), 0);

    persistor.begin().expect("begin");
    persistor.insert(&insert, &[food("rice")]).expect("insert");
    persistor.commit().expect("commit");
    assert_eq!(count_foods(&persistor), 1);
}

#[test]
fn dates_and_booleans_survive_storage() {
    let connection = open(&PersistenceMode::InMemory).expect("db");
    let persistor = Persistor::new(&connection);
    persistor.create_table::<Meal>().expect("meal table");
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
    let mut row = RowData::with_defaults(Meal::table());
    row.put(&MEAL.name, Some(String::from("Breakfast")));
    row.put(&MEAL.day, Some(day));
    row.put(&MEAL.template, Some(true));
    let insert = Insert::<Meal>::without_id().build().expect("insert");
    persistor.insert(&insert, &[row]).expect("insert");

    let select = Select::two(&MEAL.day, &MEAL.template)
        .filter(Where::eq(&MEAL.day, day))
        .build()
        .expect("select");
    assert_eq!(persistor.select(&select).expect("select"), vec![(Some(day), Some(true))]);
}

#[test]
fn limit_and_offset_page_through_results() {
    let connection = food_db();
    let persistor = Persistor::new(&connection);
    let insert = Insert::<Food>::without_id().build().expect("insert");
    persistor
        .insert(&insert, &[food("a"), food("b"), food("c"), food("d")])
        .expect("insert");
    let page = Select::non_null(&FOOD.index_name)
        .order_by(&FOOD.index_name, Order::Asc)
        .offset(1)
        .build()
        .expect("select");
    assert_eq!(persistor.select(&page).expect("select"), vec!["b", "c", "d"]);
    let page = Select::non_null(&FOOD.index_name)
        .order_by(&FOOD.index_name, Order::Desc)
        .limit(2)
        .offset(1)
        .build()
        .expect("select");
    assert_eq!(persistor.select(&page).expect("select"), vec!["c", "b"]);
}

#[test]
fn file_mode_persists_between_connections() {
    let path = std::env::temp_dir().join("macrotrack_roundtrip_test.db");
    let _ = std::fs::remove_file(&path);
    let mode = PersistenceMode::File(path.to_string_lossy().into_owned());
    {
        let connection = open(&mode).expect("db");
        let persistor = Persistor::new(&connection);
        persistor.create_table::<Food>().expect("food table");
        let insert = Insert::<Food>::without_id().build().expect("insert");
        persistor.insert(&insert, &[food("oats")]).expect("insert");
    }
    let connection = open(&mode).expect("db");
    let persistor = Persistor::new(&connection);
    assert_eq!(count_foods(&persistor), 1);
    drop(persistor);
    drop(connection);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn nutrition_tables_are_created_with_enforced_foreign_keys() {
    let connection = open(&PersistenceMode::InMemory).expect("db");
    let persistor = Persistor::new(&connection);
    create_tables(&persistor).expect("tables");
    create_tables(&persistor).expect("tables again");

    let insert = Insert::<Food>::without_id().build().expect("insert");
    let ids = persistor.insert(&insert, &[food("oats")]).expect("food");
    let serving = |food_id: i64| {
        let mut row = RowData::with_defaults(Serving::table());
        row.put(&SERVING.food_id, Some(food_id));
        row.put(&SERVING.name, Some(String::from("cup")));
        row.put(&SERVING.quantity, Some(80.0));
        row
    };
    let insert = Insert::<Serving>::without_id().build().expect("insert");
    assert_eq!(persistor.insert(&insert, &[serving(ids[0])]).expect("serving").len(), 1);
    assert!(matches!(
        persistor.insert(&insert, &[serving(ids[0] + 100)]),
        Err(MacrotrackError::Batch { row: 0, .. })
    ));
}
