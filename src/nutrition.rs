//! The nutrition schema.
//!
//! Foods are identified by their `index_name`, a unique natural key that
//! import files use to refer to them before they have ids. Servings hang off
//! foods, and food portions tie a food to a meal.

use std::fmt;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use rusqlite::types::Value;
use tracing::info;

use crate::datatype::{now_millis, DataType, Timestamp};
use crate::persist::Persistor;
use crate::schema::{column, Column, ColumnList, FkColumn, Schema, Table, CREATE_TIME, ID, MODIFY_TIME};

/// Whether a food is an ingredient or made up of other foods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FoodType {
    Primary,
    Composite,
}

impl FoodType {
    pub fn name(&self) -> &'static str {
        match self {
            FoodType::Primary => "primary",
            FoodType::Composite => "composite",
        }
    }
}

impl fmt::Display for FoodType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl DataType for FoodType {
    const UID: u8 = 7;
    const DATA_TYPE: &'static str = "FoodType";
    const SQL_TYPE: &'static str = "TEXT";
    fn to_raw(&self) -> Value {
        Value::Text(self.name().to_owned())
    }
    fn from_raw(value: &Value) -> Result<FoodType, String> {
        match value {
            Value::Text(s) => FoodType::from_raw_string(s),
            other => Err(format!("expected food type text, found {:?}", other.data_type())),
        }
    }
    fn to_raw_string(&self) -> String {
        self.name().to_owned()
    }
    fn from_raw_string(s: &str) -> Result<FoodType, String> {
        match s.trim() {
            "primary" => Ok(FoodType::Primary),
            "composite" => Ok(FoodType::Composite),
            other => Err(format!("'{}' is not a food type", other)),
        }
    }
}

type Metadata<M> = (Column<M, i64>, Column<M, Timestamp>, Column<M, Timestamp>);

// id, create_time and modify_time, in that order
fn metadata_columns<M>(columns: &mut ColumnList<M>) -> Metadata<M> {
    let id = column::<i64>(ID).not_null().unique().not_editable().build_for(columns);
    let create_time = column::<Timestamp>(CREATE_TIME)
        .not_null()
        .not_editable()
        .default(now_millis)
        .build_for(columns);
    let modify_time = column::<Timestamp>(MODIFY_TIME)
        .not_null()
        .not_editable()
        .default(now_millis)
        .build_for(columns);
    (id, create_time, modify_time)
}

pub struct Food;
pub struct Serving;
pub struct Meal;
pub struct FoodPortion;

pub struct FoodColumns {
    pub table: Table<Food>,
    pub id: Column<Food, i64>,
    pub create_time: Column<Food, Timestamp>,
    pub modify_time: Column<Food, Timestamp>,
    pub index_name: Column<Food, String>,
    pub name: Column<Food, String>,
    pub variety: Column<Food, String>,
    pub brand: Column<Food, String>,
    pub food_type: Column<Food, FoodType>,
    pub notes: Column<Food, String>,
    /// Per 100 g, or per 100 ml for liquids.
    pub energy: Column<Food, f64>,
    pub protein: Column<Food, f64>,
    pub fat: Column<Food, f64>,
    pub carbohydrate: Column<Food, f64>,
    pub density: Column<Food, f64>,
}

pub struct ServingColumns {
    pub table: Table<Serving>,
    pub id: Column<Serving, i64>,
    pub create_time: Column<Serving, Timestamp>,
    pub modify_time: Column<Serving, Timestamp>,
    pub food_id: FkColumn<Serving, i64, Food>,
    pub name: Column<Serving, String>,
    pub quantity: Column<Serving, f64>,
    pub unit: Column<Serving, String>,
    pub notes: Column<Serving, String>,
}

pub struct MealColumns {
    pub table: Table<Meal>,
    pub id: Column<Meal, i64>,
    pub create_time: Column<Meal, Timestamp>,
    pub modify_time: Column<Meal, Timestamp>,
    pub name: Column<Meal, String>,
    pub day: Column<Meal, NaiveDate>,
    pub description: Column<Meal, String>,
    pub template: Column<Meal, bool>,
}

pub struct FoodPortionColumns {
    pub table: Table<FoodPortion>,
    pub id: Column<FoodPortion, i64>,
    pub create_time: Column<FoodPortion, Timestamp>,
    pub modify_time: Column<FoodPortion, Timestamp>,
    pub food_id: FkColumn<FoodPortion, i64, Food>,
    pub meal_id: FkColumn<FoodPortion, i64, Meal>,
    pub serving_id: FkColumn<FoodPortion, i64, Serving>,
    pub quantity: Column<FoodPortion, f64>,
    pub notes: Column<FoodPortion, String>,
}

lazy_static! {
    pub static ref FOOD: FoodColumns = {
        let mut columns = ColumnList::<Food>::new("Food");
        let (id, create_time, modify_time) = metadata_columns(&mut columns);
        let index_name = column::<String>("index_name").not_null().unique().build_for(&mut columns);
        let name = column::<String>("name").not_null().build_for(&mut columns);
        let variety = column::<String>("variety").build_for(&mut columns);
        let brand = column::<String>("brand").build_for(&mut columns);
        let food_type = column::<FoodType>("food_type")
            .not_null()
            .default(|| FoodType::Primary)
            .build_for(&mut columns);
        let notes = column::<String>("notes").build_for(&mut columns);
        let energy = column::<f64>("energy").build_for(&mut columns);
        let protein = column::<f64>("protein").build_for(&mut columns);
        let fat = column::<f64>("fat").build_for(&mut columns);
        let carbohydrate = column::<f64>("carbohydrate").build_for(&mut columns);
        let density = column::<f64>("density").build_for(&mut columns);
        FoodColumns {
            table: Table::new(columns),
            id,
            create_time,
            modify_time,
            index_name,
            name,
            variety,
            brand,
            food_type,
            notes,
            energy,
            protein,
            fat,
            carbohydrate,
            density,
        }
    };
    pub static ref SERVING: ServingColumns = {
        let mut columns = ColumnList::<Serving>::new("Serving");
        let (id, create_time, modify_time) = metadata_columns(&mut columns);
        let food_id = column::<i64>("food_id").not_null().build_fk_for(&FOOD.id, &mut columns);
        let name = column::<String>("name").not_null().build_for(&mut columns);
        let quantity = column::<f64>("quantity").not_null().build_for(&mut columns);
        let unit = column::<String>("unit").not_null().default(|| String::from("g")).build_for(&mut columns);
        let notes = column::<String>("notes").build_for(&mut columns);
        ServingColumns {
            table: Table::new(columns),
            id,
            create_time,
            modify_time,
            food_id,
            name,
            quantity,
            unit,
            notes,
        }
    };
    pub static ref MEAL: MealColumns = {
        let mut columns = ColumnList::<Meal>::new("Meal");
        let (id, create_time, modify_time) = metadata_columns(&mut columns);
        let name = column::<String>("name").not_null().build_for(&mut columns);
        let day = column::<NaiveDate>("day").not_null().build_for(&mut columns);
        let description = column::<String>("description").build_for(&mut columns);
        let template = column::<bool>("template").not_null().default(|| false).build_for(&mut columns);
        MealColumns {
            table: Table::new(columns),
            id,
            create_time,
            modify_time,
            name,
            day,
            description,
            template,
        }
    };
    pub static ref FOOD_PORTION: FoodPortionColumns = {
        let mut columns = ColumnList::<FoodPortion>::new("FoodPortion");
        let (id, create_time, modify_time) = metadata_columns(&mut columns);
        let food_id = column::<i64>("food_id").not_null().build_fk_for(&FOOD.id, &mut columns);
        let meal_id = column::<i64>("meal_id").not_null().build_fk_for(&MEAL.id, &mut columns);
        let serving_id = column::<i64>("serving_id").build_fk_for(&SERVING.id, &mut columns);
        let quantity = column::<f64>("quantity").not_null().build_for(&mut columns);
        let notes = column::<String>("notes").build_for(&mut columns);
        FoodPortionColumns {
            table: Table::new(columns),
            id,
            create_time,
            modify_time,
            food_id,
            meal_id,
            serving_id,
            quantity,
            notes,
        }
    };
}

impl Schema for Food {
    fn table() -> &'static Table<Food> {
        &FOOD.table
    }
}
impl Schema for Serving {
    fn table() -> &'static Table<Serving> {
        &SERVING.table
    }
}
impl Schema for Meal {
    fn table() -> &'static Table<Meal> {
        &MEAL.table
    }
}
impl Schema for FoodPortion {
    fn table() -> &'static Table<FoodPortion> {
        &FOOD_PORTION.table
    }
}

/// Creates every table, parents before children, in one transaction.
pub fn create_tables(persistor: &Persistor) -> crate::Result<()> {
    persistor.transaction(|p| {
        p.create_table::<Food>()?;
        p.create_table::<Serving>()?;
        p.create_table::<Meal>()?;
        p.create_table::<FoodPortion>()
    })?;
    for name in [Food::table().name(), Serving::table().name(), Meal::table().name(), FoodPortion::table().name()] {
        info!(table = name, "table ready");
    }
    Ok(())
}
