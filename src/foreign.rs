//! Completion of deferred foreign keys.
//!
//! Entities built before their parents were stored carry a pending natural
//! key per FK column (see [`Entity::set_fk_parent_key`]). Completion looks
//! those keys up in one pass, writes the parent's id into the FK column and
//! hands back every entity, either completed or unmatched.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::clause::Where;
use crate::datatype::DataType;
use crate::entity::{Entity, OtherHasher};
use crate::error::{MacrotrackError, Result};
use crate::persist::Executor;
use crate::query::Select;
use crate::schema::{Column, FkColumn, Schema};

/// Outcome of one completion pass. Every input entity ends up in exactly one
/// of the two lists.
pub struct FkCompletion<M: Schema> {
    /// Entities whose FK column was filled in, plus those that had nothing
    /// pending for it.
    pub completed: Vec<Entity<M>>,
    /// Entities whose parent could not be found, or whose natural key matched
    /// more than one parent. Their pending key is kept.
    pub unmatched: Vec<Entity<M>>,
}

impl<M: Schema> FkCompletion<M> {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Resolves `fk` for each entity against `lookup`, which maps a parent's
/// natural key (in raw-string form) to the value the FK column should hold.
pub fn complete_fk_ids<M, J, N, K>(
    entities: Vec<Entity<M>>,
    fk: &FkColumn<M, J, N>,
    key: &Column<N, K>,
    lookup: &HashMap<String, J, OtherHasher>,
) -> Result<FkCompletion<M>>
where
    M: Schema,
    J: DataType,
    N: Schema,
    K: DataType,
{
    let mut completion = FkCompletion { completed: Vec::new(), unmatched: Vec::new() };
    for mut entity in entities {
        let pending = match entity.parent_key(fk.index()) {
            Some(pending) => pending.clone(),
            None => {
                completion.completed.push(entity);
                continue;
            }
        };
        if pending.index != key.index() {
            return Err(MacrotrackError::Invariant(format!(
                "{} was keyed on {}.{}, not on {}",
                fk.column_ref(),
                N::table().name(),
                pending.column,
                key.column_ref()
            )));
        }
        let natural = key.raw_to_string(&pending.value)?;
        match lookup.get(&natural) {
            Some(target) => {
                entity.take_parent_key(fk.index());
                let mut data = entity.data().widened(&[fk.column_ref()]);
                data.put(fk, Some(target.clone()));
                data.make_immutable();
                let resolved = entity.with_data(data, entity.source())?;
                completion.completed.push(resolved);
            }
            None => {
                warn!(column = %fk.column_ref(), key = %natural, "no parent found for pending foreign key");
                completion.unmatched.push(entity);
            }
        }
    }
    debug!(
        column = %fk.column_ref(),
        completed = completion.completed.len(),
        unmatched = completion.unmatched.len(),
        "foreign key completion"
    );
    Ok(completion)
}

/// Like [`complete_fk_ids`], looking the pending natural keys up in the
/// parent table with a single select. A natural key shared by several parents
/// resolves to none of them.
pub fn complete_fk_ids_from<E, M, J, N, K>(
    executor: &E,
    entities: Vec<Entity<M>>,
    fk: &FkColumn<M, J, N>,
    key: &Column<N, K>,
) -> Result<FkCompletion<M>>
where
    E: Executor,
    M: Schema,
    J: DataType,
    N: Schema,
    K: DataType,
{
    let mut wanted: Vec<K> = Vec::new();
    let mut seen: HashMap<String, (), OtherHasher> = HashMap::default();
    for entity in &entities {
        if let Some(pending) = entity.parent_key(fk.index()) {
            if pending.index != key.index() {
                continue;
            }
            if let Some(value) = key.from_raw(&pending.value)? {
                if seen.insert(value.to_raw_string(), ()).is_none() {
                    wanted.push(value);
                }
            }
        }
    }
    let mut lookup: HashMap<String, J, OtherHasher> = HashMap::default();
    if !wanted.is_empty() {
        let select = Select::two(fk.parent_column(), key)
            .filter(Where::is_in(key, wanted).iterate_threshold(executor.iterate_threshold()))
            .build()?;
        let mut ambiguous: HashMap<String, usize, OtherHasher> = HashMap::default();
        for (target, natural) in executor.select(&select)? {
            if let (Some(target), Some(natural)) = (target, natural) {
                let natural = natural.to_raw_string();
                if lookup.insert(natural.clone(), target).is_some() {
                    *ambiguous.entry(natural).or_insert(1) += 1;
                }
            }
        }
        for (natural, parents) in ambiguous {
            lookup.remove(&natural);
            warn!(column = %fk.column_ref(), key = %natural, parents, "natural key matches several parents");
        }
    }
    complete_fk_ids(entities, fk, key, &lookup)
}
