//! Name uniqueness checks run before a batch.

use crate::db::statement::{self, Filter};
use crate::db::wrapper::DbWrapper;
use crate::error::{DbError, DbResult};
use crate::models::entity::Entity;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// Names bound per lookup statement, under SQL Server's 2100 parameter cap.
const NAME_LOOKUP_CHUNK: usize = 1000;

/// Names occurring more than once, in order of first appearance.
pub(crate) fn duplicate_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for name in names {
        match positions.get(name) {
            Some(&index) => counts[index].1 += 1,
            None => {
                positions.insert(name, counts.len());
                counts.push((name, 1));
            }
        }
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Reject a batch whose names repeat, or that collide with stored rows.
///
/// Entities without a name column, and entities returning no name, are not
/// checked. The lookup runs on the autocommit connection.
pub(crate) async fn check_duplicate_names<T: Entity>(
    wrapper: &mut DbWrapper,
    entities: &[T],
) -> DbResult<()> {
    let Some(column) = T::NAME_COLUMN else {
        return Ok(());
    };

    let names: Vec<&str> = entities.iter().filter_map(|entity| entity.name()).collect();
    let repeated = duplicate_names(names.iter().copied());
    if !repeated.is_empty() {
        return Err(DbError::creating_duplicate_entry(column, repeated));
    }
    if names.is_empty() {
        return Ok(());
    }

    let stored_names = stored_names::<T>(wrapper, column, &names).await?;
    let existing: Vec<String> = names
        .iter()
        .filter(|name| stored_names.contains(**name))
        .map(|name| name.to_string())
        .collect();
    if !existing.is_empty() {
        return Err(DbError::entity_already_exists(column, existing));
    }
    Ok(())
}

/// Stored values of `column` among `names`, read in bounded chunks.
async fn stored_names<T: Entity>(
    wrapper: &mut DbWrapper,
    column: &str,
    names: &[&str],
) -> DbResult<HashSet<String>> {
    let mut stored = HashSet::new();
    for chunk in names.chunks(NAME_LOOKUP_CHUNK) {
        let filter = Filter::is_in(column, chunk.iter().copied());
        let stmt = statement::select_column(wrapper.dialect(), T::TABLE, column, &filter)?;
        let rows = wrapper.run_fetch(&stmt.sql, &stmt.params, false, None).await?;
        stored.extend(rows.into_iter().filter_map(|mut row| match row.remove(column) {
            Some(JsonValue::String(name)) => Some(name),
            _ => None,
        }));
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_duplicates() {
        assert!(duplicate_names(["a", "b", "c"]).is_empty());
        assert!(duplicate_names(Vec::<&str>::new()).is_empty());
    }

    #[test]
    fn test_duplicates_reported_once_in_first_seen_order() {
        let names = ["Crank", "Fork", "Fork", "Crank", "Saddle", "Fork"];
        assert_eq!(duplicate_names(names), vec!["Crank", "Fork"]);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        assert!(duplicate_names(["Fork", "fork"]).is_empty());
    }
}
