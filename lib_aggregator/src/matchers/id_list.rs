use std::collections::HashMap;

use super::MatchOutcome;
use crate::flashlist::Row;
use crate::model::EntityRef;

/// Resolves every id listed in one or more list-valued columns.
///
/// One row may address many entities. An entity named several times (in two
/// columns, or by two rows) appears once in the outcome, carrying the last row
/// that named it. `matched` and `unmatched` count list entries; a row lacking a
/// usable list in one of the columns counts one unmatched for that column. The
/// row sets of the outcome still record which rows resolved something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdListMatcher {
    columns: &'static [&'static str],
}

impl IdListMatcher {
    /// The FED problem lists of the RU table.
    pub const RU_FED_LISTS: IdListMatcher = IdListMatcher::new(&["fedIdsWithErrors", "fedIdsWithoutFragments"]);

    pub const fn new(columns: &'static [&'static str]) -> Self {
        Self { columns }
    }

    pub fn match_rows<R: Row, T: Copy>(
        &self,
        rows: &[R],
        pool: &HashMap<u32, T>,
        entity: impl Fn(T) -> EntityRef,
    ) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        for (i, row) in rows.iter().enumerate() {
            for column in self.columns {
                let ids = match row.int_list(column) {
                    Ok(ids) => ids,
                    Err(e) => {
                        log::debug!("Row {}: {}", i, e);
                        outcome.miss(i);
                        continue;
                    }
                };
                for id in ids {
                    match u32::try_from(id).ok().and_then(|id| pool.get(&id)) {
                        Some(&target) => {
                            outcome.assign(entity(target), i);
                            outcome.hit(i);
                        }
                        None => {
                            log::debug!("Id {} listed in {} is not in the topology", id, column);
                            outcome.miss(i);
                        }
                    }
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FedId;
    use serde_json::json;

    #[test]
    fn entity_in_both_lists_receives_the_row_once() {
        let pool: HashMap<u32, FedId> = [(7, FedId(0)), (9, FedId(1))].into_iter().collect();
        let rows = vec![json!({"fedIdsWithErrors": [7, 9], "fedIdsWithoutFragments": [9, 12]})];

        let outcome = IdListMatcher::RU_FED_LISTS.match_rows(&rows, &pool, EntityRef::Fed);

        assert_eq!(outcome.correspondences.len(), 2);
        assert_eq!(outcome.row_for(EntityRef::Fed(FedId(0))), Some(0));
        assert_eq!(outcome.row_for(EntityRef::Fed(FedId(1))), Some(0));
        assert_eq!(outcome.matched, 3);
        assert_eq!(outcome.unmatched, 1);
        // Entries are counted separately from the one row that carried them.
        assert_eq!(outcome.resolved_rows.len(), 1);
        assert_eq!(outcome.unresolved_rows().count(), 0);
    }

    #[test]
    fn missing_list_column_counts_once() {
        let pool: HashMap<u32, FedId> = [(7, FedId(0))].into_iter().collect();
        let rows = vec![json!({"fedIdsWithErrors": [7]}), json!({"fedIdsWithErrors": "7", "fedIdsWithoutFragments": []})];

        let outcome = IdListMatcher::RU_FED_LISTS.match_rows(&rows, &pool, EntityRef::Fed);

        assert_eq!(outcome.row_for(EntityRef::Fed(FedId(0))), Some(0));
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.unmatched, 2);
        assert_eq!(outcome.unresolved_rows().collect::<Vec<_>>(), vec![1]);
    }
}
