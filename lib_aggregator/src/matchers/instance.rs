use std::collections::HashMap;

use super::MatchOutcome;
use crate::flashlist::Row;
use crate::model::EntityRef;

/// Resolves rows by the XDAQ application instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceMatcher {
    column: &'static str,
}

impl Default for InstanceMatcher {
    fn default() -> Self {
        Self { column: "instance" }
    }
}

impl InstanceMatcher {
    pub const fn new(column: &'static str) -> Self {
        Self { column }
    }

    pub fn match_rows<R: Row, T: Copy>(
        &self,
        rows: &[R],
        pool: &HashMap<u32, T>,
        entity: impl Fn(T) -> EntityRef,
    ) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        for (i, row) in rows.iter().enumerate() {
            let instance = row
                .int(self.column)
                .map_err(|e| e.to_string())
                .and_then(|value| u32::try_from(value).map_err(|_| format!("instance {value} out of range")));
            match instance {
                Ok(instance) => match pool.get(&instance) {
                    Some(&id) => {
                        outcome.assign(entity(id), i);
                        outcome.hit(i);
                    }
                    None => outcome.miss(i),
                },
                Err(reason) => {
                    log::warn!("Row {} carries no usable {}: {}", i, self.column, reason);
                    outcome.miss(i);
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BuId;
    use serde_json::json;

    #[test]
    fn non_numeric_instance_is_unmatched_not_fatal() {
        let pool: HashMap<u32, BuId> = [(3, BuId(0)), (4, BuId(1))].into_iter().collect();
        let rows = vec![json!({"instance": "4"}), json!({"instance": "four"}), json!({"instance": 9}), json!({"instance": -1})];

        let outcome = InstanceMatcher::default().match_rows(&rows, &pool, EntityRef::Bu);

        assert_eq!(outcome.row_for(EntityRef::Bu(BuId(1))), Some(0));
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.unmatched, 3);
    }
}
