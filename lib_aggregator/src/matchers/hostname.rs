use std::collections::HashMap;

use super::MatchOutcome;
use crate::flashlist::Row;
use crate::model::EntityRef;

/// Host part of a `context`-style value.
///
/// `http://ru-1.cms:11100` and `ru-1.cms:0:11100` both give `ru-1.cms`.
pub fn hostname_from_context(context: &str) -> &str {
    let context = context.trim();
    let without_scheme = match context.find("://") {
        Some(pos) => &context[pos + 3..],
        None => context,
    };
    match without_scheme.find(':') {
        Some(pos) => &without_scheme[..pos],
        None => without_scheme,
    }
}

/// Port of a `context`-style value: the segment after the last `:`.
pub fn port_from_context(context: &str) -> Option<u16> {
    let (_, port) = context.trim().rsplit_once(':')?;
    port.trim_end_matches('/').parse().ok()
}

/// Resolves rows by the hostname found in one `host:port`-shaped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostnameMatcher {
    column: &'static str,
}

impl Default for HostnameMatcher {
    fn default() -> Self {
        Self::new("context")
    }
}

impl HostnameMatcher {
    pub const fn new(column: &'static str) -> Self {
        Self { column }
    }

    /// Matches `rows` against a hostname index. `entity` lifts the index's
    /// typed id into an [`EntityRef`].
    pub fn match_rows<R: Row, T: Copy>(
        &self,
        rows: &[R],
        pool: &HashMap<String, T>,
        entity: impl Fn(T) -> EntityRef,
    ) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        for (i, row) in rows.iter().enumerate() {
            let context = match row.text(self.column) {
                Ok(context) => context,
                Err(e) => {
                    log::debug!("Row {} has no usable hostname: {}", i, e);
                    outcome.miss(i);
                    continue;
                }
            };
            match pool.get(hostname_from_context(&context)) {
                Some(&id) => {
                    outcome.assign(entity(id), i);
                    outcome.hit(i);
                }
                None => {
                    log::debug!("No entity on host {}", hostname_from_context(&context));
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
    use crate::model::RuId;
    use serde_json::json;

    #[test]
    fn context_normalisation() {
        assert_eq!(hostname_from_context("host1:0:1234"), "host1");
        assert_eq!(hostname_from_context("http://ru-c2e12-27-01.cms:11100"), "ru-c2e12-27-01.cms");
        assert_eq!(hostname_from_context("bare-host"), "bare-host");
        assert_eq!(port_from_context("http://ru-1.cms:11100"), Some(11100));
        assert_eq!(port_from_context("host1:0:1234"), Some(1234));
        assert_eq!(port_from_context("bare-host"), None);
    }

    #[test]
    fn first_host_matches_second_does_not() {
        let pool: HashMap<String, RuId> =
            [("host1".to_string(), RuId(0)), ("host2".to_string(), RuId(1))].into_iter().collect();
        let rows = vec![json!({"context": "host1:0:1234"}), json!({"context": "host3:0:1234"})];

        let outcome = HostnameMatcher::default().match_rows(&rows, &pool, EntityRef::Ru);

        assert_eq!(outcome.row_for(EntityRef::Ru(RuId(0))), Some(0));
        assert_eq!(outcome.row_for(EntityRef::Ru(RuId(1))), None);
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.unmatched, 1);
    }

    #[test]
    fn last_row_for_an_entity_wins_and_all_count() {
        let pool: HashMap<String, RuId> = [("host1".to_string(), RuId(0))].into_iter().collect();
        let rows = vec![
            json!({"context": "http://host1:1000"}),
            json!({"context": null}),
            json!({"context": "http://host1:2000"}),
        ];

        let outcome = HostnameMatcher::default().match_rows(&rows, &pool, EntityRef::Ru);

        assert_eq!(outcome.row_for(EntityRef::Ru(RuId(0))), Some(2));
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.unmatched, 1);
        assert_eq!(outcome.total(), rows.len());
    }
}
