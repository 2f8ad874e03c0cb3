// src/blocking.rs
//
// Candidate-pair generation. Records are scanned in contiguous batches; a
// pair is emitted when the two ids are strictly ordered and at least one
// blocking rule produces the same key for both records.

use std::sync::Arc;

use crate::models::core::{CandidatePair, Record};

/// A named, pure key extractor. Two records fall in the same block under
/// this rule when both keys are present and equal.
///
/// Returning `None` marks the rule as not applicable to that record: the
/// rule then neither forces nor forbids any pair involving it. A missing
/// field is not a failure; it keys as the empty string and blocks only with
/// other empties.
#[derive(Clone)]
pub struct BlockingRule {
    pub name: String,
    key_fn: Arc<dyn Fn(&Record) -> Option<String> + Send + Sync>,
}

impl BlockingRule {
    pub fn new(
        name: impl Into<String>,
        key_fn: impl Fn(&Record) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            key_fn: Arc::new(key_fn),
        }
    }

    /// Rule keyed on the literal value of one field.
    pub fn on_field(field: &str) -> Self {
        let field_owned = field.to_string();
        Self::new(field, move |record: &Record| {
            Some(record.field(&field_owned).to_string())
        })
    }

    pub fn key(&self, record: &Record) -> Option<String> {
        (self.key_fn)(record)
    }
}

impl std::fmt::Debug for BlockingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingRule")
            .field("name", &self.name)
            .finish()
    }
}

/// One rule per field name, each keyed on the literal field value.
pub fn rules_from_fields(fields: &[String]) -> Vec<BlockingRule> {
    fields.iter().map(|f| BlockingRule::on_field(f)).collect()
}

/// Lazy batch-sequential stream of candidate pairs.
///
/// Each yielded item holds the pairs whose left-hand record lies in one
/// contiguous batch of the record list. Every emitted pair satisfies
/// `records[a].id < records[b].id`, and a pair blocked by several rules
/// appears exactly once.
pub struct CandidateBatches {
    records: Arc<Vec<Record>>,
    rules: Arc<Vec<BlockingRule>>,
    batch_size: usize,
    next_start: usize,
}

impl CandidateBatches {
    pub fn new(records: Arc<Vec<Record>>, rules: Arc<Vec<BlockingRule>>, batch_size: usize) -> Self {
        Self {
            records,
            rules,
            batch_size: batch_size.max(1),
            next_start: 0,
        }
    }

    /// Flatten into individual pairs, still lazily and in batch order.
    pub fn pairs(self) -> impl Iterator<Item = CandidatePair> {
        self.flatten()
    }
}

impl Iterator for CandidateBatches {
    type Item = Vec<CandidatePair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_start >= self.records.len() {
            return None;
        }
        let start = self.next_start;
        let end = (start + self.batch_size).min(self.records.len());
        self.next_start = end;

        let mut batch = Vec::new();
        for a_idx in start..end {
            let a = &self.records[a_idx];
            let a_keys: Vec<Option<String>> = self.rules.iter().map(|r| r.key(a)).collect();
            for (b_idx, b) in self.records.iter().enumerate() {
                if a.id >= b.id {
                    continue;
                }
                let blocked = self.rules.iter().zip(&a_keys).any(|(rule, a_key)| {
                    match (a_key, rule.key(b)) {
                        (Some(ka), Some(kb)) => *ka == kb,
                        _ => false,
                    }
                });
                if blocked {
                    batch.push(CandidatePair { a: a_idx, b: b_idx });
                }
            }
        }
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(id: &str, pairs: &[(&str, &str)]) -> Record {
        let mut fields = HashMap::new();
        for (k, v) in pairs {
            fields.insert(k.to_string(), v.to_string());
        }
        Record::new(id, fields)
    }

    fn ids(records: &[Record], pairs: Vec<CandidatePair>) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = pairs
            .into_iter()
            .map(|p| (records[p.a].id.clone(), records[p.b].id.clone()))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_disjunction_of_rules() {
        let records = vec![
            record("A", &[("city", "NY"), ("zip", "10001")]),
            record("B", &[("city", "NY"), ("zip", "99999")]),
            record("C", &[("city", "LA"), ("zip", "10001")]),
        ];
        let rules = rules_from_fields(&["city".to_string(), "zip".to_string()]);
        let stream = CandidateBatches::new(Arc::new(records.clone()), Arc::new(rules), 10);
        let pairs: Vec<CandidatePair> = stream.pairs().collect();
        assert_eq!(
            ids(&records, pairs),
            vec![
                ("A".to_string(), "B".to_string()),
                ("A".to_string(), "C".to_string()),
            ]
        );
    }

    #[test]
    fn test_pairs_are_ordered_and_unique() {
        // both rules agree on every pair; each pair must still appear once
        let records = vec![
            record("r3", &[("city", "NY"), ("zip", "10001")]),
            record("r1", &[("city", "NY"), ("zip", "10001")]),
            record("r2", &[("city", "NY"), ("zip", "10001")]),
        ];
        let rules = rules_from_fields(&["city".to_string(), "zip".to_string()]);
        let stream =
            CandidateBatches::new(Arc::new(records.clone()), Arc::new(rules), 1);
        let pairs: Vec<CandidatePair> = stream.pairs().collect();
        for p in &pairs {
            assert!(records[p.a].id < records[p.b].id);
        }
        assert_eq!(
            ids(&records, pairs),
            vec![
                ("r1".to_string(), "r2".to_string()),
                ("r1".to_string(), "r3".to_string()),
                ("r2".to_string(), "r3".to_string()),
            ]
        );
    }

    #[test]
    fn test_batching_covers_all_records() {
        let records: Vec<Record> = (0..7)
            .map(|i| record(&format!("r{i}"), &[("k", "same")]))
            .collect();
        let rules = rules_from_fields(&["k".to_string()]);
        let batches: Vec<Vec<CandidatePair>> =
            CandidateBatches::new(Arc::new(records), Arc::new(rules), 3).collect();
        assert_eq!(batches.len(), 3);
        let total: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(total, 7 * 6 / 2);
    }

    #[test]
    fn test_missing_fields_block_only_with_other_empties() {
        let records = vec![
            record("a", &[]),
            record("b", &[]),
            record("c", &[("city", "NY")]),
        ];
        let rules = rules_from_fields(&["city".to_string()]);
        let pairs: Vec<CandidatePair> =
            CandidateBatches::new(Arc::new(records.clone()), Arc::new(rules), 10)
                .pairs()
                .collect();
        assert_eq!(ids(&records, pairs), vec![("a".to_string(), "b".to_string())]);
    }

    #[test]
    fn test_inapplicable_rule_neither_forces_nor_forbids() {
        let skipping = BlockingRule::new("odd-ids-only", |r: &Record| {
            if r.id.len() % 2 == 1 {
                Some("bucket".to_string())
            } else {
                None
            }
        });
        let records = vec![record("x", &[]), record("y", &[]), record("zz", &[])];
        let pairs: Vec<CandidatePair> =
            CandidateBatches::new(Arc::new(records.clone()), Arc::new(vec![skipping]), 10)
                .pairs()
                .collect();
        // "zz" opts out; "x" and "y" share the bucket
        assert_eq!(ids(&records, pairs), vec![("x".to_string(), "y".to_string())]);
    }

    #[test]
    fn test_no_self_pairs_with_duplicate_ids() {
        let records = vec![record("dup", &[("k", "v")]), record("dup", &[("k", "v")])];
        let rules = rules_from_fields(&["k".to_string()]);
        let pairs: Vec<CandidatePair> =
            CandidateBatches::new(Arc::new(records), Arc::new(rules), 10)
                .pairs()
                .collect();
        assert!(pairs.is_empty());
    }
}
