//! Query execution over the play table.
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::predicate::{NumericTest, Predicate};
use super::validate::{CompiledAggregate, CompiledQuery, CompiledStep};
use super::{SequenceMode, StepScope};
use crate::plays::{compare_for_rank, Column, Drive, FieldValue, PlayRecord, PlayTable};

/// Runs compiled queries against one play table.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor<'t> {
    table: &'t PlayTable,
}

impl<'t> QueryExecutor<'t> {
    pub fn new(table: &'t PlayTable) -> Self {
        Self { table }
    }

    /// Matched plays in result order. Never fails: an empty result means
    /// nothing matched.
    pub fn execute(&self, query: &CompiledQuery) -> Vec<&'t PlayRecord> {
        let positions = match query {
            CompiledQuery::Filter { filters } => self.filter(filters),
            CompiledQuery::Sequence { steps, mode } => self.sequence(steps, *mode),
            CompiledQuery::Drive {
                filters,
                aggregate,
                having,
                exclude,
                play_at,
            } => self.drive(filters, aggregate, having.as_ref(), exclude.as_ref(), play_at.as_ref()),
            CompiledQuery::Rank {
                filters,
                column,
                descending,
                limit,
                nth,
                group_by,
            } => self.rank(filters, *column, *descending, *limit, *nth, group_by),
        };

        debug!("{} query matched {} plays", query.shape(), positions.len());
        positions
            .into_iter()
            .filter_map(|pos| self.table.get(pos))
            .collect()
    }

    fn record(&self, pos: usize) -> Option<&'t PlayRecord> {
        self.table.get(pos)
    }

    fn matches(&self, predicate: &Predicate, pos: usize) -> bool {
        self.record(pos).map_or(false, |play| predicate.evaluate(play))
    }

    fn filter(&self, filters: &Predicate) -> Vec<usize> {
        (0..self.table.len())
            .filter(|&pos| self.matches(filters, pos))
            .collect()
    }

    fn sequence(&self, steps: &[CompiledStep], mode: SequenceMode) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();

        for drive in self.table.drives() {
            let chains = self.minimal_chains(drive, steps);
            let wanted = match mode {
                SequenceMode::First => 1,
                SequenceMode::All => usize::MAX,
            };
            for chain in chains.iter().take(wanted) {
                for &pos in chain {
                    if seen.insert(pos) {
                        result.push(pos);
                    }
                }
            }
        }

        result
    }

    /// Minimal chains of one drive in start order, as table positions.
    ///
    /// For each start play matching the first step, the earliest possible
    /// completion is found by forward reachability over the drive. A chain is
    /// kept only when no chain with a later start finishes no later than it.
    fn minimal_chains(&self, drive: &Drive, steps: &[CompiledStep]) -> Vec<Vec<usize>> {
        let plays = &drive.plays;
        let n = plays.len();
        if steps.is_empty() {
            return Vec::new();
        }

        // matched[k][i]: drive play i matches step k
        let matched: Vec<Vec<bool>> = steps
            .iter()
            .map(|step| plays.iter().map(|&pos| self.matches(&step.predicate, pos)).collect())
            .collect();

        let mut candidates: Vec<Vec<usize>> = Vec::new();
        for start in (0..n).filter(|&i| matched[0][i]) {
            if let Some(chain) = earliest_chain(start, steps, &matched) {
                candidates.push(chain);
            }
        }

        let mut minimal = Vec::new();
        for (i, chain) in candidates.iter().enumerate() {
            let end = chain[chain.len() - 1];
            let contains_other = candidates[i + 1..]
                .iter()
                .any(|other| other[other.len() - 1] <= end);
            if !contains_other {
                minimal.push(chain.iter().map(|&idx| plays[idx]).collect());
            }
        }
        minimal
    }

    fn drive(
        &self,
        filters: &Predicate,
        aggregate: &CompiledAggregate,
        having: Option<&NumericTest>,
        exclude: Option<&Predicate>,
        play_at: Option<&(usize, Predicate)>,
    ) -> Vec<usize> {
        let mut result = Vec::new();

        for drive in self.table.drives() {
            let matching: Vec<&PlayRecord> = drive
                .plays
                .iter()
                .filter_map(|&pos| self.record(pos))
                .filter(|play| filters.evaluate(play))
                .collect();

            let value = aggregate_value(aggregate, &matching);
            let passes = match (having, value) {
                (Some(test), Some(v)) => test.check(v),
                (Some(_), None) => false,
                (None, Some(v)) => !matches!(aggregate, CompiledAggregate::Count) || v >= 1.0,
                (None, None) => false,
            };
            if !passes {
                continue;
            }

            if let Some(exclude) = exclude {
                if drive.plays.iter().any(|&pos| self.matches(exclude, pos)) {
                    continue;
                }
            }

            if let Some((position, predicate)) = play_at {
                let hit = drive
                    .plays
                    .get(position - 1)
                    .map_or(false, |&pos| self.matches(predicate, pos));
                if !hit {
                    continue;
                }
            }

            result.extend(drive.plays.iter().copied());
        }

        result
    }

    fn rank(
        &self,
        filters: &Predicate,
        column: Column,
        descending: bool,
        limit: usize,
        nth: Option<usize>,
        group_by: &[Column],
    ) -> Vec<usize> {
        let mut candidates: Vec<usize> = self.filter(filters);
        candidates.sort_by(|&a, &b| {
            let (pa, pb) = (&self.table.records()[a], &self.table.records()[b]);
            compare_for_rank(&pa.value(column), &pb.value(column), descending)
                .then(pa.sequence_index.cmp(&pb.sequence_index))
        });

        let mut group_counts: HashMap<Vec<String>, usize> = HashMap::new();
        let mut result = Vec::new();
        for pos in candidates {
            let key = match self.record(pos) {
                Some(play) => group_key(play, group_by),
                None => continue,
            };
            let rank = group_counts.entry(key).or_insert(0);
            *rank += 1;

            let keep = match nth {
                Some(n) => *rank == n,
                None => *rank <= limit,
            };
            if keep {
                result.push(pos);
            }
        }
        result
    }
}

/// Earliest completion of a chain beginning at drive play `start`, as drive
/// indices. `reach[k]` holds every index at which step `k` can complete.
fn earliest_chain(start: usize, steps: &[CompiledStep], matched: &[Vec<bool>]) -> Option<Vec<usize>> {
    let n = matched.first().map_or(0, Vec::len);
    let mut reach: Vec<Vec<usize>> = vec![vec![start]];

    for (k, step) in steps.iter().enumerate().skip(1) {
        let previous = &reach[k - 1];
        let current: Vec<usize> = match step.scope {
            StepScope::NextPlay => previous
                .iter()
                .map(|&j| j + 1)
                .filter(|&j| j < n && matched[k][j])
                .collect(),
            StepScope::SameDrive => {
                let earliest = *previous.first()?;
                (earliest + 1..n).filter(|&j| matched[k][j]).collect()
            }
        };
        if current.is_empty() {
            return None;
        }
        reach.push(current);
    }

    // Walk back from the earliest end, picking any valid predecessor.
    let mut chain = vec![*reach.last()?.first()?];
    for k in (1..steps.len()).rev() {
        let next = chain[chain.len() - 1];
        let predecessor = match steps[k].scope {
            StepScope::NextPlay => next - 1,
            StepScope::SameDrive => *reach[k - 1].iter().find(|&&j| j < next)?,
        };
        chain.push(predecessor);
    }
    chain.reverse();
    Some(chain)
}

fn aggregate_value(aggregate: &CompiledAggregate, plays: &[&PlayRecord]) -> Option<f64> {
    match aggregate {
        CompiledAggregate::Count => Some(plays.len() as f64),
        CompiledAggregate::Sum(column) => {
            let values: Vec<f64> = plays.iter().filter_map(|p| p.value(*column).as_number()).collect();
            (!values.is_empty()).then(|| values.iter().sum())
        }
        CompiledAggregate::Avg(column) => {
            let values: Vec<f64> = plays.iter().filter_map(|p| p.value(*column).as_number()).collect();
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

fn group_key(play: &PlayRecord, columns: &[Column]) -> Vec<String> {
    columns
        .iter()
        .map(|&column| match play.value(column) {
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.to_lowercase(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Null => String::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plays::ColumnRegistry;
    use crate::query::{QueryValidator, StructuredQuery};
    use serde_json::json;

    fn play(seq: usize, drive: u32, play_type: &str, yards: i32) -> PlayRecord {
        PlayRecord {
            sequence_index: seq,
            game_id: Some("g1".to_string()),
            drive_id: Some(drive),
            play_type: Some(play_type.to_string()),
            yards_gained: Some(yards),
            ..PlayRecord::default()
        }
    }

    fn run(table: &PlayTable, query: serde_json::Value) -> Vec<usize> {
        let registry = ColumnRegistry::standard();
        let query: StructuredQuery = serde_json::from_value(query).unwrap();
        let compiled = QueryValidator::new(&registry).validate(&query).unwrap();
        QueryExecutor::new(table)
            .execute(&compiled)
            .into_iter()
            .map(|p| p.sequence_index)
            .collect()
    }

    fn table() -> PlayTable {
        PlayTable::new(vec![
            play(0, 1, "run", 3),
            play(1, 1, "pass", 12),
            play(2, 1, "run", 1),
            play(3, 1, "pass", 25),
            play(4, 2, "pass", 0),
            play(5, 2, "punt", 0),
            play(6, 3, "run", 40),
            play(7, 3, "pass", 8),
        ])
    }

    fn pass_then_run(scope: &str, mode: &str) -> serde_json::Value {
        json!({
            "type": "sequence",
            "mode": mode,
            "steps": [
                {"filters": {"children": [{"column": "play_type", "operator": "eq", "value": "run"}]}},
                {"scope": scope, "filters": {"children": [{"column": "play_type", "operator": "eq", "value": "pass"}]}}
            ]
        })
    }

    #[test]
    fn test_filter_returns_sequence_order() {
        let plays = run(
            &table(),
            json!({"type": "filter", "filters": {"children": [
                {"column": "play_type", "operator": "eq", "value": "PASS"}
            ]}}),
        );
        assert_eq!(plays, vec![1, 3, 4, 7]);
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let plays = run(
            &table(),
            json!({"type": "filter", "filters": {"children": [
                {"column": "play_type", "operator": "eq", "value": "field_goal"}
            ]}}),
        );
        assert!(plays.is_empty());
    }

    #[test]
    fn test_sequence_first_and_all() {
        // drive 1: run(0) pass(1) run(2) pass(3); drive 3: run(6) pass(7)
        assert_eq!(run(&table(), pass_then_run("same_drive", "first")), vec![0, 1, 6, 7]);
        assert_eq!(run(&table(), pass_then_run("same_drive", "all")), vec![0, 1, 2, 3, 6, 7]);
    }

    #[test]
    fn test_sequence_drops_non_minimal_chains() {
        let table = PlayTable::new(vec![
            play(0, 1, "run", 1),
            play(1, 1, "run", 2),
            play(2, 1, "pass", 5),
        ]);
        // run(0)..pass(2) contains run(1)..pass(2)
        assert_eq!(run(&table, pass_then_run("same_drive", "all")), vec![1, 2]);
    }

    #[test]
    fn test_sequence_next_play_needs_adjacency() {
        let table = PlayTable::new(vec![
            play(0, 1, "run", 1),
            play(1, 1, "punt", 0),
            play(2, 1, "pass", 5),
            play(3, 2, "run", 4),
            play(4, 2, "pass", 9),
        ]);
        assert_eq!(run(&table, pass_then_run("next_play", "all")), vec![3, 4]);
    }

    #[test]
    fn test_sequence_does_not_cross_drives() {
        let table = PlayTable::new(vec![play(0, 1, "run", 1), play(1, 2, "pass", 5)]);
        assert!(run(&table, pass_then_run("same_drive", "all")).is_empty());
    }

    #[test]
    fn test_drive_sum_having_and_exclude() {
        let query = json!({
            "type": "drive",
            "aggregate": {"function": "sum", "column": "yards_gained"},
            "having": {"operator": "gte", "value": 40}
        });
        assert_eq!(run(&table(), query), vec![0, 1, 2, 3, 6, 7]);

        let query = json!({
            "type": "drive",
            "aggregate": {"function": "sum", "column": "yards_gained"},
            "having": {"operator": "gte", "value": 40},
            "exclude": {"children": [{"column": "yards_gained", "operator": "gte", "value": 40}]}
        });
        assert_eq!(run(&table(), query), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_drive_count_and_play_at() {
        let query = json!({
            "type": "drive",
            "filters": {"children": [{"column": "play_type", "operator": "eq", "value": "pass"}]},
            "having": {"operator": "gte", "value": 2}
        });
        assert_eq!(run(&table(), query), vec![0, 1, 2, 3]);

        let query = json!({
            "type": "drive",
            "play_at": {"position": 2, "filters": {"children": [
                {"column": "play_type", "operator": "eq", "value": "punt"}
            ]}}
        });
        assert_eq!(run(&table(), query), vec![4, 5]);
    }

    #[test]
    fn test_rank_limit_nth_and_group_by() {
        let top = json!({"type": "rank", "column": "yards_gained", "direction": "desc", "limit": 3});
        assert_eq!(run(&table(), top), vec![6, 3, 1]);

        let second = json!({"type": "rank", "column": "yards_gained", "nth": 2});
        assert_eq!(run(&table(), second), vec![3]);

        let per_drive = json!({"type": "rank", "column": "yards_gained", "limit": 1, "group_by": ["drive"]});
        assert_eq!(run(&table(), per_drive), vec![6, 3, 4]);
    }

    #[test]
    fn test_rank_ties_break_by_sequence_and_nulls_last() {
        let mut plays = vec![play(0, 1, "pass", 5), play(1, 1, "pass", 5)];
        plays.push(PlayRecord {
            sequence_index: 2,
            yards_gained: None,
            ..PlayRecord::default()
        });
        let table = PlayTable::new(plays);

        let asc = json!({"type": "rank", "column": "yards_gained", "direction": "asc"});
        assert_eq!(run(&table, asc), vec![0, 1, 2]);
        let desc = json!({"type": "rank", "column": "yards_gained", "direction": "desc"});
        assert_eq!(run(&table, desc), vec![0, 1, 2]);
    }
}
