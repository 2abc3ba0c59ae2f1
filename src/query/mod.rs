//! Structured play queries: wire model, validation and execution
//!
//! A query arrives as a JSON tagged union produced by an external parser.
//! [`QueryValidator`] checks it against the [`ColumnRegistry`] and compiles it
//! into a [`CompiledQuery`] whose predicates cannot fail at evaluation time;
//! [`QueryExecutor`] then runs it over a [`PlayTable`].
//!
//! [`ColumnRegistry`]: crate::plays::ColumnRegistry
//! [`PlayTable`]: crate::plays::PlayTable

pub mod executor;
pub mod predicate;
pub mod validate;

pub use executor::QueryExecutor;
pub use predicate::{CompiledCondition, Literal, NumericTest, Predicate, Test};
pub use validate::{CompiledAggregate, CompiledQuery, CompiledStep, QueryValidator};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::QueryValidationError;

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "ne", alias = "!=")]
    Neq,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    #[serde(alias = "isin")]
    In,
    Between,
    Contains,
    NotContains,
    IsNull,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Between => "between",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::IsNull => "is_null",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a group combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Logic {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// A single `column operator value` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

/// Nested boolean group. An empty group matches every record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterGroup {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default, alias = "conditions")]
    pub children: Vec<FilterNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Condition(FilterCondition),
    Group(FilterGroup),
}

impl FilterGroup {
    pub fn all(children: Vec<FilterNode>) -> Self {
        Self {
            logic: Logic::And,
            children,
        }
    }

    pub fn any(children: Vec<FilterNode>) -> Self {
        Self {
            logic: Logic::Or,
            children,
        }
    }
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }
}

impl From<FilterCondition> for FilterNode {
    fn from(condition: FilterCondition) -> Self {
        FilterNode::Condition(condition)
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(group: FilterGroup) -> Self {
        FilterNode::Group(group)
    }
}

/// Relationship between a sequence step and the step before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepScope {
    /// Any later play of the same drive
    #[default]
    SameDrive,
    /// The immediately following play of the drive
    NextPlay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    #[serde(default)]
    pub filters: FilterGroup,
    #[serde(default)]
    pub scope: StepScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceMode {
    #[default]
    First,
    All,
}

/// Per-drive aggregate over the plays matching the root group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum Aggregate {
    #[default]
    Count,
    Sum { column: String },
    #[serde(alias = "mean")]
    Avg { column: String },
}

/// Test applied to a drive's aggregate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Having {
    pub operator: Operator,
    pub value: Value,
}

/// Requires the N-th play (1-based) of a drive to match a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayAt {
    pub position: usize,
    #[serde(default)]
    pub filters: FilterGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankDirection {
    Asc,
    #[default]
    Desc,
}

fn default_rank_limit() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterQuery {
    #[serde(default)]
    pub filters: FilterGroup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceQuery {
    /// Applied to every step in addition to the step's own group
    #[serde(default)]
    pub filters: FilterGroup,
    pub steps: Vec<SequenceStep>,
    #[serde(default)]
    pub mode: SequenceMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveQuery {
    #[serde(default)]
    pub filters: FilterGroup,
    #[serde(default)]
    pub aggregate: Aggregate,
    #[serde(default)]
    pub having: Option<Having>,
    #[serde(default)]
    pub exclude: Option<FilterGroup>,
    #[serde(default)]
    pub play_at: Option<PlayAt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankQuery {
    #[serde(default)]
    pub filters: FilterGroup,
    pub column: String,
    #[serde(default)]
    pub direction: RankDirection,
    #[serde(default = "default_rank_limit")]
    pub limit: usize,
    #[serde(default)]
    pub nth: Option<usize>,
    #[serde(default)]
    pub group_by: Vec<String>,
}

/// Top-level query, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuredQuery {
    Filter(FilterQuery),
    Sequence(SequenceQuery),
    Drive(DriveQuery),
    Rank(RankQuery),
}

impl StructuredQuery {
    /// Parse a query from its JSON wire form.
    pub fn from_json(text: &str) -> Result<Self, QueryValidationError> {
        serde_json::from_str(text).map_err(|e| QueryValidationError::Parse(e.to_string()))
    }

    pub fn shape(&self) -> &'static str {
        match self {
            StructuredQuery::Filter(_) => "filter",
            StructuredQuery::Sequence(_) => "sequence",
            StructuredQuery::Drive(_) => "drive",
            StructuredQuery::Rank(_) => "rank",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sequence_steps_stay_within_one_drive() {
        let step = |scope: &str| {
            format!(
                r#"{{"type": "sequence", "steps": [
                    {{"filters": {{"children": [{{"column": "touchdown", "operator": "eq", "value": true}}]}}}},
                    {{"scope": "{}", "filters": {{"children": [{{"column": "play_type", "operator": "eq", "value": "kickoff"}}]}}}}
                ]}}"#,
                scope
            )
        };

        assert!(StructuredQuery::from_json(&step("next_play")).is_ok());
        assert!(StructuredQuery::from_json(&step("same_drive")).is_ok());
        assert!(matches!(
            StructuredQuery::from_json(&step("next_drive")),
            Err(QueryValidationError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_filter_query() {
        let query = StructuredQuery::from_json(
            r#"{
                "type": "filter",
                "filters": {
                    "logic": "AND",
                    "children": [
                        {"column": "passer_player_name", "operator": "eq", "value": "B.Purdy"},
                        {"logic": "or", "conditions": [
                            {"column": "touchdown", "operator": "eq", "value": true},
                            {"column": "yards_gained", "operator": "gt", "value": 20}
                        ]}
                    ]
                }
            }"#,
        )
        .unwrap();

        let StructuredQuery::Filter(filter) = query else {
            panic!("expected filter query");
        };
        assert_eq!(filter.filters.children.len(), 2);
        match &filter.filters.children[1] {
            FilterNode::Group(group) => {
                assert_eq!(group.logic, Logic::Or);
                assert_eq!(group.children.len(), 2);
            }
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rank_defaults() {
        let query: StructuredQuery =
            serde_json::from_value(json!({"type": "rank", "column": "wpa"})).unwrap();
        let StructuredQuery::Rank(rank) = query else {
            panic!("expected rank query");
        };
        assert_eq!(rank.direction, RankDirection::Desc);
        assert_eq!(rank.limit, 10);
        assert!(rank.filters.children.is_empty());
    }

    #[test]
    fn test_parse_drive_aggregate() {
        let query: StructuredQuery = serde_json::from_value(json!({
            "type": "drive",
            "aggregate": {"function": "sum", "column": "yards_gained"},
            "having": {"operator": "gte", "value": 75}
        }))
        .unwrap();
        let StructuredQuery::Drive(drive) = query else {
            panic!("expected drive query");
        };
        assert_eq!(
            drive.aggregate,
            Aggregate::Sum {
                column: "yards_gained".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_operator_is_parse_error() {
        let err = StructuredQuery::from_json(
            r#"{"type": "filter", "filters": {"children": [{"column": "down", "operator": "like", "value": 3}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, QueryValidationError::Parse(_)));

        let err = StructuredQuery::from_json(r#"{"type": "teleport"}"#).unwrap_err();
        assert!(matches!(err, QueryValidationError::Parse(_)));
    }
}
