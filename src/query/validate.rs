//! Query validation against the column registry.
//!
//! Produces a [`CompiledQuery`] or the first [`QueryValidationError`] found.

use serde_json::Value;

use super::predicate::{CompiledCondition, Literal, NumericTest, Predicate, Test};
use super::{
    Aggregate, DriveQuery, FilterCondition, FilterGroup, FilterNode, Having, Logic, Operator,
    RankDirection, RankQuery, SequenceMode, SequenceQuery, StepScope, StructuredQuery,
};
use crate::error::QueryValidationError;
use crate::plays::{Column, ColumnRegistry, ColumnType};

type Result<T> = std::result::Result<T, QueryValidationError>;

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStep {
    /// Root group already folded in
    pub predicate: Predicate,
    pub scope: StepScope,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledAggregate {
    Count,
    Sum(Column),
    Avg(Column),
}

/// A query whose columns, operators and literals have all been checked.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledQuery {
    Filter {
        filters: Predicate,
    },
    Sequence {
        steps: Vec<CompiledStep>,
        mode: SequenceMode,
    },
    Drive {
        filters: Predicate,
        aggregate: CompiledAggregate,
        having: Option<NumericTest>,
        exclude: Option<Predicate>,
        play_at: Option<(usize, Predicate)>,
    },
    Rank {
        filters: Predicate,
        column: Column,
        descending: bool,
        limit: usize,
        nth: Option<usize>,
        group_by: Vec<Column>,
    },
}

impl CompiledQuery {
    pub fn shape(&self) -> &'static str {
        match self {
            CompiledQuery::Filter { .. } => "filter",
            CompiledQuery::Sequence { .. } => "sequence",
            CompiledQuery::Drive { .. } => "drive",
            CompiledQuery::Rank { .. } => "rank",
        }
    }
}

/// Checks structured queries against a column registry.
#[derive(Debug, Clone, Copy)]
pub struct QueryValidator<'a> {
    registry: &'a ColumnRegistry,
}

impl<'a> QueryValidator<'a> {
    pub fn new(registry: &'a ColumnRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self, query: &StructuredQuery) -> Result<CompiledQuery> {
        match query {
            StructuredQuery::Filter(filter) => Ok(CompiledQuery::Filter {
                filters: self.compile_group(&filter.filters)?,
            }),
            StructuredQuery::Sequence(sequence) => self.compile_sequence(sequence),
            StructuredQuery::Drive(drive) => self.compile_drive(drive),
            StructuredQuery::Rank(rank) => self.compile_rank(rank),
        }
    }

    fn column(&self, name: &str) -> Result<Column> {
        self.registry
            .lookup(name)
            .ok_or_else(|| QueryValidationError::UnknownColumn {
                column: name.to_string(),
            })
    }

    pub fn compile_group(&self, group: &FilterGroup) -> Result<Predicate> {
        if group.children.is_empty() {
            return Ok(Predicate::always());
        }

        let children = group
            .children
            .iter()
            .map(|child| match child {
                FilterNode::Condition(condition) => self.compile_condition(condition),
                FilterNode::Group(group) => self.compile_group(group),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(match group.logic {
            Logic::And => Predicate::All(children),
            Logic::Or => Predicate::Any(children),
        })
    }

    fn compile_condition(&self, condition: &FilterCondition) -> Result<Predicate> {
        let column = self.column(&condition.column)?;
        let column_type = column.column_type();
        let operator = condition.operator;
        let value = &condition.value;
        let ctx = Ctx {
            column: &condition.column,
            operator,
        };

        let test = match operator {
            Operator::IsNull => Test::IsNull(match value {
                Value::Null => true,
                Value::Bool(b) => *b,
                _ => return Err(ctx.invalid("is_null takes true, false or no value")),
            }),
            Operator::Eq => Test::Eq(ctx.literal(column_type, value)?),
            Operator::Neq => Test::Neq(ctx.literal(column_type, value)?),
            Operator::In => {
                let items: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    scalar => vec![scalar],
                };
                if items.is_empty() {
                    return Err(ctx.invalid("in requires at least one value"));
                }
                Test::In(
                    items
                        .into_iter()
                        .map(|item| ctx.literal(column_type, item))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte | Operator::Between => {
                if column_type != ColumnType::Numeric {
                    return Err(ctx.unsupported(column_type));
                }
                Test::Range(ctx.numeric_test(value)?)
            }
            Operator::Contains | Operator::NotContains => {
                if !matches!(column_type, ColumnType::String | ColumnType::Categorical) {
                    return Err(ctx.unsupported(column_type));
                }
                let needle = match value {
                    Value::String(s) if !s.trim().is_empty() => s.trim().to_lowercase(),
                    _ => return Err(ctx.invalid("expected a non-empty string")),
                };
                if operator == Operator::Contains {
                    Test::Contains(needle)
                } else {
                    Test::NotContains(needle)
                }
            }
        };

        Ok(Predicate::Condition(CompiledCondition { column, test }))
    }

    fn compile_sequence(&self, sequence: &SequenceQuery) -> Result<CompiledQuery> {
        if sequence.steps.is_empty() {
            return Err(QueryValidationError::MalformedShape {
                shape: "sequence",
                reason: "at least one step is required".to_string(),
            });
        }

        let root = self.compile_group(&sequence.filters)?;
        let steps = sequence
            .steps
            .iter()
            .map(|step| {
                Ok(CompiledStep {
                    predicate: root.clone().and(self.compile_group(&step.filters)?),
                    scope: step.scope,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledQuery::Sequence {
            steps,
            mode: sequence.mode,
        })
    }

    fn compile_drive(&self, drive: &DriveQuery) -> Result<CompiledQuery> {
        let aggregate = match &drive.aggregate {
            Aggregate::Count => CompiledAggregate::Count,
            Aggregate::Sum { column } => CompiledAggregate::Sum(self.numeric_column(column, "sum")?),
            Aggregate::Avg { column } => CompiledAggregate::Avg(self.numeric_column(column, "avg")?),
        };

        let having = drive
            .having
            .as_ref()
            .map(|having| self.compile_having(having))
            .transpose()?;

        let exclude = drive
            .exclude
            .as_ref()
            .map(|group| self.compile_group(group))
            .transpose()?;

        let play_at = match &drive.play_at {
            Some(play_at) if play_at.position == 0 => {
                return Err(QueryValidationError::MalformedShape {
                    shape: "drive",
                    reason: "play_at position is 1-based".to_string(),
                })
            }
            Some(play_at) => Some((play_at.position, self.compile_group(&play_at.filters)?)),
            None => None,
        };

        Ok(CompiledQuery::Drive {
            filters: self.compile_group(&drive.filters)?,
            aggregate,
            having,
            exclude,
            play_at,
        })
    }

    fn compile_having(&self, having: &Having) -> Result<NumericTest> {
        let ctx = Ctx {
            column: "having",
            operator: having.operator,
        };
        match having.operator {
            Operator::Eq => Ok(NumericTest::Eq(ctx.number(&having.value)?)),
            Operator::Neq => Ok(NumericTest::Neq(ctx.number(&having.value)?)),
            Operator::In => {
                let items = match &having.value {
                    Value::Array(items) if !items.is_empty() => items.iter().collect::<Vec<_>>(),
                    Value::Array(_) => return Err(ctx.invalid("in requires at least one value")),
                    scalar => vec![scalar],
                };
                Ok(NumericTest::In(
                    items
                        .into_iter()
                        .map(|item| ctx.number(item))
                        .collect::<Result<Vec<_>>>()?,
                ))
            }
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte | Operator::Between => {
                ctx.numeric_test(&having.value)
            }
            Operator::Contains | Operator::NotContains | Operator::IsNull => {
                Err(QueryValidationError::MalformedShape {
                    shape: "drive",
                    reason: format!("having does not support '{}'", having.operator),
                })
            }
        }
    }

    fn compile_rank(&self, rank: &RankQuery) -> Result<CompiledQuery> {
        let column = self.column(&rank.column)?;
        if rank.limit == 0 {
            return Err(QueryValidationError::MalformedShape {
                shape: "rank",
                reason: "limit must be at least 1".to_string(),
            });
        }
        if rank.nth == Some(0) {
            return Err(QueryValidationError::MalformedShape {
                shape: "rank",
                reason: "nth is 1-based".to_string(),
            });
        }

        let group_by = rank
            .group_by
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledQuery::Rank {
            filters: self.compile_group(&rank.filters)?,
            column,
            descending: rank.direction == RankDirection::Desc,
            limit: rank.limit,
            nth: rank.nth,
            group_by,
        })
    }

    fn numeric_column(&self, name: &str, function: &str) -> Result<Column> {
        let column = self.column(name)?;
        if column.column_type() != ColumnType::Numeric {
            return Err(QueryValidationError::OperatorNotSupported {
                column: name.to_string(),
                operator: function.to_string(),
                column_type: column.column_type().to_string(),
            });
        }
        Ok(column)
    }
}

/// Error context for one condition.
struct Ctx<'q> {
    column: &'q str,
    operator: Operator,
}

impl Ctx<'_> {
    fn invalid(&self, reason: impl Into<String>) -> QueryValidationError {
        QueryValidationError::InvalidValue {
            column: self.column.to_string(),
            operator: self.operator.to_string(),
            reason: reason.into(),
        }
    }

    fn unsupported(&self, column_type: ColumnType) -> QueryValidationError {
        QueryValidationError::OperatorNotSupported {
            column: self.column.to_string(),
            operator: self.operator.to_string(),
            column_type: column_type.to_string(),
        }
    }

    fn number(&self, value: &Value) -> Result<f64> {
        match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| self.invalid("number out of range")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| self.invalid(format!("'{}' is not a number", s))),
            other => Err(self.invalid(format!("expected a number, got {}", other))),
        }
    }

    fn numeric_test(&self, value: &Value) -> Result<NumericTest> {
        Ok(match self.operator {
            Operator::Gt => NumericTest::Gt(self.number(value)?),
            Operator::Gte => NumericTest::Gte(self.number(value)?),
            Operator::Lt => NumericTest::Lt(self.number(value)?),
            Operator::Lte => NumericTest::Lte(self.number(value)?),
            Operator::Between => {
                let (lo, hi) = match value {
                    Value::Array(items) if items.len() == 2 => {
                        (self.number(&items[0])?, self.number(&items[1])?)
                    }
                    _ => return Err(self.invalid("between takes [low, high]")),
                };
                if lo > hi {
                    return Err(self.invalid(format!("low bound {} exceeds high bound {}", lo, hi)));
                }
                NumericTest::Between(lo, hi)
            }
            _ => return Err(self.invalid("not a range operator")),
        })
    }

    /// Coerce a JSON literal to the column's type.
    fn literal(&self, column_type: ColumnType, value: &Value) -> Result<Literal> {
        match column_type {
            ColumnType::Numeric => Ok(Literal::Number(self.number(value)?)),
            ColumnType::Boolean => match value {
                Value::Bool(b) => Ok(Literal::Bool(*b)),
                Value::Number(n) => match n.as_f64() {
                    Some(x) if x == 0.0 => Ok(Literal::Bool(false)),
                    Some(x) if x == 1.0 => Ok(Literal::Bool(true)),
                    _ => Err(self.invalid("boolean columns take true/false or 0/1")),
                },
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "1" => Ok(Literal::Bool(true)),
                    "false" | "0" => Ok(Literal::Bool(false)),
                    _ => Err(self.invalid(format!("'{}' is not a boolean", s))),
                },
                other => Err(self.invalid(format!("expected a boolean, got {}", other))),
            },
            ColumnType::String | ColumnType::Categorical => match value {
                Value::String(s) => Ok(Literal::Text(s.trim().to_lowercase())),
                Value::Number(n) => Ok(Literal::Text(n.to_string())),
                Value::Bool(b) => Ok(Literal::Text(b.to_string())),
                Value::Null => Err(self.invalid("use is_null to test for absent values")),
                other => Err(self.invalid(format!("expected a string, got {}", other))),
            },
        }
    }
}
