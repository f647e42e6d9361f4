//! Aggregation pipelines.
//!
//! A pipeline is an ordered list of single-key stage objects:
//!
//! ```text
//! [ {"$match": {"status.fill_level": {"$gt": 80}}},
//!   {"$group": {"_id": "$location.address", "bins": {"$count": {}}}},
//!   {"$sort": {"bins": -1}},
//!   {"$limit": 5} ]
//! ```
//!
//! Supported stages: `$match`, `$project`, `$group`, `$sort`, `$skip`,
//! `$limit`, `$count`, `$unwind`. Backends may push a leading `$match` into
//! their native query and run the remaining stages with [`Pipeline::run`].

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Number, Value};

use binsight_core::FieldMap;

use crate::error::PersistenceError;
use crate::filter::DocumentFilter;
use crate::types::SortKey;
use crate::value::{compare_for_sort, get_path, remove_field, set_field, split_path};

/// Expression evaluated against an input document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `"$a.b"`: value at a path (`null` when missing).
    Path(String),
    /// Any other JSON value, used as-is.
    Literal(Value),
    /// Object whose members are expressions.
    Object(Vec<(String, Expr)>),
}

impl Expr {
    fn parse(value: &Value) -> Result<Self, PersistenceError> {
        match value {
            Value::String(s) if s.starts_with('$') => {
                let path = &s[1..];
                split_path(path)?;
                Ok(Self::Path(path.to_string()))
            }
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), Self::parse(v)?)))
                .collect::<Result<Vec<_>, PersistenceError>>()
                .map(Self::Object),
            other => Ok(Self::Literal(other.clone())),
        }
    }

    fn resolve<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        match self {
            Self::Path(path) => get_path(doc, path),
            _ => None,
        }
    }

    fn eval(&self, doc: &Value) -> Value {
        match self {
            Self::Path(path) => get_path(doc, path).cloned().unwrap_or(Value::Null),
            Self::Literal(value) => value.clone(),
            Self::Object(members) => Value::Object(
                members
                    .iter()
                    .map(|(k, e)| (k.clone(), e.eval(doc)))
                    .collect(),
            ),
        }
    }

    /// Like [`Expr::eval`] but distinguishes a missing path.
    fn eval_present(&self, doc: &Value) -> Option<Value> {
        match self {
            Self::Path(_) => self.resolve(doc).cloned(),
            _ => Some(self.eval(doc)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ProjectionField {
    Include,
    Exclude,
    Computed(Expr),
}

/// A `$project` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    fields: Vec<(String, ProjectionField)>,
    inclusive: bool,
    exclude_id: bool,
}

impl Projection {
    fn parse(spec: &Value) -> Result<Self, PersistenceError> {
        let Value::Object(map) = spec else {
            return Err(PersistenceError::invalid_query("$project expects an object"));
        };
        if map.is_empty() {
            return Err(PersistenceError::invalid_query(
                "$project must name at least one field",
            ));
        }

        let mut fields = Vec::with_capacity(map.len());
        let mut exclude_id = false;
        for (path, value) in map {
            split_path(path)?;
            let field = match value {
                Value::Bool(true) => ProjectionField::Include,
                Value::Bool(false) => ProjectionField::Exclude,
                Value::Number(n) if n.as_f64() == Some(0.0) => ProjectionField::Exclude,
                Value::Number(_) => ProjectionField::Include,
                other => ProjectionField::Computed(Expr::parse(other)?),
            };
            if path == "_id" {
                match field {
                    ProjectionField::Exclude => {
                        exclude_id = true;
                        continue;
                    }
                    ProjectionField::Include => continue,
                    ProjectionField::Computed(_) => {}
                }
            }
            fields.push((path.clone(), field));
        }

        let excludes = fields
            .iter()
            .filter(|(_, f)| *f == ProjectionField::Exclude)
            .count();
        if excludes > 0 && excludes < fields.len() {
            return Err(PersistenceError::invalid_query(
                "$project cannot mix inclusion and exclusion",
            ));
        }
        let inclusive = excludes == 0 && !fields.is_empty();
        Ok(Self {
            fields,
            inclusive,
            exclude_id,
        })
    }

    fn apply(&self, doc: Value) -> Result<Value, PersistenceError> {
        let mut source = match doc {
            Value::Object(map) => map,
            other => return Ok(other),
        };

        if !self.inclusive {
            for (path, _) in &self.fields {
                remove_field(&mut source, path);
            }
            if self.exclude_id {
                source.remove("_id");
            }
            return Ok(Value::Object(source));
        }

        let source = Value::Object(source);
        let mut out = FieldMap::new();
        if !self.exclude_id {
            if let Some(id) = source.get("_id") {
                out.insert("_id".to_string(), id.clone());
            }
        }
        for (path, field) in &self.fields {
            match field {
                ProjectionField::Include => {
                    if let Some(value) = get_path(&source, path) {
                        set_field(&mut out, path, value.clone())?;
                    }
                }
                ProjectionField::Computed(expr) => {
                    if let Some(value) = expr.eval_present(&source) {
                        set_field(&mut out, path, value)?;
                    }
                }
                ProjectionField::Exclude => {}
            }
        }
        Ok(Value::Object(out))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccumulatorKind {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    Count,
}

#[derive(Debug, Clone, PartialEq)]
struct Accumulator {
    name: String,
    kind: AccumulatorKind,
    expr: Expr,
}

/// A `$group` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    key: Expr,
    accumulators: Vec<Accumulator>,
}

impl GroupSpec {
    fn parse(spec: &Value) -> Result<Self, PersistenceError> {
        let Value::Object(map) = spec else {
            return Err(PersistenceError::invalid_query("$group expects an object"));
        };
        let key = map
            .get("_id")
            .ok_or_else(|| PersistenceError::invalid_query("$group requires an _id"))
            .and_then(Expr::parse)?;

        let mut accumulators = Vec::new();
        for (name, value) in map.iter().filter(|(k, _)| k.as_str() != "_id") {
            let (op, operand) = single_entry(value).ok_or_else(|| {
                PersistenceError::invalid_query(format!(
                    "$group field '{name}' must be a single accumulator object"
                ))
            })?;
            let kind = match op {
                "$sum" => AccumulatorKind::Sum,
                "$avg" => AccumulatorKind::Avg,
                "$min" => AccumulatorKind::Min,
                "$max" => AccumulatorKind::Max,
                "$first" => AccumulatorKind::First,
                "$last" => AccumulatorKind::Last,
                "$push" => AccumulatorKind::Push,
                "$count" => AccumulatorKind::Count,
                other => {
                    return Err(PersistenceError::invalid_query(format!(
                        "unknown accumulator '{other}'"
                    )));
                }
            };
            accumulators.push(Accumulator {
                name: name.clone(),
                kind,
                expr: Expr::parse(operand)?,
            });
        }
        Ok(Self { key, accumulators })
    }

    fn apply(&self, docs: Vec<Value>) -> Vec<Value> {
        let mut order: Vec<(Value, Vec<AccState>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for doc in &docs {
            let key = self.key.eval(doc);
            let slot = *index.entry(key.to_string()).or_insert_with(|| {
                order.push((
                    key.clone(),
                    self.accumulators.iter().map(|a| AccState::new(a.kind)).collect(),
                ));
                order.len() - 1
            });
            for (acc, state) in self.accumulators.iter().zip(order[slot].1.iter_mut()) {
                state.feed(acc.expr.eval_present(doc));
            }
        }

        order
            .into_iter()
            .map(|(key, states)| {
                let mut out = FieldMap::new();
                out.insert("_id".to_string(), key);
                for (acc, state) in self.accumulators.iter().zip(states) {
                    out.insert(acc.name.clone(), state.finish());
                }
                Value::Object(out)
            })
            .collect()
    }
}

#[derive(Debug)]
enum AccState {
    Sum { total: f64, float: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Option<Value>),
    Push(Vec<Value>),
    Count(u64),
}

impl AccState {
    fn new(kind: AccumulatorKind) -> Self {
        match kind {
            AccumulatorKind::Sum => Self::Sum {
                total: 0.0,
                float: false,
            },
            AccumulatorKind::Avg => Self::Avg { total: 0.0, count: 0 },
            AccumulatorKind::Min => Self::Min(None),
            AccumulatorKind::Max => Self::Max(None),
            AccumulatorKind::First => Self::First(None),
            AccumulatorKind::Last => Self::Last(None),
            AccumulatorKind::Push => Self::Push(Vec::new()),
            AccumulatorKind::Count => Self::Count(0),
        }
    }

    fn feed(&mut self, value: Option<Value>) {
        match self {
            Self::Sum { total, float } => {
                if let Some(Value::Number(n)) = &value {
                    *float |= !(n.is_i64() || n.is_u64());
                    *total += n.as_f64().unwrap_or(0.0);
                }
            }
            Self::Avg { total, count } => {
                if let Some(n) = value.as_ref().and_then(Value::as_f64) {
                    *total += n;
                    *count += 1;
                }
            }
            Self::Min(current) => keep_extreme(current, value, Ordering::Less),
            Self::Max(current) => keep_extreme(current, value, Ordering::Greater),
            Self::First(current) => {
                if current.is_none() {
                    *current = Some(value.unwrap_or(Value::Null));
                }
            }
            Self::Last(current) => *current = Some(value.unwrap_or(Value::Null)),
            Self::Push(items) => items.extend(value),
            Self::Count(n) => *n += 1,
        }
    }

    fn finish(self) -> Value {
        match self {
            Self::Sum { total, float } => number(total, float),
            Self::Avg { total, count } if count > 0 => number(total / count as f64, true),
            Self::Avg { .. } => Value::Null,
            Self::Min(v) | Self::Max(v) | Self::First(v) | Self::Last(v) => {
                v.unwrap_or(Value::Null)
            }
            Self::Push(items) => Value::Array(items),
            Self::Count(n) => Value::from(n),
        }
    }
}

fn keep_extreme(current: &mut Option<Value>, value: Option<Value>, wanted: Ordering) {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return;
    };
    let replace = current
        .as_ref()
        .is_none_or(|existing| compare_for_sort(Some(&value), Some(existing)) == wanted);
    if replace {
        *current = Some(value);
    }
}

fn number(value: f64, float: bool) -> Value {
    if !float && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Value::from(value as i64);
    }
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn single_entry(value: &Value) -> Option<(&str, &Value)> {
    match value {
        Value::Object(map) if map.len() == 1 => map.iter().next().map(|(k, v)| (k.as_str(), v)),
        _ => None,
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(DocumentFilter),
    Project(Projection),
    Group(GroupSpec),
    Sort(Vec<SortKey>),
    Skip(u64),
    Limit(u64),
    Count(String),
    Unwind(String),
}

impl Stage {
    fn parse(value: &Value) -> Result<Self, PersistenceError> {
        let (name, spec) = single_entry(value).ok_or_else(|| {
            PersistenceError::invalid_query("each pipeline stage must be a single-key object")
        })?;
        match name {
            "$match" => Ok(Self::Match(DocumentFilter::parse(spec)?)),
            "$project" => Ok(Self::Project(Projection::parse(spec)?)),
            "$group" => Ok(Self::Group(GroupSpec::parse(spec)?)),
            "$sort" => Ok(Self::Sort(SortKey::parse_spec(spec)?)),
            "$skip" => Ok(Self::Skip(non_negative(name, spec)?)),
            "$limit" => Ok(Self::Limit(non_negative(name, spec)?)),
            "$count" => match spec {
                Value::String(field) if !field.is_empty() && !field.starts_with('$') => {
                    Ok(Self::Count(field.clone()))
                }
                _ => Err(PersistenceError::invalid_query(
                    "$count expects a non-empty field name",
                )),
            },
            "$unwind" => match spec {
                Value::String(path) if path.starts_with('$') => {
                    split_path(&path[1..])?;
                    Ok(Self::Unwind(path[1..].to_string()))
                }
                _ => Err(PersistenceError::invalid_query(
                    "$unwind expects a \"$path\" string",
                )),
            },
            other => Err(PersistenceError::invalid_query(format!(
                "unknown pipeline stage '{other}'"
            ))),
        }
    }

    fn apply(&self, docs: Vec<Value>) -> Result<Vec<Value>, PersistenceError> {
        Ok(match self {
            Self::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Self::Project(projection) => docs
                .into_iter()
                .map(|d| projection.apply(d))
                .collect::<Result<Vec<_>, _>>()?,
            Self::Group(group) => group.apply(docs),
            Self::Sort(keys) => sort_documents(docs, keys, false),
            Self::Skip(n) => docs
                .into_iter()
                .skip(usize::try_from(*n).unwrap_or(usize::MAX))
                .collect(),
            Self::Limit(n) => docs
                .into_iter()
                .take(usize::try_from(*n).unwrap_or(usize::MAX))
                .collect(),
            Self::Count(field) => {
                let mut out = FieldMap::new();
                out.insert(field.clone(), Value::from(docs.len() as u64));
                vec![Value::Object(out)]
            }
            Self::Unwind(path) => unwind(docs, path)?,
        })
    }
}

fn non_negative(stage: &str, spec: &Value) -> Result<u64, PersistenceError> {
    spec.as_u64().ok_or_else(|| {
        PersistenceError::invalid_query(format!("{stage} expects a non-negative integer"))
    })
}

fn unwind(docs: Vec<Value>, path: &str) -> Result<Vec<Value>, PersistenceError> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match get_path(&doc, path) {
            Some(Value::Array(items)) => {
                for item in items.clone() {
                    let Value::Object(mut copy) = doc.clone() else {
                        continue;
                    };
                    set_field(&mut copy, path, item)?;
                    out.push(Value::Object(copy));
                }
            }
            None | Some(Value::Null) => {}
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

/// Sorts documents by `keys`, optionally breaking ties by `_id`.
pub fn sort_documents(mut docs: Vec<Value>, keys: &[SortKey], tie_break_by_id: bool) -> Vec<Value> {
    docs.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ord = compare_for_sort(get_path(a, &key.path), get_path(b, &key.path));
                if key.is_descending() { ord.reverse() } else { ord }
            })
            .find(|o| o.is_ne())
            .unwrap_or_else(|| {
                if tie_break_by_id {
                    compare_for_sort(a.get("_id"), b.get("_id"))
                } else {
                    Ordering::Equal
                }
            })
    });
    docs
}

/// An ordered list of aggregation stages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Parses a JSON array of stages.
    pub fn parse(pipeline: &Value) -> Result<Self, PersistenceError> {
        let Value::Array(stages) = pipeline else {
            return Err(PersistenceError::invalid_query("pipeline must be an array"));
        };
        Ok(Self {
            stages: stages.iter().map(Stage::parse).collect::<Result<_, _>>()?,
        })
    }

    /// Returns the stages in order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Splits off a leading `$match`, which a backend can evaluate natively.
    #[must_use]
    pub fn split_leading_match(&self) -> (Option<&DocumentFilter>, Pipeline) {
        match self.stages.split_first() {
            Some((Stage::Match(filter), rest)) => (
                Some(filter),
                Pipeline {
                    stages: rest.to_vec(),
                },
            ),
            _ => (None, self.clone()),
        }
    }

    /// Runs every stage over `docs` in order.
    pub fn run(&self, docs: Vec<Value>) -> Result<Vec<Value>, PersistenceError> {
        self.stages
            .iter()
            .try_fold(docs, |docs, stage| stage.apply(docs))
    }
}

impl TryFrom<Value> for Pipeline {
    type Error = PersistenceError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bins() -> Vec<Value> {
        vec![
            json!({"_id": "a", "zone": "north", "fill": 90, "tags": ["glass", "metal"]}),
            json!({"_id": "b", "zone": "south", "fill": 40, "tags": []}),
            json!({"_id": "c", "zone": "north", "fill": 70}),
            json!({"_id": "d", "zone": "east", "fill": 85.5, "tags": ["plastic"]}),
        ]
    }

    fn run(pipeline: Value) -> Vec<Value> {
        Pipeline::parse(&pipeline).unwrap().run(bins()).unwrap()
    }

    #[test]
    fn test_match_then_count() {
        let out = run(json!([
            {"$match": {"fill": {"$gt": 80}}},
            {"$count": "critical"}
        ]));
        assert_eq!(out, vec![json!({"critical": 2})]);
    }

    #[test]
    fn test_group_in_first_seen_order() {
        let out = run(json!([
            {"$group": {
                "_id": "$zone",
                "total": {"$sum": "$fill"},
                "bins": {"$count": {}},
                "max": {"$max": "$fill"},
                "ids": {"$push": "$_id"}
            }}
        ]));
        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["_id"], "north");
        assert_eq!(out[0]["total"], 160);
        assert_eq!(out[0]["bins"], 2);
        assert_eq!(out[0]["max"], 90);
        assert_eq!(out[0]["ids"], json!(["a", "c"]));
        assert_eq!(out[1]["_id"], "south");
        assert_eq!(out[2]["total"], 85.5);
    }

    #[test]
    fn test_group_null_key_and_avg() {
        let out = run(json!([
            {"$group": {"_id": null, "avg": {"$avg": "$fill"}, "first": {"$first": "$_id"}}}
        ]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["_id"], Value::Null);
        assert_eq!(out[0]["avg"], 71.375);
        assert_eq!(out[0]["first"], "a");
    }

    #[test]
    fn test_sort_skip_limit() {
        let out = run(json!([
            {"$sort": {"fill": -1}},
            {"$skip": 1},
            {"$limit": 2},
            {"$project": {"fill": 1}}
        ]));
        assert_eq!(
            out,
            vec![json!({"_id": "d", "fill": 85.5}), json!({"_id": "c", "fill": 70})]
        );
    }

    #[test]
    fn test_project_exclusion_and_rename() {
        let out = run(json!([
            {"$limit": 1},
            {"$project": {"tags": 0, "_id": 0}}
        ]));
        assert_eq!(out, vec![json!({"zone": "north", "fill": 90})]);

        let out = run(json!([
            {"$limit": 1},
            {"$project": {"area": "$zone", "_id": false}}
        ]));
        assert_eq!(out, vec![json!({"area": "north"})]);
    }

    #[test]
    fn test_unwind() {
        let out = run(json!([
            {"$unwind": "$tags"},
            {"$project": {"tags": 1}}
        ]));
        assert_eq!(
            out,
            vec![
                json!({"_id": "a", "tags": "glass"}),
                json!({"_id": "a", "tags": "metal"}),
                json!({"_id": "d", "tags": "plastic"}),
            ]
        );
    }

    #[test]
    fn test_split_leading_match() {
        let pipeline = Pipeline::parse(&json!([
            {"$match": {"zone": "north"}},
            {"$count": "n"}
        ]))
        .unwrap();
        let (filter, rest) = pipeline.split_leading_match();
        assert_eq!(filter, Some(&DocumentFilter::eq("zone", "north")));
        assert_eq!(rest.stages().len(), 1);
    }

    #[test]
    fn test_invalid_pipelines() {
        for bad in [
            json!({"$match": {}}),
            json!([{"$lookup": {}}]),
            json!([{"$match": {}, "$limit": 1}]),
            json!([{"$limit": -1}]),
            json!([{"$group": {"total": {"$sum": 1}}}]),
            json!([{"$group": {"_id": null, "x": {"$median": "$a"}}}]),
            json!([{"$project": {"a": 1, "b": 0}}]),
            json!([{"$unwind": "tags"}]),
        ] {
            let err = Pipeline::parse(&bad).unwrap_err();
            assert!(err.is_invalid_input(), "accepted {bad}");
        }
    }
}
