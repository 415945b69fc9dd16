use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::model::Document;

const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// Evaluates translator-produced filters against in-memory documents.
///
/// Supports plain equality (with array membership), the comparison operators
/// `$eq $ne $gt $gte $lt $lte $in $nin $exists`, the logical `$and $or $nor`
/// and proximity through `$nearSphere` / `$near` with `$maxDistance`.
pub struct FilterMatcher;

impl FilterMatcher {
    pub fn matches(document: &Document, filter: &Document) -> bool {
        filter
            .iter()
            .all(|(key, condition)| Self::matches_clause(document, key, condition))
    }

    fn matches_clause(document: &Document, key: &str, condition: &Value) -> bool {
        match key {
            "$and" => Self::sub_filters(condition).all(|f| Self::matches(document, f)),
            "$or" => Self::sub_filters(condition).any(|f| Self::matches(document, f)),
            "$nor" => !Self::sub_filters(condition).any(|f| Self::matches(document, f)),
            _ => {
                let value = lookup(document, key);
                match condition {
                    Value::Object(ops) if is_operator_object(ops) => ops
                        .iter()
                        .all(|(op, arg)| Self::apply_operator(value, op, arg, ops)),
                    _ => equals_or_contains(value, condition),
                }
            }
        }
    }

    fn sub_filters(condition: &Value) -> impl Iterator<Item = &Document> {
        condition
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    }

    fn apply_operator(value: Option<&Value>, op: &str, arg: &Value, ops: &Map<String, Value>) -> bool {
        match op {
            "$eq" => equals_or_contains(value, arg),
            "$ne" => !equals_or_contains(value, arg),
            "$gt" => Self::compare_any(value, arg, |o| o == Ordering::Greater),
            "$gte" => Self::compare_any(value, arg, |o| o != Ordering::Less),
            "$lt" => Self::compare_any(value, arg, |o| o == Ordering::Less),
            "$lte" => Self::compare_any(value, arg, |o| o != Ordering::Greater),
            "$in" => arg
                .as_array()
                .map(|candidates| candidates.iter().any(|c| equals_or_contains(value, c)))
                .unwrap_or(false),
            "$nin" => arg
                .as_array()
                .map(|candidates| !candidates.iter().any(|c| equals_or_contains(value, c)))
                .unwrap_or(true),
            "$exists" => value.is_some() == is_truthy(arg),
            "$nearSphere" | "$near" => {
                let Some((target, inner_max)) = near_target(arg) else {
                    return false;
                };
                let max = inner_max.or_else(|| ops.get("$maxDistance").and_then(Value::as_f64));
                match value.and_then(point_of) {
                    Some(point) => max.map_or(true, |max| haversine(point, target) <= max),
                    None => false,
                }
            }
            // Consumed by the proximity operator above.
            "$maxDistance" | "$minDistance" => true,
            other => {
                log::debug!("Unsupported filter operator {}", other);
                false
            }
        }
    }

    fn compare_any<F>(value: Option<&Value>, arg: &Value, accept: F) -> bool
    where
        F: Fn(Ordering) -> bool,
    {
        match value {
            Some(Value::Array(items)) => items
                .iter()
                .any(|item| compare_values(item, arg).map(&accept).unwrap_or(false)),
            Some(value) => compare_values(value, arg).map(accept).unwrap_or(false),
            None => false,
        }
    }

    /// The field and target point of the first proximity clause in `filter`.
    pub fn near_clause(filter: &Document) -> Option<(String, (f64, f64))> {
        filter.iter().find_map(|(field, condition)| {
            let ops = condition.as_object()?;
            let arg = ops.get("$nearSphere").or_else(|| ops.get("$near"))?;
            near_target(arg).map(|(target, _)| (field.clone(), target))
        })
    }

    /// Distance in meters between the point stored at `field` and `target`.
    pub fn distance(document: &Document, field: &str, target: (f64, f64)) -> Option<f64> {
        lookup(document, field)
            .and_then(point_of)
            .map(|point| haversine(point, target))
    }
}

fn is_operator_object(ops: &Map<String, Value>) -> bool {
    !ops.is_empty() && ops.keys().all(|key| key.starts_with('$'))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(s) => !(s.is_empty() || s == "false" || s == "0"),
        Value::Null => false,
        _ => true,
    }
}

/// Resolve a dotted path such as `address.city`.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn equals_or_contains(value: Option<&Value>, condition: &Value) -> bool {
    match value {
        None => condition.is_null(),
        Some(array @ Value::Array(items)) => {
            loose_equals(array, condition) || items.iter().any(|item| loose_equals(item, condition))
        }
        Some(value) => loose_equals(value, condition),
    }
}

/// Equality that lets query-string text match typed stored values.
pub fn loose_equals(stored: &Value, wanted: &Value) -> bool {
    match (stored, wanted) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match (n.as_f64(), s.trim().parse::<f64>()) {
                (Some(n), Ok(s)) => n == s,
                _ => false,
            }
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s == if *b { "true" } else { "false" }
        }
        _ => stored == wanted,
    }
}

/// Ordering between two scalars, numeric wherever both sides parse as numbers.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::Number(l), Value::String(r)) => l.as_f64()?.partial_cmp(&numeric(r)?),
        (Value::String(l), Value::Number(r)) => numeric(l)?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => match (numeric(l), numeric(r)) {
            (Some(lf), Some(rf)) => lf.partial_cmp(&rf),
            _ => Some(l.cmp(r)),
        },
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn numeric(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Total order used when sorting documents on a field.
///
/// Within strings, numeric ones sort first by value, then the rest by text.
pub fn sort_order(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }
    match (left, right) {
        (Some(Value::String(l)), Some(Value::String(r))) => match (numeric(l), numeric(r)) {
            (Some(l), Some(r)) => l.total_cmp(&r),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => l.cmp(r),
        },
        (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn pair(value: &Value) -> Option<(f64, f64)> {
    let coords = value.as_array()?;
    Some((coords.first()?.as_f64()?, coords.get(1)?.as_f64()?))
}

/// A stored location: either a GeoJSON point or a legacy `[lng, lat]` pair.
fn point_of(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Array(_) => pair(value),
        Value::Object(obj) => obj.get("coordinates").and_then(pair),
        _ => None,
    }
}

fn near_target(arg: &Value) -> Option<((f64, f64), Option<f64>)> {
    match arg {
        Value::Object(obj) => {
            let target = obj.get("$geometry").and_then(point_of).or_else(|| point_of(arg))?;
            Some((target, obj.get("$maxDistance").and_then(Value::as_f64)))
        }
        Value::Array(_) => pair(arg).map(|target| (target, None)),
        _ => None,
    }
}

/// Great-circle distance in meters between two `(lng, lat)` points.
pub fn haversine(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lng1, lat1) = (from.0.to_radians(), from.1.to_radians());
    let (lng2, lat2) = (to.0.to_radians(), to.1.to_radians());
    let a = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lng2 - lng1) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_tolerates_query_string_values() {
        let task = doc(json!({"description": "Task A", "done": false, "priority": 3}));
        assert!(FilterMatcher::matches(&task, &doc(json!({"done": "false"}))));
        assert!(FilterMatcher::matches(&task, &doc(json!({"priority": "3"}))));
        assert!(!FilterMatcher::matches(&task, &doc(json!({"done": "true"}))));
        assert!(!FilterMatcher::matches(&task, &doc(json!({"description": "Task B"}))));
    }

    #[test]
    fn equality_matches_array_members_and_missing_as_null() {
        let post = doc(json!({"tags": ["rust", "web"]}));
        assert!(FilterMatcher::matches(&post, &doc(json!({"tags": "rust"}))));
        assert!(!FilterMatcher::matches(&post, &doc(json!({"tags": "go"}))));
        assert!(FilterMatcher::matches(&post, &doc(json!({"author": null}))));
    }

    #[test]
    fn comparison_operators() {
        let item = doc(json!({"price": 75, "name": "chair"}));
        assert!(FilterMatcher::matches(&item, &doc(json!({"price": {"$gt": 50, "$lte": 75}}))));
        assert!(FilterMatcher::matches(&item, &doc(json!({"price": {"$lt": "100"}}))));
        assert!(!FilterMatcher::matches(&item, &doc(json!({"price": {"$lt": "50"}}))));
        assert!(FilterMatcher::matches(&item, &doc(json!({"name": {"$in": ["desk", "chair"]}}))));
        assert!(FilterMatcher::matches(&item, &doc(json!({"name": {"$nin": ["desk"]}}))));
        assert!(FilterMatcher::matches(&item, &doc(json!({"owner": {"$exists": false}}))));
        assert!(!FilterMatcher::matches(&item, &doc(json!({"price": {"$bogus": 1}}))));
    }

    #[test]
    fn logical_operators() {
        let item = doc(json!({"price": 75, "name": "chair"}));
        let either = doc(json!({"$or": [{"name": "desk"}, {"price": 75}]}));
        let neither = doc(json!({"$nor": [{"name": "chair"}]}));
        assert!(FilterMatcher::matches(&item, &either));
        assert!(!FilterMatcher::matches(&item, &neither));
    }

    #[test]
    fn dotted_paths_reach_nested_objects() {
        let place = doc(json!({"address": {"city": "Oslo"}}));
        assert!(FilterMatcher::matches(&place, &doc(json!({"address.city": "Oslo"}))));
    }

    #[test]
    fn near_sphere_honours_max_distance() {
        // Oslo and Stockholm are roughly 417 km apart.
        let oslo = doc(json!({"location": {"type": "Point", "coordinates": [10.7522, 59.9139]}}));
        let near_stockholm = |max: f64| {
            doc(json!({"location": {"$nearSphere": {
                "$geometry": {"type": "Point", "coordinates": [18.0686, 59.3293]},
                "$maxDistance": max
            }}}))
        };
        assert!(FilterMatcher::matches(&oslo, &near_stockholm(500_000.0)));
        assert!(!FilterMatcher::matches(&oslo, &near_stockholm(100_000.0)));

        let clause = FilterMatcher::near_clause(&near_stockholm(1.0));
        assert_eq!(clause, Some(("location".to_string(), (18.0686, 59.3293))));
        let distance = FilterMatcher::distance(&oslo, "location", (18.0686, 59.3293)).unwrap();
        assert!((400_000.0..430_000.0).contains(&distance), "{distance}");
    }

    #[test]
    fn sort_order_ranks_types_then_values() {
        assert_eq!(sort_order(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
        assert_eq!(sort_order(Some(&json!(5)), Some(&json!("a"))), Ordering::Less);
    }

    #[test]
    fn numeric_strings_sort_before_text() {
        let mut values = vec![json!("1a"), json!("10"), json!("NaN"), json!("9"), json!("b")];
        values.sort_by(|a, b| sort_order(Some(a), Some(b)));
        assert_eq!(values, vec![json!("9"), json!("10"), json!("1a"), json!("NaN"), json!("b")]);

        assert_eq!(sort_order(Some(&json!("NaN")), Some(&json!("1"))), Ordering::Greater);
        assert_eq!(compare_values(&json!("NaN"), &json!(1)), None);
    }
}
