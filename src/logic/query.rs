use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::QueryError;
use crate::model::Document;
use crate::store::{QueryOptions, SortKey};

pub const COUNT_PARAM: &str = "__count";
pub const POPULATE_PARAM: &str = "__populate";
pub const SORT_PARAM: &str = "__sort";
pub const SKIP_PARAM: &str = "__skip";
pub const LIMIT_PARAM: &str = "__limit";
pub const NEAR_PARAM: &str = "__near";

/// A search ready to hand to the storage engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub filter: Document,
    /// Resolve to the number of matches instead of the matches themselves.
    pub count: bool,
    pub options: QueryOptions,
}

/// Turn raw query-string pairs into a filter and query modifiers.
///
/// Reserved `__` parameters are consumed; every other key becomes an equality
/// clause, or a structured clause when its value is a `{...}` JSON literal.
/// `geo_field` is the model's geospatial field, required by `__near`.
pub fn translate(
    raw: &HashMap<String, String>,
    geo_field: Option<&str>,
) -> Result<SearchQuery, QueryError> {
    let mut fields = raw.clone();
    let count = fields.remove(COUNT_PARAM).is_some();
    let populate = fields.remove(POPULATE_PARAM);
    let sort = fields.remove(SORT_PARAM);
    let skip = fields.remove(SKIP_PARAM);
    let limit = fields.remove(LIMIT_PARAM);
    let near = fields.remove(NEAR_PARAM);

    let mut filter = Document::new();
    for (field, value) in fields {
        filter.insert(field.clone(), decode_value(&field, &value)?);
    }

    if let Some(near) = near {
        let geo_field = geo_field.ok_or(QueryError::GeoIndexNotFound)?;
        filter.insert(geo_field.to_string(), near_clause(&near)?);
    }

    let options = if count {
        QueryOptions::default()
    } else {
        QueryOptions {
            sort: sort.as_deref().map(parse_sort).unwrap_or_default(),
            skip: skip.as_deref().map(|v| parse_usize(SKIP_PARAM, v)).transpose()?,
            limit: limit.as_deref().map(|v| parse_usize(LIMIT_PARAM, v)).transpose()?,
            populate: populate.as_deref().map(parse_populate).unwrap_or_default(),
        }
    };

    Ok(SearchQuery {
        filter,
        count,
        options,
    })
}

/// `{...}` literals become structured clauses; anything else stays a string.
fn decode_value(field: &str, value: &str) -> Result<Value, QueryError> {
    if value.starts_with('{') && value.ends_with('}') {
        serde_json::from_str(value).map_err(|err| QueryError::InvalidJson {
            field: field.to_string(),
            message: err.to_string(),
        })
    } else {
        Ok(Value::String(value.to_string()))
    }
}

/// `lng,lat[,maxDistance]` into a spherical proximity clause.
pub fn near_clause(raw: &str) -> Result<Value, QueryError> {
    let coordinates = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| QueryError::InvalidCoordinate {
                    value: part.trim().to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (point, max_distance) = match coordinates.as_slice() {
        [lng, lat] => ([*lng, *lat], None),
        [lng, lat, max] => ([*lng, *lat], Some(*max)),
        other => {
            return Err(QueryError::CoordinateCount { count: other.len() });
        }
    };

    let mut near = json!({
        "$geometry": {
            "type": "Point",
            "coordinates": point,
        }
    });
    if let (Some(max), Some(obj)) = (max_distance, near.as_object_mut()) {
        obj.insert("$maxDistance".to_string(), json!(max));
    }
    Ok(json!({ "$nearSphere": near }))
}

/// `-created name` or `-created,name`: a leading `-` sorts descending.
pub fn parse_sort(raw: &str) -> Vec<SortKey> {
    split_list(raw)
        .map(|key| match key.strip_prefix('-') {
            Some(field) => SortKey {
                field: field.to_string(),
                descending: true,
            },
            None => SortKey {
                field: key.trim_start_matches('+').to_string(),
                descending: false,
            },
        })
        .filter(|key| !key.field.is_empty())
        .collect()
}

pub fn parse_populate(raw: &str) -> Vec<String> {
    split_list(raw).map(str::to_string).collect()
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
}

fn parse_usize(param: &str, value: &str) -> Result<usize, QueryError> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryError::InvalidModifier {
            param: param.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn plain_keys_become_equality_clauses() {
        let query = translate(&params(&[("done", "false"), ("owner", "alice")]), None).unwrap();
        assert_eq!(
            Value::Object(query.filter),
            json!({"done": "false", "owner": "alice"})
        );
        assert!(!query.count);
        assert_eq!(query.options, QueryOptions::default());
    }

    #[test]
    fn json_literals_become_structured_clauses() {
        let query = translate(&params(&[("price", r#"{"$gte": 10, "$lt": 20}"#)]), None).unwrap();
        assert_eq!(query.filter["price"], json!({"$gte": 10, "$lt": 20}));

        let err = translate(&params(&[("price", "{oops}")]), None).unwrap_err();
        assert!(matches!(err, QueryError::InvalidJson { field, .. } if field == "price"));
    }

    #[test]
    fn reserved_parameters_are_stripped_into_options() {
        let query = translate(
            &params(&[
                ("__sort", "-createdAt name"),
                ("__skip", "10"),
                ("__limit", "5"),
                ("__populate", "owner,watchers"),
                ("title", "x"),
            ]),
            None,
        )
        .unwrap();

        assert_eq!(Value::Object(query.filter), json!({"title": "x"}));
        assert_eq!(
            query.options.sort,
            vec![
                SortKey {
                    field: "createdAt".into(),
                    descending: true
                },
                SortKey {
                    field: "name".into(),
                    descending: false
                },
            ]
        );
        assert_eq!(query.options.skip, Some(10));
        assert_eq!(query.options.limit, Some(5));
        assert_eq!(query.options.populate, vec!["owner", "watchers"]);
    }

    #[test]
    fn count_flag_is_presence_and_drops_modifiers() {
        let query = translate(&params(&[("__count", ""), ("__limit", "5")]), None).unwrap();
        assert!(query.count);
        assert_eq!(query.options, QueryOptions::default());
        assert!(query.filter.is_empty());
    }

    #[test]
    fn malformed_modifiers_fail() {
        let err = translate(&params(&[("__skip", "ten")]), None).unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidModifier {
                param: "__skip".into(),
                value: "ten".into()
            }
        );
    }

    #[test]
    fn near_requires_a_geo_field() {
        let err = translate(&params(&[("__near", "10,59")]), None).unwrap_err();
        assert_eq!(err, QueryError::GeoIndexNotFound);
    }

    #[test]
    fn near_builds_a_proximity_clause() {
        let query = translate(&params(&[("__near", "10.75, 59.91")]), Some("location")).unwrap();
        assert_eq!(
            query.filter["location"],
            json!({"$nearSphere": {"$geometry": {"type": "Point", "coordinates": [10.75, 59.91]}}})
        );

        let query = translate(&params(&[("__near", "10,59,1500")]), Some("location")).unwrap();
        assert_eq!(
            query.filter["location"]["$nearSphere"]["$maxDistance"],
            json!(1500.0)
        );
    }

    #[test]
    fn near_rejects_bad_coordinates() {
        let err = translate(&params(&[("__near", "10,north")]), Some("loc")).unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidCoordinate {
                value: "north".into()
            }
        );
        let err = translate(&params(&[("__near", "10")]), Some("loc")).unwrap_err();
        assert_eq!(err, QueryError::CoordinateCount { count: 1 });
    }
}
