use chrono::{DateTime, SecondsFormat, Utc};
use url::form_urlencoded;

/// Single query-string value.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryValue {
    /// Omitted from the serialized string.
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Serialized as RFC 3339 with millisecond precision, UTC `Z`.
    Timestamp(DateTime<Utc>),
    /// Serialized as repeated `key=value` pairs in list order.
    List(Vec<QueryValue>),
}

impl QueryValue {
    fn render(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(value) => Some(value.clone()),
            Self::Integer(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Bool(value) => Some(value.to_string()),
            Self::Timestamp(value) => Some(value.to_rfc3339_opts(SecondsFormat::Millis, true)),
            // A list nested inside a list flattens to a comma-joined scalar.
            Self::List(items) => Some(
                items
                    .iter()
                    .filter_map(Self::render)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for QueryValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Insertion-ordered query mapping.
///
/// Order is preserved so the serialized string, and with it the cache key,
/// is deterministic for a given construction sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query(Vec<(String, QueryValue)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one key/value pair, builder style.
    pub fn pair(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn entries(&self) -> &[(String, QueryValue)] {
        &self.0
    }
}

impl<K: Into<String>, V: Into<QueryValue>, const N: usize> From<[(K, V); N]> for Query {
    fn from(pairs: [(K, V); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Serializes a query mapping into a canonical query string, without the
/// leading `?`.
///
/// `Null` entries and empty-string scalars are skipped, empty lists vanish,
/// list values become repeated `key=value` pairs in list order and
/// timestamps use RFC 3339 with millisecond precision.
pub fn build_query(query: Option<&Query>) -> String {
    let Some(query) = query else {
        return String::new();
    };

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in query.entries() {
        match value {
            QueryValue::Null => {}
            QueryValue::List(items) => {
                for item in items {
                    if let Some(text) = item.render() {
                        serializer.append_pair(key, &text);
                    }
                }
            }
            scalar => {
                if let Some(text) = scalar.render() {
                    if text.is_empty() {
                        continue;
                    }
                    serializer.append_pair(key, &text);
                }
            }
        }
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use url::form_urlencoded;

    use super::{build_query, Query, QueryValue};

    #[test]
    fn skips_null_and_empty_entries() {
        let query = Query::new()
            .pair("page", 2)
            .pair("search", "")
            .pair("artist", Option::<&str>::None)
            .pair("genres", Vec::<&str>::new());

        assert_eq!(build_query(Some(&query)), "page=2");
    }

    #[test]
    fn lists_become_repeated_pairs_in_order() {
        let query = Query::new().pair("genres", vec!["rock", "lo-fi"]).pair("page", 1);
        assert_eq!(build_query(Some(&query)), "genres=rock&genres=lo-fi&page=1");
    }

    #[test]
    fn timestamps_use_rfc3339_millis() {
        let at = DateTime::from_timestamp(1_714_564_800, 0).expect("valid timestamp");
        let query = Query::new().pair("since", at);
        assert_eq!(build_query(Some(&query)), "since=2024-05-01T12%3A00%3A00.000Z");
    }

    #[test]
    fn text_is_percent_encoded() {
        let query = Query::new().pair("search", "lofi beats");
        assert_eq!(build_query(Some(&query)), "search=lofi+beats");
    }

    #[test]
    fn output_is_stable_for_insertion_order() {
        let query = Query::from([("b", 1), ("a", 2)]);
        assert_eq!(build_query(Some(&query)), "b=1&a=2");
        assert_eq!(build_query(Some(&query)), "b=1&a=2");
    }

    #[test]
    fn none_serializes_to_empty() {
        assert_eq!(build_query(None), "");
    }

    #[test]
    fn round_trip_recovers_preserved_entries() {
        let query = Query::new()
            .pair("page", 2)
            .pair("search", "lofi beats")
            .pair("ids", vec![3, 5])
            .pair("skip", QueryValue::Null);

        let serialized = build_query(Some(&query));
        let parsed: Vec<(String, String)> = form_urlencoded::parse(serialized.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        assert_eq!(
            parsed,
            vec![
                ("page".to_owned(), "2".to_owned()),
                ("search".to_owned(), "lofi beats".to_owned()),
                ("ids".to_owned(), "3".to_owned()),
                ("ids".to_owned(), "5".to_owned()),
            ]
        );
    }
}
