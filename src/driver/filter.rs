//! Row filters built from key documents
//!
//! A key document such as `{id: 1, tenant: "a"}` is an AND of equality
//! terms; a list of key documents is an OR over those conjunctions. The
//! same filter renders to a document-store query or to a SQL `WHERE`
//! clause with bound parameters.

use bson::{doc, Bson, Document};

/// SQL flavor, for identifier quoting and placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    /// Quote a possibly schema-qualified identifier.
    pub fn quote(&self, name: &str) -> String {
        name.split('.')
            .map(|part| match self {
                Dialect::MySql => format!("`{}`", part.replace('`', "``")),
                Dialect::Postgres => format!("\"{}\"", part.replace('"', "\"\"")),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Push a parameter and return its placeholder.
    pub fn placeholder(&self, params: &mut Vec<Bson>, value: Bson) -> String {
        params.push(value);
        match self {
            Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${}", params.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Bson),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Every field of `key` must match.
    pub fn key(key: &Document) -> Filter {
        Filter::And(
            key.iter()
                .map(|(field, value)| Filter::Eq(field.clone(), value.clone()))
                .collect(),
        )
    }

    /// Any one of `keys` matches.
    pub fn any_of(keys: &[Document]) -> Filter {
        Filter::Or(keys.iter().map(Filter::key).collect())
    }

    pub fn to_document(&self) -> Document {
        match self {
            Filter::Eq(field, value) => {
                let mut term = Document::new();
                term.insert(field.clone(), value.clone());
                term
            }
            Filter::And(terms) => doc! {
                "$and": terms.iter().map(|t| Bson::Document(t.to_document())).collect::<Vec<_>>(),
            },
            Filter::Or(terms) => doc! {
                "$or": terms.iter().map(|t| Bson::Document(t.to_document())).collect::<Vec<_>>(),
            },
        }
    }

    /// Render a `WHERE` clause body, appending bound values to `params`.
    pub fn to_sql(&self, dialect: Dialect, params: &mut Vec<Bson>) -> String {
        match self {
            Filter::Eq(field, Bson::Null) => format!("{} IS NULL", dialect.quote(field)),
            Filter::Eq(field, value) => {
                let column = dialect.quote(field);
                format!("{} = {}", column, dialect.placeholder(params, value.clone()))
            }
            Filter::And(terms) if terms.is_empty() => "1 = 1".to_string(),
            Filter::Or(terms) if terms.is_empty() => "1 = 0".to_string(),
            Filter::And(terms) => join(terms, " AND ", dialect, params),
            Filter::Or(terms) => join(terms, " OR ", dialect, params),
        }
    }
}

fn join(terms: &[Filter], separator: &str, dialect: Dialect, params: &mut Vec<Bson>) -> String {
    let parts: Vec<String> = terms.iter().map(|t| t.to_sql(dialect, params)).collect();
    format!("({})", parts.join(separator))
}
