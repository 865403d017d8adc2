//! Condition and update expressions.
//!
//! Conditions are kept structured so the in-memory store can evaluate them directly;
//! `render()` produces the textual expression a remote store client sends.

use std::collections::BTreeMap;

use serde::Serialize;
use tablekit_core::{fields, AttrValue, Record};

/// Precondition on the item currently stored at a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Condition {
    /// No item exists at the key.
    NotExists,
    /// An item exists at the key.
    Exists,
    /// The stored item has `name` equal to `value`.
    AttributeEquals { name: String, value: AttrValue },
    And(Vec<Condition>),
}

/// A rendered expression with its name and value placeholders.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Expression {
    pub text: String,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, AttrValue>,
}

impl Condition {
    pub fn equals(name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Condition::AttributeEquals {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Evaluate against the item at the key (`None` when absent).
    pub fn matches(&self, item: Option<&Record>) -> bool {
        match self {
            Condition::NotExists => item.is_none(),
            Condition::Exists => item.is_some(),
            Condition::AttributeEquals { name, value } => {
                item.and_then(|r| r.get(name)).is_some_and(|v| v == value)
            }
            Condition::And(all) => all.iter().all(|c| c.matches(item)),
        }
    }

    pub fn render(&self) -> Expression {
        let mut expr = Expression::default();
        let text = self.render_into(&mut expr, &mut 0);
        expr.text = text;
        expr
    }

    fn render_into(&self, expr: &mut Expression, counter: &mut usize) -> String {
        match self {
            Condition::NotExists => format!(
                "attribute_not_exists({}) AND attribute_not_exists({})",
                fields::PK,
                fields::SK
            ),
            Condition::Exists => format!("attribute_exists({})", fields::PK),
            Condition::AttributeEquals { name, value } => {
                let placeholder = format!(":cond{counter}");
                *counter += 1;
                expr.names.insert(format!("#{name}"), name.clone());
                expr.values.insert(placeholder.clone(), value.clone());
                format!("#{name} = {placeholder}")
            }
            Condition::And(all) => all
                .iter()
                .map(|c| format!("({})", c.render_into(expr, counter)))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

/// Render `SET #F = :F, ...` for every attribute of `set`.
pub fn render_set(set: &Record) -> Expression {
    let mut expr = Expression::default();
    let assignments: Vec<String> = set
        .iter()
        .map(|(field, value)| {
            expr.names.insert(format!("#{field}"), field.clone());
            expr.values.insert(format!(":{field}"), value.clone());
            format!("#{field} = :{field}")
        })
        .collect();
    expr.text = format!("SET {}", assignments.join(", "));
    expr
}
