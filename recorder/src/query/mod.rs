//! Filter expression language.
//!
//! # Syntax Overview
//!
//! - **Name only**: `NAME` selects an item (or identifier) by name
//! - **Any equal**: `NAME=VALUE` at least one selected item has the value
//! - **All equal**: `NAME==VALUE` every selected item has the value
//! - **Regex**: `%PATTERN` as a name or value matches the whole string
//!
//! Values that parse as numbers compare numerically (`1` matches `1.0`).

use std::collections::HashSet;

mod expr;
mod filter;

pub use expr::{ExprError, NameValueExpr, NameValueExprs, NameValueOp, ParseOptions, REGEX_PREFIX};
pub use filter::{IdItemsExpr, IdItemsExprs, RowMatch};

/// Append names not already present, keeping first-seen order.
pub(crate) fn union_into<I>(dst: &mut Vec<String>, src: I)
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashSet<String> = dst.iter().cloned().collect();
    for name in src {
        if seen.insert(name.clone()) {
            dst.push(name);
        }
    }
}
