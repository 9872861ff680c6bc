//! Compound row filters: an identifier expression plus item expressions.

use serde_json::Value;

use super::expr::{ExprError, NameValueExpr, NameValueExprs, ParseOptions};
use super::union_into;
use crate::schema::{ItemMap, ItemValue, LogRow};

/// Result of filtering one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMatch {
    pub matches: bool,
    /// Items requested by identifier-scoped expressions, minus global ones.
    pub own_items: ItemMap,
    /// Items requested by the global expressions.
    pub global_items: ItemMap,
}

/// One identifier expression with the item expressions scoped to it.
#[derive(Debug, Clone)]
pub struct IdItemsExpr {
    id_expr: NameValueExpr,
    item_exprs: NameValueExprs,
}

impl IdItemsExpr {
    /// Parse `[ID_EXPR, ITEM_EXPR...]`.
    ///
    /// With `id_filter_ok` false the identifier expression must be a pure
    /// selector (no operator).
    pub fn parse<S: AsRef<str>>(
        texts: &[S],
        id_filter_ok: bool,
        options: ParseOptions,
    ) -> Result<Self, ExprError> {
        let (id_text, item_texts) = match texts.split_first() {
            Some(split) => split,
            None => return Err(ExprError::EmptyName(String::new())),
        };
        let id_expr = NameValueExpr::parse(id_text.as_ref(), options.filter_ok(id_filter_ok))
            .map_err(|e| ExprError::Id(Box::new(e)))?;
        let item_exprs = NameValueExprs::parse(item_texts, options)?;
        Ok(Self {
            id_expr,
            item_exprs,
        })
    }

    pub fn has_items(&self) -> bool {
        !self.item_exprs.is_empty()
    }

    pub fn matching_ids<'a, I>(&self, all_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.id_expr.matching_names(all_ids)
    }

    /// Item names this expression selects for identifier `id`.
    pub fn matching_item_names<'a, I>(&self, id: &str, all_names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        if !self.id_expr.name_matches(id) {
            return Vec::new();
        }
        self.item_exprs.matching_names(all_names)
    }

    /// Whether the row's identifier (and value) match, and its selected items.
    pub fn filter_row<R: LogRow + ?Sized>(&self, row: &R) -> (bool, ItemMap) {
        let value = match row.value() {
            Some(v) => ItemValue::from(v),
            None => ItemValue::Value(Value::Null),
        };
        if !self.id_expr.item_matches(row.id(), &value) {
            return (false, ItemMap::new());
        }
        self.item_exprs.filter_items(row.items())
    }
}

/// A disjunction of identifier/items expressions.
#[derive(Debug, Clone, Default)]
pub struct IdItemsExprs(Vec<IdItemsExpr>);

impl IdItemsExprs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expr: IdItemsExpr) {
        self.0.push(expr);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn has_items(&self) -> bool {
        self.0.iter().any(IdItemsExpr::has_items)
    }

    pub fn matching_ids<'a, I>(&self, all_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let mut ids = Vec::new();
        for expr in &self.0 {
            union_into(&mut ids, expr.matching_ids(all_ids.clone()));
        }
        ids
    }

    pub fn matching_item_names<'a, I>(&self, id: &str, all_names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let mut names = Vec::new();
        for expr in &self.0 {
            union_into(&mut names, expr.matching_item_names(id, all_names.clone()));
        }
        names
    }

    /// Match a row against any member, conjoined with the global expressions.
    pub fn filter_row<R: LogRow + ?Sized>(&self, row: &R, global: &NameValueExprs) -> RowMatch {
        let (global_match, global_items) = global.filter_items(row.items());
        let mut any_matches = false;
        let mut all_own = ItemMap::new();
        for expr in &self.0 {
            let (matches, own) = expr.filter_row(row);
            any_matches |= matches && global_match;
            all_own.extend(own);
        }
        all_own.retain(|name, _| !global_items.contains_key(name));
        RowMatch {
            matches: any_matches,
            own_items: all_own,
            global_items,
        }
    }
}

impl FromIterator<IdItemsExpr> for IdItemsExprs {
    fn from_iter<T: IntoIterator<Item = IdItemsExpr>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
