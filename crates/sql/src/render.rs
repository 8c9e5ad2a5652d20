use crate::clause::CompiledClauses;
use crate::template::{Segment, Slot, Template};

pub const PAGING_TAIL: &str = "LIMIT @limit OFFSET @offset";

/// Text substituted into each slot.
#[derive(Debug, Clone, Copy)]
pub struct SlotValues<'a> {
    pub where_clause: &'a str,
    pub account_id_clause: &'a str,
}

impl<'a> SlotValues<'a> {
    /// Same text in every slot.
    pub fn uniform(clause: &'a str) -> Self {
        Self {
            where_clause: clause,
            account_id_clause: clause,
        }
    }

    fn get(&self, slot: Slot) -> &'a str {
        match slot {
            Slot::WhereClause => self.where_clause,
            Slot::AccountIdClause => self.account_id_clause,
        }
    }
}

/// Replacements for the template's trailing clauses. A compiled sort drops
/// both template tails, so its result is only bounded when paging is on.
/// With no sort, `paginate` alone swaps the template's `LIMIT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TailOverrides<'a> {
    pub order_by: Option<&'a str>,
    pub paginate: bool,
}

impl<'a> From<&'a CompiledClauses> for TailOverrides<'a> {
    fn from(clauses: &'a CompiledClauses) -> Self {
        Self {
            order_by: clauses.order_fragment.as_deref(),
            paginate: clauses.paging.is_some(),
        }
    }
}

pub fn render(template: &Template, slots: &SlotValues<'_>, tails: TailOverrides<'_>) -> String {
    let mut sql = String::new();
    for segment in template.segments() {
        match segment {
            Segment::Literal(text) => sql.push_str(text),
            Segment::Slot(slot) => sql.push_str(slots.get(*slot)),
        }
    }

    let paging = tails.paginate.then_some(PAGING_TAIL);
    let (order_by, limit) = match tails.order_by {
        Some(order_by) => (Some(order_by), paging),
        None => (template.order_by_tail(), paging.or(template.limit_tail())),
    };
    for tail in [order_by, limit].into_iter().flatten() {
        sql.push('\n');
        sql.push_str(tail);
    }
    sql
}
