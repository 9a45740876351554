use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::pipeline::filter::{ObjectFilter, ObjectFilterBase};
use crate::pipeline::stage::Stage;
use crate::types::filter_rule::{FilterRules, Filterable};
use crate::types::{RemovalItem, TransferItem};

const FILTER_NAME: &str = "RuleFilter";

/// Items that are passed on regardless of the rules.
pub trait FilterExempt {
    fn is_filter_exempt(&self) -> bool;
}

impl FilterExempt for TransferItem {
    // Local directories are recreated as directory objects whatever the rules say.
    fn is_filter_exempt(&self) -> bool {
        matches!(self, TransferItem::File(file) if file.is_dir())
    }
}

impl FilterExempt for RemovalItem {
    // Multipart uploads are matched by their key, the same as objects.
    fn is_filter_exempt(&self) -> bool {
        false
    }
}

/// Applies the `--include`/`--exclude` rules.
pub struct RuleFilter<'a, T> {
    base: ObjectFilterBase<'a, T>,
    rules: FilterRules,
}

impl<T> RuleFilter<'_, T> {
    pub fn new(base: Stage<T>, rules: FilterRules) -> Self {
        Self {
            base: ObjectFilterBase {
                base,
                name: FILTER_NAME,
            },
            rules,
        }
    }
}

#[async_trait]
impl<T> ObjectFilter for RuleFilter<'_, T>
where
    T: Filterable + FilterExempt + Send + Sync + 'static,
{
    async fn filter(&self) -> Result<()> {
        self.base.filter(|item| is_match(item, &self.rules)).await
    }
}

fn is_match<T: Filterable + FilterExempt>(item: &T, rules: &FilterRules) -> bool {
    if item.is_filter_exempt() || rules.matches(item) {
        return true;
    }

    let key = item.relative_path();
    debug!(name = FILTER_NAME, key = key, "object filtered.");
    false
}
