//! Count-aware page cursor
//!
//! The count is taken lazily and cached; once taken the order and filter are
//! frozen so the count keeps describing the items being paged.

use async_trait::async_trait;

use crate::error::{ModelError, ModelResult};
use crate::query::OrderBy;

/// Anything that can count and page its objects
#[async_trait]
pub trait PageSource: Clone + Send + Sync + 'static {
    type Item: Send;
    type Filter: Clone + Send + Sync;

    async fn count_matching(&self, filter: Option<&Self::Filter>) -> ModelResult<u64>;

    async fn page(
        &self,
        page: i64,
        page_size: i64,
        order: &[OrderBy],
        filter: Option<&Self::Filter>,
    ) -> ModelResult<Vec<Self::Item>>;
}

pub struct Paginator<S: PageSource> {
    source: S,
    page: i64,
    page_size: i64,
    order: Vec<OrderBy>,
    filter: Option<S::Filter>,
    count: Option<u64>,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(
        source: S,
        page: i64,
        page_size: i64,
        order: Vec<OrderBy>,
        filter: Option<S::Filter>,
    ) -> Self {
        Self {
            source,
            page,
            page_size,
            order,
            filter,
            count: None,
        }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn is_counted(&self) -> bool {
        self.count.is_some()
    }

    pub fn set_order(&mut self, order: Vec<OrderBy>) -> ModelResult<()> {
        if self.count.is_some() {
            return Err(ModelError::PaginatorLocked);
        }
        self.order = order;
        Ok(())
    }

    pub fn set_where(&mut self, filter: Option<S::Filter>) -> ModelResult<()> {
        if self.count.is_some() {
            return Err(ModelError::PaginatorLocked);
        }
        self.filter = filter;
        Ok(())
    }

    /// Total number of matching objects, queried once
    pub async fn count(&mut self) -> ModelResult<u64> {
        if let Some(count) = self.count {
            return Ok(count);
        }
        let count = self.source.count_matching(self.filter.as_ref()).await?;
        tracing::trace!("paginator counted {} items", count);
        self.count = Some(count);
        Ok(count)
    }

    pub async fn page_count(&mut self) -> ModelResult<u64> {
        let count = self.count().await?;
        let size = self.page_size.max(1) as u64;
        Ok((count + size - 1) / size)
    }

    /// Items for an offset window; the page is derived as `offset / limit + 1`
    pub async fn get_items(&self, offset: u64, limit: u64) -> ModelResult<Vec<S::Item>> {
        if limit == 0 {
            return Err(ModelError::InvalidPage {
                page: 0,
                page_size: 0,
            });
        }
        let page = (offset / limit + 1) as i64;
        self.source
            .page(page, limit as i64, &self.order, self.filter.as_ref())
            .await
    }

    /// Items of the page this paginator was created for
    pub async fn current_items(&self) -> ModelResult<Vec<S::Item>> {
        self.source
            .page(self.page, self.page_size, &self.order, self.filter.as_ref())
            .await
    }
}
