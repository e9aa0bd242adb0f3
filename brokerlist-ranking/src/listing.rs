//! Page-level listings.
//!
//! Wraps [`RankingEngine`] with the cache manager so listing pages are served
//! from cache and refreshed with stale-while-revalidate.

use std::sync::Arc;

use brokerlist_cache::{CacheManager, FetchOptions};
use brokerlist_core::{BrokerResult, BrokerScore};
use tracing::info;

use crate::engine::{RankingEngine, RankingOptions};

pub const BROKERS_TAG: &str = "brokers";
pub const RANKINGS_TAG: &str = "rankings";
pub const CATEGORIES_TAG: &str = "categories";
pub const COUNTRIES_TAG: &str = "countries";

pub const COUNTRY_LISTING_LIMIT: usize = 20;
pub const COUNTRY_LISTING_MIN_SCORE: f64 = 5.0;
pub const CATEGORY_LISTING_LIMIT: usize = 30;
pub const CATEGORY_LISTING_MIN_SCORE: f64 = 4.0;

/// Cache key for a listing. Every option that changes the result is part of it.
pub fn listing_key(options: &RankingOptions) -> String {
    format!(
        "rankings:{}:{}:{}:{}:{}",
        options.category_slug.as_deref().unwrap_or("all"),
        options.country_slug.as_deref().unwrap_or("all"),
        options.limit,
        options.min_score,
        options.only_available
    )
}

pub fn listing_tags(options: &RankingOptions) -> Vec<String> {
    let mut tags = vec![BROKERS_TAG.to_string(), RANKINGS_TAG.to_string()];
    tags.extend(options.category_slug.iter().cloned());
    tags.extend(options.country_slug.iter().cloned());
    tags
}

/// Cached ranking pages.
#[derive(Clone)]
pub struct ListingService {
    engine: Arc<RankingEngine>,
    cache: CacheManager,
    warmup_categories: Vec<String>,
}

impl ListingService {
    pub fn new(engine: Arc<RankingEngine>, cache: CacheManager) -> Self {
        Self {
            engine,
            cache,
            warmup_categories: Vec::new(),
        }
    }

    pub fn with_warmup_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warmup_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn engine(&self) -> &Arc<RankingEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn warmup_categories(&self) -> &[String] {
        &self.warmup_categories
    }

    pub async fn ranked_listing(&self, options: RankingOptions) -> BrokerResult<Vec<BrokerScore>> {
        let key = listing_key(&options);
        let fetch = FetchOptions::new().with_tags(listing_tags(&options));
        let engine = Arc::clone(&self.engine);
        self.cache
            .fetch_with_cache(
                &key,
                move || async move { engine.rank_brokers(&options).await },
                fetch,
            )
            .await
    }

    /// Brokers available in a country with a score of at least 5.0.
    pub async fn brokers_for_country(
        &self,
        country_slug: &str,
        limit: Option<usize>,
    ) -> BrokerResult<Vec<BrokerScore>> {
        let options = RankingOptions::new()
            .with_country(country_slug)
            .with_limit(limit.unwrap_or(COUNTRY_LISTING_LIMIT))
            .with_min_score(COUNTRY_LISTING_MIN_SCORE)
            .only_available();
        self.ranked_listing(options).await
    }

    /// Brokers for a category page with a score of at least 4.0.
    pub async fn brokers_for_category(
        &self,
        category_slug: &str,
        limit: Option<usize>,
    ) -> BrokerResult<Vec<BrokerScore>> {
        let options = RankingOptions::new()
            .with_category(category_slug)
            .with_limit(limit.unwrap_or(CATEGORY_LISTING_LIMIT))
            .with_min_score(CATEGORY_LISTING_MIN_SCORE);
        self.ranked_listing(options).await
    }

    /// Rank the overall listing and every warmup category, and seed the cache
    /// with the results. Returns how many entries were seeded.
    pub async fn warmup(&self) -> BrokerResult<usize> {
        let mut targets = vec![RankingOptions::new().with_min_score(CATEGORY_LISTING_MIN_SCORE)];
        targets.extend(self.warmup_categories.iter().map(|slug| {
            RankingOptions::new()
                .with_category(slug.as_str())
                .with_min_score(CATEGORY_LISTING_MIN_SCORE)
        }));

        for options in &targets {
            let ranked = self.engine.rank_brokers(options).await?;
            self.cache
                .preload(&listing_key(options), &ranked, None, listing_tags(options))
                .await?;
        }

        info!(entries = targets.len(), "Cache warmup complete");
        Ok(targets.len())
    }

    // ========================================================================
    // Data change hooks
    // ========================================================================

    /// A broker row changed. Every listing page carries the `brokers` tag, so
    /// all of them are dropped, along with entries tagged by the broker type.
    pub fn on_broker_changed(&self, broker_type: Option<&str>) -> usize {
        let mut tags = vec![BROKERS_TAG];
        tags.extend(broker_type.map(str::trim).filter(|t| !t.is_empty()));
        let removed = self.invalidate_tags(&tags);
        info!(?broker_type, removed, "Invalidated listings for broker change");
        removed
    }

    /// A category or its broker mapping changed.
    pub fn on_category_changed(&self, category_slug: &str) -> usize {
        let removed = self.invalidate_tags(&[CATEGORIES_TAG, category_slug]);
        info!(category = category_slug, removed, "Invalidated listings for category change");
        removed
    }

    /// Availability data for a country changed.
    pub fn on_country_changed(&self, country_slug: &str) -> usize {
        let removed = self.invalidate_tags(&[COUNTRIES_TAG, country_slug]);
        info!(country = country_slug, removed, "Invalidated listings for country change");
        removed
    }

    fn invalidate_tags(&self, tags: &[&str]) -> usize {
        tags.iter().map(|tag| self.cache.invalidate_by_tag(tag)).sum()
    }
}
