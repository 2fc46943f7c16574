use std::collections::{BTreeSet, HashMap};

use crate::catalog::{MenuItem, ProductId, RestaurantId};

/// `product → restaurants currently selling it`, built in one pass over the
/// menu rows. Rows with `availability == false` are dropped at build time.
#[derive(Debug, Clone, Default)]
pub struct MenuIndex {
    by_product: HashMap<ProductId, BTreeSet<RestaurantId>>,
}

impl MenuIndex {
    pub fn build<'a>(rows: impl IntoIterator<Item = &'a MenuItem>) -> Self {
        let mut by_product: HashMap<ProductId, BTreeSet<RestaurantId>> = HashMap::new();
        for row in rows.into_iter().filter(|r| r.availability) {
            by_product
                .entry(row.product)
                .or_default()
                .insert(row.restaurant);
        }
        Self { by_product }
    }

    pub fn restaurants_stocking(&self, product: ProductId) -> BTreeSet<RestaurantId> {
        self.by_product.get(&product).cloned().unwrap_or_default()
    }

    /// Restaurants that stock **every** product in `products`.
    ///
    /// An empty `products` yields an empty set: with nothing to prepare there
    /// is nobody to assign the order to.
    pub fn restaurants_stocking_all(
        &self,
        products: impl IntoIterator<Item = ProductId>,
    ) -> BTreeSet<RestaurantId> {
        products
            .into_iter()
            .map(|p| self.restaurants_stocking(p))
            .reduce(|acc, set| &acc & &set)
            .unwrap_or_default()
    }

    /// Number of products with at least one stocking restaurant.
    pub fn len(&self) -> usize {
        self.by_product.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_product.is_empty()
    }
}
