use std::{fmt, sync::Arc};

use futures_util::{StreamExt, future::join_all, stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    catalog::{Catalog, Restaurant, RestaurantId},
    errors::MatchError,
    geo::{Coordinates, distance_km},
    geocoder::{GeocodeProvider, Geocoder},
    menu::MenuIndex,
    orders::{Order, OrderId},
};

pub const DEFAULT_MAX_CONCURRENT_MATCHES: usize = 8;

/// A restaurant able to cook the whole order, and how far it is from the
/// delivery address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantDistance {
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub distance_km: f64,
}

/// Whose address is being located, for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressOwner {
    Order(OrderId),
    Restaurant(RestaurantId),
}

impl fmt::Display for AddressOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressOwner::Order(id) => write!(f, "order {id}"),
            AddressOwner::Restaurant(id) => write!(f, "restaurant {id}"),
        }
    }
}

/// Finds the restaurants that stock every item of an order and ranks them by
/// distance to the delivery address.
pub struct RestaurantMatcher<P> {
    geocoder: Arc<Geocoder<P>>,
    max_concurrent: usize,
}

impl<P: GeocodeProvider> RestaurantMatcher<P> {
    pub fn new(geocoder: Arc<Geocoder<P>>) -> Self {
        Self {
            geocoder,
            max_concurrent: DEFAULT_MAX_CONCURRENT_MATCHES,
        }
    }

    /// Cap on orders matched at once by [`Self::match_orders`].
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn geocoder(&self) -> &Geocoder<P> {
        &self.geocoder
    }

    /// Rank the restaurants that can fulfil `order`, nearest first.
    ///
    /// # Behavior
    /// - An order with no items is rejected with [`MatchError::EmptyOrder`].
    /// - If the delivery address cannot be geocoded (not found, or the
    ///   geocoder failed) the result is empty.
    /// - Candidates are the restaurants stocking **all** distinct products of
    ///   the order. Candidates whose own address cannot be geocoded are left
    ///   out; the rest of the match goes on.
    /// - Equal distances are ordered by restaurant name, then id.
    ///
    /// Geocoding failures are logged, never propagated.
    pub async fn match_order(
        &self,
        order: &Order,
        catalog: &Catalog,
        index: &MenuIndex,
    ) -> Result<Vec<RestaurantDistance>, MatchError> {
        if order.items.is_empty() {
            return Err(MatchError::EmptyOrder(order.id));
        }

        let Some(origin) = self.locate(&order.address, AddressOwner::Order(order.id)).await else {
            return Ok(Vec::new());
        };

        let candidates = index.restaurants_stocking_all(order.product_ids());
        if candidates.is_empty() {
            debug!(order_id = order.id, "no restaurant stocks every item");
            return Ok(Vec::new());
        }

        let lookups = candidates
            .iter()
            .filter_map(|id| catalog.restaurant(*id))
            .map(|restaurant| self.rank_one(restaurant, origin));
        let mut ranked: Vec<RestaurantDistance> =
            join_all(lookups).await.into_iter().flatten().collect();

        ranked.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.restaurant_id.cmp(&b.restaurant_id))
        });
        debug!(order_id = order.id, matched = ranked.len(), "order matched");
        Ok(ranked)
    }

    /// Match many orders against one snapshot of the menu.
    ///
    /// The index is built once; orders are matched concurrently, at most
    /// `max_concurrent` at a time. Results come back in input order.
    pub async fn match_orders(
        &self,
        orders: &[Order],
        catalog: &Catalog,
    ) -> Vec<Result<Vec<RestaurantDistance>, MatchError>> {
        let index = catalog.menu_index();
        // futures built eagerly: a lazily mapped stream over `&Order` is not
        // provably `Send` inside axum handlers
        let pending: Vec<_> = orders
            .iter()
            .map(|order| self.match_order(order, catalog, &index))
            .collect();
        stream::iter(pending)
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    async fn rank_one(
        &self,
        restaurant: &Restaurant,
        origin: Coordinates,
    ) -> Option<RestaurantDistance> {
        let here = self
            .locate(&restaurant.address, AddressOwner::Restaurant(restaurant.id))
            .await?;
        Some(RestaurantDistance {
            restaurant_id: restaurant.id,
            name: restaurant.name.clone(),
            distance_km: distance_km(origin, here),
        })
    }

    async fn locate(&self, address: &str, owner: AddressOwner) -> Option<Coordinates> {
        if address.trim().is_empty() {
            warn!(%owner, "blank address, excluded from matching");
            return None;
        }
        match self.geocoder.resolve(address).await {
            Ok(Some(found)) => Some(found),
            Ok(None) => {
                warn!(%owner, %address, "address not found by geocoder, excluded from matching");
                None
            }
            Err(err) => {
                warn!(%owner, %address, error = %err, "geocoding failed, excluded from matching");
                None
            }
        }
    }
}
