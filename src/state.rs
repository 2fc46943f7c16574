use crate::{
    catalog::Catalog, geocoder::GeocodeProvider, matcher::RestaurantMatcher,
    orders::OrderRegistry,
};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Shared state behind the HTTP handlers.
///
/// The catalog is published as an `Arc` snapshot: handlers clone the current
/// snapshot and can hold it across `.await` while matching, and writers swap
/// in a modified copy.
pub struct AppState<P> {
    pub catalog: Arc<RwLock<Arc<Catalog>>>,
    pub orders: Arc<Mutex<OrderRegistry>>,
    pub matcher: Arc<RestaurantMatcher<P>>,
}

impl<P: GeocodeProvider> AppState<P> {
    pub fn new(catalog: Catalog, matcher: RestaurantMatcher<P>) -> Self {
        Self {
            catalog: Arc::new(RwLock::new(Arc::new(catalog))),
            orders: Arc::new(Mutex::new(OrderRegistry::new())),
            matcher: Arc::new(matcher),
        }
    }

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` to a copy of the catalog and publish the result if it succeeds.
    pub fn update_catalog<T, E>(&self, f: impl FnOnce(&mut Catalog) -> Result<T, E>) -> Result<T, E> {
        let mut guard = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Catalog::clone(&guard);
        let out = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }
}

// derive(Clone) would demand `P: Clone`
impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            orders: self.orders.clone(),
            matcher: self.matcher.clone(),
        }
    }
}
