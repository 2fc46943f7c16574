use std::time::Duration;

use thiserror::Error;

use crate::{
    catalog::{ProductId, RestaurantId},
    orders::OrderId,
    store::StoreError,
};

/// Failure to talk to the external geocoding provider.
///
/// "Address not found" is *not* one of these: the provider answering with an
/// empty result set is a normal `Ok(None)`.
#[derive(Debug, Error)]
pub enum GeocodeServiceError {
    #[error("geocoder unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("geocoder responded with status {0}")]
    Status(u16),

    #[error("geocoder did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed geocoder response: {0}")]
    Malformed(String),

    #[error("geocode cache error: {0}")]
    Cache(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("order {0} has no items")]
    EmptyOrder(OrderId),
}

/// Rejections raised while registering a new order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("{0} must not be blank")]
    BlankField(&'static str),
    #[error("products must not be empty")]
    NoItems,
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),
    #[error("quantity for product {0} must be >= 1")]
    ZeroQuantity(ProductId),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate product id {0}")]
    DuplicateProduct(ProductId),
    #[error("duplicate restaurant id {0}")]
    DuplicateRestaurant(RestaurantId),
    #[error("duplicate category id {0}")]
    DuplicateCategory(u64),
    #[error("restaurant {restaurant} lists product {product} more than once")]
    DuplicateMenuItem {
        restaurant: RestaurantId,
        product: ProductId,
    },
    #[error("product {0} price must be non-negative with at most two decimal places and six integer digits")]
    InvalidPrice(ProductId),
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),
    #[error("unknown restaurant {0}")]
    UnknownRestaurant(RestaurantId),
    #[error("unknown category {0}")]
    UnknownCategory(u64),
}
