use std::sync::PoisonError;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    catalog::{MenuItem, Product, ProductId, RestaurantId},
    errors::{CatalogError, MatchError, OrderError},
    geocoder::GeocodeProvider,
    matcher::RestaurantDistance,
    orders::{NewOrder, Order, OrderId},
    state::AppState,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Order(_) => StatusCode::BAD_REQUEST,
            ApiError::Catalog(
                CatalogError::UnknownProduct(_) | CatalogError::UnknownRestaurant(_),
            ) => StatusCode::NOT_FOUND,
            ApiError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Match(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// An order as the manager dashboard sees it.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub total: Decimal,
    /// Restaurants able to cook the whole order, nearest first.
    pub restaurants: Vec<RestaurantDistance>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityUpdate {
    pub available: bool,
}

/// Products that can currently be ordered from at least one restaurant.
pub async fn list_products<P: GeocodeProvider>(
    State(state): State<AppState<P>>,
) -> Json<Vec<Product>> {
    let catalog = state.catalog();
    Json(catalog.available_products().into_iter().cloned().collect())
}

pub async fn create_order<P: GeocodeProvider>(
    State(state): State<AppState<P>>,
    Json(payload): Json<NewOrder>,
) -> Result<Json<Order>, ApiError> {
    let catalog = state.catalog();
    let mut orders = state.orders.lock().unwrap_or_else(PoisonError::into_inner);
    let order = orders.register(payload, &catalog)?.clone();
    info!(order_id = order.id, items = order.items.len(), "order registered");
    Ok(Json(order))
}

pub async fn list_orders<P: GeocodeProvider>(
    State(state): State<AppState<P>>,
) -> Json<Vec<OrderView>> {
    let catalog = state.catalog();
    let orders: Vec<Order> = state
        .orders
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .cloned()
        .collect();

    let matches = state.matcher.match_orders(&orders, &catalog).await;
    let views = orders
        .into_iter()
        .zip(matches)
        .map(|(order, matched)| {
            let restaurants = matched.unwrap_or_else(|err| {
                warn!(order_id = order.id, error = %err, "order could not be matched");
                Vec::new()
            });
            OrderView {
                total: order.total(),
                order,
                restaurants,
            }
        })
        .collect();
    Json(views)
}

pub async fn order_restaurants<P: GeocodeProvider>(
    State(state): State<AppState<P>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Vec<RestaurantDistance>>, ApiError> {
    let catalog = state.catalog();
    let order = state
        .orders
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(order_id)
        .cloned()
        .ok_or(ApiError::OrderNotFound(order_id))?;

    let ranked = state
        .matcher
        .match_order(&order, &catalog, &catalog.menu_index())
        .await?;
    Ok(Json(ranked))
}

pub async fn set_availability<P: GeocodeProvider>(
    State(state): State<AppState<P>>,
    Path((restaurant, product)): Path<(RestaurantId, ProductId)>,
    Json(update): Json<AvailabilityUpdate>,
) -> Result<Json<MenuItem>, ApiError> {
    state.update_catalog(|catalog| catalog.set_availability(restaurant, product, update.available))?;
    info!(restaurant, product, available = update.available, "menu availability changed");
    Ok(Json(MenuItem {
        restaurant,
        product,
        availability: update.available,
    }))
}

pub fn router<P: GeocodeProvider + 'static>(state: AppState<P>) -> Router {
    Router::new()
        .route("/products", get(list_products::<P>))
        .route("/orders", get(list_orders::<P>).post(create_order::<P>))
        .route("/orders/{order_id}/restaurants", get(order_restaurants::<P>))
        .route(
            "/restaurants/{restaurant_id}/menu/{product_id}",
            put(set_availability::<P>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
