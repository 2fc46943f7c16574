use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    path::Path,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{errors::CatalogError, menu::MenuIndex};

pub type ProductId = u64;
pub type RestaurantId = u64;
pub type CategoryId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: CategoryId,
    pub name: String,
}

/// A purchasable product. Whether it can be ordered from a given restaurant
/// lives on [`MenuItem`], not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<ProductCategory>,
    /// Shown as a special offer on the storefront.
    #[serde(default)]
    pub special_status: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contact_phone: String,
}

/// Whether `restaurant` currently sells `product`. Unique per pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub restaurant: RestaurantId,
    pub product: ProductId,
    #[serde(default = "default_availability")]
    pub availability: bool,
}

fn default_availability() -> bool {
    true
}

/// Largest storable price: eight digits, two of them after the point.
const MAX_PRICE: Decimal = Decimal::from_parts(99_999_999, 0, 0, false, 2);

fn is_valid_price(price: Decimal) -> bool {
    !price.is_sign_negative() && price.scale() <= 2 && price <= MAX_PRICE
}

/// Seed file layout. Products reference their category by id here.
#[derive(Debug, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub categories: Vec<ProductCategory>,
    pub products: Vec<SeedProduct>,
    pub restaurants: Vec<Restaurant>,
    #[serde(default)]
    pub menu: Vec<MenuItem>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub special_status: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
}

/// Products, restaurants and the per-restaurant menu.
///
/// Built from a [`CatalogSeed`], which is checked for duplicate ids, duplicate
/// `(restaurant, product)` menu rows and dangling references.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "CatalogSeed")]
pub struct Catalog {
    products: BTreeMap<ProductId, Product>,
    restaurants: BTreeMap<RestaurantId, Restaurant>,
    menu: Vec<MenuItem>,
}

impl TryFrom<CatalogSeed> for Catalog {
    type Error = CatalogError;

    fn try_from(seed: CatalogSeed) -> Result<Self, Self::Error> {
        let mut categories = BTreeMap::new();
        for category in seed.categories {
            let id = category.id;
            if categories.insert(id, category).is_some() {
                return Err(CatalogError::DuplicateCategory(id));
            }
        }

        let mut products = BTreeMap::new();
        for p in seed.products {
            if !is_valid_price(p.price) {
                return Err(CatalogError::InvalidPrice(p.id));
            }
            let category = match p.category {
                Some(id) => Some(
                    categories
                        .get(&id)
                        .cloned()
                        .ok_or(CatalogError::UnknownCategory(id))?,
                ),
                None => None,
            };
            let product = Product {
                id: p.id,
                name: p.name,
                price: p.price,
                category,
                special_status: p.special_status,
                description: p.description,
                image: p.image,
            };
            if products.insert(p.id, product).is_some() {
                return Err(CatalogError::DuplicateProduct(p.id));
            }
        }

        let mut restaurants = BTreeMap::new();
        for r in seed.restaurants {
            let id = r.id;
            if restaurants.insert(id, r).is_some() {
                return Err(CatalogError::DuplicateRestaurant(id));
            }
        }

        let mut seen = HashSet::new();
        for item in &seed.menu {
            if !restaurants.contains_key(&item.restaurant) {
                return Err(CatalogError::UnknownRestaurant(item.restaurant));
            }
            if !products.contains_key(&item.product) {
                return Err(CatalogError::UnknownProduct(item.product));
            }
            if !seen.insert((item.restaurant, item.product)) {
                return Err(CatalogError::DuplicateMenuItem {
                    restaurant: item.restaurant,
                    product: item.product,
                });
            }
        }

        Ok(Catalog {
            products,
            restaurants,
            menu: seed.menu,
        })
    }
}

impl Catalog {
    /// Read and validate a JSON seed file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn restaurant(&self, id: RestaurantId) -> Option<&Restaurant> {
        self.restaurants.get(&id)
    }

    pub fn restaurants(&self) -> impl Iterator<Item = &Restaurant> {
        self.restaurants.values()
    }

    pub fn menu(&self) -> &[MenuItem] {
        &self.menu
    }

    /// Products that at least one restaurant currently sells, in id order.
    pub fn available_products(&self) -> Vec<&Product> {
        let stocked: BTreeSet<ProductId> = self
            .menu
            .iter()
            .filter(|m| m.availability)
            .map(|m| m.product)
            .collect();
        stocked
            .into_iter()
            .filter_map(|id| self.products.get(&id))
            .collect()
    }

    /// Snapshot the available menu rows into a lookup index.
    pub fn menu_index(&self) -> MenuIndex {
        MenuIndex::build(&self.menu)
    }

    /// Insert or update the menu row for `(restaurant, product)`.
    pub fn set_availability(
        &mut self,
        restaurant: RestaurantId,
        product: ProductId,
        available: bool,
    ) -> Result<(), CatalogError> {
        if !self.restaurants.contains_key(&restaurant) {
            return Err(CatalogError::UnknownRestaurant(restaurant));
        }
        if !self.products.contains_key(&product) {
            return Err(CatalogError::UnknownProduct(product));
        }
        match self
            .menu
            .iter_mut()
            .find(|m| m.restaurant == restaurant && m.product == product)
        {
            Some(row) => row.availability = available,
            None => self.menu.push(MenuItem {
                restaurant,
                product,
                availability: available,
            }),
        }
        Ok(())
    }
}
