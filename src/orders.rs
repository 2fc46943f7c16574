use std::{
    collections::{BTreeMap, BTreeSet},
    time::SystemTime,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::{Catalog, ProductId},
    errors::OrderError,
};

pub type OrderId = u64;

/// One requested line of a [`NewOrder`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewOrderItem {
    pub product: ProductId,
    pub quantity: u32,
}

/// An order as submitted by a customer, before validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewOrder {
    pub firstname: String,
    pub lastname: String,
    pub phonenumber: String,
    /// Delivery address, used verbatim as the geocoding key.
    pub address: String,
    #[serde(default)]
    pub comment: String,
    pub products: Vec<NewOrderItem>,
}

/// A registered line item.
///
/// `price` is the unit price copied from the catalog when the order was
/// registered; later price changes do not touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub firstname: String,
    pub lastname: String,
    pub phonenumber: String,
    pub address: String,
    pub comment: String,
    pub registered_at: SystemTime,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Σ price × quantity over all items.
    pub fn total(&self) -> Decimal {
        self.items
            .iter()
            .map(|i| i.price * Decimal::from(i.quantity))
            .sum()
    }

    /// Distinct products referenced by the order.
    pub fn product_ids(&self) -> BTreeSet<ProductId> {
        self.items.iter().map(|i| i.product).collect()
    }
}

/// In-memory order table. Ids are assigned sequentially starting from 1.
#[derive(Debug, Default)]
pub struct OrderRegistry {
    next_id: OrderId,
    orders: BTreeMap<OrderId, Order>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `new` against the catalog and store it with snapshotted prices.
    ///
    /// Either the whole order (with all its items) is stored or nothing is.
    pub fn register(&mut self, new: NewOrder, catalog: &Catalog) -> Result<&Order, OrderError> {
        for (field, value) in [
            ("firstname", &new.firstname),
            ("lastname", &new.lastname),
            ("phonenumber", &new.phonenumber),
            ("address", &new.address),
        ] {
            if value.trim().is_empty() {
                return Err(OrderError::BlankField(field));
            }
        }
        if new.products.is_empty() {
            return Err(OrderError::NoItems);
        }

        let items = new
            .products
            .iter()
            .map(|line| {
                let product = catalog
                    .product(line.product)
                    .ok_or(OrderError::UnknownProduct(line.product))?;
                if line.quantity == 0 {
                    return Err(OrderError::ZeroQuantity(line.product));
                }
                Ok(OrderItem {
                    product: product.id,
                    quantity: line.quantity,
                    price: product.price,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.next_id += 1;
        let id = self.next_id;
        let order = Order {
            id,
            firstname: new.firstname,
            lastname: new.lastname,
            phonenumber: new.phonenumber,
            address: new.address,
            comment: new.comment,
            registered_at: SystemTime::now(),
            items,
        };
        Ok(self.orders.entry(id).or_insert(order))
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// All orders, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Catalog {
        serde_json::from_value(json!({
            "products": [
                {"id": 1, "name": "Cheeseburger", "price": "249.00"},
                {"id": 2, "name": "Fries", "price": "99.50"}
            ],
            "restaurants": [{"id": 10, "name": "Arbat", "address": "Moscow, Arbat 1"}],
            "menu": [{"restaurant": 10, "product": 1}]
        }))
        .unwrap()
    }

    fn new_order(products: Vec<NewOrderItem>) -> NewOrder {
        NewOrder {
            firstname: "Ivan".into(),
            lastname: "Petrov".into(),
            phonenumber: "+79991234567".into(),
            address: "Moscow, Tverskaya 5".into(),
            comment: String::new(),
            products,
        }
    }

    fn line(product: ProductId, quantity: u32) -> NewOrderItem {
        NewOrderItem { product, quantity }
    }

    #[test]
    fn test_register_snapshots_prices_and_totals() {
        let catalog = catalog();
        let mut registry = OrderRegistry::new();

        let order = registry
            .register(new_order(vec![line(1, 2), line(2, 1)]), &catalog)
            .unwrap()
            .clone();
        assert_eq!(order.id, 1);
        assert_eq!(order.items[0].price, Decimal::new(24900, 2));
        assert_eq!(order.total(), Decimal::new(59750, 2));

        // a repriced catalog applies to new orders only
        let repriced: Catalog = serde_json::from_value(json!({
            "products": [
                {"id": 1, "name": "Cheeseburger", "price": "299.00"},
                {"id": 2, "name": "Fries", "price": "99.50"}
            ],
            "restaurants": [{"id": 10, "name": "Arbat", "address": "Moscow, Arbat 1"}],
            "menu": [{"restaurant": 10, "product": 1}]
        }))
        .unwrap();
        let later = registry
            .register(new_order(vec![line(1, 2), line(2, 1)]), &repriced)
            .unwrap()
            .clone();
        assert_eq!(later.items[0].price, Decimal::new(29900, 2));

        let first = registry.get(1).unwrap();
        assert_eq!(first.items, order.items);
        assert_eq!(first.items[0].price.to_string(), "249.00");
        assert_eq!(first.total(), Decimal::new(59750, 2));
    }

    #[test]
    fn test_ids_are_sequential() {
        let catalog = catalog();
        let mut registry = OrderRegistry::new();
        registry.register(new_order(vec![line(1, 1)]), &catalog).unwrap();
        let second = registry.register(new_order(vec![line(2, 1)]), &catalog).unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_rejects_empty_order() {
        let mut registry = OrderRegistry::new();
        let err = registry.register(new_order(vec![]), &catalog()).unwrap_err();
        assert_eq!(err, OrderError::NoItems);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rejects_unknown_product_atomically() {
        let mut registry = OrderRegistry::new();
        let err = registry
            .register(new_order(vec![line(1, 1), line(42, 1)]), &catalog())
            .unwrap_err();
        assert_eq!(err, OrderError::UnknownProduct(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rejects_zero_quantity() {
        let mut registry = OrderRegistry::new();
        let err = registry
            .register(new_order(vec![line(2, 0)]), &catalog())
            .unwrap_err();
        assert_eq!(err, OrderError::ZeroQuantity(2));
    }

    #[test]
    fn test_rejects_blank_address() {
        let mut registry = OrderRegistry::new();
        let mut order = new_order(vec![line(1, 1)]);
        order.address = "   ".into();
        let err = registry.register(order, &catalog()).unwrap_err();
        assert_eq!(err, OrderError::BlankField("address"));
    }

    #[test]
    fn test_product_ids_are_distinct() {
        let catalog = catalog();
        let mut registry = OrderRegistry::new();
        let order = registry
            .register(new_order(vec![line(1, 1), line(2, 3), line(1, 2)]), &catalog)
            .unwrap();
        assert_eq!(order.product_ids(), BTreeSet::from([1, 2]));
    }
}
