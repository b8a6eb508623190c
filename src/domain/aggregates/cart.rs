//! Checkout cart
//!
//! The submitted `(product_id, quantity)` lines, normalised so each product
//! appears once.

use uuid::Uuid;
use crate::CommerceError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartLine { pub product_id: Uuid, pub quantity: u32 }

#[derive(Clone, Debug, Default)]
pub struct Cart { lines: Vec<CartLine> }

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Result<Self, CommerceError> {
        let mut cart = Self::new();
        for line in lines { cart.add_line(line)?; }
        if cart.is_empty() { return Err(CommerceError::Validation("Order must contain at least one item.".into())); }
        Ok(cart)
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn product_ids(&self) -> Vec<Uuid> { self.lines.iter().map(|l| l.product_id).collect() }

    pub fn add_line(&mut self, line: CartLine) -> Result<(), CommerceError> {
        if line.quantity == 0 { return Err(CommerceError::Validation("Item quantity must be greater than 0.".into())); }
        if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == line.product_id) {
            existing.quantity = existing.quantity.checked_add(line.quantity)
                .ok_or_else(|| CommerceError::Validation("Item quantity is too large.".into()))?;
        } else {
            self.lines.push(line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_lines_merge() {
        let p1 = Uuid::now_v7();
        let p2 = Uuid::now_v7();
        let cart = Cart::from_lines([
            CartLine { product_id: p1, quantity: 2 },
            CartLine { product_id: p2, quantity: 1 },
            CartLine { product_id: p1, quantity: 1 },
        ]).unwrap();
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].quantity, 3); // Merged
    }

    #[test]
    fn test_empty_cart_rejected() {
        assert!(matches!(Cart::from_lines(Vec::<CartLine>::new()), Err(CommerceError::Validation(_))));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let result = Cart::from_lines([CartLine { product_id: Uuid::now_v7(), quantity: 0 }]);
        assert!(matches!(result, Err(CommerceError::Validation(_))));
    }
}
