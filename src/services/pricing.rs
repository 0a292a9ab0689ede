//! Authoritative price and base-unit resolution for a cart or order line.
//!
//! All monetary values are `i64` minor currency units; arithmetic is
//! overflow-checked and never touches floating point.

use crate::{
    entities::{pack_variant, product},
    errors::ServiceError,
};
use serde::Serialize;
use uuid::Uuid;

/// A fully resolved line: what one purchased unit costs, how many base
/// product units the whole line consumes, and the line total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedLine {
    /// Price of one purchased unit (a pack, or a single base unit).
    pub unit_price_minor: i64,
    /// Base product units consumed by the whole line, for stock accounting.
    pub effective_units: i32,
    pub line_total_minor: i64,
}

/// Resolves pricing for `quantity` of a product under an optional pack
/// selection.
///
/// With no variant the product must allow individual sale; with a variant it
/// must belong to the product and be active. The caller supplies the
/// product's variants so resolution stays a pure function.
pub fn resolve_line(
    product: &product::Model,
    variants: &[pack_variant::Model],
    pack_variant_id: Option<Uuid>,
    quantity: i32,
) -> Result<ResolvedLine, ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::ValidationError(format!(
            "quantity must be at least 1, got {}",
            quantity
        )));
    }

    let (unit_price_minor, units_per_item) = match pack_variant_id {
        None => {
            if !product.allow_individual_sale {
                return Err(ServiceError::InvalidSelection);
            }
            (product.price_minor, 1i32)
        }
        Some(variant_id) => {
            let variant = variants
                .iter()
                .find(|v| v.id == variant_id && v.product_id == product.id && v.active)
                .ok_or(ServiceError::VariantNotFound {
                    product_id: product.id,
                    variant_id,
                })?;
            (variant.price_minor, variant.units_per_pack)
        }
    };

    let line_total_minor = unit_price_minor
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| ServiceError::ValidationError("line total overflows".to_string()))?;
    let effective_units = units_per_item
        .checked_mul(quantity)
        .ok_or_else(|| ServiceError::ValidationError("base unit demand overflows".to_string()))?;

    Ok(ResolvedLine {
        unit_price_minor,
        effective_units,
        line_total_minor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(price_minor: i64, allow_individual_sale: bool) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            name: "Test product".into(),
            sku: "SKU-1".into(),
            price_minor,
            stock: 50,
            allow_individual_sale,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn variant(
        product_id: Uuid,
        units: i32,
        price_minor: i64,
        active: bool,
        is_default: bool,
    ) -> pack_variant::Model {
        pack_variant::Model {
            id: Uuid::new_v4(),
            product_id,
            name: format!("Pack of {}", units),
            units_per_pack: units,
            price_minor,
            active,
            is_default,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn resolves_individual_unit() {
        let p = product(289_000, true);
        let line = resolve_line(&p, &[], None, 2).expect("resolve");
        assert_eq!(line.unit_price_minor, 289_000);
        assert_eq!(line.effective_units, 2);
        assert_eq!(line.line_total_minor, 578_000);
    }

    #[test]
    fn rejects_individual_sale_when_disallowed() {
        let p = product(289_000, false);
        let err = resolve_line(&p, &[], None, 1).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidSelection));
    }

    #[test]
    fn resolves_pack_variant_with_base_unit_multiplier() {
        let p = product(289_000, true);
        let v = variant(p.id, 3, 750_000, true, true);
        let line = resolve_line(&p, std::slice::from_ref(&v), Some(v.id), 2).expect("resolve");
        assert_eq!(line.unit_price_minor, 750_000);
        assert_eq!(line.effective_units, 6);
        assert_eq!(line.line_total_minor, 1_500_000);
    }

    #[test]
    fn rejects_inactive_variant() {
        let p = product(289_000, true);
        let v = variant(p.id, 3, 750_000, false, false);
        let err = resolve_line(&p, std::slice::from_ref(&v), Some(v.id), 1).unwrap_err();
        assert!(matches!(err, ServiceError::VariantNotFound { .. }));
    }

    #[test]
    fn rejects_variant_of_another_product() {
        let p = product(289_000, true);
        let other = product(100, true);
        let v = variant(other.id, 3, 750_000, true, false);
        let err = resolve_line(&p, std::slice::from_ref(&v), Some(v.id), 1).unwrap_err();
        assert!(matches!(err, ServiceError::VariantNotFound { .. }));
    }

    #[test]
    fn rejects_zero_quantity() {
        let p = product(289_000, true);
        let err = resolve_line(&p, &[], None, 0).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let p = product(i64::MAX, true);
        let err = resolve_line(&p, &[], None, 2).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
