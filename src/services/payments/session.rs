//! Provider payload builders.
//!
//! Stripe receives undiscounted unit amounts in cents and carries the discount
//! on a provider coupon, so the expected charge is the calculator total.
//! PayPal receives unit amounts that are already discounted; its declared
//! `item_total` and `amount.value` are both the re-summed discounted lines.

use crate::errors::ServiceError;
use crate::services::pricing::{discount_factor, price_cart, round_money, to_minor_units, PriceLine};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EMPTY_PRODUCTS_MESSAGE: &str = "Invalid or empty products array";

/// Checkout line after catalog lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CheckoutLine {
    pub fn price_line(&self) -> PriceLine {
        PriceLine::new(self.unit_price, self.quantity)
    }
}

/// Product snapshot carried through the provider and back into the order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedProduct {
    pub id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
}

impl From<&CheckoutLine> for OrderedProduct {
    fn from(line: &CheckoutLine) -> Self {
        OrderedProduct {
            id: line.product_id,
            quantity: line.quantity,
            price: line.unit_price,
        }
    }
}

fn ensure_not_empty(lines: &[CheckoutLine]) -> Result<(), ServiceError> {
    if lines.is_empty() || lines.iter().any(|l| l.quantity == 0) {
        return Err(ServiceError::InvalidInput(EMPTY_PRODUCTS_MESSAGE.to_string()));
    }
    Ok(())
}

fn cents(amount: Decimal) -> Result<i64, ServiceError> {
    to_minor_units(amount)
        .ok_or_else(|| ServiceError::InvalidInput(format!("Amount out of range: {}", amount)))
}

// ---------------------------------------------------------------------------
// Stripe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeLineItem {
    pub name: String,
    pub image: Option<String>,
    /// Undiscounted unit price in cents
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Metadata echoed back by Stripe on the completed session. Every value is
/// short and fixed-size; the ordered products live in the pending checkout
/// row keyed by the session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSessionMetadata {
    pub user_id: Uuid,
    pub coupon_code: Option<String>,
    pub shipping_address_id: Option<Uuid>,
}

impl StripeSessionMetadata {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("userId".to_string(), self.user_id.to_string()),
            (
                "couponCode".to_string(),
                self.coupon_code.clone().unwrap_or_default(),
            ),
        ];
        if let Some(address_id) = self.shipping_address_id {
            pairs.push(("shippingAddressId".to_string(), address_id.to_string()));
        }
        pairs
    }

    /// Parses the metadata object of a retrieved session.
    pub fn from_json(metadata: &serde_json::Value) -> Result<Self, ServiceError> {
        let field = |key: &str| metadata.get(key).and_then(|v| v.as_str());

        let user_id = field("userId")
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| {
                ServiceError::ExternalServiceError("session metadata lacks userId".to_string())
            })?;

        Ok(Self {
            user_id,
            coupon_code: field("couponCode")
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            shipping_address_id: field("shippingAddressId").and_then(|v| Uuid::parse_str(v).ok()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSessionRequest {
    pub currency: String,
    pub line_items: Vec<StripeLineItem>,
    /// Provider coupon carrying the discount
    pub coupon_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: StripeSessionMetadata,
    pub subtotal_cents: i64,
    pub expected_total_cents: i64,
}

impl StripeSessionRequest {
    /// Form-encoded body for `POST /v1/checkout/sessions`
    pub fn form_params(&self) -> Result<Vec<(String, String)>, ServiceError> {
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];

        for (i, item) in self.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            params.push((
                format!("{prefix}[price_data][currency]"),
                self.currency.clone(),
            ));
            params.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            if let Some(image) = &item.image {
                params.push((
                    format!("{prefix}[price_data][product_data][images][0]"),
                    image.clone(),
                ));
            }
            params.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            params.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }

        if let Some(coupon_id) = &self.coupon_id {
            params.push(("discounts[0][coupon]".to_string(), coupon_id.clone()));
        }

        for (key, value) in self.metadata.to_pairs() {
            params.push((format!("metadata[{key}]"), value));
        }

        Ok(params)
    }
}

/// Discount to apply through a provider-side coupon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeDiscount {
    pub percent: Decimal,
    pub coupon_id: String,
}

pub fn build_stripe_session(
    lines: &[CheckoutLine],
    currency: &str,
    discount: Option<StripeDiscount>,
    success_url: &str,
    cancel_url: &str,
    metadata: StripeSessionMetadata,
) -> Result<StripeSessionRequest, ServiceError> {
    ensure_not_empty(lines)?;

    let line_items = lines
        .iter()
        .map(|line| {
            Ok(StripeLineItem {
                name: line.name.clone(),
                image: line.image.clone(),
                unit_amount: cents(line.unit_price)?,
                quantity: line.quantity,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    let price_lines: Vec<PriceLine> = lines.iter().map(CheckoutLine::price_line).collect();
    let priced = price_cart(&price_lines, discount.as_ref().map(|d| d.percent));

    Ok(StripeSessionRequest {
        currency: currency.to_ascii_lowercase(),
        line_items,
        coupon_id: discount.map(|d| d.coupon_id),
        success_url: format!("{}?session_id={{CHECKOUT_SESSION_ID}}", success_url),
        cancel_url: cancel_url.to_string(),
        metadata,
        subtotal_cents: cents(priced.subtotal)?,
        expected_total_cents: cents(priced.total)?,
    })
}

// ---------------------------------------------------------------------------
// PayPal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency_code: String,
    pub value: String,
}

impl Money {
    pub fn new(currency: &str, amount: Decimal) -> Self {
        Self {
            currency_code: currency.to_string(),
            value: format!("{:.2}", round_money(amount)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaypalItem {
    pub name: String,
    pub unit_amount: Money,
    pub quantity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountBreakdown {
    pub item_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaypalAmount {
    pub currency_code: String,
    pub value: String,
    pub breakdown: AmountBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseUnit {
    pub amount: PaypalAmount,
    pub items: Vec<PaypalItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationContext {
    pub return_url: String,
    pub cancel_url: String,
}

/// Body for `POST /v2/checkout/orders`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaypalOrderRequest {
    pub intent: String,
    pub purchase_units: Vec<PurchaseUnit>,
    pub application_context: ApplicationContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaypalOrderDraft {
    pub request: PaypalOrderRequest,
    /// Undiscounted subtotal, used for the coupon threshold
    pub subtotal: Decimal,
    /// Sum of the submitted line amounts; equals `amount.value`
    pub total: Decimal,
}

pub fn build_paypal_order(
    lines: &[CheckoutLine],
    currency: &str,
    discount_percent: Option<Decimal>,
    return_url: &str,
    cancel_url: &str,
) -> Result<PaypalOrderDraft, ServiceError> {
    ensure_not_empty(lines)?;

    let factor = discount_percent.map(discount_factor);
    let mut subtotal = Decimal::ZERO;
    let mut item_total = Decimal::ZERO;
    let mut items = Vec::with_capacity(lines.len());

    for line in lines {
        let unit = round_money(line.unit_price);
        let quantity = Decimal::from(line.quantity);
        subtotal += unit * quantity;

        let charged_unit = match factor {
            Some(f) => round_money(unit * f),
            None => unit,
        };
        item_total += charged_unit * quantity;

        items.push(PaypalItem {
            name: line.name.clone(),
            unit_amount: Money::new(currency, charged_unit),
            quantity: line.quantity.to_string(),
        });
    }

    let item_total = round_money(item_total);
    let request = PaypalOrderRequest {
        intent: "CAPTURE".to_string(),
        purchase_units: vec![PurchaseUnit {
            amount: PaypalAmount {
                currency_code: currency.to_string(),
                value: Money::new(currency, item_total).value,
                breakdown: AmountBreakdown {
                    item_total: Money::new(currency, item_total),
                },
            },
            items,
        }],
        application_context: ApplicationContext {
            return_url: return_url.to_string(),
            cancel_url: cancel_url.to_string(),
        },
    };

    Ok(PaypalOrderDraft {
        request,
        subtotal: round_money(subtotal),
        total: item_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn line(price: Decimal, quantity: u32) -> CheckoutLine {
        CheckoutLine {
            product_id: Uuid::new_v4(),
            name: "Leather jacket".into(),
            image: Some("https://img.example/jacket.png".into()),
            unit_price: price,
            quantity,
        }
    }

    fn metadata() -> StripeSessionMetadata {
        StripeSessionMetadata {
            user_id: Uuid::new_v4(),
            coupon_code: Some("GIFTAB12CD".into()),
            shipping_address_id: None,
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_matches!(
            build_paypal_order(&[], "USD", None, "r", "c"),
            Err(ServiceError::InvalidInput(msg)) if msg == EMPTY_PRODUCTS_MESSAGE
        );
        assert_matches!(
            build_stripe_session(&[], "usd", None, "s", "c", metadata()),
            Err(ServiceError::InvalidInput(_))
        );
    }

    #[test]
    fn zero_quantity_is_rejected() {
        assert!(build_paypal_order(&[line(dec!(10), 0)], "USD", None, "r", "c").is_err());
    }

    #[test]
    fn paypal_discount_is_applied_per_unit() {
        let lines = vec![line(dec!(19.99), 3), line(dec!(5.55), 1)];
        let draft = build_paypal_order(&lines, "USD", Some(dec!(10)), "r", "c").unwrap();

        let unit = &draft.request.purchase_units[0];
        // 19.99 * 0.9 = 17.991 -> 17.99 ; 5.55 * 0.9 = 4.995 -> 5.00
        assert_eq!(unit.items[0].unit_amount.value, "17.99");
        assert_eq!(unit.items[1].unit_amount.value, "5.00");
        assert_eq!(draft.total, dec!(58.97));
        assert_eq!(unit.amount.value, "58.97");
        assert_eq!(unit.amount.breakdown.item_total.value, "58.97");
        assert_eq!(draft.subtotal, dec!(65.52));
    }

    #[test]
    fn paypal_without_coupon_declares_subtotal() {
        let lines = vec![line(dec!(100), 2)];
        let draft = build_paypal_order(&lines, "USD", None, "r", "c").unwrap();
        let unit = &draft.request.purchase_units[0];
        assert_eq!(unit.amount.value, "200.00");
        assert_eq!(unit.items[0].quantity, "2");
        assert_eq!(draft.request.intent, "CAPTURE");
    }

    #[test]
    fn paypal_body_uses_snake_case() {
        let draft = build_paypal_order(&[line(dec!(1), 1)], "USD", None, "r", "c").unwrap();
        let json = serde_json::to_value(&draft.request).unwrap();
        assert!(json["purchase_units"][0]["amount"]["breakdown"]["item_total"].is_object());
        assert_eq!(json["application_context"]["return_url"], "r");
    }

    #[test]
    fn stripe_keeps_undiscounted_units_and_scales_total() {
        let lines = vec![line(dec!(125.50), 2)];
        let discount = StripeDiscount {
            percent: dec!(10),
            coupon_id: "co_123".into(),
        };
        let request = build_stripe_session(
            &lines,
            "USD",
            Some(discount),
            "https://shop/purchase-success",
            "https://shop/purchase-cancel",
            metadata(),
        )
        .unwrap();

        assert_eq!(request.line_items[0].unit_amount, 12550);
        assert_eq!(request.subtotal_cents, 25100);
        assert_eq!(request.expected_total_cents, 22590);
        assert_eq!(request.currency, "usd");
        assert_eq!(
            request.success_url,
            "https://shop/purchase-success?session_id={CHECKOUT_SESSION_ID}"
        );
    }

    #[test]
    fn stripe_form_params_carry_coupon_and_metadata() {
        let lines = vec![line(dec!(10), 1)];
        let request = build_stripe_session(
            &lines,
            "usd",
            Some(StripeDiscount {
                percent: dec!(10),
                coupon_id: "co_1".into(),
            }),
            "s",
            "c",
            metadata(),
        )
        .unwrap();
        let params = request.form_params().unwrap();
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("discounts[0][coupon]"), Some("co_1"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("1000"));
        assert_eq!(get("metadata[couponCode]"), Some("GIFTAB12CD"));
        assert!(get("metadata[products]").is_none());
    }

    #[test]
    fn metadata_stays_within_stripe_value_limit_for_large_carts() {
        let lines: Vec<CheckoutLine> = (0..60).map(|_| line(dec!(12.34), 99)).collect();
        let request = build_stripe_session(
            &lines,
            "usd",
            None,
            "s",
            "c",
            StripeSessionMetadata {
                shipping_address_id: Some(Uuid::new_v4()),
                ..metadata()
            },
        )
        .unwrap();

        let params = request.form_params().unwrap();
        let metadata: Vec<_> = params
            .iter()
            .filter(|(key, _)| key.starts_with("metadata["))
            .collect();
        assert_eq!(metadata.len(), 3);
        assert!(metadata.iter().all(|(_, value)| value.len() <= 500));
    }

    #[test]
    fn stripe_metadata_round_trips_through_session_json() {
        let meta = StripeSessionMetadata {
            shipping_address_id: Some(Uuid::new_v4()),
            ..metadata()
        };
        let json: serde_json::Map<String, serde_json::Value> = meta
            .to_pairs()
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();

        let parsed = StripeSessionMetadata::from_json(&serde_json::Value::Object(json)).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn empty_coupon_code_in_metadata_means_none() {
        let json = serde_json::json!({
            "userId": Uuid::new_v4().to_string(),
            "couponCode": ""
        });
        let parsed = StripeSessionMetadata::from_json(&json).unwrap();
        assert!(parsed.coupon_code.is_none());
    }
}
