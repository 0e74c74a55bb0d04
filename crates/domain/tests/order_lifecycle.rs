//! Integration tests walking an order through its lifecycle using only domain rules.

use domain::{
    CustomerContact, CustomerStatus, DomainError, Money, Order, OrderStatus, ProductType, Region,
    ShippingAddress, VendorOrderRef, validate_for_vendor,
};

fn canvas_order() -> Order {
    Order::new(
        ProductType::FramedCanvas,
        "20x24",
        Money::from_cents(12999),
        "cad",
        CustomerContact {
            name: "Mona Lisa".to_string(),
            email: "mona@example.com".to_string(),
            phone: Some("+1 555 0100".to_string()),
        },
        Some(ShippingAddress {
            line1: "10 Gallery Rd".to_string(),
            line2: Some("Unit 4".to_string()),
            city: "Toronto".to_string(),
            state: Some("ON".to_string()),
            postal_code: "M5V 2T6".to_string(),
            country: "CA".to_string(),
        }),
    )
}

#[test]
fn full_physical_lifecycle() {
    let mut order = canvas_order();
    assert_eq!(order.status.customer_status(), CustomerStatus::Received);

    order.confirm_payment("cs_live_abc");
    let key = validate_for_vendor(&order, "https://cdn.example.com/art-3x.png").unwrap();
    assert_eq!(key.region, Region::Global);

    order.transition_to(OrderStatus::PendingReview).unwrap();
    order
        .attach_vendor_order(&VendorOrderRef {
            vendor_order_id: "65f0c0ffee".to_string(),
            status: "pending".to_string(),
        })
        .unwrap();
    assert_eq!(order.status.customer_status(), CustomerStatus::InProduction);

    let shipped = OrderStatus::from_vendor_status("shipped");
    order.transition_to(shipped).unwrap();
    order
        .transition_to(OrderStatus::from_vendor_status("delivered"))
        .unwrap();
    assert!(order.status.is_terminal());

    let err = order.transition_to(OrderStatus::Cancelled).unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));
}

#[test]
fn vendor_order_cannot_be_attached_twice_through_processing() {
    let mut order = canvas_order();
    let vendor = VendorOrderRef {
        vendor_order_id: "po_1".to_string(),
        status: "pending".to_string(),
    };
    order.attach_vendor_order(&vendor).unwrap();
    assert!(order.attach_vendor_order(&vendor).is_err());
}
