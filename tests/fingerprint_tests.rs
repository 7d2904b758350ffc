use chrono::{TimeZone, Utc};
use faultscope::classifier::Classifier;
use faultscope::fingerprint::{fingerprint, hash_signature, short_class, signature};
use faultscope::masking::{message_shape, normalize_message};
use faultscope::model::StackFrame;

fn parse(text: &str) -> faultscope::DiagnosticRecord {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Classifier::new().parse_at(text, "orders", at).expect("record")
}

#[test]
fn dynamic_values_do_not_change_fingerprint() {
    let a = parse("com.acme.OrderException: order 12345 failed at 2024-01-02 10:11:12\n\tat com.acme.Orders.place(Orders.java:42)");
    let b = parse("com.acme.OrderException: order 67890 failed at 2025-03-04 01:02:03\n\tat com.acme.Orders.place(Orders.java:57)");
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(fingerprint(&a), a.fingerprint());
}

#[test]
fn uuid_and_hex_ids_are_masked() {
    let a = parse("com.acme.SessionException: session 550e8400-e29b-41d4-a716-446655440000 expired (token 0x7fa3c2d1e9)");
    let b = parse("com.acme.SessionException: session 123e4567-e89b-12d3-a456-426614174000 expired (token 0x11aa22bb33)");
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn exception_class_discriminates() {
    let a = parse("com.acme.OrderException: failed\n\tat com.acme.Orders.place(Orders.java:42)");
    let b = parse("com.acme.PaymentException: failed\n\tat com.acme.Orders.place(Orders.java:42)");
    assert_ne!(a.fingerprint(), b.fingerprint());
}

#[test]
fn call_site_discriminates() {
    let a = parse("com.acme.OrderException: failed\n\tat com.acme.Orders.place(Orders.java:42)");
    let b = parse("com.acme.OrderException: failed\n\tat com.acme.Orders.cancel(Orders.java:42)");
    assert_ne!(a.fingerprint(), b.fingerprint());
}

#[test]
fn signature_shape_is_class_site_message() {
    let frame = StackFrame::new("com.acme.Orders", "place", "Orders.java:42");
    let sig = signature(Some("com.acme.OrderException"), Some(&frame), "order 7 failed");
    assert_eq!(sig, "OrderException|com.acme.Orders.place|order NUMBER failed");
    assert_eq!(signature(None, None, "boom"), "||boom");
}

#[test]
fn digest_is_lowercase_sha256_hex() {
    let h = hash_signature("OrderException|com.acme.Orders.place|order NUMBER failed");
    assert_eq!(h.len(), 64);
    assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(
        hash_signature(""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn short_class_strips_package() {
    assert_eq!(short_class("com.acme.OrderException"), "OrderException");
    assert_eq!(short_class("Plain"), "Plain");
}

#[test]
fn normalization_tokens() {
    assert_eq!(normalize_message("retry 3 of 5"), "retry NUMBER of NUMBER");
    assert_eq!(normalize_message("took 12:30:01.123 on 2024-01-02"), "took TIME on DATE");
    assert_eq!(
        normalize_message("request 550e8400-e29b-41d4-a716-446655440000 failed"),
        "request ID failed"
    );
}

#[test]
fn message_shape_is_coarse() {
    assert_eq!(
        message_shape("Connection to http://db.internal:5432/app refused for 'alice'"),
        "connection to url refused for str"
    );
    assert_eq!(message_shape("timeout contacting 10.0.0.12:8080"), "timeout contacting ip");
    assert_eq!(message_shape("user \"bob\" not found"), message_shape("user \"alice\" not found"));
    let long = (0..20).map(|i| format!("w{i}x")).collect::<Vec<_>>().join(" ");
    assert_eq!(message_shape(&long).split(' ').count(), 12);
}
