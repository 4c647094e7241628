use std::collections::HashSet;
use storefront_payments::payments::reference::{
    generate_merchant_reference, is_valid_reference, MAX_REFERENCE_LEN,
};

#[test]
fn generated_references_fit_the_gateway_field() {
    for _ in 0..1_000 {
        let reference = generate_merchant_reference();
        assert!(reference.len() <= MAX_REFERENCE_LEN);
        assert!(is_valid_reference(&reference), "{}", reference);
    }
}

#[test]
fn concurrent_generation_does_not_collide() {
    let handles: Vec<_> = (0..8)
        .map(|_| {
            std::thread::spawn(|| {
                (0..5_000)
                    .map(|_| generate_merchant_reference())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for reference in handle.join().unwrap() {
            assert!(seen.insert(reference), "duplicate merchant reference");
        }
    }
    assert_eq!(seen.len(), 40_000);
}
