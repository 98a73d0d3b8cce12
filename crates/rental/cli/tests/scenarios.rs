//! Replays the bundled scenario files.

use rental_cli::{run_scenario, Scenario};
use rental_core::RentalConfig;
use rental_types::Identity;
use std::path::PathBuf;

fn scenario(name: &str) -> Scenario {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name);
    Scenario::load(&path).unwrap()
}

#[tokio::test]
async fn late_returns_settle_per_schedule() {
    let report = run_scenario(scenario("late_returns.json"), RentalConfig::default())
        .await
        .unwrap();

    assert!(report.unexpected().is_empty(), "{:?}", report.unexpected());
    assert!(report.solvent);

    let quote = report.outcomes[7].result.as_ref().unwrap();
    assert_eq!(quote["elapsed_minutes"], 2);
    assert_eq!(quote["renter_refund"], "40000000000000000");

    assert_eq!(report.balances[&Identity::new("alice")], 0);
    assert_eq!(report.balances[&Identity::new("bob")], 40_000_000_000_000_000);
    assert_eq!(report.balances[&Identity::new("carol")], 0);
    assert_eq!(report.balances[&Identity::new("owner")], 0);

    // bob's refund is still pending, nothing else is held.
    assert_eq!(report.escrow.held, 40_000_000_000_000_000);
    assert_eq!(report.escrow.in_rental, 0);
    assert_eq!(report.books.len(), 3);
    assert!(report.books.iter().all(|view| view.book.is_available));
}

#[tokio::test]
async fn rejections_leave_state_consistent() {
    let report = run_scenario(scenario("rejections.json"), RentalConfig::default())
        .await
        .unwrap();

    assert!(report.unexpected().is_empty(), "{:?}", report.unexpected());
    assert!(report.solvent);
    assert!(report.books.is_empty());

    // 5 excess refunded at rent, 50 deposit back at return.
    let withdrawn = report.outcomes[11].result.as_ref().unwrap();
    assert_eq!(withdrawn["amount"], "55");
    assert_eq!(report.balances[&Identity::new("lister")], 10);

    let names: Vec<_> = report.events.iter().map(|e| e.event.name()).collect();
    assert_eq!(
        names,
        vec![
            "BookListed",
            "BookRented",
            "BookReturned",
            "BookUnlisted",
            "RefundIssued"
        ]
    );
}
