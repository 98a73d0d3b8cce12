//! Concurrent callers racing on the same and on different books.

use chrono::Utc;
use rental_core::{ErrorKind, ManualClock, RecordingSink, RentalConfig, RentalService};
use rental_types::{Amount, Identity};
use std::sync::Arc;

const PRICE: Amount = 10;
const DEPOSIT: Amount = 50;

fn service() -> Arc<RentalService> {
    Arc::new(RentalService::new(
        RentalConfig::default(),
        Arc::new(ManualClock::new(Utc::now())),
        Arc::new(RecordingSink::new()),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_racing_renter_wins() {
    let service = service();
    let id = service
        .list_item(&Identity::new("owner"), "Contested", PRICE, DEPOSIT)
        .await
        .unwrap();

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .rent_item(&Identity::new(format!("renter-{i}")), id, PRICE + DEPOSIT)
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::State),
        }
    }

    assert_eq!(winners, 1);
    let snapshot = service.escrow_snapshot().unwrap();
    assert_eq!(snapshot.held, PRICE + DEPOSIT);
    assert_eq!(snapshot.in_rental, PRICE + DEPOSIT);
    assert!(service.verify_solvency().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_listings_get_distinct_ids() {
    let service = service();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .list_item(&Identity::new(format!("lister-{i}")), "Book", PRICE, DEPOSIT)
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), 20);
    assert_eq!(service.active_book_ids().len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_rent_return_withdraw_keeps_escrow_solvent() {
    let service = service();
    let owner = Identity::new("owner");

    let mut ids = Vec::new();
    for i in 0..8 {
        ids.push(
            service
                .list_item(&owner, &format!("Book {i}"), PRICE, DEPOSIT)
                .await
                .unwrap(),
        );
    }

    let handles: Vec<_> = ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let service = service.clone();
            tokio::spawn(async move {
                let renter = Identity::new(format!("renter-{i}"));
                service.rent_item(&renter, id, PRICE + DEPOSIT).await?;
                service.return_item(&renter, id).await?;
                service.withdraw_refund(&renter).await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), DEPOSIT);
    }

    let snapshot = service.escrow_snapshot().unwrap();
    assert_eq!(snapshot.in_rental, 0);
    assert_eq!(snapshot.pending_total, 8 * PRICE);
    assert_eq!(service.pending_refund(&owner), 8 * PRICE);
    assert!(service.verify_solvency().unwrap());
}
